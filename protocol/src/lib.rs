//! Drive Plantower PMS-series particulate matter sensors over UART.
//!
//! # Overview
//!
//! The `pms-uart` crate implements the binary framing protocol spoken by the
//! PMS1003/3003/5003/7003/A003 family and the extended PMS5003ST variant.
//! The host writes short command frames to select an operating mode, while the
//! sensor pushes length-prefixed, checksummed data frames whenever it has a
//! measurement ready.
//!
//! Depending on your needs, you can:
//!
//! - Open a [`Session`] and let its background worker turn the byte stream into
//!   validated [`Frame`]s, waiting for them with [`Session::read`] or [`Session::wait`].
//! - Feed bytes into a [`Synchronizer`] yourself and collect the frames it emits.
//! - Encode mode switches with [`Command`] and decode raw frames with [`Frame::decode`].
//!
//! # Getting started
//!
//! The sensor exposes a 3.3 V UART configured as follows:
//!
//! - **Baud rate:** 9600
//! - **Parity:** None
//! - **Data bits:** 8
//! - **Stop bits:** 1
//!
//! If you enable the `native-serial` feature, `serial::open` returns a reader and
//! writer pair for a native serial port, and `Session::open` opens a session on it
//! directly.
//!
//! Any other transport works as long as it implements [`Read`](embedded_io_async::Read)
//! and [`Write`](embedded_io_async::Write) from [`embedded_io_async`]. The reader is moved into the session's worker,
//! the writer stays with the session and carries the mode commands:
//!
//! ```no_run
//! use core::time::Duration;
//! use pms_uart::{Command, Config, Session, embedded_io_async::{Read, Write}};
//!
//! # async fn example<R, W>(reader: R, writer: W) -> pms_uart::Result<(), W::Error>
//! # where
//! #     R: Read + Send + 'static,
//! #     W: Write,
//! # {
//! let mut session = Session::open_with(reader, writer, Config::default()).await?;
//!
//! if session.is_ready() {
//!     let frame = session.read(Duration::from_secs(2)).await?;
//!
//!     println!("PM2.5: {} ug/m3", frame.atmospheric.pm2_5);
//! }
//!
//! session.set_mode(Command::EnterStandby).await?;
//! session.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Protocol details
//!
//! Every frame, in both directions, starts with the marker bytes `0x42 0x4d`.
//! Data frames continue with a big-endian payload length and end with a
//! big-endian 16-bit sum of all preceding bytes. Command frames are always
//! seven bytes long.
//!
//! The sensor operates in one of two reporting modes:
//!
//! - **Active:** frames are pushed continuously, roughly once per second.
//!   Use [`Session::wait`] to receive them.
//! - **Passive:** a frame is only sent in response to [`Command::ReadPassive`].
//!   [`Session::read`] issues the request and waits for the answer.
//!
//! After a mode change the sensor needs some processing time before it accepts
//! further commands, so [`Session::set_mode`] pauses for a configurable settle delay.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod command;
mod config;
mod frame;
mod session;
mod sync;

#[cfg(feature = "native-serial")]
#[cfg_attr(docsrs, doc(cfg(feature = "native-serial")))]
pub mod serial;

pub use command::{COMMAND_LEN, Command, send_command};
pub use config::{Config, Handshake};
pub use embedded_io_async;
pub use frame::{
    CHECKSUM_LEN, Concentration, DecodeError, Extended, Frame, HEADER_LEN, Layout, MAX_FRAME_LEN,
    MAX_PAYLOAD_LEN, ParticleCounts, START_1, START_2, compute_checksum, validate_checksum,
};
pub use session::Session;
pub use sync::{State, Synchronizer};

use core::fmt::{Display, Formatter};

/// Baud rate used by the sensor's UART.
pub const BAUD_RATE: u32 = 9600;

/// A specialized [`Result`] type for sensor operations.
///
/// Uses [`Error<E>`] as the error variant, which can include port-specific errors.
pub type Result<T, E> = core::result::Result<T, Error<E>>;

/// Error type for sensor operations.
///
/// The generic parameter `E` allows the error type to carry a port-specific error.
///
/// Corrupted or unsynchronized input never shows up here: the [`Synchronizer`]
/// drops such frames and resynchronizes on its own.
///
/// This enum is marked `#[non_exhaustive]` to allow for future variants.
#[non_exhaustive]
#[derive(PartialEq, Eq, Debug)]
pub enum Error<E> {
    /// No validated frame arrived before the deadline.
    Timeout,
    /// The session was closed or its receive worker has stopped.
    Closed,
    /// The sensor did not answer the startup handshake.
    NotReady,
    /// The receive worker thread could not be spawned.
    Spawn,
    /// No tokio runtime able to drive the receive worker is available.
    NoRuntime,
    /// A port-specific input/output error.
    Io(E),
}

impl<E: core::error::Error> Display for Error<E> {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out waiting for frame"),
            Self::Closed => write!(f, "session closed"),
            Self::NotReady => write!(f, "sensor not ready"),
            Self::Spawn => write!(f, "failed to spawn receive worker"),
            Self::NoRuntime => write!(f, "no tokio runtime available"),
            Self::Io(err) => write!(f, "input/output error: {err}"),
        }
    }
}

impl<E: core::error::Error> core::error::Error for Error<E> {}

impl<E> From<E> for Error<E> {
    fn from(err: E) -> Self {
        Self::Io(err)
    }
}
