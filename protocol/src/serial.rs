//! Native asynchronous serial port support for [`Session`].
//!
//! Uses the [`serial2-tokio`](https://crates.io/crates/serial2-tokio) crate.
//! The port is registered with the ambient tokio runtime, which must be a
//! multi-threaded one so that the receive worker's reads make progress.

use crate::{BAUD_RATE, Config, Error, Session};
use embedded_io_adapters::tokio_1::FromTokio;
use embedded_io_async::ErrorType;
use log::error;
use serial2_tokio::{CharSize, FlowControl, Parity, SerialPort, Settings, StopBits};
use tokio::{
    io::{ReadHalf, WriteHalf},
    runtime::{Handle, RuntimeFlavor},
};

/// Receiving half of a serial port implementing [`Read`](embedded_io_async::Read).
pub type PortReader = FromTokio<ReadHalf<SerialPort>>;

/// Sending half of a serial port implementing [`Write`](embedded_io_async::Write).
pub type PortWriter = FromTokio<WriteHalf<SerialPort>>;

/// Port-specific error type to be used as `E` for the generic [`Error<E>`] type.
pub type PortError = <PortWriter as ErrorType>::Error;

/// Opens a native serial port at the given path.
///
/// The port is configured for 9600 baud 8N1 without flow control and any
/// stale buffered data is discarded.
///
/// Returns both halves of the port, ready to be passed to [`Session::open_with`].
pub fn open(path: &str) -> Result<(PortReader, PortWriter), Error<PortError>> {
    let port = SerialPort::open(path, |mut settings: Settings| {
        settings.set_raw();
        settings.set_baud_rate(BAUD_RATE)?;
        settings.set_char_size(CharSize::Bits8);
        settings.set_stop_bits(StopBits::One);
        settings.set_parity(Parity::None);
        settings.set_flow_control(FlowControl::None);

        Ok(settings)
    })?;

    port.discard_buffers()?;

    let (reader, writer) = tokio::io::split(port);

    Ok((FromTokio::new(reader), FromTokio::new(writer)))
}

impl Session<PortWriter> {
    /// Opens a session on the native serial port at the given path.
    ///
    /// See [`Session::open_with`] for the handshake and error semantics.
    ///
    /// Fails with [`Error::NoRuntime`] unless called from a multi-threaded
    /// tokio runtime, since only those drive the port from the worker thread.
    pub async fn open(path: &str, config: Config) -> Result<Self, Error<PortError>> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;

        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            error!("Serial sessions require a multi-threaded runtime");

            return Err(Error::NoRuntime);
        }

        let (reader, writer) = open(path)?;

        Self::open_with(reader, writer, config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;

    #[tokio::test]
    async fn open_single_threaded() {
        init_logger();

        let res = Session::open("/dev/pms-uart-missing", Config::default()).await;

        assert!(
            matches!(res, Err(Error::NoRuntime)),
            "result should be no runtime error"
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_missing_port() {
        init_logger();

        let res = Session::open("/dev/pms-uart-missing", Config::default()).await;

        assert!(
            matches!(res, Err(Error::Io(_))),
            "result should be I/O error"
        );
    }
}
