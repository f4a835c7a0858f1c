//! Mode-switch and query commands sent to the sensor.

use crate::{
    Result,
    frame::{DecodeError, START_1, START_2, compute_checksum},
};
use embedded_io_async::Write;
use log::trace;
use strum::FromRepr;

/// Length of every command frame.
pub const COMMAND_LEN: usize = 7;

/// Command code byte of a command frame.
#[derive(FromRepr, PartialEq, Eq, Copy, Clone, Debug)]
#[repr(u8)]
enum Code {
    ChangeMode = 0xe1,
    ReadPassive = 0xe2,
    ChangeState = 0xe4,
}

/// Command understood by the sensor.
///
/// Each command is encoded as a fixed seven-byte frame:
/// two markers, a command code, a big-endian data word and
/// a big-endian checksum over the preceding five bytes.
#[derive(strum::Display, strum::EnumIter, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "title_case")]
pub enum Command {
    /// Requests a single data frame while in passive mode.
    ReadPassive,
    /// Switches to passive mode, where frames are only sent on request.
    EnterPassive,
    /// Switches to active mode, where frames are pushed continuously.
    EnterActive,
    /// Stops the fan and enters low-power standby.
    EnterStandby,
    /// Wakes the sensor from standby.
    EnterNormal,
}

impl Command {
    const fn selector(self) -> (Code, u16) {
        match self {
            Self::ReadPassive => (Code::ReadPassive, 0x0000),
            Self::EnterPassive => (Code::ChangeMode, 0x0000),
            Self::EnterActive => (Code::ChangeMode, 0x0001),
            Self::EnterStandby => (Code::ChangeState, 0x0000),
            Self::EnterNormal => (Code::ChangeState, 0x0001),
        }
    }

    const fn from_selector(code: Code, data: u16) -> Option<Self> {
        match (code, data) {
            (Code::ReadPassive, 0x0000) => Some(Self::ReadPassive),
            (Code::ChangeMode, 0x0000) => Some(Self::EnterPassive),
            (Code::ChangeMode, 0x0001) => Some(Self::EnterActive),
            (Code::ChangeState, 0x0000) => Some(Self::EnterStandby),
            (Code::ChangeState, 0x0001) => Some(Self::EnterNormal),
            _ => None,
        }
    }

    /// Encodes the command into its wire representation.
    ///
    /// # Examples
    ///
    /// ```
    /// use pms_uart::Command;
    ///
    /// assert_eq!(
    ///     Command::ReadPassive.encode(),
    ///     [0x42, 0x4d, 0xe2, 0x00, 0x00, 0x01, 0x71]
    /// );
    /// ```
    #[must_use]
    pub fn encode(self) -> [u8; COMMAND_LEN] {
        let (code, data) = self.selector();
        let mut buf = [0x00; COMMAND_LEN];

        buf[0] = START_1;
        buf[1] = START_2;
        buf[2] = code as u8;
        buf[3..5].copy_from_slice(&data.to_be_bytes());

        let checksum = compute_checksum(&buf[..5]);

        buf[5..].copy_from_slice(&checksum.to_be_bytes());

        buf
    }

    /// Decodes a command frame.
    ///
    /// Mostly useful for sensor simulators and for inspecting captured traffic.
    pub fn decode(buf: &[u8]) -> core::result::Result<Self, DecodeError> {
        let buf: &[u8; COMMAND_LEN] = buf.try_into().map_err(|_| DecodeError::LengthMismatch {
            declared: COMMAND_LEN,
            actual: buf.len(),
        })?;

        if buf[..2] != [START_1, START_2] {
            return Err(DecodeError::InvalidMarkers);
        }

        let expected = compute_checksum(&buf[..5]);
        let actual = u16::from_be_bytes([buf[5], buf[6]]);

        if expected != actual {
            return Err(DecodeError::IncorrectChecksum { expected, actual });
        }

        let data = u16::from_be_bytes([buf[3], buf[4]]);

        Code::from_repr(buf[2])
            .and_then(|code| Self::from_selector(code, data))
            .ok_or(DecodeError::UnknownCommand(buf[2], data))
    }
}

/// Writes a command to the port in a single write.
///
/// No response is awaited. Data frames sent in response are picked up
/// by whoever is reading from the port.
pub async fn send_command<P: Write>(port: &mut P, cmd: Command) -> Result<(), P::Error> {
    let buf = cmd.encode();

    trace!("Sending command {cmd}: {buf:02x?}");
    port.write_all(&buf).await?;
    port.flush().await?;

    Ok(())
}
