//! Data frame layout, checksum validation and field decoding.

use core::{
    fmt::{Display, Formatter},
    num::Wrapping,
};

/// First marker byte opening every frame.
pub const START_1: u8 = 0x42;

/// Second marker byte opening every frame.
pub const START_2: u8 = 0x4d;

/// Number of bytes preceding the payload (two markers and the payload length).
pub const HEADER_LEN: usize = 4;

/// Number of bytes occupied by the trailing checksum.
pub const CHECKSUM_LEN: usize = 2;

/// Largest payload length accepted on the wire.
pub const MAX_PAYLOAD_LEN: u16 = Layout::Extended.payload_len();

/// Largest complete frame, markers and length included.
pub const MAX_FRAME_LEN: usize = HEADER_LEN + MAX_PAYLOAD_LEN as usize;

/// Error returned when a byte sequence is not a valid data frame.
#[non_exhaustive]
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub enum DecodeError {
    /// The buffer does not start with the frame markers.
    InvalidMarkers,
    /// The buffer length does not match the length declared in the frame.
    LengthMismatch {
        /// Frame length derived from the declared payload length.
        declared: usize,
        /// Actual buffer length.
        actual: usize,
    },
    /// The declared payload length does not belong to any known data layout.
    UnsupportedLength(u16),
    /// The trailing checksum does not match the sum of the preceding bytes.
    IncorrectChecksum {
        /// Checksum computed over the received bytes.
        expected: u16,
        /// Checksum carried by the frame.
        actual: u16,
    },
    /// The command code or data word is not part of the command set.
    UnknownCommand(u8, u16),
}

impl Display for DecodeError {
    fn fmt(&self, f: &mut Formatter) -> core::fmt::Result {
        match self {
            Self::InvalidMarkers => write!(f, "invalid frame markers"),
            Self::LengthMismatch { declared, actual } => {
                write!(f, "frame length mismatch: declared {declared}, got {actual}")
            }
            Self::UnsupportedLength(len) => write!(f, "unsupported payload length: {len}"),
            Self::IncorrectChecksum { expected, actual } => {
                write!(f, "incorrect checksum: expected {expected:#06x}, got {actual:#06x}")
            }
            Self::UnknownCommand(code, data) => {
                write!(f, "unknown command: {code:#04x} with data {data:#06x}")
            }
        }
    }
}

impl core::error::Error for DecodeError {}

/// Computes the 16-bit wrapping sum used as frame checksum.
#[must_use]
pub fn compute_checksum(data: &[u8]) -> u16 {
    data.iter()
        .map(|&x| Wrapping(u16::from(x)))
        .sum::<Wrapping<_>>()
        .0
}

/// Checks the trailing big-endian checksum of a complete frame.
///
/// The checksum covers every byte before it. Buffers too short to carry a
/// checksum are never valid.
#[must_use]
pub fn validate_checksum(frame: &[u8]) -> bool {
    split_checksum(frame).is_some_and(|(data, checksum)| compute_checksum(data) == checksum)
}

fn split_checksum(frame: &[u8]) -> Option<(&[u8], u16)> {
    let (data, checksum) = frame.split_last_chunk::<CHECKSUM_LEN>()?;

    Some((data, u16::from_be_bytes(*checksum)))
}

/// Data frame layout, selected by the declared payload length.
#[derive(strum::Display, PartialEq, Eq, Copy, Clone, Debug)]
#[strum(serialize_all = "title_case")]
pub enum Layout {
    /// Concentrations, particle counts, version and error code.
    ///
    /// Sent by the PMS1003/3003/5003/7003/A003 family.
    Standard,
    /// Standard fields followed by formaldehyde, temperature and humidity.
    ///
    /// Sent by the PMS5003ST family.
    Extended,
}

impl Layout {
    /// Returns the layout matching a declared payload length, if any.
    #[must_use]
    pub const fn from_payload_len(len: u16) -> Option<Self> {
        match len {
            28 => Some(Self::Standard),
            36 => Some(Self::Extended),
            _ => None,
        }
    }

    /// Returns the payload length declared by frames of this layout.
    #[must_use]
    pub const fn payload_len(self) -> u16 {
        match self {
            Self::Standard => 28,
            Self::Extended => 36,
        }
    }

    /// Returns the complete frame length of this layout.
    #[must_use]
    pub const fn frame_len(self) -> usize {
        HEADER_LEN + self.payload_len() as usize
    }
}

/// Mass concentrations of PM1.0, PM2.5 and PM10 in µg/m³.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct Concentration {
    /// PM1.0 concentration.
    pub pm1_0: u16,
    /// PM2.5 concentration.
    pub pm2_5: u16,
    /// PM10 concentration.
    pub pm10: u16,
}

/// Number of particles per 0.1 L of air with a diameter above the given size.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct ParticleCounts {
    /// Particles above 0.3 µm.
    pub um0_3: u16,
    /// Particles above 0.5 µm.
    pub um0_5: u16,
    /// Particles above 1.0 µm.
    pub um1_0: u16,
    /// Particles above 2.5 µm.
    pub um2_5: u16,
    /// Particles above 5.0 µm.
    pub um5_0: u16,
    /// Particles above 10 µm.
    pub um10: u16,
}

/// Fields only present in the [`Layout::Extended`] layout.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct Extended {
    /// Formaldehyde concentration in µg/m³ (raw value divided by 1000 gives mg/m³).
    pub hcho: u16,
    /// Temperature in tenths of a degree Celsius.
    pub temperature: i16,
    /// Relative humidity in tenths of a percent.
    pub humidity: u16,
}

/// A decoded, checksum-validated sensor data frame.
///
/// All multi-byte fields have been converted from the big-endian wire
/// representation to native integers.
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub struct Frame {
    /// Declared payload length.
    pub length: u16,
    /// Concentrations using the CF=1 factory calibration.
    pub standard: Concentration,
    /// Concentrations under atmospheric environment.
    pub atmospheric: Concentration,
    /// Particle counts.
    pub counts: ParticleCounts,
    /// Formaldehyde, temperature and humidity, if the sensor reports them.
    pub extended: Option<Extended>,
    /// Protocol version byte.
    pub version: u8,
    /// Error code byte.
    pub error_code: u8,
    /// Checksum carried by the frame.
    pub checksum: u16,
}

impl Frame {
    /// Decodes a complete frame, markers included.
    ///
    /// The frame is rejected unless its length, checksum and layout are all valid.
    /// Only data frames are accepted; the short acknowledgements the sensor sends
    /// after mode commands are reported as [`DecodeError::UnsupportedLength`].
    ///
    /// # Examples
    ///
    /// ```
    /// use pms_uart::{DecodeError, Frame};
    ///
    /// let ack = [0x42, 0x4d, 0x00, 0x04, 0xe1, 0x00, 0x01, 0x74];
    ///
    /// assert_eq!(Frame::decode(&ack), Err(DecodeError::UnsupportedLength(4)));
    /// ```
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        let Some([first, second, len_hi, len_lo]) = raw.first_chunk::<HEADER_LEN>() else {
            return Err(DecodeError::LengthMismatch {
                declared: HEADER_LEN,
                actual: raw.len(),
            });
        };

        if (*first, *second) != (START_1, START_2) {
            return Err(DecodeError::InvalidMarkers);
        }

        let length = u16::from_be_bytes([*len_hi, *len_lo]);
        let declared = HEADER_LEN + usize::from(length);

        if declared != raw.len() || usize::from(length) < CHECKSUM_LEN {
            return Err(DecodeError::LengthMismatch {
                declared,
                actual: raw.len(),
            });
        }

        let (data, checksum) = split_checksum(raw).ok_or(DecodeError::LengthMismatch {
            declared,
            actual: raw.len(),
        })?;
        let expected = compute_checksum(data);

        if expected != checksum {
            return Err(DecodeError::IncorrectChecksum {
                expected,
                actual: checksum,
            });
        }

        let layout = Layout::from_payload_len(length).ok_or(DecodeError::UnsupportedLength(length))?;

        Ok(Self::normalize(layout, length, checksum, &data[HEADER_LEN..]))
    }

    /// Converts the big-endian payload fields into a frame.
    fn normalize(layout: Layout, length: u16, checksum: u16, payload: &[u8]) -> Self {
        let mut fields = Fields(payload);
        let standard = fields.concentration();
        let atmospheric = fields.concentration();
        let counts = ParticleCounts {
            um0_3: fields.u16(),
            um0_5: fields.u16(),
            um1_0: fields.u16(),
            um2_5: fields.u16(),
            um5_0: fields.u16(),
            um10: fields.u16(),
        };
        let extended = match layout {
            Layout::Standard => None,
            Layout::Extended => {
                let ext = Extended {
                    hcho: fields.u16(),
                    temperature: fields.i16(),
                    humidity: fields.u16(),
                };

                fields.u16(); // Reserved

                Some(ext)
            }
        };

        Self {
            length,
            standard,
            atmospheric,
            counts,
            extended,
            version: fields.u8(),
            error_code: fields.u8(),
            checksum,
        }
    }

    /// Returns the layout this frame was decoded from.
    #[must_use]
    pub fn layout(&self) -> Layout {
        if self.extended.is_some() {
            Layout::Extended
        } else {
            Layout::Standard
        }
    }

    /// Encodes the frame into its wire representation.
    ///
    /// The declared length and the checksum are derived from the frame's fields,
    /// so the `length` and `checksum` fields are not consulted.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let layout = self.layout();
        let mut buf = Vec::with_capacity(layout.frame_len());

        buf.extend_from_slice(&[START_1, START_2]);
        buf.extend_from_slice(&layout.payload_len().to_be_bytes());

        for val in [
            self.standard.pm1_0,
            self.standard.pm2_5,
            self.standard.pm10,
            self.atmospheric.pm1_0,
            self.atmospheric.pm2_5,
            self.atmospheric.pm10,
            self.counts.um0_3,
            self.counts.um0_5,
            self.counts.um1_0,
            self.counts.um2_5,
            self.counts.um5_0,
            self.counts.um10,
        ] {
            buf.extend_from_slice(&val.to_be_bytes());
        }

        if let Some(ext) = self.extended {
            buf.extend_from_slice(&ext.hcho.to_be_bytes());
            buf.extend_from_slice(&ext.temperature.to_be_bytes());
            buf.extend_from_slice(&ext.humidity.to_be_bytes());
            buf.extend_from_slice(&[0x00, 0x00]);
        }

        buf.extend_from_slice(&[self.version, self.error_code]);
        buf.extend_from_slice(&compute_checksum(&buf).to_be_bytes());

        buf
    }
}

/// Sequential reader over big-endian payload fields.
///
/// Callers must only read as many fields as the layout's payload holds.
struct Fields<'a>(&'a [u8]);

impl Fields<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let (head, tail) = self.0.split_at(N);
        let mut buf = [0x00; N];

        buf.copy_from_slice(head);
        self.0 = tail;

        buf
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn u16(&mut self) -> u16 {
        u16::from_be_bytes(self.take())
    }

    fn i16(&mut self) -> i16 {
        i16::from_be_bytes(self.take())
    }

    fn concentration(&mut self) -> Concentration {
        Concentration {
            pm1_0: self.u16(),
            pm2_5: self.u16(),
            pm10: self.u16(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::init_logger;

    // Captured from a PMS7003 in an office
    const STANDARD_FRAME: [u8; 32] = [
        0x42, 0x4d, 0x00, 0x1c, 0x00, 0x05, 0x00, 0x07, 0x00, 0x08, 0x00, 0x05, 0x00, 0x07, 0x00,
        0x08, 0x03, 0xa2, 0x01, 0x14, 0x00, 0x3c, 0x00, 0x06, 0x00, 0x02, 0x00, 0x00, 0x91, 0x00,
        0x02, 0x62,
    ];

    #[test]
    fn checksum() {
        init_logger();

        assert_eq!(compute_checksum(&[]), 0x0000, "empty sum should be zero");
        assert_eq!(
            compute_checksum(&[0xff; 300]),
            0x2ad4,
            "sum should wrap around at 16 bits"
        );
        assert!(validate_checksum(&STANDARD_FRAME), "checksum should match");
        assert!(
            !validate_checksum(&[0x42]),
            "buffer without checksum should be invalid"
        );
    }

    #[test]
    fn decode_standard() -> Result<(), DecodeError> {
        init_logger();

        let frame = Frame::decode(&STANDARD_FRAME)?;

        assert_eq!(frame.length, 28, "length should be correct");
        assert_eq!(
            frame.standard,
            Concentration {
                pm1_0: 5,
                pm2_5: 7,
                pm10: 8
            },
            "CF=1 concentrations should be correct"
        );
        assert_eq!(
            frame.atmospheric, frame.standard,
            "atmospheric concentrations should be correct"
        );
        assert_eq!(
            frame.counts,
            ParticleCounts {
                um0_3: 930,
                um0_5: 276,
                um1_0: 60,
                um2_5: 6,
                um5_0: 2,
                um10: 0,
            },
            "particle counts should be correct"
        );
        assert_eq!(frame.extended, None, "extended fields should be absent");
        assert_eq!(frame.version, 0x91, "version should be correct");
        assert_eq!(frame.error_code, 0x00, "error code should be correct");
        assert_eq!(frame.checksum, 0x0262, "checksum should be correct");
        assert_eq!(frame.layout(), Layout::Standard, "layout should be correct");

        Ok(())
    }

    #[test]
    fn decode_extended() -> Result<(), DecodeError> {
        init_logger();

        let mut raw = vec![0x42, 0x4d, 0x00, 0x24];

        raw.extend((1..=12u16).flat_map(u16::to_be_bytes));
        raw.extend_from_slice(&[0x00, 0x0c, 0xff, 0x38, 0x01, 0xf4, 0x00, 0x00, 0x80, 0x02]);
        raw.extend_from_slice(&compute_checksum(&raw).to_be_bytes());

        let frame = Frame::decode(&raw)?;

        assert_eq!(frame.length, 36, "length should be correct");
        assert_eq!(frame.standard.pm1_0, 1, "first field should be correct");
        assert_eq!(frame.counts.um10, 12, "last count should be correct");
        assert_eq!(
            frame.extended,
            Some(Extended {
                hcho: 12,
                temperature: -200,
                humidity: 500,
            }),
            "extended fields should be correct"
        );
        assert_eq!(frame.version, 0x80, "version should be correct");
        assert_eq!(frame.error_code, 0x02, "error code should be correct");

        Ok(())
    }

    #[test]
    fn encode_matches_capture() -> Result<(), DecodeError> {
        init_logger();

        let frame = Frame::decode(&STANDARD_FRAME)?;

        assert_eq!(frame.encode(), STANDARD_FRAME, "encoding should be correct");

        Ok(())
    }

    #[test]
    fn error_incorrect_checksum() {
        init_logger();

        let mut raw = STANDARD_FRAME;

        raw[10] ^= 0x01;

        assert_eq!(
            Frame::decode(&raw),
            Err(DecodeError::IncorrectChecksum {
                expected: 0x0263,
                actual: 0x0262
            }),
            "result should be incorrect checksum error"
        );
    }

    #[test]
    fn error_length() {
        init_logger();

        assert_eq!(
            Frame::decode(&STANDARD_FRAME[..31]),
            Err(DecodeError::LengthMismatch {
                declared: 32,
                actual: 31
            }),
            "result should be length mismatch error"
        );
        assert_eq!(
            Frame::decode(&[0x42, 0x4d]),
            Err(DecodeError::LengthMismatch {
                declared: 4,
                actual: 2
            }),
            "result should be length mismatch error"
        );
        assert_eq!(
            Frame::decode(&[0x42, 0x4d, 0x00, 0x04, 0xe1, 0x00, 0x01, 0x74]),
            Err(DecodeError::UnsupportedLength(4)),
            "result should be unsupported length error"
        );
    }

    #[test]
    fn error_markers() {
        init_logger();

        let mut raw = STANDARD_FRAME;

        raw[1] = 0x4e;

        assert_eq!(
            Frame::decode(&raw),
            Err(DecodeError::InvalidMarkers),
            "result should be invalid markers error"
        );
    }
}
