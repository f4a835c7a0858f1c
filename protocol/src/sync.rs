//! Byte-at-a-time frame synchronization.

use crate::frame::{
    CHECKSUM_LEN, DecodeError, Frame, HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, START_1, START_2,
};
use log::{debug, trace, warn};

/// State of the [`Synchronizer`].
#[derive(strum::Display, PartialEq, Eq, Copy, Clone, Debug)]
pub enum State {
    /// Discarding bytes until the first marker appears.
    SeekStart1,
    /// Expecting the second marker.
    SeekStart2,
    /// Expecting the high byte of the payload length.
    SeekLenHi,
    /// Expecting the low byte of the payload length.
    SeekLenLo,
    /// Collecting the declared number of payload bytes.
    AccumulatePayload,
}

/// Locates frame boundaries in an arbitrarily fragmented byte stream.
///
/// Bytes are pushed one at a time. Once a complete frame has been collected,
/// it is validated and returned; corrupted, oversized or unknown frames are
/// dropped. Either way the synchronizer starts looking for the next frame
/// marker, so it can recover from any byte position.
///
/// While collecting the payload only the declared length counts, marker bytes
/// inside the payload do not restart synchronization.
#[derive(Debug)]
pub struct Synchronizer {
    state: State,
    window: [u8; MAX_FRAME_LEN],
    len: usize,
    payload_len: u16,
    received: u16,
    frames: u64,
    dropped: u64,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Synchronizer {
    /// Constructs a new synchronizer looking for the first frame marker.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::SeekStart1,
            window: [0x00; MAX_FRAME_LEN],
            len: 0,
            payload_len: 0,
            received: 0,
            frames: 0,
            dropped: 0,
        }
    }

    /// Returns the current state.
    #[must_use]
    pub const fn state(&self) -> State {
        self.state
    }

    /// Returns the number of frames validated so far.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Returns the number of candidate frames dropped so far.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Abandons the frame currently being collected.
    pub fn reset(&mut self) {
        self.state = State::SeekStart1;
        self.len = 0;
    }

    /// Advances the state machine by a single byte.
    ///
    /// Returns the frame completed by this byte, if it passed validation.
    pub fn push(&mut self, byte: u8) -> Option<Frame> {
        match self.state {
            State::SeekStart1 => self.seek_start(byte),
            State::SeekStart2 => {
                if byte == START_2 {
                    self.append(byte);
                    self.state = State::SeekLenHi;
                } else {
                    trace!("Spurious frame start, got {byte:#04x} after first marker");
                    // The byte might open the real frame
                    self.reset();
                    self.seek_start(byte);
                }
            }
            State::SeekLenHi => {
                self.append(byte);
                self.state = State::SeekLenLo;
            }
            State::SeekLenLo => {
                self.append(byte);

                let len = u16::from_be_bytes([self.window[2], self.window[3]]);

                if (CHECKSUM_LEN..=usize::from(MAX_PAYLOAD_LEN)).contains(&usize::from(len)) {
                    self.payload_len = len;
                    self.received = 0;
                    self.state = State::AccumulatePayload;
                } else {
                    debug!("Dropping frame with out-of-range length {len}");
                    self.dropped += 1;
                    self.reset();
                }
            }
            State::AccumulatePayload => {
                self.append(byte);
                self.received += 1;

                if self.received == self.payload_len {
                    let frame = self.complete();

                    self.reset();

                    return frame;
                }
            }
        }

        None
    }

    /// Pushes a chunk of bytes, returning every frame completed by it.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<Frame> {
        bytes.iter().filter_map(|&byte| self.push(byte)).collect()
    }

    fn seek_start(&mut self, byte: u8) {
        if byte == START_1 {
            self.len = 0;
            self.append(byte);
            self.state = State::SeekStart2;
        }
    }

    fn append(&mut self, byte: u8) {
        // Declared length is bounded by MAX_PAYLOAD_LEN, so the window never overflows
        self.window[self.len] = byte;
        self.len += 1;
    }

    fn complete(&mut self) -> Option<Frame> {
        let raw = &self.window[..self.len];

        debug_assert_eq!(raw.len(), HEADER_LEN + usize::from(self.payload_len));

        match Frame::decode(raw) {
            Ok(frame) => {
                trace!("Frame complete: {raw:02x?}");
                self.frames += 1;

                Some(frame)
            }
            Err(err @ DecodeError::IncorrectChecksum { .. }) => {
                warn!("Dropping frame: {err}");
                self.dropped += 1;

                None
            }
            Err(err) => {
                debug!("Dropping frame: {err}");
                self.dropped += 1;

                None
            }
        }
    }
}
