use core::time::Duration;

/// Policy for the handshake performed while opening a [`Session`](crate::Session).
#[derive(PartialEq, Eq, Copy, Clone, Default, Debug)]
pub enum Handshake {
    /// Open without talking to the sensor.
    Skip,
    /// Wake the sensor, select passive mode and request a frame.
    ///
    /// The session is returned even if the sensor stays silent;
    /// [`Session::is_ready`](crate::Session::is_ready) then reports `false`.
    #[default]
    BestEffort,
    /// Like [`Handshake::BestEffort`], but opening fails with
    /// [`Error::NotReady`](crate::Error::NotReady) if the sensor stays silent.
    Required,
}

/// Configuration settings for a [`Session`](crate::Session).
#[derive(PartialEq, Eq, Copy, Clone, Debug)]
pub struct Config {
    /// Pause after every mode change before further commands are accepted.
    pub settle_delay: Duration,
    /// Handshake policy applied while opening.
    pub handshake: Handshake,
    /// Time to wait for the handshake frame.
    pub handshake_timeout: Duration,
    /// Stack size of the receive worker thread in bytes.
    pub worker_stack_size: usize,
}

impl Config {
    /// Sets the pause after mode changes.
    #[must_use]
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Sets the handshake policy.
    #[must_use]
    pub fn handshake(mut self, handshake: Handshake) -> Self {
        self.handshake = handshake;
        self
    }

    /// Sets the time to wait for the handshake frame.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the stack size of the receive worker thread.
    #[must_use]
    pub fn worker_stack_size(mut self, size: usize) -> Self {
        self.worker_stack_size = size;
        self
    }
}

impl Default for Config {
    /// Returns the default configuration.
    ///
    /// Waits 100 ms after mode changes and up to 3 s for a best-effort handshake.
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(100),
            handshake: Handshake::BestEffort,
            handshake_timeout: Duration::from_secs(3),
            worker_stack_size: 64 * 1024,
        }
    }
}
