//! Sensor session with a background receive worker.

use crate::{
    Config, Error, Handshake, Result,
    command::{Command, send_command},
    frame::Frame,
    sync::Synchronizer,
};
use core::time::Duration;
use embedded_io_async::{Read, Write};
use log::{debug, error, trace, warn};
use std::{
    io,
    sync::{Arc, Mutex, OnceLock, PoisonError},
    thread::{self, JoinHandle},
};
use tokio::{
    runtime::Handle,
    sync::{Mutex as AsyncMutex, Semaphore, oneshot},
    time,
};

// Bytes requested from the port per read
const RX_BUFFER_SIZE: usize = 64;

/// State shared between the session and its receive worker.
#[derive(Debug)]
struct Shared {
    /// Most recently validated frame, written by the worker only.
    latest: Mutex<Option<Frame>>,
    /// Holds a permit while a published frame has not been consumed.
    new_frame: Semaphore,
    /// Protocol version of the first validated frame.
    version: OnceLock<u8>,
}

impl Shared {
    fn new() -> Self {
        Self {
            latest: Mutex::new(None),
            new_frame: Semaphore::new(0),
            version: OnceLock::new(),
        }
    }

    fn publish(&self, frame: Frame) {
        if self.version.set(frame.version).is_ok() {
            debug!("Sensor ready, protocol version {:#04x}", frame.version);
        }

        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);

        // At most one unconsumed signal, only the worker adds permits
        if self.new_frame.available_permits() == 0 {
            self.new_frame.add_permits(1);
        }
    }

    fn latest(&self) -> Option<Frame> {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Discards signals for frames published before now.
    fn clear_pending(&self) {
        while let Ok(permit) = self.new_frame.try_acquire() {
            permit.forget();
        }
    }

    /// Waits for the next published frame.
    ///
    /// Returns `None` once the semaphore has been closed.
    async fn next_frame(&self) -> Option<Frame> {
        loop {
            self.new_frame.acquire().await.ok()?.forget();

            if let Some(frame) = self.latest() {
                return Some(frame);
            }
        }
    }
}

/// Handle to the receive worker thread.
#[derive(Debug)]
struct Worker {
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    /// Spawns a dedicated thread feeding the port's bytes into a [`Synchronizer`].
    ///
    /// The thread drives its future on the given runtime handle, so reads
    /// of ports registered with that runtime make progress.
    fn spawn<R: Read + Send + 'static>(
        reader: R,
        shared: Arc<Shared>,
        handle: Handle,
        stack_size: usize,
    ) -> io::Result<Self> {
        let (tx, rx) = oneshot::channel();
        let thread = thread::Builder::new()
            .name("pms-rx".into())
            .stack_size(stack_size)
            .spawn(move || handle.block_on(receive(reader, &shared, rx)))?;

        debug!("Receive worker started");

        Ok(Self {
            shutdown: Some(tx),
            thread: Some(thread),
        })
    }

    /// Signals the worker to detach from the port and waits for it to exit.
    fn stop(&mut self) {
        // Dropping the sender wakes the worker
        drop(self.shutdown.take());

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Receive worker panicked");
            } else {
                debug!("Receive worker joined");
            }
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receive loop run by the worker thread.
///
/// Stops on shutdown, end-of-file or a port error. Afterwards the semaphore
/// is closed so that waiting callers are not left hanging.
async fn receive<R: Read>(mut reader: R, shared: &Shared, mut shutdown: oneshot::Receiver<()>) {
    let mut sync = Synchronizer::new();
    let mut buf = [0x00; RX_BUFFER_SIZE];

    loop {
        let len = tokio::select! {
            _ = &mut shutdown => {
                debug!("Receive worker detached from port");
                break;
            }
            res = reader.read(&mut buf) => match res {
                Ok(0) => {
                    warn!("Port reached end-of-file");
                    break;
                }
                Ok(len) => len,
                Err(err) => {
                    error!("Error reading from port: {err:?}");
                    break;
                }
            },
        };

        trace!("Read from port: {:02x?}", &buf[..len]);

        for &byte in &buf[..len] {
            if let Some(frame) = sync.push(byte) {
                shared.publish(frame);
            }
        }
    }

    shared.new_frame.close();

    debug!(
        "Receive worker stopped, {} frames validated, {} dropped",
        sync.frames(),
        sync.dropped()
    );
}

/// An open connection to a sensor.
///
/// A session owns the port's writer, which carries the mode commands, and a
/// worker thread that owns the port's reader. The worker validates incoming
/// frames and publishes the latest one, waking up callers blocked in
/// [`Session::read`] or [`Session::wait`].
///
/// All waiting methods take `&self`, so a session can be shared between
/// concurrent callers. Each published frame wakes a single waiting caller,
/// and every caller receives a complete copy of the latest frame.
///
/// Dropping the session closes it, see [`Session::close`].
#[derive(Debug)]
pub struct Session<W> {
    worker: Option<Worker>,
    shared: Arc<Shared>,
    config: Config,
    // Closed last
    writer: AsyncMutex<Option<W>>,
}

impl<W: Write> Session<W> {
    /// Opens a session on a port split into reader and writer.
    ///
    /// Spawns the receive worker and, unless disabled in the [`Config`], performs
    /// the startup handshake: the sensor is woken, switched to passive mode and
    /// asked for a frame. Whether a silent sensor fails the call is decided by
    /// [`Config::handshake`](Config#structfield.handshake).
    ///
    /// Must be called from within a tokio runtime. Resources acquired before a
    /// failure are released again in reverse order.
    ///
    /// # Errors
    ///
    /// - [`Error::NoRuntime`] if called outside a tokio runtime.
    /// - [`Error::Spawn`] if the worker thread cannot be created.
    /// - [`Error::NotReady`] if the handshake is required but the sensor stays silent.
    /// - [`Error::Io`] if writing a handshake command fails.
    pub async fn open_with<R>(reader: R, writer: W, config: Config) -> Result<Self, W::Error>
    where
        R: Read + Send + 'static,
    {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let shared = Arc::new(Shared::new());
        let worker = Worker::spawn(
            reader,
            Arc::clone(&shared),
            handle,
            config.worker_stack_size,
        )
        .map_err(|err| {
            error!("Failed to spawn receive worker: {err}");
            Error::Spawn
        })?;
        let sess = Self {
            worker: Some(worker),
            shared,
            config,
            writer: AsyncMutex::new(Some(writer)),
        };

        if config.handshake != Handshake::Skip {
            sess.handshake().await?;
        }

        Ok(sess)
    }

    /// Requests a frame in passive mode and waits for it.
    ///
    /// Frames that arrived before the request are ignored, so the returned
    /// frame was completed after the request was sent. On timeout, the latest
    /// frame is left untouched.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no frame arrives within `timeout`.
    /// - [`Error::Closed`] if the session or its worker has stopped.
    pub async fn read(&self, timeout: Duration) -> Result<Frame, W::Error> {
        self.shared.clear_pending();
        self.send(Command::ReadPassive).await?;
        self.receive(Some(timeout)).await
    }

    /// Waits for the next frame pushed by the sensor in active mode.
    ///
    /// No command is sent and there is no deadline.
    ///
    /// # Errors
    ///
    /// - [`Error::Closed`] if the session or its worker has stopped.
    pub async fn wait(&self) -> Result<Frame, W::Error> {
        self.receive(None).await
    }

    /// Like [`Session::wait`], but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if no frame arrives within `timeout`.
    /// - [`Error::Closed`] if the session or its worker has stopped.
    pub async fn wait_timeout(&self, timeout: Duration) -> Result<Frame, W::Error> {
        self.receive(Some(timeout)).await
    }

    /// Sends a mode command and waits for the sensor to settle.
    ///
    /// No other command is written until the settle delay has passed.
    pub async fn set_mode(&self, cmd: Command) -> Result<(), W::Error> {
        let mut writer = self.writer.lock().await;
        let port = writer.as_mut().ok_or(Error::Closed)?;

        debug!("Switching sensor mode: {cmd}");
        send_command(port, cmd).await?;
        time::sleep(self.config.settle_delay).await;

        Ok(())
    }

    async fn send(&self, cmd: Command) -> Result<(), W::Error> {
        let mut writer = self.writer.lock().await;
        let port = writer.as_mut().ok_or(Error::Closed)?;

        send_command(port, cmd).await
    }

    async fn receive(&self, timeout: Option<Duration>) -> Result<Frame, W::Error> {
        let next = self.shared.next_frame();
        match timeout {
            Some(timeout) => time::timeout(timeout, next)
                .await
                .map_err(|_| Error::Timeout)?,
            None => next.await,
        }
        .ok_or(Error::Closed)
    }

    async fn handshake(&self) -> Result<(), W::Error> {
        self.set_mode(Command::EnterNormal).await?;
        self.set_mode(Command::EnterPassive).await?;

        match self.read(self.config.handshake_timeout).await {
            Ok(_) => Ok(()),
            Err(Error::Timeout) if self.config.handshake == Handshake::BestEffort => {
                warn!("No response from sensor, continuing without handshake");

                Ok(())
            }
            Err(Error::Timeout) => {
                warn!("No response from sensor");

                Err(Error::NotReady)
            }
            Err(err) => Err(err),
        }
    }
}

impl<W> Session<W> {
    /// Returns `true` once the worker has validated a frame since opening.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.version.get().is_some()
    }

    /// Returns the sensor's protocol version, if known.
    #[must_use]
    pub fn version(&self) -> Option<u8> {
        self.shared.version.get().copied()
    }

    /// Returns the latest validated frame without waiting.
    #[must_use]
    pub fn latest(&self) -> Option<Frame> {
        self.shared.latest()
    }

    /// Closes the session.
    ///
    /// Stops and joins the receive worker, wakes up all waiting callers with
    /// [`Error::Closed`], discards the latest frame and closes the port.
    /// Calling this more than once has no further effect.
    pub fn close(&mut self) {
        if let Some(mut worker) = self.worker.take() {
            worker.stop();
        }

        self.shared.new_frame.close();
        self.shared
            .latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if self.writer.get_mut().take().is_some() {
            debug!("Session closed");
        }
    }
}

impl<W> Drop for Session<W> {
    fn drop(&mut self) {
        self.close();
    }
}
