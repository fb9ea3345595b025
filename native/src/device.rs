// EVGA peripheral device: pipe connection lifecycle and logo color streaming.

use crate::color::{Color, DeviceKey, KeyColors};
use crate::config::SettingsHandle;
use crate::error::DeviceError;
use crate::ipc::transport::remove_endpoint;
use crate::ipc::{pipe_path, ColorFrame, PipeListener, PipeWriter};
use crate::logging::{ErrorSink, LogErrorSink};
use crate::status;
use log::{debug, info, warn};
use std::mem::ManuallyDrop;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const DEVICE_NAME: &str = "EVGA";

/// The single key this device renders.
pub const LOGO_KEY: DeviceKey = DeviceKey::PeripheralLogo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Uninitialized = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Uninitialized,
        }
    }
}

/// Contract between the host's device manager and a lighting device.
pub trait Device {
    fn device_name(&self) -> &str;
    fn device_details(&self) -> String;

    /// Start connecting. Returns false if already connecting or connected.
    fn initialize(&self) -> bool;
    fn shutdown(&self);

    /// Forget the last sent color so the next update is always transmitted.
    fn reset(&self);
    fn reconnect(&self) -> Result<bool, DeviceError>;
    fn is_connected(&self) -> Result<bool, DeviceError>;
    fn is_initialized(&self) -> bool;
    fn is_keyboard_connected(&self) -> bool;
    fn is_peripheral_connected(&self) -> bool;

    /// Push one frame of host colors. Returns false on failure, including a
    /// transport failure that shut the device down.
    fn update_device(&self, key_colors: &KeyColors, forced: bool) -> bool;
    fn device_update_performance(&self) -> String;
}

struct Acceptor {
    cancel: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

struct Session {
    // Bumped on every shutdown so a late accept can tell it is stale.
    id: u64,
    endpoint: Option<PathBuf>,
    acceptor: Option<Acceptor>,
    writer: Option<PipeWriter>,
    write_timeout: Duration,
    last_color: Color,
}

impl Session {
    fn new() -> Self {
        Self {
            id: 0,
            endpoint: None,
            acceptor: None,
            writer: None,
            write_timeout: Duration::ZERO,
            last_color: Color::BLACK,
        }
    }
}

struct Shared {
    session: Mutex<Session>,
    state: AtomicU8,
    sink: Arc<dyn ErrorSink>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    // Only called with the session lock held.
    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Streams the logo color to the consumer whenever it changes.
///
/// All state transitions and every send happen under one device lock. The
/// connection state is mirrored in an atomic so status queries never wait on it.
///
/// Host-facing calls are synchronous and drive the device's own Tokio runtime,
/// so `initialize`, `update_device` and friends must not be called from inside
/// another Tokio runtime. Dropping the device is the exception: inside a
/// runtime it tears down without blocking and discards unflushed bytes.
pub struct EvgaDevice {
    shared: Arc<Shared>,
    settings: SettingsHandle,
    last_update_ms: AtomicU64,
    // Taken in `Drop`, which picks how to shut it down.
    runtime: ManuallyDrop<Runtime>,
}

impl EvgaDevice {
    pub fn new(settings: SettingsHandle) -> Result<Self, DeviceError> {
        Self::with_sink(settings, Arc::new(LogErrorSink))
    }

    pub fn with_sink(
        settings: SettingsHandle,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, DeviceError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("evga-pipe")
            .enable_all()
            .build()
            .map_err(|e| DeviceError::Runtime(e.to_string()))?;

        Ok(Self {
            shared: Arc::new(Shared {
                session: Mutex::new(Session::new()),
                state: AtomicU8::new(ConnectionState::Uninitialized as u8),
                sink,
            }),
            settings,
            last_update_ms: AtomicU64::new(0),
            runtime: ManuallyDrop::new(runtime),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn settings(&self) -> &SettingsHandle {
        &self.settings
    }

    /// The color most recently written to the pipe.
    pub fn last_color(&self) -> Color {
        self.shared.lock().last_color
    }

    /// Send `color` if it differs from the last one sent, or if `forced`.
    ///
    /// Returns whether a frame was written. Nothing is written while
    /// peripheral devices are disabled. A transport failure is reported to
    /// the error sink and shuts the device down before the error is returned.
    pub fn send_color(&self, color: Color, forced: bool) -> Result<bool, DeviceError> {
        let mut session = self.shared.lock();

        if !forced && session.last_color == color {
            return Ok(false);
        }

        if !self.settings.allow_peripheral_devices() {
            return Ok(false);
        }

        let timeout = session.write_timeout;
        let writer = session.writer.as_mut().ok_or(DeviceError::NotConnected)?;

        match self
            .runtime
            .block_on(writer.write_frame(&ColorFrame::new(color), timeout))
        {
            Ok(()) => {
                session.last_color = color;
                Ok(true)
            }
            Err(e) => {
                self.shared
                    .sink
                    .error(&format!("Failed to send {} to {}: {}", color, DEVICE_NAME, e));

                // The consumer is gone or stalled, so a flush on close would block again.
                if let Some(writer) = session.writer.take() {
                    if let Err(close_err) = writer.abandon() {
                        warn!("[EVGA] Error while dropping pipe (ignored): {}", close_err);
                    }
                }
                self.shutdown_locked(&mut session);
                Err(e)
            }
        }
    }

    fn update_keys(&self, key_colors: &KeyColors, forced: bool) -> Result<bool, DeviceError> {
        let color = key_colors
            .get(&LOGO_KEY)
            .copied()
            .ok_or(DeviceError::MissingKey(LOGO_KEY))?;

        self.send_color(color, forced)
    }

    fn start_accept(&self, session: &mut Session) -> Result<(), DeviceError> {
        let settings = self.settings.load();
        let path = pipe_path(&settings.pipe_name);

        let listener = {
            let _guard = self.runtime.enter();
            PipeListener::bind(&path)?
        };

        let (cancel_tx, cancel_rx) = oneshot::channel();
        let task = self.runtime.spawn(accept_consumer(
            Arc::clone(&self.shared),
            listener,
            session.id,
            cancel_rx,
        ));

        session.endpoint = Some(path);
        session.write_timeout = settings.write_timeout();
        session.acceptor = Some(Acceptor {
            cancel: cancel_tx,
            task,
        });

        Ok(())
    }

    /// Tear down with the session lock already held. Never fails: teardown
    /// errors are logged and dropped.
    fn shutdown_locked(&self, session: &mut Session) {
        if self.state() == ConnectionState::Uninitialized {
            return;
        }

        if let Some(acceptor) = session.acceptor.take() {
            let _ = acceptor.cancel.send(());
            acceptor.task.abort();
        }

        if let Some(writer) = session.writer.take() {
            if Handle::try_current().is_ok() {
                // block_on would panic inside another runtime.
                if let Err(e) = writer.abandon() {
                    warn!("[EVGA] Error while dropping pipe (ignored): {}", e);
                }
            } else {
                let timeout = session.write_timeout;
                match self
                    .runtime
                    .block_on(async { tokio::time::timeout(timeout, writer.close()).await })
                {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("[EVGA] Error while closing pipe (ignored): {}", e),
                    Err(_) => warn!("[EVGA] Closing pipe timed out after {:?}", timeout),
                }
            }
        }

        if let Some(path) = session.endpoint.take() {
            remove_endpoint(&path);
        }

        session.last_color = Color::BLACK;
        session.id = session.id.wrapping_add(1);
        self.shared.set_state(ConnectionState::Uninitialized);

        info!("[EVGA] Device shut down");
    }
}

/// Background half of `initialize`: wait for the consumer, then publish the writer.
async fn accept_consumer(
    shared: Arc<Shared>,
    listener: PipeListener,
    session_id: u64,
    cancel: oneshot::Receiver<()>,
) {
    let result = listener.accept(cancel).await;

    let mut session = shared.lock();
    let current = session.id == session_id && shared.state() == ConnectionState::Connecting;

    match result {
        Ok(Some(writer)) if current => {
            session.writer = Some(writer);
            session.acceptor = None;
            shared.set_state(ConnectionState::Connected);
            info!("[EVGA] Consumer connected");
        }
        Ok(Some(writer)) => {
            debug!("[EVGA] Dropping consumer accepted for a closed session");
            drop(writer);
        }
        Ok(None) => {}
        Err(e) if current => {
            shared
                .sink
                .error(&format!("Waiting for the {} consumer failed: {}", DEVICE_NAME, e));
            session.acceptor = None;
            if let Some(path) = session.endpoint.take() {
                remove_endpoint(&path);
            }
            session.id = session.id.wrapping_add(1);
            shared.set_state(ConnectionState::Uninitialized);
        }
        Err(e) => debug!("[EVGA] Stale accept failed: {}", e),
    }
}

impl Device for EvgaDevice {
    fn device_name(&self) -> &str {
        DEVICE_NAME
    }

    fn device_details(&self) -> String {
        status::device_details(self.state()).to_string()
    }

    fn initialize(&self) -> bool {
        let mut session = self.shared.lock();

        if self.state() != ConnectionState::Uninitialized {
            return false;
        }

        if let Err(e) = self.start_accept(&mut session) {
            self.shared
                .sink
                .error(&format!("Failed to open the {} pipe: {}", DEVICE_NAME, e));
            return false;
        }

        self.shared.set_state(ConnectionState::Connecting);
        info!("[EVGA] Waiting for consumer");
        true
    }

    fn shutdown(&self) {
        let mut session = self.shared.lock();
        self.shutdown_locked(&mut session);
    }

    fn reset(&self) {
        self.shared.lock().last_color = Color::BLACK;
    }

    fn reconnect(&self) -> Result<bool, DeviceError> {
        Err(DeviceError::Unsupported("reconnect"))
    }

    fn is_connected(&self) -> Result<bool, DeviceError> {
        Err(DeviceError::Unsupported("connectivity check"))
    }

    fn is_initialized(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    fn is_keyboard_connected(&self) -> bool {
        self.is_initialized()
    }

    fn is_peripheral_connected(&self) -> bool {
        self.is_initialized()
    }

    fn update_device(&self, key_colors: &KeyColors, forced: bool) -> bool {
        let started = Instant::now();
        let result = self.update_keys(key_colors, forced);
        self.last_update_ms
            .store(started.elapsed().as_millis() as u64, Ordering::Relaxed);

        match result {
            Ok(_) => true,
            Err(DeviceError::NotConnected) => {
                debug!("[EVGA] Update skipped, consumer not connected");
                false
            }
            Err(e @ DeviceError::MissingKey(_)) => {
                self.shared.sink.error(&format!("Update rejected: {}", e));
                false
            }
            // Transport failures are reported before the device shuts down.
            Err(_) => false,
        }
    }

    fn device_update_performance(&self) -> String {
        status::update_performance(self.state(), self.last_update_ms.load(Ordering::Relaxed))
    }
}

impl Drop for EvgaDevice {
    fn drop(&mut self) {
        self.shutdown();

        // SAFETY: `runtime` is not used again after this point.
        let runtime = unsafe { ManuallyDrop::take(&mut self.runtime) };
        if Handle::try_current().is_ok() {
            // A plain drop waits for worker threads, which panics inside a runtime.
            runtime.shutdown_background();
        } else {
            drop(runtime);
        }
    }
}
