//! RFCOMM / serial tty transport
//!
//! The remote's serial profile appears as a character device once bound
//! (`rfcomm bind 0 <addr>` gives `/dev/rfcomm0`). One link worker thread
//! owns the file descriptor for its whole life:
//!
//! ```text
//! open (bounded retries) -> raw mode -> read loop -> close -> open ...
//! ```
//!
//! The read loop uses a VTIME read timeout so it can notice shutdown and
//! reconnect requests while the remote is silent.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use nix::sys::termios::{self, SetArg, SpecialCharacterIndices};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};

use crate::buffer::SharedBuffer;
use crate::error::TransportError;
use crate::types::{TransportDeviceInfo, TransportType};
use crate::{ByteSource, LinkObserver, ObserverSlot, DEFAULT_BUFFER_CAPACITY};

/// Connection settings for a tty transport
#[derive(Debug, Clone)]
pub struct TtyConfig {
    /// Device node, e.g. `/dev/rfcomm0`
    pub path: PathBuf,
    /// Open attempts per connection episode before giving up
    pub max_connection_retries: u32,
    /// Pause between open attempts
    pub retry_delay: Duration,
    /// How long a read may wait for data (rounded to deciseconds, min 0.1 s)
    pub read_timeout: Duration,
    /// Byte buffer capacity
    pub buffer_capacity: usize,
}

impl Default for TtyConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/rfcomm0"),
            max_connection_retries: 3,
            retry_delay: Duration::from_secs(1),
            read_timeout: Duration::from_millis(100),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

/// Flags shared between the transport handle and its worker
struct LinkShared {
    buffer: SharedBuffer,
    observer: ObserverSlot,
    connected: AtomicBool,
    reconnect: AtomicBool,
    shutdown: AtomicBool,
}

/// Byte source backed by a tty device node
pub struct TtyTransport {
    config: TtyConfig,
    info: TransportDeviceInfo,
    shared: Arc<LinkShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl TtyTransport {
    pub fn new(config: TtyConfig) -> Self {
        let path = config.path.to_string_lossy().into_owned();
        let info = TransportDeviceInfo {
            transport_type: TransportType::from_path(&path),
            device_path: path,
            name: None,
        };
        let shared = Arc::new(LinkShared {
            buffer: SharedBuffer::new(config.buffer_capacity),
            observer: ObserverSlot::default(),
            connected: AtomicBool::new(false),
            reconnect: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        Self {
            config,
            info,
            shared,
            worker: Mutex::new(None),
        }
    }

    fn spawn_worker(&self) -> Result<JoinHandle<()>, TransportError> {
        self.shared.shutdown.store(false, Ordering::SeqCst);
        let worker = LinkWorker {
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        };
        let handle = std::thread::Builder::new()
            .name("gyromouse-link".into())
            .spawn(move || worker.run())?;
        Ok(handle)
    }
}

impl ByteSource for TtyTransport {
    fn set_observer(&self, observer: Weak<dyn LinkObserver>) {
        self.shared.observer.set(observer);
    }

    fn connect(&self) -> Result<(), TransportError> {
        let mut worker = self.worker.lock();
        if let Some(handle) = worker.as_ref() {
            if !handle.is_finished() {
                debug!("Link worker already running");
                return Ok(());
            }
        }
        *worker = Some(self.spawn_worker()?);
        Ok(())
    }

    fn request_reconnect(&self) {
        let running = self
            .worker
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished());
        if running {
            if self.shared.connected.load(Ordering::SeqCst) {
                info!("Reconnect requested for {}", self.info.display_name());
                self.shared.reconnect.store(true, Ordering::SeqCst);
            } else {
                debug!("Link worker is already reconnecting");
            }
        } else if let Err(e) = self.connect() {
            warn!("Failed to restart link worker: {}", e);
        }
    }

    fn close(&self) -> Result<(), TransportError> {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.buffer.close();

        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            if handle.thread().id() == std::thread::current().id() {
                // Called from an observer callback; the worker exits on its own
                return Ok(());
            }
            handle
                .join()
                .map_err(|_| TransportError::Internal("link worker panicked".into()))?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    fn bytes_available(&self) -> usize {
        self.shared.buffer.available()
    }

    fn read_byte(&self) -> Result<u8, TransportError> {
        self.shared.buffer.read_byte()
    }

    fn read_bytes(&self, count: usize) -> Result<Vec<u8>, TransportError> {
        self.shared.buffer.read_exact(count)
    }

    fn discard(&self, count: usize) -> usize {
        self.shared.buffer.discard(count)
    }

    fn device_info(&self) -> &TransportDeviceInfo {
        &self.info
    }
}

impl Drop for TtyTransport {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Why the read loop returned
#[derive(Debug)]
enum LinkExit {
    Shutdown,
    ReconnectRequested,
    Failed(TransportError),
}

struct LinkWorker {
    config: TtyConfig,
    shared: Arc<LinkShared>,
}

impl LinkWorker {
    fn run(self) {
        debug!("Link worker started for {}", self.config.path.display());

        while !self.shared.shutdown.load(Ordering::SeqCst) {
            self.shared.reconnect.store(false, Ordering::SeqCst);

            let (mut file, is_tty) = match self.open_with_retries() {
                Ok(opened) => opened,
                Err(LinkExit::Failed(e)) => {
                    warn!("Giving up on {}: {}", self.config.path.display(), e);
                    self.shared.observer.notify(|o| o.on_link_failed(&e));
                    break;
                }
                Err(_) => break,
            };

            self.shared.buffer.open();
            self.shared.connected.store(true, Ordering::SeqCst);
            info!("Connected to {}", self.config.path.display());
            self.shared.observer.notify(|o| o.on_connected());

            let exit = self.read_loop(&mut file, is_tty);

            self.shared.connected.store(false, Ordering::SeqCst);
            self.shared.buffer.close();
            drop(file);

            match exit {
                LinkExit::Shutdown => break,
                LinkExit::ReconnectRequested => {
                    info!("Reopening {}", self.config.path.display());
                }
                LinkExit::Failed(e) => {
                    warn!("Link to {} lost: {}", self.config.path.display(), e);
                    self.shared.observer.notify(|o| o.on_disconnected());
                }
            }
        }

        debug!("Link worker exiting");
    }

    /// Open the device, retrying up to the configured limit
    fn open_with_retries(&self) -> Result<(File, bool), LinkExit> {
        let attempts = self.config.max_connection_retries.max(1);
        for attempt in 1..=attempts {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return Err(LinkExit::Shutdown);
            }
            match open_device(&self.config.path, self.config.read_timeout) {
                Ok(opened) => return Ok(opened),
                Err(e) => {
                    warn!(
                        "Failed to open {} (attempt {}/{}): {}",
                        self.config.path.display(),
                        attempt,
                        attempts,
                        e
                    );
                    if attempt < attempts && !self.sleep_unless_shutdown(self.config.retry_delay) {
                        return Err(LinkExit::Shutdown);
                    }
                }
            }
        }
        Err(LinkExit::Failed(TransportError::RetriesExhausted(attempts)))
    }

    fn read_loop(&self, file: &mut File, is_tty: bool) -> LinkExit {
        let mut buf = [0u8; 64];
        loop {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return LinkExit::Shutdown;
            }
            if self.shared.reconnect.load(Ordering::SeqCst) {
                return LinkExit::ReconnectRequested;
            }

            match file.read(&mut buf) {
                // VTIME expired with no data
                Ok(0) if is_tty => continue,
                Ok(0) => return LinkExit::Failed(TransportError::Disconnected),
                Ok(len) => {
                    trace!("Read {} bytes: {:02X?}", len, &buf[..len.min(16)]);
                    self.shared.buffer.push(&buf[..len]);
                    self.shared.observer.notify(|o| o.on_data());
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return LinkExit::Failed(e.into()),
            }
        }
    }

    /// Sleep in short steps; false if shutdown was requested meanwhile
    fn sleep_unless_shutdown(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            if self.shared.shutdown.load(Ordering::SeqCst) {
                return false;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        !self.shared.shutdown.load(Ordering::SeqCst)
    }
}

/// Open a device node and put it in raw mode if it is a tty
///
/// Returns the file and whether it is a tty.
fn open_device(path: &Path, read_timeout: Duration) -> Result<(File, bool), TransportError> {
    let file = OpenOptions::new().read(true).open(path).map_err(|e| {
        if e.kind() == ErrorKind::NotFound {
            TransportError::DeviceNotFound(path.display().to_string())
        } else {
            TransportError::Io(e)
        }
    })?;

    let mut attrs = match termios::tcgetattr(&file) {
        Ok(attrs) => attrs,
        Err(nix::errno::Errno::ENOTTY) => {
            debug!("{} is not a tty, reading as a plain stream", path.display());
            return Ok((file, false));
        }
        Err(e) => return Err(e.into()),
    };

    termios::cfmakeraw(&mut attrs);
    attrs.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    attrs.control_chars[SpecialCharacterIndices::VTIME as usize] = vtime_deciseconds(read_timeout);
    termios::tcsetattr(&file, SetArg::TCSANOW, &attrs)?;

    Ok((file, true))
}

/// VTIME is in tenths of a second, 1..=255
fn vtime_deciseconds(timeout: Duration) -> u8 {
    (timeout.as_millis() / 100).clamp(1, 255) as u8
}
