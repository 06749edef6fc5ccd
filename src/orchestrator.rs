//! Pipeline orchestration
//!
//! `Pipeline` owns every piece of cross-thread state behind one mutex and
//! is the single observer of its byte source. Three contexts drive it:
//!
//! - the transport thread (`on_connected`, `on_data`, ...)
//! - the extrapolation ticker
//! - the caller's watchdog poll (`check_link`)
//!
//! Handlers run under the state lock and return a list of effects (start or
//! stop the ticker, ask the transport to reconnect). Effects are applied
//! after the lock is released, so stopping the ticker can wait for an
//! in-flight tick without deadlocking on the state it needs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use gyromouse_pointer::{PointerButton, PointerError, PointerSink};
use gyromouse_transport::{
    BoxedByteSource, Buttons, ByteSource, FrameSynchronizer, LinkObserver, PacketDecoder,
    ProtocolError, Sample, TransportError, PACKET_SIZE,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace, warn};

use crate::config::GyromouseConfig;
use crate::error::PipelineError;
use crate::extrapolation::ExtrapolationScheduler;
use crate::gesture::{GesturePhase, GestureStateMachine};
use crate::shaper::{MotionShaper, MotionVector};
use crate::ticker::{PeriodicScheduler, TickCallback, TickHandle};
use crate::watchdog::{ConnectionWatchdog, WatchdogStatus};

/// Bounded so a stalled subscriber cannot hold memory; it lags instead
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Which pipeline stage is consuming bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    /// Scanning for the packet boundary
    Synchronizing,
    /// Aligned; decoding packets
    Streaming,
}

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Connected,
    Aligned,
    /// An aligned packet failed its signature check
    Misaligned { byte: u8 },
    LinkWarning { silent: Duration },
    LinkStale { silent: Duration },
    Disconnected,
    ReconnectRequested,
    /// The run cannot continue; see `Pipeline::take_fatal`
    Fatal(String),
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub samples_decoded: u64,
    pub alignments: u64,
    pub misalignments: u64,
    pub link_stale: u64,
    pub reconnect_requests: u64,
    pub skipped_ticks: u64,
    pub sink_failures: u64,
    pub backlog_bytes_dropped: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Effect {
    StartTicker,
    StopTicker,
    RequestReconnect,
}

/// The gyro-to-pointer pipeline
pub struct Pipeline {
    core: Arc<PipelineCore>,
}

impl Pipeline {
    /// Build the pipeline and register it as `source`'s observer
    pub fn new(
        config: &GyromouseConfig,
        source: BoxedByteSource,
        sink: Box<dyn PointerSink>,
        scheduler: Arc<dyn PeriodicScheduler>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let state = PipelineState::new(config, sink, events.clone());

        let core = Arc::new_cyclic(|me| PipelineCore {
            me: me.clone(),
            source,
            scheduler,
            tick_period: config.timing.tick_period(),
            state: Mutex::new(state),
            ticker: Mutex::new(None),
            ticking: AtomicBool::new(false),
            skipped_ticks: AtomicU64::new(0),
            events,
        });

        let observer: Weak<PipelineCore> = Arc::downgrade(&core);
        let observer: Weak<dyn LinkObserver> = observer;
        core.source.set_observer(observer);

        Self { core }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.core.events.subscribe()
    }

    /// Ask the transport to connect; progress arrives as events
    pub fn start(&self) -> Result<(), PipelineError> {
        info!(
            "Starting pipeline on {}",
            self.core.source.device_info().display_name()
        );
        self.core.source.connect()?;
        Ok(())
    }

    /// Consume whatever the source has buffered
    pub fn process(&self, now: Instant) {
        self.core.process(now);
    }

    /// Run one extrapolation tick
    pub fn tick(&self, now: Instant) {
        self.core.tick(now);
    }

    /// Poll the watchdog; tears the link down when it has gone stale
    pub fn check_link(&self, now: Instant) -> WatchdogStatus {
        self.core.with_state(|s, fx| s.check_link(now, fx))
    }

    pub fn connection_phase(&self) -> ConnectionPhase {
        self.core.state.lock().phase
    }

    pub fn gesture_phase(&self) -> GesturePhase {
        self.core.state.lock().gesture.phase()
    }

    /// Last cooked pointer delta feeding extrapolation
    pub fn motion_vector(&self) -> MotionVector {
        self.core.state.lock().extrapolation.last_delta()
    }

    pub fn is_aligned(&self) -> bool {
        self.core.state.lock().sync.is_aligned()
    }

    /// True when the synchronizer holds no scan progress
    pub fn alignment_is_reset(&self) -> bool {
        self.core.state.lock().sync.is_pristine()
    }

    pub fn ticker_running(&self) -> bool {
        self.core.ticker.lock().is_some()
    }

    pub fn stats(&self) -> PipelineStats {
        let mut stats = self.core.state.lock().stats;
        stats.skipped_ticks = self.core.skipped_ticks.load(Ordering::Relaxed);
        stats
    }

    pub fn is_failed(&self) -> bool {
        self.core.state.lock().failed
    }

    /// Take the error that ended the run, if any
    pub fn take_fatal(&self) -> Option<PipelineError> {
        self.core.state.lock().fatal.take()
    }

    /// Release held buttons, stop ticking and close the source
    pub fn shutdown(&self) -> Result<(), PipelineError> {
        info!("Shutting down pipeline");
        self.core.with_state(|s, fx| s.shutdown(fx));
        self.core.source.close()?;
        Ok(())
    }
}

struct PipelineCore {
    me: Weak<PipelineCore>,
    source: BoxedByteSource,
    scheduler: Arc<dyn PeriodicScheduler>,
    tick_period: Duration,
    state: Mutex<PipelineState>,
    ticker: Mutex<Option<Box<dyn TickHandle>>>,
    /// Set while a tick runs; overlapping ticks are skipped
    ticking: AtomicBool,
    skipped_ticks: AtomicU64,
    events: broadcast::Sender<PipelineEvent>,
}

impl PipelineCore {
    fn with_state<R>(&self, f: impl FnOnce(&mut PipelineState, &mut Vec<Effect>) -> R) -> R {
        let mut effects = Vec::new();
        let result = {
            let mut state = self.state.lock();
            f(&mut state, &mut effects)
        };
        self.apply(effects);
        result
    }

    fn apply(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::StartTicker => self.start_ticker(),
                Effect::StopTicker => self.stop_ticker(),
                Effect::RequestReconnect => self.source.request_reconnect(),
            }
        }
    }

    fn process(&self, now: Instant) {
        let source = Arc::clone(&self.source);
        self.with_state(|s, fx| s.process(source.as_ref(), now, fx));
    }

    fn tick(&self, now: Instant) {
        if self.ticking.swap(true, Ordering::AcqRel) {
            self.skipped_ticks.fetch_add(1, Ordering::Relaxed);
            trace!("Tick overlapped a running tick, skipped");
            return;
        }
        self.state.lock().tick(now);
        self.ticking.store(false, Ordering::Release);
    }

    fn start_ticker(&self) {
        let mut slot = self.ticker.lock();
        if slot.is_some() {
            return;
        }
        // A teardown may have run between the alignment and now; its stop
        // waits on the slot lock, so checking here cannot miss it
        {
            let state = self.state.lock();
            if state.halted() || state.phase != ConnectionPhase::Streaming {
                debug!("Link no longer streaming, ticker not started");
                return;
            }
        }

        let core = self.me.clone();
        let callback: TickCallback = Box::new(move || {
            if let Some(core) = core.upgrade() {
                core.tick(Instant::now());
            }
        });

        match self.scheduler.schedule(self.tick_period, callback) {
            Ok(handle) => {
                debug!("Extrapolation ticker started");
                *slot = Some(handle);
            }
            Err(e) => {
                drop(slot);
                self.with_state(|s, fx| s.fail(PipelineError::Ticker(e), fx));
            }
        }
    }

    fn stop_ticker(&self) {
        let handle = self.ticker.lock().take();
        if let Some(mut handle) = handle {
            handle.stop();
            debug!("Extrapolation ticker stopped");
        }
    }
}

impl LinkObserver for PipelineCore {
    fn on_connected(&self) {
        self.with_state(|s, fx| s.on_connected(Instant::now(), fx));
    }

    fn on_disconnected(&self) {
        self.with_state(|s, fx| s.on_disconnected(fx));
    }

    fn on_data(&self) {
        self.process(Instant::now());
    }

    fn on_link_failed(&self, error: &TransportError) {
        self.with_state(|s, fx| s.fail(PipelineError::LinkFailed(error.to_string()), fx));
    }
}

/// Everything guarded by the pipeline lock
struct PipelineState {
    phase: ConnectionPhase,
    sync: FrameSynchronizer,
    decoder: PacketDecoder,
    shaper: MotionShaper,
    gesture: GestureStateMachine,
    watchdog: ConnectionWatchdog,
    extrapolation: ExtrapolationScheduler,
    /// Button state last sent to the sink
    buttons: Buttons,
    sink: Box<dyn PointerSink>,
    left_as_touch: bool,
    max_backlog: usize,
    stats: PipelineStats,
    events: broadcast::Sender<PipelineEvent>,
    fatal: Option<PipelineError>,
    /// Stays set after the error is taken
    failed: bool,
    closed: bool,
}

impl PipelineState {
    fn new(
        config: &GyromouseConfig,
        sink: Box<dyn PointerSink>,
        events: broadcast::Sender<PipelineEvent>,
    ) -> Self {
        let protocol = &config.protocol;
        let timing = &config.timing;
        Self {
            phase: ConnectionPhase::Disconnected,
            sync: FrameSynchronizer::new(
                PACKET_SIZE,
                protocol.alignment_threshold,
                protocol.max_alignment_attempts,
            ),
            decoder: PacketDecoder::new(protocol.gyro_range_dps),
            shaper: MotionShaper::new(config.shaping.clone()),
            gesture: GestureStateMachine::new(&config.gesture),
            watchdog: ConnectionWatchdog::new(timing.watchdog_warn(), timing.watchdog_stale()),
            extrapolation: ExtrapolationScheduler::new(timing.sample_interval(), timing.max_hold()),
            buttons: Buttons::default(),
            sink,
            left_as_touch: config.pointer.left_as_touch,
            // The newest packet is always kept for decoding
            max_backlog: protocol.max_packet_backlog.max(1),
            stats: PipelineStats::default(),
            events,
            fatal: None,
            failed: false,
            closed: false,
        }
    }

    fn halted(&self) -> bool {
        self.closed || self.failed
    }

    fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn on_connected(&mut self, now: Instant, _effects: &mut Vec<Effect>) {
        if self.halted() {
            return;
        }
        info!("Link up, searching for packet boundary");
        self.phase = ConnectionPhase::Synchronizing;
        self.sync.reset();
        self.extrapolation.reset();
        self.gesture.reset();
        self.watchdog.arm(now);
        self.emit(PipelineEvent::Connected);
    }

    fn on_disconnected(&mut self, effects: &mut Vec<Effect>) {
        if self.halted() {
            return;
        }
        if self.phase == ConnectionPhase::Disconnected {
            debug!("Disconnect after teardown, nothing to do");
            return;
        }
        warn!("Remote disconnected, reconnecting");
        self.emit(PipelineEvent::Disconnected);
        self.teardown(effects);
        self.request_reconnect(effects);
    }

    fn process(&mut self, source: &dyn ByteSource, now: Instant, effects: &mut Vec<Effect>) {
        loop {
            if self.halted() {
                return;
            }
            let switched = match self.phase {
                ConnectionPhase::Disconnected => false,
                ConnectionPhase::Synchronizing => self.scan(source, effects),
                ConnectionPhase::Streaming => self.decode_available(source, now, effects),
            };
            if !switched {
                return;
            }
        }
    }

    /// Feed buffered bytes to the synchronizer; true once aligned
    fn scan(&mut self, source: &dyn ByteSource, effects: &mut Vec<Effect>) -> bool {
        while source.bytes_available() > 0 {
            let byte = match source.read_byte() {
                Ok(byte) => byte,
                Err(e) => {
                    debug!("Scan interrupted: {}", e);
                    return false;
                }
            };
            match self.sync.push_byte(byte) {
                Ok(true) => {
                    info!("Data aligned, streaming");
                    self.phase = ConnectionPhase::Streaming;
                    self.stats.alignments += 1;
                    self.emit(PipelineEvent::Aligned);
                    effects.push(Effect::StartTicker);
                    return true;
                }
                Ok(false) => {}
                Err(e) => {
                    self.fail(e.into(), effects);
                    return false;
                }
            }
        }
        false
    }

    /// Decode whole packets; true if alignment was lost
    fn decode_available(
        &mut self,
        source: &dyn ByteSource,
        now: Instant,
        effects: &mut Vec<Effect>,
    ) -> bool {
        let size = self.sync.packet_size();
        self.trim_backlog(source, size);

        while source.bytes_available() >= size {
            let block = match source.read_bytes(size) {
                Ok(block) => block,
                Err(e) => {
                    debug!("Packet read interrupted: {}", e);
                    return false;
                }
            };
            match self.decoder.decode(&block, &mut self.sync) {
                Ok(sample) => self.apply_sample(sample, now),
                Err(ProtocolError::SignatureViolation { byte }) => {
                    self.phase = ConnectionPhase::Synchronizing;
                    self.stats.misalignments += 1;
                    self.extrapolation.reset();
                    self.emit(PipelineEvent::Misaligned { byte });
                    effects.push(Effect::StopTicker);
                    return true;
                }
                Err(e) => {
                    warn!("Dropping packet: {}", e);
                    return false;
                }
            }
        }
        false
    }

    /// Drop the oldest whole packets beyond the backlog cap
    fn trim_backlog(&mut self, source: &dyn ByteSource, size: usize) {
        let packets = source.bytes_available() / size;
        if packets <= self.max_backlog {
            return;
        }
        let dropped = source.discard((packets - self.max_backlog) * size);
        self.stats.backlog_bytes_dropped += dropped as u64;
        debug!("Packet backlog of {} trimmed by {} bytes", packets, dropped);
    }

    fn apply_sample(&mut self, sample: Sample, now: Instant) {
        self.watchdog.feed(now);
        self.stats.samples_decoded += 1;

        let shaped = self.shaper.shape(&sample.gyro);
        let phase = self.gesture.update(sample.buttons.middle, &shaped.gated);
        self.apply_buttons(sample.buttons);

        if phase == GesturePhase::Scroll {
            let amount = shaped.scroll_amount();
            if amount != 0 {
                let result = self.sink.scroll(amount);
                self.note_sink(result, "scroll");
            }
        }

        self.extrapolation.on_sample(shaped.pointer, now);
        trace!(
            "Sample {:?} -> pointer ({:.3}, {:.3}) scroll {:.2} [{:?}]",
            sample.gyro,
            shaped.pointer.x,
            shaped.pointer.y,
            shaped.scroll,
            phase
        );
    }

    /// Send press/release for buttons that changed
    fn apply_buttons(&mut self, next: Buttons) {
        let changes = [
            (PointerButton::Left, self.buttons.left, next.left),
            (PointerButton::Right, self.buttons.right, next.right),
            (PointerButton::Middle, self.buttons.middle, next.middle),
        ];
        self.buttons = next;

        for (button, was, is) in changes {
            if was == is {
                continue;
            }
            let result = if button == PointerButton::Left && self.left_as_touch {
                self.sink.set_touch(is)
            } else {
                self.sink.set_button(button, is)
            };
            self.note_sink(result, "button");
        }
    }

    fn note_sink(&mut self, result: Result<(), PointerError>, what: &str) {
        if let Err(e) = result {
            self.stats.sink_failures += 1;
            warn!("Pointer {} failed: {}", what, e);
        }
    }

    fn tick(&mut self, now: Instant) {
        if self.halted() || self.phase != ConnectionPhase::Streaming {
            return;
        }
        let delta = self.extrapolation.tick(now);
        if self.gesture.phase().suppresses_pointer() || delta.is_zero() {
            return;
        }
        let result = self.sink.move_pointer(delta.x, delta.y);
        self.note_sink(result, "move");
    }

    fn check_link(&mut self, now: Instant, effects: &mut Vec<Effect>) -> WatchdogStatus {
        if self.halted() {
            return WatchdogStatus::Disarmed;
        }
        let status = self.watchdog.check(now);
        match status {
            WatchdogStatus::Warn(silent) => {
                warn!("No data for {} ms", silent.as_millis());
                self.emit(PipelineEvent::LinkWarning { silent });
            }
            WatchdogStatus::Stale(silent) => {
                warn!(
                    "No data for {} ms, dropping the link and reconnecting",
                    silent.as_millis()
                );
                self.stats.link_stale += 1;
                self.emit(PipelineEvent::LinkStale { silent });
                self.teardown(effects);
                self.request_reconnect(effects);
            }
            WatchdogStatus::Fresh | WatchdogStatus::Disarmed => {}
        }
        status
    }

    /// Return to `Disconnected` with no alignment, motion or held buttons
    fn teardown(&mut self, effects: &mut Vec<Effect>) {
        self.phase = ConnectionPhase::Disconnected;
        self.sync.reset();
        self.extrapolation.reset();
        self.gesture.reset();
        self.watchdog.disarm();
        self.apply_buttons(Buttons::default());
        effects.push(Effect::StopTicker);
    }

    fn request_reconnect(&mut self, effects: &mut Vec<Effect>) {
        self.stats.reconnect_requests += 1;
        self.emit(PipelineEvent::ReconnectRequested);
        effects.push(Effect::RequestReconnect);
    }

    fn fail(&mut self, error: PipelineError, effects: &mut Vec<Effect>) {
        if self.failed {
            return;
        }
        self.failed = true;
        error!("{}", error);
        self.teardown(effects);
        self.emit(PipelineEvent::Fatal(error.to_string()));
        self.fatal = Some(error);
    }

    fn shutdown(&mut self, effects: &mut Vec<Effect>) {
        if self.closed {
            return;
        }
        self.teardown(effects);
        self.closed = true;
    }
}
