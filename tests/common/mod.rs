//! Shared helpers for pipeline tests

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::time::Duration;

use gyromouse::{
    GyromouseConfig, PeriodicScheduler, Pipeline, PipelineEvent, TickCallback, TickHandle,
};
use gyromouse_pointer::{PointerButton, PointerError, PointerSink};
use gyromouse_transport::{encode_packet, BoxedByteSource, Buttons, MemoryTransport, PACKET_SIZE};
use parking_lot::Mutex;
use tokio::sync::broadcast;

/// One call made on the sink
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Move(f32, f32),
    Button(PointerButton, bool),
    Scroll(i32),
    Touch(bool),
}

/// Sink that records every call; clones share the log
#[derive(Clone, Default)]
pub struct RecordingSink {
    calls: Arc<Mutex<Vec<SinkCall>>>,
    fail: bool,
}

impl RecordingSink {
    /// A sink whose every call fails (after being recorded)
    pub fn failing() -> Self {
        Self {
            calls: Arc::default(),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().clear();
    }

    pub fn moves(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Move(..)))
    }

    pub fn scrolls(&self) -> Vec<i32> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                SinkCall::Scroll(amount) => Some(amount),
                _ => None,
            })
            .collect()
    }

    fn count(&self, f: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| f(c)).count()
    }

    fn record(&self, call: SinkCall) -> Result<(), PointerError> {
        self.calls.lock().push(call);
        if self.fail {
            Err(PointerError::EmitEvent(io::Error::other("recording sink failure")))
        } else {
            Ok(())
        }
    }
}

impl PointerSink for RecordingSink {
    fn move_pointer(&mut self, dx: f32, dy: f32) -> Result<(), PointerError> {
        self.record(SinkCall::Move(dx, dy))
    }

    fn set_button(&mut self, button: PointerButton, pressed: bool) -> Result<(), PointerError> {
        self.record(SinkCall::Button(button, pressed))
    }

    fn scroll(&mut self, amount: i32) -> Result<(), PointerError> {
        self.record(SinkCall::Scroll(amount))
    }

    fn set_touch(&mut self, pressed: bool) -> Result<(), PointerError> {
        self.record(SinkCall::Touch(pressed))
    }
}

#[derive(Default)]
struct ManualState {
    scheduled: usize,
    stopped: usize,
}

/// Scheduler that never fires; tests call `Pipeline::tick` themselves
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    pub fn scheduled(&self) -> usize {
        self.state.lock().scheduled
    }

    pub fn stopped(&self) -> usize {
        self.state.lock().stopped
    }

    pub fn active(&self) -> bool {
        let state = self.state.lock();
        state.scheduled > state.stopped
    }
}

impl PeriodicScheduler for ManualScheduler {
    fn schedule(
        &self,
        _period: Duration,
        _callback: TickCallback,
    ) -> io::Result<Box<dyn TickHandle>> {
        self.state.lock().scheduled += 1;
        Ok(Box::new(ManualHandle {
            state: Arc::clone(&self.state),
            stopped: false,
        }))
    }
}

struct ManualHandle {
    state: Arc<Mutex<ManualState>>,
    stopped: bool,
}

impl TickHandle for ManualHandle {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.state.lock().stopped += 1;
        }
    }
}

/// Pipeline wired to an in-memory transport, a recording sink and a manual scheduler
pub struct Harness {
    pub pipeline: Pipeline,
    pub transport: Arc<MemoryTransport>,
    pub sink: RecordingSink,
    pub scheduler: ManualScheduler,
}

impl Harness {
    pub fn new(config: &GyromouseConfig) -> Self {
        Self::with_sink(config, RecordingSink::default())
    }

    pub fn with_sink(config: &GyromouseConfig, sink: RecordingSink) -> Self {
        let transport = Arc::new(MemoryTransport::new("test"));
        let source: BoxedByteSource = transport.clone();
        let scheduler = ManualScheduler::default();
        let pipeline = Pipeline::new(
            config,
            source,
            Box::new(sink.clone()),
            Arc::new(scheduler.clone()),
        );
        Self {
            pipeline,
            transport,
            sink,
            scheduler,
        }
    }

    /// Subscribe to events, then connect
    pub fn subscribe_and_start(&self) -> broadcast::Receiver<PipelineEvent> {
        let events = self.pipeline.subscribe();
        self.pipeline.start().unwrap();
        events
    }

    /// Connect and stream enough idle packets to align
    pub fn connect_and_align(&self, config: &GyromouseConfig) {
        self.pipeline.start().unwrap();
        for _ in 0..config.protocol.alignment_threshold {
            self.feed_packet(idle_packet());
        }
        assert!(self.pipeline.is_aligned(), "pipeline failed to align");
    }

    pub fn feed_packet(&self, packet: [u8; PACKET_SIZE]) {
        assert!(self.transport.feed(&packet), "transport not connected");
    }
}

pub fn idle_packet() -> [u8; PACKET_SIZE] {
    encode_packet([0, 0, 0], Buttons::default())
}

pub fn middle() -> Buttons {
    Buttons {
        middle: true,
        ..Default::default()
    }
}

pub fn left() -> Buttons {
    Buttons {
        left: true,
        ..Default::default()
    }
}

/// Raw gyro reading for `dps` degrees per second at the default 500 dps range
pub fn raw_dps(dps: f32) -> i16 {
    (dps * f32::from(i16::MAX) / 500.0).round() as i16
}
