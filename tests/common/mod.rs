//! Shared test doubles: a recording strip driver, a scriptable signal
//! source, an in-memory EEPROM and a string response sink.
#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use embassy_time::Instant;
use lightshow_vm::{Eeprom, ResponseSink, Rgb, SignalSource, StripDriver};

/// Shared millisecond clock so the recording strip can timestamp writes.
#[derive(Clone, Default)]
pub struct TestClock {
    ms: Rc<Cell<u64>>,
}

impl TestClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.ms.set(ms);
    }

    pub fn ms(&self) -> u64 {
        self.ms.get()
    }

    pub fn now(&self) -> Instant {
        Instant::from_millis(self.ms.get())
    }
}

pub type Trace = Rc<RefCell<Vec<(u64, Rgb)>>>;

/// Strip driver recording `(time, color)` pairs, deduplicating repeats of
/// the same color (fades write every tick).
pub struct RecordingStrip {
    clock: TestClock,
    trace: Trace,
}

impl RecordingStrip {
    pub fn new(clock: TestClock) -> (Self, Trace) {
        let trace: Trace = Rc::default();
        (
            Self {
                clock,
                trace: trace.clone(),
            },
            trace,
        )
    }
}

impl StripDriver for RecordingStrip {
    fn set_color(&mut self, color: Rgb) {
        let mut trace = self.trace.borrow_mut();
        if trace.last().map(|&(_, last)| last) != Some(color) {
            trace.push((self.clock.ms(), color));
        }
    }
}

/// Signal source whose channel values tests can script.
#[derive(Default)]
pub struct TestSignals {
    channels: RefCell<Vec<u8>>,
    active: Cell<bool>,
}

impl TestSignals {
    pub fn new(num_channels: usize) -> Self {
        Self {
            channels: RefCell::new(vec![0; num_channels]),
            active: Cell::new(true),
        }
    }

    pub fn set(&self, channel: usize, value: u8) {
        self.channels.borrow_mut()[channel] = value;
    }
}

impl SignalSource for TestSignals {
    fn num_channels(&self) -> u8 {
        self.channels.borrow().len() as u8
    }

    fn channel_value(&self, channel: u8) -> u8 {
        self.channels.borrow()[channel as usize]
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }
}

/// Response sink collecting everything into a string.
#[derive(Default)]
pub struct StringSink {
    bytes: Vec<u8>,
}

impl StringSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> &str {
        core::str::from_utf8(&self.bytes).expect("reply was not UTF-8")
    }

    pub fn take(&mut self) -> String {
        let s = self.contents().to_owned();
        self.bytes.clear();
        s
    }
}

impl ResponseSink for StringSink {
    fn write_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }
}

/// In-memory EEPROM.
pub struct MemEeprom {
    pub bytes: Vec<u8>,
}

impl MemEeprom {
    pub fn new(len: usize) -> Self {
        Self {
            bytes: vec![0xFF; len],
        }
    }
}

impl Eeprom for MemEeprom {
    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn read_byte(&self, address: usize) -> u8 {
        self.bytes[address]
    }

    fn write_byte(&mut self, address: usize, value: u8) {
        self.bytes[address] = value;
    }
}

/// Drive the executor millisecond by millisecond from `from_ms` to `to_ms`
/// inclusive, dispatching as many ready instructions per tick as the
/// schedule allows (mimicking a main loop that spins far faster than the
/// program's time scale).
pub fn run<D: StripDriver>(
    executor: &mut lightshow_vm::Executor<'_, D>,
    clock: &TestClock,
    sink: &mut StringSink,
    from_ms: u64,
    to_ms: u64,
) {
    for ms in from_ms..=to_ms {
        clock.set(ms);
        let now = clock.now();
        for _ in 0..1000 {
            let wakeup = executor.step(now, sink);
            if executor.ended() || wakeup > now {
                break;
            }
        }
        if executor.ended() {
            return;
        }
    }
}
