//! The bytecode executor: instruction dispatch and temporal scheduling.
//!
//! Time runs on two clocks. The *internal* clock is show time: the sum of
//! prescribed durations since the last clock reset. The *wall* clock is the
//! hardware's millisecond counter. A calibrated skew factor maps one to the
//! other, and every deadline is derived from the cumulative internal
//! duration rather than from the previous wakeup, so rounding error cannot
//! accumulate across a long show.

use embassy_time::{Duration, Instant};

#[cfg(feature = "log")]
use esp_println::println;

use crate::color::{self, fade_color, Rgb};
use crate::easing::EasingMode;
use crate::edge::EdgeConfig;
use crate::error::{ErrorCode, ErrorReporter};
use crate::loop_stack::LoopStack;
use crate::opcode::Opcode;
use crate::signal::SignalSource;
use crate::store::BytecodeStore;
use crate::strip::StripDriver;
use crate::transition::{ColorFader, Transition};
use crate::trigger::{EdgeMask, TriggerAction, TriggerTable};
use crate::ResponseSink;

/// Boot-time configuration of the executor.
#[derive(Debug, Clone, Copy)]
pub struct ExecutorConfig {
    /// Wall-clock milliseconds per internal millisecond (from calibration)
    pub clock_skew: f32,
    /// Band thresholds shared by all trigger edge detectors
    pub trigger_edges: EdgeConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            clock_skew: 1.0,
            trigger_edges: EdgeConfig::default(),
        }
    }
}

/// Executes bytecode programs against an LED strip.
pub struct Executor<'a, D: StripDriver> {
    store: BytecodeStore<'a>,
    strip: D,
    signals: Option<&'a dyn SignalSource>,

    loops: LoopStack,
    transition: Transition,
    fader: ColorFader,
    triggers: TriggerTable,
    errors: ErrorReporter,

    ended: bool,
    /// Set when the schedule must re-anchor to the next observed time
    /// (after construction and after rewind)
    restart_pending: bool,
    command_start: Instant,
    clock_origin: Instant,
    next_wakeup: Instant,
    /// Sum of prescribed durations since the clock origin, in internal ms
    cumulative_ms: u64,
    skew: f64,
    last_color: Rgb,
}

impl<'a, D: StripDriver> Executor<'a, D> {
    pub fn new(store: BytecodeStore<'a>, strip: D, config: &ExecutorConfig) -> Self {
        let mut executor = Self {
            ended: store.empty(),
            store,
            strip,
            signals: None,
            loops: LoopStack::new(),
            transition: Transition::new(),
            fader: ColorFader::new(color::BLACK),
            triggers: TriggerTable::new(config.trigger_edges),
            errors: ErrorReporter::new(),
            restart_pending: true,
            command_start: Instant::from_millis(0),
            clock_origin: Instant::from_millis(0),
            next_wakeup: Instant::from_millis(0),
            cumulative_ms: 0,
            skew: f64::from(config.clock_skew),
            last_color: color::BLACK,
        };
        if executor.store.missing_program() {
            executor.errors.set(ErrorCode::NoBytecodeInNvram);
        }
        executor
    }

    /// Attach the signal source used by triggers and channel-sourced
    /// colors.
    pub fn attach_signals(&mut self, signals: &'a dyn SignalSource) {
        self.signals = Some(signals);
    }

    pub fn store(&self) -> &BytecodeStore<'a> {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut BytecodeStore<'a> {
        &mut self.store
    }

    /// Whether the program has run to completion (or was stopped).
    pub const fn ended(&self) -> bool {
        self.ended
    }

    /// The current error condition.
    pub fn error_code(&self) -> ErrorCode {
        self.errors.code()
    }

    /// The internal (show-time) clock, in milliseconds.
    ///
    /// This is the only clock bytecode-visible features may observe; wall
    /// time stays private to the scheduler.
    pub fn show_time(&self, now: Instant) -> u64 {
        self.absolute_to_internal(now)
    }

    /// Restart execution from the top of the program.
    pub fn rewind(&mut self) {
        self.store.rewind();
        self.ended = self.store.empty();
        if self.store.missing_program() {
            self.errors.set(ErrorCode::NoBytecodeInNvram);
        } else {
            self.errors.clear();
        }
        self.loops.clear();
        self.transition.cancel();
        self.fader = ColorFader::new(self.last_color);
        self.restart_pending = true;
    }

    /// Stop execution. The strip keeps its last color.
    pub fn stop(&mut self) {
        self.ended = true;
    }

    /// Arm a trigger from firmware code (e.g. a main switch that resumes a
    /// suspended show). Bytecode arms its own triggers via
    /// [`Opcode::TriggeredJump`].
    pub fn bind_trigger(
        &mut self,
        channel: u8,
        mask: EdgeMask,
        one_shot: bool,
        action: TriggerAction,
    ) -> bool {
        if !self.triggers.arm(channel, mask, one_shot, action) {
            self.errors.set(ErrorCode::NoMoreAvailableTriggers);
            return false;
        }
        true
    }

    /// Run the executor for one tick.
    ///
    /// Call repeatedly from the main loop. Each call polls the triggers,
    /// advances at most one transition and dispatches at most one opcode;
    /// nothing blocks. Returns the deadline of the next instruction so the
    /// caller may idle until then.
    pub fn step(&mut self, now: Instant, out: &mut impl ResponseSink) -> Instant {
        if self.ended {
            self.errors.flush(out);
            return now;
        }
        if self.restart_pending {
            self.restart_pending = false;
            self.command_start = now;
            self.clock_origin = now;
            self.next_wakeup = now;
            self.cumulative_ms = 0;
        }

        self.poll_triggers(now);
        self.advance_transition(now);

        if now >= self.next_wakeup {
            self.command_start = now;
            self.dispatch();
        }

        self.errors.flush(out);
        self.next_wakeup
    }

    /* Clock mapping */

    fn internal_to_absolute(&self, internal_ms: u64) -> Instant {
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let wall_ms = (internal_ms as f64 * self.skew + 0.5) as u64;
        Instant::from_millis(self.clock_origin.as_millis() + wall_ms)
    }

    fn absolute_to_internal(&self, at: Instant) -> u64 {
        let wall_ms = at.as_millis().saturating_sub(self.clock_origin.as_millis());
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let internal_ms = (wall_ms as f64 / self.skew + 0.5) as u64;
        internal_ms
    }

    /// Account a prescribed duration and derive the next deadline from the
    /// cumulative total.
    fn schedule_after(&mut self, internal_ms: u64) {
        self.cumulative_ms += internal_ms;
        self.next_wakeup = self.internal_to_absolute(self.cumulative_ms);
    }

    /* Bytecode reading */

    fn next_byte(&mut self) -> u8 {
        self.store.next()
    }

    fn next_varint(&mut self) -> u32 {
        let mut result: u32 = 0;
        let mut shift = 0;
        loop {
            let byte = self.next_byte();
            if shift < 32 {
                result |= u32::from(byte & 0x7F) << shift;
            }
            if byte & 0x80 == 0 {
                return result;
            }
            shift += 7;
        }
    }

    fn next_duration_ms(&mut self) -> u64 {
        u64::from(crate::duration::decode_ms(self.next_byte()))
    }

    fn next_easing(&mut self) -> EasingMode {
        EasingMode::from_raw(self.next_byte()).unwrap_or(EasingMode::Linear)
    }

    /* Triggers and transitions */

    fn poll_triggers(&mut self, now: Instant) {
        let Some(signals) = self.signals else {
            return;
        };
        let Some(action) = self.triggers.poll(signals, now) else {
            return;
        };
        #[cfg(feature = "log")]
        println!("trigger fired: {:?}", action);
        match action {
            TriggerAction::Resume => {
                if self.store.suspended() {
                    self.store.resume();
                }
            }
            TriggerAction::JumpTo(address) => {
                // Abandon the pending delay and any running fade; the
                // program continues from the target on this very tick.
                // The duration anchor moves to the jump instant so the
                // abandoned delay does not leak into the next deadline.
                self.transition.cancel();
                self.fader = ColorFader::new(self.last_color);
                self.jump_to(address);
                self.next_wakeup = now;
                self.cumulative_ms = self.absolute_to_internal(now);
            }
        }
    }

    fn advance_transition(&mut self, now: Instant) {
        let Some(progress) = self.transition.step(now) else {
            return;
        };
        let faded = fade_color(self.fader.start, self.fader.end, progress);
        self.write_color(faded);
        if !self.transition.active() {
            self.fader.start = self.fader.end;
        }
    }

    /* Dispatch */

    fn dispatch(&mut self) {
        let raw = self.next_byte();
        let Some(opcode) = Opcode::from_raw(raw) else {
            self.errors.set(ErrorCode::InvalidCommandCode);
            self.stop();
            return;
        };
        #[cfg(feature = "log")]
        println!("[{} ms] {:?}", self.cumulative_ms, opcode);

        match opcode {
            Opcode::End => self.stop(),
            Opcode::Nop => {}
            Opcode::Sleep => {
                let duration = self.next_duration_ms();
                self.schedule_after(duration);
            }
            Opcode::WaitUntil => self.handle_wait_until(),
            Opcode::SetColor => {
                let target = self.next_color();
                self.delay_then_set(Some(target));
            }
            Opcode::SetGray => {
                let target = color::gray(self.next_byte());
                self.delay_then_set(Some(target));
            }
            Opcode::SetBlack => self.delay_then_set(Some(color::BLACK)),
            Opcode::SetWhite => self.delay_then_set(Some(color::WHITE)),
            Opcode::FadeToColor => {
                let target = self.next_color();
                self.fade_to(Some(target));
            }
            Opcode::FadeToGray => {
                let target = color::gray(self.next_byte());
                self.fade_to(Some(target));
            }
            Opcode::FadeToBlack => self.fade_to(Some(color::BLACK)),
            Opcode::FadeToWhite => self.fade_to(Some(color::WHITE)),
            Opcode::LoopBegin => self.handle_loop_begin(),
            Opcode::LoopEnd => {
                if let Some(address) = self.loops.end() {
                    self.store.seek(address);
                }
            }
            Opcode::ResetClock => {
                self.clock_origin = self.command_start;
                self.cumulative_ms = 0;
            }
            Opcode::SetColorFromChannels => {
                let target = self.next_channel_color();
                self.delay_then_set(target);
            }
            Opcode::FadeToColorFromChannels => {
                let target = self.next_channel_color();
                self.fade_to(target);
            }
            Opcode::Jump => {
                let address = self.next_varint() as usize;
                self.jump_to(address);
            }
            Opcode::TriggeredJump => self.handle_triggered_jump(),
        }
    }

    fn handle_wait_until(&mut self) {
        let deadline = u64::from(self.next_varint());
        let mut wakeup = self.internal_to_absolute(deadline);
        if wakeup < self.command_start {
            // Deadline already passed: behave like a zero-length sleep
            wakeup = self.command_start;
        }
        self.next_wakeup = wakeup;
        // Re-anchor so later durations accumulate from the deadline, not
        // from whatever rounding error the show gathered so far
        self.cumulative_ms = self.absolute_to_internal(wakeup);
    }

    fn handle_loop_begin(&mut self) {
        let iterations = self.next_byte();
        match self.store.tell() {
            Some(location) => {
                let _ = self.loops.begin(location, iterations);
            }
            None => {
                self.errors.set(ErrorCode::OperationNotSupported);
                self.stop();
            }
        }
    }

    fn handle_triggered_jump(&mut self) {
        let params = self.next_byte();
        let channel = params & 0x0F;
        let falling = params & 0x10 != 0;
        let rising = params & 0x20 != 0;
        let one_shot = params & 0x40 != 0;

        let mask = match (rising, falling) {
            (true, true) => EdgeMask::Both,
            (true, false) => EdgeMask::Rising,
            (false, true) => EdgeMask::Falling,
            (false, false) => {
                // No edges requested: disarm, and no address follows
                self.triggers.disarm(channel);
                return;
            }
        };

        let address = self.next_varint() as usize;
        if address >= self.store.program_len() {
            self.errors.set(ErrorCode::InvalidAddress);
            self.stop();
            return;
        }
        let num_channels = self.signals.map_or(0, |signals| signals.num_channels());
        if channel >= num_channels {
            self.errors.set(ErrorCode::InvalidChannelIndex);
            return;
        }
        if !self
            .triggers
            .arm(channel, mask, one_shot, TriggerAction::JumpTo(address))
        {
            self.errors.set(ErrorCode::NoMoreAvailableTriggers);
        }
    }

    /* Color output */

    fn next_color(&mut self) -> Rgb {
        Rgb {
            r: self.next_byte(),
            g: self.next_byte(),
            b: self.next_byte(),
        }
    }

    /// Read three channel indices and sample the signal source.
    ///
    /// Always consumes the three argument bytes; returns `None` (with the
    /// error recorded) when an index is out of range so the caller skips
    /// the color write but keeps the stream aligned.
    fn next_channel_color(&mut self) -> Option<Rgb> {
        let red_channel = self.next_byte();
        let green_channel = self.next_byte();
        let blue_channel = self.next_byte();
        let num_channels = self.signals.map_or(0, |signals| signals.num_channels());
        if red_channel >= num_channels
            || green_channel >= num_channels
            || blue_channel >= num_channels
        {
            self.errors.set(ErrorCode::InvalidChannelIndex);
            return None;
        }
        let signals = self.signals?;
        Some(Rgb {
            r: signals.filtered_channel_value(red_channel),
            g: signals.filtered_channel_value(green_channel),
            b: signals.filtered_channel_value(blue_channel),
        })
    }

    /// Read the duration argument, schedule the delay, and set the color
    /// at once (the delay covers how long it stays).
    fn delay_then_set(&mut self, target: Option<Rgb>) {
        let duration = self.next_duration_ms();
        self.schedule_after(duration);
        let Some(target) = target else {
            return;
        };
        self.transition.cancel();
        self.write_color(target);
        self.fader = ColorFader::new(target);
    }

    /// Read duration and easing arguments and start a fade.
    ///
    /// The fade's wall-clock length is exactly `next_wakeup - now`, so it
    /// completes on the same tick that dispatches the next instruction,
    /// skew or no skew.
    fn fade_to(&mut self, target: Option<Rgb>) {
        let duration = self.next_duration_ms();
        let easing = self.next_easing();
        self.schedule_after(duration);
        let Some(target) = target else {
            return;
        };
        self.fader.end = target;
        if self.next_wakeup <= self.command_start {
            self.transition.cancel();
            self.write_color(target);
            self.fader.start = target;
            return;
        }
        let wall_ms = self.next_wakeup.as_millis() - self.command_start.as_millis();
        self.transition
            .begin(self.command_start, Duration::from_millis(wall_ms), easing);
        self.advance_transition(self.command_start);
    }

    fn jump_to(&mut self, address: usize) {
        if address >= self.store.program_len() {
            self.errors.set(ErrorCode::InvalidAddress);
            self.stop();
            return;
        }
        self.store.seek(address);
        self.loops.clear();
    }

    fn write_color(&mut self, target: Rgb) {
        self.strip.set_color(target);
        self.last_color = target;
    }
}
