mod common;

mod tests {
    use crate::common::{run, RecordingStrip, StringSink, TestClock, TestSignals};
    use lightshow_vm::{
        BytecodeStore, ErrorCode, Executor, ExecutorConfig, Rgb, BLACK, WHITE,
    };

    const RED: Rgb = Rgb { r: 255, g: 0, b: 0 };
    const GREEN: Rgb = Rgb { r: 0, g: 255, b: 0 };
    const BLUE: Rgb = Rgb { r: 0, g: 0, b: 255 };

    /// 50 × 20 ms: the fast-band spelling of one second
    const SEC: u8 = 0xF2;
    /// Zero duration in the fast band
    const NOW: u8 = 0xC0;

    fn fixture<'a>(
        program: &'a [u8],
        clock: &TestClock,
    ) -> (Executor<'a, RecordingStrip>, crate::common::Trace, StringSink) {
        let (strip, trace) = RecordingStrip::new(clock.clone());
        let store = BytecodeStore::from_const(program);
        let executor = Executor::new(store, strip, &ExecutorConfig::default());
        (executor, trace, StringSink::new())
    }

    #[test]
    fn test_white_flash() {
        // SET_GRAY 255 for 1 s; SET_BLACK for 1 s; END
        let program = [0x05, 0xFF, SEC, 0x06, SEC, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 3000);

        assert_eq!(*trace.borrow(), vec![(0, WHITE), (1000, BLACK)]);
        assert!(executor.ended());
        assert_eq!(clock.ms(), 2000);
        assert_eq!(executor.error_code(), ErrorCode::Success);
    }

    #[test]
    fn test_rgb_loop() {
        // LOOP_BEGIN 2 { red 1s; green 1s; blue 1s } LOOP_END; END
        let program = [
            0x0C, 0x02, //
            0x04, 0xFF, 0x00, 0x00, SEC, //
            0x04, 0x00, 0xFF, 0x00, SEC, //
            0x04, 0x00, 0x00, 0xFF, SEC, //
            0x0D, 0x00,
        ];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 7000);

        assert_eq!(
            *trace.borrow(),
            vec![
                (0, RED),
                (1000, GREEN),
                (2000, BLUE),
                (3000, RED),
                (4000, GREEN),
                (5000, BLUE),
            ]
        );
        assert!(executor.ended());
        assert_eq!(clock.ms(), 6000);
    }

    #[test]
    fn test_sleep_zero_dispatches_same_tick() {
        let program = [0x02, NOW, 0x04, 1, 2, 3, NOW, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 10);

        assert_eq!(*trace.borrow(), vec![(0, Rgb { r: 1, g: 2, b: 3 })]);
        assert!(executor.ended());
        assert_eq!(clock.ms(), 0);
    }

    #[test]
    fn test_single_iteration_loop_equals_plain_body() {
        let looped = [0x0C, 0x01, 0x05, 0x64, SEC, 0x0D, 0x00];
        let plain = [0x05, 0x64, SEC, 0x00];

        let clock_a = TestClock::new();
        let (mut executor, trace_a, mut sink) = fixture(&looped, &clock_a);
        run(&mut executor, &clock_a, &mut sink, 0, 2000);
        assert!(executor.ended());

        let clock_b = TestClock::new();
        let (mut executor, trace_b, mut sink) = fixture(&plain, &clock_b);
        run(&mut executor, &clock_b, &mut sink, 0, 2000);
        assert!(executor.ended());

        assert_eq!(*trace_a.borrow(), *trace_b.borrow());
        assert_eq!(clock_a.ms(), clock_b.ms());
    }

    #[test]
    fn test_jump_clears_loop_stack() {
        // A loop whose body jumps past its own LOOP_END: the loop frame is
        // gone, so the LOOP_END at the target falls through
        let program = [
            0x0C, 0x02, // [0] LOOP_BEGIN 2
            0x04, 0xFF, 0x00, 0x00, NOW, // [2] red
            0x12, 0x09, // [7] JUMP 9
            0x0D, // [9] LOOP_END
            0x04, 0x00, 0xFF, 0x00, NOW, // [10] green
            0x00, // [15] END
        ];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 10);

        assert_eq!(*trace.borrow(), vec![(0, RED), (0, GREEN)]);
        assert!(executor.ended());
    }

    #[test]
    fn test_rewind_replays_the_same_trace() {
        let program = [0x05, 0xFF, SEC, 0x06, SEC, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        // First run interrupted mid-show
        run(&mut executor, &clock, &mut sink, 0, 1500);
        assert!(!executor.ended());
        executor.rewind();
        let restart = 1501;
        run(&mut executor, &clock, &mut sink, restart, 6000);
        assert!(executor.ended());

        let trace = trace.borrow();
        assert_eq!(trace[0], (0, WHITE));
        assert_eq!(trace[1], (1000, BLACK));
        // The replay anchors at the restart tick and repeats the schedule
        assert_eq!(trace[2], (restart, WHITE));
        assert_eq!(trace[3], (restart + 1000, BLACK));
    }

    #[test]
    fn test_invalid_opcode_stops_and_reports_once() {
        let program = [0x0F, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 10);
        // A few extra ticks after the failure must not re-emit
        clock.set(20);
        executor.step(clock.now(), &mut sink);

        assert!(executor.ended());
        assert_eq!(executor.error_code(), ErrorCode::InvalidCommandCode);
        assert_eq!(sink.contents(), "E1\n");
        assert!(trace.borrow().is_empty());
    }

    #[test]
    fn test_jump_out_of_range_stops() {
        let program = [0x12, 0x40, 0x00];
        let clock = TestClock::new();
        let (mut executor, _trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 10);

        assert!(executor.ended());
        assert_eq!(executor.error_code(), ErrorCode::InvalidAddress);
        assert_eq!(sink.contents(), "E4\n");
    }

    #[test]
    fn test_empty_infinite_loop_stays_responsive() {
        let program = [0x0C, 0x00, 0x0D, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        // Makes no progress, but every step call returns
        run(&mut executor, &clock, &mut sink, 0, 5);

        assert!(!executor.ended());
        assert_eq!(executor.error_code(), ErrorCode::Success);
        assert!(trace.borrow().is_empty());
    }

    #[test]
    fn test_wait_until_in_the_past_fires_immediately() {
        // Reach internal time 5000, then wait for 1000 (already passed)
        let program = [0x02, 0x05, 0x03, 0xE8, 0x07, 0x04, 1, 2, 3, NOW, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 6000);

        assert_eq!(*trace.borrow(), vec![(5000, Rgb { r: 1, g: 2, b: 3 })]);
        assert!(executor.ended());
        assert_eq!(clock.ms(), 5000);
    }

    #[test]
    fn test_fade_runs_to_completion_at_next_dispatch() {
        // Black immediately, then fade to white over 1 s (linear)
        let program = [
            0x06, NOW, //
            0x08, 0xFF, 0xFF, 0xFF, SEC, 0x00, //
            0x00,
        ];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 1500);

        let trace = trace.borrow();
        assert_eq!(trace.first().copied(), Some((0, BLACK)));
        assert_eq!(trace.last().copied(), Some((1000, WHITE)));
        assert!(executor.ended());
        assert_eq!(clock.ms(), 1000);

        // Linear fade passes close to mid-gray at the midpoint
        let (_, mid) = trace.iter().copied().find(|&(t, _)| t == 500).unwrap();
        assert!((126..=129).contains(&mid.r), "midpoint {mid:?}");

        // Time only moves forward along the trace
        assert!(trace.windows(2).all(|pair| pair[0].0 <= pair[1].0));
    }

    #[test]
    fn test_fade_with_zero_duration_sets_immediately() {
        let program = [0x08, 10, 20, 30, NOW, 0x00, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 10);

        assert_eq!(*trace.borrow(), vec![(0, Rgb { r: 10, g: 20, b: 30 })]);
        assert!(executor.ended());
        assert_eq!(clock.ms(), 0);
    }

    #[test]
    fn test_channel_color_without_source_is_skipped() {
        // The bad instruction's delay still schedules; the show goes on
        let program = [0x10, 0, 1, 2, SEC, 0x04, 9, 9, 9, NOW, 0x00];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        run(&mut executor, &clock, &mut sink, 0, 2000);

        assert_eq!(*trace.borrow(), vec![(1000, Rgb { r: 9, g: 9, b: 9 })]);
        assert_eq!(executor.error_code(), ErrorCode::InvalidChannelIndex);
        assert_eq!(sink.contents(), "E5\n");
        assert!(executor.ended());
    }

    #[test]
    fn test_color_from_channels() {
        let program = [0x10, 0, 1, 2, NOW, 0x00];
        let clock = TestClock::new();
        let signals = TestSignals::new(8);
        signals.set(0, 10);
        signals.set(1, 20);
        signals.set(2, 30);

        let (strip, trace) = RecordingStrip::new(clock.clone());
        let store = BytecodeStore::from_const(&program);
        let mut executor = Executor::new(store, strip, &ExecutorConfig::default());
        executor.attach_signals(&signals);
        let mut sink = StringSink::new();

        run(&mut executor, &clock, &mut sink, 0, 10);

        assert_eq!(*trace.borrow(), vec![(0, Rgb { r: 10, g: 20, b: 30 })]);
        assert_eq!(executor.error_code(), ErrorCode::Success);
    }

    #[test]
    fn test_empty_store_never_runs() {
        let program: [u8; 0] = [];
        let clock = TestClock::new();
        let (mut executor, trace, mut sink) = fixture(&program, &clock);

        assert!(executor.ended());
        run(&mut executor, &clock, &mut sink, 0, 10);
        assert!(trace.borrow().is_empty());
    }
}
