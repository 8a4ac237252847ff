mod common;

use proptest::prelude::*;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex};

use common::{quiet_config, HandshakeMonitor, PanicsAt};
use pullpush_tb::{
    Harness, PassThrough, SignalInfo, SimTime, StimulusItem, TbError, TbResult, TraceSink,
    TraceStatus,
};

/// Accepts `budget` samples, then fails every write.
struct BrokenSink {
    budget: u32,
    fail_open: bool,
    closes: Arc<Mutex<u32>>,
}

impl TraceSink for BrokenSink {
    fn open(&mut self, _: &Path, _: &[SignalInfo], _: i8) -> TbResult {
        match self.fail_open {
            true => Err(TbError::SinkUnavailable("read-only file system".to_string())),
            false => Ok(()),
        }
    }

    fn record_sample(&mut self, _: SimTime, _: &[u64]) -> TbResult {
        if self.budget == 0 {
            return Err(TbError::SinkUnavailable("disk full".to_string()));
        }
        self.budget -= 1;
        Ok(())
    }

    fn close(&mut self) -> TbResult {
        *self.closes.lock().unwrap() += 1;
        Ok(())
    }
}

fn stalling_dut() -> PassThrough {
    PassThrough::new(1, 2)
        .unwrap()
        .with_random_stall(0.3, 42)
        .unwrap()
}

#[test]
fn failing_sink_does_not_change_the_verdict() {
    let baseline = Harness::new(quiet_config(), stalling_dut())
        .unwrap()
        .run()
        .unwrap();

    for fail_open in [false, true] {
        let closes = Arc::new(Mutex::new(0));
        let sink = BrokenSink {
            budget: 5,
            fail_open,
            closes: closes.clone(),
        };
        let report = Harness::new(quiet_config(), stalling_dut())
            .unwrap()
            .with_trace_sink(sink)
            .run()
            .unwrap();
        assert!(report.trace.is_failed());
        assert_eq!(report.faults, baseline.faults);
        assert_eq!(report.matches, baseline.matches);
        assert_eq!(report.sent, baseline.sent);
        assert_eq!(*closes.lock().unwrap(), 1);
    }
}

#[test]
fn sink_is_closed_when_a_process_panics() {
    let closes = Arc::new(Mutex::new(0));
    let sink = BrokenSink {
        budget: u32::MAX,
        fail_open: false,
        closes: closes.clone(),
    };
    let dut = PanicsAt::new(PassThrough::new(2, 4).unwrap(), 5);
    let harness = Harness::new(quiet_config(), dut)
        .unwrap()
        .with_trace_sink(sink);

    let result = catch_unwind(AssertUnwindSafe(|| harness.run()));
    assert!(result.is_err());
    assert_eq!(*closes.lock().unwrap(), 1);
}

#[test]
fn vcd_trace_is_written_and_timing_unchanged() {
    let path = std::env::temp_dir().join(format!("pullpush-{}.vcd", std::process::id()));
    let mut config = quiet_config();
    config.trace.enabled = true;
    config.trace.path = path.clone();
    let traced = Harness::new(config, PassThrough::new(2, 4).unwrap())
        .unwrap()
        .run()
        .unwrap();
    let plain = Harness::new(quiet_config(), PassThrough::new(2, 4).unwrap())
        .unwrap()
        .run()
        .unwrap();

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(text.contains("$timescale 1ps $end"));
    assert!(text.contains("$var wire 1 ! clk $end"));
    assert!(text.contains("$var wire 32"));
    assert!(text.contains("#3000\n"));
    // initial dump plus one sample per clock edge in 300 ns
    assert_eq!(traced.trace, TraceStatus::Recorded { samples: 61 });
    assert_eq!(traced.matches, plain.matches);
    assert_eq!(traced.total_deltas, plain.total_deltas);
}

fn items() -> impl Strategy<Value = Vec<StimulusItem>> {
    prop::collection::vec(
        (any::<u32>(), 0u32..3).prop_map(|(value, gap)| StimulusItem { value, gap }),
        1..8,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn stalling_pass_through_delivers_in_order(
        items in items(),
        latency in 0u64..5,
        depth in 1usize..5,
        stall in 0.0f64..0.5,
        seed in any::<u64>(),
    ) {
        let mut config = quiet_config();
        config.items = items.clone();
        config.duration = 5_000;
        config.timeout_cycles = 200;
        let values: Vec<u32> = items.iter().map(|i| i.value).collect();
        let dut = PassThrough::new(latency, depth).unwrap().with_random_stall(stall, seed).unwrap();
        let dut = HandshakeMonitor::new(dut, values.clone());
        let violations = dut.violations.clone();
        let report = Harness::new(config, dut).unwrap().run().unwrap();

        prop_assert!(report.passed(), "{}", report.result_str());
        prop_assert!(report.complete());
        prop_assert!(violations.get().is_empty(), "{:?}", violations.get());
        prop_assert_eq!(report.sent.iter().map(|t| t.value).collect::<Vec<_>>(), values.clone());
        prop_assert_eq!(report.matches.iter().map(|t| t.value).collect::<Vec<_>>(), values);
        for pair in report.matches.windows(2) {
            prop_assert!(pair[0].time < pair[1].time);
        }
        // a word can only come out after it went in
        for (sent, matched) in report.sent.iter().zip(&report.matches) {
            prop_assert!(sent.time < matched.time);
        }
    }
}
