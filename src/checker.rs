//! Push side checker.
//!
//! The checker keeps `push_rdy` asserted once reset is released and compares
//! every pushed word against the expected queue, strictly in order. Each item
//! gets its own cycle budget, counted from the edge it became the current
//! expectation. Findings are recorded in the [`RunReport`]; the checker never
//! stops watching, so spurious late transfers are still caught.

use log::{debug, info, warn};
use std::sync::Arc;

use crate::error::TbResult;
use crate::report::{Fault, RunReport, Transfer};
use crate::shared::Shared;
use crate::signal::{Signal, SignalRef};
use crate::time::SimTime;
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckerState {
    Setup,
    Ready,
    Expect(usize),
    Drain,
}

pub struct CheckerPorts {
    pub clk: SignalRef<bool>,
    pub rst_n: SignalRef<bool>,
    pub push_rdy: Signal<bool>,
    pub push_push: SignalRef<bool>,
    pub push_dat: SignalRef<u32>,
}

/// Clock-free part of the checker: one call per rising edge after reset.
#[derive(Debug)]
pub struct CheckerCore {
    expected: Arc<[u32]>,
    timeout_cycles: u32,
    state: CheckerState,
    cycles: u32,
}

impl CheckerCore {
    pub fn new(expected: Arc<[u32]>, timeout_cycles: u32) -> Self {
        Self {
            expected,
            timeout_cycles,
            state: CheckerState::Setup,
            cycles: 0,
        }
    }

    pub fn state(&self) -> CheckerState {
        self.state
    }

    /// Reset is released and `push_rdy` asserted.
    pub fn ready(&mut self) {
        self.state = CheckerState::Ready;
        self.advance_to(0);
    }

    fn advance_to(&mut self, index: usize) {
        self.cycles = 0;
        self.state = match index < self.expected.len() {
            true => CheckerState::Expect(index),
            false => CheckerState::Drain,
        };
    }

    /// Evaluates one rising edge. `sample` is the pushed word if a transfer
    /// happened at this edge.
    pub fn on_edge(&mut self, sample: Option<u32>, time: SimTime, report: &mut RunReport) {
        match self.state {
            CheckerState::Setup | CheckerState::Ready => {}
            CheckerState::Expect(index) => {
                self.cycles += 1;
                let expected = self.expected[index];
                match sample {
                    Some(actual) if actual == expected => {
                        report.matches.push(Transfer {
                            index,
                            value: actual,
                            time,
                        });
                        self.advance_to(index + 1);
                    }
                    Some(actual) => {
                        report.faults.push(Fault::DataMismatch {
                            index,
                            expected,
                            actual,
                            time,
                        });
                        self.advance_to(index + 1);
                    }
                    None if self.cycles > self.timeout_cycles => {
                        report.faults.push(Fault::Timeout {
                            index,
                            expected,
                            cycles: self.timeout_cycles,
                            time,
                        });
                        self.advance_to(index + 1);
                    }
                    None => {}
                }
            }
            CheckerState::Drain => {
                if let Some(value) = sample {
                    report.faults.push(Fault::UnexpectedExtraData { value, time });
                }
            }
        }
    }
}

pub struct Checker {
    core: CheckerCore,
    report: Shared<RunReport>,
}

impl Checker {
    pub fn new(expected: Arc<[u32]>, timeout_cycles: u32, report: Shared<RunReport>) -> Self {
        Self {
            core: CheckerCore::new(expected, timeout_cycles),
            report,
        }
    }

    pub async fn run(mut self, ports: CheckerPorts) -> TbResult {
        let sim = ports.clk.sim().clone();

        // SETUP: not ready while the design is in reset
        ports.push_rdy.set(false);
        utils::wait_until(&ports.clk, || ports.rst_n.get()).await;
        debug!("[{}] checker: reset released, push_rdy asserted", sim.time_display());
        ports.push_rdy.set(true);
        self.core.ready();

        loop {
            ports.clk.rising_edge().await;
            let transfer = ports.push_push.get() && ports.push_rdy.get() && ports.rst_n.get();
            let sample = transfer.then(|| ports.push_dat.get());
            let before = self.report.get().faults.len();
            let state = self.core.state();
            self.report
                .with_mut(|report| self.core.on_edge(sample, sim.time(), report));

            let report = self.report.get();
            for fault in &report.faults[before..] {
                warn!("[{}] checker: {}", sim.time_display(), fault);
            }
            if let (Some(value), CheckerState::Expect(index)) = (sample, state) {
                if report.faults.len() == before {
                    info!("[{}] checker: item {} matched {:#010x}", sim.time_display(), index, value);
                }
            }
            if state != self.core.state() {
                debug!("[{}] checker: {:?} -> {:?}", sim.time_display(), state, self.core.state());
            }
        }
    }
}
