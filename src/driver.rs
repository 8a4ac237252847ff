use log::debug;

use crate::config::StimulusItem;
use crate::error::TbResult;
use crate::report::Transfer;
use crate::shared::Shared;
use crate::signal::{Signal, SignalRef};
use crate::utils;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Reset,
    Arm(usize),
    WaitPop(usize),
    Done,
}

pub struct DriverPorts {
    pub clk: SignalRef<bool>,
    pub rst_n: Signal<bool>,
    pub pull_rdy: Signal<bool>,
    pub pull_dat: Signal<u32>,
    pub pull_pop: SignalRef<bool>,
}

/// Resets the design, then offers each stimulus word on the pull interface until
/// the design pops it. There is no timeout on this side, a design that never pops
/// shows up as checker timeouts.
pub struct Driver {
    items: Vec<StimulusItem>,
    reset_cycles: u32,
    sent: Shared<Vec<Transfer>>,
    state: Shared<DriverState>,
}

impl Driver {
    pub fn new(items: Vec<StimulusItem>, reset_cycles: u32, sent: Shared<Vec<Transfer>>) -> Self {
        Self {
            items,
            reset_cycles,
            sent,
            state: Shared::new(DriverState::Reset),
        }
    }

    /// Observable state, mostly for tests.
    pub fn state(&self) -> Shared<DriverState> {
        self.state.clone()
    }

    fn enter(&self, ports: &DriverPorts, state: DriverState) {
        debug!("[{}] driver: {:?}", ports.clk.sim().time_display(), state);
        *self.state.get() = state;
    }

    pub async fn run(self, ports: DriverPorts) -> TbResult {
        let sim = ports.clk.sim().clone();

        self.enter(&ports, DriverState::Reset);
        ports.rst_n.set(false);
        ports.pull_rdy.set(false);
        utils::clock_cycles(&ports.clk, self.reset_cycles).await;
        ports.rst_n.set(true);

        for (index, item) in self.items.iter().enumerate() {
            utils::clock_cycles(&ports.clk, item.gap).await;

            // data and valid go out in the same round, a consumer never sees one without the other
            self.enter(&ports, DriverState::Arm(index));
            ports.pull_dat.set(item.value);
            ports.pull_rdy.set(true);

            self.enter(&ports, DriverState::WaitPop(index));
            loop {
                ports.clk.rising_edge().await;
                if ports.pull_pop.get() && ports.pull_rdy.get() {
                    break;
                }
            }
            self.sent.with_mut(|sent| {
                sent.push(Transfer {
                    index,
                    value: item.value,
                    time: sim.time(),
                })
            });
            debug!(
                "[{}] driver: item {} ({:#010x}) popped",
                sim.time_display(),
                index,
                item.value
            );
            // a following item with gap 0 overrides these in the same round
            ports.pull_rdy.set(false);
            ports.pull_dat.set(0);
        }

        self.enter(&ports, DriverState::Done);
        Ok(())
    }
}
