use crate::config::{ClockConfig, ClockTiming};
use crate::error::TbResult;
use crate::kernel::Sim;
use crate::signal::Signal;
use crate::trigger::Trigger;

/// Free running clock generator, the only time base of a run.
pub struct Clock {
    timing: ClockTiming,
}

impl Clock {
    /// Validates the configuration, see [`ClockConfig::timing`].
    pub fn new(config: &ClockConfig, unit: &str, sim: &Sim) -> TbResult<Self> {
        Ok(Self {
            timing: config.timing(unit, sim.precision())?,
        })
    }

    pub fn from_timing(timing: ClockTiming) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> ClockTiming {
        self.timing
    }

    /// Drives `clk` until the run ends. Holds `!posedge_first` until the start
    /// offset, then toggles with one rising and one falling edge per period.
    pub async fn run(self, clk: Signal<bool>) -> TbResult {
        let sim = clk.sim().clone();
        let ClockTiming {
            high,
            low,
            start,
            posedge_first,
            ..
        } = self.timing;
        let (first_t, second_t) = match posedge_first {
            true => (high, low),
            false => (low, high),
        };
        clk.set(!posedge_first);
        if start > 0 {
            Trigger::timer_steps(&sim, start).await;
        }
        loop {
            clk.set(posedge_first);
            Trigger::timer_steps(&sim, first_t).await;
            clk.set(!posedge_first);
            Trigger::timer_steps(&sim, second_t).await;
        }
    }
}
