//! Static run configuration.
//!
//! Everything a run needs is fixed before the first process is spawned. The
//! defaults reproduce the reference scenario: a 10 ns clock offset by 3 ns, three
//! reset cycles, three stimulus words and a 300 ns run with a waveform dump.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{TbError, TbResult};
use crate::time::{self, SimTime};
use crate::trigger::EdgeKind;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    /// Unit of every time value in this config.
    pub time_unit: String,
    /// Kernel time step, as a unit name.
    pub precision: String,
    pub duration: u64,
    pub max_deltas: u32,
    pub clock: ClockConfig,
    /// Rising edges to hold reset asserted.
    pub reset_cycles: u32,
    /// Rising edges the checker waits for each item before reporting a timeout.
    pub timeout_cycles: u32,
    pub items: Vec<StimulusItem>,
    pub trace: TraceConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClockConfig {
    pub period: u64,
    /// Fraction of the period spent high.
    pub duty_cycle: f64,
    /// Phase offset before the first transition.
    pub start_time: u64,
    pub posedge_first: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StimulusItem {
    pub value: u32,
    /// Rising edges the driver waits before offering this item.
    #[serde(default)]
    pub gap: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TraceConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub edge: TraceEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceEdge {
    Any,
    Rising,
    Falling,
}

impl From<TraceEdge> for EdgeKind {
    fn from(edge: TraceEdge) -> Self {
        match edge {
            TraceEdge::Any => EdgeKind::Any,
            TraceEdge::Rising => EdgeKind::Rising,
            TraceEdge::Falling => EdgeKind::Falling,
        }
    }
}

/// Clock phases converted to kernel steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTiming {
    pub period: SimTime,
    pub high: SimTime,
    pub low: SimTime,
    pub start: SimTime,
    pub posedge_first: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            time_unit: "ns".to_string(),
            precision: "ps".to_string(),
            duration: 300,
            max_deltas: crate::kernel::DEFAULT_MAX_DELTAS,
            clock: ClockConfig::default(),
            reset_cycles: 3,
            timeout_cycles: 12,
            items: vec![
                StimulusItem { value: 0x55aa_8118, gap: 1 },
                StimulusItem { value: 0xdead_beef, gap: 1 },
                StimulusItem { value: 0xffff_ffff, gap: 0 },
            ],
            trace: TraceConfig::default(),
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            period: 10,
            duty_cycle: 0.5,
            start_time: 3,
            posedge_first: true,
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("dump.vcd"),
            edge: TraceEdge::Any,
        }
    }
}

impl RunConfig {
    pub fn from_toml_str(s: &str) -> TbResult<Self> {
        toml::from_str(s).map_err(|e| TbError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> TbResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| TbError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    /// Kernel precision as a power of ten.
    pub fn precision_exp(&self) -> TbResult<i8> {
        time::time_scale(&self.precision)
    }

    pub fn to_steps(&self, value: u64) -> TbResult<SimTime> {
        time::to_steps(value, &self.time_unit, self.precision_exp()?)
    }

    pub fn duration_steps(&self) -> TbResult<SimTime> {
        self.to_steps(self.duration)
    }

    pub fn clock_timing(&self) -> TbResult<ClockTiming> {
        self.clock.timing(&self.time_unit, self.precision_exp()?)
    }

    /// The expected queue: values in the order they are sent and must come back.
    pub fn expected(&self) -> Arc<[u32]> {
        self.items.iter().map(|item| item.value).collect()
    }

    pub fn validate(&self) -> TbResult<()> {
        let invalid = |msg: String| Err(TbError::InvalidConfiguration(msg));
        self.clock_timing()?;
        if self.duration_steps()? == 0 {
            return invalid("run duration must be positive".to_string());
        }
        if self.timeout_cycles == 0 {
            return invalid("timeout_cycles must be at least 1".to_string());
        }
        if self.max_deltas == 0 {
            return invalid("max_deltas must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ClockConfig {
    pub fn timing(&self, unit: &str, precision: i8) -> TbResult<ClockTiming> {
        let invalid = |msg: String| Err(TbError::InvalidConfiguration(msg));
        let period = time::to_steps(self.period, unit, precision)?;
        let start = time::to_steps(self.start_time, unit, precision)?;
        if period == 0 {
            return invalid("clock period must be positive".to_string());
        }
        if !(self.duty_cycle > 0.0 && self.duty_cycle < 1.0) {
            return invalid(format!("clock duty cycle {} not in (0, 1)", self.duty_cycle));
        }
        let high = (period as f64 * self.duty_cycle).round() as SimTime;
        // low is derived so both phases always sum to the period
        let low = period.saturating_sub(high);
        if high == 0 || low == 0 {
            return invalid(format!(
                "clock period {}{} with duty cycle {} leaves an empty phase",
                self.period, unit, self.duty_cycle
            ));
        }
        Ok(ClockTiming {
            period,
            high,
            low,
            start,
            posedge_first: self.posedge_first,
        })
    }
}
