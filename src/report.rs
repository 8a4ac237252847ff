use num_format::{Locale, ToFormattedString};
use prettytable::{Cell, Row, Table};
use std::fmt;

use crate::time::{self, SimTime};
use crate::tracer::TraceStatus;

/// One completed handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transfer {
    pub index: usize,
    pub value: u32,
    pub time: SimTime,
}

/// A recoverable finding of the checker. Faults never stop the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    DataMismatch {
        index: usize,
        expected: u32,
        actual: u32,
        time: SimTime,
    },
    Timeout {
        index: usize,
        expected: u32,
        cycles: u32,
        time: SimTime,
    },
    UnexpectedExtraData {
        value: u32,
        time: SimTime,
    },
}

impl Fault {
    pub fn time(&self) -> SimTime {
        match self {
            Fault::DataMismatch { time, .. }
            | Fault::Timeout { time, .. }
            | Fault::UnexpectedExtraData { time, .. } => *time,
        }
    }

    pub fn index(&self) -> Option<usize> {
        match self {
            Fault::DataMismatch { index, .. } | Fault::Timeout { index, .. } => Some(*index),
            Fault::UnexpectedExtraData { .. } => None,
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::DataMismatch {
                index,
                expected,
                actual,
                ..
            } => write!(
                f,
                "data mismatch at item {}: expected {:#010x}, got {:#010x}",
                index, expected, actual
            ),
            Fault::Timeout {
                index,
                expected,
                cycles,
                ..
            } => write!(
                f,
                "timeout at item {} ({:#010x}): nothing pushed within {} cycles",
                index, expected, cycles
            ),
            Fault::UnexpectedExtraData { value, .. } => {
                write!(f, "unexpected extra data {:#010x}", value)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemVerdict {
    Matched(SimTime),
    Mismatch(SimTime),
    TimedOut(SimTime),
    /// The run ended before the item was resolved.
    Pending,
}

/// Everything a run found. Built by the checker and the driver, handed to the
/// caller when the run ends.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub expected: Vec<u32>,
    pub matches: Vec<Transfer>,
    pub faults: Vec<Fault>,
    /// Values the design popped from the driver.
    pub sent: Vec<Transfer>,
    pub trace: TraceStatus,
    pub final_time: SimTime,
    pub total_deltas: u64,
    pub precision: i8,
    pub time_unit: String,
    pub wall_secs: f64,
}

impl RunReport {
    pub fn new(expected: &[u32], precision: i8, time_unit: &str) -> Self {
        Self {
            expected: expected.to_vec(),
            matches: Vec::new(),
            faults: Vec::new(),
            sent: Vec::new(),
            trace: TraceStatus::Disabled,
            final_time: 0,
            total_deltas: 0,
            precision,
            time_unit: time_unit.to_string(),
            wall_secs: 0.0,
        }
    }

    /// True when no fault of any kind was reported.
    pub fn passed(&self) -> bool {
        self.faults.is_empty()
    }

    /// True when every expected item was resolved one way or another.
    pub fn complete(&self) -> bool {
        !self
            .verdicts()
            .iter()
            .any(|v| matches!(v, ItemVerdict::Pending))
    }

    pub fn exit_code(&self) -> u8 {
        match self.passed() {
            true => 0,
            false => 1,
        }
    }

    pub fn mismatches(&self) -> usize {
        self.count(|f| matches!(f, Fault::DataMismatch { .. }))
    }

    pub fn timeouts(&self) -> usize {
        self.count(|f| matches!(f, Fault::Timeout { .. }))
    }

    pub fn extras(&self) -> usize {
        self.count(|f| matches!(f, Fault::UnexpectedExtraData { .. }))
    }

    fn count(&self, pred: impl Fn(&Fault) -> bool) -> usize {
        self.faults.iter().filter(|f| pred(f)).count()
    }

    pub fn verdicts(&self) -> Vec<ItemVerdict> {
        let mut verdicts = vec![ItemVerdict::Pending; self.expected.len()];
        for m in &self.matches {
            verdicts[m.index] = ItemVerdict::Matched(m.time);
        }
        for fault in &self.faults {
            match fault {
                Fault::DataMismatch { index, time, .. } => {
                    verdicts[*index] = ItemVerdict::Mismatch(*time)
                }
                Fault::Timeout { index, time, .. } => verdicts[*index] = ItemVerdict::TimedOut(*time),
                Fault::UnexpectedExtraData { .. } => {}
            }
        }
        verdicts
    }

    pub fn format_time(&self, t: SimTime) -> String {
        match time::from_steps(t, &self.time_unit, self.precision) {
            Ok(v) => format!("{} {}", v, self.time_unit),
            Err(_) => format!("{} steps", t),
        }
    }

    pub fn result_str(&self) -> String {
        format!(
            "expected={}, sent={}, matched={}, mismatches={}, timeouts={}, extra={}",
            self.expected.len(),
            self.sent.len(),
            self.matches.len(),
            self.mismatches(),
            self.timeouts(),
            self.extras()
        )
    }

    pub fn summary_table(&self) -> Table {
        let mut table = Table::new();
        table.set_titles(Row::new(vec![
            Cell::new("item"),
            Cell::new("expected"),
            Cell::new("result"),
            Cell::new("time"),
        ]));
        for (index, (value, verdict)) in self.expected.iter().zip(self.verdicts()).enumerate() {
            let (result, time) = match verdict {
                ItemVerdict::Matched(t) => ("matched", self.format_time(t)),
                ItemVerdict::Mismatch(t) => ("MISMATCH", self.format_time(t)),
                ItemVerdict::TimedOut(t) => ("TIMEOUT", self.format_time(t)),
                ItemVerdict::Pending => ("pending", "-".to_string()),
            };
            table.add_row(Row::new(vec![
                Cell::new(&index.to_string()),
                Cell::new(&format!("{:#010x}", value)),
                Cell::new(result),
                Cell::new(&time),
            ]));
        }
        for fault in self.faults.iter().filter(|f| f.index().is_none()) {
            table.add_row(Row::new(vec![
                Cell::new("-"),
                Cell::new("-"),
                Cell::new(&fault.to_string()),
                Cell::new(&self.format_time(fault.time())),
            ]));
        }
        let sim_ns = time::from_steps(self.final_time, "ns", self.precision).unwrap_or(0.0);
        let speed = match self.wall_secs > 0.0 {
            true => sim_ns / self.wall_secs,
            false => 0.0,
        };
        table.add_row(Row::new(vec![
            Cell::new("total"),
            Cell::new(&format!("{} items", self.expected.len())),
            Cell::new(&self.result_str()),
            Cell::new(&format!(
                "{} ({} deltas, {:.3} s, {:.0} ns/s)",
                self.format_time(self.final_time),
                self.total_deltas.to_formatted_string(&Locale::en),
                self.wall_secs,
                speed
            )),
        ]));
        table
    }
}
