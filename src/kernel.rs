//! Discrete event kernel.
//!
//! The kernel owns simulation time, the signal store and every pending trigger.
//! A time step is evaluated as a series of delta rounds:
//!
//! 1. all ready tasks are polled; signal writes they issue are buffered,
//! 2. buffered writes are applied together and edge triggers are woken,
//! 3. repeat while writes were applied or `ReadWrite` triggers are waiting,
//! 4. `ReadOnly` triggers run once, writes are rejected,
//! 5. time advances to the earliest timer.
//!
//! A process therefore never observes a write issued by another process in the
//! same round.

use intmap::IntMap;
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;

use crate::error::{TbError, TbResult};
use crate::executor::{Executor, JoinHandle};
use crate::shared::Shared;
use crate::signal::Signal;
use crate::time::{self, SimTime};
use crate::trigger::{EdgeKind, TrigKind, TrigShared};
use crate::value::SignalValue;

pub type SignalId = usize;

pub const DEFAULT_MAX_DELTAS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalInfo {
    pub id: SignalId,
    pub name: String,
    pub width: u32,
}

/// Values of every signal at one point in time, indexed by [`SignalId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub time: SimTime,
    pub values: Vec<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub final_time: SimTime,
    pub total_deltas: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Eval,
    ReadOnly,
}

struct SignalSlot {
    info: SignalInfo,
    value: u64,
    pending: Option<u64>,
}

struct KernelState {
    time: SimTime,
    precision: i8,
    display_unit: &'static str,
    phase: Phase,
    max_deltas: u32,
    total_deltas: u64,
    signals: Vec<SignalSlot>,
    names: BTreeMap<String, SignalId>,
    // signals written in the current round, in write order
    dirty: Vec<SignalId>,
    // IntMap specializes on u64 keys, signal ids are used directly
    edge_map: IntMap<VecDeque<TrigShared>>,
    timer_map: BTreeMap<SimTime, VecDeque<TrigShared>>,
    read_write: VecDeque<TrigShared>,
    read_only: VecDeque<TrigShared>,
}

/// Handle to the simulation kernel. Cheap to clone, every process gets one.
#[derive(Clone)]
pub struct Sim {
    state: Shared<KernelState>,
    executor: Executor,
}

impl Sim {
    /// Creates a kernel with a time step of `10^precision` seconds.
    pub fn new(precision: i8) -> TbResult<Self> {
        let display_unit = time::scale_time(precision).ok_or_else(|| {
            TbError::InvalidConfiguration(format!("unsupported time precision 1e{}", precision))
        })?;
        Ok(Self {
            state: Shared::new(KernelState {
                time: 0,
                precision,
                display_unit,
                phase: Phase::Eval,
                max_deltas: DEFAULT_MAX_DELTAS,
                total_deltas: 0,
                signals: Vec::new(),
                names: BTreeMap::new(),
                dirty: Vec::new(),
                edge_map: IntMap::new(),
                timer_map: BTreeMap::new(),
                read_write: VecDeque::new(),
                read_only: VecDeque::new(),
            }),
            executor: Executor::new(),
        })
    }

    pub fn set_max_deltas(&self, max: u32) {
        self.state.with_mut(|s| s.max_deltas = max);
    }

    /// Sets the unit used by [`Sim::time_display`].
    pub fn set_display_unit(&self, unit: &str) -> TbResult<()> {
        let exp = time::time_scale(unit)?;
        let unit = time::scale_time(exp).ok_or_else(|| TbError::UnknownTimeUnit(unit.to_string()))?;
        self.state.with_mut(|s| s.display_unit = unit);
        Ok(())
    }

    /// Creates a signal and returns its only write handle.
    pub fn signal<T: SignalValue>(&self, name: &str, init: T) -> TbResult<Signal<T>> {
        let id = self.state.with_mut(|s| {
            if s.names.contains_key(name) {
                return Err(TbError::InvalidConfiguration(format!(
                    "signal '{}' declared twice",
                    name
                )));
            }
            let id = s.signals.len();
            s.signals.push(SignalSlot {
                info: SignalInfo {
                    id,
                    name: name.to_string(),
                    width: T::WIDTH,
                },
                value: init.to_bits(),
                pending: None,
            });
            s.names.insert(name.to_string(), id);
            Ok(id)
        })?;
        Ok(Signal::new(self.clone(), id))
    }

    pub fn spawn(
        &self,
        name: &str,
        future: impl Future<Output = TbResult> + Send + 'static,
    ) -> JoinHandle {
        self.executor.spawn(name, future)
    }

    pub fn time(&self) -> SimTime {
        self.state.get().time
    }

    pub fn precision(&self) -> i8 {
        self.state.get().precision
    }

    /// Converts `value unit` to kernel steps.
    pub fn steps(&self, value: u64, unit: &str) -> TbResult<SimTime> {
        time::to_steps(value, unit, self.precision())
    }

    pub fn time_in(&self, unit: &str) -> TbResult<f64> {
        time::from_steps(self.time(), unit, self.precision())
    }

    /// Current time formatted for log lines, e.g. `13 ns`.
    pub fn time_display(&self) -> String {
        let (steps, precision, unit) = self.state.with_mut(|s| (s.time, s.precision, s.display_unit));
        match time::from_steps(steps, unit, precision) {
            Ok(t) => format!("{} {}", t, unit),
            Err(_) => format!("{} steps", steps),
        }
    }

    pub fn signal_id(&self, name: &str) -> Option<SignalId> {
        self.state.get().names.get(name).copied()
    }

    pub fn signals(&self) -> Vec<SignalInfo> {
        self.state.get().signals.iter().map(|s| s.info.clone()).collect()
    }

    pub fn snapshot(&self) -> Snapshot {
        let s = self.state.get();
        Snapshot {
            time: s.time,
            values: s.signals.iter().map(|slot| slot.value).collect(),
        }
    }

    pub(crate) fn name_of(&self, id: SignalId) -> String {
        self.state.get().signals[id].info.name.clone()
    }

    pub(crate) fn read(&self, id: SignalId) -> u64 {
        self.state.get().signals[id].value
    }

    pub(crate) fn write(&self, id: SignalId, bits: u64) {
        let mut s = self.state.get();
        if s.phase == Phase::ReadOnly {
            log::error!(
                "write to '{}' during read-only phase at step {} discarded",
                s.signals[id].info.name,
                s.time
            );
            return;
        }
        let slot = &mut s.signals[id];
        if slot.pending.replace(bits).is_none() {
            s.dirty.push(id);
        }
    }

    pub(crate) fn register(&self, kind: TrigKind, mut shared: TrigShared) {
        let mut s = self.state.get();
        match kind {
            TrigKind::ReadWrite | TrigKind::Timer(0) => s.read_write.push_back(shared),
            TrigKind::ReadOnly => s.read_only.push_back(shared),
            TrigKind::Timer(t) => {
                let abs_time = s.time.saturating_add(t);
                s.timer_map.entry(abs_time).or_default().push_back(shared);
            }
            TrigKind::Edge(sig, edge_kind) => {
                shared.edge_kind = edge_kind;
                if let Some(callbacks) = s.edge_map.get_mut(sig as u64) {
                    callbacks.push_back(shared);
                } else {
                    let mut callbacks = VecDeque::new();
                    callbacks.push_back(shared);
                    s.edge_map.insert(sig as u64, callbacks);
                }
            }
        }
    }

    /// Runs the simulation for `duration` steps. Events scheduled exactly at the
    /// end time are left pending.
    pub fn run_for(&self, duration: SimTime) -> TbResult<RunStats> {
        let end = self.time().saturating_add(duration);
        loop {
            self.settle()?;
            self.read_only_phase();

            let next = self.state.with_mut(|s| {
                let next = s.timer_map.first_key_value().map(|(t, _)| *t);
                match next {
                    Some(t) if t < end => {
                        s.time = t;
                        s.timer_map.remove(&t)
                    }
                    _ => {
                        s.time = end;
                        None
                    }
                }
            });
            match next {
                Some(timers) => wake_all(timers),
                None => break,
            }
        }
        let s = self.state.get();
        Ok(RunStats {
            final_time: s.time,
            total_deltas: s.total_deltas,
        })
    }

    fn settle(&self) -> TbResult<()> {
        let mut deltas = 0u32;
        loop {
            self.executor.run_once();

            let wake = self.state.with_mut(|s| {
                if !s.dirty.is_empty() {
                    Some(apply_updates(s))
                } else if !s.read_write.is_empty() {
                    Some(std::mem::take(&mut s.read_write))
                } else {
                    None
                }
            });
            let Some(wake) = wake else {
                return Ok(());
            };

            deltas += 1;
            let (time, max) = self.state.with_mut(|s| {
                s.total_deltas += 1;
                (s.time, s.max_deltas)
            });
            if deltas > max {
                return Err(TbError::DeltaOverflow { time, max });
            }
            log::trace!("delta {} at step {}: waking {}", deltas, time, wake.len());
            wake_all(wake);
        }
    }

    fn read_only_phase(&self) {
        let wake = self.state.with_mut(|s| {
            s.phase = Phase::ReadOnly;
            std::mem::take(&mut s.read_only)
        });
        wake_all(wake);
        self.executor.run_once();
        self.state.with_mut(|s| {
            s.phase = Phase::Eval;
            s.dirty.clear();
        });
    }

    /// Drops every task and pending trigger without resuming them.
    pub fn shutdown(&self) {
        self.executor.shutdown();
        let (edges, timers, rw, ro) = self.state.with_mut(|s| {
            (
                std::mem::replace(&mut s.edge_map, IntMap::new()),
                std::mem::take(&mut s.timer_map),
                std::mem::take(&mut s.read_write),
                std::mem::take(&mut s.read_only),
            )
        });
        // wakers hold their tasks, drop them outside of the state lock
        drop((edges, timers, rw, ro));
    }
}

fn wake_all(wake: VecDeque<TrigShared>) {
    for shared in wake {
        shared.fire();
    }
}

fn apply_updates(s: &mut KernelState) -> VecDeque<TrigShared> {
    let mut wake = VecDeque::new();
    for id in std::mem::take(&mut s.dirty) {
        let slot = &mut s.signals[id];
        let Some(new) = slot.pending.take() else {
            continue;
        };
        let old = std::mem::replace(&mut slot.value, new);
        if old == new {
            continue;
        }
        let edge = match (slot.info.width, old & 1, new & 1) {
            (1, 0, 1) => EdgeKind::Rising,
            (1, 1, 0) => EdgeKind::Falling,
            _ => EdgeKind::Any,
        };
        if let Some(callbacks) = s.edge_map.remove(id as u64) {
            let mut resched = VecDeque::new();
            for trig in callbacks {
                if trig.edge_kind == EdgeKind::Any || trig.edge_kind == edge {
                    wake.push_back(trig);
                } else {
                    resched.push_back(trig);
                }
            }
            if !resched.is_empty() {
                s.edge_map.insert(id as u64, resched);
            }
        }
    }
    wake
}
