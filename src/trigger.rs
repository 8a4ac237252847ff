use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use crate::error::TbResult;
use crate::kernel::{Sim, SignalId};
use crate::time::SimTime;

#[derive(PartialEq, Clone, Copy, Debug)]
pub enum EdgeKind {
    Any,
    Rising,
    Falling,
}

pub(crate) struct TrigShared {
    waker: Waker,
    fired: Arc<AtomicBool>,
    // an edge callback must know which edge it waits for, so that it can stay
    // registered through edges of the other kind
    pub(crate) edge_kind: EdgeKind,
}

impl TrigShared {
    pub(crate) fn fire(self) {
        self.fired.store(true, Ordering::Release);
        self.waker.wake();
    }
}

#[derive(Clone, Copy, Debug)]
pub(crate) enum TrigKind {
    Edge(SignalId, EdgeKind),
    Timer(SimTime),
    ReadWrite,
    ReadOnly,
}

/// A suspension point. Awaiting a trigger registers it with the kernel; it
/// completes once the kernel fires it, never because of an unrelated wakeup.
pub struct Trigger {
    sim: Sim,
    kind: TrigKind,
    fired: Option<Arc<AtomicBool>>,
}

impl Trigger {
    fn new(sim: &Sim, kind: TrigKind) -> Self {
        Trigger {
            sim: sim.clone(),
            kind,
            fired: None,
        }
    }
    pub fn timer(sim: &Sim, time: u64, unit: &str) -> TbResult<Self> {
        Ok(Trigger::new(sim, TrigKind::Timer(sim.steps(time, unit)?)))
    }
    pub fn timer_steps(sim: &Sim, steps: SimTime) -> Self {
        Trigger::new(sim, TrigKind::Timer(steps))
    }
    pub async fn timer_ro(sim: &Sim, steps: SimTime) {
        Trigger::timer_steps(sim, steps).await;
        Trigger::read_only(sim).await;
    }
    pub async fn timer_rw(sim: &Sim, steps: SimTime) {
        Trigger::timer_steps(sim, steps).await;
        Trigger::read_write(sim).await;
    }
    pub fn edge(sim: &Sim, signal: SignalId) -> Self {
        Trigger::new(sim, TrigKind::Edge(signal, EdgeKind::Any))
    }
    pub fn rising_edge(sim: &Sim, signal: SignalId) -> Self {
        Trigger::new(sim, TrigKind::Edge(signal, EdgeKind::Rising))
    }
    pub fn falling_edge(sim: &Sim, signal: SignalId) -> Self {
        Trigger::new(sim, TrigKind::Edge(signal, EdgeKind::Falling))
    }
    /// Fires once all pending updates of the current time step have settled.
    pub fn read_write(sim: &Sim) -> Self {
        Trigger::new(sim, TrigKind::ReadWrite)
    }
    /// Fires at the end of the current time step. No writes are allowed afterwards.
    pub fn read_only(sim: &Sim) -> Self {
        Trigger::new(sim, TrigKind::ReadOnly)
    }
}

impl Future for Trigger {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(fired) = &self.fired {
            return match fired.load(Ordering::Acquire) {
                true => Poll::Ready(()),
                false => Poll::Pending,
            };
        }
        let fired = Arc::new(AtomicBool::new(false));
        let shared = TrigShared {
            waker: cx.waker().clone(),
            fired: fired.clone(),
            edge_kind: EdgeKind::Any,
        };
        self.sim.register(self.kind, shared);
        self.fired = Some(fired);
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Shared;

    #[test]
    fn timer_converts_units() {
        let sim = Sim::new(-12).unwrap();
        let at = Shared::new(Vec::new());
        let a = at.clone();
        let s = sim.clone();
        sim.spawn("t", async move {
            Trigger::timer(&s, 2, "ns")?.await;
            a.with_mut(|v| v.push(s.time()));
            Trigger::timer_ro(&s, 500).await;
            a.with_mut(|v| v.push(s.time()));
            Trigger::timer_rw(&s, 1).await;
            a.with_mut(|v| v.push(s.time()));
            Ok(())
        });
        sim.run_for(10_000).unwrap();
        assert_eq!(*at.get(), vec![2_000, 2_500, 2_501]);
    }

    #[test]
    fn sub_step_timer_is_rejected() {
        let sim = Sim::new(-9).unwrap();
        assert!(matches!(
            Trigger::timer(&sim, 5, "ps"),
            Err(crate::error::TbError::TimeNotRepresentable { .. })
        ));
    }
}
