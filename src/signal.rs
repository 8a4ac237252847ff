use std::fmt;
use std::marker::PhantomData;

use crate::kernel::{Sim, SignalId};
use crate::trigger::Trigger;
use crate::value::SignalValue;

/// Write handle of a signal. Exactly one exists per signal, so the component
/// holding it is the signal's only driver.
pub struct Signal<T> {
    sim: Sim,
    id: SignalId,
    _ty: PhantomData<fn() -> T>,
}

/// Read-only view of a signal. Freely cloneable.
pub struct SignalRef<T> {
    sim: Sim,
    id: SignalId,
    _ty: PhantomData<fn() -> T>,
}

impl<T> Clone for SignalRef<T> {
    fn clone(&self) -> Self {
        SignalRef {
            sim: self.sim.clone(),
            id: self.id,
            _ty: PhantomData,
        }
    }
}

// convenience functions to get edge triggers for a signal
macro_rules! signal_reads {
    () => {
        pub fn id(&self) -> SignalId {
            self.id
        }
        pub fn sim(&self) -> &Sim {
            &self.sim
        }
        pub fn name(&self) -> String {
            self.sim.name_of(self.id)
        }
        /// Value as of the current delta round.
        pub fn get(&self) -> T {
            T::from_bits(self.sim.read(self.id))
        }
        pub fn rising_edge(&self) -> Trigger {
            Trigger::rising_edge(&self.sim, self.id)
        }
        pub async fn rising_edge_ro(&self) {
            self.rising_edge().await;
            Trigger::read_only(&self.sim).await;
        }
        pub async fn rising_edge_rw(&self) {
            self.rising_edge().await;
            Trigger::read_write(&self.sim).await;
        }
        pub fn falling_edge(&self) -> Trigger {
            Trigger::falling_edge(&self.sim, self.id)
        }
        pub fn edge(&self) -> Trigger {
            Trigger::edge(&self.sim, self.id)
        }
    };
}

impl<T: SignalValue> Signal<T> {
    pub(crate) fn new(sim: Sim, id: SignalId) -> Self {
        Signal {
            sim,
            id,
            _ty: PhantomData,
        }
    }

    signal_reads!();

    /// Schedules `val` for the next delta round. The last write of a round wins.
    pub fn set(&self, val: T) {
        self.sim.write(self.id, val.to_bits());
    }

    pub fn reader(&self) -> SignalRef<T> {
        SignalRef {
            sim: self.sim.clone(),
            id: self.id,
            _ty: PhantomData,
        }
    }
}

impl<T: SignalValue> SignalRef<T> {
    signal_reads!();
}

impl<T: SignalValue> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signal({}={:?})", self.name(), self.get())
    }
}

impl<T: SignalValue> fmt::Debug for SignalRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalRef({}={:?})", self.name(), self.get())
    }
}
