use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// Shared lets processes hand mutable state (report, trace sink) to each other.
// The simulation is single threaded, the mutex only exists to make tasks Send.
pub struct Shared<T>(Arc<Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(data: T) -> Shared<T> {
        Shared(Arc::new(Mutex::new(data)))
    }
    pub fn get(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
    pub fn with_mut<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.get())
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared(self.0.clone())
    }
}

impl<T: Default> Default for Shared<T> {
    fn default() -> Self {
        Shared::new(T::default())
    }
}
