use futures::{
    future::{BoxFuture, FutureExt},
    task::{waker_ref, ArcWake, Context, Poll},
};
use futures_channel::oneshot;
use queues::{IsQueue, Queue};
use std::{
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use crate::error::{TbError, TbResult};
use crate::shared::Shared;

type ReadyQueue = Shared<Queue<Arc<Task>>>;

/// Cooperative single threaded executor. Tasks are polled strictly in wake order,
/// which keeps every run deterministic.
#[derive(Clone)]
pub(crate) struct Executor {
    ready: ReadyQueue,
    tasks: Shared<Vec<Weak<Task>>>,
}

impl Executor {
    pub(crate) fn new() -> Self {
        Self {
            ready: Shared::new(Queue::new()),
            tasks: Shared::new(Vec::new()),
        }
    }

    pub(crate) fn spawn(
        &self,
        name: &str,
        future: impl Future<Output = TbResult> + Send + 'static,
    ) -> JoinHandle {
        let (task, join_handle) = Task::new(future.boxed(), name, self.ready.clone());
        self.tasks.with_mut(|tasks| {
            tasks.retain(|t| t.strong_count() > 0);
            tasks.push(Arc::downgrade(&task));
        });
        schedule_task(&self.ready, task);
        join_handle
    }

    /// Polls ready tasks until the queue is empty. Returns the number of polls.
    pub(crate) fn run_once(&self) -> usize {
        let mut polled = 0;
        while let Some(task) = self.next_task() {
            process_task(task);
            polled += 1;
        }
        polled
    }

    fn next_task(&self) -> Option<Arc<Task>> {
        self.ready.get().remove().ok()
    }

    /// Drops every live task future without resuming it.
    pub(crate) fn shutdown(&self) {
        *self.ready.get() = Queue::new();
        let tasks = std::mem::take(&mut *self.tasks.get());
        for task in tasks.iter().filter_map(Weak::upgrade) {
            task.cancel();
        }
    }
}

fn schedule_task(ready: &ReadyQueue, task: Arc<Task>) {
    // Queue::add only fails on capacity limited queues
    let _ = ready.get().add(task);
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn process_task(task: Arc<Task>) {
    if *lock(&task.state) != TaskState::Pending {
        // cancelled or finished, dropped once all references disappear
        return;
    }

    let mut fut_slot = lock(&task.future);
    let Some(mut fut) = fut_slot.take() else {
        return;
    };
    let waker = waker_ref(&task);
    let context = &mut Context::from_waker(&waker);
    match fut.as_mut().poll(context) {
        Poll::Pending => {
            if *lock(&task.state) == TaskState::Pending {
                *fut_slot = Some(fut);
            }
        }
        Poll::Ready(result) => {
            drop(fut_slot);
            *lock(&task.state) = TaskState::Done;
            if let Err(e) = &result {
                log::error!("task '{}' failed: {}", task.name, e);
            }
            log::trace!("task '{}' complete", task.name);
            if let Some(tx) = lock(&task.join_tx).take() {
                let _ = tx.send(result);
            }
        }
    }
}

#[derive(PartialEq, Clone, Copy, Debug)]
enum TaskState {
    Pending,
    Done,
    Cancelled,
}

pub struct Task {
    future: Mutex<Option<BoxFuture<'static, TbResult>>>,
    state: Mutex<TaskState>,
    name: String,
    ready: ReadyQueue,
    join_tx: Mutex<Option<oneshot::Sender<TbResult>>>,
}

impl Task {
    fn new(fut: BoxFuture<'static, TbResult>, name: &str, ready: ReadyQueue) -> (Arc<Self>, JoinHandle) {
        let (tx, rx) = oneshot::channel::<TbResult>();
        let task = Arc::new(Self {
            future: Mutex::new(Some(fut)),
            state: Mutex::new(TaskState::Pending),
            name: name.to_string(),
            ready,
            join_tx: Mutex::new(Some(tx)),
        });
        let join_handle = JoinHandle {
            awaited_task: Some(task.clone()),
            name: name.to_string(),
            join_rx: rx,
        };
        (task, join_handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        *lock(&self.state) = TaskState::Cancelled;
        // a task cancelling itself is still being polled, process_task drops it afterwards
        if let Ok(mut slot) = self.future.try_lock() {
            slot.take();
        }
        lock(&self.join_tx).take();
    }
}

impl ArcWake for Task {
    fn wake_by_ref(arc_self: &Arc<Self>) {
        schedule_task(&arc_self.ready, arc_self.clone());
    }
}

pub struct JoinHandle {
    awaited_task: Option<Arc<Task>>,
    name: String,
    join_rx: oneshot::Receiver<TbResult>,
}

impl JoinHandle {
    pub fn cancel(mut self) {
        if let Some(task) = self.awaited_task.take() {
            task.cancel();
        }
    }
}

impl Future for JoinHandle {
    type Output = TbResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.join_rx.poll_unpin(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(TbError::Cancelled(self.name.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
