//! The deferred task queue that decouples callback delivery from the call
//! which settled a future or registered a handler.
//!
use std::{
    collections::VecDeque,
    fmt,
    io,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{channel, Sender},
        Arc, Mutex, PoisonError,
    },
    thread,
};

use crate::error::panic_message;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Somewhere to queue tasks for execution after the current synchronous
/// work completes.
///
/// Implementations must never run `task` inside `schedule` itself, and must
/// run tasks in the order they were scheduled.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, task: Task);
}

/// A cloneable handle to the scheduler every future of a family shares.
///
/// Futures derived through `then` or the combinators inherit the runtime of
/// the future they were created from.
#[derive(Clone)]
pub struct Runtime {
    scheduler: Arc<dyn Scheduler>,
}

impl Runtime {
    pub fn new<S: Scheduler + 'static>(scheduler: S) -> Self {
        Self {
            scheduler: Arc::new(scheduler),
        }
    }

    /// A runtime backed by a [`TaskQueue`] that the caller drives by hand.
    pub fn manual() -> (Self, TaskQueue) {
        let queue = TaskQueue::new();
        (Self::new(queue.clone()), queue)
    }

    /// A runtime backed by a [`ThreadScheduler`] with default settings.
    pub fn threaded() -> io::Result<Self> {
        Ok(Self::new(ThreadScheduler::builder().spawn()?))
    }

    pub(crate) fn schedule(&self, task: Task) {
        self.scheduler.schedule(task)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").finish_non_exhaustive()
    }
}

/// A FIFO queue of tasks that only runs when told to.
///
/// # Examples
///
/// ```
/// use aplus_future::{Future, Runtime, State};
///
/// let (rt, queue) = Runtime::manual();
/// let doubled = Future::<i32, String>::resolve(&rt, 21).map(|v| v * 2);
/// assert_eq!(doubled.state(), State::Pending);
/// queue.run_until_idle();
/// assert_eq!(doubled.state(), State::Fulfilled(42));
/// ```
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs the oldest queued task. Returns `false` if there was none.
    pub fn run_next(&self) -> bool {
        // The lock must be released before running, tasks schedule more tasks.
        let task = self.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including ones queued along the way, until the queue is
    /// empty. Returns how many ran.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        tracing::trace!(ran, "task queue idle");
        ran
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.lock().push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}

/// Runs tasks one at a time on a dedicated worker thread.
///
/// The worker exits once the scheduler (and with it the sending half of its
/// channel) is dropped and every queued task has run.
#[derive(Debug)]
pub struct ThreadScheduler {
    sender: Sender<Task>,
}

/// Configuration for a [`ThreadScheduler`].
#[derive(Debug, Clone)]
pub struct Builder {
    name: String,
    stack_size: Option<usize>,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            name: String::from("aplus-future-worker"),
            stack_size: None,
        }
    }
}

impl Builder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }

    pub fn spawn(self) -> io::Result<ThreadScheduler> {
        let (tx, rx) = channel::<Task>();
        let mut builder = thread::Builder::new().name(self.name.clone());
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(move || {
            for task in rx {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                    let message = panic_message(payload);
                    tracing::error!(%message, "task panicked on scheduler thread");
                }
            }
            tracing::trace!("scheduler thread exiting");
        })?;
        tracing::debug!(name = %self.name, "spawned scheduler thread");
        Ok(ThreadScheduler { sender: tx })
    }
}

impl ThreadScheduler {
    pub fn builder() -> Builder {
        Builder::default()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, task: Task) {
        if self.sender.send(task).is_err() {
            tracing::error!("scheduler thread is gone, dropping task");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Runtime, Scheduler, TaskQueue, ThreadScheduler};
    use std::sync::{mpsc::channel, Arc, Mutex};
    use std::time::Duration;

    #[test]
    fn test_task_queue_is_fifo() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(vec![]));
        for i in 0..3 {
            let log = log.clone();
            queue.schedule(Box::new(move || log.lock().unwrap().push(i)));
        }
        assert_eq!(queue.len(), 3);
        assert!(log.lock().unwrap().is_empty());
        assert_eq!(queue.run_until_idle(), 3);
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_task_queue_runs_tasks_queued_while_draining() {
        let queue = TaskQueue::new();
        let log = Arc::new(Mutex::new(vec![]));
        let (inner_queue, inner_log) = (queue.clone(), log.clone());
        queue.schedule(Box::new(move || {
            inner_log.lock().unwrap().push("outer");
            let log = inner_log.clone();
            inner_queue.schedule(Box::new(move || log.lock().unwrap().push("inner")));
        }));
        assert!(queue.run_next());
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.run_until_idle(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["outer", "inner"]);
        assert!(!queue.run_next());
    }

    #[test]
    fn test_thread_scheduler_survives_panicking_task() {
        let scheduler = ThreadScheduler::builder()
            .name("test-worker")
            .stack_size(256 * 1024)
            .spawn()
            .expect("spawn scheduler");
        let (tx, rx) = channel();
        scheduler.schedule(Box::new(|| panic!("task failure")));
        scheduler.schedule(Box::new(move || {
            let name = std::thread::current().name().map(String::from);
            tx.send(name).unwrap();
        }));
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("test-worker"));
    }

    #[test]
    fn test_runtime_debug() {
        let (rt, _queue) = Runtime::manual();
        assert_eq!(format!("{:?}", rt), "Runtime { .. }");
    }
}
