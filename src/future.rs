//! The settle-once future: state, settlement and `then` chaining.
//!
use std::{
    any::Any,
    cell::RefCell,
    fmt, mem,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    resolution::{resolve_with, Resolution},
    Error, Runtime,
};

/// Bound for settlement payloads. Every observer gets its own copy.
pub trait Payload: Clone + Send + 'static {}

impl<P: Clone + Send + 'static> Payload for P {}

/// Snapshot of where a future is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, State::Pending)
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(self, State::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, State::Rejected(_))
    }
}

type Callback<A> = Box<dyn FnOnce(A) + Send + 'static>;

struct Inner<T: 'static, E: 'static> {
    state: State<T, E>,
    on_fulfilled: Vec<Callback<T>>,
    on_rejected: Vec<Callback<E>>,
}

thread_local! {
    /// Callback lists waiting to be dropped by the outermost `Inner::drop`
    /// on this thread. `None` while no such drop is running.
    static DEFERRED_DROPS: RefCell<Option<Vec<Box<dyn Any>>>> = const { RefCell::new(None) };
}

impl<T: 'static, E: 'static> Drop for Inner<T, E> {
    /// Pending callbacks own the futures derived from this one, which own
    /// their callbacks in turn. Tearing that down recursively overflows the
    /// stack on long chains, so nested drops hand their lists to the
    /// outermost one, which releases them in a loop.
    fn drop(&mut self) {
        if self.on_fulfilled.is_empty() && self.on_rejected.is_empty() {
            return;
        }
        let callbacks = (
            mem::take(&mut self.on_fulfilled),
            mem::take(&mut self.on_rejected),
        );
        let outermost = DEFERRED_DROPS.try_with(|cell| {
            let mut deferred = cell.borrow_mut();
            match deferred.as_mut() {
                Some(pending) => {
                    pending.push(Box::new(callbacks));
                    None
                }
                None => {
                    *deferred = Some(vec![]);
                    Some(callbacks)
                }
            }
        });
        // During thread teardown the list is gone and the drop stays recursive.
        if let Ok(Some(callbacks)) = outermost {
            let _reset = DeferredDropsReset;
            drop(callbacks);
            while let Some(next) =
                DEFERRED_DROPS.with(|cell| cell.borrow_mut().as_mut().and_then(Vec::pop))
            {
                drop(next);
            }
        }
    }
}

/// Clears the deferred list when the outermost drop finishes, even if a
/// captured value panics while being dropped.
struct DeferredDropsReset;

impl Drop for DeferredDropsReset {
    fn drop(&mut self) {
        let leftover = DEFERRED_DROPS.try_with(|cell| cell.borrow_mut().take());
        drop(leftover);
    }
}

/// A container that starts pending and is settled exactly once, with either
/// a value or a reason.
///
/// Handles are cheap to clone and every clone observes the same state.
/// Callbacks never run inside the call that settled the future or registered
/// them; they are queued on the future's [`Runtime`].
///
/// # Examples
///
/// ```
/// use aplus_future::{Future, Resolution, Runtime, State};
///
/// let (rt, queue) = Runtime::manual();
/// let recovered = Future::<String, String>::new(&rt, |producer| {
///     producer.reject("boom".into());
///     Ok(())
/// })
/// .catch(|reason| Ok(Resolution::Value(reason)));
///
/// queue.run_until_idle();
/// assert_eq!(recovered.state(), State::Fulfilled("boom".to_string()));
/// ```
pub struct Future<T: 'static, E: 'static> {
    inner: Arc<Mutex<Inner<T, E>>>,
    runtime: Runtime,
}

impl<T: 'static, E: 'static> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static, E: fmt::Debug + 'static> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Future")
            .field("state", &inner.state)
            .field("on_fulfilled", &inner.on_fulfilled.len())
            .field("on_rejected", &inner.on_rejected.len())
            .finish()
    }
}

/// The settlement capabilities of one future, handed to its executor.
///
/// Only the first `fulfill` or `reject` across all clones takes effect.
pub struct Producer<T: 'static, E: 'static> {
    future: Future<T, E>,
}

impl<T: 'static, E: 'static> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            future: self.future.clone(),
        }
    }
}

impl<T: Payload, E: Payload> Producer<T, E> {
    pub fn fulfill(&self, value: T) {
        self.future.settle_fulfilled(value)
    }

    pub fn reject(&self, reason: E) {
        self.future.settle_rejected(reason)
    }
}

impl<T: Payload, E: Payload> Future<T, E> {
    /// Creates an unsettled future together with the handle that settles it.
    pub fn pending(runtime: &Runtime) -> (Self, Producer<T, E>) {
        let future = Self {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                on_fulfilled: vec![],
                on_rejected: vec![],
            })),
            runtime: runtime.clone(),
        };
        let producer = Producer {
            future: future.clone(),
        };
        (future, producer)
    }

    pub fn state(&self) -> State<T, E> {
        self.lock().state.clone()
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Whether both handles refer to the same future.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(crate) fn settle_fulfilled(&self, value: T) {
        let stored = value.clone();
        let (callbacks, discarded) = {
            let mut inner = self.lock();
            if !inner.state.is_pending() {
                tracing::trace!("future already settled, fulfillment ignored");
                return;
            }
            inner.state = State::Fulfilled(stored);
            (
                mem::take(&mut inner.on_fulfilled),
                mem::take(&mut inner.on_rejected),
            )
        };
        // Dropped outside the lock, captured state may touch this future.
        drop(discarded);
        tracing::trace!(callbacks = callbacks.len(), "future fulfilled");
        self.dispatch(callbacks, value);
    }

    pub(crate) fn settle_rejected(&self, reason: E) {
        let stored = reason.clone();
        let (callbacks, discarded) = {
            let mut inner = self.lock();
            if !inner.state.is_pending() {
                tracing::trace!("future already settled, rejection ignored");
                return;
            }
            inner.state = State::Rejected(stored);
            (
                mem::take(&mut inner.on_rejected),
                mem::take(&mut inner.on_fulfilled),
            )
        };
        drop(discarded);
        tracing::trace!(callbacks = callbacks.len(), "future rejected");
        self.dispatch(callbacks, reason);
    }

    fn dispatch<A: Payload>(&self, callbacks: Vec<Callback<A>>, payload: A) {
        if callbacks.is_empty() {
            return;
        }
        self.runtime.schedule(Box::new(move || {
            for callback in callbacks {
                callback(payload.clone());
            }
        }));
    }

    /// Registers a pair of raw observers. If the future has already settled
    /// the matching observer is queued right away; it still never runs
    /// before this call returns.
    pub(crate) fn subscribe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        let mut inner = self.lock();
        let state = inner.state.clone();
        match state {
            State::Pending => {
                inner.on_fulfilled.push(Box::new(on_fulfilled));
                inner.on_rejected.push(Box::new(on_rejected));
            }
            State::Fulfilled(value) => {
                drop(inner);
                self.runtime.schedule(Box::new(move || on_fulfilled(value)));
            }
            State::Rejected(reason) => {
                drop(inner);
                self.runtime.schedule(Box::new(move || on_rejected(reason)));
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Payload, E: Payload + From<Error>> Future<T, E> {
    /// Creates a future and runs `executor` with its [`Producer`] before
    /// returning.
    ///
    /// An `Err` returned by the executor, or a panic inside it, rejects the
    /// future unless the executor settled it first.
    pub fn new<F>(runtime: &Runtime, executor: F) -> Self
    where
        F: FnOnce(Producer<T, E>) -> Result<(), E>,
    {
        let (future, producer) = Self::pending(runtime);
        let settle = producer.clone();
        match catch_unwind(AssertUnwindSafe(move || executor(producer))) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => settle.reject(reason),
            Err(payload) => settle.reject(Error::from_panic(payload).into()),
        }
        future
    }

    /// Like [`Future::new`], but fails with [`Error::NotInvocable`] when no
    /// executor is supplied.
    pub fn try_new<F>(runtime: &Runtime, executor: Option<F>) -> Result<Self, Error>
    where
        F: FnOnce(Producer<T, E>) -> Result<(), E>,
    {
        match executor {
            Some(executor) => Ok(Self::new(runtime, executor)),
            None => Err(Error::NotInvocable),
        }
    }

    /// Chains a computation onto this future.
    ///
    /// Exactly one of the handlers runs, after this future settles. Its
    /// result goes through the resolution procedure into the returned
    /// future; an `Err` or a panic rejects the returned future instead.
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U, E>
    where
        U: Payload,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        let (derived, _) = Future::pending(&self.runtime);
        self.subscribe(
            reaction(on_fulfilled, derived.clone()),
            reaction(on_rejected, derived.clone()),
        );
        derived
    }

    /// [`Future::then`] with either handler optional. A missing fulfillment
    /// handler passes the value through; a missing rejection handler
    /// propagates the reason.
    pub fn then_opt<F, R>(&self, on_fulfilled: Option<F>, on_rejected: Option<R>) -> Self
    where
        F: FnOnce(T) -> Result<Resolution<T, E>, E> + Send + 'static,
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        self.then(
            move |value| match on_fulfilled {
                Some(handler) => handler(value),
                None => Ok(Resolution::Value(value)),
            },
            move |reason| match on_rejected {
                Some(handler) => handler(reason),
                None => Err(reason),
            },
        )
    }

    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Future<U, E>
    where
        U: Payload,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    pub fn map<U, F>(&self, op: F) -> Future<U, E>
    where
        U: Payload,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.then(move |value| Ok(Resolution::Value(op(value))), Err)
    }

    pub fn catch<R>(&self, on_rejected: R) -> Self
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }
}

/// Wraps a `then` handler so its outcome settles `derived`.
fn reaction<A, U, E, H>(handler: H, derived: Future<U, E>) -> impl FnOnce(A) + Send + 'static
where
    A: Send + 'static,
    U: Payload,
    E: Payload + From<Error>,
    H: FnOnce(A) -> Result<Resolution<U, E>, E> + Send + 'static,
{
    move |arg| match catch_unwind(AssertUnwindSafe(move || handler(arg))) {
        Ok(Ok(x)) => resolve_with(&derived, x),
        Ok(Err(reason)) => derived.settle_rejected(reason),
        Err(payload) => derived.settle_rejected(Error::from_panic(payload).into()),
    }
}
