//! The resolution procedure: folds a handler's result, possibly another
//! future or a foreign thenable, into the eventual state of a target future.
//!
use std::{
    fmt,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use crate::{future::Payload, Error, Future, Thenable};

/// Something a future can be resolved with.
pub enum Resolution<T: 'static, E: 'static> {
    /// A plain value, fulfilled as is.
    Value(T),
    /// A native future whose eventual state is adopted.
    Future(Future<T, E>),
    /// A foreign awaitable whose eventual state is adopted.
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T: 'static, E: 'static> Resolution<T, E> {
    pub fn thenable<H: Thenable<T, E> + 'static>(thenable: H) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T: 'static, E: 'static> From<T> for Resolution<T, E> {
    fn from(value: T) -> Self {
        Resolution::Value(value)
    }
}

impl<T: 'static, E: 'static> From<Future<T, E>> for Resolution<T, E> {
    fn from(future: Future<T, E>) -> Self {
        Resolution::Future(future)
    }
}

impl<T: fmt::Debug + 'static, E: 'static> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Future(_) => f.write_str("Future(..)"),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// The pair of capabilities a thenable uses to report its outcome.
///
/// Clones share one latch: whichever of `resolve` or `reject` is called
/// first, on any clone, wins and every later call is ignored.
pub struct Resolver<T: 'static, E: 'static> {
    target: Future<T, E>,
    called: Arc<AtomicBool>,
}

impl<T: 'static, E: 'static> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            target: self.target.clone(),
            called: self.called.clone(),
        }
    }
}

impl<T: Payload, E: Payload + From<Error>> Resolver<T, E> {
    fn new(target: Future<T, E>) -> Self {
        Self {
            target,
            called: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Continues resolution with `value`, which may itself be a thenable.
    pub fn resolve(&self, value: impl Into<Resolution<T, E>>) {
        if self.latch() {
            resolve_with(&self.target, value.into());
        }
    }

    pub fn reject(&self, reason: E) {
        if self.latch() {
            self.target.settle_rejected(reason);
        }
    }

    /// Whether `resolve` or `reject` has already been called.
    pub fn is_called(&self) -> bool {
        self.called.load(Ordering::Acquire)
    }

    fn latch(&self) -> bool {
        !self.called.swap(true, Ordering::AcqRel)
    }
}

/// Settles `target` according to `x`.
///
/// Plain values fulfill directly. Futures and thenables are adopted through a
/// fresh [`Resolver`], recursing if they resolve to further thenables. A
/// future can never adopt itself; that rejects with
/// [`Error::CircularResolution`].
pub(crate) fn resolve_with<T, E>(target: &Future<T, E>, x: Resolution<T, E>)
where
    T: Payload,
    E: Payload + From<Error>,
{
    let thenable: Box<dyn Thenable<T, E>> = match x {
        Resolution::Value(value) => return target.settle_fulfilled(value),
        Resolution::Future(future) if future.ptr_eq(target) => {
            tracing::debug!("future resolved with itself");
            return target.settle_rejected(Error::CircularResolution.into());
        }
        Resolution::Future(future) => Box::new(future),
        Resolution::Thenable(thenable) => thenable,
    };

    tracing::debug!("adopting thenable");
    let resolver = Resolver::new(target.clone());
    let guard = resolver.clone();
    match catch_unwind(AssertUnwindSafe(move || thenable.then(resolver))) {
        Ok(Ok(())) => {}
        Ok(Err(reason)) => guard.reject(reason),
        Err(payload) => guard.reject(Error::from_panic(payload).into()),
    }
}
