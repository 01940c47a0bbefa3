//! Ready-made futures: `resolve`, `reject` and the `all` aggregation.
//!
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use crate::{future::Payload, resolution::resolve_with, Error, Future, Resolution, Runtime};

impl<T: Payload, E: Payload + From<Error>> Future<T, E> {
    /// A future resolved with `value` through the resolution procedure, so a
    /// future or thenable passed in is adopted rather than wrapped.
    pub fn resolve(runtime: &Runtime, value: impl Into<Resolution<T, E>>) -> Self {
        let (future, _) = Self::pending(runtime);
        resolve_with(&future, value.into());
        future
    }

    /// A future rejected with `reason`. Rejection reasons are never unwrapped.
    pub fn reject(runtime: &Runtime, reason: E) -> Self {
        let (future, producer) = Self::pending(runtime);
        producer.reject(reason);
        future
    }

    /// A future that fulfills once every element has fulfilled, or rejects
    /// with the first rejection among them.
    ///
    /// Elements may be plain values, futures or thenables; each is run
    /// through [`Future::resolve`]. An empty list fulfills immediately.
    ///
    /// # Examples
    ///
    /// ```
    /// use aplus_future::{Future, Resolution, Runtime, State};
    ///
    /// let (rt, queue) = Runtime::manual();
    /// let all = Future::<i32, String>::all(
    ///     &rt,
    ///     vec![
    ///         Resolution::Value(1),
    ///         Resolution::Future(Future::reject(&rt, "x".to_string())),
    ///         Resolution::Value(2),
    ///     ],
    /// );
    /// queue.run_until_idle();
    /// assert_eq!(all.state(), State::Rejected("x".to_string()));
    /// ```
    pub fn all<I>(runtime: &Runtime, list: I) -> Future<(), E>
    where
        I: IntoIterator,
        I::Item: Into<Resolution<T, E>>,
    {
        let items: Vec<Resolution<T, E>> = list.into_iter().map(Into::into).collect();
        let (all, producer) = Future::<(), E>::pending(runtime);
        if items.is_empty() {
            producer.fulfill(());
            return all;
        }

        let remaining = Arc::new(AtomicUsize::new(items.len()));
        for item in items {
            let (remaining, on_fulfilled, on_rejected) =
                (remaining.clone(), producer.clone(), producer.clone());
            Self::resolve(runtime, item).subscribe(
                move |_| {
                    if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                        on_fulfilled.fulfill(());
                    }
                },
                move |reason| on_rejected.reject(reason),
            );
        }
        all
    }
}
