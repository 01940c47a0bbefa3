//! Awaitables that are not native futures.
//!
use crate::{future::Payload, Error, Future, Resolution, Resolver};

/// Anything that can report an eventual value or reason to a [`Resolver`].
///
/// `then` is called at most once. It may call the resolver synchronously, or
/// keep it and call it later from anywhere; only the first `resolve` or
/// `reject` counts. Returning `Err` or panicking rejects the adopting future,
/// unless the resolver was already called.
pub trait Thenable<T: 'static, E: 'static>: Send {
    fn then(self: Box<Self>, resolver: Resolver<T, E>) -> Result<(), E>;
}

impl<T: Payload, E: Payload + From<Error>> Thenable<T, E> for Future<T, E> {
    fn then(self: Box<Self>, resolver: Resolver<T, E>) -> Result<(), E> {
        let on_rejected = resolver.clone();
        self.subscribe(
            move |value| resolver.resolve(Resolution::Value(value)),
            move |reason| on_rejected.reject(reason),
        );
        Ok(())
    }
}

/// A thenable backed by a closure. See [`from_fn`].
pub struct FromFn<F> {
    f: F,
}

/// Turns a closure into a [`Thenable`].
///
/// # Examples
///
/// ```
/// use aplus_future::{thenable::from_fn, Future, Resolution, Resolver, Runtime, State};
///
/// let (rt, queue) = Runtime::manual();
/// let adopted = Future::<i32, String>::resolve(
///     &rt,
///     Resolution::thenable(from_fn(|resolver: Resolver<i32, String>| {
///         resolver.resolve(7);
///         Ok(())
///     })),
/// );
/// queue.run_until_idle();
/// assert_eq!(adopted.state(), State::Fulfilled(7));
/// ```
pub fn from_fn<T, E, F>(f: F) -> FromFn<F>
where
    T: 'static,
    E: 'static,
    F: FnOnce(Resolver<T, E>) -> Result<(), E> + Send,
{
    FromFn { f }
}

impl<T, E, F> Thenable<T, E> for FromFn<F>
where
    T: 'static,
    E: 'static,
    F: FnOnce(Resolver<T, E>) -> Result<(), E> + Send,
{
    fn then(self: Box<Self>, resolver: Resolver<T, E>) -> Result<(), E> {
        (self.f)(resolver)
    }
}

#[cfg(test)]
mod tests {
    use super::{from_fn, Thenable};
    use crate::{Future, Resolution, Resolver, Runtime, State};
    use std::{
        sync::mpsc::{channel, Sender},
        thread,
        time::Duration,
    };

    /// Mimics a foreign awaitable that completes on another thread.
    struct Delayed {
        value: i32,
        done: Sender<()>,
    }

    impl Thenable<i32, String> for Delayed {
        fn then(self: Box<Self>, resolver: Resolver<i32, String>) -> Result<(), String> {
            let Delayed { value, done } = *self;
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                resolver.resolve(value);
                done.send(()).unwrap();
            });
            Ok(())
        }
    }

    #[test]
    fn test_future_adopts_pending_future() {
        let (rt, queue) = Runtime::manual();
        let (source, producer) = Future::<i32, String>::pending(&rt);
        let adopted = Future::<i32, String>::resolve(&rt, source);
        producer.reject("later".into());
        assert!(adopted.state().is_pending());
        queue.run_until_idle();
        assert_eq!(adopted.state(), State::Rejected("later".to_string()));
    }

    #[test]
    fn test_custom_thenable_from_another_thread() {
        let (rt, queue) = Runtime::manual();
        let (done, resolved) = channel();
        let adopted = Future::<i32, String>::resolve(
            &rt,
            Resolution::thenable(Delayed { value: 11, done }),
        );
        let (tx, rx) = channel();
        adopted.map(move |v| tx.send(v).unwrap());

        resolved.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(adopted.state(), State::Fulfilled(11));
        // The resolver fired on the spawned thread, delivery still needs the queue.
        assert!(rx.try_recv().is_err());
        queue.run_until_idle();
        assert_eq!(rx.try_recv(), Ok(11));
    }

    #[test]
    fn test_closure_thenable_that_never_calls_stays_pending() {
        let (rt, queue) = Runtime::manual();
        let adopted = Future::<i32, String>::resolve(
            &rt,
            Resolution::thenable(from_fn(|_: Resolver<i32, String>| Ok(()))),
        );
        queue.run_until_idle();
        assert!(adopted.state().is_pending());
    }
}
