//! Bridges a [`Future`] to `async` code.
//!
use std::{
    future::{Future as StdFuture, IntoFuture},
    pin::Pin,
    sync::{Arc, Mutex, PoisonError},
    task::{Context, Poll, Waker},
};

use crate::{future::Payload, Future};

/// Resolves to the settlement of the future it was created from.
///
/// Settlement is still delivered through the future's runtime, so a
/// [`TaskQueue`](crate::TaskQueue) runtime has to be driven for the waiter
/// to wake.
///
/// # Examples
///
/// ```
/// use aplus_future::{Future, Runtime};
/// use futures::executor::block_on;
/// use std::thread;
///
/// let rt = Runtime::threaded().unwrap();
/// let (future, producer) = Future::<String, String>::pending(&rt);
/// let task = thread::spawn(move || block_on(async { future.map(|s| s.len()).await }));
/// producer.fulfill("🍓".into());
/// assert_eq!(task.join().expect("The task thread has panicked"), Ok(4));
/// ```
#[derive(Debug)]
pub struct Waiter<T, E> {
    slot: Arc<Mutex<Slot<T, E>>>,
}

#[derive(Debug)]
struct Slot<T, E> {
    value: Option<Result<T, E>>,
    waker: Option<Waker>,
}

impl<T, E> Slot<T, E> {
    fn complete(&mut self, value: Result<T, E>) {
        self.value = Some(value);
        if let Some(waker) = self.waker.take() {
            waker.wake()
        }
    }
}

impl<T: Payload, E: Payload> Future<T, E> {
    pub fn wait(&self) -> Waiter<T, E> {
        let slot = Arc::new(Mutex::new(Slot {
            value: None,
            waker: None,
        }));
        let (fulfilled, rejected) = (slot.clone(), slot.clone());
        self.subscribe(
            move |value| lock(&fulfilled).complete(Ok(value)),
            move |reason| lock(&rejected).complete(Err(reason)),
        );
        Waiter { slot }
    }
}

impl<T: Payload, E: Payload> IntoFuture for Future<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Waiter<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.wait()
    }
}

impl<T, E> StdFuture for Waiter<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = lock(&self.slot);
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

fn lock<T, E>(slot: &Mutex<Slot<T, E>>) -> std::sync::MutexGuard<'_, Slot<T, E>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use crate::{Future, Resolution, Runtime};
    use futures::executor::block_on;
    use std::thread;

    #[test]
    fn test_wait_fulfilled() {
        let rt = Runtime::threaded().unwrap();
        let (op, op_a) = Future::<String, String>::pending(&rt);
        let task1 = thread::spawn(move || block_on(async { op.await }));
        let task2 = thread::spawn(move || op_a.fulfill(String::from("🍓")));
        task2.join().expect("The task2 thread has panicked");
        assert_eq!(
            task1.join().expect("The task1 thread has panicked"),
            Ok(String::from("🍓"))
        );
    }

    #[test]
    fn test_wait_rejected() {
        let rt = Runtime::threaded().unwrap();
        let rejected = Future::<String, String>::reject(&rt, "reject!!".into());
        assert_eq!(block_on(rejected.wait()), Err(String::from("reject!!")));
    }

    #[test]
    fn test_two_waiters() {
        let rt = Runtime::threaded().unwrap();
        let (op, producer) = Future::<i32, String>::pending(&rt);
        let chained = op.and_then(|v| Ok(Resolution::Value(v * 2)));
        let (a, b) = (op.wait(), chained.wait());
        let task1 = thread::spawn(move || block_on(a));
        let task2 = thread::spawn(move || block_on(b));
        producer.fulfill(21);
        assert_eq!(task1.join().expect("The task1 thread has panicked"), Ok(21));
        assert_eq!(task2.join().expect("The task2 thread has panicked"), Ok(42));
    }

    #[test]
    fn test_wait_on_manual_queue() {
        let (rt, queue) = Runtime::manual();
        let (future, producer) = Future::<i32, String>::pending(&rt);
        let waiter = future.wait();
        producer.fulfill(3);
        queue.run_until_idle();
        assert_eq!(block_on(waiter), Ok(3));
    }
}
