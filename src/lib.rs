//! Promise/A+ style futures: containers that are settled exactly once, with
//! a value or a reason, and deliver that settlement to any number of
//! handlers registered before or after it happens.
//!
//! Handlers never run inside the call that settled the future or registered
//! them. They are queued on a [`Runtime`], which is backed either by a
//! [`TaskQueue`] you drive by hand or by a [`ThreadScheduler`].
//!
//! # Examples
//!
//! ```
//! use aplus_future::{Future, Resolution, Runtime, State};
//!
//! let (rt, queue) = Runtime::manual();
//! let six = Future::<i32, String>::resolve(&rt, 5).then(|v| Ok(Resolution::Value(v + 1)), Err);
//! assert_eq!(six.state(), State::Pending);
//! queue.run_until_idle();
//! assert_eq!(six.state(), State::Fulfilled(6));
//! ```
mod combinator;
mod error;
pub mod future;
pub mod resolution;
pub mod scheduler;
pub mod thenable;
pub mod wait;

pub use crate::error::Error;
pub use crate::future::{Future, Payload, Producer, State};
pub use crate::resolution::{Resolution, Resolver};
pub use crate::scheduler::{Runtime, Scheduler, Task, TaskQueue, ThreadScheduler};
pub use crate::thenable::Thenable;
pub use crate::wait::Waiter;
