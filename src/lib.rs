//! Single-threaded promises: a write-once slot for a value that arrives
//! later, with chaining, thenable adoption and the `all`/`race` combinators.
//!
//! Everything lives inside a [`Runtime`], which hands out promises and owns
//! the deferred-tick scheduler they share. Handlers attached to a pending
//! promise run synchronously when it settles; handlers attached to a settled
//! promise run on a later tick, never in the call that attached them.
//!
//! ```
//! use thenable::{Outcome, Runtime, Value};
//!
//! let rt = Runtime::new();
//! let deferred = rt.defer();
//! let total = deferred
//!     .promise()
//!     .then(|v| Ok((v.as_number().unwrap_or(0.0) + 1.0).into()))
//!     .recover(|_| Ok(0.into()));
//!
//! deferred.resolve(41);
//! assert_eq!(rt.run_until_settled(&total).unwrap(), Outcome::Fulfilled(Value::from(42)));
//! ```
mod chain;
mod combinators;
mod deferred;
mod error;
mod future;
mod outcome;
mod promise;
mod resolve;
mod runtime;
mod scheduler;
mod value;

pub use deferred::Deferred;
pub use error::Error;
pub use future::Waiter;
pub use outcome::{safe_call, Attempt, Outcome};
pub use promise::{Promise, Resolvers};
pub use resolve::{capability, Handler};
pub use runtime::{Config, Fallback, Runtime, DEFAULT_TICK};
pub use value::{Capability, ThenFn, Thenable, Value};
