use crate::Value;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("illegal state: promise cannot be resolved with itself")]
    SelfResolution,
    /// `all`/`race` called with something that is not a non-empty sequence.
    #[error("Promise.{0}: non-empty iterable required")]
    IterableRequired(&'static str),
    #[error("cannot get value from unfulfilled promise")]
    NotFulfilled,
    #[error("cannot get reason from unrejected promise")]
    NotRejected,
    /// A `collect`/`filter` predicate refused the fulfilled value.
    #[error("no such promise value")]
    NoSuchValue,
    /// A rejection reached `finally`/`done` with nobody to take it.
    #[error("unhandled rejection: {0:?}")]
    UnhandledRejection(Value),
    #[error("handler panicked: {0}")]
    Panicked(String),
    #[error("runtime went idle before the promise settled")]
    Stalled,
}
