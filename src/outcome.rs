use crate::{Error, Value};
use std::panic::{self, AssertUnwindSafe};

/// What a handler produced: `Ok` for a return value, `Err` for a thrown
/// reason. Returning `Ok(Value::Undefined)` declines to transform the value.
pub type Attempt = Result<Value, Value>;

/// A settlement, before or after it has been written into a promise.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Fulfilled(Value),
    Rejected(Value),
}

impl Outcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Outcome::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    /// The value or the reason, whichever this is.
    pub fn value(&self) -> &Value {
        match self {
            Outcome::Fulfilled(value) | Outcome::Rejected(value) => value,
        }
    }

    pub fn into_result(self) -> Result<Value, Value> {
        match self {
            Outcome::Fulfilled(value) => Ok(value),
            Outcome::Rejected(reason) => Err(reason),
        }
    }
}

impl From<Attempt> for Outcome {
    fn from(attempt: Attempt) -> Self {
        match attempt {
            Ok(value) => Outcome::Fulfilled(value),
            Err(reason) => Outcome::Rejected(reason),
        }
    }
}

/// Runs `f`, turning a panic into a rejection reason so nothing unwinds
/// past the promise machinery.
pub fn safe_call<T, F>(f: F) -> Result<T, Value>
where
    F: FnOnce() -> Result<T, Value>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(attempt) => attempt,
        Err(payload) => {
            let message = if let Some(s) = payload.downcast_ref::<&str>() {
                (*s).to_string()
            } else if let Some(s) = payload.downcast_ref::<String>() {
                s.clone()
            } else {
                "unknown panic".to_string()
            };
            tracing::warn!(%message, "handler panicked");
            Err(Error::Panicked(message).into())
        }
    }
}
