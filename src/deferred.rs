use crate::resolve;
use crate::{Promise, Runtime, Value};

/// Settles a promise from the outside.
///
/// Only the first `resolve`/`reject` counts; later calls are ignored.
///
/// # Examples
///
/// ```
/// use thenable::{Runtime, Value};
///
/// let rt = Runtime::new();
/// let deferred = rt.defer();
/// deferred.resolve(10);
/// deferred.resolve(1);
/// assert_eq!(deferred.promise().value().unwrap(), Value::from(10));
/// ```
#[derive(Debug, Clone)]
pub struct Deferred {
    promise: Promise,
}

impl Deferred {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            promise: runtime.pending(),
        }
    }

    pub fn promise(&self) -> &Promise {
        &self.promise
    }

    pub fn resolve(&self, value: impl Into<Value>) {
        if self.is_completed() {
            return;
        }
        resolve::fulfill(&self.promise, value.into());
    }

    pub fn reject(&self, reason: impl Into<Value>) {
        if self.is_completed() {
            return;
        }
        resolve::reject(&self.promise, reason.into());
    }

    pub fn is_completed(&self) -> bool {
        self.promise.is_settled()
    }
}
