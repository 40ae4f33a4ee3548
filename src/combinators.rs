//! `all` and `race`: one promise derived from many inputs.
//!
//! Inputs that are not thenable count as already fulfilled with themselves.
//! Neither combinator cancels anything; inputs that lose keep running and
//! their outcomes are dropped.
use crate::{capability, Capability, Error, Promise, Resolvers, Runtime, Value};
use std::cell::RefCell;
use std::rc::Rc;

struct Gather {
    remaining: usize,
    results: Vec<Value>,
}

fn non_empty(inputs: Value, combinator: &'static str) -> Result<Rc<[Value]>, Error> {
    match inputs {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(Error::IterableRequired(combinator)),
    }
}

/// `input` as a promise, if it is thenable at all. A `then` that cannot be
/// read gives a promise rejected with the accessor's failure.
fn as_promise(runtime: &Runtime, input: &Value) -> Option<Promise> {
    match input {
        Value::Promise(promise) => Some(promise.clone()),
        other => match capability(other) {
            Ok(Capability::NotThenable) => None,
            Ok(Capability::Thenable(_)) => Some(runtime.resolve(other.clone())),
            Err(reason) => Some(runtime.reject(reason)),
        },
    }
}

fn record(gather: &RefCell<Gather>, resolvers: &Resolvers, index: usize, value: Value) {
    let finished = {
        let mut gather = gather.borrow_mut();
        gather.results[index] = value;
        gather.remaining -= 1;
        (gather.remaining == 0).then(|| std::mem::take(&mut gather.results))
    };
    if let Some(results) = finished {
        resolvers.fulfill(results.into());
    }
}

impl Runtime {
    /// Fulfills with every input's value, in input order, once all have
    /// fulfilled; rejects with the first rejection.
    ///
    /// Fails right away unless `inputs` is a non-empty array.
    ///
    /// ```
    /// use thenable::{Runtime, Value};
    ///
    /// let rt = Runtime::new();
    /// let all = rt
    ///     .all(vec![rt.resolve(1).into(), Value::from(2), rt.resolve(3).into()])
    ///     .unwrap();
    /// rt.run().unwrap();
    /// assert_eq!(
    ///     all.value().unwrap(),
    ///     Value::from(vec![Value::from(1), Value::from(2), Value::from(3)])
    /// );
    /// assert!(rt.all(Vec::<Value>::new()).is_err());
    /// ```
    pub fn all(&self, inputs: impl Into<Value>) -> Result<Promise, Error> {
        let inputs = non_empty(inputs.into(), "all")?;
        tracing::debug!(inputs = inputs.len(), "all");
        let runtime = self.clone();
        Ok(self.promise(move |resolvers| {
            let gather = Rc::new(RefCell::new(Gather {
                remaining: inputs.len(),
                results: vec![Value::Undefined; inputs.len()],
            }));
            for (index, input) in inputs.iter().enumerate() {
                match as_promise(&runtime, input) {
                    Some(promise) => {
                        let (gather, on_value, on_reason) =
                            (gather.clone(), resolvers.clone(), resolvers.clone());
                        promise.then_else(
                            move |value| {
                                record(&gather, &on_value, index, value);
                                Ok(Value::Undefined)
                            },
                            move |reason| {
                                on_reason.reject(reason);
                                Ok(Value::Undefined)
                            },
                        );
                    }
                    None => record(&gather, &resolvers, index, input.clone()),
                }
            }
            Ok(())
        }))
    }

    /// Settles like whichever input settles first. Plain values settle on
    /// the spot, so they beat every promise input.
    pub fn race(&self, inputs: impl Into<Value>) -> Result<Promise, Error> {
        let inputs = non_empty(inputs.into(), "race")?;
        tracing::debug!(inputs = inputs.len(), "race");
        let runtime = self.clone();
        Ok(self.promise(move |resolvers| {
            for input in inputs.iter() {
                match as_promise(&runtime, input) {
                    Some(promise) => {
                        let (on_value, on_reason) = (resolvers.clone(), resolvers.clone());
                        promise
                            .then(move |value| {
                                on_value.fulfill(value);
                                Ok(Value::Undefined)
                            })
                            .catch(move |reason| {
                                on_reason.reject(reason);
                                Ok(Value::Undefined)
                            });
                    }
                    None => resolvers.fulfill(input.clone()),
                }
            }
            Ok(())
        }))
    }
}
