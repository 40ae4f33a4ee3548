//! Chaining operators. Every operator except `done`/`finally` returns a new
//! promise whose settlement goes through the resolution procedure.
use crate::resolve::{self, Handler};
use crate::{safe_call, Attempt, Error, Outcome, Promise, Value};
use std::cell::Cell;
use std::rc::Rc;

/// One closure shared by the fulfilled and the rejected path. Only one of
/// them ever runs, so whichever does takes the closure.
type Slot<F> = Rc<Cell<Option<F>>>;

fn shared<F>(f: F) -> (Slot<F>, Slot<F>) {
    let slot = Rc::new(Cell::new(Some(f)));
    (slot.clone(), slot)
}

impl Promise {
    /// The general form of `then`: either handler may be absent, in which
    /// case the matching outcome passes through unchanged.
    pub fn then_with(&self, on_fulfilled: Option<Handler>, on_rejected: Option<Handler>) -> Promise {
        let child = Promise::new(self.runtime());
        let target = child.clone();
        tracing::trace!("registering continuation");
        self.subscribe(
            &child,
            Box::new(move |outcome| resolve::react(&target, on_fulfilled, on_rejected, outcome)),
        );
        child
    }

    pub fn then<F>(&self, on_fulfilled: F) -> Promise
    where
        F: FnOnce(Value) -> Attempt + 'static,
    {
        self.then_with(Some(Handler::new(on_fulfilled)), None)
    }

    pub fn then_else<F, R>(&self, on_fulfilled: F, on_rejected: R) -> Promise
    where
        F: FnOnce(Value) -> Attempt + 'static,
        R: FnOnce(Value) -> Attempt + 'static,
    {
        self.then_with(Some(Handler::new(on_fulfilled)), Some(Handler::new(on_rejected)))
    }

    pub fn catch<R>(&self, on_rejected: R) -> Promise
    where
        R: FnOnce(Value) -> Attempt + 'static,
    {
        self.then_with(None, Some(Handler::new(on_rejected)))
    }

    /// Looks at the value or reason without touching the chain. Whatever `f`
    /// does, panics included, the next link sees the original outcome.
    pub fn peek<F>(&self, f: F) -> Promise
    where
        F: FnOnce(&Value) + 'static,
    {
        let (fulfilled, rejected) = shared(f);
        let inspect = |slot: Slot<F>| {
            Handler::new(move |value| {
                if let Some(f) = slot.take() {
                    if let Err(reason) = safe_call(|| {
                        f(&value);
                        Ok(())
                    }) {
                        tracing::debug!(?reason, "peek handler failed");
                    }
                }
                Ok(Value::Undefined)
            })
        };
        self.then_with(Some(inspect(fulfilled)), Some(inspect(rejected)))
    }

    /// `f` handles both outcomes and its result feeds the chain as usual.
    pub fn always<F>(&self, f: F) -> Promise
    where
        F: FnOnce(Value) -> Attempt + 'static,
    {
        let (fulfilled, rejected) = shared(f);
        self.then_with(Some(take_handler(fulfilled)), Some(take_handler(rejected)))
    }

    /// Terminal `always`: nothing can be chained after it.
    pub fn finally<F>(&self, f: F)
    where
        F: FnOnce(Value) -> Attempt + 'static,
    {
        let (resolved, rejected) = shared(f);
        self.done(Some(take_handler(resolved)), Some(take_handler(rejected)));
    }

    /// Consumes the outcome at the end of a chain.
    ///
    /// A rejection with no `on_rejected` goes to the runtime's fallback
    /// handler, or, when there is none, is recorded as unhandled and reported
    /// by [`Runtime::run`](crate::Runtime::run).
    pub fn done(&self, on_resolved: Option<Handler>, on_rejected: Option<Handler>) {
        let child = Promise::new(self.runtime());
        let target = child.clone();
        self.subscribe(
            &child,
            Box::new(move |outcome| consume(&target, on_resolved, on_rejected, outcome)),
        );
    }

    /// A child whose handlers, and those of its descendants, see `context`.
    pub fn bind(&self, context: impl Into<Value>) -> Promise {
        let child = Promise::new(self.runtime());
        child.set_context(context.into());
        let target = child.clone();
        self.subscribe(
            &child,
            Box::new(move |outcome| resolve::react(&target, None, None, outcome)),
        );
        child
    }

    /// Calls `fulfilled` with the elements of an array value, or with the
    /// value alone when it is not an array.
    pub fn spread<F>(&self, fulfilled: F, rejected: Option<Handler>) -> Promise
    where
        F: FnOnce(Vec<Value>) -> Attempt + 'static,
    {
        let on_fulfilled = Handler::new(move |value| {
            let args = match value {
                Value::Array(items) => items.to_vec(),
                other => vec![other],
            };
            fulfilled(args)
        });
        self.then_with(Some(on_fulfilled), rejected)
    }

    /// Rejects with [`Error::NoSuchValue`] unless `predicate` accepts the
    /// fulfilled value, which is then passed through `mapper`.
    pub fn collect<P, F>(&self, predicate: P, mapper: F) -> Promise
    where
        P: FnOnce(&Value) -> bool + 'static,
        F: FnOnce(Value) -> Attempt + 'static,
    {
        self.then(move |value| {
            if predicate(&value) {
                mapper(value)
            } else {
                Err(Error::NoSuchValue.into())
            }
        })
    }

    pub fn filter<P>(&self, predicate: P) -> Promise
    where
        P: FnOnce(&Value) -> bool + 'static,
    {
        self.collect(predicate, Ok)
    }

    pub fn map<F>(&self, f: F) -> Promise
    where
        F: FnOnce(Value) -> Attempt + 'static,
    {
        self.collect(|_| true, f)
    }

    /// Turns a rejection into a fulfillment with whatever `f` returns. If
    /// `f` returns `undefined` the original reason is raised again.
    pub fn recover<F>(&self, f: F) -> Promise
    where
        F: FnOnce(Value) -> Attempt + 'static,
    {
        self.catch(move |reason| match f(reason.clone())? {
            Value::Undefined => Err(reason),
            value => Ok(value),
        })
    }
}

fn take_handler<F>(slot: Slot<F>) -> Handler
where
    F: FnOnce(Value) -> Attempt + 'static,
{
    Handler::new(move |value| match slot.take() {
        Some(f) => f(value),
        None => Ok(Value::Undefined),
    })
}

fn consume(
    promise: &Promise,
    on_resolved: Option<Handler>,
    on_rejected: Option<Handler>,
    outcome: &Outcome,
) {
    let (handler, value) = match outcome {
        Outcome::Fulfilled(value) => (on_resolved, value),
        Outcome::Rejected(reason) => (on_rejected, reason),
    };
    let context = promise.context();
    match handler {
        Some(handler) => {
            if let Err(reason) = safe_call(|| handler.call(&context, value.clone())) {
                tracing::debug!(?reason, "terminal handler failed");
            }
        }
        None if outcome.is_rejected() => {
            let runtime = promise.runtime();
            match runtime.config().on_error.clone() {
                Some(fallback) => {
                    let reason = value.clone();
                    if let Err(failure) = safe_call(|| {
                        fallback(reason);
                        Ok(())
                    }) {
                        tracing::warn!(?failure, "fallback error handler failed");
                    }
                }
                None => runtime.report_unhandled(value.clone()),
            }
        }
        None => {}
    }
}
