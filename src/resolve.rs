//! The resolution procedure: how a settlement plus a pair of optional
//! handlers turns into the settlement of the next promise.
use crate::{safe_call, Attempt, Capability, Error, Outcome, Promise, Resolvers, Value};
use std::cell::Cell;
use std::fmt;

/// A one-shot continuation attached to a promise.
pub struct Handler(Box<dyn FnOnce(&Value, Value) -> Attempt>);

impl Handler {
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(Value) -> Attempt + 'static,
    {
        Handler(Box::new(move |_, value| f(value)))
    }

    /// A handler that also receives the bound context of the promise it
    /// settles (`Value::Undefined` when nothing was bound).
    pub fn with_context<F>(f: F) -> Self
    where
        F: FnOnce(&Value, Value) -> Attempt + 'static,
    {
        Handler(Box::new(f))
    }

    pub(crate) fn call(self, context: &Value, value: Value) -> Attempt {
        (self.0)(context, value)
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Handler")
    }
}

/// Probes `value` for a callable `then`.
pub fn capability(value: &Value) -> Result<Capability, Value> {
    match value {
        Value::Promise(promise) => {
            let promise = promise.clone();
            Ok(Capability::Thenable(Box::new(move |resolvers: Resolvers| {
                let on_reject = resolvers.clone();
                promise.then_with(
                    Some(Handler::new(move |value| {
                        resolvers.fulfill(value);
                        Ok(Value::Undefined)
                    })),
                    Some(Handler::new(move |reason| {
                        on_reject.reject(reason);
                        Ok(Value::Undefined)
                    })),
                );
                Ok(())
            })))
        }
        Value::Thenable(thenable) => match safe_call(|| thenable.lookup_then())? {
            Some(then) => Ok(Capability::Thenable(then)),
            None => Ok(Capability::NotThenable),
        },
        _ => Ok(Capability::NotThenable),
    }
}

/// Fulfills `promise` with `value`, adopting it when it is thenable.
pub(crate) fn fulfill(promise: &Promise, value: Value) {
    if promise.is_settled() {
        return;
    }
    if value.as_promise() == Some(promise) {
        reject(promise, Error::SelfResolution.into());
        return;
    }
    match capability(&value) {
        Ok(Capability::NotThenable) => {
            promise.complete(Outcome::Fulfilled(value));
        }
        Ok(Capability::Thenable(then)) => adopt(then, promise),
        Err(reason) => reject(promise, reason),
    }
}

pub(crate) fn reject(promise: &Promise, reason: Value) {
    promise.complete(Outcome::Rejected(reason));
}

fn forward(promise: &Promise, outcome: &Outcome) {
    match outcome {
        Outcome::Fulfilled(value) => fulfill(promise, value.clone()),
        Outcome::Rejected(reason) => reject(promise, reason.clone()),
    }
}

/// Settles `promise` from `upstream` through whichever handler matches.
///
/// A missing handler passes the outcome through. A handler returning
/// `undefined` keeps the upstream outcome as well, rather than fulfilling
/// with `undefined`.
pub(crate) fn react(
    promise: &Promise,
    on_fulfilled: Option<Handler>,
    on_rejected: Option<Handler>,
    upstream: &Outcome,
) {
    let handler = match upstream {
        Outcome::Fulfilled(_) => on_fulfilled,
        Outcome::Rejected(_) => on_rejected,
    };
    let Some(handler) = handler else {
        forward(promise, upstream);
        return;
    };
    let context = promise.context();
    let input = upstream.value().clone();
    match safe_call(|| handler.call(&context, input)) {
        Err(reason) => reject(promise, reason),
        Ok(Value::Undefined) => forward(promise, upstream),
        Ok(value) => fulfill(promise, value),
    }
}

/// Hands `promise`'s settlement over to a thenable.
///
/// Adoptions started while another one is running are queued and drained
/// by the outermost call, keeping the stack flat however deep a chain of
/// synchronously resolving thenables goes.
fn adopt(then: crate::ThenFn, promise: &Promise) {
    let runtime = promise.runtime().clone();
    let shared = &runtime.shared;
    shared
        .adoptions
        .borrow_mut()
        .push_back((then, promise.clone()));
    if shared.adopting.replace(true) {
        return;
    }
    let _adopting = Adopting(&shared.adopting);
    loop {
        let next = shared.adoptions.borrow_mut().pop_front();
        let Some((then, promise)) = next else {
            break;
        };
        tracing::debug!("adopting thenable");
        let resolvers = Resolvers::new(&promise);
        if let Err(reason) = safe_call(|| then(resolvers)) {
            reject(&promise, reason);
        }
    }
}

/// Clears the runtime's adopting flag, also when a reaction unwinds.
struct Adopting<'a>(&'a Cell<bool>);

impl Drop for Adopting<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Runtime, ThenFn, Thenable};
    use std::cell::Cell;
    use std::rc::Rc;

    struct Immediate(Value);

    impl Thenable for Immediate {
        fn lookup_then(&self) -> Result<Option<ThenFn>, Value> {
            let value = self.0.clone();
            Ok(Some(Box::new(move |resolvers: Resolvers| -> Result<(), Value> {
                resolvers.fulfill(value);
                Ok(())
            })))
        }
    }

    /// Resolves with another `Countdown` until it reaches zero.
    struct Countdown(u32);

    impl Thenable for Countdown {
        fn lookup_then(&self) -> Result<Option<ThenFn>, Value> {
            let left = self.0;
            Ok(Some(Box::new(move |resolvers: Resolvers| -> Result<(), Value> {
                if left == 0 {
                    resolvers.fulfill("bottom".into());
                } else {
                    resolvers.fulfill(Value::thenable(Countdown(left - 1)));
                }
                Ok(())
            })))
        }
    }

    struct Throwing;

    impl Thenable for Throwing {
        fn lookup_then(&self) -> Result<Option<ThenFn>, Value> {
            Ok(Some(Box::new(|_: Resolvers| -> Result<(), Value> {
                Err("then threw".into())
            })))
        }
    }

    struct BadAccessor;

    impl Thenable for BadAccessor {
        fn lookup_then(&self) -> Result<Option<ThenFn>, Value> {
            Err("getter threw".into())
        }
    }

    struct NoThen;

    impl Thenable for NoThen {
        fn lookup_then(&self) -> Result<Option<ThenFn>, Value> {
            Ok(None)
        }
    }

    #[test]
    fn capability_classifies_values() {
        let rt = Runtime::new();
        assert!(matches!(capability(&1.into()), Ok(Capability::NotThenable)));
        assert!(matches!(
            capability(&rt.pending().into()),
            Ok(Capability::Thenable(_))
        ));
        assert!(matches!(
            capability(&Value::thenable(NoThen)),
            Ok(Capability::NotThenable)
        ));
        assert!(matches!(
            capability(&Value::thenable(BadAccessor)),
            Err(reason) if reason == Value::from("getter threw")
        ));
    }

    #[test]
    fn fulfill_adopts_foreign_thenables() {
        let rt = Runtime::new();
        let p = rt.pending();
        fulfill(&p, Value::thenable(Immediate(7.into())));
        assert_eq!(p.value().unwrap(), Value::from(7));
    }

    #[test]
    fn adoption_failures_reject() {
        let rt = Runtime::new();
        let thrown = rt.pending();
        fulfill(&thrown, Value::thenable(Throwing));
        assert_eq!(thrown.reason().unwrap(), Value::from("then threw"));
        let unreadable = rt.pending();
        fulfill(&unreadable, Value::thenable(BadAccessor));
        assert_eq!(unreadable.reason().unwrap(), Value::from("getter threw"));
    }

    #[test]
    fn non_callable_then_is_an_ordinary_value() {
        let rt = Runtime::new();
        let p = rt.pending();
        let plain = Value::thenable(NoThen);
        fulfill(&p, plain.clone());
        assert_eq!(p.value().unwrap(), plain);
    }

    #[test]
    fn deep_synchronous_adoption_chains_do_not_recurse() {
        let rt = Runtime::new();
        let p = rt.pending();
        fulfill(&p, Value::thenable(Countdown(100_000)));
        assert_eq!(p.value().unwrap(), Value::from("bottom"));
        assert!(!rt.shared.adopting.get());
    }

    struct PanickingWaker;

    impl futures::task::ArcWake for PanickingWaker {
        fn wake_by_ref(_: &std::sync::Arc<Self>) {
            panic!("waker panicked");
        }
    }

    #[test]
    fn adoption_recovers_after_a_reaction_unwinds() {
        use futures::FutureExt;
        use std::task::Context;

        let rt = Runtime::new();
        let p = rt.pending();
        let waker = futures::task::waker(std::sync::Arc::new(PanickingWaker));
        let mut waiter = p.waiter();
        assert!(waiter.poll_unpin(&mut Context::from_waker(&waker)).is_pending());

        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            fulfill(&p, Value::thenable(Throwing))
        }));
        assert!(unwound.is_err());
        assert_eq!(p.reason().unwrap(), Value::from("then threw"));
        assert!(!rt.shared.adopting.get());

        let next = rt.pending();
        fulfill(&next, Value::thenable(Immediate(9.into())));
        assert_eq!(next.value().unwrap(), Value::from(9));
    }

    #[test]
    fn fulfilling_with_itself_rejects() {
        let rt = Runtime::new();
        let p = rt.pending();
        fulfill(&p, p.clone().into());
        assert_eq!(p.reason().unwrap(), Value::from(Error::SelfResolution));
    }

    #[test]
    fn react_passes_through_without_a_handler() {
        let rt = Runtime::new();
        let p = rt.pending();
        react(&p, None, Some(Handler::new(|_| Ok(0.into()))), &Outcome::Fulfilled(3.into()));
        assert_eq!(p.value().unwrap(), Value::from(3));
    }

    #[test]
    fn react_keeps_upstream_when_handler_declines() {
        let rt = Runtime::new();
        let p = rt.pending();
        let upstream = Outcome::Rejected("original".into());
        react(&p, None, Some(Handler::new(|_| Ok(Value::Undefined))), &upstream);
        assert_eq!(p.outcome(), Some(upstream));
    }

    #[test]
    fn react_passes_the_bound_context() {
        let rt = Runtime::new();
        let p = rt.pending();
        p.set_context("ctx".into());
        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        let handler = Handler::with_context(move |context, value| {
            flag.set(*context == Value::from("ctx"));
            Ok(value)
        });
        react(&p, Some(handler), None, &Outcome::Fulfilled(1.into()));
        assert!(seen.get());
    }
}
