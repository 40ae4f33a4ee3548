//! The promise state machine.
//!
//! A promise starts pending and settles exactly once. While pending it keeps
//! an ordered queue of reactions; settling writes the state, then runs the
//! queue in registration order on the settling call stack. Reactions
//! registered after settlement are never queued: they run on the next tick.
use crate::resolve;
use crate::{Error, Outcome, Runtime, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

pub(crate) type Reaction = Box<dyn FnOnce(&Outcome)>;

struct Inner {
    runtime: Runtime,
    state: RefCell<Option<Outcome>>,
    reactions: RefCell<Vec<Reaction>>,
    context: RefCell<Value>,
}

/// A single-assignment container for a value that arrives later.
///
/// Cloning a `Promise` clones the handle, not the state.
#[derive(Clone)]
pub struct Promise {
    inner: Rc<Inner>,
}

impl Promise {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            inner: Rc::new(Inner {
                runtime: runtime.clone(),
                state: RefCell::new(None),
                reactions: RefCell::new(Vec::new()),
                context: RefCell::new(Value::Undefined),
            }),
        }
    }

    /// Whether `value` exposes a callable `then`.
    pub fn is(value: &Value) -> bool {
        match value {
            Value::Promise(_) => true,
            Value::Thenable(thenable) => matches!(
                crate::safe_call(|| thenable.lookup_then()),
                Ok(Some(_))
            ),
            _ => false,
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }

    /// The context handlers of this promise are invoked with.
    pub fn context(&self) -> Value {
        self.inner.context.borrow().clone()
    }

    pub(crate) fn set_context(&self, context: Value) {
        *self.inner.context.borrow_mut() = context;
    }

    pub fn is_pending(&self) -> bool {
        self.inner.state.borrow().is_none()
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn is_fulfilled(&self) -> bool {
        matches!(*self.inner.state.borrow(), Some(Outcome::Fulfilled(_)))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(*self.inner.state.borrow(), Some(Outcome::Rejected(_)))
    }

    /// The settled state, `None` while pending.
    pub fn outcome(&self) -> Option<Outcome> {
        self.inner.state.borrow().clone()
    }

    pub fn value(&self) -> Result<Value, Error> {
        match &*self.inner.state.borrow() {
            Some(Outcome::Fulfilled(value)) => Ok(value.clone()),
            _ => Err(Error::NotFulfilled),
        }
    }

    pub fn reason(&self) -> Result<Value, Error> {
        match &*self.inner.state.borrow() {
            Some(Outcome::Rejected(reason)) => Ok(reason.clone()),
            _ => Err(Error::NotRejected),
        }
    }

    /// Number of reactions waiting for settlement.
    pub fn queued(&self) -> usize {
        self.inner.reactions.borrow().len()
    }

    /// Writes `outcome` unless the promise is already settled, then runs
    /// the queued reactions. Returns whether this call settled the promise.
    pub(crate) fn complete(&self, outcome: Outcome) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.is_some() {
                tracing::trace!("promise already settled, ignoring outcome");
                return false;
            }
            *state = Some(outcome.clone());
        }
        let reactions = std::mem::take(&mut *self.inner.reactions.borrow_mut());
        tracing::trace!(
            fulfilled = outcome.is_fulfilled(),
            reactions = reactions.len(),
            "promise settled"
        );
        for reaction in reactions {
            reaction(&outcome);
        }
        true
    }

    /// Runs `reaction` at settlement, or on the next tick if already settled.
    pub(crate) fn on_settle(&self, reaction: Reaction) {
        let settled = self.inner.state.borrow().clone();
        match settled {
            Some(outcome) => self.inner.runtime.next_tick(move || reaction(&outcome)),
            None => self.inner.reactions.borrow_mut().push(reaction),
        }
    }

    /// Registers `reaction` on behalf of `child`, which inherits this
    /// promise's context unless it has been bound already.
    pub(crate) fn subscribe(&self, child: &Promise, reaction: Reaction) {
        if child.context().is_undefined() {
            child.set_context(self.context());
        }
        self.on_settle(reaction);
    }
}

impl PartialEq for Promise {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner.state.borrow() {
            None => write!(f, "Promise(pending, {} queued)", self.queued()),
            Some(Outcome::Fulfilled(value)) => write!(f, "Promise(fulfilled: {value:?})"),
            Some(Outcome::Rejected(reason)) => write!(f, "Promise(rejected: {reason:?})"),
        }
    }
}

/// The pair of callbacks handed to a resolver or to a thenable's `then`.
///
/// Both settle the same promise and only the first call has any effect.
#[derive(Clone, Debug)]
pub struct Resolvers {
    promise: Promise,
}

impl Resolvers {
    pub(crate) fn new(promise: &Promise) -> Self {
        Self {
            promise: promise.clone(),
        }
    }

    /// Fulfills the promise, adopting `value` if it is thenable.
    pub fn fulfill(&self, value: Value) {
        resolve::fulfill(&self.promise, value);
    }

    pub fn reject(&self, reason: Value) {
        resolve::reject(&self.promise, reason);
    }

    pub fn promise(&self) -> &Promise {
        &self.promise
    }
}
