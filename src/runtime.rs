//! The environment every promise lives in.
//!
//! A [`Runtime`] is the root promise factory. It owns the deferred-tick
//! scheduler, the configuration (tick length and fallback error handler),
//! the record of unhandled rejections and the adoption trampoline. Promises
//! keep a handle to the runtime that created them and pass it on to every
//! promise derived from them, so two runtimes never share state.
use crate::resolve;
use crate::scheduler::Scheduler;
use crate::{safe_call, Attempt, Deferred, Error, Outcome, Promise, Resolvers, ThenFn, Value};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// Delay of a deferred tick unless configured otherwise.
pub const DEFAULT_TICK: Duration = Duration::from_millis(4);

/// Called with the reason of a rejection that reached `finally`/`done`
/// without a rejection handler.
pub type Fallback = Rc<dyn Fn(Value)>;

#[derive(Clone)]
pub struct Config {
    /// How long a continuation registered on a settled promise waits.
    pub tick: Duration,
    pub on_error: Option<Fallback>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick: DEFAULT_TICK,
            on_error: None,
        }
    }
}

impl Config {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_fallback<F>(mut self, fallback: F) -> Self
    where
        F: Fn(Value) + 'static,
    {
        self.on_error = Some(Rc::new(fallback));
        self
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("tick", &self.tick)
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

pub(crate) struct Shared {
    pub(crate) config: Config,
    pub(crate) scheduler: Scheduler,
    pub(crate) unhandled: RefCell<VecDeque<Value>>,
    pub(crate) adoptions: RefCell<VecDeque<(ThenFn, Promise)>>,
    pub(crate) adopting: Cell<bool>,
}

/// Handle to a promise environment. Cloning shares it.
///
/// ```
/// use thenable::{Runtime, Value};
///
/// let rt = Runtime::new();
/// let doubled = rt.resolve(21).then(|v| Ok((v.as_number().unwrap_or(0.0) * 2.0).into()));
/// assert!(doubled.is_pending());
/// rt.run().unwrap();
/// assert_eq!(doubled.value().unwrap(), Value::from(42));
/// ```
#[derive(Clone)]
pub struct Runtime {
    pub(crate) shared: Rc<Shared>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.shared.config)
            .field("now", &self.now())
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            shared: Rc::new(Shared {
                config,
                scheduler: Scheduler::default(),
                unhandled: RefCell::new(VecDeque::new()),
                adoptions: RefCell::new(VecDeque::new()),
                adopting: Cell::new(false),
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    /// Virtual time elapsed since the runtime was created.
    pub fn now(&self) -> Duration {
        self.shared.scheduler.now()
    }

    pub fn pending_tasks(&self) -> usize {
        self.shared.scheduler.len()
    }

    /// Runs `task` one tick from now, never in the current turn.
    pub fn next_tick<F>(&self, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.shared
            .scheduler
            .schedule(self.shared.config.tick, Box::new(task));
    }

    pub fn set_timeout<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + 'static,
    {
        self.shared.scheduler.schedule(delay, Box::new(task));
    }

    /// Runs queued tasks until none are left.
    ///
    /// Stops early with [`Error::UnhandledRejection`] when a rejection reaches
    /// a terminal consumer and no fallback handler is configured. Calling
    /// `run` again resumes where it stopped.
    pub fn run(&self) -> Result<(), Error> {
        self.check_unhandled()?;
        while let Some(task) = self.shared.scheduler.pop() {
            task();
            self.check_unhandled()?;
        }
        Ok(())
    }

    /// Runs queued tasks until `promise` settles and returns its outcome.
    pub fn run_until_settled(&self, promise: &Promise) -> Result<Outcome, Error> {
        loop {
            self.check_unhandled()?;
            if let Some(outcome) = promise.outcome() {
                return Ok(outcome);
            }
            match self.shared.scheduler.pop() {
                Some(task) => task(),
                None => return Err(Error::Stalled),
            }
        }
    }

    /// Drains the unhandled rejections recorded so far.
    pub fn take_unhandled(&self) -> Vec<Value> {
        self.shared.unhandled.borrow_mut().drain(..).collect()
    }

    pub(crate) fn report_unhandled(&self, reason: Value) {
        tracing::warn!(?reason, "unhandled rejection");
        self.shared.unhandled.borrow_mut().push_back(reason);
    }

    fn check_unhandled(&self) -> Result<(), Error> {
        match self.shared.unhandled.borrow_mut().pop_front() {
            Some(reason) => Err(Error::UnhandledRejection(reason)),
            None => Ok(()),
        }
    }

    /// A promise that stays pending until something settles it.
    pub fn pending(&self) -> Promise {
        Promise::new(self)
    }

    /// Runs `resolver` immediately with the callbacks that settle the new
    /// promise. A resolver that fails or panics rejects it.
    pub fn promise<F>(&self, resolver: F) -> Promise
    where
        F: FnOnce(Resolvers) -> Result<(), Value>,
    {
        let promise = Promise::new(self);
        let resolvers = Resolvers::new(&promise);
        if let Err(reason) = safe_call(|| resolver(resolvers)) {
            resolve::reject(&promise, reason);
        }
        promise
    }

    /// A promise fulfilled with `value`, or adopting it if it is thenable.
    pub fn resolve(&self, value: impl Into<Value>) -> Promise {
        let promise = Promise::new(self);
        resolve::fulfill(&promise, value.into());
        promise
    }

    pub fn reject(&self, reason: impl Into<Value>) -> Promise {
        let promise = Promise::new(self);
        resolve::reject(&promise, reason.into());
        promise
    }

    /// Calls `f` now and captures its result in a settled promise.
    pub fn try_call<F>(&self, f: F) -> Promise
    where
        F: FnOnce() -> Attempt,
    {
        let promise = Promise::new(self);
        match safe_call(f) {
            Ok(value) => resolve::fulfill(&promise, value),
            Err(reason) => resolve::reject(&promise, reason),
        }
        promise
    }

    pub fn defer(&self) -> Deferred {
        Deferred::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_tick_uses_the_configured_delay() {
        let rt = Runtime::with_config(Config::default().with_tick(Duration::from_millis(10)));
        let hit = Rc::new(Cell::new(false));
        let flag = hit.clone();
        rt.next_tick(move || flag.set(true));
        assert_eq!(rt.pending_tasks(), 1);
        assert!(!hit.get());
        rt.run().unwrap();
        assert!(hit.get());
        assert_eq!(rt.now(), Duration::from_millis(10));
    }

    #[test]
    fn promise_runs_the_resolver_synchronously() {
        let rt = Runtime::new();
        let p = rt.promise(|resolvers| {
            resolvers.fulfill("resolved".into());
            Ok(())
        });
        assert_eq!(p.value().unwrap(), Value::from("resolved"));
    }

    #[test]
    fn promise_rejects_when_the_resolver_fails() {
        let rt = Runtime::new();
        let failed = rt.promise(|_| Err("promise constructor callback error".into()));
        assert!(failed.is_rejected());
        let panicked = rt.promise(|_| panic!("boom"));
        assert_eq!(
            panicked.reason().unwrap(),
            Value::from(Error::Panicked("boom".into()))
        );
    }

    #[test]
    fn try_call_settles_immediately() {
        let rt = Runtime::new();
        let (x, y) = (1, 2);
        let p = rt.try_call(move || Ok(Value::from(vec![Value::from(x), Value::from(y)])));
        assert_eq!(p.value().unwrap(), Value::from(vec![Value::from(1), Value::from(2)]));
        let e = rt.try_call(|| Err("error".into()));
        assert_eq!(e.reason().unwrap(), Value::from("error"));
    }

    #[test]
    fn run_until_settled_reports_a_stall() {
        let rt = Runtime::new();
        let p = rt.pending();
        assert_eq!(rt.run_until_settled(&p), Err(Error::Stalled));
    }

    #[test]
    fn run_until_settled_drives_timers() {
        let rt = Runtime::new();
        let d = rt.defer();
        let later = d.clone();
        rt.set_timeout(Duration::from_millis(250), move || later.resolve("late"));
        let outcome = rt.run_until_settled(d.promise()).unwrap();
        assert_eq!(outcome, Outcome::Fulfilled("late".into()));
        assert_eq!(rt.now(), Duration::from_millis(250));
    }
}
