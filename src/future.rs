//! Awaiting a promise from async code.
use crate::{Outcome, Promise};
use std::cell::RefCell;
use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Resolves to the promise's [`Outcome`] once it settles.
///
/// Polling never drives the runtime: something else has to settle the
/// promise, either user code or [`Runtime::run`](crate::Runtime::run).
///
/// # Examples
///
/// ```
/// use futures::executor::block_on;
/// use thenable::{Outcome, Runtime, Value};
///
/// let rt = Runtime::new();
/// let p = rt.resolve("🍓");
/// assert_eq!(block_on(p.waiter()), Outcome::Fulfilled(Value::from("🍓")));
/// ```
#[derive(Debug)]
pub struct Waiter {
    promise: Promise,
    slot: Rc<RefCell<Slot>>,
}

#[derive(Debug)]
enum WakerState {
    /// Nothing registered with the promise yet.
    Fresh,
    /// The promise settled; no more wakeups will come.
    Tainted,
}

#[derive(Debug)]
struct Slot {
    waker: Result<Waker, WakerState>,
}

impl Promise {
    pub fn waiter(&self) -> Waiter {
        Waiter {
            promise: self.clone(),
            slot: Rc::new(RefCell::new(Slot {
                waker: Err(WakerState::Fresh),
            })),
        }
    }
}

impl IntoFuture for Promise {
    type Output = Outcome;
    type IntoFuture = Waiter;

    fn into_future(self) -> Waiter {
        self.waiter()
    }
}

impl Future for Waiter {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.promise.outcome() {
            return Poll::Ready(outcome);
        }
        let previous = std::mem::replace(
            &mut self.slot.borrow_mut().waker,
            Ok(cx.waker().clone()),
        );
        if let Err(WakerState::Fresh) = previous {
            let slot = self.slot.clone();
            self.promise.on_settle(Box::new(move |_| {
                let waker = std::mem::replace(&mut slot.borrow_mut().waker, Err(WakerState::Tainted));
                if let Ok(waker) = waker {
                    waker.wake()
                }
            }));
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Runtime, Value};
    use futures::executor::block_on;
    use futures::task::{waker, ArcWake};
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingWaker(AtomicUsize);

    impl ArcWake for CountingWaker {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn ready_when_already_settled() {
        let rt = Runtime::new();
        let outcome = block_on(async { rt.reject("nope").await });
        assert_eq!(outcome, Outcome::Rejected(Value::from("nope")));
    }

    #[test]
    fn wakes_once_the_promise_settles() {
        let rt = Runtime::new();
        let d = rt.defer();
        let counter = Arc::new(CountingWaker::default());
        let waker = waker(counter.clone());
        let mut cx = Context::from_waker(&waker);
        let mut waiter = d.promise().waiter();

        assert!(waiter.poll_unpin(&mut cx).is_pending());
        assert!(waiter.poll_unpin(&mut cx).is_pending());
        assert_eq!(d.promise().queued(), 1);
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        d.resolve(5);
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);
        assert_eq!(
            waiter.poll_unpin(&mut cx),
            Poll::Ready(Outcome::Fulfilled(Value::from(5)))
        );
    }

    #[test]
    fn awaits_a_chain_driven_by_the_runtime() {
        let rt = Runtime::new();
        let p = rt.resolve(1).then(|_| Ok("done".into()));
        let waiter = p.waiter();
        rt.run().unwrap();
        assert_eq!(block_on(waiter), Outcome::Fulfilled(Value::from("done")));
    }
}
