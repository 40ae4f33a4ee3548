//! Dynamically typed payloads carried by promises.
//!
//! Values are cheap to clone: everything larger than a scalar sits behind an
//! `Rc`. Promises, foreign thenables and host objects compare by identity,
//! everything else structurally.
use crate::{Error, Promise, Resolvers};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// The callable `then` member of a thenable. It receives the callbacks that
/// settle the adopting promise; an `Err` counts as a synchronous throw.
pub type ThenFn = Box<dyn FnOnce(Resolvers) -> Result<(), Value>>;

/// A foreign object that may expose a `then` member.
///
/// ```
/// use thenable::{Resolvers, Runtime, ThenFn, Thenable, Value};
///
/// struct Later(f64);
///
/// impl Thenable for Later {
///     fn lookup_then(&self) -> Result<Option<ThenFn>, Value> {
///         let value = self.0;
///         Ok(Some(Box::new(move |resolvers: Resolvers| -> Result<(), Value> {
///             resolvers.fulfill(value.into());
///             Ok(())
///         })))
///     }
/// }
///
/// let rt = Runtime::new();
/// let p = rt.resolve(Value::thenable(Later(3.0)));
/// assert_eq!(p.value().unwrap(), Value::from(3));
/// ```
pub trait Thenable {
    /// Reads the `then` member.
    ///
    /// `Err(reason)` means the read itself failed, `Ok(None)` that there is
    /// no callable `then` and the object is an ordinary value.
    fn lookup_then(&self) -> Result<Option<ThenFn>, Value>;
}

/// Result of probing a value for a callable `then`.
pub enum Capability {
    NotThenable,
    Thenable(ThenFn),
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::NotThenable => f.write_str("NotThenable"),
            Capability::Thenable(_) => f.write_str("Thenable"),
        }
    }
}

#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    Array(Rc<[Value]>),
    Error(Rc<Error>),
    Promise(Promise),
    Thenable(Rc<dyn Thenable>),
    Object(Rc<dyn Any>),
}

impl Value {
    /// Wraps a host object. Objects compare by identity.
    pub fn object<T: Any>(object: T) -> Self {
        Value::Object(Rc::new(object))
    }

    pub fn thenable<T: Thenable + 'static>(thenable: T) -> Self {
        Value::Thenable(Rc::new(thenable))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }

    pub fn as_promise(&self) -> Option<&Promise> {
        match self {
            Value::Promise(p) => Some(p),
            _ => None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Object(object) => object.downcast_ref(),
            _ => None,
        }
    }
}

fn same_rc<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::as_ptr(a) as *const () == Rc::as_ptr(b) as *const ()
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Error(a), Value::Error(b)) => a == b,
            (Value::Promise(a), Value::Promise(b)) => a == b,
            (Value::Thenable(a), Value::Thenable(b)) => same_rc(a, b),
            (Value::Object(a), Value::Object(b)) => same_rc(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Array(items) => f.debug_list().entries(items.iter()).finish(),
            Value::Error(err) => write!(f, "Error({err})"),
            Value::Promise(p) => write!(f, "{p:?}"),
            Value::Thenable(_) => f.write_str("[thenable]"),
            Value::Object(_) => f.write_str("[object]"),
        }
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into())
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items.into())
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Value::Error(Rc::new(err))
    }
}

impl From<Promise> for Value {
    fn from(p: Promise) -> Self {
        Value::Promise(p)
    }
}
