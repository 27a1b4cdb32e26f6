//! Dynamic values
//!
//! Every expression evaluates to a `Value`. There are no static types, the
//! operators and the host bindings check the shape of what they receive at
//! run time. Values are cheap to clone; strings, closures and host objects
//! are reference counted and shared between threads.
use crate::{core::Error, loader::ArtifactId};
use std::{any::Any, fmt, sync::Arc};

#[derive(Clone)]
pub enum Value {
    /// The null value; result of an empty list, a missing else branch, or a
    /// host call that returns nothing.
    Nil,
    Bool(bool),
    Number(f64),
    Str(Arc<str>),
    /// Anything that can be applied to a list of arguments
    Callable(Arc<dyn Invocable>),
    /// An opaque value owned by the host
    Host(HostObject),
}

/// The uniform entry point of every function, closure and program.
pub trait Invocable: Send + Sync {
    fn apply(&self, args: &[Value]) -> Result<Value, Error>;

    /// Identity of the generated unit behind this value
    fn identity(&self) -> ArtifactId;

    fn name(&self) -> &str;
}

/// A host value carried through scripts untouched.
///
/// The declared type name is what foreign calls use to find instance
/// methods; the payload is only ever looked at by host code.
#[derive(Clone)]
pub struct HostObject {
    type_name: Arc<str>,
    inner: Arc<dyn Any + Send + Sync>,
}

impl HostObject {
    pub fn new<T: Any + Send + Sync>(type_name: &str, inner: T) -> Self {
        HostObject { type_name: type_name.into(), inner: Arc::new(inner) }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }
}

impl Value {
    /// Name of the dynamic type, used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Callable(_) => "function",
            Value::Host(_) => "host object",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric payload or a type error blaming `operator`
    pub fn to_number(&self, operator: &'static str) -> Result<f64, Error> {
        self.as_number().ok_or(Error::Type { operator, found: self.type_name() })
    }

    /// Invoke a callable value from host code
    pub fn call(&self, args: &[Value]) -> Result<Value, Error> {
        match self {
            Value::Callable(f) => f.apply(args),
            v => Err(Error::NotCallable { found: v.type_name() }),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{:?}", n),
            Value::Str(s) => write!(f, "{}", s),
            Value::Callable(c) => write!(f, "#<function {}>", c.name()),
            Value::Host(h) => write!(f, "#<{}>", h.type_name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Callable(c) => write!(f, "#<function {} {}>", c.name(), c.identity()),
            v => write!(f, "{}", v),
        }
    }
}

/// Structural equality for data, identity for functions and host objects
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Callable(a), Value::Callable(b)) => Arc::ptr_eq(a, b),
            (Value::Host(a), Value::Host(b)) => Arc::ptr_eq(&a.inner, &b.inner),
            _ => false,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

/// Idiomatic type conversions from host types to Value
impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Nil
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s.into())
    }
}

impl From<HostObject> for Value {
    fn from(h: HostObject) -> Self {
        Value::Host(h)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}
