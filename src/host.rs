//! Host bindings
//!
//! Scripts reach into the embedding application through a table of named
//! host types. Each type exposes static functions, static fields and instance
//! methods, looked up by name and positional argument count only. When two
//! members share a name and arity the one registered first wins.
//!
//! Lookups are pure queries made while compiling; nothing here is consulted
//! once code is generated.
use crate::{
    core::Error,
    value::{HostObject, Value},
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io::{self, Write},
    sync::Arc,
};

pub type StaticFn = Arc<dyn Fn(&[Value]) -> Result<Value, Error> + Send + Sync>;
pub type Getter = Arc<dyn Fn() -> Result<Value, Error> + Send + Sync>;
pub type MethodFn = Arc<dyn Fn(&Value, &[Value]) -> Result<Value, Error> + Send + Sync>;

pub struct HostFunction {
    pub name: String,
    pub arity: usize,
    pub call: StaticFn,
}

pub struct HostField {
    pub name: String,
    /// Host type whose methods can be called on the field's value
    pub type_name: String,
    pub get: Getter,
}

pub struct HostMethod {
    pub name: String,
    pub arity: usize,
    pub call: MethodFn,
}

/// Members of one host type
#[derive(Default)]
pub struct HostType {
    functions: Vec<HostFunction>,
    fields: Vec<HostField>,
    methods: Vec<HostMethod>,
}

impl HostType {
    pub fn new() -> Self {
        Default::default()
    }

    /// Add a static function. Return values go through `Into<Value>`, so a
    /// function returning `()` yields `nil`.
    pub fn function<F, R>(mut self, name: &str, arity: usize, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<Value>,
    {
        let call: StaticFn = Arc::new(move |args| f(args).map(Into::into));
        self.functions.push(HostFunction { name: name.to_string(), arity, call });
        self
    }

    pub fn field<F, R>(mut self, name: &str, type_name: &str, get: F) -> Self
    where
        F: Fn() -> R + Send + Sync + 'static,
        R: Into<Value>,
    {
        let get: Getter = Arc::new(move || Ok(get().into()));
        self.fields.push(HostField { name: name.to_string(), type_name: type_name.to_string(), get });
        self
    }

    pub fn method<F, R>(mut self, name: &str, arity: usize, f: F) -> Self
    where
        F: Fn(&Value, &[Value]) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<Value>,
    {
        let call: MethodFn = Arc::new(move |receiver, args| f(receiver, args).map(Into::into));
        self.methods.push(HostMethod { name: name.to_string(), arity, call });
        self
    }
}

#[derive(Default, Clone)]
pub struct HostBindings {
    types: HashMap<String, Arc<HostType>>,
}

impl HostBindings {
    /// No host types at all
    pub fn new() -> Self {
        Default::default()
    }

    /// `Math` and `System` writing to stdout
    pub fn prelude() -> Self {
        Self::prelude_to(io::stdout())
    }

    /// `Math` and `System` with `System.out` writing to `out`
    pub fn prelude_to<W: Write + Send + 'static>(out: W) -> Self {
        let mut host = Self::new();
        let stream = PrintStream(Arc::new(Mutex::new(Box::new(out))));

        host.register(
            "Math",
            HostType::new()
                .function("sqrt", 1, |args| Ok(number(args, 0, "sqrt")?.sqrt()))
                .function("abs", 1, |args| Ok(number(args, 0, "abs")?.abs()))
                .function("floor", 1, |args| Ok(number(args, 0, "floor")?.floor()))
                .function("pow", 2, |args| Ok(number(args, 0, "pow")?.powf(number(args, 1, "pow")?)))
                .function("max", 2, |args| Ok(number(args, 0, "max")?.max(number(args, 1, "max")?)))
                .function("min", 2, |args| Ok(number(args, 0, "min")?.min(number(args, 1, "min")?))),
        );

        host.register(
            "System",
            HostType::new().field("out", "PrintStream", move || HostObject::new("PrintStream", stream.clone())),
        );

        host.register(
            "PrintStream",
            HostType::new()
                .method("println", 1, |out, args| PrintStream::of(out)?.write(args, "\n"))
                .method("println", 0, |out, _| PrintStream::of(out)?.write(&[], "\n"))
                .method("print", 1, |out, args| PrintStream::of(out)?.write(args, "")),
        );

        host
    }

    /// Add or replace a host type
    pub fn register(&mut self, type_name: &str, ty: HostType) {
        self.types.insert(type_name.to_string(), Arc::new(ty));
    }

    /// First static function named `name` taking `arity` arguments
    pub fn static_function(&self, type_name: &str, name: &str, arity: usize) -> Option<&HostFunction> {
        self.types.get(type_name)?.functions.iter().find(|f| f.name == name && f.arity == arity)
    }

    pub fn static_field(&self, type_name: &str, name: &str) -> Option<&HostField> {
        self.types.get(type_name)?.fields.iter().find(|f| f.name == name)
    }

    pub fn instance_method(&self, type_name: &str, name: &str, arity: usize) -> Option<&HostMethod> {
        self.types.get(type_name)?.methods.iter().find(|m| m.name == name && m.arity == arity)
    }
}

/// Numeric argument `index` of a host function
pub fn number(args: &[Value], index: usize, operator: &'static str) -> Result<f64, Error> {
    match args.get(index) {
        Some(v) => v.to_number(operator),
        None => Err(Error::Runtime(format!("`{}` is missing argument {}", operator, index))),
    }
}

/// Text argument `index` of a host function
pub fn text(args: &[Value], index: usize, operator: &str) -> Result<String, Error> {
    match args.get(index) {
        Some(Value::Str(s)) => Ok(s.to_string()),
        Some(v) => Err(Error::Runtime(format!("`{}` expects a string, found {}", operator, v.type_name()))),
        None => Err(Error::Runtime(format!("`{}` is missing argument {}", operator, index))),
    }
}

/// Shared output sink behind `System.out`
#[derive(Clone)]
struct PrintStream(Arc<Mutex<Box<dyn Write + Send>>>);

impl PrintStream {
    fn of(v: &Value) -> Result<&PrintStream, Error> {
        let stream = match v {
            Value::Host(h) => h.downcast_ref::<PrintStream>(),
            _ => None,
        };
        stream.ok_or_else(|| Error::Runtime(format!("expected a PrintStream, found {}", v.type_name())))
    }

    fn write(&self, args: &[Value], end: &str) -> Result<(), Error> {
        let mut out = self.0.lock();
        for a in args {
            write!(out, "{}", a).map_err(|e| Error::Runtime(e.to_string()))?;
        }
        write!(out, "{}", end).and_then(|_| out.flush()).map_err(|e| Error::Runtime(e.to_string()))
    }
}
