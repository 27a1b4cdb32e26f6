//! Runtime primitives implemented in Rust!
//!
//! A fixed, stateless table of operations on dynamic values. Every generated
//! artifact carries a reference to the table it was compiled against and the
//! code generator copies the function pointers it needs straight into the
//! generated closures, so running an artifact never looks anything up.
//!
//! Semantics are the same everywhere:
//!
//! - Arithmetic works on numbers only and always in double precision
//! - `<` and `>` return one of the two boolean singletons
//! - Only `nil` and `false` are falsy; `0` and `""` are truthy
//! - `string-concat` accepts anything and concatenates the textual forms
use crate::{core::Error, value::Value};
use log::trace;

/// Signature shared by every binary primitive
pub type Binary = fn(&Value, &Value) -> Result<Value, Error>;

pub struct Runtime {
    pub truthy: fn(&Value) -> bool,
    pub add: Binary,
    pub sub: Binary,
    pub mul: Binary,
    pub div: Binary,
    pub lt: Binary,
    pub gt: Binary,
    pub concat: Binary,
}

/// The one runtime table in the process
pub static RUNTIME: Runtime =
    Runtime { truthy, add, sub, mul, div, lt, gt, concat };

impl Runtime {
    /// Primitive implementing the built in operator `name`
    pub fn operator(&self, name: &str) -> Option<Binary> {
        trace!("Looking up primitive `{}`", name);
        match name {
            "+" => Some(self.add),
            "-" => Some(self.sub),
            "*" => Some(self.mul),
            "/" => Some(self.div),
            "<" => Some(self.lt),
            ">" => Some(self.gt),
            "string-concat" => Some(self.concat),
            _ => None,
        }
    }
}

fn truthy(v: &Value) -> bool {
    !matches!(v, Value::Nil | Value::Bool(false))
}

fn add(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::Number(x.to_number("+")? + y.to_number("+")?))
}

fn sub(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::Number(x.to_number("-")? - y.to_number("-")?))
}

fn mul(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::Number(x.to_number("*")? * y.to_number("*")?))
}

/// IEEE division; dividing by zero is an infinity or NaN, never an error
fn div(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::Number(x.to_number("/")? / y.to_number("/")?))
}

fn lt(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::Bool(x.to_number("<")? < y.to_number("<")?))
}

fn gt(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::Bool(x.to_number(">")? > y.to_number(">")?))
}

fn concat(x: &Value, y: &Value) -> Result<Value, Error> {
    Ok(Value::from(format!("{}{}", x, y)))
}
