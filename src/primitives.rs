//! Built in operators implemented within the compiler rather than as calls.
//!
//! An operator call never looks up a function value; the operands are lowered
//! in order and the matching entry of the runtime table is copied straight
//! into the generated code.
use crate::{
    compiler::{emit::eval, state::State},
    core::{Error, Form},
    loader::Code,
    rt::Binary,
};
use log::trace;

/// Lower `(name args..)` if `name` is a built in operator
pub fn call(s: &mut State, name: &str, args: &[Form], line: usize) -> Option<Result<Code, Error>> {
    let op = s.ctx.runtime.operator(name)?;

    match args {
        [x, y] => Some(binary(s, op, x, y)),
        _ => Some(Err(Error::unsupported(
            format!("`{}` expects 2 arguments, got {}", name, args.len()),
            line,
        ))),
    }
}

/// Operands are evaluated left to right
fn binary(s: &mut State, op: Binary, x: &Form, y: &Form) -> Result<Code, Error> {
    trace!("Lowering primitive {} {}", x, y);
    let x = eval(s, x)?;
    let y = eval(s, y)?;

    Ok(Box::new(move |f| {
        let a = x(f)?;
        let b = y(f)?;
        op(&a, &b)
    }))
}
