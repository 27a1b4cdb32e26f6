//! Functions and closures
//!
//! Every `def` and every `lambda` is compiled into its own artifact with a
//! fresh compilation state. A `def` has no captures at all; any name its body
//! uses must be a parameter, a `let` local or a global. A `lambda` captures
//! the names [`lang::captures`] reports, and each becomes a field whose value
//! is read from the enclosing scope when the closure is constructed.
//!
//! The body of a lambda is compiled with only its parameters and captures in
//! scope. Since capture analysis doesn't look inside nested lambdas, a
//! lambda that reads a variable from two or more levels up fails to compile
//! with an unresolved symbol; see [`docs`](crate::docs).
use crate::{
    compiler::{
        emit::{self, symbol},
        state::{Context, State},
    },
    core::{Error, Form},
    lang,
    loader::{Artifact, ArtifactId, Code, Kind},
};
use log::debug;
use std::sync::Arc;

/// Compile a top level `def` into a function artifact
pub fn function(
    ctx: &Context,
    parent: ArtifactId,
    name: &str,
    params: &[String],
    body: &[Form],
) -> Result<Arc<Artifact>, Error> {
    let mut s = State::new(ctx, name, Some(parent), params, vec![]);
    let code = emit::body(&mut s, body)?;
    let unit = s.finish(Kind::Function, params.to_vec(), code);

    debug!("Compiled function `{}`/{} as {}", name, params.len(), unit.id);
    Ok(unit)
}

/// Compile `(lambda (params..) body..)` and emit code that constructs the
/// closure.
///
/// The lambda's artifact is only linked once the whole program compiled; at
/// run time each evaluation of the form creates a new closure holding the
/// current values of its captures, in capture set order.
pub fn closure(s: &mut State, args: &[Form], line: usize) -> Result<Code, Error> {
    let (params, body) = match args {
        [params, body @ ..] => (lang::params(params, "lambda")?, body),
        [] => return Err(Error::unsupported("`lambda` expects a parameter list", line)),
    };

    let captured: Vec<String> = lang::captures(body, &params, s.ctx.tables).into_iter().collect();

    let name = format!("{}/lambda", s.name);
    let mut inner = State::new(s.ctx, &name, Some(s.id), &params, captured.clone());
    let code = emit::body(&mut inner, body)?;
    let unit = inner.finish(Kind::Lambda, params, code);

    debug!("Compiled `{}` as {} capturing {:?}", unit.name, unit.id, captured);
    s.ctx.defer(Arc::clone(&unit));

    // Resolve every captured name in the enclosing scope
    let fields = captured.iter().map(|name| symbol(s, name, line)).collect::<Result<Vec<_>, _>>()?;

    Ok(Box::new(move |f| {
        let values = f.eval_all(&fields)?;
        Ok(f.closure(&unit, values))
    }))
}

#[cfg(test)]
mod tests {
    use crate::{compiler::Compiler, core::Error, parser::parse_multiple, value::Value};
    use pretty_assertions::assert_eq;

    fn run(src: &str) -> Result<Value, Error> {
        Compiler::default().run(&parse_multiple(src)?)
    }

    #[test]
    fn closures() {
        let src = "(def (make-adder x) (lambda (y) (+ x y)))
                   (let (add5 (make-adder 5)) (add5 10))";
        assert_eq!(run(src), Ok(Value::from(15.0)));
    }

    #[test]
    fn capture_let_locals() {
        let src = "(def (f a) (let (b (* a 2)) (lambda (c) (+ b c))))
                   ((f 10) 1)";
        assert_eq!(run(src), Ok(Value::from(21.0)));
    }

    #[test]
    fn captured_at_construction() {
        // Each closure keeps the values it was built with
        let src = "(def (k x) (lambda () x))
                   (let (a (k 1) b (k 2)) (- (a) (b)))";
        assert_eq!(run(src), Ok(Value::from(-1.0)));
    }

    #[test]
    fn globals_are_not_captured() {
        let src = "(defvar scale 3)
                   (def (square x) (* x x))
                   ((lambda (n) (* scale (square n))) 4)";
        assert_eq!(run(src), Ok(Value::from(48.0)));
    }

    #[test]
    fn higher_order() {
        let src = "(def (twice f x) (f (f x)))
                   (twice (lambda (n) (* n 3)) 2)";
        assert_eq!(run(src), Ok(Value::from(18.0)));
    }

    #[test]
    fn recursion() {
        let src = "(def (fact n) (if (< n 2) 1 (* n (fact (- n 1)))))
                   (fact 10)";
        assert_eq!(run(src), Ok(Value::from(3628800.0)));
    }

    #[test]
    fn mutual_recursion() {
        let src = "(def (even n) (if (< n 1) true (odd (- n 1))))
                   (def (odd n) (if (< n 1) false (even (- n 1))))
                   (even 10)";
        assert_eq!(run(src), Ok(Value::Bool(true)));
    }

    #[test]
    fn free_in_def() {
        assert_eq!(
            run("(def (f) (+ outer 1)) (f)"),
            Err(Error::Unresolved { name: "outer".into(), line: 1 })
        );
    }

    #[test]
    fn nested_two_levels() {
        // Capture analysis stops at the inner lambda, so `x` never reaches it
        let src = "(def (f x) (lambda (y) (lambda (z) (+ x z))))";
        assert!(matches!(run(src), Err(Error::Unresolved { .. })));
    }

    #[test]
    fn malformed() {
        assert!(matches!(run("(lambda)"), Err(Error::Unsupported { .. })));
        assert!(matches!(run("(lambda x x)"), Err(Error::Unsupported { .. })));
        assert!(matches!(run("(lambda (1) 1)"), Err(Error::Unsupported { .. })));
    }

    #[test]
    fn display() {
        let v = run("(def (make) (lambda () 1)) (make)").unwrap();
        assert_eq!(v.to_string(), "#<function make/lambda>");
    }
}
