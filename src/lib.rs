/*!

# A tiny lisp that compiles to closures

lispjit is an embeddable scripting engine for a small lisp. Source text is
parsed into forms and compiled straight into trees of native Rust closures,
one artifact per function, lambda and program, which are then linked and
called. Nothing is interpreted from the AST at run time.

## Where do I get started? 🕵️‍♀️

Start with [`Session::eval`](session::Session::eval), follow it into
[`Compiler::compile`](compiler::Compiler::compile) and read the [emit
module](compiler::emit), which implements the bulk of the compiler.

```rust
use lispjit::{session::Session, value::Value};

let mut s = Session::new();
s.eval("(def (make-adder x) (lambda (y) (+ x y)))").unwrap();

let v = s.eval("(let (add5 (make-adder 5)) (add5 10))").unwrap();
assert_eq!(v, Value::from(15.0));
```

## The language

```lisp
42 "text" sym (f a b)            ; numbers, strings, symbols, calls
(if c then else?)                ; only nil and false are falsy
(let (x 1 y (+ x 1)) body..)     ; sequential bindings
(lambda (x) body..)              ; closures capture by value
(def (name params..) body..)     ; top level functions
(defvar name expr)               ; top level globals
(host-call "Type" "member" ..)   ; calls into the host, also `java-call`
+ - * / < > string-concat        ; built in operators, exactly two operands
true false nil                   ; constants
```

## Pipeline

1. [parser] turns text into [`Form`](core::Form)s
2. [compiler] registers every definition in the shared
   [`Environment`](env::Environment), then lowers each form with
   [lang::captures] deciding what closures capture
3. [loader] links the generated artifacts and hands back an invocable entry
   point which evaluates to a [`Value`](value::Value)

See [docs] for notes on embedding, locking and known limitations.

*/

pub mod bridge;
pub mod cli;
pub mod compiler;
pub mod core;
pub mod docs;
pub mod env;
pub mod ffi;
pub mod host;
pub mod lambda;
pub mod lang;
pub mod loader;
pub mod parser;
pub mod primitives;
pub mod rt;
pub mod session;
pub mod value;
