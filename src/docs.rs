/*!
# ✏ Other notes and documentation

# Embedding

A host usually creates one [`Environment`](crate::env::Environment), builds a
[`HostBindings`](crate::host::HostBindings) table with whatever it wants
scripts to reach, and opens one [`Session`](crate::session::Session) per
thread that evaluates code:

```rust
use lispjit::{bridge::EntityBridge, env::Environment, host::HostBindings, session::Session};
use std::sync::Arc;

let env = Environment::shared();
let bridge = EntityBridge::new();

let mut host = HostBindings::prelude();
bridge.register(&mut host);
let host = Arc::new(host);

let mut game = Session::with_host(Arc::clone(&env), Arc::clone(&host));
game.eval(r#"(host-call "game.Bridge" "addEntityAt" "crate" 0 0 0)"#).unwrap();

assert_eq!(bridge.drain_spawns().len(), 1);
```

Scripts can drain the queues too. [`bridge::DEFINITIONS`](crate::bridge::DEFINITIONS)
defines `add`, `rem`, `drain-spawns` and `drain-removals`, and
[`drained_spawns`](crate::bridge::drained_spawns) reads the value a frame's
`(drain-spawns)` returned.

Every value is `Send + Sync`, so a closure returned by one session can be
called from any thread with [`Value::call`](crate::value::Value::call).

# Locking

Each compile takes the environment lock for both of its passes, so the
registrations of one `eval` are never interleaved with another's. That is
all the engine does on its own.

Consider a console thread defining `f` while the render thread keeps
evaluating `(f)`. Each evaluation is consistent, but nothing orders them. If
several evaluations have to appear as one step to other sessions, hold an
exclusive section around them:

```rust
# use lispjit::{env::Environment, session::Session};
# let env = Environment::shared();
# let mut s = Session::with_environment(env.clone());
let section = env.exclusive();
s.eval("(def (f) 1)").unwrap();
s.eval("(def (g) (f))").unwrap();
drop(section);
```

The lock is re-entrant, so the thread holding the section keeps compiling;
other threads block on their next compile until it is dropped. The closures
given to [`Environment::read`](crate::env::Environment::read) and
[`Environment::write`](crate::env::Environment::write) are different: an
`eval` from inside one fails with an internal error, since the tables are
already borrowed.

Generated code runs with the lock released. Host functions are called on
the thread that runs the script, and a host call that blocks or never
returns blocks that thread; there are no timeouts.

# Known limitations

### 1. One level of capture

Capture analysis doesn't look inside nested lambdas. A lambda that reads a
variable from two levels up fails with an unresolved symbol, because the
lambda in between never captured it:

```lisp
(def (f x) (lambda (y) (lambda (z) (+ x z))))   ; unresolved `x`
```

Binding the value in the middle lambda first works around it.

### 2. Only the last expression runs

A batch of top level forms runs the last non-definition form only. The
earlier ones are not compiled or evaluated, and a warning is logged.

### 3. Whole program recompilation

Each `eval` recompiles every definition the session has seen, and every
`defvar` initializer runs again, in order. Side effects in initializers
repeat.

### 4. Redefinition

A redefined function only changes later programs. Closures already handed
out keep calling the definitions of the program they came from.

### 5. Cycles

A `defvar` holding a closure from the same program forms a reference cycle
through the program's statics and is never freed.

### 6. Host resolution

Host members are matched by name and argument count only. An instance
method can only be called on a static field's value, not on an arbitrary
expression.

### 7. Depth

Lists nest at most [`MAX_DEPTH`](crate::parser::MAX_DEPTH) levels, and
function calls at most [`MAX_CALL_DEPTH`](crate::loader::MAX_CALL_DEPTH)
levels on one thread. Going past either is an error from that `eval`, not
a crash, but there are no tail calls: a loop written as recursion is
limited to that many iterations.

### 8. Numbers

Numbers are doubles and follow the JVM's literal syntax: `1d`, `2.5f`,
`+NaN`, `-Infinity` and hex floats such as `0x1.8p1` are all numbers.
*/
