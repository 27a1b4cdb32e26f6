// Integration tests
use lispjit::{
    bridge::EntityBridge,
    cli,
    core::*,
    env::Environment,
    host::{HostBindings, HostType},
    parser::MAX_DEPTH,
    session::Session,
    value::Value,
};
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;
use rand::random;
use std::{sync::Arc, thread};

// Step 1: Literals
mod literals {
    use super::*;

    #[test]
    fn unit() {
        test_many(&[
            ("0", "0.0"),
            ("42", "42.0"),
            ("-7", "-7.0"),
            ("3.25", "3.25"),
            ("1e3", "1000.0"),
            ("\"hello world\"", "hello world"),
            ("\"\"", ""),
            ("()", "nil"),
            ("true", "true"),
            ("false", "false"),
            ("nil", "nil"),
        ]);
    }

    // Printing a number and reading it back gives the same value
    #[quickcheck]
    fn numbers(x: f64) -> TestResult {
        if !x.is_finite() {
            return TestResult::discard();
        }

        let mut s = Session::new();
        TestResult::from_bool(s.eval(&format!("{:?}", x)) == Ok(Value::from(x)))
    }

    #[quickcheck]
    fn strings(text: String) -> TestResult {
        if text.contains('"') {
            return TestResult::discard();
        }

        let mut s = Session::new();
        TestResult::from_bool(s.eval(&format!("\"{}\"", text)) == Ok(Value::from(text)))
    }
}

// Step 2: Built in operators
mod binary {
    mod unit {
        use super::super::*;
        use pretty_assertions::assert_eq;

        #[test]
        fn arithmetic() {
            test_many(&[
                ("(+ 10 20)", "30.0"),
                ("(- 10 20)", "-10.0"),
                ("(* 2.5 4)", "10.0"),
                ("(/ 1 4)", "0.25"),
                ("(+ 40 (* 1 2))", "42.0"),
            ]);
        }

        #[test]
        fn comparison() {
            test_many(&[("(< 1 2)", "true"), ("(> 1 2)", "false"), ("(< 2 2)", "false")]);
        }

        #[test]
        fn concat() {
            test_many(&[
                ("(string-concat \"foo\" \"bar\")", "foobar"),
                ("(string-concat \"n: \" 4)", "n: 4.0"),
                ("(string-concat nil true)", "niltrue"),
            ]);
        }

        #[test]
        fn type_error() {
            assert_eq!(
                eval("(* \"3\" 2)"),
                Err(Error::Type { operator: "*", found: "string" })
            );
        }
    }

    mod quick {
        use super::super::*;

        #[quickcheck]
        fn plus(x: i32, y: i32) {
            test1(&format!("(+ {} {})", x, y), &format!("{:?}", f64::from(x) + f64::from(y)))
        }

        #[quickcheck]
        fn multiply(x: i32, y: i32) {
            test1(&format!("(* {} {})", x, y), &format!("{:?}", f64::from(x) * f64::from(y)))
        }

        #[quickcheck]
        fn less(x: i32, y: i32) {
            test1(&format!("(< {} {})", x, y), &(x < y).to_string())
        }
    }
}

// Step 3: Conditionals
mod cond {
    use super::*;

    #[test]
    fn truthiness() {
        test_many(&[
            ("(if 0 \"a\" \"b\")", "a"),
            ("(if \"\" \"a\" \"b\")", "a"),
            ("(if false \"a\" \"b\")", "b"),
            ("(if nil \"a\" \"b\")", "b"),
            ("(if () \"a\" \"b\")", "b"),
            ("(if false 1)", "nil"),
        ]);
    }

    #[test]
    fn nested() {
        test1("(if (< 1 2) (if (> 1 2) 1 2) 3)", "2.0");
    }
}

// Step 4: Let bindings
mod bindings {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sequential() {
        test_many(&[
            ("(let (x 1 y (+ x 1)) y)", "2.0"),
            ("(let (x 1 x (+ x 1)) x)", "2.0"),
            ("(let (x 1) (let (x (+ x 10)) x))", "11.0"),
            ("(let (a 1 b 2) a b)", "2.0"),
        ]);
    }

    #[test]
    fn scoped() {
        assert_eq!(eval("(let (x 1) x) x"), Err(Error::Unresolved { name: "x".into(), line: 1 }));
    }
}

// Step 5: Functions and closures
mod functions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn closures() {
        let mut s = Session::new();
        s.eval("(def (make-adder x) (lambda (y) (+ x y)))").unwrap();
        assert_eq!(s.eval("(let (add5 (make-adder 5)) (add5 10))"), Ok(Value::from(15.0)));
    }

    #[test]
    fn forward_reference() {
        test1("(def (a x) (b x)) (def (b x) (* x 3)) (a 5)", "15.0");
    }

    #[test]
    fn recursion() {
        test1("(def (fib n) (if (< n 2) n (+ (fib (- n 1)) (fib (- n 2))))) (fib 15)", "610.0");
    }

    #[test]
    fn evaluation_order() {
        // The callee expression is evaluated after its arguments, so a
        // failing argument wins over a non callable head
        assert_eq!(eval("(1 (+ nil 1))"), Err(Error::Type { operator: "+", found: "nil" }));

        // Both sides log, so the order is visible
        let log = Arc::new(Mutex::new(vec![]));
        let l = Arc::clone(&log);
        let mut host = HostBindings::new();
        host.register(
            "Log",
            HostType::new().function("push", 1, move |args| -> Result<(), Error> {
                l.lock().push(args[0].to_string());
                Ok(())
            }),
        );

        let mut s = Session::with_host(Environment::shared(), Arc::new(host));
        s.eval("(def (id x) x)").unwrap();
        s.eval("((let (_ (host-call \"Log\" \"push\" \"callee\")) id) (host-call \"Log\" \"push\" \"arg\"))")
            .unwrap();

        assert_eq!(*log.lock(), vec!["arg".to_string(), "callee".to_string()]);
    }

    #[test]
    fn arity() {
        assert_eq!(
            eval("(def (f x) x) (f 1 2)"),
            Err(Error::Arity { name: "f".into(), expected: 1, found: 2 })
        );
    }

    #[test]
    fn host_calls_closure() {
        let mut s = Session::new();
        let add = s.eval("(lambda (a b) (+ a b))").unwrap();
        assert_eq!(add.call(&[Value::from(1.0), Value::from(2.0)]), Ok(Value::from(3.0)));
    }

    #[test]
    fn nested_lambdas() {
        assert!(matches!(
            eval("(def (f x) (lambda (y) (lambda (z) (+ x z)))) (f 1)"),
            Err(Error::Unresolved { .. })
        ));

        // One level deep is fine, even through a let
        test1("(def (f x) (lambda (y) (let (s (+ x y)) s))) ((f 1) 2)", "3.0");
    }
}

// Step 6: Sessions
mod sessions {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn incremental() {
        let mut s = Session::new();

        assert_eq!(s.eval("(defvar greeting \"hello\")"), Ok(Value::Nil));
        assert_eq!(s.eval("(def (greet who) (string-concat greeting who))"), Ok(Value::Nil));
        assert_eq!(s.eval("(greet \" world\")"), Ok(Value::from("hello world")));
    }

    #[test]
    fn redefinition() {
        let mut s = Session::new();

        s.eval("(def (f) \"old\")").unwrap();
        let closure = s.eval("(lambda () (f))").unwrap();

        s.eval("(def (f) \"new\")").unwrap();

        assert_eq!(s.eval("(f)"), Ok(Value::from("new")));
        assert_eq!(closure.call(&[]), Ok(Value::from("old")));
    }

    #[test]
    fn failed_eval_keeps_state() {
        let mut s = Session::new();
        s.eval("(def (f) 1)").unwrap();

        assert!(s.eval("(def (g) (h))").is_err());
        assert_eq!(s.eval("(f)"), Ok(Value::from(1.0)));
        assert_eq!(s.forms().len(), 1);
    }

    #[test]
    fn concurrent() {
        let env = Environment::shared();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let env = Arc::clone(&env);
                thread::spawn(move || {
                    let mut s = Session::with_environment(env);
                    let mut names = vec![];

                    for i in 0..10 {
                        let name = format!("f{:x}", random::<u64>());
                        s.eval(&format!("(def ({} x) (+ x {}))", name, i)).unwrap();
                        assert_eq!(s.eval(&format!("({} 1)", name)), Ok(Value::from(f64::from(i + 1))));
                        names.push(name);
                    }
                    names
                })
            })
            .collect();

        let names: Vec<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();

        // No lost registrations
        env.read(|t| {
            for name in &names {
                assert_eq!(t.function(name).map(|f| f.arity), Some(1), "missing {}", name);
            }
        });
    }

    #[test]
    fn shared_globals() {
        let env = Environment::shared();
        let mut console = Session::with_environment(Arc::clone(&env));
        let mut game = Session::with_environment(env);

        console.eval("(defvar speed 10)").unwrap();

        // Known to the environment, but not defined by `game`'s programs
        assert!(matches!(game.eval("speed"), Err(Error::Runtime(_))));
        assert!(matches!(game.eval("nope"), Err(Error::Unresolved { .. })));
    }
}

// Step 7: Host calls
mod host {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn math() {
        test_many(&[
            ("(host-call \"Math\" \"sqrt\" 2.25)", "1.5"),
            ("(java-call \"Math\" \"pow\" 2 8)", "256.0"),
            ("(java-call \"Math\" \"floor\" -1.5)", "-2.0"),
        ]);
    }

    #[test]
    fn resolution() {
        assert_eq!(
            eval("(java-call \"Math\" \"sqrt\")"),
            Err(Error::HostResolution { type_name: "Math".into(), member: "sqrt".into(), arity: 0, line: 1 })
        );
        assert!(matches!(
            eval("(let (m \"Math\") (host-call m \"sqrt\" 4))"),
            Err(Error::Unsupported { .. })
        ));
    }

    #[test]
    fn bridge() {
        let bridge = EntityBridge::new();
        let mut host = HostBindings::prelude();
        bridge.register(&mut host);

        let env = Environment::shared();
        let host = Arc::new(host);
        let mut script = Session::with_host(Arc::clone(&env), Arc::clone(&host));

        script
            .eval("(def (spawn path) (host-call \"game.Bridge\" \"addEntityAt\" path 1 2 3))")
            .unwrap();

        // Render loop on another thread drains what the script queued
        let b = Arc::clone(&bridge);
        let render = thread::spawn(move || {
            let mut seen = vec![];
            while seen.len() < 2 {
                seen.extend(b.drain_spawns().into_iter().map(|r| r.path));
                thread::yield_now();
            }
            seen
        });

        script.eval("(spawn \"a\")").unwrap();
        script.eval("(spawn \"b\")").unwrap();

        assert_eq!(render.join().unwrap(), vec!["a".to_string(), "b".to_string()]);
    }
}

// Step 8: Errors
mod errors {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse() {
        assert_eq!(eval("\"open"), Err(Error::parse("unterminated string literal", 1)));
        assert_eq!(eval("(+ 1 2))"), Err(Error::parse("unexpected `)`", 1)));
    }

    #[test]
    fn phases() {
        assert!(eval("(+ 1").unwrap_err().is_compile_time());
        assert!(eval("(f)").unwrap_err().is_compile_time());
        assert!(!eval("(+ 1 \"x\")").unwrap_err().is_compile_time());
    }

    #[test]
    fn too_deep() {
        let mut s = Session::new();
        s.eval("(def (count n) (if (< n 1) 0 (+ 1 (count (- n 1)))))").unwrap();

        assert_eq!(s.eval("(count 100)"), Ok(Value::from(100.0)));
        assert!(matches!(s.eval("(count 100000)"), Err(Error::Runtime(_))));

        let nested = format!("{}1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(matches!(s.eval(&nested), Err(Error::Parse { .. })));

        let folded = format!("{}0{}", "(+ 1 ".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert!(s.eval(&folded).unwrap_err().is_compile_time());

        // The session is still usable
        assert_eq!(s.eval("(count 10)"), Ok(Value::from(10.0)));
    }

    #[test]
    fn top_level_only() {
        assert!(matches!(eval("(if true (defvar x 1))"), Err(Error::Unsupported { .. })));
        assert!(matches!(eval("(def f 1)"), Err(Error::Unsupported { .. })));
    }
}

// Evaluate in a fresh session
fn eval(input: &str) -> Result<Value, Error> {
    Session::new().eval(input)
}

fn test_many(tests: &[(&str, &str)]) {
    for (inp, out) in tests.iter() {
        test1(inp, out);
    }
}

// Run a single program through the CLI and compare the printed result
fn test1(input: &str, output: &str) {
    let config = Config { program: input.to_string() };

    match cli::run(&config, cli::Action::Run) {
        Ok(Some(result)) => assert_eq!(result, output, "Failed: {} != {}", input, output),
        Ok(None) => panic!("Test produced no output"),
        Err(e) => panic!("{}", e),
    }
}
