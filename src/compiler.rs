//! Entry point for the compiler
//!
//! Compilation is whole program: every `eval` hands the accumulated
//! definitions plus the new forms to [`Compiler::compile`], which registers
//! all definitions in the shared environment (pass 1) and then lowers every
//! form into artifacts (pass 2). Nothing is generated if any form fails.
use crate::{
    core::{Error, Form},
    env::Environment,
    host::HostBindings,
    lang::{self, Definition},
    loader::{Instance, Loader, ProcessLoader, Program},
    value::{Invocable, Value},
};
use log::debug;
use std::sync::Arc;

pub struct Compiler {
    env: Arc<Environment>,
    host: Arc<HostBindings>,
    loader: Arc<dyn Loader>,
}

impl Default for Compiler {
    /// Private environment, the standard host prelude and a fresh loader
    fn default() -> Self {
        Compiler::new(
            Environment::shared(),
            Arc::new(HostBindings::prelude()),
            Arc::new(ProcessLoader::new()),
        )
    }
}

impl Compiler {
    pub fn new(env: Arc<Environment>, host: Arc<HostBindings>, loader: Arc<dyn Loader>) -> Self {
        Compiler { env, host, loader }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        &self.env
    }

    pub fn host(&self) -> &Arc<HostBindings> {
        &self.host
    }

    /// Compile `forms` into one program.
    ///
    /// The environment stays locked for both passes, so the signatures seen
    /// by code generation are exactly the ones registered here plus whatever
    /// other sessions registered before.
    pub fn compile(&self, forms: &[Form]) -> Result<Program, Error> {
        let defs = forms
            .iter()
            .filter_map(|f| lang::definition(f).transpose())
            .collect::<Result<Vec<_>, _>>()?;

        let section = self.env.exclusive();

        debug!("Pass 1: registering {} definitions", defs.len());
        {
            let mut tables = section.tables_mut()?;
            for d in &defs {
                match d {
                    Definition::Function { name, params, .. } => {
                        tables.define_function(name, params.len())
                    }
                    Definition::Variable { name, .. } => tables.define_global(name),
                }
            }
        }

        debug!("Pass 2: generating code for {} forms", forms.len());
        let tables = section.tables()?;
        let program = emit::program(&tables, &self.host, forms, &defs)?;
        Ok(program)
    }

    /// Link a program and run its static initialization
    pub fn load(&self, program: Program) -> Result<Instance, Error> {
        program.load(self.loader.as_ref())
    }

    /// Compile, load and invoke `forms` as one program
    pub fn run(&self, forms: &[Form]) -> Result<Value, Error> {
        let program = self.compile(forms)?;
        let id = program.id();
        let entry = self.load(program)?;

        debug!("Running program {}", id);
        entry.apply(&[])
    }
}

/// State for the code generator
pub mod state {
    use crate::{
        core::Error,
        parser::MAX_DEPTH,
        env::Tables,
        host::HostBindings,
        loader::{Artifact, ArtifactId, Code, Kind},
        rt::{Runtime, RUNTIME},
        value::Value,
    };
    use std::{cell::{Cell, RefCell}, collections::HashMap, sync::Arc};

    /// Run time position of every program level name.
    ///
    /// Redefining a function within one program reuses its slot, so only the
    /// last definition is reachable.
    #[derive(Debug, Default)]
    pub struct Layout {
        functions: HashMap<String, usize>,
        globals: Vec<String>,
        index: HashMap<String, usize>,
    }

    impl Layout {
        /// Slot for function `name`, allocating one if needed
        pub fn add_function(&mut self, name: &str) -> usize {
            let next = self.functions.len();
            *self.functions.entry(name.to_string()).or_insert(next)
        }

        /// Slot for global `name`, allocating one if needed
        pub fn add_global(&mut self, name: &str) -> usize {
            if let Some(slot) = self.index.get(name) {
                return *slot;
            }
            self.globals.push(name.to_string());
            self.index.insert(name.to_string(), self.globals.len() - 1);
            self.globals.len() - 1
        }

        pub fn function(&self, name: &str) -> Option<usize> {
            self.functions.get(name).copied()
        }

        pub fn global(&self, name: &str) -> Option<usize> {
            self.index.get(name).copied()
        }

        /// Global names in slot order
        pub fn globals(&self) -> &[String] {
            &self.globals
        }
    }

    /// Everything shared by the artifacts generated in one compile
    pub struct Context<'a> {
        pub tables: &'a Tables,
        pub layout: &'a Layout,
        pub host: &'a HostBindings,
        pub runtime: &'static Runtime,
        lambdas: RefCell<Vec<Arc<Artifact>>>,
        depth: Cell<usize>,
    }

    impl<'a> Context<'a> {
        pub fn new(tables: &'a Tables, layout: &'a Layout, host: &'a HostBindings) -> Self {
            Context {
                tables,
                layout,
                host,
                runtime: &RUNTIME,
                lambdas: RefCell::new(vec![]),
                depth: Cell::new(0),
            }
        }

        /// Enter one more level of list nesting, across every artifact of the
        /// program. Anything the reader accepts fits.
        pub fn nest(&self, line: usize) -> Result<Nesting<'_>, Error> {
            let current = self.depth.get();
            if current >= MAX_DEPTH {
                return Err(Error::unsupported(
                    format!("expression nested more than {} levels deep", MAX_DEPTH),
                    line,
                ));
            }
            self.depth.set(current + 1);
            Ok(Nesting(&self.depth))
        }

        /// Keep a lambda around until the whole program is ready to link
        pub fn defer(&self, unit: Arc<Artifact>) {
            self.lambdas.borrow_mut().push(unit)
        }

        pub fn into_lambdas(self) -> Vec<Arc<Artifact>> {
            self.lambdas.into_inner()
        }
    }

    /// A level of nesting entered with [`Context::nest`]
    pub struct Nesting<'a>(&'a Cell<usize>);

    impl Drop for Nesting<'_> {
        fn drop(&mut self) {
            self.0.set(self.0.get().saturating_sub(1));
        }
    }

    /// How a symbol is reached from generated code
    #[derive(Debug, Clone, PartialEq)]
    pub enum Reference {
        Local(usize),
        Field(usize),
        /// Registered function; `None` when this program doesn't define it
        Function(Option<usize>),
        /// Registered global; `None` when this program doesn't define it
        Global(Option<usize>),
        Constant(Value),
    }

    /// State for generating one artifact; easier to bundle it all into a
    /// struct than pass several arguments in.
    ///
    /// `si` is the next free local slot and `high` the most slots ever in use
    /// at once, which becomes the frame size. Parameters take the first slots.
    ///
    /// `captured` is fixed for the lifetime of the artifact; a name's index
    /// in it is the index of the field holding its value.
    pub struct State<'a> {
        pub id: ArtifactId,
        pub parent: Option<ArtifactId>,
        pub name: String,
        pub ctx: &'a Context<'a>,
        captured: Vec<String>,
        env: Env,
        si: usize,
        high: usize,
    }

    impl<'a> State<'a> {
        pub fn new(
            ctx: &'a Context<'a>,
            name: &str,
            parent: Option<ArtifactId>,
            params: &[String],
            captured: Vec<String>,
        ) -> Self {
            let mut s = State {
                id: ArtifactId::next(),
                parent,
                name: name.to_string(),
                ctx,
                captured,
                env: Default::default(),
                si: 0,
                high: 0,
            };

            for p in params {
                s.set(p);
            }
            s
        }

        pub fn enter(&mut self) {
            self.env.enter(self.si);
        }

        /// Drop the innermost scope and free every slot it allocated
        pub fn leave(&mut self) {
            if let Some(base) = self.env.leave() {
                self.si = base;
            }
        }

        /// Bind `name` to a fresh slot in the current scope
        pub fn set(&mut self, name: &str) -> usize {
            let slot = self.alloc();
            self.env.set(name, slot);
            slot
        }

        fn alloc(&mut self) -> usize {
            let current = self.si;
            self.si += 1;
            self.high = self.high.max(self.si);
            current
        }

        /// Resolve a name: local, captured, global function, global variable
        /// and finally the constants. First match wins.
        pub fn get(&self, name: &str) -> Option<Reference> {
            if let Some(slot) = self.env.get(name) {
                return Some(Reference::Local(slot));
            }

            if let Some(index) = self.captured.iter().position(|c| c == name) {
                return Some(Reference::Field(index));
            }

            if self.ctx.tables.is_function(name) {
                return Some(Reference::Function(self.ctx.layout.function(name)));
            }

            if self.ctx.tables.is_global(name) {
                return Some(Reference::Global(self.ctx.layout.global(name)));
            }

            match name {
                "true" => Some(Reference::Constant(Value::Bool(true))),
                "false" => Some(Reference::Constant(Value::Bool(false))),
                "nil" => Some(Reference::Constant(Value::Nil)),
                _ => None,
            }
        }

        /// Package the generated body into an artifact
        pub fn finish(self, kind: Kind, params: Vec<String>, body: Code) -> Arc<Artifact> {
            Arc::new(Artifact {
                id: self.id,
                parent: self.parent,
                name: self.name,
                kind,
                params,
                fields: self.captured,
                slots: self.high,
                body,
                runtime: self.ctx.runtime,
            })
        }
    }

    struct Scope {
        bindings: HashMap<String, usize>,
        base: usize,
    }

    // Environment is an *ordered* list of scopes, innermost last.
    struct Env(Vec<Scope>);

    impl Default for Env {
        fn default() -> Self {
            Env(vec![Scope { bindings: HashMap::new(), base: 0 }])
        }
    }

    impl Env {
        fn enter(&mut self, base: usize) {
            self.0.push(Scope { bindings: HashMap::new(), base });
        }

        /// The outermost scope holds the parameters and is never left
        fn leave(&mut self) -> Option<usize> {
            if self.0.len() > 1 {
                self.0.pop().map(|scope| scope.base)
            } else {
                None
            }
        }

        fn set(&mut self, name: &str, slot: usize) {
            if let Some(scope) = self.0.last_mut() {
                scope.bindings.insert(name.to_string(), slot);
            }
        }

        fn get(&self, name: &str) -> Option<usize> {
            self.0.iter().rev().find_map(|scope| scope.bindings.get(name).copied())
        }
    }

}

/// Lower forms into generated code.
///
/// This module implements bulk of the compiler and is a good place to start
/// reading code. Every `Form` becomes a `Code` closure; running it against a
/// frame evaluates the form. Symbols are resolved here, at compile time, so
/// an unknown name never reaches run time.
pub mod emit {
    use crate::{
        compiler::state::{Context, Layout, Reference, State},
        core::{Error, Form},
        env::Tables,
        ffi,
        host::HostBindings,
        lambda,
        lang::{self, Definition},
        loader::{Code, Kind, Program},
        primitives,
        value::Value,
    };
    use log::{debug, trace, warn};

    /// A literal value
    pub fn constant(v: Value) -> Code {
        Box::new(move |_| Ok(v.clone()))
    }

    /// Code to read the value `name` denotes in the current state
    pub fn symbol(s: &State, name: &str, line: usize) -> Result<Code, Error> {
        trace!("Resolving `{}` in `{}`", name, s.name);

        let code: Code = match s.get(name) {
            Some(Reference::Local(slot)) => Box::new(move |f| f.local(slot)),
            Some(Reference::Field(index)) => Box::new(move |f| f.field(index)),
            Some(Reference::Function(Some(index))) => Box::new(move |f| f.function(index)),
            Some(Reference::Global(Some(index))) => Box::new(move |f| f.global(index)),
            Some(Reference::Function(None)) | Some(Reference::Global(None)) => {
                let message = format!("`{}` is registered but not defined in this program", name);
                Box::new(move |_| Err(Error::Runtime(message.clone())))
            }
            Some(Reference::Constant(v)) => constant(v),
            None => return Err(Error::Unresolved { name: name.to_string(), line }),
        };
        Ok(code)
    }

    /// Lower each form, keeping the order
    pub fn arguments(s: &mut State, forms: &[Form]) -> Result<Vec<Code>, Error> {
        forms.iter().map(|f| eval(s, f)).collect()
    }

    /// Evaluate forms in order for the value of the last; `nil` when empty
    pub fn body(s: &mut State, forms: &[Form]) -> Result<Code, Error> {
        let codes = arguments(s, forms)?;

        if codes.is_empty() {
            return Ok(constant(Value::Nil));
        }

        Ok(Box::new(move |f| {
            let mut last = Value::Nil;
            for c in &codes {
                last = c(f)?;
            }
            Ok(last)
        }))
    }

    /// Emit code for a let expression
    ///
    /// A new scope is created to hold the bindings, each of which takes a
    /// fresh slot. Values are lowered before their own name is bound, so a
    /// binding sees earlier siblings but not itself. All the slots are freed
    /// when the scope is left, nothing leaks to the forms after the `let`.
    pub fn vars(s: &mut State, args: &[Form], line: usize) -> Result<Code, Error> {
        let (bindings, body) = match args {
            [Form::List { elements, .. }, body @ ..] if elements.len() % 2 == 0 => (elements, body),
            _ => return Err(Error::unsupported("`let` expects a list of name value pairs", line)),
        };

        s.enter();

        let mut steps = Vec::with_capacity(bindings.len() / 2);
        for pair in bindings.chunks(2) {
            if let [name, value] = pair {
                let name = name.as_symbol().ok_or_else(|| {
                    Error::unsupported(format!("`let` can only bind symbols, found {}", name), line)
                })?;
                let value = eval(s, value)?;
                steps.push((s.set(name), value));
            }
        }

        let body = self::body(s, body)?;
        s.leave();

        Ok(Box::new(move |f| {
            for (slot, value) in &steps {
                let v = value(f)?;
                f.set(*slot, v)?;
            }
            body(f)
        }))
    }

    /// Emit code for a conditional expression
    pub fn cond(s: &mut State, args: &[Form], line: usize) -> Result<Code, Error> {
        let (p, then, alt) = match args {
            [p, then] => (p, then, None),
            [p, then, alt] => (p, then, Some(alt)),
            _ => {
                return Err(Error::unsupported(
                    "`if` expects a condition, a consequent and an optional alternative",
                    line,
                ))
            }
        };

        let p = eval(s, p)?;
        let then = eval(s, then)?;

        // A conditional without an explicit alternative evaluates to nil
        let alt = match alt {
            Some(alt) => eval(s, alt)?,
            None => constant(Value::Nil),
        };

        let truthy = s.ctx.runtime.truthy;
        Ok(Box::new(move |f| if truthy(&p(f)?) { then(f) } else { alt(f) }))
    }

    /// Emit code for an ordinary call.
    ///
    /// Arguments are evaluated left to right *before* the callee.
    pub fn apply(s: &mut State, callee: &Form, args: &[Form]) -> Result<Code, Error> {
        let args = arguments(s, args)?;
        let callee = eval(s, callee)?;

        Ok(Box::new(move |f| {
            let values = f.eval_all(&args)?;
            match callee(f)? {
                Value::Callable(c) => c.apply(&values),
                v => Err(Error::NotCallable { found: v.type_name() }),
            }
        }))
    }

    /// Lower a single form
    pub fn eval(s: &mut State, form: &Form) -> Result<Code, Error> {
        match form {
            Form::Number { value, .. } => Ok(constant(Value::Number(*value))),

            Form::Str { value, .. } => Ok(constant(Value::from(value.as_str()))),

            Form::Symbol { name, line } => symbol(s, name, *line),

            Form::List { elements, line } => {
                let ctx = s.ctx;
                let _nesting = ctx.nest(*line)?;
                list(s, elements, *line)
            }
        }
    }

    /// Lower a non empty call or special form, or `()`
    fn list(s: &mut State, elements: &[Form], line: usize) -> Result<Code, Error> {
        match elements {
            [] => Ok(constant(Value::Nil)),

            [head @ Form::Symbol { name, .. }, args @ ..] => match name.as_str() {
                "if" => cond(s, args, line),
                "let" => vars(s, args, line),
                "lambda" => lambda::closure(s, args, line),
                "def" | "defvar" => Err(Error::unsupported(
                    format!("`{}` is only allowed at top level", name),
                    line,
                )),
                n if lang::is_foreign_call(n) => ffi::call(s, args, line),
                n => match primitives::call(s, n, args, line) {
                    Some(code) => code,
                    None => apply(s, head, args),
                },
            },

            [callee, args @ ..] => apply(s, callee, args),
        }
    }

    /// Top level interface to the emit module
    ///
    /// Every definition in `defs` must already be registered in `tables`.
    /// Each `def` becomes a function artifact, every `defvar` initializer
    /// goes into the static initializer in source order and the last
    /// non-definition form becomes the entry point.
    pub fn program(
        tables: &Tables,
        host: &HostBindings,
        forms: &[Form],
        defs: &[Definition],
    ) -> Result<Program, Error> {
        let mut layout = Layout::default();
        let mut functions: Vec<(&str, &[String], &[Form])> = vec![];
        let mut variables: Vec<(usize, &Form)> = vec![];

        for d in defs {
            match d {
                Definition::Function { name, params, body, .. } => {
                    let slot = layout.add_function(name);
                    let f = (*name, params.as_slice(), *body);
                    match functions.get_mut(slot) {
                        Some(existing) => *existing = f,
                        None => functions.push(f),
                    }
                }
                Definition::Variable { name, value, .. } => {
                    variables.push((layout.add_global(name), *value));
                }
            }
        }

        let ctx = Context::new(tables, &layout, host);
        let mut entry = State::new(&ctx, "program", None, &[], vec![]);

        let units = functions
            .iter()
            .map(|(name, params, body)| lambda::function(&ctx, entry.id, name, params, body))
            .collect::<Result<Vec<_>, _>>()?;

        let mut init = State::new(&ctx, "<init>", Some(entry.id), &[], vec![]);
        let mut steps = Vec::with_capacity(variables.len());
        for (slot, value) in variables {
            steps.push((slot, eval(&mut init, value)?));
        }

        let init = init.finish(
            Kind::Initializer,
            vec![],
            Box::new(move |f| {
                for (slot, value) in &steps {
                    let v = value(f)?;
                    f.set_global(*slot, v)?;
                }
                Ok(Value::Nil)
            }),
        );

        let mut rest = forms.iter().filter(|f| !lang::is_definition(f));
        let last = rest.next_back();
        let skipped = rest.count();
        if skipped > 0 {
            warn!("{} top level expression(s) before the last one are never evaluated", skipped);
        }

        let code = match last {
            Some(form) => eval(&mut entry, form)?,
            None => constant(Value::Nil),
        };
        let entry = entry.finish(Kind::Program, vec![], code);
        let lambdas = ctx.into_lambdas();

        debug!(
            "Generated program {} with {} functions, {} globals and {} lambdas",
            entry.id,
            units.len(),
            layout.globals().len(),
            lambdas.len()
        );

        Ok(Program { entry, init, functions: units, globals: layout.globals().to_vec(), lambdas })
    }

}
