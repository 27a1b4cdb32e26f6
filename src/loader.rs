//! Generated artifacts and the loader that links them into the process
//!
//! The code generator lowers every function, lambda and program into an
//! `Artifact`: a tree of boxed Rust closures plus the bookkeeping needed to
//! call it (parameters, captured fields, frame size). Artifacts are immutable
//! once built. An `Instance` pairs an artifact with the values it captured
//! and the statics of the program it belongs to; that is the invocable value
//! scripts and hosts hold on to.
//!
//! Identities come from one process wide atomic counter so that sessions on
//! different threads never hand out the same one.
use crate::{
    core::Error,
    rt::Runtime,
    value::{Invocable, Value},
};
use log::debug;
use parking_lot::{Mutex, RwLock};
use std::{
    cell::Cell,
    collections::HashSet,
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Most invocations that may be active at once on one thread
pub const MAX_CALL_DEPTH: usize = 512;

thread_local! {
    static DEPTH: Cell<usize> = Cell::new(0);
}

/// One active invocation on the current thread, released on drop
struct Call;

impl Call {
    fn enter(name: &str) -> Result<Call, Error> {
        DEPTH.with(|depth| {
            let current = depth.get();
            if current >= MAX_CALL_DEPTH {
                return Err(Error::Runtime(format!(
                    "recursion too deep in `{}`: more than {} nested calls",
                    name, MAX_CALL_DEPTH
                )));
            }
            depth.set(current + 1);
            Ok(Call)
        })
    }
}

impl Drop for Call {
    fn drop(&mut self) {
        DEPTH.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Process wide unique identity of a generated unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArtifactId(u64);

impl ArtifactId {
    pub fn next() -> Self {
        ArtifactId(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Generated code for one expression
pub type Code = Box<dyn Fn(&mut Frame<'_>) -> Result<Value, Error> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Kind {
    /// A top level `def`
    Function,
    /// An anonymous closure
    Lambda,
    /// Static initialization of a program; runs every `defvar`
    Initializer,
    /// Entry point of a program; ignores its arguments
    Program,
}

pub struct Artifact {
    pub id: ArtifactId,
    /// Owner of the unit, if it was generated inside another one
    pub parent: Option<ArtifactId>,
    pub name: String,
    pub kind: Kind,
    pub params: Vec<String>,
    /// Captured names, in the order the constructor expects their values
    pub fields: Vec<String>,
    /// Frame size: parameters followed by every `let` local
    pub slots: usize,
    pub body: Code,
    pub runtime: &'static Runtime,
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("params", &self.params)
            .field("fields", &self.fields)
            .field("slots", &self.slots)
            .finish()
    }
}

/// Program wide storage shared by every instance created from one program.
///
/// Functions are stored as artifacts rather than instances, so reading one
/// creates a fresh instance and no reference cycle is formed.
pub struct Statics {
    functions: Vec<Arc<Artifact>>,
    globals: RwLock<Vec<Value>>,
}

/// Activation record of a single invocation
pub struct Frame<'a> {
    slots: Vec<Value>,
    fields: &'a [Value],
    statics: &'a Arc<Statics>,
}

impl<'a> Frame<'a> {
    pub fn local(&self, slot: usize) -> Result<Value, Error> {
        self.slots.get(slot).cloned().ok_or_else(|| missing("local", slot))
    }

    pub fn set(&mut self, slot: usize, value: Value) -> Result<(), Error> {
        let s = self.slots.get_mut(slot).ok_or_else(|| missing("local", slot))?;
        *s = value;
        Ok(())
    }

    pub fn field(&self, index: usize) -> Result<Value, Error> {
        self.fields.get(index).cloned().ok_or_else(|| missing("field", index))
    }

    /// A program function as a callable value
    pub fn function(&self, index: usize) -> Result<Value, Error> {
        let unit = self.statics.functions.get(index).ok_or_else(|| missing("function", index))?;
        Ok(Value::Callable(Arc::new(Instance::new(Arc::clone(unit), vec![], self.statics))))
    }

    pub fn global(&self, index: usize) -> Result<Value, Error> {
        self.statics.globals.read().get(index).cloned().ok_or_else(|| missing("global", index))
    }

    pub fn set_global(&mut self, index: usize, value: Value) -> Result<(), Error> {
        let mut globals = self.statics.globals.write();
        let g = globals.get_mut(index).ok_or_else(|| missing("global", index))?;
        *g = value;
        Ok(())
    }

    /// Close over `fields` with `unit`, sharing this frame's statics
    pub fn closure(&self, unit: &Arc<Artifact>, fields: Vec<Value>) -> Value {
        Value::Callable(Arc::new(Instance::new(Arc::clone(unit), fields, self.statics)))
    }

    /// Evaluate every expression in order
    pub fn eval_all(&mut self, codes: &[Code]) -> Result<Vec<Value>, Error> {
        let mut values = Vec::with_capacity(codes.len());
        for code in codes {
            values.push(code(self)?);
        }
        Ok(values)
    }
}

fn missing(what: &str, index: usize) -> Error {
    Error::Internal(format!("no {} at index {}", what, index))
}

/// A loaded, ready to call unit
pub struct Instance {
    unit: Arc<Artifact>,
    fields: Vec<Value>,
    statics: Arc<Statics>,
}

impl Instance {
    fn new(unit: Arc<Artifact>, fields: Vec<Value>, statics: &Arc<Statics>) -> Self {
        Instance { unit, fields, statics: Arc::clone(statics) }
    }
}

impl Invocable for Instance {
    fn apply(&self, args: &[Value]) -> Result<Value, Error> {
        let unit = &self.unit;
        let arity = unit.params.len();

        if unit.kind != Kind::Program && args.len() != arity {
            return Err(Error::Arity { name: unit.name.clone(), expected: arity, found: args.len() });
        }

        let mut slots = vec![Value::Nil; unit.slots.max(arity)];
        for (slot, arg) in slots.iter_mut().zip(args.iter().take(arity)) {
            *slot = arg.clone();
        }

        let _call = Call::enter(&unit.name)?;
        let mut frame = Frame { slots, fields: &self.fields, statics: &self.statics };
        (unit.body)(&mut frame)
    }

    fn identity(&self) -> ArtifactId {
        self.unit.id
    }

    fn name(&self) -> &str {
        &self.unit.name
    }
}

/// Output of one whole program compile
#[derive(Debug)]
pub struct Program {
    pub entry: Arc<Artifact>,
    pub init: Arc<Artifact>,
    /// Compiled `def`s; the index is the layout slot
    pub functions: Vec<Arc<Artifact>>,
    /// `defvar` names; the index is the layout slot
    pub globals: Vec<String>,
    /// Every lambda generated anywhere in the program
    pub lambdas: Vec<Arc<Artifact>>,
}

impl Program {
    pub fn id(&self) -> ArtifactId {
        self.entry.id
    }

    pub fn units(&self) -> impl Iterator<Item = &Arc<Artifact>> {
        self.functions.iter().chain(&self.lambdas).chain([&self.init, &self.entry])
    }

    /// Link every unit, run static initialization and return the entry point.
    ///
    /// All functions exist before the first `defvar` initializer runs, so
    /// initializers may call any function of the program.
    pub fn load(self, loader: &dyn Loader) -> Result<Instance, Error> {
        for unit in self.units() {
            loader.link(unit)?;
        }

        let statics = Arc::new(Statics {
            functions: self.functions,
            globals: RwLock::new(vec![Value::Nil; self.globals.len()]),
        });

        Instance::new(self.init, vec![], &statics).apply(&[])?;
        Ok(Instance::new(self.entry, vec![], &statics))
    }
}

/// Installs generated units into the running process
pub trait Loader: Send + Sync {
    /// Link `unit`; linking the same identity twice is an error
    fn link(&self, unit: &Arc<Artifact>) -> Result<(), Error>;
}

/// Default loader. Generated code is already native closures, so linking is
/// only identity bookkeeping.
#[derive(Default)]
pub struct ProcessLoader {
    linked: Mutex<HashSet<ArtifactId>>,
}

impl ProcessLoader {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn is_linked(&self, id: ArtifactId) -> bool {
        self.linked.lock().contains(&id)
    }

    pub fn len(&self) -> usize {
        self.linked.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Loader for ProcessLoader {
    fn link(&self, unit: &Arc<Artifact>) -> Result<(), Error> {
        if !self.linked.lock().insert(unit.id) {
            return Err(Error::Internal(format!("artifact {} `{}` is already linked", unit.id, unit.name)));
        }

        debug!("Linked {:?} `{}` as {}", unit.kind, unit.name, unit.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rt::RUNTIME;
    use pretty_assertions::assert_eq;
    use std::thread;

    fn unit(kind: Kind, params: &[&str], slots: usize, body: Code) -> Arc<Artifact> {
        Arc::new(Artifact {
            id: ArtifactId::next(),
            parent: None,
            name: "test".into(),
            kind,
            params: params.iter().map(|p| p.to_string()).collect(),
            fields: vec![],
            slots,
            body,
            runtime: &RUNTIME,
        })
    }

    fn program(entry: Code, init: Code, globals: &[&str]) -> Program {
        Program {
            entry: unit(Kind::Program, &[], 0, entry),
            init: unit(Kind::Initializer, &[], 0, init),
            functions: vec![],
            globals: globals.iter().map(|g| g.to_string()).collect(),
            lambdas: vec![],
        }
    }

    #[test]
    fn unique() {
        let ids: Vec<Vec<ArtifactId>> = (0..4)
            .map(|_| thread::spawn(|| (0..1000).map(|_| ArtifactId::next()).collect()))
            .map(|h| h.join().unwrap())
            .collect();

        let all: HashSet<ArtifactId> = ids.into_iter().flatten().collect();
        assert_eq!(all.len(), 4000);
    }

    #[test]
    fn link_once() {
        let loader = ProcessLoader::new();
        let u = unit(Kind::Lambda, &[], 0, Box::new(|_| Ok(Value::Nil)));

        assert!(loader.link(&u).is_ok());
        assert!(loader.is_linked(u.id));
        assert!(matches!(loader.link(&u), Err(Error::Internal(_))));
        assert_eq!(loader.len(), 1);
    }

    #[test]
    fn initialize() {
        let loader = ProcessLoader::new();
        let p = program(
            Box::new(|f| f.global(0)),
            Box::new(|f| {
                f.set_global(0, Value::from(42.0))?;
                Ok(Value::Nil)
            }),
            &["answer"],
        );

        let entry = p.load(&loader).unwrap();
        assert_eq!(entry.apply(&[]), Ok(Value::from(42.0)));

        // Programs ignore their arguments
        assert_eq!(entry.apply(&[Value::Nil, Value::Nil]), Ok(Value::from(42.0)));
        assert_eq!(loader.len(), 2);
    }

    #[test]
    fn arity() {
        let loader = ProcessLoader::new();
        let mut p = program(Box::new(|f| f.function(0)), Box::new(|_| Ok(Value::Nil)), &[]);
        p.functions.push(unit(Kind::Function, &["x", "y"], 2, Box::new(|f| f.local(1))));

        let f = p.load(&loader).unwrap().apply(&[]).unwrap();
        assert_eq!(f.call(&[Value::from(1.0), Value::from(2.0)]), Ok(Value::from(2.0)));
        assert_eq!(
            f.call(&[Value::from(1.0)]),
            Err(Error::Arity { name: "test".into(), expected: 2, found: 1 })
        );
    }

    #[test]
    fn call_depth() {
        let loader = ProcessLoader::new();
        let mut p = program(Box::new(|f| f.function(0)), Box::new(|_| Ok(Value::Nil)), &[]);

        // Calls itself `n` more times, then returns `n`
        p.functions.push(unit(
            Kind::Function,
            &["n"],
            1,
            Box::new(|f| {
                let n = f.local(0)?.to_number("n")?;
                if n < 1.0 {
                    return Ok(Value::from(0.0));
                }
                let again = f.function(0)?.call(&[Value::from(n - 1.0)])?;
                Ok(Value::from(again.to_number("n")? + 1.0))
            }),
        ));

        let f = p.load(&loader).unwrap().apply(&[]).unwrap();
        assert_eq!(f.call(&[Value::from(100.0)]), Ok(Value::from(100.0)));
        assert!(matches!(f.call(&[Value::from(100_000.0)]), Err(Error::Runtime(_))));

        // Every frame was released on the way out
        assert_eq!(DEPTH.with(Cell::get), 0);
        assert_eq!(f.call(&[Value::from(100.0)]), Ok(Value::from(100.0)));
    }
}
