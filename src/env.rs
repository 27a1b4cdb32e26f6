//! Session wide symbol tables
//!
//! An `Environment` remembers every function signature and global variable
//! name registered by any compile that uses it. Entries are added or
//! overwritten, never removed. Redefining a name only affects later compiles;
//! code that was already generated keeps whatever it was compiled against.
//!
//! The tables sit behind a re-entrant lock. A compile holds the lock for both
//! of its passes, so registrations from one evaluation are never interleaved
//! with another's. Hosts that need several evaluations to appear atomic can
//! take a scoped exclusive section with [`Environment::exclusive`] and call
//! `eval` on the same thread while holding it.
//!
//! The closures given to [`Environment::read`] and [`Environment::write`]
//! must not evaluate code or call back into the environment. A compile
//! started from inside one fails with [`Error::Internal`].
use crate::core::Error;
use log::debug;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::{
    cell::{Ref, RefCell, RefMut},
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Name and declared arity of a top level function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub name: String,
    pub arity: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Tables {
    functions: HashMap<String, FunctionSignature>,
    globals: HashSet<String>,
}

impl Tables {
    pub fn define_function(&mut self, name: &str, arity: usize) {
        debug!("Registering function `{}`/{}", name, arity);
        self.functions.insert(name.to_string(), FunctionSignature { name: name.to_string(), arity });
    }

    pub fn define_global(&mut self, name: &str) {
        debug!("Registering global `{}`", name);
        self.globals.insert(name.to_string());
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn is_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn is_global(&self, name: &str) -> bool {
        self.globals.contains(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionSignature> {
        self.functions.values()
    }

    pub fn globals(&self) -> impl Iterator<Item = &str> {
        self.globals.iter().map(String::as_str)
    }
}

/// A scoped exclusive section over the tables. Other threads block until
/// it is dropped.
pub struct Section<'a>(ReentrantMutexGuard<'a, RefCell<Tables>>);

impl Section<'_> {
    pub(crate) fn tables(&self) -> Result<Ref<'_, Tables>, Error> {
        self.0.try_borrow().map_err(|_| busy())
    }

    pub(crate) fn tables_mut(&self) -> Result<RefMut<'_, Tables>, Error> {
        self.0.try_borrow_mut().map_err(|_| busy())
    }
}

fn busy() -> Error {
    Error::Internal("environment tables are already in use on this thread".into())
}

#[derive(Default)]
pub struct Environment {
    tables: ReentrantMutex<RefCell<Tables>>,
}

impl Environment {
    pub fn new() -> Self {
        Default::default()
    }

    /// A fresh environment ready to be handed to several sessions
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Block other threads out of the tables until the section is dropped.
    ///
    /// The lock is re-entrant, so the owning thread may keep compiling while
    /// the section is alive.
    pub fn exclusive(&self) -> Section<'_> {
        Section(self.tables.lock())
    }

    /// Run `f` with read access to the tables
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        let section = self.exclusive();
        let tables = section.0.borrow();
        f(&tables)
    }

    /// Run `f` with write access to the tables
    pub fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let section = self.exclusive();
        let mut tables = section.0.borrow_mut();
        f(&mut tables)
    }

    /// Copy of the current tables
    pub fn snapshot(&self) -> Tables {
        self.read(Tables::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::thread;

    #[test]
    fn redefine() {
        let env = Environment::new();

        env.write(|t| t.define_function("f", 1));
        assert_eq!(env.read(|t| t.function("f").cloned()), Some(FunctionSignature { name: "f".into(), arity: 1 }));

        // Redefinition silently replaces the signature
        env.write(|t| t.define_function("f", 3));
        assert_eq!(env.read(|t| t.function("f").map(|s| s.arity)), Some(3));
        assert_eq!(env.read(|t| t.functions().count()), 1);
    }

    #[test]
    fn globals() {
        let env = Environment::new();
        env.write(|t| {
            t.define_global("x");
            t.define_global("x");
        });

        let tables = env.snapshot();
        assert!(tables.is_global("x"));
        assert!(!tables.is_function("x"));
        assert_eq!(tables.globals().collect::<Vec<_>>(), vec!["x"]);
    }

    #[test]
    fn reentrant() {
        let env = Environment::new();
        let section = env.exclusive();

        // The owner can keep using the environment inside its own section
        env.write(|t| t.define_global("inner"));
        assert!(section.tables().unwrap().is_global("inner"));
    }

    #[test]
    fn in_use() {
        let env = Environment::new();
        let section = env.exclusive();

        let tables = section.tables().unwrap();
        assert!(section.tables().is_ok());
        assert!(matches!(section.tables_mut(), Err(Error::Internal(_))));

        drop(tables);
        assert!(section.tables_mut().is_ok());
    }

    #[test]
    fn concurrent() {
        let env = Environment::shared();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let env = Arc::clone(&env);
                thread::spawn(move || {
                    for j in 0..100 {
                        env.write(|t| t.define_function(&format!("f{}_{}", i, j), j));
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(env.read(|t| t.functions().count()), 800);
    }
}
