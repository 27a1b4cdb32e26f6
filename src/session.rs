//! Incremental evaluation
//!
//! A session is an environment plus the definitions it has accepted so far.
//! Every [`Session::eval`] recompiles all accumulated definitions together
//! with the new forms into one fresh program, runs it, and only then keeps
//! the new `def`/`defvar` forms for next time. The value of an `eval` is the
//! value of its last non-definition form.
//!
//! Several sessions may share one environment, each on its own thread.
use crate::{
    compiler::Compiler,
    core::{Error, Form},
    env::Environment,
    host::HostBindings,
    lang,
    loader::ProcessLoader,
    parser,
    value::Value,
};
use log::debug;
use std::sync::Arc;

pub struct Session {
    compiler: Compiler,
    forms: Vec<Form>,
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}

impl Session {
    /// A session with its own environment and the standard host prelude
    pub fn new() -> Self {
        Session::with_environment(Environment::shared())
    }

    pub fn with_environment(env: Arc<Environment>) -> Self {
        Session::with_forms(env, vec![])
    }

    /// Resume from definitions accepted by an earlier session
    pub fn with_forms(env: Arc<Environment>, forms: Vec<Form>) -> Self {
        Session::from_compiler(
            Compiler::new(env, Arc::new(HostBindings::prelude()), Arc::new(ProcessLoader::new())),
            forms,
        )
    }

    /// A session whose scripts see `host` instead of the prelude
    pub fn with_host(env: Arc<Environment>, host: Arc<HostBindings>) -> Self {
        Session::from_compiler(Compiler::new(env, host, Arc::new(ProcessLoader::new())), vec![])
    }

    pub fn from_compiler(compiler: Compiler, forms: Vec<Form>) -> Self {
        Session { compiler, forms }
    }

    pub fn environment(&self) -> &Arc<Environment> {
        self.compiler.environment()
    }

    /// Definitions accepted so far, oldest first
    pub fn forms(&self) -> &[Form] {
        &self.forms
    }

    /// Parse, compile and run `source` on top of everything defined so far.
    ///
    /// Empty input evaluates to `nil` without compiling anything. On any
    /// failure the accumulated definitions are left untouched, although
    /// registrations made in the environment by pass 1 persist.
    pub fn eval(&mut self, source: &str) -> Result<Value, Error> {
        let new = parser::parse_multiple(source)?;
        if new.is_empty() {
            return Ok(Value::Nil);
        }

        let mut all = Vec::with_capacity(self.forms.len() + new.len());
        all.extend_from_slice(&self.forms);
        all.extend_from_slice(&new);

        let value = self.compiler.run(&all)?;

        let before = self.forms.len();
        self.forms.extend(new.into_iter().filter(lang::is_definition));
        debug!("Session now holds {} definitions (+{})", self.forms.len(), self.forms.len() - before);

        Ok(value)
    }
}
