//! Language shape: keywords, definitions and capture analysis
//!
//! Everything in here is a pure function over the AST; nothing generates
//! code.
use crate::{
    core::{Error, Form},
    env::Tables,
};
use std::collections::{BTreeSet, HashSet};

/// Built in operators, always called with exactly two operands
pub const OPERATORS: [&str; 7] = ["+", "-", "*", "/", "<", ">", "string-concat"];

/// Symbols with a fixed value unless shadowed
pub const CONSTANTS: [&str; 3] = ["true", "false", "nil"];

pub fn is_operator(name: &str) -> bool {
    OPERATORS.contains(&name)
}

pub fn is_constant(name: &str) -> bool {
    CONSTANTS.contains(&name)
}

/// `java-call` is the historical spelling of `host-call`
pub fn is_foreign_call(name: &str) -> bool {
    name == "host-call" || name == "java-call"
}

/// Does this top level form register anything?
pub fn is_definition(form: &Form) -> bool {
    matches!(form.head(), Some("def") | Some("defvar"))
}

/// A validated top level definition
#[derive(Debug, PartialEq)]
pub enum Definition<'a> {
    /// `(def (name param*) body+)`
    Function { name: &'a str, params: Vec<String>, body: &'a [Form], line: usize },
    /// `(defvar name expr)`
    Variable { name: &'a str, value: &'a Form, line: usize },
}

impl<'a> Definition<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Definition::Function { name, .. } | Definition::Variable { name, .. } => name,
        }
    }
}

/// Check the shape of a `def` or `defvar`; `None` for anything else.
pub fn definition(form: &Form) -> Result<Option<Definition>, Error> {
    let line = form.line();
    let elements = match form.as_list() {
        Some(elements) => elements,
        None => return Ok(None),
    };

    match form.head() {
        Some("def") => match elements {
            [_, Form::List { elements: signature, .. }, body @ ..] if !body.is_empty() => {
                match signature.split_first() {
                    Some((Form::Symbol { name, .. }, params)) => Ok(Some(Definition::Function {
                        name,
                        params: names(params, "def", line)?,
                        body,
                        line,
                    })),
                    _ => Err(Error::unsupported("`def` expects a function name", line)),
                }
            }
            _ => Err(Error::unsupported("`def` expects (def (name param*) body+)", line)),
        },

        Some("defvar") => match elements {
            [_, Form::Symbol { name, .. }, value] => {
                Ok(Some(Definition::Variable { name, value, line }))
            }
            _ => Err(Error::unsupported("`defvar` expects (defvar name expr)", line)),
        },

        _ => Ok(None),
    }
}

/// Parameter list of a `def` or `lambda`
pub fn params(form: &Form, what: &str) -> Result<Vec<String>, Error> {
    match form.as_list() {
        Some(elements) => names(elements, what, form.line()),
        None => Err(Error::unsupported(format!("`{}` expects a parameter list", what), form.line())),
    }
}

fn names(forms: &[Form], what: &str, line: usize) -> Result<Vec<String>, Error> {
    forms
        .iter()
        .map(|f| match f.as_symbol() {
            Some(name) => Ok(name.to_string()),
            None => Err(Error::unsupported(format!("`{}` parameters must be symbols, found {}", what, f), line)),
        })
        .collect()
}

/// Names a closure body reads from its enclosing scope.
///
/// `params` is the closure's own local scope. A symbol is captured unless it
/// is an operator, a constant, in scope, or a global function or variable
/// registered in `tables`.
///
/// - `let` bindings are sequential: each value sees only earlier names
/// - nested `lambda` forms are not looked into
/// - the heads of `if` and foreign calls are syntax, not references
/// - every element of an ordinary call is visited, including the head
///
/// The set is ordered, which fixes the order of closure fields.
pub fn captures(body: &[Form], params: &[String], tables: &Tables) -> BTreeSet<String> {
    let scope: HashSet<&str> = params.iter().map(String::as_str).collect();
    let mut out = BTreeSet::new();

    for form in body {
        walk(form, &scope, tables, &mut out);
    }
    out
}

fn walk<'a>(form: &'a Form, scope: &HashSet<&'a str>, tables: &Tables, out: &mut BTreeSet<String>) {
    let elements = match form {
        Form::Symbol { name, .. } => {
            if !is_operator(name)
                && !is_constant(name)
                && !scope.contains(name.as_str())
                && !tables.is_function(name)
                && !tables.is_global(name)
            {
                out.insert(name.clone());
            }
            return;
        }
        Form::List { elements, .. } => elements,
        _ => return,
    };

    match form.head() {
        Some("let") => {
            let mut scope = scope.clone();

            if let Some(bindings) = elements.get(1).and_then(Form::as_list) {
                for pair in bindings.chunks(2) {
                    if let [name, value] = pair {
                        walk(value, &scope, tables, out);
                        if let Some(name) = name.as_symbol() {
                            scope.insert(name);
                        }
                    }
                }
            }

            for f in elements.iter().skip(2) {
                walk(f, &scope, tables, out);
            }
        }

        // Opaque, see the known limitations in docs
        Some("lambda") => {}

        // Rejected by the compiler anyway
        Some("def") | Some("defvar") => {}

        Some(head) if head == "if" || is_foreign_call(head) => {
            for f in &elements[1..] {
                walk(f, scope, tables, out);
            }
        }

        _ => {
            for f in elements {
                walk(f, scope, tables, out);
            }
        }
    }
}
