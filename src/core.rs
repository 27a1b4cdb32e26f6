//! Core types shared by most of the program
use colored::Colorize;
use std::fmt;

/// Abstract Syntax Tree
///
/// Parser generates one of these values and nothing mutates it afterwards.
/// Every node remembers the line it started on for diagnostics.
#[derive(Debug, PartialEq, Clone)]
pub enum Form {
    Number { value: f64, line: usize },
    Str { value: String, line: usize },
    Symbol { name: String, line: usize },
    List { elements: Vec<Form>, line: usize },
}

impl Form {
    pub fn number(value: f64) -> Self {
        Form::Number { value, line: 1 }
    }

    pub fn string<S: Into<String>>(value: S) -> Self {
        Form::Str { value: value.into(), line: 1 }
    }

    pub fn symbol<S: Into<String>>(name: S) -> Self {
        Form::Symbol { name: name.into(), line: 1 }
    }

    pub fn list(elements: Vec<Form>) -> Self {
        Form::List { elements, line: 1 }
    }

    /// Source line the form started on
    pub fn line(&self) -> usize {
        match self {
            Form::Number { line, .. }
            | Form::Str { line, .. }
            | Form::Symbol { line, .. }
            | Form::List { line, .. } => *line,
        }
    }

    /// Name of a symbol, `None` for anything else
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Form::Symbol { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Text of a string literal, `None` for anything else
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Form::Str { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Form]> {
        match self {
            Form::List { elements, .. } => Some(elements),
            _ => None,
        }
    }

    /// Head symbol of a non empty list whose first element is a symbol.
    pub fn head(&self) -> Option<&str> {
        self.as_list().and_then(|l| l.first()).and_then(Form::as_symbol)
    }

    /// Copy of the form with every line set to `line`.
    ///
    /// Handy in tests where the position is noise.
    pub fn at(self, line: usize) -> Self {
        match self {
            Form::Number { value, .. } => Form::Number { value, line },
            Form::Str { value, .. } => Form::Str { value, line },
            Form::Symbol { name, .. } => Form::Symbol { name, line },
            Form::List { elements, .. } => {
                Form::List { elements: elements.into_iter().map(|e| e.at(line)).collect(), line }
            }
        }
    }
}

impl fmt::Display for Form {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Form::Number { value, .. } => write!(f, "{:?}", value),
            Form::Str { value, .. } => write!(f, "\"{}\"", value),
            Form::Symbol { name, .. } => write!(f, "{}", name),
            Form::List { elements, .. } => {
                write!(f, "(")?;
                let mut l = elements.iter().peekable();
                while let Some(elem) = l.next() {
                    if l.peek().is_some() {
                        write!(f, "{} ", elem)?;
                    } else {
                        write!(f, "{}", elem)?;
                    }
                }
                write!(f, ")")
            }
        }
    }
}

/// Idiomatic type conversions from the primitive types to Form
impl From<f64> for Form {
    fn from(n: f64) -> Self {
        Form::number(n)
    }
}

impl From<&str> for Form {
    fn from(s: &str) -> Self {
        Form::symbol(s)
    }
}

/// Control behavior and external interaction of the program.
pub struct Config {
    /// Program is the input source
    pub program: String,
}

/// Custom error type for all of lispjit
//
// Every failure aborts the current evaluation and is reported to the caller;
// nothing in here is ever recovered internally.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    /// Malformed source text
    Parse { message: String, line: usize },
    /// A symbol that is neither local, captured nor global at compile time
    Unresolved { name: String, line: usize },
    /// Malformed special form or an unsupported foreign call shape
    Unsupported { message: String, line: usize },
    /// No host member matches the requested name and arity
    HostResolution { type_name: String, member: String, arity: usize, line: usize },
    /// A primitive operator received a value of the wrong type
    Type { operator: &'static str, found: &'static str },
    /// Tried to invoke something that isn't invocable
    NotCallable { found: &'static str },
    /// Invocation with the wrong number of arguments
    Arity { name: String, expected: usize, found: usize },
    /// Other run time failures, usually raised by host code
    Runtime(String),
    /// Internal errors are unexpected errors within the compiler
    Internal(String),
}

impl Error {
    pub fn parse<S: Into<String>>(message: S, line: usize) -> Self {
        Error::Parse { message: message.into(), line }
    }

    pub fn unsupported<S: Into<String>>(message: S, line: usize) -> Self {
        Error::Unsupported { message: message.into(), line }
    }

    /// Is this failure detected before any code runs?
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Error::Parse { .. }
                | Error::Unresolved { .. }
                | Error::Unsupported { .. }
                | Error::HostResolution { .. }
                | Error::Internal(_)
        )
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Parse { message, line } => {
                writeln!(f, "{}", "Failed to parse program".red().bold())?;
                write!(f, "line {}: {}", line, message)
            }
            Self::Unresolved { name, line } => {
                writeln!(f, "{}", "Failed to compile program".red().bold())?;
                write!(f, "line {}: unresolved symbol `{}`", line, name)
            }
            Self::Unsupported { message, line } => {
                writeln!(f, "{}", "Failed to compile program".red().bold())?;
                write!(f, "line {}: {}", line, message)
            }
            Self::HostResolution { type_name, member, arity, line } => {
                writeln!(f, "{}", "Failed to compile program".red().bold())?;
                write!(
                    f,
                    "line {}: no host member `{}` on `{}` taking {} argument(s)",
                    line, member, type_name, arity
                )
            }
            Self::Type { operator, found } => {
                writeln!(f, "{}", "Runtime error!".red().bold())?;
                write!(f, "`{}` expects numbers, found {}", operator, found)
            }
            Self::NotCallable { found } => {
                writeln!(f, "{}", "Runtime error!".red().bold())?;
                write!(f, "{} is not callable", found)
            }
            Self::Arity { name, expected, found } => {
                writeln!(f, "{}", "Runtime error!".red().bold())?;
                write!(f, "`{}` expects {} argument(s), got {}", name, expected, found)
            }
            Self::Runtime(e) => {
                writeln!(f, "{}", "Runtime error!".red().bold())?;
                write!(f, "{}", e)
            }
            Self::Internal(message) => {
                writeln!(f, "{}", "Something went wrong!".red().bold())?;
                write!(f, "{}", message)
            }
        }
    }
}
