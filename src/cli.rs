//! Command line interface for lispjit

use crate::{
    core::{Config, Error},
    parser::parse_multiple,
    session::Session,
    value::Value,
};
use std::io::{self, BufRead, Write};

#[derive(Copy, Clone)]
pub enum Action {
    Parse,
    Run,
    Console,
}

pub fn run(config: &Config, action: Action) -> Result<Option<String>, Error> {
    match action {
        Action::Parse => {
            for f in parse_multiple(&config.program)? {
                println!("{:?}", f);
            }

            Ok(None)
        }
        Action::Run => {
            let value = Session::new().eval(&config.program)?;
            Ok(Some(value.to_string()))
        }
        Action::Console => {
            let mut session = Session::new();
            session.eval(&config.program)?;

            let stdin = io::stdin();
            console(&mut session, stdin.lock(), io::stdout())?;
            Ok(None)
        }
    }
}

/// Read, evaluate and print until `:quit` or end of input.
///
/// A form may span several lines; input is collected until its parentheses
/// balance. Results other than `nil` are echoed; errors are printed and the
/// loop carries on.
pub fn console<R: BufRead, W: Write>(session: &mut Session, mut input: R, mut output: W) -> io::Result<()> {
    loop {
        write!(output, "lisp> ")?;
        output.flush()?;

        let src = match read_form(&mut input)? {
            Some(src) => src,
            None => break,
        };

        match src.trim() {
            ":quit" => break,
            "" => continue,
            _ => {}
        }

        match session.eval(&src) {
            Ok(Value::Nil) => {}
            Ok(value) => writeln!(output, "=> {}", value)?,
            Err(e) => writeln!(output, "{}", e)?,
        }
    }

    writeln!(output)?;
    Ok(())
}

/// Collect lines until the parentheses balance. `None` at end of input.
fn read_form<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut src = String::new();
    let mut depth = 0;
    let mut in_string = false;

    loop {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            // Hand back an unfinished form so the parser can report it
            return Ok(if src.trim().is_empty() { None } else { Some(src) });
        }

        depth += balance(&line, &mut in_string);
        src.push_str(&line);

        if depth <= 0 && !in_string {
            return Ok(Some(src));
        }
    }
}

/// Net paren depth of one line, ignoring strings and comments. Strings may
/// continue on the next line.
fn balance(line: &str, in_string: &mut bool) -> i64 {
    let mut depth = 0;

    for c in line.chars() {
        match c {
            '"' => *in_string = !*in_string,
            _ if *in_string => {}
            ';' => break,
            '(' => depth += 1,
            ')' => depth -= 1,
            _ => {}
        }
    }
    depth
}
