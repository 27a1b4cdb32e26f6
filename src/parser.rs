//! An s-expression reader in nom.
//!
//! The grammar is tiny and whitespace insensitive:
//!
//! ```BNF
//! <program> → <form>*
//! <form>    → <list> | <string> | <atom>
//! <list>    → ( <form>* )
//! <string>  → " <any character other than ">* "
//! <atom>    → <number> | <symbol>
//! ```
//!
//! An atom is the longest run of characters that are neither whitespace nor
//! parens. It is a number if it reads as a JVM `double` literal,
//! otherwise a symbol; `+` and `-` alone are symbols. A `;`
//! starts a comment that runs till the end of the line and is treated as
//! whitespace. Lists may nest at most [`MAX_DEPTH`] levels deep.
//!
//! Strings have no escape processing; the first `"` after the opening quote
//! closes the literal.
//!
//! Each form remembers the line it started on, which is looked up from the
//! offset into the original source in a table of newline positions rather
//! than threaded through the combinators.
use crate::core::{Error, Form};
use nom::{
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, not_line_ending},
    combinator::{cut, map, recognize, value},
    error::{context, VerboseError, VerboseErrorKind},
    multi::many0,
    sequence::{pair, preceded, terminated},
    IResult,
};

type Res<'a, T> = IResult<&'a str, T, VerboseError<&'a str>>;

/// Deepest list nesting accepted by the reader
pub const MAX_DEPTH: usize = 512;

/// Parse a script with any number of top level forms.
///
/// This is what the session driver uses; empty input is an empty program.
pub fn parse_multiple(source: &str) -> Result<Vec<Form>, Error> {
    let reader = Reader::new(source);
    let (rest, forms) =
        terminated(many0(preceded(space0, |i| reader.form(i, 0))), space0)(source)
            .map_err(|e| reader.error(e))?;

    match rest.chars().next() {
        None => Ok(forms),
        Some(c) => Err(Error::parse(format!("unexpected `{}`", c), reader.line(rest))),
    }
}

/// Parse exactly one form, rejecting empty input and trailing garbage.
pub fn parse(source: &str) -> Result<Form, Error> {
    let reader = Reader::new(source);
    let (i, _) = space0(source).map_err(|e| reader.error(e))?;

    if i.is_empty() {
        return Err(Error::parse("empty input", reader.line(i)));
    }

    let (i, form) = reader.form(i, 0).map_err(|e| reader.error(e))?;
    let (i, _) = space0(i).map_err(|e| reader.error(e))?;

    match i.chars().next() {
        None => Ok(form),
        Some(c) => {
            Err(Error::parse(format!("unexpected characters at end: `{}`", c), reader.line(i)))
        }
    }
}

/// Reader keeps the full source around to map any position back to a line.
struct Reader<'a> {
    source: &'a str,
    /// Byte offset of every newline in `source`
    newlines: Vec<usize>,
}

impl<'a> Reader<'a> {
    fn new(source: &'a str) -> Self {
        let newlines = source.match_indices('\n').map(|(at, _)| at).collect();
        Reader { source, newlines }
    }

    /// Line number of the remaining input `i`
    fn line(&self, i: &str) -> usize {
        let offset = self.source.len() - i.len();
        1 + self.newlines.partition_point(|&at| at < offset)
    }

    /// `<form> → <list> | <string> | <atom>`
    fn form(&self, i: &'a str, depth: usize) -> Res<'a, Form> {
        alt((|i| self.list(i, depth), |i| self.string(i), |i| self.atom(i)))(i)
    }

    /// `<list> → ( <form>* )`
    ///
    /// Once an open paren is consumed the list must be closed, so any failure
    /// after that point is fatal rather than a reason to backtrack.
    fn list(&self, i: &'a str, depth: usize) -> Res<'a, Form> {
        let line = self.line(i);
        let (i, _) = char('(')(i)?;

        if depth >= MAX_DEPTH {
            return Err(nom::Err::Failure(VerboseError {
                errors: vec![(i, VerboseErrorKind::Context("depth"))],
            }));
        }

        let (i, elements) = cut(context(
            "list",
            terminated(
                many0(preceded(space0, |i| self.form(i, depth + 1))),
                preceded(space0, char(')')),
            ),
        ))(i)?;

        Ok((i, Form::List { elements, line }))
    }

    /// `<string> → " <any character other than ">* "`
    fn string(&self, i: &'a str) -> Res<'a, Form> {
        let line = self.line(i);
        let (i, s) = preceded(
            char('"'),
            cut(context("string", terminated(take_while(|c| c != '"'), char('"')))),
        )(i)?;

        Ok((i, Form::Str { value: s.to_string(), line }))
    }

    /// `<atom> → <number> | <symbol>`
    fn atom(&self, i: &'a str) -> Res<'a, Form> {
        let line = self.line(i);
        map(take_while1(delimiter), move |token: &str| match number(token) {
            Some(value) => Form::Number { value, line },
            None => Form::Symbol { name: token.to_string(), line },
        })(i)
    }

    /// Translate a nom failure into a parse error with a line number
    //
    // Contexts are pushed innermost first, so the first one found is the
    // construct that was left open.
    fn error(&self, e: nom::Err<VerboseError<&str>>) -> Error {
        match e {
            nom::Err::Incomplete(_) => Error::parse("unexpected end of input", self.line("")),
            nom::Err::Error(e) | nom::Err::Failure(e) => {
                let open = e.errors.iter().find_map(|(i, kind)| match kind {
                    VerboseErrorKind::Context(c) => Some((*i, *c)),
                    _ => None,
                });

                match open {
                    Some((i, "depth")) => Error::parse(
                        format!("lists nested more than {} levels deep", MAX_DEPTH),
                        self.line(i),
                    ),
                    Some((i, "string")) => {
                        Error::parse("unterminated string literal", self.line(i))
                    }
                    Some((i, "list")) => {
                        Error::parse("unexpected end of input in list", self.line(i))
                    }
                    _ => {
                        let at = e.errors.first().map_or("", |(i, _)| *i);
                        Error::parse("malformed input", self.line(at))
                    }
                }
            }
        }
    }
}

/// Can this character be part of an atom?
fn delimiter(c: char) -> bool {
    !c.is_whitespace() && c != '(' && c != ')'
}

/// Numbers are read the way the JVM reads a `double`: an optional sign,
/// then decimal or `0x` hexadecimal notation with an optional `d`/`f` type
/// suffix, or one of `NaN` and `Infinity`. Names like `inf` stay symbols.
fn number(token: &str) -> Option<f64> {
    let (sign, body) = match token.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, token.strip_prefix('+').unwrap_or(token)),
    };

    let magnitude = match body {
        "NaN" => f64::NAN,
        "Infinity" => f64::INFINITY,
        _ => {
            let body = body.strip_suffix(|c: char| matches!(c, 'd' | 'D' | 'f' | 'F')).unwrap_or(body);
            match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
                Some(hex) => hexadecimal(hex)?,
                None => decimal(body)?,
            }
        }
    };

    Some(sign * magnitude)
}

/// Unsigned `1.5`, `.5`, `5.`, `1e-3`
fn decimal(body: &str) -> Option<f64> {
    let leading = body.chars().next()?;
    let valid = (leading.is_ascii_digit() || leading == '.')
        && body.chars().all(|c| c.is_ascii_digit() || "+-.eE".contains(c));

    if valid {
        body.parse::<f64>().ok()
    } else {
        None
    }
}

/// Unsigned hex float without the `0x` prefix: `1.8p1` is 3. The binary
/// exponent is required.
fn hexadecimal(body: &str) -> Option<f64> {
    let (mantissa, exponent) = body.split_once(|c: char| c == 'p' || c == 'P')?;
    let exponent: i32 = exponent.parse().ok()?;
    let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));

    if whole.is_empty() && fraction.is_empty() {
        return None;
    }

    let mut value = 0.0;
    for c in whole.chars() {
        value = value * 16.0 + f64::from(c.to_digit(16)?);
    }

    let mut scale = 1.0 / 16.0;
    for c in fraction.chars() {
        value += f64::from(c.to_digit(16)?) * scale;
        scale /= 16.0;
    }

    Some(value * 2f64.powi(exponent))
}

/// `; ...` up to but not including the newline
fn comment(i: &str) -> Res<&str> {
    recognize(pair(char(';'), not_line_ending))(i)
}

/// Skip any amount of whitespace and comments
fn space0(i: &str) -> Res<()> {
    value((), many0(alt((take_while1(char::is_whitespace), comment))))(i)
}
