//! Evaluation of `=`-prefixed attribute and text values.
//!
//! Values starting with `=` are handed to an [`ExpressionEvaluator`] with the `=`
//! stripped. Definitions are read through [`DefineLookup`], which lets the caller
//! record every definition an instance depended on.

use bab_common::{BuildError, BuildResult, ErrorCode};

/// Access to the definitions visible to a document.
pub trait DefineLookup {
    /// The evaluated value of definition `name`, if it exists.
    fn lookup_define(&mut self, name: &str) -> Option<String>;
}

/// Turns an expression into its string value.
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluates `expr` (without the leading `=`).
    fn evaluate(&self, expr: &str, defines: &mut dyn DefineLookup) -> BuildResult<String>;
}

/// Define references, `+ - * /` arithmetic with parentheses, and text pass-through.
///
/// `$Name` alone yields the definition's string value. Anything that parses as
/// arithmetic is computed in `f64` and printed without a fraction when integral.
/// Any other text has its `$Name` references substituted.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultEvaluator;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

fn undefined(name: &str) -> BuildError {
    BuildError::new(
        ErrorCode::ReferencingError,
        format!("Definition '{name}' is not defined."),
    )
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

impl ExpressionEvaluator for DefaultEvaluator {
    fn evaluate(&self, expr: &str, defines: &mut dyn DefineLookup) -> BuildResult<String> {
        let expr = expr.trim();
        if let Some(name) = expr.strip_prefix('$') {
            if !name.is_empty() && name.chars().all(is_name_char) {
                return defines.lookup_define(name).ok_or_else(|| undefined(name));
            }
        }
        let mut parser = Arithmetic {
            chars: expr.chars().collect(),
            pos: 0,
            defines: &mut *defines,
            failure: None,
        };
        match parser.parse() {
            Ok(value) => return Ok(format_number(value)),
            Err(Some(err)) => return Err(err),
            Err(None) => {}
        }
        substitute(expr, defines)
    }
}

fn substitute(expr: &str, defines: &mut dyn DefineLookup) -> BuildResult<String> {
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let mut end = start + 1;
        while let Some(&(i, next)) = chars.peek() {
            if !is_name_char(next) {
                break;
            }
            end = i + next.len_utf8();
            chars.next();
        }
        let name = &expr[start + 1..end];
        if name.is_empty() {
            out.push('$');
        } else {
            out.push_str(&defines.lookup_define(name).ok_or_else(|| undefined(name))?);
        }
    }
    Ok(out)
}

/// Recursive-descent arithmetic. `Err(None)` means "not arithmetic".
struct Arithmetic<'a> {
    chars: Vec<char>,
    pos: usize,
    defines: &'a mut dyn DefineLookup,
    failure: Option<BuildError>,
}

type Parsed = Result<f64, Option<BuildError>>;

impl Arithmetic<'_> {
    fn parse(&mut self) -> Parsed {
        if self.chars.is_empty() {
            return Err(None);
        }
        let value = self.sum()?;
        self.skip_ws();
        if self.pos != self.chars.len() {
            return Err(self.failure.take());
        }
        Ok(value)
    }

    fn skip_ws(&mut self) {
        while self.chars.get(self.pos).is_some_and(|c| c.is_whitespace()) {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.get(self.pos).copied()
    }

    fn sum(&mut self) -> Parsed {
        let mut value = self.product()?;
        while let Some(op @ ('+' | '-')) = self.peek() {
            self.pos += 1;
            let rhs = self.product()?;
            value = if op == '+' { value + rhs } else { value - rhs };
        }
        Ok(value)
    }

    fn product(&mut self) -> Parsed {
        let mut value = self.unary()?;
        while let Some(op @ ('*' | '/')) = self.peek() {
            self.pos += 1;
            let rhs = self.unary()?;
            if op == '/' {
                if rhs == 0.0 {
                    return Err(Some(BuildError::new(
                        ErrorCode::ReferencingError,
                        "Division by zero in expression.",
                    )));
                }
                value /= rhs;
            } else {
                value *= rhs;
            }
        }
        Ok(value)
    }

    fn unary(&mut self) -> Parsed {
        match self.peek() {
            Some('-') => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some('+') => {
                self.pos += 1;
                self.unary()
            }
            _ => self.atom(),
        }
    }

    fn atom(&mut self) -> Parsed {
        match self.peek() {
            Some('(') => {
                self.pos += 1;
                let value = self.sum()?;
                if self.peek() != Some(')') {
                    return Err(None);
                }
                self.pos += 1;
                Ok(value)
            }
            Some('$') => {
                self.pos += 1;
                let start = self.pos;
                while self.chars.get(self.pos).is_some_and(|c| is_name_char(*c)) {
                    self.pos += 1;
                }
                let name: String = self.chars[start..self.pos].iter().collect();
                if name.is_empty() {
                    return Err(None);
                }
                let Some(value) = self.defines.lookup_define(&name) else {
                    return Err(Some(undefined(&name)));
                };
                value.trim().parse::<f64>().map_err(|_| None)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => {
                let start = self.pos;
                while self
                    .chars
                    .get(self.pos)
                    .is_some_and(|c| c.is_ascii_digit() || *c == '.')
                {
                    self.pos += 1;
                }
                let text: String = self.chars[start..self.pos].iter().collect();
                text.parse::<f64>().map_err(|_| None)
            }
            _ => Err(None),
        }
    }
}
