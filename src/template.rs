// FILE: src/template.rs
//! Path templates in the beets template language.
//!
//! Supported syntax:
//! - `$field` and `${field}` substitute a tag value
//! - `$$`, `$%`, `${`, `$}` and `$,` produce the literal character
//! - `%func{arg,arg}` calls one of the built-in functions below
//!
//! Functions: `lower`, `upper`, `title`, `left`, `right`, `if`, `ifdef`,
//! `first`, `aunique`. `%aunique{}` always renders empty: album
//! disambiguation needs album-level queries the library interface doesn't
//! offer.

use crate::error::{BeetfsError, Result};
use crate::library::TagValue;

/// Fields beets renders as zero-padded integers, with their width.
const PADDED_FIELDS: &[(&str, usize)] = &[
    ("track", 2),
    ("tracktotal", 2),
    ("disc", 2),
    ("disctotal", 2),
    ("month", 2),
    ("day", 2),
    ("original_month", 2),
    ("original_day", 2),
    ("year", 4),
    ("original_year", 4),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Func {
    Lower,
    Upper,
    Title,
    Left,
    Right,
    If,
    IfDef,
    First,
    AUnique,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "lower" => Func::Lower,
            "upper" => Func::Upper,
            "title" => Func::Title,
            "left" => Func::Left,
            "right" => Func::Right,
            "if" => Func::If,
            "ifdef" => Func::IfDef,
            "first" => Func::First,
            "aunique" => Func::AUnique,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Literal(String),
    Field(String),
    Call(Func, Vec<Vec<Part>>),
}

/// A parsed template for one path segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    source: String,
    parts: Vec<Part>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self> {
        let mut parser = Parser { chars: source.chars().collect(), pos: 0 };
        let parts = parser.sequence(false)?;
        if parser.pos < parser.chars.len() {
            return Err(BeetfsError::Template(format!(
                "Unexpected '{}' in template '{}'",
                parser.chars[parser.pos], source
            )));
        }
        Ok(Self { source: source.to_string(), parts })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Render against a tag lookup. Missing fields render empty.
    pub fn render<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<TagValue>,
    {
        render_parts(&self.parts, &lookup)
    }
}

/// Split a `/`-separated path format into one template per depth.
pub fn parse_path_format(format: &str) -> Result<Vec<Template>> {
    let segments: Vec<&str> = format.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return Err(BeetfsError::Template("Path format is empty".into()));
    }
    segments.into_iter().map(Template::parse).collect()
}

/// Format a tag value the way beets prints it in paths.
pub fn format_field(name: &str, value: &TagValue) -> String {
    if let Some((_, width)) = PADDED_FIELDS.iter().find(|(f, _)| *f == name) {
        if let Some(n) = value.as_integer() {
            return format!("{:0width$}", n, width = *width);
        }
    }
    value.to_string()
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn identifier(&mut self) -> String {
        let start = self.pos;
        while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '_') {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn sequence(&mut self, in_args: bool) -> Result<Vec<Part>> {
        let mut parts = Vec::new();
        let mut literal = String::new();

        while let Some(c) = self.peek() {
            match c {
                '$' => {
                    self.pos += 1;
                    match self.peek() {
                        Some(e @ ('$' | '%' | '}' | ',')) => {
                            literal.push(e);
                            self.pos += 1;
                        }
                        Some('{') => {
                            self.pos += 1;
                            let name = self.identifier();
                            if !name.is_empty() && self.peek() == Some('}') {
                                self.pos += 1;
                                flush(&mut parts, &mut literal);
                                parts.push(Part::Field(name));
                            } else {
                                literal.push('{');
                                literal.push_str(&name);
                            }
                        }
                        Some(_) => {
                            let name = self.identifier();
                            if name.is_empty() {
                                literal.push('$');
                            } else {
                                flush(&mut parts, &mut literal);
                                parts.push(Part::Field(name));
                            }
                        }
                        None => literal.push('$'),
                    }
                }
                '%' => {
                    let start = self.pos;
                    self.pos += 1;
                    let name = self.identifier();
                    if name.is_empty() || self.peek() != Some('{') {
                        self.pos = start + 1;
                        literal.push('%');
                        continue;
                    }
                    let func = Func::from_name(&name).ok_or_else(|| {
                        BeetfsError::Template(format!("Unknown template function '%{}'", name))
                    })?;
                    self.pos += 1;
                    let args = self.arguments(&name)?;
                    flush(&mut parts, &mut literal);
                    parts.push(Part::Call(func, args));
                }
                ',' | '}' if in_args => break,
                _ => {
                    literal.push(c);
                    self.pos += 1;
                }
            }
        }

        flush(&mut parts, &mut literal);
        Ok(parts)
    }

    fn arguments(&mut self, name: &str) -> Result<Vec<Vec<Part>>> {
        let mut args = Vec::new();
        loop {
            args.push(self.sequence(true)?);
            match self.peek() {
                Some(',') => self.pos += 1,
                Some('}') => {
                    self.pos += 1;
                    return Ok(args);
                }
                _ => {
                    return Err(BeetfsError::Template(format!(
                        "Unclosed call to '%{}'",
                        name
                    )))
                }
            }
        }
    }
}

fn flush(parts: &mut Vec<Part>, literal: &mut String) {
    if !literal.is_empty() {
        parts.push(Part::Literal(std::mem::take(literal)));
    }
}

fn render_parts(parts: &[Part], lookup: &dyn Fn(&str) -> Option<TagValue>) -> String {
    let mut out = String::new();
    for part in parts {
        match part {
            Part::Literal(s) => out.push_str(s),
            Part::Field(name) => {
                if let Some(value) = lookup(name) {
                    out.push_str(&format_field(name, &value));
                }
            }
            Part::Call(func, args) => out.push_str(&call(*func, args, lookup)),
        }
    }
    out
}

fn call(func: Func, args: &[Vec<Part>], lookup: &dyn Fn(&str) -> Option<TagValue>) -> String {
    let arg = |i: usize| {
        args.get(i)
            .map(|a| render_parts(a, lookup))
            .unwrap_or_default()
    };
    let count = |i: usize| arg(i).trim().parse::<usize>().unwrap_or(0);

    match func {
        Func::Lower => arg(0).to_lowercase(),
        Func::Upper => arg(0).to_uppercase(),
        Func::Title => title_case(&arg(0)),
        Func::Left => arg(0).chars().take(count(1)).collect(),
        Func::Right => {
            let s = arg(0);
            let skip = s.chars().count().saturating_sub(count(1));
            s.chars().skip(skip).collect()
        }
        Func::If => {
            if is_truthy(&arg(0)) {
                arg(1)
            } else {
                arg(2)
            }
        }
        Func::IfDef => {
            let field = arg(0);
            if lookup(field.trim()).is_some() {
                arg(1)
            } else {
                arg(2)
            }
        }
        Func::First => arg(0).split("; ").next().unwrap_or("").trim().to_string(),
        Func::AUnique => String::new(),
    }
}

fn is_truthy(condition: &str) -> bool {
    let c = condition.trim();
    if c.is_empty() {
        return false;
    }
    match c.parse::<i64>() {
        Ok(n) => n != 0,
        Err(_) => !c.eq_ignore_ascii_case("false"),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_word = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}
