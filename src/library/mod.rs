// FILE: src/library/mod.rs
//! The music library seen by the filesystem: items, their tags and the
//! original audio file behind each one.

pub mod beets;

pub use beets::BeetsLibrary;

use std::fmt;
use std::path::{Path, PathBuf};
use crate::error::Result;
use crate::template::Template;

/// A single tag value as stored by the library.
#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl TagValue {
    /// Zero numbers and empty strings count as "no value" and are never
    /// written into a synthesized header.
    pub fn is_empty(&self) -> bool {
        match self {
            TagValue::Integer(n) => *n == 0,
            TagValue::Real(f) => *f == 0.0,
            TagValue::Text(s) => s.is_empty(),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TagValue::Integer(n) => Some(*n),
            TagValue::Real(f) if f.fract() == 0.0 => Some(*f as i64),
            TagValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Integer(n) => write!(f, "{}", n),
            // Whole floats keep their ".0" so "1.0" doesn't read back as an integer.
            TagValue::Real(r) if r.is_finite() && r.fract() == 0.0 => write!(f, "{:.1}", r),
            TagValue::Real(r) => write!(f, "{}", r),
            TagValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<i64> for TagValue {
    fn from(n: i64) -> Self {
        TagValue::Integer(n)
    }
}

impl From<f64> for TagValue {
    fn from(f: f64) -> Self {
        TagValue::Real(f)
    }
}

/// One library entry: an id, its tags in library order, and the path of the
/// original audio file.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub id: i64,
    pub path: PathBuf,
    pub tags: Vec<(String, Option<TagValue>)>,
}

impl Item {
    pub fn new(id: i64, path: impl Into<PathBuf>) -> Self {
        Self { id, path: path.into(), tags: Vec::new() }
    }

    pub fn with_tag(mut self, name: &str, value: impl Into<TagValue>) -> Self {
        self.set_tag(name, Some(value.into()));
        self
    }

    /// Replaces an existing tag in place, or appends it.
    pub fn set_tag(&mut self, name: &str, value: Option<TagValue>) {
        match self.tags.iter_mut().find(|(k, _)| k == name) {
            Some(slot) => slot.1 = value,
            None => self.tags.push((name.to_string(), value)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn tag(&self, name: &str) -> Option<&TagValue> {
        self.tags
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.as_ref())
    }

    /// Tags with a non-empty value, in library order.
    pub fn present_tags(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.tags.iter().filter_map(|(k, v)| match v {
            Some(v) if !v.is_empty() => Some((k.as_str(), v)),
            _ => None,
        })
    }

    /// Extension of the original file including the dot, e.g. ".flac".
    pub fn extension(&self) -> String {
        self.path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default()
    }

    pub fn render_template(&self, template: &Template) -> String {
        template.render(|field| self.tag(field).cloned())
    }
}

/// Read access to a music library.
pub trait Library: Send + Sync {
    fn items(&self) -> Result<Vec<Item>>;
    fn get_item(&self, id: i64) -> Result<Option<Item>>;
}

/// A library held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryLibrary {
    items: Vec<Item>,
}

impl MemoryLibrary {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn push(&mut self, item: Item) {
        self.items.push(item);
    }
}

impl Library for MemoryLibrary {
    fn items(&self) -> Result<Vec<Item>> {
        Ok(self.items.clone())
    }

    fn get_item(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.items.iter().find(|i| i.id == id).cloned())
    }
}
