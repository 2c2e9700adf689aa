// FILE: src/library/beets.rs
//! Read-only access to a beets `library.db`.
//!
//! Fixed attributes come from the columns of the `items` table (in column
//! order), flexible attributes from `item_attributes`. The `path` column is a
//! BLOB holding raw OS bytes.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, OpenFlags};
use crate::error::{BeetfsError, Result};
use super::{Item, Library, TagValue};

pub struct BeetsLibrary {
    conn: Mutex<Connection>,
}

impl BeetsLibrary {
    /// Open the beets database read-only.
    pub fn open(db_path: &Path) -> Result<Self> {
        if !db_path.exists() {
            return Err(BeetfsError::Config(format!(
                "Library database not found: {}",
                db_path.display()
            )));
        }

        let conn = Connection::open_with_flags(
            db_path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let library = Self::from_connection(conn)?;
        tracing::info!("[BeetsLibrary] Opened {}", db_path.display());
        Ok(library)
    }

    /// Wrap an existing connection, checking that it looks like a beets library.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        if !table_exists(&conn, "items")? {
            return Err(BeetfsError::Config("Not a beets library: no items table".into()));
        }
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn load(&self, only: Option<i64>) -> Result<Vec<Item>> {
        let conn = self.conn.lock()
            .map_err(|_| BeetfsError::Other(anyhow::anyhow!("Poisoned lock")))?;

        let mut items = load_fixed(&conn, only)?;

        if table_exists(&conn, "item_attributes")? {
            let mut flex = load_flexible(&conn, only)?;
            for item in items.iter_mut() {
                if let Some(attrs) = flex.remove(&item.id) {
                    for (key, value) in attrs {
                        item.set_tag(&key, value);
                    }
                }
            }
        }

        Ok(items)
    }
}

impl Library for BeetsLibrary {
    fn items(&self) -> Result<Vec<Item>> {
        self.load(None)
    }

    fn get_item(&self, id: i64) -> Result<Option<Item>> {
        Ok(self.load(Some(id))?.into_iter().next())
    }
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        params![name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn load_fixed(conn: &Connection, only: Option<i64>) -> Result<Vec<Item>> {
    let sql = match only {
        Some(_) => "SELECT * FROM items WHERE id = ?1",
        None => "SELECT * FROM items ORDER BY id",
    };
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = match only {
        Some(id) => stmt.query(params![id])?,
        None => stmt.query([])?,
    };

    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        let mut id = None;
        let mut path = None;
        let mut tags = Vec::with_capacity(columns.len());

        for (idx, name) in columns.iter().enumerate() {
            match name.as_str() {
                "id" => id = Some(row.get::<_, i64>(idx)?),
                "path" => path = path_from_value(row.get_ref(idx)?),
                _ => tags.push((name.clone(), tag_from_value(row.get_ref(idx)?))),
            }
        }

        match (id, path) {
            (Some(id), Some(path)) => items.push(Item { id, path, tags }),
            (id, _) => tracing::warn!("[BeetsLibrary] Skipping item {:?} without a path", id),
        }
    }

    Ok(items)
}

fn load_flexible(
    conn: &Connection,
    only: Option<i64>,
) -> Result<HashMap<i64, Vec<(String, Option<TagValue>)>>> {
    let sql = match only {
        Some(_) => "SELECT entity_id, key, value FROM item_attributes WHERE entity_id = ?1 ORDER BY id",
        None => "SELECT entity_id, key, value FROM item_attributes ORDER BY id",
    };
    let mut stmt = conn.prepare(sql)?;
    let mut rows = match only {
        Some(id) => stmt.query(params![id])?,
        None => stmt.query([])?,
    };

    let mut attrs: HashMap<i64, Vec<(String, Option<TagValue>)>> = HashMap::new();
    while let Some(row) = rows.next()? {
        let entity: i64 = row.get(0)?;
        let key: String = row.get(1)?;
        let value = tag_from_value(row.get_ref(2)?);
        attrs.entry(entity).or_default().push((key, value));
    }
    Ok(attrs)
}

fn path_from_value(value: ValueRef<'_>) -> Option<PathBuf> {
    match value {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => {
            Some(PathBuf::from(OsStr::from_bytes(bytes)))
        }
        _ => None,
    }
}

fn tag_from_value(value: ValueRef<'_>) -> Option<TagValue> {
    match value {
        ValueRef::Null => None,
        ValueRef::Integer(n) => Some(TagValue::Integer(n)),
        ValueRef::Real(f) => Some(TagValue::Real(f)),
        ValueRef::Text(t) => Some(TagValue::Text(String::from_utf8_lossy(t).into_owned())),
        ValueRef::Blob(_) => None,
    }
}
