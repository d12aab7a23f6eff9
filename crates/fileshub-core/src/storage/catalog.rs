//! The catalog holds one authoritative record per distinct content.
//!
//! Every function takes the connection (or a transaction, which derefs to one)
//! explicitly, so callers decide which calls share a transaction.

use super::{glob_to_like, is_unique_violation, reject_empty_pattern};
use crate::document::{Document, Relation};
use crate::error::Error;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const SELECT_COLUMNS: &str =
    "SELECT id, canonical_path, filename, last_modified, content_hash, comment FROM catalog";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        canonical_path: row.get(1)?,
        filename: row.get(2)?,
        last_modified: row.get(3)?,
        content_hash: row.get(4)?,
        comment: row.get(5)?,
        relation: Relation::Kept,
    })
}

fn find_one(conn: &Connection, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Option<Document>, Error> {
    let sql = format!("{} WHERE {} ORDER BY id LIMIT 1", SELECT_COLUMNS, clause);
    let doc = conn
        .prepare_cached(&sql)?
        .query_row([value], document_from_row)
        .optional()?;
    Ok(doc)
}

fn find_many(conn: &Connection, clause: &str, value: &dyn rusqlite::ToSql) -> Result<Vec<Document>, Error> {
    let sql = format!("{} WHERE {} ORDER BY id", SELECT_COLUMNS, clause);
    let mut stmt = conn.prepare_cached(&sql)?;
    let docs = stmt
        .query_map([value], document_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(docs)
}

/// Insert a new catalog entry and return its id.
///
/// Fails with `Validation` if the record is incomplete and with `Conflict` if
/// the canonical path is already catalogued.
pub fn insert(conn: &Connection, doc: &Document) -> Result<i64, Error> {
    if doc.relation != Relation::Kept {
        return Err(Error::Validation {
            reason: "a quarantined document can't be inserted into the catalog".to_string(),
            document: doc.canonical_path.clone(),
        });
    }
    doc.validate_fields()?;

    let result = conn.prepare_cached(
        "INSERT INTO catalog (canonical_path, filename, last_modified, content_hash, comment) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?
    .execute(params![
        doc.canonical_path,
        doc.filename,
        doc.last_modified,
        doc.content_hash,
        doc.comment,
    ]);

    match result {
        Ok(_) => {
            let id = conn.last_insert_rowid();
            debug!("Catalogued {} as {}", doc.canonical_path, id);
            Ok(id)
        }
        Err(e) if is_unique_violation(&e) => Err(Error::Conflict(doc.canonical_path.clone())),
        Err(e) => Err(e.into()),
    }
}

/// The earliest-inserted entry with this content hash.
pub fn find_by_hash(conn: &Connection, hash: &str) -> Result<Option<Document>, Error> {
    find_one(conn, "content_hash = ?1", &hash)
}

pub fn find_by_path(conn: &Connection, canonical_path: &str) -> Result<Option<Document>, Error> {
    find_one(conn, "canonical_path = ?1", &canonical_path)
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Document>, Error> {
    find_one(conn, "id = ?1", &id)
}

/// Filename search, `*` matches any run of characters.
pub fn find_by_filename_pattern(conn: &Connection, pattern: &str) -> Result<Vec<Document>, Error> {
    reject_empty_pattern(pattern)?;
    find_many(conn, "filename LIKE ?1 ESCAPE '\\'", &glob_to_like(pattern))
}

/// Canonical path search, `*` matches any run of characters.
pub fn find_by_path_pattern(conn: &Connection, pattern: &str) -> Result<Vec<Document>, Error> {
    reject_empty_pattern(pattern)?;
    find_many(conn, "canonical_path LIKE ?1 ESCAPE '\\'", &glob_to_like(pattern))
}

pub fn exists(conn: &Connection, canonical_path: &str) -> Result<bool, Error> {
    let count: i64 = conn.prepare_cached("SELECT COUNT(*) FROM catalog WHERE canonical_path = ?1")?
        .query_row(params![canonical_path], |row| row.get(0))?;
    Ok(count > 0)
}

/// Every entry, oldest first.
pub fn all(conn: &Connection) -> Result<Vec<Document>, Error> {
    let sql = format!("{} ORDER BY id", SELECT_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let docs = stmt
        .query_map([], document_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(docs)
}

pub fn count(conn: &Connection) -> Result<i64, Error> {
    Ok(conn.query_row("SELECT COUNT(*) FROM catalog", [], |row| row.get(0))?)
}

/// Record new content for a file that was modified in place.
pub fn update_content(
    conn: &Connection,
    id: i64,
    content_hash: &str,
    last_modified: i64,
) -> Result<usize, Error> {
    if content_hash.is_empty() || last_modified < 1 {
        return Err(Error::Validation {
            reason: "updated content needs a hash and a positive mtime".to_string(),
            document: format!("id={}", id),
        });
    }
    let rows = conn.prepare_cached(
        "UPDATE catalog SET content_hash = ?1, last_modified = ?2 WHERE id = ?3",
    )?
    .execute(params![content_hash, last_modified, id])?;
    debug!("Updated content of catalog entry {} ({} rows)", id, rows);
    Ok(rows)
}

/// Delete one entry. The id, hash and path must all match, so a stale copy
/// of a record can't remove a row that has since been reused or changed.
pub fn remove(conn: &Connection, doc: &Document) -> Result<usize, Error> {
    let rows = conn.prepare_cached(
        "DELETE FROM catalog WHERE id = ?1 AND content_hash = ?2 AND canonical_path = ?3",
    )?
    .execute(params![doc.id, doc.content_hash, doc.canonical_path])?;
    debug!("Removed catalog entry {} ({} rows)", doc.id, rows);
    Ok(rows)
}
