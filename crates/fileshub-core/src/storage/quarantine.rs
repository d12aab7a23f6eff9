//! Documents identified as duplicates, each linked to the catalog entry it
//! duplicates. Quarantine ids are their own id space.

use super::{glob_to_like, reject_empty_pattern};
use crate::document::{Document, Relation};
use crate::error::Error;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const SELECT_COLUMNS: &str = "SELECT id, duplicate_of, canonical_path, filename, last_modified, \
     content_hash, comment FROM quarantine";

fn document_from_row(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        relation: Relation::DuplicateOf(row.get(1)?),
        canonical_path: row.get(2)?,
        filename: row.get(3)?,
        last_modified: row.get(4)?,
        content_hash: row.get(5)?,
        comment: row.get(6)?,
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

fn check_target(duplicate_of: i64) -> Result<(), Error> {
    if duplicate_of < 1 {
        return Err(Error::Validation {
            reason: "duplicate target id must be greater than 0".to_string(),
            document: format!("duplicate_of={}", duplicate_of),
        });
    }
    Ok(())
}

/// Quarantine `doc` as a duplicate of catalog entry `duplicate_of`.
///
/// `doc` describes the duplicate file itself; its own id and relation are
/// ignored and replaced.
pub fn insert(conn: &Connection, doc: &Document, duplicate_of: i64) -> Result<i64, Error> {
    let record = Document {
        relation: Relation::DuplicateOf(duplicate_of),
        ..doc.clone()
    };
    record.validate_fields()?;

    conn.prepare_cached(
        "INSERT INTO quarantine \
         (duplicate_of, canonical_path, filename, last_modified, content_hash, comment) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    )?
    .execute(params![
        duplicate_of,
        record.canonical_path,
        record.filename,
        record.last_modified,
        record.content_hash,
        record.comment,
    ])?;
    let id = conn.last_insert_rowid();
    debug!(
        "Quarantined {} as {} (duplicate of {})",
        record.canonical_path, id, duplicate_of
    );
    Ok(id)
}

pub fn find_by_path(conn: &Connection, canonical_path: &str) -> Result<Option<Document>, Error> {
    find_one(conn, "canonical_path = ?1", &canonical_path)
}

pub fn find_by_hash(conn: &Connection, hash: &str) -> Result<Option<Document>, Error> {
    find_one(conn, "content_hash = ?1", &hash)
}

pub fn find_all_by_hash(conn: &Connection, hash: &str) -> Result<Vec<Document>, Error> {
    find_many(conn, "content_hash = ?1", &hash)
}

pub fn find_by_id(conn: &Connection, id: i64) -> Result<Option<Document>, Error> {
    find_one(conn, "id = ?1", &id)
}

/// All entries pointing at one catalog entry, oldest first.
pub fn find_by_duplicate_of(conn: &Connection, catalog_id: i64) -> Result<Vec<Document>, Error> {
    find_many(conn, "duplicate_of = ?1", &catalog_id)
}

pub fn find_by_filename_pattern(conn: &Connection, pattern: &str) -> Result<Vec<Document>, Error> {
    reject_empty_pattern(pattern)?;
    find_many(conn, "filename LIKE ?1 ESCAPE '\\'", &glob_to_like(pattern))
}

pub fn find_by_path_pattern(conn: &Connection, pattern: &str) -> Result<Vec<Document>, Error> {
    reject_empty_pattern(pattern)?;
    find_many(conn, "canonical_path LIKE ?1 ESCAPE '\\'", &glob_to_like(pattern))
}

pub fn count(conn: &Connection) -> Result<i64, Error> {
    Ok(conn.query_row("SELECT COUNT(*) FROM quarantine", [], |row| row.get(0))?)
}

/// Point every entry linked to `old_duplicate_of` at `new_duplicate_of`.
/// Runs as a single statement, so concurrent relinks never see a half-moved set.
pub fn relink(conn: &Connection, old_duplicate_of: i64, new_duplicate_of: i64) -> Result<usize, Error> {
    check_target(new_duplicate_of)?;
    if old_duplicate_of == new_duplicate_of {
        return Ok(0);
    }
    let rows = conn.prepare_cached(
        "UPDATE quarantine SET duplicate_of = ?1 WHERE duplicate_of = ?2",
    )?
    .execute(params![new_duplicate_of, old_duplicate_of])?;
    debug!(
        "Relinked {} quarantine entries from {} to {}",
        rows, old_duplicate_of, new_duplicate_of
    );
    Ok(rows)
}

/// Point a single entry at another catalog entry.
pub fn set_duplicate_of(conn: &Connection, id: i64, duplicate_of: i64) -> Result<usize, Error> {
    check_target(duplicate_of)?;
    let rows = conn.prepare_cached("UPDATE quarantine SET duplicate_of = ?1 WHERE id = ?2")?
        .execute(params![duplicate_of, id])?;
    Ok(rows)
}

pub fn update_content(
    conn: &Connection,
    id: i64,
    content_hash: &str,
    last_modified: i64,
) -> Result<usize, Error> {
    if content_hash.is_empty() || last_modified < 1 {
        return Err(Error::Validation {
            reason: "updated content needs a hash and a positive mtime".to_string(),
            document: format!("quarantine id={}", id),
        });
    }
    let rows = conn.prepare_cached(
        "UPDATE quarantine SET content_hash = ?1, last_modified = ?2 WHERE id = ?3",
    )?
    .execute(params![content_hash, last_modified, id])?;
    Ok(rows)
}

/// Delete one entry matched on id, hash and path together.
pub fn remove(conn: &Connection, doc: &Document) -> Result<usize, Error> {
    let rows = conn.prepare_cached(
        "DELETE FROM quarantine WHERE id = ?1 AND content_hash = ?2 AND canonical_path = ?3",
    )?
    .execute(params![doc.id, doc.content_hash, doc.canonical_path])?;
    debug!("Removed quarantine entry {} ({} rows)", doc.id, rows);
    Ok(rows)
}
