use crate::document::Document;
use crate::engine::DedupEngine;
use crate::error::Error;
use crate::hasher::Fingerprinter;
use crate::storage::{catalog, quarantine};
use rusqlite::Connection;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchQuery {
    /// A catalog id, together with the duplicates quarantined under it.
    ById(i64),
    ByHash(String),
    /// `*` matches any run of characters.
    ByFilename(String),
    /// `*` matches any run of characters.
    ByPath(String),
}

/// Catalog matches first, then quarantine matches. Nothing found is an empty list.
pub fn search(conn: &Connection, query: &SearchQuery) -> Result<Vec<Document>, Error> {
    let mut found: Vec<Document> = Vec::new();
    match query {
        SearchQuery::ById(id) => {
            found.extend(catalog::find_by_id(conn, *id)?);
            if !found.is_empty() {
                found.extend(quarantine::find_by_duplicate_of(conn, *id)?);
            }
        }
        SearchQuery::ByHash(hash) => {
            found.extend(catalog::find_by_hash(conn, hash)?);
            found.extend(quarantine::find_all_by_hash(conn, hash)?);
        }
        SearchQuery::ByFilename(pattern) => {
            found.extend(catalog::find_by_filename_pattern(conn, pattern)?);
            found.extend(quarantine::find_by_filename_pattern(conn, pattern)?);
        }
        SearchQuery::ByPath(pattern) => {
            found.extend(catalog::find_by_path_pattern(conn, pattern)?);
            found.extend(quarantine::find_by_path_pattern(conn, pattern)?);
        }
    }
    Ok(found)
}

impl<F: Fingerprinter> DedupEngine<F> {
    pub fn search(&self, query: &SearchQuery) -> Result<Vec<Document>, Error> {
        self.with_connection(|conn| search(conn, query))
    }
}
