use crate::error::Error;
use std::fs::Metadata;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Which store a document belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Relation {
    /// Authoritative catalog record for its content.
    #[default]
    Kept,
    /// Quarantined duplicate of the catalog record with this id.
    DuplicateOf(i64),
}

/// One observed file at one point in time.
///
/// `id` is 0 until a store persists the document. `last_modified` is the file
/// mtime in milliseconds since the Unix epoch and is only used to skip files
/// that have not changed since they were last observed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub id: i64,
    pub canonical_path: String,
    pub filename: String,
    pub last_modified: i64,
    pub content_hash: String,
    pub comment: Option<String>,
    pub relation: Relation,
}

impl Document {
    /// Build an unhashed, unpersisted document from an already canonical path.
    pub fn observed(canonical_path: &Path, metadata: &Metadata) -> Self {
        Document {
            id: 0,
            canonical_path: canonical_path.to_string_lossy().into_owned(),
            filename: canonical_path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_default(),
            last_modified: modified_millis(metadata),
            content_hash: String::new(),
            comment: None,
            relation: Relation::Kept,
        }
    }

    pub fn with_hash(mut self, content_hash: String) -> Self {
        self.content_hash = content_hash;
        self
    }

    pub fn is_persisted(&self) -> bool {
        self.id > 0
    }

    pub fn duplicate_of(&self) -> Option<i64> {
        match self.relation {
            Relation::Kept => None,
            Relation::DuplicateOf(id) => Some(id),
        }
    }

    /// Check the full persisted-record invariant, including the id.
    pub fn validate(&self) -> Result<(), Error> {
        if !self.is_persisted() {
            return Err(self.invalid("id must be greater than 0"));
        }
        self.validate_fields()
    }

    /// Check everything a store needs before it assigns an id.
    pub(crate) fn validate_fields(&self) -> Result<(), Error> {
        if self.content_hash.is_empty() {
            return Err(self.invalid("content hash can't be empty"));
        }
        if self.canonical_path.is_empty() {
            return Err(self.invalid("canonical path can't be empty"));
        }
        if self.filename.is_empty() {
            return Err(self.invalid("filename can't be empty"));
        }
        if self.last_modified < 1 {
            return Err(self.invalid("last modified must be greater than 0"));
        }
        if let Relation::DuplicateOf(target) = self.relation {
            if target < 1 {
                return Err(self.invalid("duplicate target id must be greater than 0"));
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> Error {
        Error::Validation {
            reason: reason.to_string(),
            document: format!(
                "id={}, canonical_path={:?}, filename={:?}, last_modified={}, hash={:?}",
                self.id, self.canonical_path, self.filename, self.last_modified, self.content_hash
            ),
        }
    }
}

pub fn modified_millis(metadata: &Metadata) -> i64 {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_doc() -> Document {
        Document {
            id: 7,
            canonical_path: "/a/x.txt".to_string(),
            filename: "x.txt".to_string(),
            last_modified: 1_700_000_000_000,
            content_hash: "c0ffee".to_string(),
            comment: None,
            relation: Relation::Kept,
        }
    }

    #[test]
    fn test_valid_document_passes() {
        assert!(valid_doc().validate().is_ok());
    }

    #[test]
    fn test_zero_or_negative_id_rejected() {
        for id in [0, -3] {
            let doc = Document { id, ..valid_doc() };
            assert!(matches!(doc.validate(), Err(Error::Validation { .. })));
        }
    }

    #[test]
    fn test_each_empty_field_rejected() {
        let cases = [
            Document { content_hash: String::new(), ..valid_doc() },
            Document { canonical_path: String::new(), ..valid_doc() },
            Document { filename: String::new(), ..valid_doc() },
            Document { last_modified: 0, ..valid_doc() },
            Document { relation: Relation::DuplicateOf(0), ..valid_doc() },
        ];
        for doc in cases {
            assert!(matches!(doc.validate(), Err(Error::Validation { .. })), "{:?}", doc);
        }
    }

    #[test]
    fn test_fields_check_ignores_unassigned_id() {
        let doc = Document { id: 0, ..valid_doc() };
        assert!(doc.validate_fields().is_ok());
        assert!(!doc.is_persisted());
    }

    #[test]
    fn test_observed_document_takes_name_and_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "hello").unwrap();
        let metadata = std::fs::metadata(&path).unwrap();

        let doc = Document::observed(&path, &metadata);
        assert_eq!(doc.filename, "notes.md");
        assert!(doc.last_modified > 0);
        assert!(doc.content_hash.is_empty());
        assert_eq!(doc.duplicate_of(), None);
    }
}
