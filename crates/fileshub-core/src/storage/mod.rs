pub mod catalog;
pub mod quarantine;
pub mod sqlite;

pub use sqlite::Database;

use crate::error::Error;

/// True when a SQLite error is a UNIQUE constraint violation.
pub(crate) fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

/// Translate a `*` wildcard pattern into a `LIKE` pattern escaped with `\`.
pub(crate) fn glob_to_like(pattern: &str) -> String {
    let mut like = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        match c {
            '*' => like.push('%'),
            '%' | '_' | '\\' => {
                like.push('\\');
                like.push(c);
            }
            _ => like.push(c),
        }
    }
    like
}

pub(crate) fn reject_empty_pattern(pattern: &str) -> Result<(), Error> {
    if pattern.is_empty() {
        return Err(Error::Other("search pattern can't be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_to_like_wildcards() {
        assert_eq!(glob_to_like("*.txt"), "%.txt");
        assert_eq!(glob_to_like("/home/*/docs/*"), "/home/%/docs/%");
    }

    #[test]
    fn test_glob_to_like_escapes_like_metacharacters() {
        assert_eq!(glob_to_like("100%_done"), "100\\%\\_done");
        assert_eq!(glob_to_like("C:\\dir\\*"), "C:\\\\dir\\\\%");
    }
}
