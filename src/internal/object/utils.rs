//! Small parsing helpers shared by the loose-object text formats (commit, tag).

use bstr::ByteSlice;

use crate::errors::GitError;

/// Split `data` at the first `\n`, returning the line (without the newline)
/// and the remainder (past the newline). Errors if no newline is present.
pub fn split_line<'a>(data: &'a [u8], context: &str) -> Result<(&'a [u8], &'a [u8]), GitError> {
    let pos = data
        .find_byte(0x0a)
        .ok_or_else(|| GitError::InvalidObjectType(format!("missing newline in {context}")))?;
    Ok((&data[..pos], &data[pos + 1..]))
}

/// Strip a known ASCII keyword prefix (e.g. `b"tag "`) from a header line.
pub fn strip_keyword<'a>(line: &'a [u8], keyword: &[u8]) -> Result<&'a [u8], GitError> {
    line.strip_prefix(keyword).ok_or_else(|| {
        GitError::InvalidObjectType(format!(
            "expected line to start with `{}`",
            String::from_utf8_lossy(keyword)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_line_finds_newline() {
        let (line, rest) = split_line(b"tag v1\nbody", "test").unwrap();
        assert_eq!(line, b"tag v1");
        assert_eq!(rest, b"body");
    }

    #[test]
    fn split_line_errors_without_newline() {
        assert!(split_line(b"no newline here", "test").is_err());
    }

    #[test]
    fn strip_keyword_removes_prefix() {
        assert_eq!(strip_keyword(b"tag v1", b"tag ").unwrap(), b"v1");
        assert!(strip_keyword(b"nope v1", b"tag ").is_err());
    }
}
