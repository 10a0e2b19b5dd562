//! Author/committer/tagger signature lines (`name <email> timestamp timezone`).

use std::fmt::Display;
use std::str::FromStr;

use bstr::ByteSlice;
use serde::{Deserialize, Serialize};

use crate::errors::GitError;

/// Which kind of signature line this is; controls the leading keyword when
/// the signature is serialized back into a commit or tag object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureType {
    Author,
    Committer,
    Tagger,
}

impl SignatureType {
    fn keyword(self) -> &'static [u8] {
        match self {
            SignatureType::Author => b"author",
            SignatureType::Committer => b"committer",
            SignatureType::Tagger => b"tagger",
        }
    }
}

impl Display for SignatureType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            SignatureType::Author => write!(f, "author"),
            SignatureType::Committer => write!(f, "committer"),
            SignatureType::Tagger => write!(f, "tagger"),
        }
    }
}

impl FromStr for SignatureType {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(SignatureType::Author),
            "committer" => Ok(SignatureType::Committer),
            "tagger" => Ok(SignatureType::Tagger),
            _ => Err(GitError::InvalidSignatureType(s.to_string())),
        }
    }
}

/// One `author`/`committer`/`tagger` line: a name, an email, and a Unix
/// timestamp with a `+HHMM`/`-HHMM` offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub signature_type: SignatureType,
    pub name: String,
    pub email: String,
    pub timestamp: i64,
    pub timezone: String,
}

impl Display for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} {} <{}> {} {}",
            self.signature_type, self.name, self.email, self.timestamp, self.timezone
        )
    }
}

impl Signature {
    /// Build a signature stamped with the current time, `+0000` offset.
    pub fn new(signature_type: SignatureType, name: String, email: String) -> Self {
        Signature {
            signature_type,
            name,
            email,
            timestamp: chrono::Utc::now().timestamp(),
            timezone: "+0000".to_string(),
        }
    }

    /// Parse one signature line, e.g. `author a <a@b.com> 1700000000 +0800`.
    pub fn from_data(data: Vec<u8>) -> Result<Self, GitError> {
        let text = data
            .to_str()
            .map_err(|e| GitError::InvalidSignatureType(e.to_string()))?;

        let (keyword, rest) = text
            .split_once(' ')
            .ok_or_else(|| GitError::InvalidSignatureType(text.to_string()))?;
        let signature_type = SignatureType::from_str(keyword)?;

        let email_start = rest
            .find('<')
            .ok_or_else(|| GitError::InvalidSignatureType(text.to_string()))?;
        let email_end = rest
            .find('>')
            .ok_or_else(|| GitError::InvalidSignatureType(text.to_string()))?;
        let name = rest[..email_start].trim().to_string();
        let email = rest[email_start + 1..email_end].to_string();

        let tail = rest[email_end + 1..].trim();
        let mut parts = tail.split_whitespace();
        let timestamp: i64 = parts
            .next()
            .ok_or_else(|| GitError::InvalidSignatureType(text.to_string()))?
            .parse()
            .map_err(|_| GitError::InvalidSignatureType(text.to_string()))?;
        let timezone = parts.next().unwrap_or("+0000").to_string();

        Ok(Signature {
            signature_type,
            name,
            email,
            timestamp,
            timezone,
        })
    }

    /// Serialize back to the `keyword name <email> timestamp timezone` form,
    /// no trailing newline.
    pub fn to_data(&self) -> Result<Vec<u8>, GitError> {
        let mut data = Vec::new();
        data.extend(self.signature_type.keyword());
        data.push(b' ');
        data.extend(self.name.as_bytes());
        data.extend(b" <");
        data.extend(self.email.as_bytes());
        data.extend(b"> ");
        data.extend(self.timestamp.to_string().as_bytes());
        data.push(b' ');
        data.extend(self.timezone.as_bytes());
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_author_line() {
        let line = b"author benjamin <benjamin@example.com> 1700000000 +0800".to_vec();
        let sig = Signature::from_data(line.clone()).unwrap();
        assert_eq!(sig.signature_type, SignatureType::Author);
        assert_eq!(sig.name, "benjamin");
        assert_eq!(sig.email, "benjamin@example.com");
        assert_eq!(sig.timestamp, 1700000000);
        assert_eq!(sig.timezone, "+0800");
        assert_eq!(sig.to_data().unwrap(), line);
    }

    #[test]
    fn new_defaults_to_utc_offset() {
        let sig = Signature::new(
            SignatureType::Committer,
            "t".to_string(),
            "t@example.com".to_string(),
        );
        assert_eq!(sig.timezone, "+0000");
        assert_eq!(sig.signature_type, SignatureType::Committer);
    }

    #[test]
    fn rejects_unknown_keyword() {
        assert!(Signature::from_data(b"mallory x <x@y.com> 1 +0000".to_vec()).is_err());
    }
}
