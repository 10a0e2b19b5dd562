use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize};
use tempfile::Builder;

use crate::{errors::GitError, hash::HashKind};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PackConfig {
    #[serde(deserialize_with = "string_or_usize")]
    pub pack_decode_mem_size: String,
    #[serde(deserialize_with = "string_or_usize")]
    pub pack_decode_disk_size: String,
    pub pack_decode_cache_path: PathBuf,
    pub clean_cache_after_decode: bool,
    pub channel_message_size: usize,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            pack_decode_mem_size: "4G".to_string(),
            pack_decode_disk_size: "20%".to_string(),
            pack_decode_cache_path: PathBuf::from("pack_decode_cache"),
            clean_cache_after_decode: true,
            channel_message_size: 1_000_000,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LfsConfig {
    pub enable: bool,
    pub host: String,
    pub port: u16,
}

impl Default for LfsConfig {
    fn default() -> Self {
        Self {
            enable: false,
            host: "localhost".to_string(),
            port: 8080,
        }
    }
}

/// On-disk repository configuration (`<root>/config`), a minimal INI dialect with two
/// sections: `[core] bare = <bool>` and `[wit] hashAlgorithm = <sha1|sha256>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoConfig {
    pub repository_format_version: u32,
    pub bare: bool,
    pub hash_algorithm: HashKind,
}

impl Default for RepoConfig {
    fn default() -> Self {
        RepoConfig {
            repository_format_version: 0,
            bare: false,
            hash_algorithm: HashKind::Sha1,
        }
    }
}

impl RepoConfig {
    pub fn read(path: &Path) -> Result<Self, GitError> {
        let contents = fs::read_to_string(path)?;
        let mut config = RepoConfig::default();
        let mut section = String::new();

        for raw_line in contents.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
                continue;
            }
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1].trim().to_lowercase();
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_lowercase();
            let value = value.trim();

            match (section.as_str(), key.as_str()) {
                ("core", "repositoryformatversion") => {
                    config.repository_format_version = value
                        .parse()
                        .map_err(|_| GitError::InvalidArgument(format!("bad repositoryformatversion `{value}`")))?;
                }
                ("core", "bare") => {
                    config.bare = value.eq_ignore_ascii_case("true");
                }
                ("wit", "hashalgorithm") => {
                    config.hash_algorithm = value
                        .parse()
                        .map_err(|_| GitError::UnsupportedHashAlgorithm(value.to_string()))?;
                }
                _ => {}
            }
        }
        Ok(config)
    }

    pub fn write(&self, path: &Path) -> Result<(), GitError> {
        let body = format!(
            "[core]\n\trepositoryformatversion = {}\n\tbare = {}\n[wit]\n\thashAlgorithm = {}\n",
            self.repository_format_version,
            self.bare,
            self.hash_algorithm.as_str(),
        );
        let parent = path.parent().expect("config path always has a parent");
        fs::create_dir_all(parent)?;
        let mut tmp = Builder::new().prefix(".tmp-config-").tempfile_in(parent)?;
        tmp.write_all(body.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| GitError::IOError(e.error))?;
        Ok(())
    }
}

fn string_or_usize<'deserialize, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'deserialize>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrUSize {
        String(String),
        USize(usize),
    }

    Ok(match StringOrUSize::deserialize(deserializer)? {
        StringOrUSize::String(v) => v,
        StringOrUSize::USize(v) => v.to_string(),
    })
}
