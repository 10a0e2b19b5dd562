//! Reference manager: loose refs under `refs/heads` and `refs/tags`, a `packed-refs` fallback,
//! and HEAD (symbolic or detached). Writers lock a ref by creating a sibling `<name>.lock`
//! file and remove it when done, mirroring how loose objects are written atomically.

use std::fs;
use std::io::Write;
use std::path::PathBuf;

use tempfile::Builder;

use crate::{errors::GitError, hash::ObjectHash};

const HEAD_PREFIX: &str = "ref: ";

/// Current value of HEAD: either a symbolic pointer at a branch ref, or a hash when detached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Head {
    Symbolic(String),
    Detached(ObjectHash),
}

/// Held for the lifetime of a ref write; removes the `.lock` sibling file on drop.
struct RefLock {
    lock_path: PathBuf,
}

impl Drop for RefLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.lock_path);
    }
}

pub struct RefStore {
    root: PathBuf,
}

impl RefStore {
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        RefStore { root: repo_root.into() }
    }

    pub fn refs_dir(&self) -> PathBuf {
        self.root.join("refs")
    }

    pub fn heads_dir(&self) -> PathBuf {
        self.refs_dir().join("heads")
    }

    pub fn tags_dir(&self) -> PathBuf {
        self.refs_dir().join("tags")
    }

    pub fn head_path(&self) -> PathBuf {
        self.root.join("HEAD")
    }

    pub fn packed_refs_path(&self) -> PathBuf {
        self.root.join("packed-refs")
    }

    fn loose_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn lock_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{name}.lock"))
    }

    /// Take the advisory lock for a ref. Fails with `RefBusy` if a sibling `.lock` file
    /// already exists, matching the loose-object/ref write convention used throughout.
    fn lock_ref(&self, name: &str) -> Result<RefLock, GitError> {
        let lock_path = self.lock_path(name);
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::OpenOptions::new().write(true).create_new(true).open(&lock_path) {
            Ok(_) => Ok(RefLock { lock_path }),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(GitError::RefBusy(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn atomic_write(path: &PathBuf, contents: &[u8]) -> Result<(), GitError> {
        let parent = path.parent().expect("ref path always has a parent");
        fs::create_dir_all(parent)?;
        let mut tmp = Builder::new().prefix(".tmp-ref-").tempfile_in(parent)?;
        tmp.write_all(contents)?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| GitError::IOError(e.error))?;
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }

    // ---- HEAD ----

    pub fn read_head(&self) -> Result<Head, GitError> {
        let raw = fs::read_to_string(self.head_path())
            .map_err(|_| GitError::RefNotFound("HEAD".to_string()))?;
        let trimmed = raw.trim_end();
        if let Some(target) = trimmed.strip_prefix(HEAD_PREFIX) {
            Ok(Head::Symbolic(target.trim().to_string()))
        } else {
            let hash = trimmed
                .parse::<ObjectHash>()
                .map_err(|_| GitError::InvalidHashValue(trimmed.to_string()))?;
            Ok(Head::Detached(hash))
        }
    }

    pub fn set_head_symbolic(&self, ref_name: &str) -> Result<(), GitError> {
        validate_ref_name(ref_name)?;
        let contents = format!("{HEAD_PREFIX}{ref_name}\n");
        Self::atomic_write(&self.head_path(), contents.as_bytes())
    }

    pub fn set_head_detached(&self, hash: ObjectHash) -> Result<(), GitError> {
        let contents = format!("{hash}\n");
        Self::atomic_write(&self.head_path(), contents.as_bytes())
    }

    /// Resolve HEAD to a commit hash, following one level of indirection through a branch ref.
    /// Returns `Ok(None)` for an unborn branch (symbolic HEAD pointing at a ref that doesn't
    /// exist yet, e.g. right after `init`).
    pub fn resolve_head(&self) -> Result<Option<ObjectHash>, GitError> {
        match self.read_head()? {
            Head::Detached(hash) => Ok(Some(hash)),
            Head::Symbolic(name) => match self.read_ref(&name) {
                Ok(hash) => Ok(Some(hash)),
                Err(GitError::RefNotFound(_)) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    // ---- loose + packed refs ----

    pub fn create_ref(&self, name: &str, hash: ObjectHash) -> Result<(), GitError> {
        validate_ref_name(name)?;
        let _lock = self.lock_ref(name)?;
        if self.ref_exists(name)? {
            return Err(GitError::RefAlreadyExists(name.to_string()));
        }
        Self::atomic_write(&self.loose_path(name), format!("{hash}\n").as_bytes())
    }

    pub fn update_ref(&self, name: &str, hash: ObjectHash) -> Result<(), GitError> {
        validate_ref_name(name)?;
        let _lock = self.lock_ref(name)?;
        Self::atomic_write(&self.loose_path(name), format!("{hash}\n").as_bytes())
    }

    /// Read a ref's hash, loose copy shadowing any `packed-refs` entry of the same name.
    pub fn read_ref(&self, name: &str) -> Result<ObjectHash, GitError> {
        let loose = self.loose_path(name);
        if let Ok(raw) = fs::read_to_string(&loose) {
            let trimmed = raw.trim();
            return trimmed
                .parse::<ObjectHash>()
                .map_err(|_| GitError::InvalidHashValue(trimmed.to_string()));
        }

        if let Some(hash) = self.read_packed_ref(name)? {
            return Ok(hash);
        }

        Err(self.not_found_with_suggestion(name)?)
    }

    fn read_packed_ref(&self, name: &str) -> Result<Option<ObjectHash>, GitError> {
        let Ok(contents) = fs::read_to_string(self.packed_refs_path()) else {
            return Ok(None);
        };
        for line in contents.lines() {
            if line.starts_with('#') || line.starts_with('^') {
                continue;
            }
            if let Some((hash_str, ref_name)) = line.split_once(' ') {
                if ref_name == name {
                    return hash_str
                        .parse::<ObjectHash>()
                        .map(Some)
                        .map_err(|_| GitError::InvalidHashValue(hash_str.to_string()));
                }
            }
        }
        Ok(None)
    }

    pub fn ref_exists(&self, name: &str) -> Result<bool, GitError> {
        if self.loose_path(name).exists() {
            return Ok(true);
        }
        Ok(self.read_packed_ref(name)?.is_some())
    }

    pub fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        let _lock = self.lock_ref(name)?;
        let loose = self.loose_path(name);
        let had_loose = loose.exists();
        if had_loose {
            fs::remove_file(&loose)?;
        }
        let had_packed = self.remove_from_packed(name)?;
        if !had_loose && !had_packed {
            return Err(GitError::RefNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Remove a single entry (and its peeled line, if any) from `packed-refs`. Returns whether
    /// an entry was actually present.
    fn remove_from_packed(&self, name: &str) -> Result<bool, GitError> {
        let path = self.packed_refs_path();
        let Ok(contents) = fs::read_to_string(&path) else {
            return Ok(false);
        };
        let mut out = Vec::new();
        let mut removed = false;
        let mut skip_peel = false;
        for line in contents.lines() {
            if skip_peel && line.starts_with('^') {
                skip_peel = false;
                continue;
            }
            skip_peel = false;
            if !line.starts_with('#') && !line.starts_with('^') {
                if let Some((_, ref_name)) = line.split_once(' ') {
                    if ref_name == name {
                        removed = true;
                        skip_peel = true;
                        continue;
                    }
                }
            }
            out.push(line.to_string());
        }
        if removed {
            let mut body = out.join("\n");
            if !body.is_empty() {
                body.push('\n');
            }
            Self::atomic_write(&path, body.as_bytes())?;
        }
        Ok(removed)
    }

    /// List refs under `refs/<prefix>`, loose and packed combined and de-duplicated, as full
    /// ref names (e.g. `refs/heads/main`).
    pub fn list_refs(&self, prefix: &str) -> Result<Vec<String>, GitError> {
        let mut names = std::collections::BTreeSet::new();
        let base = self.root.join(prefix);
        if base.is_dir() {
            collect_refs(&base, &base, prefix, &mut names)?;
        }
        if let Ok(contents) = fs::read_to_string(self.packed_refs_path()) {
            for line in contents.lines() {
                if line.starts_with('#') || line.starts_with('^') {
                    continue;
                }
                if let Some((_, ref_name)) = line.split_once(' ') {
                    if ref_name.starts_with(prefix) {
                        names.insert(ref_name.to_string());
                    }
                }
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Move all loose refs into `packed-refs`, peeling annotated tags so clients can fast-forward
    /// without fetching the tag object first.
    pub fn pack_refs(&self, peel: impl Fn(ObjectHash) -> Option<ObjectHash>) -> Result<(), GitError> {
        let mut entries: std::collections::BTreeMap<String, ObjectHash> = std::collections::BTreeMap::new();
        if let Ok(contents) = fs::read_to_string(self.packed_refs_path()) {
            for line in contents.lines() {
                if line.starts_with('#') || line.starts_with('^') {
                    continue;
                }
                if let Some((hash_str, name)) = line.split_once(' ') {
                    if let Ok(hash) = hash_str.parse::<ObjectHash>() {
                        entries.insert(name.to_string(), hash);
                    }
                }
            }
        }

        let mut loose_names = std::collections::BTreeSet::new();
        if self.heads_dir().is_dir() {
            collect_refs(&self.heads_dir(), &self.heads_dir(), "refs/heads", &mut loose_names)?;
        }
        if self.tags_dir().is_dir() {
            collect_refs(&self.tags_dir(), &self.tags_dir(), "refs/tags", &mut loose_names)?;
        }

        for name in &loose_names {
            let hash = self.read_ref(name)?;
            entries.insert(name.clone(), hash);
        }

        let mut body = String::from("# pack-refs with: peeled fully-peeled sorted\n");
        for (name, hash) in &entries {
            body.push_str(&format!("{hash} {name}\n"));
            if let Some(peeled) = peel(*hash) {
                body.push_str(&format!("^{peeled}\n"));
            }
        }
        Self::atomic_write(&self.packed_refs_path(), body.as_bytes())?;

        for name in &loose_names {
            let _lock = self.lock_ref(name);
            let _ = fs::remove_file(self.loose_path(name));
        }
        Ok(())
    }

    /// Resolve a revision expression to a commit/tag hash: `HEAD`, a full hex hash, a short
    /// unambiguous hex prefix is not attempted here (left to a higher layer with object-store
    /// access), a fully-qualified `refs/...` name, or a bare branch/tag name tried against
    /// `refs/heads/<name>` then `refs/tags/<name>`.
    pub fn resolve(&self, expr: &str) -> Result<ObjectHash, GitError> {
        if expr == "HEAD" {
            return self
                .resolve_head()?
                .ok_or_else(|| GitError::RefNotFound("HEAD".to_string()));
        }
        if let Ok(hash) = expr.parse::<ObjectHash>() {
            return Ok(hash);
        }
        if expr.starts_with("refs/") {
            return self.read_ref(expr);
        }
        if let Ok(hash) = self.read_ref(&format!("refs/heads/{expr}")) {
            return Ok(hash);
        }
        if let Ok(hash) = self.read_ref(&format!("refs/tags/{expr}")) {
            return Ok(hash);
        }
        self.read_ref(expr)
    }

    fn not_found_with_suggestion(&self, name: &str) -> Result<GitError, GitError> {
        let mut all = self.list_refs("refs/heads")?;
        all.extend(self.list_refs("refs/tags")?);
        let suggestion = closest_name(name, &all);
        match suggestion {
            Some(s) => Ok(GitError::RefNotFound(format!("{name} (did you mean `{s}`?)"))),
            None => Ok(GitError::RefNotFound(name.to_string())),
        }
    }
}

fn collect_refs(
    base: &PathBuf,
    dir: &PathBuf,
    prefix: &str,
    names: &mut std::collections::BTreeSet<String>,
) -> Result<(), GitError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            collect_refs(base, &path, prefix, names)?;
        } else if path.extension().and_then(|e| e.to_str()) != Some("lock") {
            let rel = path.strip_prefix(base).expect("walked path is under base");
            let rel = rel.to_string_lossy().replace('\\', "/");
            names.insert(format!("{prefix}/{rel}"));
        }
    }
    Ok(())
}

fn closest_name(target: &str, candidates: &[String]) -> Option<String> {
    candidates
        .iter()
        .map(|c| (edit_distance(target, c), c))
        .filter(|(d, _)| *d <= 2 || target.len() <= 3)
        .min_by_key(|(d, _)| *d)
        .map(|(_, c)| c.clone())
}

fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// Reject names git-check-ref-format-style invalid characters/sequences, returning a sanitized
/// candidate for `InvalidRefName`'s suggestion when the name can be salvaged.
pub fn validate_ref_name(name: &str) -> Result<(), GitError> {
    let is_bad = name.is_empty()
        || name.starts_with('/')
        || name.ends_with('/')
        || name.contains("//")
        || name.ends_with(".lock")
        || name.ends_with('.')
        || name.contains("..")
        || name.contains('@') && name.contains("@{")
        || name == "@"
        || name.split('/').any(|c| c.is_empty() || c == "." || c == ".." || c.starts_with('-'))
        || name
            .chars()
            .any(|c| c.is_control() || " ~^:?*[\\".contains(c));

    if is_bad {
        let suggestion = sanitize_ref_name(name);
        let suggestion = if suggestion.is_empty() || suggestion == name {
            None
        } else {
            Some(suggestion)
        };
        return Err(GitError::InvalidRefName {
            name: name.to_string(),
            suggestion,
        });
    }
    Ok(())
}

fn sanitize_ref_name(name: &str) -> String {
    let mut out = String::new();
    let mut last_was_slash = true;
    for c in name.chars() {
        if c.is_control() || " ~^:?*[\\".contains(c) {
            continue;
        }
        if c == '/' {
            if last_was_slash {
                continue;
            }
            last_was_slash = true;
        } else {
            last_was_slash = false;
        }
        out.push(c);
    }
    while out.ends_with('/') || out.ends_with('.') {
        out.pop();
    }
    out = out.replace("..", ".");
    let out = out.trim_start_matches('/').to_string();
    out.split('/')
        .map(|c| c.trim_start_matches('-'))
        .collect::<Vec<_>>()
        .join("/")
}
