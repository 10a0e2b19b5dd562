//! On-disk working tree: materializing a tree object into real files, walking the tree back
//! into relative paths, and the clobber guard that stops checkout from silently discarding
//! uncommitted edits.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use path_absolutize::Absolutize;
use tempfile::Builder;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::tree::TreeItemMode,
    store::ObjectStore,
};

/// Write every blob in `tree_hash` out under `work_dir`, creating directories as needed.
/// Does not remove files already present that the tree doesn't mention — callers that want
/// a hard reset diff old and new trees themselves and remove the difference.
pub fn materialize(store: &ObjectStore, tree_hash: &ObjectHash, work_dir: &Path) -> Result<(), GitError> {
    fs::create_dir_all(work_dir)?;
    let tree = store.read_tree(tree_hash)?;
    for item in &tree.tree_items {
        let path = work_dir.join(&item.name);
        if item.mode.is_tree() {
            materialize(store, &item.id, &path)?;
        } else {
            let blob = store.read_blob(&item.id)?;
            write_file(&path, &blob.data, matches!(item.mode, TreeItemMode::BlobExecutable))?;
        }
    }
    Ok(())
}

/// Write `bytes` to `rel_path` under `base`, rejecting any path that escapes `base`.
pub fn write_file_at(base: &Path, rel_path: &str, bytes: &[u8], executable: bool) -> Result<(), GitError> {
    let target = resolve_within(base, rel_path)?;
    write_file(&target, bytes, executable)
}

fn write_file(path: &Path, bytes: &[u8], executable: bool) -> Result<(), GitError> {
    let parent = path.parent().expect("materialized path always has a parent");
    fs::create_dir_all(parent)?;
    let mut tmp = Builder::new().prefix(".tmp-wt-").tempfile_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    set_executable(tmp.path(), executable)?;
    tmp.persist(path).map_err(|e| GitError::IOError(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path, executable: bool) -> Result<(), GitError> {
    use std::os::unix::fs::PermissionsExt;
    if executable {
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(path, perms)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_executable(_path: &Path, _executable: bool) -> Result<(), GitError> {
    Ok(())
}

fn resolve_within(base: &Path, rel_path: &str) -> Result<PathBuf, GitError> {
    if rel_path.contains('\0') {
        return Err(GitError::InvalidPath(rel_path.to_string()));
    }
    let candidate = base.join(rel_path);
    let base_abs = base
        .absolutize()
        .map_err(|e| GitError::InvalidPath(e.to_string()))?
        .to_path_buf();
    let candidate_abs = candidate
        .absolutize()
        .map_err(|e| GitError::InvalidPath(e.to_string()))?
        .to_path_buf();
    if !candidate_abs.starts_with(&base_abs) {
        return Err(GitError::InvalidPath(rel_path.to_string()));
    }
    Ok(candidate)
}

/// List every regular file under `work_dir`, as `/`-separated paths relative to it, skipping
/// the repository's own control directory.
pub fn walk(work_dir: &Path) -> Result<Vec<String>, GitError> {
    let mut out = Vec::new();
    walk_into(work_dir, work_dir, &mut out)?;
    out.sort();
    Ok(out)
}

fn walk_into(root: &Path, dir: &Path, out: &mut Vec<String>) -> Result<(), GitError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .expect("walked path is under root")
            .to_string_lossy()
            .replace('\\', "/");
        if rel.starts_with(".wit") {
            continue;
        }
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_into(root, &path, out)?;
        } else if file_type.is_file() {
            out.push(rel);
        }
    }
    Ok(())
}

/// Paths that differ between the working tree and `from_paths` (usually the current index)
/// and would also be touched by checking out `to_paths` (the target tree). Checkout must
/// refuse when this set is non-empty rather than silently overwrite local edits.
pub fn clobbered_paths(
    work_dir: &Path,
    from: &std::collections::BTreeMap<String, ObjectHash>,
    to: &std::collections::BTreeMap<String, ObjectHash>,
) -> Result<Vec<String>, GitError> {
    let mut paths = Vec::new();
    for (path, target_hash) in to {
        let Some(from_hash) = from.get(path) else { continue };
        if from_hash == target_hash {
            continue;
        }
        let abs = work_dir.join(path);
        let Ok(content) = fs::read(&abs) else { continue };
        let current_hash = ObjectHash::from_type_and_data(
            crate::internal::object::types::ObjectType::Blob,
            &content,
        );
        if current_hash != *from_hash {
            paths.push(path.clone());
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashKind, set_hash_kind_for_test};
    use crate::internal::object::{
        ObjectTrait,
        blob::Blob,
        tree::{Tree, TreeItem},
    };

    #[test]
    fn materialize_writes_nested_files() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        let store = ObjectStore::new(dir.path());

        let blob = Blob::from_content("nested content");
        let blob_hash = store.write_object(&blob).unwrap();
        let sub_tree = Tree::from_tree_items(vec![TreeItem::new(
            TreeItemMode::Blob,
            blob_hash,
            "file.txt".to_string(),
        )])
        .unwrap();
        let sub_hash = store.write_object(&sub_tree).unwrap();
        let root_tree = Tree::from_tree_items(vec![TreeItem::new(
            TreeItemMode::Tree,
            sub_hash,
            "sub".to_string(),
        )])
        .unwrap();
        let root_hash = store.write_object(&root_tree).unwrap();

        let work_dir = dir.path().join("wt");
        materialize(&store, &root_hash, &work_dir).unwrap();
        let written = fs::read(work_dir.join("sub/file.txt")).unwrap();
        assert_eq!(written, b"nested content");
    }

    #[test]
    fn write_file_at_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_file_at(dir.path(), "../escape.txt", b"x", false).unwrap_err();
        assert!(matches!(err, GitError::InvalidPath(_)));
    }

    #[test]
    fn walk_skips_control_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"a").unwrap();
        fs::create_dir(dir.path().join(".wit")).unwrap();
        fs::write(dir.path().join(".wit/HEAD"), b"ref: refs/heads/main\n").unwrap();

        let found = walk(dir.path()).unwrap();
        assert_eq!(found, vec!["a.txt".to_string()]);
    }

    #[test]
    fn clobbered_paths_detects_dirty_overlap() {
        let _guard = set_hash_kind_for_test(HashKind::Sha1);
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"dirty edit").unwrap();

        let committed_hash = ObjectHash::new(b"original content");
        let target_hash = ObjectHash::new(b"incoming content");
        let mut from = std::collections::BTreeMap::new();
        from.insert("a.txt".to_string(), committed_hash);
        let mut to = std::collections::BTreeMap::new();
        to.insert("a.txt".to_string(), target_hash);

        let clobbered = clobbered_paths(dir.path(), &from, &to).unwrap();
        assert_eq!(clobbered, vec!["a.txt".to_string()]);
    }
}
