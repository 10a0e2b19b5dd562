//! Moving a branch pointer backward or forward and reconciling the index/working tree with it.

use std::collections::BTreeMap;
use std::path::Path;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    index::Index,
    refs::RefStore,
    store::ObjectStore,
    worktree,
};

/// How far a reset propagates past the ref pointer itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetMode {
    /// Move the ref only; index and working tree are untouched.
    Soft,
    /// Move the ref and reload the index to match the target commit's tree; working tree untouched.
    Mixed,
    /// Move the ref, reload the index, and overwrite the working tree to match.
    Hard,
}

/// Reset `branch_ref` to `target`, applying `mode`'s index/working-tree effects.
///
/// A hard reset refuses to run (returning [`GitError::ClobberWorkingTree`]) if the working
/// tree has uncommitted edits that overlap the paths being rewritten, mirroring the guard
/// checkout itself uses.
pub fn reset(
    store: &ObjectStore,
    refs: &RefStore,
    index_path: &Path,
    work_dir: &Path,
    branch_ref: &str,
    target: ObjectHash,
    mode: ResetMode,
) -> Result<(), GitError> {
    let current = refs.read_ref(branch_ref)?;
    let target_commit = store.read_commit(&target)?;

    if mode == ResetMode::Soft {
        refs.update_ref(branch_ref, target)?;
        return Ok(());
    }

    let current_tree = store.read_commit(&current)?.tree_id;
    let from_flat = flatten_as_hashes(store, &current_tree)?;
    let to_flat = flatten_as_hashes(store, &target_commit.tree_id)?;

    if mode == ResetMode::Hard {
        let clobbered = worktree::clobbered_paths(work_dir, &from_flat, &to_flat)?;
        if !clobbered.is_empty() {
            return Err(GitError::ClobberWorkingTree { paths: clobbered });
        }
    }

    refs.update_ref(branch_ref, target)?;

    let mut new_index = Index::new();
    for (path, (item_mode, hash)) in crate::index::flatten_tree(store, &target_commit.tree_id, "")? {
        new_index.add(&path, item_mode, hash);
    }
    new_index.write(index_path)?;

    if mode == ResetMode::Hard {
        remove_stale_files(work_dir, &from_flat, &to_flat)?;
        worktree::materialize(store, &target_commit.tree_id, work_dir)?;
    }

    Ok(())
}

pub(crate) fn flatten_as_hashes(
    store: &ObjectStore,
    tree_hash: &ObjectHash,
) -> Result<BTreeMap<String, ObjectHash>, GitError> {
    Ok(crate::index::flatten_tree(store, tree_hash, "")?
        .into_iter()
        .map(|(path, (_, hash))| (path, hash))
        .collect())
}

/// Delete working-tree files present in `from` but absent from `to`, undoing what
/// [`worktree::materialize`] by itself leaves behind on a hard reset.
pub(crate) fn remove_stale_files(
    work_dir: &Path,
    from: &BTreeMap<String, ObjectHash>,
    to: &BTreeMap<String, ObjectHash>,
) -> Result<(), GitError> {
    for path in from.keys() {
        if !to.contains_key(path) {
            let abs = work_dir.join(path);
            if abs.is_file() {
                std::fs::remove_file(&abs)?;
            }
        }
    }
    Ok(())
}
