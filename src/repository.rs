//! Repository façade: ties the object store, ref store, index, ignore rules, and working
//! tree together behind `init`/`open`/`find` and the everyday porcelain operations built on
//! top of them.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::{
    config::RepoConfig,
    diff::{Diff, DiffItem},
    errors::GitError,
    hash::{HashKind, ObjectHash, set_hash_kind},
    ignore::{self, IgnorePatterns},
    index::Index,
    internal::object::{
        commit::Commit,
        signature::Signature,
        types::ObjectType,
        tag::Tag,
    },
    merge::{self, MergeOutcome},
    refs::{Head, RefStore},
    reset::{self, ResetMode},
    store::ObjectStore,
    worktree,
};

/// Name of the control directory inside a non-bare repository's working directory.
pub const GIT_DIR_NAME: &str = ".wit";
pub const DEFAULT_BRANCH: &str = "refs/heads/main";

/// One commit in a `log` walk: the commit itself plus its depth from the start point.
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub commit: Commit,
}

/// Working-directory repository: `objects/`, `refs/`, `HEAD`, `index`, and `config` all live
/// under `<work_dir>/.wit`.
pub struct Repository {
    work_dir: PathBuf,
    git_dir: PathBuf,
    store: ObjectStore,
    refs: RefStore,
    config: RepoConfig,
}

impl Repository {
    /// Create a new repository at `work_dir`. Fails with `RepoAlreadyExists` if a `.wit`
    /// directory is already present there.
    pub fn init(work_dir: &Path) -> Result<Repository, GitError> {
        Self::init_with_hash(work_dir, HashKind::Sha1)
    }

    pub fn init_with_hash(work_dir: &Path, hash_algorithm: HashKind) -> Result<Repository, GitError> {
        let git_dir = work_dir.join(GIT_DIR_NAME);
        if git_dir.exists() {
            return Err(GitError::RepoAlreadyExists(work_dir.display().to_string()));
        }
        fs::create_dir_all(&git_dir)?;
        set_hash_kind(hash_algorithm);

        let store = ObjectStore::new(&git_dir);
        let refs = RefStore::new(&git_dir);
        fs::create_dir_all(store.objects_dir())?;
        fs::create_dir_all(refs.heads_dir())?;
        fs::create_dir_all(refs.tags_dir())?;
        refs.set_head_symbolic(DEFAULT_BRANCH)?;

        let config = RepoConfig {
            repository_format_version: 0,
            bare: false,
            hash_algorithm,
        };
        config.write(&git_dir.join("config"))?;

        Ok(Repository {
            work_dir: work_dir.to_path_buf(),
            git_dir,
            store,
            refs,
            config,
        })
    }

    /// Open a repository whose working directory is exactly `work_dir` (it must contain a
    /// `.wit` directory already). Sets the thread-local hash kind to match the stored config.
    pub fn open(work_dir: &Path) -> Result<Repository, GitError> {
        let git_dir = work_dir.join(GIT_DIR_NAME);
        if !git_dir.is_dir() {
            return Err(GitError::RepoNotFound(work_dir.display().to_string()));
        }
        let config = RepoConfig::read(&git_dir.join("config"))?;
        set_hash_kind(config.hash_algorithm);

        Ok(Repository {
            work_dir: work_dir.to_path_buf(),
            store: ObjectStore::new(&git_dir),
            refs: RefStore::new(&git_dir),
            git_dir,
            config,
        })
    }

    /// Walk up from `start` looking for a `.wit` directory, then open the repository rooted
    /// there, the way `git` itself locates a repository from any subdirectory.
    pub fn find(start: &Path) -> Result<Repository, GitError> {
        let mut dir = start.to_path_buf();
        loop {
            if dir.join(GIT_DIR_NAME).is_dir() {
                return Self::open(&dir);
            }
            if !dir.pop() {
                return Err(GitError::RepoNotFound(start.display().to_string()));
            }
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn git_dir(&self) -> &Path {
        &self.git_dir
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn refs(&self) -> &RefStore {
        &self.refs
    }

    pub fn config(&self) -> &RepoConfig {
        &self.config
    }

    fn index_path(&self) -> PathBuf {
        self.git_dir.join("index")
    }

    fn ignore_patterns(&self) -> IgnorePatterns {
        ignore::load(&self.work_dir.join(".witignore"))
    }

    fn head_tree(&self) -> Result<Option<ObjectHash>, GitError> {
        match self.refs.resolve_head()? {
            Some(hash) => Ok(Some(self.store.read_commit(&hash)?.tree_id)),
            None => Ok(None),
        }
    }

    /// Stage every tracked, non-ignored file under the working directory. Returns the staged
    /// paths.
    pub fn add_all(&self) -> Result<Vec<String>, GitError> {
        let mut index = Index::read(&self.index_path())?;
        let added = index.add_all(&self.work_dir, &self.store, &self.ignore_patterns())?;
        index.write(&self.index_path())?;
        Ok(added)
    }

    /// Create a commit from the current index, advancing HEAD (or the branch HEAD points at).
    pub fn commit(&self, author: Signature, committer: Signature, message: &str) -> Result<ObjectHash, GitError> {
        let index = Index::read(&self.index_path())?;
        let tree = index
            .to_tree(&self.store)?
            .ok_or_else(|| GitError::InvalidArgument("nothing staged to commit".to_string()))?;

        let parent = self.refs.resolve_head()?;
        let parents = parent.into_iter().collect::<Vec<_>>();

        let commit = Commit::new(author, committer, tree, parents, message);
        self.store.write_object(&commit)?;

        match self.refs.read_head()? {
            Head::Symbolic(branch) => {
                if self.refs.ref_exists(&branch)? {
                    self.refs.update_ref(&branch, commit.id)?;
                } else {
                    self.refs.create_ref(&branch, commit.id)?;
                }
            }
            Head::Detached(_) => self.refs.set_head_detached(commit.id)?,
        }
        Ok(commit.id)
    }

    /// Walk first-parent history starting at `start`, most recent first, capped at `limit`
    /// entries (`None` for the whole history).
    pub fn log(&self, start: ObjectHash, limit: Option<usize>) -> Result<Vec<LogEntry>, GitError> {
        let mut entries = Vec::new();
        let mut cursor = Some(start);
        while let Some(hash) = cursor {
            if let Some(limit) = limit {
                if entries.len() >= limit {
                    break;
                }
            }
            let commit = self.store.read_commit(&hash)?;
            cursor = commit.parent_commit_ids.first().copied();
            entries.push(LogEntry { commit });
        }
        Ok(entries)
    }

    /// Compare the index and working tree against HEAD.
    pub fn status(&self) -> Result<crate::index::Status, GitError> {
        let index = Index::read(&self.index_path())?;
        index.status(&self.work_dir, self.head_tree()?.as_ref(), &self.store, &self.ignore_patterns())
    }

    /// Switch the working directory and HEAD to `target` (a branch name, tag name, or hash),
    /// refusing when doing so would discard uncommitted changes.
    pub fn checkout(&self, target: &str) -> Result<(), GitError> {
        let target_hash = self.refs.resolve(target)?;
        let target_commit = self.store.read_commit(&target_hash)?;

        let current_tree = self.head_tree()?;
        let from_flat = match &current_tree {
            Some(hash) => reset::flatten_as_hashes(&self.store, hash)?,
            None => BTreeMap::new(),
        };
        let to_flat = reset::flatten_as_hashes(&self.store, &target_commit.tree_id)?;

        let clobbered = worktree::clobbered_paths(&self.work_dir, &from_flat, &to_flat)?;
        if !clobbered.is_empty() {
            return Err(GitError::ClobberWorkingTree { paths: clobbered });
        }

        let branch_ref = format!("refs/heads/{target}");
        if target.starts_with("refs/heads/") {
            self.refs.set_head_symbolic(target)?;
        } else if self.refs.ref_exists(&branch_ref)? {
            self.refs.set_head_symbolic(&branch_ref)?;
        } else {
            self.refs.set_head_detached(target_hash)?;
        }

        let mut index = Index::new();
        for (path, (mode, hash)) in crate::index::flatten_tree(&self.store, &target_commit.tree_id, "")? {
            index.add(&path, mode, hash);
        }
        index.write(&self.index_path())?;

        reset::remove_stale_files(&self.work_dir, &from_flat, &to_flat)?;
        worktree::materialize(&self.store, &target_commit.tree_id, &self.work_dir)?;
        Ok(())
    }

    /// Move `branch_ref` (or HEAD's current branch, if `None`) to `target`, per `mode`.
    pub fn reset(&self, branch_ref: Option<&str>, target: ObjectHash, mode: ResetMode) -> Result<(), GitError> {
        let branch_ref = match branch_ref {
            Some(name) => name.to_string(),
            None => match self.refs.read_head()? {
                Head::Symbolic(name) => name,
                Head::Detached(_) => {
                    return Err(GitError::InvalidArgument("cannot reset a detached HEAD by branch name".to_string()));
                }
            },
        };
        reset::reset(&self.store, &self.refs, &self.index_path(), &self.work_dir, &branch_ref, target, mode)
    }

    /// Merge `their_commit` into `branch_ref`, then sync the index and working tree to match
    /// the resulting commit (fast-forward or real merge alike).
    pub fn merge(
        &self,
        branch_ref: &str,
        their_commit: ObjectHash,
        author: Signature,
        committer: Signature,
        message: &str,
    ) -> Result<MergeOutcome, GitError> {
        let outcome = merge::merge(&self.store, &self.refs, branch_ref, their_commit, author, committer, message)?;
        match outcome {
            MergeOutcome::AlreadyUpToDate => {}
            MergeOutcome::FastForward(hash) | MergeOutcome::Merged(hash) => {
                reset::reset(&self.store, &self.refs, &self.index_path(), &self.work_dir, branch_ref, hash, ResetMode::Hard)?;
            }
        }
        Ok(outcome)
    }

    pub fn create_branch(&self, name: &str, start_point: &str) -> Result<(), GitError> {
        let hash = self.refs.resolve(start_point)?;
        self.refs.create_ref(&format!("refs/heads/{name}"), hash)
    }

    pub fn delete_branch(&self, name: &str) -> Result<(), GitError> {
        self.refs.delete_ref(&format!("refs/heads/{name}"))
    }

    /// Create a tag. With `annotation`, an annotated `Tag` object is written and the ref
    /// points at it; without, the ref points directly at `target` (a lightweight tag).
    pub fn create_tag(
        &self,
        name: &str,
        target: ObjectHash,
        annotation: Option<(Signature, &str)>,
    ) -> Result<ObjectHash, GitError> {
        let ref_target = match annotation {
            Some((tagger, message)) => {
                let tag = Tag::new(target, ObjectType::Commit, name.to_string(), tagger, message);
                self.store.write_object(&tag)?
            }
            None => target,
        };
        self.refs.create_ref(&format!("refs/tags/{name}"), ref_target)?;
        Ok(ref_target)
    }

    pub fn delete_tag(&self, name: &str) -> Result<(), GitError> {
        self.refs.delete_ref(&format!("refs/tags/{name}"))
    }

    /// Unified diff between two commits' trees (either side may be absent, for diffing
    /// against an empty tree).
    pub fn diff(
        &self,
        from: Option<ObjectHash>,
        to: Option<ObjectHash>,
        filter: Vec<PathBuf>,
    ) -> Result<Vec<DiffItem>, GitError> {
        let from_tree = from.map(|h| self.store.read_commit(&h)).transpose()?.map(|c| c.tree_id);
        let to_tree = to.map(|h| self.store.read_commit(&h)).transpose()?.map(|c| c.tree_id);

        let old_blobs = match from_tree {
            Some(hash) => crate::index::flatten_tree(&self.store, &hash, "")?
                .into_iter()
                .map(|(path, (_, hash))| (PathBuf::from(path), hash))
                .collect(),
            None => Vec::new(),
        };
        let new_blobs = match to_tree {
            Some(hash) => crate::index::flatten_tree(&self.store, &hash, "")?
                .into_iter()
                .map(|(path, (_, hash))| (PathBuf::from(path), hash))
                .collect(),
            None => Vec::new(),
        };

        let store = &self.store;
        Ok(Diff::diff(old_blobs, new_blobs, filter, move |_path, hash| {
            store.read_blob(hash).map(|b| b.data).unwrap_or_default()
        }))
    }

    /// Copy every object and ref reachable from `source`'s refs into this repository, then
    /// materialize the resulting HEAD. Used to realize a clone from an in-process source
    /// (e.g. another `Repository` or a bare repo's store/refs pair) without a network hop.
    pub fn clone_from(&self, source_store: &ObjectStore, source_refs: &RefStore) -> Result<(), GitError> {
        for hash in source_store.iter_objects()? {
            let (obj_type, bytes) = source_store.read_raw(&hash)?;
            self.store.write_raw(obj_type, &bytes, Some(hash))?;
        }

        for name in source_refs.list_refs("refs/heads")?.into_iter().chain(source_refs.list_refs("refs/tags")?) {
            let hash = source_refs.read_ref(&name)?;
            if self.refs.ref_exists(&name)? {
                self.refs.update_ref(&name, hash)?;
            } else {
                self.refs.create_ref(&name, hash)?;
            }
        }

        match source_refs.read_head()? {
            Head::Symbolic(name) if self.refs.ref_exists(&name)? => {
                self.refs.set_head_symbolic(&name)?;
            }
            Head::Symbolic(_) => {}
            Head::Detached(hash) => self.refs.set_head_detached(hash)?,
        }

        if let Some(head_commit) = self.refs.resolve_head()? {
            let tree = self.store.read_commit(&head_commit)?.tree_id;
            let mut index = Index::new();
            for (path, (mode, hash)) in crate::index::flatten_tree(&self.store, &tree, "")? {
                index.add(&path, mode, hash);
            }
            index.write(&self.index_path())?;
            worktree::materialize(&self.store, &tree, &self.work_dir)?;
        }
        Ok(())
    }
}
