//! Bare-repository hosting: the disk-backed storage collaborator from §6 (C13a), plus an
//! `axum` router wiring it to the Smart-HTTP endpoints described in §4.13. Everything in
//! `protocol::*` is transport/storage-agnostic behind `RepositoryAccess`; this module is the
//! one concrete implementation the engine ships, rooted at a plain directory of bare
//! repositories rather than a database-backed one a host application might swap in instead.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use tower_http::cors::CorsLayer;

use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::{ObjectTrait, blob::Blob, commit::Commit, tree::Tree},
    protocol::{
        core::{AuthenticationService, RepositoryAccess},
        http::HttpGitHandler,
        types::{ProtocolError, ProtocolStream},
    },
    refs::RefStore,
    store::ObjectStore,
};

/// Resolves `<owner>/<name>` request paths to bare repository directories rooted under a
/// single base directory, and implements the `{create_repo, repo_exists, get_repo_path,
/// list_repos, delete_repo, fork_repo}` storage-backend interface from §6. This is the disk
/// reference implementation; a host may swap in a database-backed equivalent without the
/// engine itself changing.
#[derive(Clone)]
pub struct BareRepoManager {
    base_dir: PathBuf,
}

impl BareRepoManager {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        BareRepoManager { base_dir: base_dir.into() }
    }

    /// Map a slash-joined `owner/name` identifier to a `.git`-suffixed bare repo directory,
    /// refusing anything that would escape `base_dir`.
    pub fn get_repo_path(&self, owner: &str, name: &str) -> Result<PathBuf, GitError> {
        if owner.is_empty() || name.is_empty() || owner.contains("..") || name.contains("..") {
            return Err(GitError::InvalidPath(format!("{owner}/{name}")));
        }
        Ok(self.base_dir.join(owner).join(format!("{name}.git")))
    }

    pub fn repo_exists(&self, owner: &str, name: &str) -> Result<bool, GitError> {
        Ok(self.get_repo_path(owner, name)?.join("objects").is_dir())
    }

    /// Initialize a new bare repository (`objects/`, `refs/heads`, `refs/tags`, HEAD).
    pub fn create_repo(&self, owner: &str, name: &str) -> Result<PathBuf, GitError> {
        let path = self.get_repo_path(owner, name)?;
        if path.join("objects").is_dir() {
            return Err(GitError::RepoAlreadyExists(path.display().to_string()));
        }
        std::fs::create_dir_all(&path)?;
        let store = ObjectStore::new(&path);
        let refs = RefStore::new(&path);
        std::fs::create_dir_all(store.objects_dir())?;
        std::fs::create_dir_all(refs.heads_dir())?;
        std::fs::create_dir_all(refs.tags_dir())?;
        refs.set_head_symbolic("refs/heads/main")?;
        let config = crate::config::RepoConfig {
            repository_format_version: 0,
            bare: true,
            hash_algorithm: crate::hash::get_hash_kind(),
        };
        config.write(&path.join("config"))?;
        Ok(path)
    }

    pub fn delete_repo(&self, owner: &str, name: &str) -> Result<(), GitError> {
        let path = self.get_repo_path(owner, name)?;
        if !path.is_dir() {
            return Err(GitError::RepoNotFound(path.display().to_string()));
        }
        std::fs::remove_dir_all(path)?;
        Ok(())
    }

    pub fn list_repos(&self, owner: &str) -> Result<Vec<String>, GitError> {
        let owner_dir = self.base_dir.join(owner);
        if !owner_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in std::fs::read_dir(&owner_dir)? {
            let entry = entry?;
            if let Some(name) = entry.file_name().to_str() {
                if let Some(stripped) = name.strip_suffix(".git") {
                    if entry.path().join("objects").is_dir() {
                        names.push(stripped.to_string());
                    }
                }
            }
        }
        names.sort();
        Ok(names)
    }

    /// Copy every object and ref from `owner/name` into a freshly created `into_owner/into_name`.
    pub fn fork_repo(&self, owner: &str, name: &str, into_owner: &str, into_name: &str) -> Result<PathBuf, GitError> {
        let source_path = self.get_repo_path(owner, name)?;
        if !source_path.join("objects").is_dir() {
            return Err(GitError::RepoNotFound(source_path.display().to_string()));
        }
        let dest_path = self.create_repo(into_owner, into_name)?;

        let source_store = ObjectStore::new(&source_path);
        let source_refs = RefStore::new(&source_path);
        let dest_store = ObjectStore::new(&dest_path);
        let dest_refs = RefStore::new(&dest_path);

        for hash in source_store.iter_objects()? {
            let (obj_type, bytes) = source_store.read_raw(&hash)?;
            dest_store.write_raw(obj_type, &bytes, Some(hash))?;
        }
        for prefix in ["refs/heads", "refs/tags"] {
            for ref_name in source_refs.list_refs(prefix)? {
                let hash = source_refs.read_ref(&ref_name)?;
                dest_refs.update_ref(&ref_name, hash).or_else(|_| dest_refs.create_ref(&ref_name, hash))?;
            }
        }
        if let crate::refs::Head::Symbolic(name) = source_refs.read_head()? {
            if dest_refs.ref_exists(&name)? {
                dest_refs.set_head_symbolic(&name)?;
            }
        }
        Ok(dest_path)
    }
}

/// `RepositoryAccess` backed directly on this engine's own `ObjectStore`/`RefStore`, so the
/// bundled server never shells out to an external `git` binary the way a throwaway example
/// integration might.
#[derive(Clone)]
pub struct EngineRepoAccess {
    store: Arc<ObjectStore>,
    refs: Arc<RefStore>,
}

impl EngineRepoAccess {
    pub fn new(repo_dir: &Path) -> Self {
        EngineRepoAccess {
            store: Arc::new(ObjectStore::new(repo_dir)),
            refs: Arc::new(RefStore::new(repo_dir)),
        }
    }
}

#[async_trait]
impl RepositoryAccess for EngineRepoAccess {
    async fn get_repository_refs(&self) -> Result<Vec<(String, String)>, ProtocolError> {
        let mut out = Vec::new();
        for prefix in ["refs/heads", "refs/tags"] {
            for name in self.refs.list_refs(prefix).map_err(to_protocol_err)? {
                let hash = self.refs.read_ref(&name).map_err(to_protocol_err)?;
                out.push((name, hash.to_string()));
            }
        }
        Ok(out)
    }

    async fn has_object(&self, object_hash: &str) -> Result<bool, ProtocolError> {
        let hash = ObjectHash::from_str(object_hash).map_err(ProtocolError::repository_error)?;
        self.store.has(&hash).map_err(to_protocol_err)
    }

    async fn get_object(&self, object_hash: &str) -> Result<Vec<u8>, ProtocolError> {
        let hash = ObjectHash::from_str(object_hash).map_err(ProtocolError::repository_error)?;
        let (_, bytes) = self.store.read_raw(&hash).map_err(to_protocol_err)?;
        Ok(bytes)
    }

    async fn store_pack_data(&self, _pack_data: &[u8]) -> Result<(), ProtocolError> {
        // Individual objects are written through `handle_pack_objects` below; this hook only
        // exists for backends that want a raw-bytes fallback, which the engine's own store
        // never needs since it already knows the parsed (type, bytes, hash) triple.
        Ok(())
    }

    async fn update_reference(
        &self,
        ref_name: &str,
        old_hash: Option<&str>,
        new_hash: &str,
    ) -> Result<(), ProtocolError> {
        let zero = ObjectHash::zero_str(crate::hash::get_hash_kind());
        if new_hash == zero {
            self.refs.delete_ref(ref_name).map_err(to_protocol_err)?;
            return Ok(());
        }
        let hash = ObjectHash::from_str(new_hash).map_err(ProtocolError::repository_error)?;
        match old_hash {
            Some(_) if self.refs.ref_exists(ref_name).map_err(to_protocol_err)? => {
                self.refs.update_ref(ref_name, hash).map_err(to_protocol_err)
            }
            _ => self
                .refs
                .update_ref(ref_name, hash)
                .or_else(|_| self.refs.create_ref(ref_name, hash))
                .map_err(to_protocol_err),
        }
    }

    async fn get_objects_for_pack(
        &self,
        _wants: &[String],
        _haves: &[String],
    ) -> Result<Vec<String>, ProtocolError> {
        // Reachability walk is performed by `protocol::pack` directly against the store; this
        // default is only consulted by backends without store-level access.
        Ok(Vec::new())
    }

    async fn has_default_branch(&self) -> Result<bool, ProtocolError> {
        Ok(self.refs.ref_exists("refs/heads/main").map_err(to_protocol_err)?
            || self.refs.ref_exists("refs/heads/master").map_err(to_protocol_err)?)
    }

    async fn post_receive_hook(&self) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn get_commit(&self, commit_hash: &str) -> Result<Commit, ProtocolError> {
        let hash = ObjectHash::from_str(commit_hash).map_err(ProtocolError::repository_error)?;
        self.store.read_commit(&hash).map_err(to_protocol_err)
    }

    async fn get_tree(&self, tree_hash: &str) -> Result<Tree, ProtocolError> {
        let hash = ObjectHash::from_str(tree_hash).map_err(ProtocolError::repository_error)?;
        self.store.read_tree(&hash).map_err(to_protocol_err)
    }

    async fn get_blob(&self, blob_hash: &str) -> Result<Blob, ProtocolError> {
        let hash = ObjectHash::from_str(blob_hash).map_err(ProtocolError::repository_error)?;
        self.store.read_blob(&hash).map_err(to_protocol_err)
    }

    async fn handle_pack_objects(
        &self,
        commits: Vec<Commit>,
        trees: Vec<Tree>,
        blobs: Vec<Blob>,
    ) -> Result<(), ProtocolError> {
        for blob in &blobs {
            self.store.write_object(blob).map_err(to_protocol_err)?;
        }
        for tree in &trees {
            self.store.write_object(tree).map_err(to_protocol_err)?;
        }
        for commit in &commits {
            self.store.write_object(commit).map_err(to_protocol_err)?;
        }
        Ok(())
    }
}

fn to_protocol_err(e: GitError) -> ProtocolError {
    ProtocolError::repository_error(e.to_string())
}

/// Authentication service that admits every request. A hosting application wires its own
/// `AuthenticationService` (principal/permission resolution is explicitly out of scope, §1)
/// in front of this router; this stub exists so the bundled router is runnable standalone.
#[derive(Clone)]
pub struct AllowAllAuth;

#[async_trait]
impl AuthenticationService for AllowAllAuth {
    async fn authenticate_http(&self, _headers: &HashMap<String, String>) -> Result<(), ProtocolError> {
        Ok(())
    }

    async fn authenticate_ssh(&self, _username: &str, _public_key: &[u8]) -> Result<(), ProtocolError> {
        Ok(())
    }
}

#[derive(Clone)]
struct AppState {
    repos: BareRepoManager,
    auth: AllowAllAuth,
}

/// Build the axum router serving `/{owner}/{name}/info/refs`, `/{owner}/{name}/git-upload-pack`,
/// and `/{owner}/{name}/git-receive-pack` over `repos`, with CORS enabled on every route per
/// §4.13 ("include CORS headers so browser-based tooling can discover repositories").
pub fn router(repos: BareRepoManager) -> Router {
    let state = Arc::new(AppState { repos, auth: AllowAllAuth });
    Router::new()
        .route("/{owner}/{name}/info/refs", get(info_refs))
        .route("/{owner}/{name}/git-upload-pack", post(upload_pack))
        .route("/{owner}/{name}/git-receive-pack", post(receive_pack))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn resolve_repo(state: &AppState, owner: &str, name: &str) -> Result<EngineRepoAccess, Response> {
    match state.repos.get_repo_path(owner, name) {
        Ok(path) if path.join("objects").is_dir() => Ok(EngineRepoAccess::new(&path)),
        Ok(_) => Err((StatusCode::NOT_FOUND, "repository not found").into_response()),
        Err(_) => Err((StatusCode::BAD_REQUEST, "invalid repository path").into_response()),
    }
}

async fn info_refs(
    State(state): State<Arc<AppState>>,
    AxumPath((owner, name)): AxumPath<(String, String)>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let Some(service) = params.get("service") else {
        return (StatusCode::BAD_REQUEST, "missing service parameter").into_response();
    };
    let repo = match resolve_repo(&state, &owner, &name).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let mut handler = HttpGitHandler::new(repo, state.auth.clone());
    if let Err(e) = handler.authenticate_http(&headers_to_map(&headers)).await {
        return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
    }

    let request_path = format!("/{owner}/{name}/info/refs");
    let query = format!("service={service}");
    match handler.handle_info_refs(&request_path, &query).await {
        Ok((body, content_type)) => ([(header::CONTENT_TYPE, content_type)], body).into_response(),
        Err(e) => protocol_error_response(e),
    }
}

async fn upload_pack(
    State(state): State<Arc<AppState>>,
    AxumPath((owner, name)): AxumPath<(String, String)>,
    headers: HeaderMap,
    body: axum::body::Bytes,
) -> Response {
    let repo = match resolve_repo(&state, &owner, &name).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let mut handler = HttpGitHandler::new(repo, state.auth.clone());
    if let Err(e) = handler.authenticate_http(&headers_to_map(&headers)).await {
        return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
    }

    let request_path = format!("/{owner}/{name}/git-upload-pack");
    match handler.handle_upload_pack(&request_path, &body).await {
        Ok((stream, content_type)) => {
            ([(header::CONTENT_TYPE, content_type)], Body::from_stream(stream)).into_response()
        }
        Err(e) => protocol_error_response(e),
    }
}

async fn receive_pack(
    State(state): State<Arc<AppState>>,
    AxumPath((owner, name)): AxumPath<(String, String)>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let repo = match resolve_repo(&state, &owner, &name).await {
        Ok(r) => r,
        Err(resp) => return resp,
    };

    let mut handler = HttpGitHandler::new(repo, state.auth.clone());
    if let Err(e) = handler.authenticate_http(&headers_to_map(&headers)).await {
        return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
    }

    let request_path = format!("/{owner}/{name}/git-receive-pack");
    let stream: ProtocolStream = Box::pin(
        body.into_data_stream()
            .map(|r| r.map_err(|e| ProtocolError::Io(std::io::Error::other(e)))),
    );

    match handler.handle_receive_pack(&request_path, stream).await {
        Ok((stream, content_type)) => {
            ([(header::CONTENT_TYPE, content_type)], Body::from_stream(stream)).into_response()
        }
        Err(e) => protocol_error_response(e),
    }
}

fn protocol_error_response(e: ProtocolError) -> Response {
    let status = match &e {
        ProtocolError::RepositoryNotFound(_) | ProtocolError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
        ProtocolError::InvalidRequest(_) | ProtocolError::InvalidService(_) => StatusCode::BAD_REQUEST,
        ProtocolError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, e.to_string()).into_response()
}

fn headers_to_map(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect()
}
