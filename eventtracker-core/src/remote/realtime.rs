//! JSON document tree with push notifications.
//!
//! The tree is a `serde_json::Value`; events live in the object at the store's
//! root path. Without a backing file the tree only lives in memory. With one,
//! every write locks the file, reloads it, applies the change and writes it back,
//! so several processes can share the same store.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use fs2::FileExt;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::collab::auth::Session;
use crate::error::{RemoteReadError, RemoteWriteError};
use crate::event::{EventDraft, EventField};
use crate::remote::listeners::{ListenerRegistry, Subscription};
use crate::remote::push_id::PushIdGenerator;
use crate::remote::{EventDocument, RemoteStore, RootPath, Snapshot, validate_key};

/// Who may read and write the collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRules {
    pub require_auth: bool,
}

impl Default for AccessRules {
    fn default() -> Self {
        AccessRules { require_auth: true }
    }
}

impl AccessRules {
    pub fn open() -> Self {
        AccessRules {
            require_auth: false,
        }
    }
}

#[derive(Clone)]
struct TreeState {
    tree: Value,
    revision: u64,
    ids: PushIdGenerator,
}

pub struct RealtimeStore {
    root: RootPath,
    rules: AccessRules,
    signed_in: RwLock<Option<String>>,
    backing_file: Option<PathBuf>,
    state: Mutex<TreeState>,
    listeners: Arc<ListenerRegistry>,
}

impl RealtimeStore {
    /// A store whose tree only lives in this process.
    pub fn in_memory(root: RootPath, rules: AccessRules) -> Self {
        Self::with_tree(root, rules, None, Value::Object(Map::new()))
    }

    /// A store backed by a JSON file, created on first write if missing.
    #[instrument(skip(root, rules), fields(collection = %root))]
    pub fn open(path: &Path, root: RootPath, rules: AccessRules) -> Result<Self, RemoteReadError> {
        let tree = read_tree(path).map_err(RemoteReadError::Connectivity)?;
        info!(path = %path.display(), "opened realtime store");
        Ok(Self::with_tree(root, rules, Some(path.to_path_buf()), tree))
    }

    fn with_tree(root: RootPath, rules: AccessRules, backing_file: Option<PathBuf>, tree: Value) -> Self {
        RealtimeStore {
            root,
            rules,
            signed_in: RwLock::new(None),
            backing_file,
            state: Mutex::new(TreeState {
                tree,
                revision: 0,
                ids: PushIdGenerator::new(),
            }),
            listeners: ListenerRegistry::new(),
        }
    }

    pub fn root(&self) -> &RootPath {
        &self.root
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Attach or detach the signed-in user.
    ///
    /// When the rules require auth, signing out fails every active listener with
    /// `PermissionDenied` and drops it.
    pub fn set_session(&self, session: Option<&Session>) {
        let uid = session.map(|s| s.uid.clone());
        let signed_out = uid.is_none();

        if let Ok(mut signed_in) = self.signed_in.write() {
            *signed_in = uid;
        }

        if signed_out && self.rules.require_auth && !self.listeners.is_empty() {
            debug!("session ended, cancelling listeners");
            self.listeners.broadcast(Err(RemoteReadError::PermissionDenied));
            self.listeners.clear();
        }
    }

    fn is_authorized(&self) -> bool {
        !self.rules.require_auth
            || self
                .signed_in
                .read()
                .map(|uid| uid.is_some())
                .unwrap_or(false)
    }

    /// Re-read the backing file and notify listeners if another writer changed it.
    /// Returns whether anything changed.
    pub async fn reload(&self) -> Result<bool, RemoteReadError> {
        if !self.is_authorized() {
            return Err(RemoteReadError::PermissionDenied);
        }
        let Some(path) = &self.backing_file else {
            return Ok(false);
        };

        let path = path.clone();
        let mut state = self.state.lock().await;
        let tree = tokio::task::spawn_blocking(move || read_tree(&path))
            .await
            .map_err(|e| RemoteReadError::Connectivity(format!("store read task failed: {}", e)))?
            .map_err(RemoteReadError::Connectivity)?;
        if tree == state.tree {
            return Ok(false);
        }

        state.tree = tree;
        state.revision += 1;
        debug!(revision = state.revision, "backing file changed");
        self.listeners.broadcast(Ok(self.snapshot_of(&state)));
        Ok(true)
    }

    fn snapshot_of(&self, state: &TreeState) -> Snapshot {
        let mut events = Vec::new();

        if let Some(collection) = collection(&state.tree, &self.root) {
            for (id, child) in collection {
                match serde_json::from_value::<EventDocument>(child.clone()) {
                    Ok(doc) => events.push(doc.into_event(id.clone())),
                    Err(e) => warn!(id = %id, error = %e, "skipping malformed event document"),
                }
            }
        }

        Snapshot {
            revision: state.revision,
            events,
        }
    }

    /// Apply a write to the collection and notify listeners.
    ///
    /// The write runs against a copy of the tree. The copy replaces the live
    /// tree only once it is stored, so a failed write leaves nothing behind.
    async fn mutate<T, F>(&self, op: F) -> Result<T, RemoteWriteError>
    where
        T: Send + 'static,
        F: FnOnce(&mut TreeState) -> Result<T, RemoteWriteError> + Send + 'static,
    {
        if !self.is_authorized() {
            return Err(RemoteWriteError::PermissionDenied);
        }

        let mut state = self.state.lock().await;
        let mut working = state.clone();

        let output = match self.backing_file.clone() {
            Some(path) => {
                let (stored, output) = tokio::task::spawn_blocking(move || {
                    write_through(&path, working, op)
                })
                .await
                .map_err(|e| {
                    RemoteWriteError::Connectivity(format!("store write task failed: {}", e))
                })??;
                working = stored;
                output
            }
            None => op(&mut working)?,
        };

        *state = working;
        state.revision += 1;
        self.listeners.broadcast(Ok(self.snapshot_of(&state)));

        Ok(output)
    }
}

#[async_trait]
impl RemoteStore for RealtimeStore {
    #[instrument(skip(self, draft), fields(root = %self.root))]
    async fn create(&self, draft: &EventDraft) -> Result<String, RemoteWriteError> {
        let document = serde_json::to_value(EventDocument::from(draft))
            .map_err(|e| RemoteWriteError::Connectivity(e.to_string()))?;
        let root = self.root.clone();

        let id = self
            .mutate(move |state| {
                let id = state.ids.generate();
                collection_mut(&mut state.tree, &root)?.insert(id.clone(), document);
                Ok(id)
            })
            .await?;

        info!(id = %id, "event created");
        Ok(id)
    }

    #[instrument(skip(self), fields(root = %self.root))]
    async fn subscribe(&self) -> Result<Subscription, RemoteReadError> {
        if !self.is_authorized() {
            return Err(RemoteReadError::PermissionDenied);
        }

        // Registering under the tree lock keeps writes from slipping in between
        // the initial snapshot and the first notification.
        let state = self.state.lock().await;
        let subscription = self.listeners.subscribe();
        self.listeners
            .send_to(subscription.id(), Ok(self.snapshot_of(&state)));

        Ok(subscription)
    }

    #[instrument(skip(self, value), fields(root = %self.root))]
    async fn update_field(
        &self,
        id: &str,
        field: EventField,
        value: &str,
    ) -> Result<(), RemoteWriteError> {
        validate_key(id).map_err(|reason| RemoteWriteError::MalformedPath(format!("'{}': {}", id, reason)))?;
        let root = self.root.clone();
        let key = id.to_string();
        let value = Value::String(value.to_string());

        self.mutate(move |state| {
            let document = collection_mut(&mut state.tree, &root)?
                .get_mut(&key)
                .and_then(Value::as_object_mut)
                .ok_or_else(|| RemoteWriteError::MissingDocument(key.clone()))?;
            document.insert(field.as_str().to_string(), value);
            Ok(())
        })
        .await?;

        debug!(id = %id, field = %field, "event field updated");
        Ok(())
    }

    #[instrument(skip(self), fields(root = %self.root))]
    async fn remove(&self, id: &str) -> Result<(), RemoteWriteError> {
        validate_key(id).map_err(|reason| RemoteWriteError::MalformedPath(format!("'{}': {}", id, reason)))?;
        let root = self.root.clone();
        let key = id.to_string();

        let existed = self
            .mutate(move |state| Ok(collection_mut(&mut state.tree, &root)?.remove(&key).is_some()))
            .await?;

        debug!(id = %id, existed, "event removed");
        Ok(())
    }
}

fn collection<'a>(tree: &'a Value, root: &RootPath) -> Option<&'a Map<String, Value>> {
    root.segments()
        .iter()
        .try_fold(tree, |node, segment| node.get(segment))?
        .as_object()
}

fn collection_mut<'a>(
    tree: &'a mut Value,
    root: &RootPath,
) -> Result<&'a mut Map<String, Value>, RemoteWriteError> {
    let mut node = tree;
    for segment in root.segments() {
        let Value::Object(map) = node else {
            return Err(RemoteWriteError::MalformedPath(format!(
                "'{}' is not a collection",
                root
            )));
        };
        node = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    node.as_object_mut().ok_or_else(|| {
        RemoteWriteError::MalformedPath(format!("'{}' is not a collection", root))
    })
}

fn read_tree(path: &Path) -> Result<Value, String> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    if content.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }

    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", path.display(), e))
}

fn write_tree(path: &Path, tree: &Value) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }

    let content = serde_json::to_string_pretty(tree).map_err(|e| e.to_string())?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).map_err(|e| format!("Failed to write {}: {}", tmp.display(), e))?;
    fs::rename(&tmp, path).map_err(|e| format!("Failed to replace {}: {}", path.display(), e))
}

/// Lock the backing file, apply `op` to a freshly read tree and write it back.
/// Blocks until the lock is free.
fn write_through<T>(
    path: &Path,
    mut working: TreeState,
    op: impl FnOnce(&mut TreeState) -> Result<T, RemoteWriteError>,
) -> Result<(TreeState, T), RemoteWriteError> {
    let _lock = lock_store_file(path).map_err(RemoteWriteError::Connectivity)?;
    working.tree = read_tree(path).map_err(RemoteWriteError::Connectivity)?;
    let output = op(&mut working)?;
    write_tree(path, &working.tree).map_err(RemoteWriteError::Connectivity)?;
    Ok((working, output))
}

/// Exclusive lock on a sibling `.lock` file, released when the handle drops.
fn lock_store_file(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }

    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&lock_path)
        .map_err(|e| format!("Failed to open {}: {}", lock_path.display(), e))?;
    file.lock_exclusive()
        .map_err(|e| format!("Failed to lock {}: {}", lock_path.display(), e))?;
    Ok(file)
}
