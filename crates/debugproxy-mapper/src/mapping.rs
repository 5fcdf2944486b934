use std::collections::HashMap;

use parking_lot::RwLock;

/// Lookup state shared by one mapper and every connection of its listener context.
///
/// Each method holds its lock for a single lookup or insert only, so callers
/// probe the filesystem without blocking other connections.
#[derive(Debug, Default)]
pub struct PathMapping {
    /// Remote (debugger side) path -> local (IDE side) path.
    remote_to_local: RwLock<HashMap<String, String>>,
    /// Local path -> remote path; filled alongside `remote_to_local`.
    local_to_remote: RwLock<HashMap<String, String>>,
    /// Resolved class identities, keyed by lookup root and identity.
    class_paths: RwLock<HashMap<String, Option<String>>>,
    /// Project root of the debugger side, once seen in its traffic.
    remote_root: RwLock<Option<String>>,
}

impl PathMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Local path previously recorded for `remote`.
    pub fn get(&self, remote: &str) -> Option<String> {
        self.remote_to_local.read().get(remote).cloned()
    }

    /// Remote path previously recorded for `local`.
    pub fn reverse_get(&self, local: &str) -> Option<String> {
        self.local_to_remote.read().get(local).cloned()
    }

    /// Record that `remote` and `local` name the same file.
    pub fn set(&self, remote: impl Into<String>, local: impl Into<String>) {
        let remote = remote.into();
        let local = local.into();
        self.local_to_remote
            .write()
            .insert(local.clone(), remote.clone());
        self.remote_to_local.write().insert(remote, local);
    }

    /// Memoized class lookup. The outer `None` means "never resolved"; the
    /// inner one records a lookup that found nothing.
    pub fn class_path(&self, root: &str, identity: &str) -> Option<Option<String>> {
        self.class_paths
            .read()
            .get(&class_key(root, identity))
            .cloned()
    }

    pub fn set_class_path(&self, root: &str, identity: &str, path: Option<String>) {
        self.class_paths
            .write()
            .insert(class_key(root, identity), path);
    }

    pub fn remote_root(&self) -> Option<String> {
        self.remote_root.read().clone()
    }

    /// Remember the debugger side project root. Returns `true` when it changed.
    pub fn set_remote_root(&self, root: impl Into<String>) -> bool {
        let root = root.into();
        let mut guard = self.remote_root.write();
        if guard.as_deref() == Some(root.as_str()) {
            return false;
        }
        *guard = Some(root);
        true
    }

    /// Number of recorded path pairs.
    pub fn len(&self) -> usize {
        self.remote_to_local.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.remote_to_local.write().clear();
        self.local_to_remote.write().clear();
        self.class_paths.write().clear();
        *self.remote_root.write() = None;
    }
}

fn class_key(root: &str, identity: &str) -> String {
    format!("{root}\0{identity}")
}
