use dstore_core::Key;
use dstore_storage::{CapabilitySet, Datastore};
use std::fmt;
use std::sync::Arc;

/// Child datastore bound to the key subtree under `prefix`
#[derive(Clone)]
pub struct Mount {
    pub prefix: Key,
    pub datastore: Arc<dyn Datastore>,
    capabilities: CapabilitySet,
}

impl Mount {
    /// Bind `datastore` at `prefix`, probing its capabilities once
    pub fn new(prefix: impl Into<Key>, datastore: Arc<dyn Datastore>) -> Self {
        let capabilities = CapabilitySet::probe(datastore.as_ref());
        Self {
            prefix: prefix.into(),
            datastore,
            capabilities,
        }
    }

    pub fn capabilities(&self) -> &CapabilitySet {
        &self.capabilities
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount")
            .field("prefix", &self.prefix)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

/// Mount owning `key`, with `key` made relative to it
///
/// `mounts` must be sorted by prefix, descending, so the first ancestor
/// found is the longest.
pub(crate) fn lookup<'a>(mounts: &'a [Mount], key: &Key) -> Option<(&'a Mount, Key)> {
    mounts
        .iter()
        .find_map(|m| key.strip_ancestor(&m.prefix).map(|rest| (m, rest)))
}

/// Every mount whose subtree intersects the subtree under `prefix`
///
/// Mounts beneath `prefix` contribute their whole subtree (relative key
/// `/`). The closest mount at or above `prefix` contributes the remainder
/// of `prefix` below it; mounts above that one are shadowed.
pub(crate) fn lookup_all<'a>(mounts: &'a [Mount], prefix: &Key) -> Vec<(&'a Mount, Key)> {
    let mut found = Vec::new();
    for m in mounts {
        if m.prefix.is_descendant_of(prefix) {
            found.push((m, Key::root()));
        } else if let Some(rest) = prefix.strip_ancestor(&m.prefix) {
            found.push((m, rest));
            break;
        }
    }
    found
}

/// Sort mounts most specific first
pub(crate) fn sort_mounts(mounts: &mut [Mount]) {
    mounts.sort_by(|a, b| b.prefix.cmp(&a.prefix));
}
