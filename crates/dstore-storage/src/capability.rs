use crate::Datastore;
use serde::Serialize;
use std::fmt;

/// Optional contract a datastore may provide
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Batching,
    Checked,
    Scrubbed,
    GarbageCollected,
    Persistent,
}

/// One row of the capability table
#[derive(Debug)]
pub struct CapabilityDescriptor {
    pub capability: Capability,
    pub name: &'static str,
    /// What callers may invoke once the capability is present
    pub consumer_contract: &'static str,
    /// What a backend must implement to declare it
    pub backend_contract: &'static str,
    probe: fn(&dyn Datastore) -> bool,
}

impl CapabilityDescriptor {
    /// Whether `datastore` provides this capability
    pub fn probe(&self, datastore: &dyn Datastore) -> bool {
        (self.probe)(datastore)
    }
}

fn probe_batching(ds: &dyn Datastore) -> bool {
    ds.as_batching().is_some()
}

fn probe_checked(ds: &dyn Datastore) -> bool {
    ds.as_checked().is_some()
}

fn probe_scrubbed(ds: &dyn Datastore) -> bool {
    ds.as_scrubbed().is_some()
}

fn probe_gc(ds: &dyn Datastore) -> bool {
    ds.as_gc().is_some()
}

fn probe_persistent(ds: &dyn Datastore) -> bool {
    ds.as_persistent().is_some()
}

/// Every capability known to the system
pub static CAPABILITIES: &[CapabilityDescriptor] = &[
    CapabilityDescriptor {
        capability: Capability::Batching,
        name: "batching",
        consumer_contract: "batch() -> Batch { put, delete, commit }",
        backend_contract: "Datastore::as_batching returns a Batching",
        probe: probe_batching,
    },
    CapabilityDescriptor {
        capability: Capability::Checked,
        name: "checked",
        consumer_contract: "check()",
        backend_contract: "Datastore::as_checked returns a CheckedDatastore",
        probe: probe_checked,
    },
    CapabilityDescriptor {
        capability: Capability::Scrubbed,
        name: "scrubbed",
        consumer_contract: "scrub()",
        backend_contract: "Datastore::as_scrubbed returns a ScrubbedDatastore",
        probe: probe_scrubbed,
    },
    CapabilityDescriptor {
        capability: Capability::GarbageCollected,
        name: "gc",
        consumer_contract: "collect_garbage()",
        backend_contract: "Datastore::as_gc returns a GcDatastore",
        probe: probe_gc,
    },
    CapabilityDescriptor {
        capability: Capability::Persistent,
        name: "persistent",
        consumer_contract: "disk_usage() -> bytes",
        backend_contract: "Datastore::as_persistent returns a PersistentDatastore",
        probe: probe_persistent,
    },
];

impl Capability {
    pub fn descriptor(self) -> &'static CapabilityDescriptor {
        // The table has exactly one row per variant, in declaration order
        &CAPABILITIES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Look up a table row by its name
pub fn capability_by_name(name: &str) -> Option<&'static CapabilityDescriptor> {
    CAPABILITIES.iter().find(|d| d.name == name)
}

/// Capabilities one datastore instance provides, probed once
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CapabilitySet {
    capabilities: Vec<Capability>,
}

impl CapabilitySet {
    pub fn probe(datastore: &dyn Datastore) -> Self {
        let capabilities = CAPABILITIES
            .iter()
            .filter(|d| d.probe(datastore))
            .map(|d| d.capability)
            .collect();
        Self { capabilities }
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        capability_by_name(name).is_some_and(|d| self.contains(d.capability))
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        self.capabilities.iter().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(Capability::name).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MapDatastore, NullDatastore};

    #[test]
    fn test_table_matches_variants() {
        for (i, d) in CAPABILITIES.iter().enumerate() {
            assert_eq!(d.capability as usize, i);
            assert_eq!(d.capability.descriptor().name, d.name);
        }
    }

    #[test]
    fn test_probe_map() {
        let caps = CapabilitySet::probe(&MapDatastore::new());
        assert!(caps.contains(Capability::Batching));
        assert!(!caps.contains(Capability::Persistent));
        assert_eq!(caps.to_string(), "[batching]");
    }

    #[test]
    fn test_probe_null_has_everything() {
        let caps = CapabilitySet::probe(&NullDatastore::new());
        for d in CAPABILITIES {
            assert!(caps.contains(d.capability), "missing {}", d.name);
        }
    }

    #[test]
    fn test_lookup_by_name() {
        assert_eq!(
            capability_by_name("gc").map(|d| d.capability),
            Some(Capability::GarbageCollected)
        );
        assert!(capability_by_name("telepathy").is_none());

        let caps = CapabilitySet::probe(&MapDatastore::new());
        assert!(caps.contains_name("batching"));
        assert!(!caps.contains_name("scrubbed"));
    }

    #[test]
    fn test_serialize_capabilities() {
        let caps: Vec<Capability> = CapabilitySet::probe(&NullDatastore::new()).iter().collect();
        let json = serde_json::to_string(&caps).unwrap();
        assert_eq!(
            json,
            r#"["batching","checked","scrubbed","garbage_collected","persistent"]"#
        );
    }
}
