//! Last observed versions of every managed resource.
//!
//! A cache hit means the live object is exactly the one this process wrote or
//! read last time, so the reconciler can skip the update without comparing
//! anything. Kinds that expose a spec generation are compared by generation,
//! which ignores status-only writes; the rest fall back to the resource
//! version.

use dashmap::DashMap;
use kube::Resource;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    pub kind: String,
    pub name: String,
    /// Empty for cluster scoped resources
    pub namespace: String,
}

impl ResourceKey {
    pub fn from_object<K: Resource>(obj: &K, dt: &K::DynamicType) -> Self {
        let meta = obj.meta();
        Self {
            kind: K::kind(dt).into_owned(),
            name: meta.name.clone().unwrap_or_default(),
            namespace: meta.namespace.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub resource_version: String,
    pub generation: i64,
}

/// Concurrent `ResourceKey -> VersionRecord` table shared by all reconciliation passes.
#[derive(Debug, Default)]
pub struct VersionCache {
    entries: DashMap<ResourceKey, VersionRecord>,
}

impl VersionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains<K>(&self, obj: &K) -> bool
    where
        K: Resource,
        K::DynamicType: Default,
    {
        self.contains_with(obj, &Default::default())
    }

    /// True when a record exists for the object and matches its current version.
    ///
    /// Objects without a generation and without a resource version never match.
    pub fn contains_with<K: Resource>(&self, obj: &K, dt: &K::DynamicType) -> bool {
        let Some(cached) = self.entries.get(&ResourceKey::from_object(obj, dt)) else {
            return false;
        };

        let meta = obj.meta();
        match meta.generation.unwrap_or(0) {
            0 => match meta.resource_version.as_deref() {
                None | Some("") => false,
                Some(resource_version) => cached.resource_version == resource_version,
            },
            generation => cached.generation == generation,
        }
    }

    pub fn add<K>(&self, obj: &K)
    where
        K: Resource,
        K::DynamicType: Default,
    {
        self.add_with(obj, &Default::default())
    }

    /// Records the object's current version. Objects without a kind are skipped.
    pub fn add_with<K: Resource>(&self, obj: &K, dt: &K::DynamicType) {
        let key = ResourceKey::from_object(obj, dt);
        if key.kind.is_empty() {
            return;
        }

        let meta = obj.meta();
        self.entries.insert(
            key,
            VersionRecord {
                resource_version: meta.resource_version.clone().unwrap_or_default(),
                generation: meta.generation.unwrap_or(0),
            },
        );
    }

    pub fn remove<K>(&self, obj: &K)
    where
        K: Resource,
        K::DynamicType: Default,
    {
        self.remove_with(obj, &Default::default())
    }

    pub fn remove_with<K: Resource>(&self, obj: &K, dt: &K::DynamicType) {
        self.entries.remove(&ResourceKey::from_object(obj, dt));
    }

    /// Forgets every record, forcing the next pass to write all resources once.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
