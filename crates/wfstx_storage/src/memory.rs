//! In-memory feature store for tests and demos.

use crate::error::{StoreError, StoreResult};
use crate::feature::{Feature, FeatureId, Property};
use crate::filter::Filter;
use crate::store::FeatureStore;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
struct Tables {
    /// type name -> (id -> properties)
    types: HashMap<String, BTreeMap<FeatureId, Feature>>,
    /// id -> owning type, for `exists` and duplicate detection.
    owners: HashMap<FeatureId, String>,
}

/// An in-memory feature store.
///
/// Feature types must be registered before features can be inserted.
/// Generated ids have the form `<type>.<n>`, skipping any id already in
/// use.
///
/// # Thread Safety
///
/// All state sits behind one `RwLock`; every call is atomic with respect to
/// every other call.
///
/// # Example
///
/// ```rust
/// use wfstx_storage::{Feature, FeatureStore, Filter, InMemoryFeatureStore};
///
/// let store = InMemoryFeatureStore::with_types(["roads"]);
/// let id = store.insert("roads", &Feature::new().property("lanes", 2), None).unwrap();
/// assert!(store.exists(&id).unwrap());
/// assert_eq!(store.read("roads", &Filter::All).unwrap().len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryFeatureStore {
    tables: RwLock<Tables>,
    next_id: AtomicU64,
}

impl InMemoryFeatureStore {
    /// Creates an empty store with no feature types.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with the given feature types registered.
    #[must_use]
    pub fn with_types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::new();
        for name in types {
            store.register_type(name);
        }
        store
    }

    /// Registers a feature type. Registering twice is a no-op.
    pub fn register_type(&self, type_name: impl Into<String>) {
        self.tables
            .write()
            .types
            .entry(type_name.into())
            .or_default();
    }

    /// Returns a stored feature by id.
    #[must_use]
    pub fn get(&self, type_name: &str, id: &FeatureId) -> Option<Feature> {
        self.tables
            .read()
            .types
            .get(type_name)
            .and_then(|features| features.get(id))
            .cloned()
    }

    /// Returns the number of features of a type.
    #[must_use]
    pub fn count(&self, type_name: &str) -> usize {
        self.tables
            .read()
            .types
            .get(type_name)
            .map_or(0, BTreeMap::len)
    }

    fn generate_id(&self, type_name: &str, tables: &Tables) -> FeatureId {
        loop {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let id = FeatureId::new(format!("{type_name}.{n}"));
            if !tables.owners.contains_key(&id) {
                return id;
            }
        }
    }

    fn matching(
        features: &BTreeMap<FeatureId, Feature>,
        filter: &Filter,
    ) -> Vec<FeatureId> {
        features
            .iter()
            .filter(|(id, feature)| filter.matches(id, feature))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

impl FeatureStore for InMemoryFeatureStore {
    fn read(&self, type_name: &str, filter: &Filter) -> StoreResult<BTreeSet<FeatureId>> {
        let tables = self.tables.read();
        Ok(tables
            .types
            .get(type_name)
            .map(|features| Self::matching(features, filter).into_iter().collect())
            .unwrap_or_default())
    }

    fn fetch(&self, type_name: &str, filter: &Filter) -> StoreResult<Vec<Feature>> {
        let tables = self.tables.read();
        let Some(features) = tables.types.get(type_name) else {
            return Ok(Vec::new());
        };
        Ok(features
            .iter()
            .filter(|(id, feature)| filter.matches(id, feature))
            .map(|(id, feature)| Feature {
                id: Some(id.clone()),
                properties: feature.properties.clone(),
            })
            .collect())
    }

    fn insert(
        &self,
        type_name: &str,
        feature: &Feature,
        id: Option<&FeatureId>,
    ) -> StoreResult<FeatureId> {
        let mut tables = self.tables.write();
        if !tables.types.contains_key(type_name) {
            return Err(StoreError::UnknownFeatureType(type_name.to_string()));
        }

        let id = match id {
            Some(id) if tables.owners.contains_key(id) => {
                return Err(StoreError::DuplicateId(id.clone()));
            }
            Some(id) => id.clone(),
            None => self.generate_id(type_name, &tables),
        };

        let stored = Feature {
            id: Some(id.clone()),
            properties: feature.properties.clone(),
        };
        tables.owners.insert(id.clone(), type_name.to_string());
        if let Some(features) = tables.types.get_mut(type_name) {
            features.insert(id.clone(), stored);
        }
        Ok(id)
    }

    fn replace(&self, type_name: &str, id: &FeatureId, feature: &Feature) -> StoreResult<()> {
        let mut tables = self.tables.write();
        let slot = tables
            .types
            .get_mut(type_name)
            .and_then(|features| features.get_mut(id))
            .ok_or_else(|| StoreError::NotFound {
                type_name: type_name.to_string(),
                id: id.clone(),
            })?;
        slot.properties = feature.properties.clone();
        Ok(())
    }

    fn update(
        &self,
        type_name: &str,
        filter: &Filter,
        properties: &[Property],
    ) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let Some(features) = tables.types.get_mut(type_name) else {
            return Ok(0);
        };

        let mut changed = 0;
        for (id, feature) in features.iter_mut() {
            if filter.matches(id, feature) {
                for property in properties {
                    property.apply_to(&mut feature.properties);
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn delete(&self, type_name: &str, filter: &Filter) -> StoreResult<usize> {
        let mut tables = self.tables.write();
        let Some(features) = tables.types.get_mut(type_name) else {
            return Ok(0);
        };

        let doomed = Self::matching(features, filter);
        for id in &doomed {
            features.remove(id);
        }
        for id in &doomed {
            tables.owners.remove(id);
        }
        Ok(doomed.len())
    }

    fn exists(&self, id: &FeatureId) -> StoreResult<bool> {
        Ok(self.tables.read().owners.contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roads() -> InMemoryFeatureStore {
        InMemoryFeatureStore::with_types(["roads"])
    }

    #[test]
    fn insert_generates_fresh_ids() {
        let store = roads();
        let a = store.insert("roads", &Feature::new(), None).unwrap();
        let b = store.insert("roads", &Feature::new(), None).unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count("roads"), 2);
    }

    #[test]
    fn generated_ids_skip_caller_ids() {
        let store = roads();
        store
            .insert("roads", &Feature::new(), Some(&FeatureId::new("roads.1")))
            .unwrap();
        let generated = store.insert("roads", &Feature::new(), None).unwrap();
        assert_ne!(generated, FeatureId::new("roads.1"));
    }

    #[test]
    fn insert_duplicate_id_fails() {
        let store = roads();
        let id = FeatureId::new("roads.a");
        store.insert("roads", &Feature::new(), Some(&id)).unwrap();

        let result = store.insert("roads", &Feature::new(), Some(&id));
        assert!(matches!(result, Err(StoreError::DuplicateId(_))));
    }

    #[test]
    fn insert_unknown_type_fails() {
        let store = roads();
        let result = store.insert("rivers", &Feature::new(), None);
        assert!(matches!(result, Err(StoreError::UnknownFeatureType(_))));
    }

    #[test]
    fn unknown_type_reads_empty() {
        let store = roads();
        assert!(store.read("rivers", &Filter::All).unwrap().is_empty());
        assert_eq!(store.update("rivers", &Filter::All, &[]).unwrap(), 0);
        assert_eq!(store.delete("rivers", &Filter::All).unwrap(), 0);
    }

    #[test]
    fn update_applies_to_matches_only() {
        let store = roads();
        let a = store
            .insert("roads", &Feature::new().property("kind", "lane"), None)
            .unwrap();
        let b = store
            .insert("roads", &Feature::new().property("kind", "highway"), None)
            .unwrap();

        let changed = store
            .update(
                "roads",
                &Filter::property_equals("kind", "lane"),
                &[Property::set("lanes", 1)],
            )
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(store.get("roads", &a).unwrap().get("lanes"), Some(&json!(1)));
        assert_eq!(store.get("roads", &b).unwrap().get("lanes"), None);
    }

    #[test]
    fn delete_frees_the_id() {
        let store = roads();
        let id = store.insert("roads", &Feature::new(), None).unwrap();

        assert_eq!(store.delete("roads", &Filter::ids([id.clone()])).unwrap(), 1);
        assert!(!store.exists(&id).unwrap());
        assert_eq!(store.count("roads"), 0);
    }

    #[test]
    fn replace_overwrites_properties() {
        let store = roads();
        let id = store
            .insert("roads", &Feature::new().property("name", "old"), None)
            .unwrap();

        store
            .replace("roads", &id, &Feature::new().property("name", "new"))
            .unwrap();
        let stored = store.get("roads", &id).unwrap();
        assert_eq!(stored.get("name"), Some(&json!("new")));
        assert_eq!(stored.id, Some(id));
    }

    #[test]
    fn replace_missing_fails() {
        let store = roads();
        let result = store.replace("roads", &FeatureId::new("roads.9"), &Feature::new());
        assert!(matches!(result, Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn fetch_fills_in_ids() {
        let store = roads();
        let id = store.insert("roads", &Feature::new(), None).unwrap();
        let fetched = store.fetch("roads", &Filter::All).unwrap();
        assert_eq!(fetched.len(), 1);
        assert_eq!(fetched[0].id, Some(id));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn generated_ids_never_collide(
                caller in prop::collection::btree_set(0u64..32, 0..16),
                generated in 1usize..32,
            ) {
                let store = roads();
                for n in &caller {
                    let id = FeatureId::new(format!("roads.{n}"));
                    store.insert("roads", &Feature::new(), Some(&id)).unwrap();
                }
                for _ in 0..generated {
                    store.insert("roads", &Feature::new(), None).unwrap();
                }
                prop_assert_eq!(store.count("roads"), caller.len() + generated);
            }

            #[test]
            fn delete_by_ids_removes_exactly_those(
                total in 1usize..20,
                picks in prop::collection::btree_set(0usize..20, 0..10),
            ) {
                let store = roads();
                let ids: Vec<_> = (0..total)
                    .map(|_| store.insert("roads", &Feature::new(), None).unwrap())
                    .collect();
                let chosen: Vec<_> = picks
                    .iter()
                    .filter(|&&i| i < total)
                    .map(|&i| ids[i].clone())
                    .collect();

                let removed = store.delete("roads", &Filter::ids(chosen.clone())).unwrap();
                prop_assert_eq!(removed, chosen.len());
                prop_assert_eq!(store.count("roads"), total - chosen.len());
                for id in &chosen {
                    prop_assert!(!store.exists(id).unwrap());
                }
            }
        }
    }
}
