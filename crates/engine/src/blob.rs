//! Named blob storage with read-through parent fallback.
//!
//! A [`BlobStore`] maps names to shared [`Blob`] slots. Child stores shadow
//! their parent on name collisions; lookups that miss locally fall back to the
//! parent chain. Creation always happens locally.

use std::{
    collections::{BTreeSet, HashMap},
    fmt,
    sync::Arc,
};

use parking_lot::RwLock;
use tracing::{debug, warn};

/// Element type tag of a [`BlobValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Bool,
    Int,
    Float,
    Text,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ElementType::Bool => "bool",
            ElementType::Int => "int",
            ElementType::Float => "float",
            ElementType::Text => "text",
        };
        f.write_str(label)
    }
}

/// Typed payload held by a blob.
#[derive(Debug, Clone, PartialEq)]
pub enum BlobValue {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
}

impl BlobValue {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            BlobValue::Bool(values) => values.len(),
            BlobValue::Int(values) => values.len(),
            BlobValue::Float(values) => values.len(),
            BlobValue::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            BlobValue::Bool(_) => ElementType::Bool,
            BlobValue::Int(_) => ElementType::Int,
            BlobValue::Float(_) => ElementType::Float,
            BlobValue::Text(_) => ElementType::Text,
        }
    }

    /// The single element of a one-element boolean blob.
    pub fn as_bool_scalar(&self) -> Option<bool> {
        match self {
            BlobValue::Bool(values) if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }

    /// The single element of a one-element numeric blob, widened to `f64`.
    pub fn as_f64_scalar(&self) -> Option<f64> {
        match self {
            BlobValue::Int(values) if values.len() == 1 => Some(values[0] as f64),
            BlobValue::Float(values) if values.len() == 1 => Some(values[0]),
            _ => None,
        }
    }
}

impl fmt::Display for BlobValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
            f.write_str("[")?;
            for (index, value) in values.iter().enumerate() {
                if index > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{value}")?;
            }
            f.write_str("]")
        }
        match self {
            BlobValue::Bool(values) => join(f, values),
            BlobValue::Int(values) => join(f, values),
            BlobValue::Float(values) => join(f, values),
            BlobValue::Text(values) => join(f, values),
        }
    }
}

/// A mutable, shareable value slot. Empty until first written.
#[derive(Debug, Default)]
pub struct Blob {
    value: RwLock<Option<BlobValue>>,
}

impl Blob {
    /// Snapshot of the current contents.
    pub fn get(&self) -> Option<BlobValue> {
        self.value.read().clone()
    }

    pub fn set(&self, value: BlobValue) {
        *self.value.write() = Some(value);
    }

    pub fn is_empty(&self) -> bool {
        self.value.read().is_none()
    }

    /// Apply `update` to the contents under the write lock.
    pub fn update<R>(&self, update: impl FnOnce(&mut Option<BlobValue>) -> R) -> R {
        update(&mut self.value.write())
    }
}

/// Named blob container owned by one execution context.
#[derive(Debug, Default)]
pub struct BlobStore {
    blobs: RwLock<HashMap<String, Arc<Blob>>>,
    parent: Option<Arc<BlobStore>>,
}

impl BlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child store that reads through to `parent` for names it does not hold.
    pub fn with_parent(parent: Arc<BlobStore>) -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            parent: Some(parent),
        }
    }

    pub fn parent(&self) -> Option<&Arc<BlobStore>> {
        self.parent.as_ref()
    }

    /// Return the blob named `name`, creating an empty one if it does not exist.
    ///
    /// A blob visible through the parent chain is returned as-is rather than
    /// shadowed by a fresh local slot.
    pub fn create_blob(&self, name: &str) -> Arc<Blob> {
        if let Some(existing) = self.find(name) {
            debug!(blob = %name, "blob already exists; skipping");
            return existing;
        }
        let mut blobs = self.blobs.write();
        blobs
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(blob = %name, "creating blob");
                Arc::new(Blob::default())
            })
            .clone()
    }

    /// Look up a blob locally, then through the parent chain.
    pub fn get_blob(&self, name: &str) -> Option<Arc<Blob>> {
        let found = self.find(name);
        if found.is_none() {
            warn!(blob = %name, "blob not in the store");
        }
        found
    }

    pub fn has_blob(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    /// Sorted union of local names and every ancestor's names.
    pub fn list_blobs(&self) -> Vec<String> {
        let mut names = BTreeSet::new();
        self.collect_names(&mut names);
        names.into_iter().collect()
    }

    fn find(&self, name: &str) -> Option<Arc<Blob>> {
        if let Some(blob) = self.blobs.read().get(name) {
            return Some(blob.clone());
        }
        self.parent.as_ref().and_then(|parent| parent.find(name))
    }

    fn collect_names(&self, names: &mut BTreeSet<String>) {
        names.extend(self.blobs.read().keys().cloned());
        if let Some(parent) = &self.parent {
            parent.collect_names(names);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_blob_is_idempotent() {
        let store = BlobStore::new();
        let first = store.create_blob("x");
        first.set(BlobValue::Int(vec![7]));
        let second = store.create_blob("x");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get(), Some(BlobValue::Int(vec![7])));
    }

    #[test]
    fn get_blob_falls_back_to_parent() {
        let parent = Arc::new(BlobStore::new());
        parent.create_blob("shared").set(BlobValue::Bool(vec![true]));
        let child = BlobStore::with_parent(parent.clone());

        let found = child.get_blob("shared").expect("visible through parent");
        assert_eq!(found.get().and_then(|value| value.as_bool_scalar()), Some(true));
        assert!(child.get_blob("missing").is_none());
    }

    #[test]
    fn child_shadows_parent_on_collision() {
        let parent = Arc::new(BlobStore::new());
        parent.create_blob("x").set(BlobValue::Int(vec![1]));
        let child = BlobStore::with_parent(parent.clone());
        {
            // A local slot inserted directly shadows the parent's.
            let mut blobs = child.blobs.write();
            let local = Arc::new(Blob::default());
            local.set(BlobValue::Int(vec![2]));
            blobs.insert("x".into(), local);
        }
        assert_eq!(child.get_blob("x").and_then(|blob| blob.get()), Some(BlobValue::Int(vec![2])));
        assert_eq!(parent.get_blob("x").and_then(|blob| blob.get()), Some(BlobValue::Int(vec![1])));
    }

    #[test]
    fn create_blob_reuses_parent_blob() {
        let parent = Arc::new(BlobStore::new());
        let in_parent = parent.create_blob("x");
        let child = BlobStore::with_parent(parent);
        assert!(Arc::ptr_eq(&in_parent, &child.create_blob("x")));
        assert!(child.blobs.read().is_empty());
    }

    #[test]
    fn list_blobs_unions_parent_names() {
        let parent = Arc::new(BlobStore::new());
        parent.create_blob("a");
        parent.create_blob("b");
        let child = BlobStore::with_parent(parent);
        child.create_blob("c");
        assert_eq!(child.list_blobs(), vec!["a", "b", "c"]);
    }

    #[test]
    fn value_box_reports_size_and_type() {
        let value = BlobValue::Float(vec![1.0, 2.5]);
        assert_eq!(value.len(), 2);
        assert_eq!(value.element_type(), ElementType::Float);
        assert_eq!(value.as_bool_scalar(), None);
        assert_eq!(value.to_string(), "[1, 2.5]");
        assert_eq!(BlobValue::Bool(vec![false]).as_bool_scalar(), Some(false));
        assert_eq!(BlobValue::Int(vec![3]).as_f64_scalar(), Some(3.0));
    }
}
