use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use crate::{item::FormattedItem, subscription::Subscription};

/// `applies_to` value matching every unit kind.
pub const ANY_KIND: &str = "*";

/// A text rewrite applied to formatted units before rendering.
///
/// Several transforms may match the same unit and the order they run in is
/// not defined, so a transform must not depend on another having run first.
pub trait Transform: Send + Sync {
    /// Unique name; registering a second transform under it replaces the first.
    fn name(&self) -> &str;

    /// Unit kind this transform rewrites, or [`ANY_KIND`].
    fn applies_to(&self) -> &str;

    fn apply(&self, text: &str, subscription: &Subscription) -> String;
}

/// Adapter turning a closure into a [`Transform`].
pub struct FnTransform<F> {
    name: String,
    kind: String,
    f: F,
}

impl<F> FnTransform<F>
where
    F: Fn(&str, &Subscription) -> String + Send + Sync,
{
    pub fn new(name: impl Into<String>, kind: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            f,
        }
    }
}

impl<F> Transform for FnTransform<F>
where
    F: Fn(&str, &Subscription) -> String + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn applies_to(&self) -> &str {
        &self.kind
    }

    fn apply(&self, text: &str, subscription: &Subscription) -> String {
        (self.f)(text, subscription)
    }
}

/// Process-wide set of transforms, unordered.
pub struct TransformRegistry {
    transforms: RwLock<HashMap<String, Arc<dyn Transform>>>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self {
            transforms: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, transform: Arc<dyn Transform>) {
        let name = transform.name().to_string();
        let mut transforms = self.transforms.write().expect("transform registry poisoned");
        if transforms.insert(name.clone(), transform).is_some() {
            debug!(%name, "transform replaced");
        } else {
            debug!(%name, "transform registered");
        }
    }

    /// Remove a transform by name. Returns whether one was registered.
    pub fn unregister(&self, name: &str) -> bool {
        let mut transforms = self.transforms.write().expect("transform registry poisoned");
        let removed = transforms.remove(name).is_some();
        if removed {
            debug!(name, "transform unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.transforms.read().expect("transform registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Start a resolution cache for one assembly run.
    pub fn cache(&self) -> TransformCache<'_> {
        TransformCache {
            registry: self,
            resolved: HashMap::new(),
        }
    }

    fn matching(&self, kind: &str) -> Vec<Arc<dyn Transform>> {
        let transforms = self.transforms.read().expect("transform registry poisoned");
        transforms
            .values()
            .filter(|t| t.applies_to() == ANY_KIND || t.applies_to() == kind)
            .cloned()
            .collect()
    }
}

impl Default for TransformRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Applicable transforms per unit kind, resolved once and reused for the
/// rest of an assembly run.
///
/// Lives for a single run: registrations made afterwards are only seen by
/// the next run's cache.
pub struct TransformCache<'a> {
    registry: &'a TransformRegistry,
    resolved: HashMap<String, Vec<Arc<dyn Transform>>>,
}

impl TransformCache<'_> {
    /// Run every transform applicable to `unit.kind` over its text.
    pub fn apply(&mut self, mut unit: FormattedItem, subscription: &Subscription) -> FormattedItem {
        let registry = self.registry;
        let transforms = self
            .resolved
            .entry(unit.kind.clone())
            .or_insert_with(|| registry.matching(&unit.kind));
        for transform in transforms.iter() {
            unit.text = transform.apply(&unit.text, subscription);
        }
        unit
    }

    /// Number of unit kinds resolved so far.
    pub fn resolved_kinds(&self) -> usize {
        self.resolved.len()
    }
}
