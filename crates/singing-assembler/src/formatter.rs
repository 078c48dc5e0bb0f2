use std::any::TypeId;
use std::sync::{Arc, RwLock};

use singing_core::RenderContext;
use tracing::debug;

use crate::item::{ContentItem, FormattedItem, Item};

type FormatFn = Arc<dyn Fn(&Item, &RenderContext) -> Option<FormattedItem> + Send + Sync>;

struct FormatterEntry {
    type_id: TypeId,
    /// `None` matches every locale.
    locale: Option<String>,
    format: FormatFn,
}

/// Maps an item's runtime type (and optionally a locale) to the function
/// that turns it into a [`FormattedItem`].
///
/// Registration is additive; a single registry is meant to be shared by the
/// whole process as `Arc<FormatterRegistry>`.
pub struct FormatterRegistry {
    /// Registration order; lookups walk it backwards so the latest wins.
    entries: RwLock<Vec<FormatterEntry>>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Register `f` for items of type `T`.
    ///
    /// With `Some(locale)` the formatter only applies to render contexts with
    /// that exact locale, and beats locale-agnostic formatters for `T`.
    pub fn register<T, F>(&self, locale: Option<&str>, f: F)
    where
        T: ContentItem,
        F: Fn(&T, &RenderContext) -> FormattedItem + Send + Sync + 'static,
    {
        let format: FormatFn = Arc::new(move |item: &Item, ctx: &RenderContext| {
            item.downcast_ref::<T>().map(|value| f(value, ctx))
        });
        let mut entries = self.entries.write().expect("formatter registry poisoned");
        entries.push(FormatterEntry {
            type_id: TypeId::of::<T>(),
            locale: locale.map(str::to_string),
            format,
        });
        debug!(
            item_type = std::any::type_name::<T>(),
            locale = locale.unwrap_or("*"),
            "formatter registered"
        );
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("formatter registry poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Format `item` for `ctx`, falling back to its `Display` output as
    /// plain text when no formatter matches.
    pub fn format(&self, item: &Item, ctx: &RenderContext) -> FormattedItem {
        self.resolve(item.content_type_id(), ctx.locale.as_deref())
            .and_then(|f| f(item, ctx))
            .unwrap_or_else(|| FormattedItem::plain(item.text()))
    }

    fn resolve(&self, type_id: TypeId, locale: Option<&str>) -> Option<FormatFn> {
        let entries = self.entries.read().expect("formatter registry poisoned");
        let mut candidates = entries.iter().rev().filter(|e| e.type_id == type_id);

        let specific = locale.and_then(|loc| {
            candidates
                .clone()
                .find(|e| e.locale.as_deref() == Some(loc))
        });
        specific
            .or_else(|| candidates.find(|e| e.locale.is_none()))
            .map(|e| Arc::clone(&e.format))
    }
}

impl Default for FormatterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
