use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub const TEXT_PLAIN: &str = "text/plain";
pub const TEXT_HTML: &str = "text/html";

/// Anything a collector or a timed producer can hand to the assembler.
///
/// Implemented for every `'static` value that can display itself; the
/// `Display` output is what the default formatter renders.
pub trait ContentItem: Any + fmt::Display + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + fmt::Display + Send + Sync> ContentItem for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A raw content item, cheap to clone.
///
/// Keeps the concrete runtime type reachable so formatters can be looked up
/// by it.
#[derive(Clone)]
pub struct Item(Arc<dyn ContentItem>);

impl Item {
    pub fn new<T: ContentItem>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// `TypeId` of the wrapped value (not of the wrapper).
    pub fn content_type_id(&self) -> TypeId {
        self.inner().as_any().type_id()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner().as_any().downcast_ref::<T>()
    }

    /// Generic string conversion of the wrapped value.
    pub fn text(&self) -> String {
        self.inner().to_string()
    }

    fn inner(&self) -> &dyn ContentItem {
        &*self.0
    }
}

impl fmt::Debug for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Item({:?})", self.text())
    }
}

/// A displayable unit: formatter output, transform input and output, and
/// what composers receive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedItem {
    /// Media type of `text`; transforms are scoped by it.
    pub kind: String,
    pub text: String,
}

impl FormattedItem {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            text: text.into(),
        }
    }

    pub fn plain(text: impl Into<String>) -> Self {
        Self::new(TEXT_PLAIN, text)
    }

    pub fn html(text: impl Into<String>) -> Self {
        Self::new(TEXT_HTML, text)
    }
}
