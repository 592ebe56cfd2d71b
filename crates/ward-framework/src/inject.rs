//! Dependency injection between plugins and apis.
//!
//! A plugin declares its dependencies as [`Inject<T>`] fields and lists them
//! in [`Plugin::injections`](crate::plugin::Plugin::injections). Before any
//! `on_start` hook runs, the host resolves every [`Injection`] once:
//!
//! | Kind | Resolution |
//! |------|------------|
//! | [`InjectionKind::Api`] | exact id, else the first id of the form `{target}-{n}` |
//! | [`InjectionKind::Plugin`] | exact id |
//!
//! # Example
//!
//! ```rust,ignore
//! struct Digest {
//!     core: ImportableCore<NoData>,
//!     feed: Inject<FeedApi>,
//! }
//!
//! impl Plugin for Digest {
//!     fn injections(&self) -> Vec<Injection<'_>> {
//!         vec![Injection::api("feed", &self.feed)]
//!     }
//! }
//! ```

use std::any::{Any, type_name};
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::InjectError;

/// A type-erased instance as stored by the host.
pub type AnyInstance = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectionKind {
    Api,
    Plugin,
}

impl InjectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Plugin => "plugin",
        }
    }
}

impl fmt::Display for InjectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Slots ────────────────────────────────────────────────────────────────────

/// Type-erased view of an [`Inject<T>`] slot.
pub trait InjectSlot: Send + Sync {
    /// Stores `instance` if it is of the slot's type.
    fn fill(&self, target: &str, instance: AnyInstance) -> Result<(), InjectError>;

    fn is_filled(&self) -> bool;

    fn expected_type(&self) -> &'static str;
}

/// A dependency filled in by the host before startup.
pub struct Inject<T> {
    slot: OnceLock<Arc<T>>,
}

impl<T> Inject<T> {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// The injected instance, if resolution succeeded.
    pub fn get(&self) -> Option<&Arc<T>> {
        self.slot.get()
    }

    /// The injected instance, or [`InjectError::Missing`].
    pub fn require(&self) -> Result<&Arc<T>, InjectError> {
        self.slot
            .get()
            .ok_or(InjectError::Missing(type_name::<T>()))
    }
}

impl<T> Default for Inject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Inject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inject")
            .field("type", &type_name::<T>())
            .field("filled", &self.slot.get().is_some())
            .finish()
    }
}

impl<T: Send + Sync + 'static> InjectSlot for Inject<T> {
    fn fill(&self, target: &str, instance: AnyInstance) -> Result<(), InjectError> {
        let typed = instance
            .downcast::<T>()
            .map_err(|_| InjectError::TypeMismatch {
                target: target.to_string(),
                expected: type_name::<T>(),
            })?;
        self.slot
            .set(typed)
            .map_err(|_| InjectError::AlreadyInjected {
                target: target.to_string(),
            })
    }

    fn is_filled(&self) -> bool {
        self.slot.get().is_some()
    }

    fn expected_type(&self) -> &'static str {
        type_name::<T>()
    }
}

// ─── Descriptors ──────────────────────────────────────────────────────────────

/// One injection point declared by a plugin.
pub struct Injection<'a> {
    pub target: String,
    pub kind: InjectionKind,
    pub slot: &'a dyn InjectSlot,
}

impl<'a> Injection<'a> {
    pub fn api(target: impl Into<String>, slot: &'a dyn InjectSlot) -> Self {
        Self {
            target: target.into(),
            kind: InjectionKind::Api,
            slot,
        }
    }

    pub fn plugin(target: impl Into<String>, slot: &'a dyn InjectSlot) -> Self {
        Self {
            target: target.into(),
            kind: InjectionKind::Plugin,
            slot,
        }
    }
}

impl fmt::Debug for Injection<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Injection")
            .field("target", &self.target)
            .field("kind", &self.kind)
            .field("expected", &self.slot.expected_type())
            .finish()
    }
}

/// Whether `id` is `target` followed by a `-{n}` deduplication suffix.
pub fn matches_suffixed(target: &str, id: &str) -> bool {
    id.strip_prefix(target)
        .and_then(|rest| rest.strip_prefix('-'))
        .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()))
}

/// Picks the api `target` resolves to among `ids`: an exact match wins,
/// otherwise the first suffixed match.
pub fn resolve_api_id<'a, I>(target: &str, ids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut suffixed = None;
    for id in ids {
        if id == target {
            return Some(id);
        }
        if suffixed.is_none() && matches_suffixed(target, id) {
            suffixed = Some(id);
        }
    }
    suffixed
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Feed;
    struct Other;

    #[test]
    fn test_fill_downcasts() {
        let slot: Inject<Feed> = Inject::new();
        assert!(slot.require().is_err());

        let instance: AnyInstance = Arc::new(Feed);
        slot.fill("feed", instance.clone()).unwrap();
        assert!(slot.is_filled());
        assert!(matches!(
            slot.fill("feed", instance),
            Err(InjectError::AlreadyInjected { .. })
        ));
    }

    #[test]
    fn test_fill_rejects_wrong_type() {
        let slot: Inject<Feed> = Inject::new();
        let err = slot.fill("feed", Arc::new(Other)).unwrap_err();
        assert!(matches!(err, InjectError::TypeMismatch { .. }));
        assert!(!slot.is_filled());
    }

    #[test]
    fn test_suffix_matching() {
        assert!(matches_suffixed("feed", "feed-0"));
        assert!(matches_suffixed("feed", "feed-12"));
        assert!(!matches_suffixed("feed", "feed"));
        assert!(!matches_suffixed("feed", "feed-"));
        assert!(!matches_suffixed("feed", "feed-x"));
        assert!(!matches_suffixed("feed", "feeder-0"));
    }

    #[test]
    fn test_resolve_prefers_exact() {
        assert_eq!(resolve_api_id("feed", ["feed-0", "feed"]), Some("feed"));
        assert_eq!(resolve_api_id("feed", ["other", "feed-1", "feed-0"]), Some("feed-1"));
        assert_eq!(resolve_api_id("feed", ["other"]), None);
    }
}
