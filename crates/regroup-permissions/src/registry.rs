//! Lookup of permission supports by object type

use crate::error::{PermissionError, Result};
use crate::support::PermissionSupport;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maps object type names to the support handling them
#[derive(Default, Clone)]
pub struct SupportRegistry {
    supports: Vec<Arc<dyn PermissionSupport>>,
    by_type: BTreeMap<String, usize>,
}

impl fmt::Debug for SupportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupportRegistry")
            .field("object_types", &self.by_type.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SupportRegistry {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `support` under every type it claims
    ///
    /// # Errors
    /// [`PermissionError::DuplicateObjectType`] if a type is already taken;
    /// nothing is registered in that case.
    pub fn register(&mut self, support: Arc<dyn PermissionSupport>) -> Result<()> {
        let types = support.object_types();
        if let Some(taken) = types.iter().find(|t| self.by_type.contains_key(*t)) {
            return Err(PermissionError::DuplicateObjectType(taken.clone()));
        }
        let index = self.supports.len();
        self.supports.push(support);
        for object_type in types {
            self.by_type.insert(object_type, index);
        }
        Ok(())
    }

    /// Builder-style [`SupportRegistry::register`]
    ///
    /// # Errors
    /// See [`SupportRegistry::register`].
    pub fn with(mut self, support: Arc<dyn PermissionSupport>) -> Result<Self> {
        self.register(support)?;
        Ok(self)
    }

    /// Support for `object_type`
    #[must_use]
    pub fn get(&self, object_type: &str) -> Option<&Arc<dyn PermissionSupport>> {
        self.by_type.get(object_type).map(|&i| &self.supports[i])
    }

    /// Every registered support, in registration order
    #[inline]
    #[must_use]
    pub fn supports(&self) -> &[Arc<dyn PermissionSupport>] {
        &self.supports
    }

    /// Registered object type names, sorted
    #[must_use]
    pub fn object_types(&self) -> Vec<&str> {
        self.by_type.keys().map(String::as_str).collect()
    }

    /// Check if `object_type` has a support
    #[inline]
    #[must_use]
    pub fn contains(&self, object_type: &str) -> bool {
        self.by_type.contains_key(object_type)
    }

    /// Number of registered supports
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.supports.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.supports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::{ApplyTask, CrawlTask, Permissions};
    use regroup_groups::{Destination, GroupMigrationState};

    struct Claims(Vec<&'static str>);

    impl PermissionSupport for Claims {
        fn object_types(&self) -> Vec<String> {
            self.0.iter().map(ToString::to_string).collect()
        }
        fn crawler_tasks(&self) -> Result<Vec<CrawlTask>> {
            Ok(Vec::new())
        }
        fn load_as_dict(&self, _: &str, _: &str) -> Result<BTreeMap<String, String>> {
            Ok(BTreeMap::new())
        }
        fn is_item_relevant(&self, _: &Permissions, _: &GroupMigrationState) -> Result<bool> {
            Ok(false)
        }
        fn build_apply_task(
            &self,
            _: &Permissions,
            _: &GroupMigrationState,
            _: Destination,
        ) -> Result<ApplyTask> {
            Ok(crate::support::noop_task())
        }
    }

    #[test]
    fn lookup_by_any_claimed_type() {
        let registry = SupportRegistry::new()
            .with(Arc::new(Claims(vec!["jobs", "clusters"])))
            .unwrap()
            .with(Arc::new(Claims(vec!["secrets"])))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.object_types(), vec!["clusters", "jobs", "secrets"]);
        assert!(registry.get("jobs").is_some());
        assert!(registry.contains("secrets"));
        assert!(registry.get("pipelines").is_none());
    }

    #[test]
    fn duplicate_claims_are_rejected_whole() {
        let mut registry = SupportRegistry::new();
        registry.register(Arc::new(Claims(vec!["jobs"]))).unwrap();

        let err = registry
            .register(Arc::new(Claims(vec!["pipelines", "jobs"])))
            .unwrap_err();
        assert!(matches!(err, PermissionError::DuplicateObjectType(t) if t == "jobs"));
        assert!(!registry.contains("pipelines"));
        assert_eq!(registry.len(), 1);
    }
}
