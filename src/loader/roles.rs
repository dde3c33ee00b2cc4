//! Registration of document keys that declare upstream references.

use crate::core::task::UpstreamRole;
use std::collections::HashMap;

/// Prefix of generic upstream keys, e.g. `upstream_segmentation`.
pub const UPSTREAM_PREFIX: &str = "upstream_";

/// How a section key is interpreted by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyClass {
    /// An ordinary parameter.
    Parameter,
    /// An upstream reference with the given role.
    Upstream(UpstreamRole),
    /// Looks like an upstream key but is not accepted.
    Rejected(String),
}

/// Maps document keys to upstream roles.
///
/// `upstream_task`, `upstream_mask` and `upstream_colmap` are registered by
/// default. Other `upstream_<role>` keys are accepted as generic roles unless
/// generic roles are switched off, in which case only registered keys count.
#[derive(Debug, Clone)]
pub struct RoleRegistry {
    roles: HashMap<String, UpstreamRole>,
    generic: bool,
}

impl RoleRegistry {
    /// A registry with no registered keys and generic roles enabled.
    pub fn empty() -> Self {
        Self {
            roles: HashMap::new(),
            generic: true,
        }
    }

    pub fn register(&mut self, key: impl Into<String>, role: UpstreamRole) -> &mut Self {
        self.roles.insert(key.into(), role);
        self
    }

    pub fn set_generic(&mut self, generic: bool) -> &mut Self {
        self.generic = generic;
        self
    }

    pub fn allows_generic(&self) -> bool {
        self.generic
    }

    pub fn role_of(&self, key: &str) -> Option<&UpstreamRole> {
        self.roles.get(key)
    }

    pub fn classify(&self, key: &str) -> KeyClass {
        if let Some(role) = self.roles.get(key) {
            return KeyClass::Upstream(role.clone());
        }
        let Some(suffix) = key.strip_prefix(UPSTREAM_PREFIX) else {
            return KeyClass::Parameter;
        };
        if !self.generic {
            return KeyClass::Rejected(format!("'{}' is not a registered upstream role", key));
        }
        if suffix.is_empty() {
            return KeyClass::Rejected("upstream key has an empty role".to_string());
        }
        KeyClass::Upstream(UpstreamRole::Other(suffix.to_string()))
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register("upstream_task", UpstreamRole::Primary)
            .register("upstream_mask", UpstreamRole::Mask)
            .register("upstream_colmap", UpstreamRole::CameraGeometry);
        registry
    }
}
