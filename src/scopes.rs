// ABOUTME: Scope registry mapping scope names to human-readable descriptions
// ABOUTME: Validates requested scopes against registration and per-client allow-lists
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::errors::ProtocolError;

/// Process-wide map of registered scope names. Populated from configuration
/// at boot and optionally extended at runtime through `define`. Handlers
/// receive it as an explicit value; there is no hidden global.
#[derive(Debug, Default)]
pub struct ScopeRegistry {
    scopes: RwLock<BTreeMap<String, String>>,
}

impl ScopeRegistry {
    #[must_use]
    pub fn new(initial: BTreeMap<String, String>) -> Self {
        Self {
            scopes: RwLock::new(initial),
        }
    }

    /// Register a batch of scopes, overwriting descriptions of names already
    /// present. Writes are synchronized; readers may observe a stale snapshot.
    pub fn define<I>(&self, batch: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut scopes = self.scopes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        scopes.extend(batch);
    }

    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        let scopes = self.scopes.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        scopes.contains_key(name)
    }

    /// Compute the effective scope list for a request.
    ///
    /// An empty request is substituted with `defaults`. Every resulting name
    /// must be registered, and present in `client_allowed` when the client
    /// carries an allow-list. Input order is preserved so responses echo the
    /// request.
    ///
    /// # Errors
    /// Returns `invalid_scope` for unregistered or disallowed names.
    pub fn validate(
        &self,
        requested: &[String],
        client_allowed: Option<&[String]>,
        defaults: &[String],
    ) -> Result<Vec<String>, ProtocolError> {
        let effective: Vec<String> = if requested.is_empty() {
            defaults.to_vec()
        } else {
            requested.to_vec()
        };

        let scopes = self.scopes.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        for name in &effective {
            if !scopes.contains_key(name) {
                return Err(ProtocolError::InvalidScope(format!(
                    "Scope '{name}' is not registered"
                )));
            }
            if let Some(allowed) = client_allowed {
                if !allowed.iter().any(|a| a == name) {
                    return Err(ProtocolError::InvalidScope(format!(
                        "Scope '{name}' is not permitted for this client"
                    )));
                }
            }
        }

        Ok(effective)
    }

    /// Map scope names to `(name, description)` pairs for display. Unknown
    /// names pass through with the name as description; never fails.
    #[must_use]
    pub fn describe(&self, names: &[String]) -> Vec<(String, String)> {
        let scopes = self.scopes.read().unwrap_or_else(std::sync::PoisonError::into_inner);
        names
            .iter()
            .map(|name| {
                let description = scopes.get(name).cloned().unwrap_or_else(|| name.clone());
                (name.clone(), description)
            })
            .collect()
    }

    /// Clear all registrations. Test-only escape hatch.
    #[cfg(test)]
    pub fn reset(&self) {
        let mut scopes = self.scopes.write().unwrap_or_else(std::sync::PoisonError::into_inner);
        scopes.clear();
    }
}

/// Split a space-separated `scope` request parameter. Empty or
/// whitespace-only input yields an empty list, which `validate` treats as
/// "unspecified".
#[must_use]
pub fn split_scope_param(raw: &str) -> Vec<String> {
    raw.split_whitespace().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ScopeRegistry {
        let registry = ScopeRegistry::default();
        registry.define([
            ("read".to_owned(), "Read your data".to_owned()),
            ("write".to_owned(), "Modify your data".to_owned()),
        ]);
        registry
    }

    #[test]
    fn empty_request_substitutes_defaults() {
        let registry = registry();
        let effective = registry
            .validate(&[], None, &["read".to_owned()])
            .expect("defaults are registered");
        assert_eq!(effective, vec!["read".to_owned()]);
    }

    #[test]
    fn unregistered_scope_is_rejected() {
        let registry = registry();
        let err = registry
            .validate(&["admin".to_owned()], None, &[])
            .expect_err("unregistered");
        assert_eq!(err.error_code(), "invalid_scope");
    }

    #[test]
    fn allow_list_restricts_registered_scopes() {
        let registry = registry();
        let allowed = vec!["read".to_owned()];
        assert!(registry
            .validate(&["write".to_owned()], Some(&allowed), &[])
            .is_err());
        assert!(registry
            .validate(&["read".to_owned()], Some(&allowed), &[])
            .is_ok());
    }

    #[test]
    fn validate_preserves_request_order() {
        let registry = registry();
        let requested = vec!["write".to_owned(), "read".to_owned()];
        let effective = registry.validate(&requested, None, &[]).expect("registered");
        assert_eq!(effective, requested);
    }

    #[test]
    fn describe_passes_unknown_names_through() {
        let registry = registry();
        let described = registry.describe(&["read".to_owned(), "mystery".to_owned()]);
        assert_eq!(described[0].1, "Read your data");
        assert_eq!(described[1], ("mystery".to_owned(), "mystery".to_owned()));
    }

    #[test]
    fn reset_clears_all_registrations() {
        let registry = registry();
        assert!(registry.is_registered("read"));
        registry.reset();
        assert!(!registry.is_registered("read"));
    }

    #[test]
    fn scope_param_splitting_treats_blank_as_unspecified() {
        assert!(split_scope_param("").is_empty());
        assert!(split_scope_param("   ").is_empty());
        assert_eq!(split_scope_param("read  write"), vec!["read", "write"]);
    }
}
