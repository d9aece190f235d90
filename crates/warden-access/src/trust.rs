//! Per-principal trusted device registry.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use tracing::info;

/// Maps each principal to the set of device ids it has marked as trusted.
#[derive(Debug, Default)]
pub struct TrustedDeviceRegistry {
    devices: RwLock<HashMap<String, BTreeSet<String>>>,
}

impl TrustedDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `device_id` as trusted for `principal_id`.
    ///
    /// Returns `false` if the device was already trusted.
    pub fn mark(&self, principal_id: &str, device_id: &str) -> bool {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let inserted = devices
            .entry(principal_id.to_string())
            .or_default()
            .insert(device_id.to_string());
        if inserted {
            info!(principal = %principal_id, device = %device_id, "Device marked as trusted");
        }
        inserted
    }

    /// Revokes trust in `device_id` for `principal_id`.
    ///
    /// Returns `false` if the device was not trusted.
    pub fn revoke(&self, principal_id: &str, device_id: &str) -> bool {
        let mut devices = self.devices.write().unwrap_or_else(PoisonError::into_inner);
        let Some(set) = devices.get_mut(principal_id) else {
            return false;
        };
        let removed = set.remove(device_id);
        if set.is_empty() {
            devices.remove(principal_id);
        }
        if removed {
            info!(principal = %principal_id, device = %device_id, "Device trust revoked");
        }
        removed
    }

    /// Trusted devices for `principal_id`, sorted. Empty when none.
    pub fn devices(&self, principal_id: &str) -> Vec<String> {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_trusted(&self, principal_id: &str, device_id: &str) -> bool {
        self.devices
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(principal_id)
            .is_some_and(|set| set.contains(device_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_revoke() {
        let registry = TrustedDeviceRegistry::new();
        assert!(registry.devices("u1").is_empty());

        assert!(registry.mark("u1", "laptop"));
        assert!(!registry.mark("u1", "laptop"));
        assert!(registry.mark("u1", "phone"));
        assert_eq!(registry.devices("u1"), vec!["laptop", "phone"]);
        assert!(registry.is_trusted("u1", "phone"));
        assert!(!registry.is_trusted("u2", "phone"));

        assert!(registry.revoke("u1", "laptop"));
        assert!(!registry.revoke("u1", "laptop"));
        assert_eq!(registry.devices("u1"), vec!["phone"]);
    }

    #[test]
    fn test_revoke_last_device_clears_principal() {
        let registry = TrustedDeviceRegistry::new();
        registry.mark("u1", "d1");
        assert!(registry.revoke("u1", "d1"));
        assert!(registry.devices("u1").is_empty());
        assert!(!registry.revoke("u1", "d1"));
    }
}
