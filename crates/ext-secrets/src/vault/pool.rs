//! Vault client pool — §4.3 "Vault: `(address, auth-material fingerprint)`
//! → client + optional background lease-renewal task."
//!
//! Token auth is static and never renewed (the caller owns the token's
//! lifetime). AppRole auth spawns a watcher that re-logs-in shortly before
//! the lease expires, backing off on failure so a temporarily unreachable
//! Vault doesn't spin the watcher in a tight loop.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use ext_core::ExtError;
use ext_error::{BuiltinError, SourceLocation};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::client::{app_role_login, VaultClient};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VaultKey {
    pub address: String,
    pub auth_fingerprint: String,
}

pub enum AuthMaterial {
    Token(String),
    AppRole { role_id: String, secret_id: String },
}

impl AuthMaterial {
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        match self {
            Self::Token(token) => {
                hasher.update(b"token:");
                hasher.update(token.as_bytes());
            }
            Self::AppRole { role_id, secret_id } => {
                hasher.update(b"approle:");
                hasher.update(role_id.as_bytes());
                hasher.update(b":");
                hasher.update(secret_id.as_bytes());
            }
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Vault needs its own pool (rather than the generic `ext_db`-style
/// `Pool<K, V>`) because constructing an AppRole-authenticated entry must
/// spawn a renewal watcher against the *exact* `Arc<VaultClient>` that ends
/// up stored — the generic pool only ever hands the constructor's return
/// value its own fresh `Arc`, which would leave the watcher updating a
/// client nobody else can see.
#[derive(Default)]
pub struct VaultPool {
    entries: Mutex<HashMap<VaultKey, Arc<VaultClient>>>,
}

const MIN_BACKOFF: Duration = Duration::from_secs(5);
const MAX_BACKOFF: Duration = Duration::from_secs(300);
/// Re-login this long before the lease actually expires, so a slow renewal
/// round-trip never races the token going stale.
const RENEWAL_SAFETY_MARGIN: Duration = Duration::from_secs(30);

impl VaultPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_construct(&self, address: &str, auth: AuthMaterial) -> Result<Arc<VaultClient>, ExtError> {
        let key = VaultKey { address: address.to_string(), auth_fingerprint: auth.fingerprint() };

        if let Some(existing) = self.entries.lock().get(&key) {
            return Ok(existing.clone());
        }

        let (client, pending_watcher) = construct(address, auth).await?;

        let mut guard = self.entries.lock();
        if let Some(existing) = guard.get(&key) {
            // Lost the race to a concurrent first-access for the same key —
            // this client (and any renewal watcher it would have needed) is
            // discarded, so the watcher must never have been spawned yet.
            return Ok(existing.clone());
        }
        guard.insert(key, client.clone());
        drop(guard);

        if let Some(watcher) = pending_watcher {
            watcher.spawn();
        }
        Ok(client)
    }
}

/// An AppRole renewal watcher that hasn't been spawned yet — constructing it
/// only requires the arguments `spawn_renewal_watcher` needs, so the decision
/// to actually run it can wait until after `get_or_construct` knows this
/// client won the insert race.
struct PendingRenewalWatcher {
    client:     Arc<VaultClient>,
    address:    String,
    role_id:    String,
    secret_id:  String,
    initial_lease: Duration,
}

impl PendingRenewalWatcher {
    fn spawn(self) {
        spawn_renewal_watcher(self.client, self.address, self.role_id, self.secret_id, self.initial_lease);
    }
}

async fn construct(address: &str, auth: AuthMaterial) -> Result<(Arc<VaultClient>, Option<PendingRenewalWatcher>), ExtError> {
    match auth {
        AuthMaterial::Token(token) => Ok((Arc::new(VaultClient::new(address.to_string(), token)), None)),
        AuthMaterial::AppRole { role_id, secret_id } => {
            let http = reqwest::Client::new();
            let login = app_role_login(&http, address, &role_id, &secret_id)
                .await
                .map_err(|e| BuiltinError::new("vault.send", format!("initial AppRole login: {e}"), SourceLocation::unknown()))?;
            let client = Arc::new(VaultClient::new(address.to_string(), login.client_token));
            let watcher = PendingRenewalWatcher {
                client: client.clone(),
                address: address.to_string(),
                role_id,
                secret_id,
                initial_lease: login.lease_duration,
            };
            Ok((client, Some(watcher)))
        }
    }
}

fn spawn_renewal_watcher(client: Arc<VaultClient>, address: String, role_id: String, secret_id: String, initial_lease: Duration) {
    tokio::spawn(async move {
        let mut backoff = MIN_BACKOFF;
        let mut sleep_for = initial_lease.saturating_sub(RENEWAL_SAFETY_MARGIN);
        loop {
            tokio::time::sleep(sleep_for).await;
            let http = reqwest::Client::new();
            match app_role_login(&http, &address, &role_id, &secret_id).await {
                Ok(login) => {
                    client.set_token(login.client_token);
                    backoff = MIN_BACKOFF;
                    sleep_for = login.lease_duration.saturating_sub(RENEWAL_SAFETY_MARGIN);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "AppRole renewal failed, backing off");
                    sleep_for = backoff;
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_and_approle_fingerprints_never_collide() {
        let token = AuthMaterial::Token("t".to_string());
        let approle = AuthMaterial::AppRole { role_id: "t".to_string(), secret_id: String::new() };
        assert_ne!(token.fingerprint(), approle.fingerprint());
    }

    #[test]
    fn fingerprint_is_stable_for_identical_material() {
        let a = AuthMaterial::AppRole { role_id: "r".to_string(), secret_id: "s".to_string() };
        let b = AuthMaterial::AppRole { role_id: "r".to_string(), secret_id: "s".to_string() };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
