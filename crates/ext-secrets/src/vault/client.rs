//! Vault HTTP API client — KV v2 get and AppRole login (spec.md §6
//! "HashiCorp Vault via its HTTP API (KV v2 get, AppRole login, token
//! lifetime watcher)").

use std::time::Duration;

use ext_core::{Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};
use parking_lot::RwLock;

const BUILTIN: &str = "vault.send";

fn err(message: impl Into<String>) -> ext_error::ExtError {
    BuiltinError::new(BUILTIN, message, SourceLocation::unknown()).into()
}

pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    /// Mutated in place by the lease-renewal watcher (`pool::renewal`) when
    /// an AppRole login is refreshed; read fresh on every request.
    token: RwLock<String>,
}

impl VaultClient {
    pub fn new(address: String, token: String) -> Self {
        Self { http: reqwest::Client::new(), address, token: RwLock::new(token) }
    }

    pub fn set_token(&self, token: String) {
        *self.token.write() = token;
    }

    fn current_token(&self) -> String {
        self.token.read().clone()
    }

    pub async fn kv2_get(&self, mount_path: &str, path: &str) -> Result<Value, ext_error::ExtError> {
        let url = format!("{}/v1/{}/data/{}", self.address.trim_end_matches('/'), mount_path.trim_matches('/'), path.trim_start_matches('/'));
        let response = self
            .http
            .get(&url)
            .header("X-Vault-Token", self.current_token())
            .send()
            .await
            .map_err(|e| err(format!("requesting {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(err(format!("vault returned {} for {url}", response.status())));
        }

        let body: serde_json::Value = response.json().await.map_err(|e| err(format!("decoding vault response: {e}")))?;
        let data = body.get("data").and_then(|d| d.get("data")).cloned().unwrap_or(serde_json::Value::Object(Default::default()));
        Ok(Value::from(&data))
    }
}

pub struct AppRoleLoginResult {
    pub client_token: String,
    pub lease_duration: Duration,
}

/// `POST /v1/auth/approle/login` with `role_id` + `secret_id`.
pub async fn app_role_login(http: &reqwest::Client, address: &str, role_id: &str, secret_id: &str) -> Result<AppRoleLoginResult, ext_error::ExtError> {
    let url = format!("{}/v1/auth/approle/login", address.trim_end_matches('/'));
    let mut body = ValueMap::new();
    body.insert("role_id".to_string(), Value::String(role_id.to_string()));
    body.insert("secret_id".to_string(), Value::String(secret_id.to_string()));
    let json_body: serde_json::Value = Value::Object(body).into();

    let response = http.post(&url).json(&json_body).send().await.map_err(|e| err(format!("approle login to {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(err(format!("approle login returned {} for {url}", response.status())));
    }

    let decoded: serde_json::Value = response.json().await.map_err(|e| err(format!("decoding approle login response: {e}")))?;
    let auth = decoded.get("auth").ok_or_else(|| err("approle login response missing 'auth'"))?;
    let client_token = auth.get("client_token").and_then(|v| v.as_str()).ok_or_else(|| err("approle login response missing 'auth.client_token'"))?.to_string();
    let lease_duration_secs = auth.get("lease_duration").and_then(|v| v.as_u64()).unwrap_or(3600);

    Ok(AppRoleLoginResult { client_token, lease_duration: Duration::from_secs(lease_duration_secs) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn set_token_replaces_the_stored_token() {
        let client = VaultClient::new("http://vault:8200".to_string(), "initial".to_string());
        assert_eq!(client.current_token(), "initial");
        client.set_token("rotated".to_string());
        assert_eq!(client.current_token(), "rotated");
    }

    #[tokio::test]
    async fn kv2_get_extracts_the_nested_data_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/app/db"))
            .and(header("X-Vault-Token", "s.abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": {"data": {"username": "svc", "password": "hunter2"}, "metadata": {"version": 3}},
            })))
            .mount(&server)
            .await;

        let client = VaultClient::new(server.uri(), "s.abc".to_string());
        let data = client.kv2_get("secret", "app/db").await.unwrap();

        let Value::Object(m) = data else { panic!("expected an object") };
        assert_eq!(m.get("username"), Some(&Value::String("svc".to_string())));
        assert_eq!(m.get("password"), Some(&Value::String("hunter2".to_string())));
    }

    #[tokio::test]
    async fn kv2_get_surfaces_non_success_status_as_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = VaultClient::new(server.uri(), "s.abc".to_string());
        assert!(client.kv2_get("secret", "missing").await.is_err());
    }

    #[tokio::test]
    async fn app_role_login_returns_client_token_and_lease_duration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/auth/approle/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "auth": {"client_token": "s.renewed", "lease_duration": 1800},
            })))
            .mount(&server)
            .await;

        let http = reqwest::Client::new();
        let result = app_role_login(&http, &server.uri(), "role-1", "secret-1").await.unwrap();
        assert_eq!(result.client_token, "s.renewed");
        assert_eq!(result.lease_duration, Duration::from_secs(1800));
    }
}
