//! Document-store `find` / `find_one` — §4.4 "Per-backend specifics".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bson::{Bson, Document};
use ext_core::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use ext_core::validate;
use ext_core::{ExtError, Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};
use mongodb::options::{Credential, FindOneOptions, FindOptions};
use mongodb::Client;
use sha2::{Digest, Sha256};

use crate::pool::document::{self, DocumentStoreKey, DocumentStorePool};

fn credential_fingerprint(auth: &ValueMap) -> String {
    let mut hasher = Sha256::new();
    for (k, v) in auth {
        hasher.update(k.as_bytes());
        hasher.update(v.as_str().unwrap_or_default().as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

fn value_to_document(value: &Value) -> Result<Document, ExtError> {
    let json: serde_json::Value = value.into();
    bson::to_document(&json).map_err(|e| ExtError::internal(format!("converting to BSON: {e}")))
}

/// `options`' keys arrive snake_case (the host convention) and must be
/// converted to camelCase before they mean anything to the driver's option
/// structs (§4.4).
fn snake_to_camel(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut upper_next = false;
    for ch in s.chars() {
        if ch == '_' {
            upper_next = true;
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

fn camel_options(options: &ValueMap) -> ValueMap {
    options.iter().map(|(k, v)| (snake_to_camel(k), v.clone())).collect()
}

/// Converts the camelCased `options` map into the driver's option struct via
/// its own `Deserialize` impl — the same round trip `value_to_document`
/// already does for `filter`, just landing on a typed struct instead of a
/// bare `Document` (§4.4 "converted...before binding to the driver option
/// structure").
fn build_find_options(options: &ValueMap) -> Result<FindOptions, ExtError> {
    if options.is_empty() {
        return Ok(FindOptions::default());
    }
    let doc = value_to_document(&Value::Object(camel_options(options)))?;
    bson::from_document(doc).map_err(|e| ExtError::internal(format!("decoding find options: {e}")))
}

fn build_find_one_options(options: &ValueMap) -> Result<FindOneOptions, ExtError> {
    if options.is_empty() {
        return Ok(FindOneOptions::default());
    }
    let doc = value_to_document(&Value::Object(camel_options(options)))?;
    bson::from_document(doc).map_err(|e| ExtError::internal(format!("decoding find_one options: {e}")))
}

fn document_to_value(doc: &Document, canonical: bool) -> Value {
    let json = if canonical {
        Bson::Document(doc.clone()).into_canonical_extjson()
    } else {
        Bson::Document(doc.clone()).into_relaxed_extjson()
    };
    Value::from(&json)
}

async fn client_for(pool: &DocumentStorePool, uri: &str, auth: &ValueMap) -> Result<Arc<Client>, ExtError> {
    let key = DocumentStoreKey { uri: uri.to_string(), credential_fingerprint: credential_fingerprint(auth) };
    let uri_owned = uri.to_string();
    let credential = if auth.is_empty() {
        None
    } else {
        let mut builder = Credential::builder();
        if let Some(username) = auth.get("username").and_then(Value::as_str) {
            builder = builder.username(username.to_string());
        }
        if let Some(password) = auth.get("password").and_then(Value::as_str) {
            builder = builder.password(password.to_string());
        }
        Some(builder.build())
    };

    pool.get_or_construct(key, move || async move {
        document::connect(&uri_owned, credential).await.map_err(|e| BuiltinError::new("document-store", format!("connecting: {e}"), SourceLocation::unknown()).into())
    })
    .await
}

#[derive(Default)]
pub struct MongoFindExecutor {
    pool: DocumentStorePool,
}

impl MongoFindExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for MongoFindExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("find expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "document.find",
            raw_request,
            &["uri", "database", "collection", "filter", "auth", "options", "canonical", "cache", "cache_duration", "raise_error"],
            &["uri", "database", "collection", "filter"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(60)),
            |_validated| async move {
                let uri = validate::get_string("document.find", raw_request, "uri", &location)?;
                let database = validate::get_string("document.find", raw_request, "database", &location)?;
                let collection = validate::get_string("document.find", raw_request, "collection", &location)?;
                let filter_value = raw_request.get("filter").cloned().unwrap_or(Value::Object(ValueMap::new()));
                let canonical = validate::get_bool_or("document.find", raw_request, "canonical", false, &location)?;
                let auth = validate::get_object_or("document.find", raw_request, "auth", &ValueMap::new(), &location)?.clone();
                let options = validate::get_object_or("document.find", raw_request, "options", &ValueMap::new(), &location)?;
                let find_options = build_find_options(options)?;

                let client = client_for(&self.pool, &uri, &auth).await?;
                let filter = value_to_document(&filter_value)?;
                let coll = client.database(&database).collection::<Document>(&collection);

                let mut cursor = coll
                    .find(filter)
                    .with_options(find_options)
                    .await
                    .map_err(|e| BuiltinError::new("document.find", format!("find failed: {e}"), location.clone()))?;

                let mut results = Vec::new();
                while cursor.advance().await.map_err(|e| BuiltinError::new("document.find", format!("cursor error: {e}"), location.clone()))? {
                    let doc = cursor.deserialize_current().map_err(|e| BuiltinError::new("document.find", format!("decoding document: {e}"), location.clone()))?;
                    results.push(document_to_value(&doc, canonical));
                }

                let mut out = ValueMap::new();
                out.insert("results".to_string(), Value::Array(results));
                Ok(Value::Object(out))
            },
        )
        .await
    }
}

#[derive(Default)]
pub struct MongoFindOneExecutor {
    pool: DocumentStorePool,
}

impl MongoFindOneExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for MongoFindOneExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("find_one expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "document.find_one",
            raw_request,
            &["uri", "database", "collection", "filter", "auth", "options", "canonical", "cache", "cache_duration", "raise_error"],
            &["uri", "database", "collection", "filter"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(60)),
            |_validated| async move {
                let uri = validate::get_string("document.find_one", raw_request, "uri", &location)?;
                let database = validate::get_string("document.find_one", raw_request, "database", &location)?;
                let collection = validate::get_string("document.find_one", raw_request, "collection", &location)?;
                let filter_value = raw_request.get("filter").cloned().unwrap_or(Value::Object(ValueMap::new()));
                let canonical = validate::get_bool_or("document.find_one", raw_request, "canonical", false, &location)?;
                let auth = validate::get_object_or("document.find_one", raw_request, "auth", &ValueMap::new(), &location)?.clone();
                let options = validate::get_object_or("document.find_one", raw_request, "options", &ValueMap::new(), &location)?;
                let find_one_options = build_find_one_options(options)?;

                let client = client_for(&self.pool, &uri, &auth).await?;
                let filter = value_to_document(&filter_value)?;
                let coll = client.database(&database).collection::<Document>(&collection);

                let found = coll
                    .find_one(filter)
                    .with_options(find_one_options)
                    .await
                    .map_err(|e| BuiltinError::new("document.find_one", format!("find_one failed: {e}"), location.clone()))?;

                let mut out = ValueMap::new();
                if let Some(doc) = found {
                    out.insert("results".to_string(), document_to_value(&doc, canonical));
                }
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
    fn snake_to_camel_converts_each_underscore_boundary() {
        assert_eq!(snake_to_camel("max_time_ms"), "maxTimeMs");
        assert_eq!(snake_to_camel("limit"), "limit");
    }

    #[test]
    fn fingerprint_is_stable_for_the_same_auth_object() {
        let mut auth = ValueMap::new();
        auth.insert("username".to_string(), Value::String("u".to_string()));
        auth.insert("password".to_string(), Value::String("p".to_string()));
        assert_eq!(credential_fingerprint(&auth), credential_fingerprint(&auth));
    }
}
