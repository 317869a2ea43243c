//! `dynamodb.get` and `dynamodb.query` — §4.4 "Per-backend specifics".

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use ext_core::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use ext_core::validate;
use ext_core::{ExtError, Value, ValueMap};
use ext_error::{BuiltinError, SourceLocation};

use crate::pool::dynamodb::{self, DynamoDbKey, DynamoDbPool};

fn attribute_value_from(value: &Value) -> Result<AttributeValue, ExtError> {
    let Value::Object(m) = value else {
        return Err(ExtError::internal("dynamodb attribute value must be an object with one AWS type tag"));
    };
    let (tag, inner) = m
        .iter()
        .next()
        .ok_or_else(|| ExtError::internal("dynamodb attribute value object must not be empty"))?;
    Ok(match tag.as_str() {
        "S" => AttributeValue::S(inner.as_str().unwrap_or_default().to_string()),
        "N" => AttributeValue::N(inner.as_str().map(str::to_string).unwrap_or_else(|| {
            inner.as_number().map(|n| n.literal().to_string()).unwrap_or_default()
        })),
        "BOOL" => AttributeValue::Bool(inner.as_bool().unwrap_or(false)),
        "NULL" => AttributeValue::Null(true),
        "SS" => AttributeValue::Ss(string_list(inner)),
        "NS" => AttributeValue::Ns(string_list(inner)),
        "L" => AttributeValue::L(match inner {
            Value::Array(items) => items.iter().map(attribute_value_from).collect::<Result<_, _>>()?,
            _ => Vec::new(),
        }),
        "M" => AttributeValue::M(object_to_attribute_map(inner)?),
        other => return Err(ExtError::internal(format!("unsupported DynamoDB attribute tag '{other}'"))),
    })
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn object_to_attribute_map(value: &Value) -> Result<std::collections::HashMap<String, AttributeValue>, ExtError> {
    let Value::Object(m) = value else {
        return Ok(std::collections::HashMap::new());
    };
    m.iter().map(|(k, v)| Ok((k.clone(), attribute_value_from(v)?))).collect()
}

fn attribute_value_to_value(av: &AttributeValue) -> Value {
    match av {
        AttributeValue::S(s) => Value::String(s.clone()),
        AttributeValue::N(n) => Value::Number(ext_core::Number::parse(n.clone())),
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::Ss(items) => Value::Array(items.iter().cloned().map(Value::String).collect()),
        AttributeValue::Ns(items) => Value::Array(items.iter().cloned().map(ext_core::Number::parse).map(Value::Number).collect()),
        AttributeValue::L(items) => Value::Array(items.iter().map(attribute_value_to_value).collect()),
        AttributeValue::M(m) => {
            let mut out = ValueMap::new();
            for (k, v) in m {
                out.insert(k.clone(), attribute_value_to_value(v));
            }
            Value::Object(out)
        }
        _ => Value::Null,
    }
}

fn item_to_value(item: &std::collections::HashMap<String, AttributeValue>) -> Value {
    let mut out = ValueMap::new();
    for (k, v) in item {
        out.insert(k.clone(), attribute_value_to_value(v));
    }
    Value::Object(out)
}

fn pool_key(raw_request: &ValueMap, region: &str, location: &SourceLocation) -> Result<DynamoDbKey, ExtError> {
    let endpoint = match raw_request.get("endpoint") {
        Some(Value::String(s)) => Some(s.clone()),
        None | Some(Value::Null) => None,
        Some(other) => {
            return Err(ext_error::TypeError::WrongType {
                builtin: "dynamodb".to_string(),
                key: "endpoint".to_string(),
                expected: "string".to_string(),
                got: other.type_name().to_string(),
                location: location.clone(),
            }
            .into())
        }
    };
    let credentials = validate::get_object_or("dynamodb", raw_request, "credentials", &ValueMap::new(), location)?;
    let access_key = credentials.get("access_key").and_then(Value::as_str).map(str::to_string);
    let secret_key = credentials.get("secret_key").and_then(Value::as_str).map(str::to_string);
    let session_token = credentials.get("session_token").and_then(Value::as_str).map(str::to_string);

    Ok(DynamoDbKey { endpoint, region: region.to_string(), access_key, secret_key, session_token })
}

async fn client_for(pool: &DynamoDbPool, key: DynamoDbKey) -> Result<Arc<Client>, ExtError> {
    pool.get_or_construct(key.clone(), move || async move {
        dynamodb::connect(&key).await.map_err(|e| BuiltinError::new("dynamodb", format!("connecting: {e}"), SourceLocation::unknown()).into())
    })
    .await
}

#[derive(Default)]
pub struct DynamoDbGetExecutor {
    pool: DynamoDbPool,
}

impl DynamoDbGetExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for DynamoDbGetExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("dynamodb.get expects an object request"));
        };
        let location = SourceLocation::unknown();

        // Consistency-read caveat (§4.4): a strongly consistent read must
        // bypass cross-query reuse. Force `cache: false` into the effective
        // request whenever `consistent_read` is set, rather than trusting
        // the caller to remember to pass it — the kernel has no per-field
        // cache-bypass hook of its own, so this is the only place the rule
        // can be enforced.
        let mut effective_request = raw_request.clone();
        if matches!(raw_request.get("consistent_read"), Some(Value::Bool(true))) {
            effective_request.insert("cache".to_string(), Value::Bool(false));
        }
        let raw_request = &effective_request;

        run_builtin(
            "dynamodb.get",
            raw_request,
            &["region", "table", "key", "endpoint", "credentials", "consistent_read", "cache", "cache_duration", "raise_error"],
            &["region", "table", "key"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(60)),
            |_validated| async move {
                let region = validate::get_string("dynamodb.get", raw_request, "region", &location)?;
                let table = validate::get_string("dynamodb.get", raw_request, "table", &location)?;
                let key_obj = validate::get_object("dynamodb.get", raw_request, "key", &location)?;
                let consistent_read = validate::get_bool_or("dynamodb.get", raw_request, "consistent_read", false, &location)?;

                let key = pool_key(raw_request, &region, &location)?;
                let client = client_for(&self.pool, key).await?;

                let attribute_key = object_to_attribute_map(&Value::Object(key_obj.clone()))?;
                let response = client
                    .get_item()
                    .table_name(&table)
                    .set_key(Some(attribute_key))
                    .consistent_read(consistent_read)
                    .send()
                    .await
                    .map_err(|e| BuiltinError::new("dynamodb.get", format!("GetItem failed: {e}"), location.clone()))?;

                let mut out = ValueMap::new();
                if let Some(item) = response.item {
                    out.insert("row".to_string(), item_to_value(&item));
                }
                Ok(Value::Object(out))
            },
        )
        .await
    }
}

#[derive(Default)]
pub struct DynamoDbQueryExecutor {
    pool: DynamoDbPool,
}

impl DynamoDbQueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Executor for DynamoDbQueryExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("dynamodb.query expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "dynamodb.query",
            raw_request,
            &[
                "region",
                "table",
                "key_condition_expression",
                "exclusive_start_key",
                "expression_attribute_names",
                "expression_attribute_values",
                "index_name",
                "limit",
                "projection_expression",
                "scan_index_forward",
                "select",
                "endpoint",
                "credentials",
                "cache",
                "cache_duration",
                "raise_error",
            ],
            &["region", "table", "key_condition_expression"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(Duration::from_secs(60)),
            |_validated| async move {
                let region = validate::get_string("dynamodb.query", raw_request, "region", &location)?;
                let table = validate::get_string("dynamodb.query", raw_request, "table", &location)?;
                let key_condition = validate::get_string("dynamodb.query", raw_request, "key_condition_expression", &location)?;

                let key = pool_key(raw_request, &region, &location)?;
                let client = client_for(&self.pool, key).await?;

                let names = validate::get_object_or("dynamodb.query", raw_request, "expression_attribute_names", &ValueMap::new(), &location)?
                    .iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect::<std::collections::HashMap<_, _>>();

                let empty = ValueMap::new();
                let values_obj = validate::get_object_or("dynamodb.query", raw_request, "expression_attribute_values", &empty, &location)?;
                let values = object_to_attribute_map(&Value::Object(values_obj.clone()))?;

                let mut all_items = Vec::new();
                let mut exclusive_start_key = match raw_request.get("exclusive_start_key") {
                    Some(Value::Object(m)) => Some(object_to_attribute_map(&Value::Object(m.clone()))?),
                    _ => None,
                };

                loop {
                    let mut builder = client
                        .query()
                        .table_name(&table)
                        .key_condition_expression(&key_condition)
                        .set_expression_attribute_names(if names.is_empty() { None } else { Some(names.clone()) })
                        .set_expression_attribute_values(if values.is_empty() { None } else { Some(values.clone()) })
                        .set_exclusive_start_key(exclusive_start_key.clone());

                    if let Some(index_name) = raw_request.get("index_name").and_then(Value::as_str) {
                        builder = builder.index_name(index_name);
                    }
                    if let Some(projection) = raw_request.get("projection_expression").and_then(Value::as_str) {
                        builder = builder.projection_expression(projection);
                    }
                    if let Some(select) = raw_request.get("select").and_then(Value::as_str) {
                        builder = builder.select(aws_sdk_dynamodb::types::Select::from(select));
                    }
                    let limit = validate::get_int_or("dynamodb.query", raw_request, "limit", 0, &location)?;
                    if limit > 0 {
                        builder = builder.limit(limit as i32);
                    }
                    let scan_forward = validate::get_bool_or("dynamodb.query", raw_request, "scan_index_forward", true, &location)?;
                    builder = builder.scan_index_forward(scan_forward);

                    let page = builder.send().await.map_err(|e| BuiltinError::new("dynamodb.query", format!("Query failed: {e}"), location.clone()))?;
                    all_items.extend(page.items.unwrap_or_default());

                    exclusive_start_key = page.last_evaluated_key;
                    if exclusive_start_key.is_none() {
                        break;
                    }
                }

                let mut out = ValueMap::new();
                out.insert("rows".to_string(), Value::Array(all_items.iter().map(item_to_value).collect()));
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
    fn attribute_value_round_trips_a_string() {
        let value = Value::Object({
            let mut m = ValueMap::new();
            m.insert("S".to_string(), Value::String("x".to_string()));
            m
        });
        let av = attribute_value_from(&value).unwrap();
        assert_eq!(attribute_value_to_value(&av), Value::String("x".to_string()));
    }

    #[test]
    fn attribute_value_round_trips_a_number() {
        let value = Value::Object({
            let mut m = ValueMap::new();
            m.insert("N".to_string(), Value::String("42".to_string()));
            m
        });
        let av = attribute_value_from(&value).unwrap();
        assert_eq!(attribute_value_to_value(&av), Value::Number(ext_core::Number::from_i64(42)));
    }
}
