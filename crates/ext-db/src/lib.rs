//! SQL, DynamoDB, document-store, key-value, and graph-database builtins
//! built on `ext-core`'s kernel and cache substrate.

pub mod builtins;
pub mod pool;

use std::sync::Arc;

use ext_core::registry::BuiltinRegistry;

/// Registers every backend builtin this crate provides into `registry`.
/// Declarations are left to the umbrella crate (`rego-ext`), which owns the
/// full catalogue including `rego.eval` and the UCAST helpers.
pub fn register_executors(registry: &mut BuiltinRegistry) {
    registry.register_executor("sql.send", Arc::new(builtins::sql::SqlExecutor::new()));
    registry.register_executor("dynamodb.get", Arc::new(builtins::dynamodb::DynamoDbGetExecutor::new()));
    registry.register_executor("dynamodb.query", Arc::new(builtins::dynamodb::DynamoDbQueryExecutor::new()));
    registry.register_executor("document.find", Arc::new(builtins::mongo::MongoFindExecutor::new()));
    registry.register_executor("document.find_one", Arc::new(builtins::mongo::MongoFindOneExecutor::new()));
    registry.register_executor("redis.query", Arc::new(builtins::redis::RedisExecutor::new()));
    registry.register_executor("neo4j.query", Arc::new(builtins::neo4j::Neo4jExecutor::new()));
}
