//! `rego-ext` — the external-resource builtin framework (spec.md §1-§2):
//! request validation, the two-tier cache substrate, client pools, the
//! builtin kernel, the UCAST-to-SQL translator, and the registry that binds
//! every concrete builtin (SQL, DynamoDB, document store, key-value store,
//! graph database, Vault, the nested rule-language evaluator) into the
//! host's dispatch table.
//!
//! Feature-gated the way the teacher's own umbrella crate bundles its
//! optional components: `db` and `secrets` are on by default, `observers`
//! (with its `metrics` sub-feature) opt-in, `full` turns everything on,
//! `minimal` pulls in only the UCAST translator and rule-language evaluator.

#[cfg(feature = "db")]
pub use ext_db;
pub use ext_error;
#[cfg(feature = "observers")]
pub use ext_observers;
#[cfg(feature = "secrets")]
pub use ext_secrets;

use std::sync::Arc;
use std::time::Duration;

use ext_core::capability::{CapabilityTag, CapabilitySet};
use ext_core::registry::{BuiltinDeclaration, BuiltinRegistry, DocCategory};
use ext_core::rego_eval::{CompilationCache, ModuleCompiler, RegoEvalExecutor};

/// Binds every builtin this build was compiled with into one registry.
/// `rego.eval` needs a host-supplied [`ModuleCompiler`] (the rule-language
/// compiler lives outside this crate, per spec.md §1 "out of scope ...
/// the rule language parser/compiler, the rule VM itself"), so it is the
/// only executor threaded in from the caller rather than constructed here.
pub fn build_registry(rego_compiler: Arc<dyn ModuleCompiler>) -> BuiltinRegistry {
    let mut registry = BuiltinRegistry::new();

    for declaration in declarations() {
        registry.register_declaration(declaration);
    }

    ext_core::register_ucast_executors(&mut registry);

    registry.register_executor(
        "rego.eval",
        Arc::new(RegoEvalExecutor {
            compiler: rego_compiler,
            compilation_cache: CompilationCache::new(),
            default_ttl: Duration::from_secs(60),
        }),
    );

    #[cfg(feature = "db")]
    ext_db::register_executors(&mut registry);

    #[cfg(feature = "secrets")]
    ext_secrets::register_executors(&mut registry);

    registry
}

/// Every builtin's declaration (spec.md §4.6 "Declaration registration"),
/// independent of which executor features are compiled in — advertising a
/// declaration for a builtin whose executor feature is disabled just means
/// the capability descriptor lists it without the dispatch table backing
/// it, which the registry's `dispatch` already tolerates (`None` on a
/// missing executor).
pub fn declarations() -> Vec<BuiltinDeclaration> {
    vec![
        BuiltinDeclaration::new("sql.send", "rows", "query result rows, optionally keyed by column name", DocCategory::Sql)
            .with_argument("driver", "one of postgres, mysql, sqlite, sqlserver")
            .with_argument("data_source_name", "driver-specific connection string")
            .with_argument("query", "parameterized SQL text")
            .with_argument("args", "positional query parameters")
            .with_argument("row_object", "if true, each row is a column-name-keyed object instead of an array"),
        BuiltinDeclaration::new("dynamodb.get", "row", "a single item, or an empty object if not found", DocCategory::DynamoDb)
            .with_argument("region", "AWS region")
            .with_argument("table", "table name")
            .with_argument("key", "primary key attribute map"),
        BuiltinDeclaration::new("dynamodb.query", "rows", "paginated query results, all pages concatenated", DocCategory::DynamoDb)
            .with_argument("region", "AWS region")
            .with_argument("table", "table name")
            .with_argument("key_condition_expression", "DynamoDB key condition expression"),
        BuiltinDeclaration::new("document.find", "results", "matching documents", DocCategory::DocumentStore)
            .with_argument("uri", "MongoDB connection URI")
            .with_argument("database", "database name")
            .with_argument("collection", "collection name")
            .with_argument("filter", "query filter document"),
        BuiltinDeclaration::new("document.find_one", "results", "the first matching document, or an empty object", DocCategory::DocumentStore)
            .with_argument("uri", "MongoDB connection URI")
            .with_argument("database", "database name")
            .with_argument("collection", "collection name")
            .with_argument("filter", "query filter document"),
        BuiltinDeclaration::new("redis.query", "result", "the command's reply", DocCategory::KeyValueStore)
            .with_argument("addr", "host:port of the Redis server")
            .with_argument("command", "a read-only RESP command name")
            .with_argument("args", "command arguments"),
        BuiltinDeclaration::new("neo4j.query", "results", "query result rows", DocCategory::GraphDatabase)
            .with_argument("uri", "Bolt connection URI")
            .with_argument("query", "Cypher query text")
            .with_argument("parameters", "query parameters"),
        BuiltinDeclaration::new("vault.send", "data", "the requested KV v2 secret data", DocCategory::Vault)
            .with_argument("address", "Vault server address")
            .with_argument("kv2_get", "{mount_path, path} of the secret to fetch"),
        BuiltinDeclaration::new("rego.eval", "result", "the nested evaluation's result", DocCategory::RuleLanguage)
            .with_argument("path", "the rule path to evaluate")
            .with_argument("module", "optional ad-hoc module source text")
            .with_argument("input", "input document for the nested evaluation"),
        BuiltinDeclaration::new("ucast.expand", "conditions", "the canonical (fully expanded) UCAST condition tree", DocCategory::Utility)
            .with_argument("conditions", "a UCAST condition in concise or canonical form"),
        BuiltinDeclaration::new("ucast.as_sql", "sql", "a `WHERE ...` clause in the requested dialect", DocCategory::Utility)
            .with_argument("conditions", "a UCAST condition in concise or canonical form")
            .with_argument("dialect", "one of postgres, mysql, sqlite, sqlserver")
            .with_argument("translations", "table/column identifier rewrite map"),
    ]
}

/// The capability tags this build advertises (spec.md §6 "Capabilities
/// advertisement"), independent of the registry's own per-builtin
/// declarations.
pub fn default_capabilities() -> CapabilitySet {
    let mut tags = CapabilitySet::new();
    for tag in [
        CapabilityTag::BjsonBundle,
        CapabilityTag::GrpcService,
        CapabilityTag::KafkaDataPlugin,
        CapabilityTag::GitDataPlugin,
        CapabilityTag::LdapDataPlugin,
        CapabilityTag::S3DataPlugin,
        CapabilityTag::OktaDataPlugin,
        CapabilityTag::HttpDataPlugin,
        CapabilityTag::LiaPlugin,
    ] {
        tags.insert(tag);
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use ext_core::rego_eval::CompiledModule;
    use ext_core::ExtError;
    use ext_error::SourceLocation;

    struct NeverCompiles;

    #[async_trait]
    impl ModuleCompiler for NeverCompiles {
        async fn compile(&self, _module: &str, _location: &SourceLocation) -> Result<Arc<dyn CompiledModule>, ExtError> {
            Err(ExtError::internal("no compiler wired for this test"))
        }
    }

    #[test]
    fn build_registry_wires_every_declared_builtin_with_an_executor() {
        let registry = build_registry(Arc::new(NeverCompiles));
        for declaration in declarations() {
            assert!(registry.executor(declaration.name).is_some(), "missing executor for {}", declaration.name);
        }
    }

    #[test]
    fn default_capabilities_includes_every_spec_tag() {
        let caps = default_capabilities();
        assert_eq!(caps.as_strings().len(), 9);
    }
}
