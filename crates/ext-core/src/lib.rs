//! Shared core of the external-resource builtin framework: the value
//! bridge, request validator, cache substrate, UCAST translator, builtin
//! kernel, and registry. Backend-specific builtins (SQL, DynamoDB, Mongo,
//! Redis, Neo4j, Vault) live in `ext-db`/`ext-secrets` and are built on top
//! of the seams this crate defines.

pub mod cache;
pub mod capability;
pub mod kernel;
pub mod registry;
pub mod rego_eval;
pub mod ucast;
pub mod validate;
pub mod value;

pub use ext_error::ExtError;
pub use kernel::{BuiltinContext, CacheOptions, Executor, MetricsSink, NoopMetrics};
pub use registry::{BuiltinDeclaration, BuiltinRegistry, DocCategory};
pub use value::{Number, Value, ValueMap};

use std::sync::Arc;

/// Registers the two UCAST builtins, which need no host collaborator
/// (unlike `rego.eval`, which needs a [`rego_eval::ModuleCompiler`] supplied
/// by the embedding application).
pub fn register_ucast_executors(registry: &mut BuiltinRegistry) {
    registry.register_executor("ucast.expand", Arc::new(ucast::UcastExpandExecutor));
    registry.register_executor("ucast.as_sql", Arc::new(ucast::UcastAsSqlExecutor));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_ucast_executors_wires_both_builtins() {
        let mut registry = BuiltinRegistry::new();
        register_ucast_executors(&mut registry);
        assert!(registry.executor("ucast.expand").is_some());
        assert!(registry.executor("ucast.as_sql").is_some());
    }
}
