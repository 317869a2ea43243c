//! Builtin Registry — §4.6.
//!
//! Two registrations per builtin: a *declaration* (name, argument/result
//! descriptions, nondeterministic flag, documentation category) consumed by
//! the engine's capability descriptor, and an *implementation* (the
//! executor) bound into the VM's dispatch table. Kept as two separate maps
//! rather than one, since a declaration can be advertised before its
//! executor is wired up (useful during incremental feature rollout).

use std::collections::BTreeMap;
use std::sync::Arc;

use ext_error::ExtError;

use crate::capability::CapabilitySet;
use crate::kernel::{BuiltinContext, Executor};
use crate::value::Value;

/// Documentation grouping shown alongside the builtin in generated docs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    Sql,
    DynamoDb,
    DocumentStore,
    KeyValueStore,
    GraphDatabase,
    Vault,
    RuleLanguage,
    Utility,
}

#[derive(Debug, Clone)]
pub struct ArgumentDoc {
    pub name: &'static str,
    pub description: &'static str,
}

/// Advertised to the engine's capability descriptor. Every builtin is
/// nondeterministic: results depend on external backend state and the
/// host's current-time field, so the compiler must never constant-fold a
/// call away (spec.md §4.6).
#[derive(Debug, Clone)]
pub struct BuiltinDeclaration {
    pub name: &'static str,
    pub arguments: Vec<ArgumentDoc>,
    pub result_name: &'static str,
    pub result_description: &'static str,
    pub nondeterministic: bool,
    pub doc_category: DocCategory,
}

impl BuiltinDeclaration {
    pub fn new(name: &'static str, result_name: &'static str, result_description: &'static str, doc_category: DocCategory) -> Self {
        Self {
            name,
            arguments: Vec::new(),
            result_name,
            result_description,
            nondeterministic: true,
            doc_category,
        }
    }

    pub fn with_argument(mut self, name: &'static str, description: &'static str) -> Self {
        self.arguments.push(ArgumentDoc { name, description });
        self
    }
}

/// Registers declarations (for capability reporting) and executors (for VM
/// dispatch). Populated once at startup, read-only thereafter (spec.md §5
/// "No global mutable state beyond the pools, the cross-query cache, and
/// the registry").
#[derive(Default)]
pub struct BuiltinRegistry {
    declarations: BTreeMap<&'static str, BuiltinDeclaration>,
    executors: BTreeMap<&'static str, Arc<dyn Executor>>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_declaration(&mut self, declaration: BuiltinDeclaration) {
        self.declarations.insert(declaration.name, declaration);
    }

    pub fn register_executor(&mut self, name: &'static str, executor: Arc<dyn Executor>) {
        self.executors.insert(name, executor);
    }

    pub fn declaration(&self, name: &str) -> Option<&BuiltinDeclaration> {
        self.declarations.get(name)
    }

    pub fn executor(&self, name: &str) -> Option<Arc<dyn Executor>> {
        self.executors.get(name).cloned()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &BuiltinDeclaration> {
        self.declarations.values()
    }

    /// Dispatch a call to a registered builtin by name. The caller is
    /// responsible for mapping an unknown name to a `TypeError` at the call
    /// site, since only it knows the requesting call's source location.
    pub async fn dispatch(&self, name: &str, request: &Value, ctx: &BuiltinContext) -> Option<Result<Value, ExtError>> {
        let executor = self.executor(name)?;
        Some(executor.execute(request, ctx).await)
    }

    pub fn capability_tags(&self, base: CapabilitySet) -> CapabilitySet {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_are_marked_nondeterministic_by_default() {
        let decl = BuiltinDeclaration::new("sql.send", "result", "query rows", DocCategory::Sql)
            .with_argument("query", "the SQL text to execute");
        assert!(decl.nondeterministic);
        assert_eq!(decl.arguments.len(), 1);
    }

    #[test]
    fn registry_round_trips_declarations() {
        let mut registry = BuiltinRegistry::new();
        registry.register_declaration(BuiltinDeclaration::new("redis.query", "result", "command reply", DocCategory::KeyValueStore));
        assert!(registry.declaration("redis.query").is_some());
        assert!(registry.declaration("unknown.thing").is_none());
    }
}
