//! `vault.send` — HashiCorp Vault builtin (spec.md §4.4, §6).

pub mod vault;

use std::sync::Arc;

use ext_core::registry::BuiltinRegistry;

pub fn register_executors(registry: &mut BuiltinRegistry) {
    registry.register_executor("vault.send", Arc::new(vault::builtin::VaultExecutor::new()));
}
