//! `rego.eval` — the nested rule-language evaluator builtin (§4.4).
//!
//! The rule-language compiler and VM are the host's responsibility (out of
//! scope here, per `spec.md`'s framing: this crate is the *extension*
//! framework, not the engine itself). What belongs here is the per-query
//! compilation cache: a second invocation within the same evaluation that
//! supplies the identical `module` source reuses the already-compiled
//! artifact instead of recompiling it.
//!
//! Per `spec.md` §9 Open Questions, the compilation cache is per-query
//! only — it is discarded with the evaluation, never promoted to the
//! cross-query cache. The *evaluated result* goes through the ordinary
//! kernel cache substrate like any other builtin (§4.4: "Cross-query
//! caching applies to the evaluated result, not the compilation").

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ext_error::{CompilationError, ExtError, SourceLocation};
use parking_lot::Mutex;

use crate::kernel::{run_builtin, BuiltinContext, CacheOptions, Executor};
use crate::validate;
use crate::value::{Value, ValueMap};

/// A module compiled from source text, ready to evaluate against input.
/// Implemented by the host's rule-language VM.
pub trait CompiledModule: Send + Sync {
    fn evaluate(&self, path: &str, input: &Value) -> Result<Value, ExtError>;
}

/// The host collaborator that turns module source into a [`CompiledModule`].
#[async_trait]
pub trait ModuleCompiler: Send + Sync {
    async fn compile(&self, module: &str, location: &SourceLocation) -> Result<Arc<dyn CompiledModule>, ExtError>;
}

/// Per-evaluation cache from module source text to its compiled artifact.
/// Lives alongside `BuiltinContext::per_query` but is keyed by raw source
/// rather than a `CacheKey`, since compilation has nothing to do with the
/// request/response cache substrate.
#[derive(Default)]
pub struct CompilationCache {
    compiled: Mutex<HashMap<String, Arc<dyn CompiledModule>>>,
}

impl CompilationCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn get_or_compile(
        &self,
        module: &str,
        compiler: &dyn ModuleCompiler,
        location: &SourceLocation,
    ) -> Result<Arc<dyn CompiledModule>, ExtError> {
        if let Some(existing) = self.compiled.lock().get(module) {
            return Ok(existing.clone());
        }
        let compiled = compiler.compile(module, location).await?;
        self.compiled.lock().insert(module.to_string(), compiled.clone());
        Ok(compiled)
    }
}

pub struct RegoEvalExecutor {
    pub compiler: Arc<dyn ModuleCompiler>,
    pub compilation_cache: CompilationCache,
    pub default_ttl: std::time::Duration,
}

#[async_trait]
impl Executor for RegoEvalExecutor {
    async fn execute(&self, request: &Value, ctx: &BuiltinContext) -> Result<Value, ExtError> {
        let Value::Object(raw_request) = request else {
            return Err(ExtError::internal("rego.eval expects an object request"));
        };
        let location = SourceLocation::unknown();

        run_builtin(
            "rego.eval",
            raw_request,
            &["path", "module", "input", "cache", "cache_duration", "raise_error"],
            &["path"],
            &location,
            ctx,
            CacheOptions::with_default_ttl(self.default_ttl),
            |_validated| async move {
                let path = validate::get_string("rego.eval", raw_request, "path", &location)?;
                let module = validate::get_string_or("rego.eval", raw_request, "module", "", &location)?;
                let input = raw_request.get("input").cloned().unwrap_or(Value::Null);

                if module.is_empty() {
                    return Err(CompilationError::new("rego.eval", "no module source supplied for an ad-hoc evaluation").into());
                }

                let compiled = self.compilation_cache.get_or_compile(&module, self.compiler.as_ref(), &location).await?;
                let result = compiled.evaluate(&path, &input)?;

                let mut response = ValueMap::new();
                response.insert("result".to_string(), result);
                Ok(Value::Object(response))
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CrossQueryCacheConfig, LruCrossQueryCache};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct EchoModule;
    impl CompiledModule for EchoModule {
        fn evaluate(&self, _path: &str, input: &Value) -> Result<Value, ExtError> {
            Ok(input.clone())
        }
    }

    struct CountingCompiler {
        compiles: AtomicUsize,
    }

    #[async_trait]
    impl ModuleCompiler for CountingCompiler {
        async fn compile(&self, _module: &str, _location: &SourceLocation) -> Result<Arc<dyn CompiledModule>, ExtError> {
            self.compiles.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EchoModule))
        }
    }

    #[tokio::test]
    async fn repeated_identical_module_compiles_once() {
        let compiler = Arc::new(CountingCompiler { compiles: AtomicUsize::new(0) });
        let executor = RegoEvalExecutor {
            compiler: compiler.clone(),
            compilation_cache: CompilationCache::new(),
            default_ttl: std::time::Duration::from_secs(60),
        };
        let ctx = BuiltinContext::new(Arc::new(LruCrossQueryCache::new(CrossQueryCacheConfig::default())), 0);

        let request_a = Value::from(json!({"path": "data.x.allow", "module": "package x\nallow = true", "input": {"a": 1}}));
        let request_b = Value::from(json!({"path": "data.x.allow", "module": "package x\nallow = true", "input": {"a": 2}}));

        executor.execute(&request_a, &ctx).await.unwrap();
        executor.execute(&request_b, &ctx).await.unwrap();

        assert_eq!(compiler.compiles.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_module_source_is_a_compilation_error() {
        let compiler = Arc::new(CountingCompiler { compiles: AtomicUsize::new(0) });
        let executor = RegoEvalExecutor {
            compiler,
            compilation_cache: CompilationCache::new(),
            default_ttl: std::time::Duration::from_secs(60),
        };
        let ctx = BuiltinContext::new(Arc::new(LruCrossQueryCache::new(CrossQueryCacheConfig::default())), 0);

        let request = Value::from(json!({"path": "data.x.allow"}));
        let err = executor.execute(&request, &ctx).await.unwrap_err();
        assert!(matches!(err, ExtError::Compilation(_)));
    }
}
