//! Compiled JSON Schema validators, shared across calls.

use jsonschema::{Draft, JSONSchema};
use lru::LruCache;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::{Error, ErrorContext, Result};

pub const DEFAULT_VALIDATOR_CACHE_SIZE: usize = 64;

/// LRU cache of compiled validators keyed by a SHA-256 of the canonical schema text.
///
/// Owned by the client and handed to each call through its context; nothing here is global.
pub struct ValidatorCache {
    cache: Mutex<LruCache<String, Arc<JSONSchema>>>,
}

impl std::fmt::Debug for ValidatorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidatorCache")
            .field("len", &self.len())
            .finish()
    }
}

impl ValidatorCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Cache key for a schema. Object keys are sorted first so equivalent documents share an entry.
    pub fn key_for(schema: &Value) -> String {
        let mut canonical = String::new();
        write_canonical(schema, &mut canonical);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    pub fn get_or_compile(&self, schema: &Value) -> Result<Arc<JSONSchema>> {
        let key = Self::key_for(schema);
        {
            let mut cache = self.lock()?;
            if let Some(compiled) = cache.get(&key) {
                return Ok(Arc::clone(compiled));
            }
        }

        let compiled = JSONSchema::options()
            .with_draft(Draft::Draft7)
            .compile(schema)
            .map_err(|e| {
                Error::schema_with_context(
                    format!("Failed to compile schema: {}", e),
                    ErrorContext::new().with_source("validator_cache"),
                )
            })?;
        let compiled = Arc::new(compiled);
        tracing::debug!(key = %key, "compiled response schema validator");
        self.lock()?.put(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, LruCache<String, Arc<JSONSchema>>>> {
        self.cache.lock().map_err(|_| {
            Error::configuration_with_context(
                "validator cache lock poisoned",
                ErrorContext::new().with_source("validator_cache"),
            )
        })
    }
}

impl Default for ValidatorCache {
    fn default() -> Self {
        Self::new(DEFAULT_VALIDATOR_CACHE_SIZE)
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[key.as_str()], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_ignores_property_order() {
        let a = json!({ "type": "object", "properties": { "a": { "type": "string" } } });
        let b = json!({ "properties": { "a": { "type": "string" } }, "type": "object" });
        assert_eq!(ValidatorCache::key_for(&a), ValidatorCache::key_for(&b));
    }

    #[test]
    fn test_compiled_validator_is_reused() {
        let cache = ValidatorCache::new(4);
        let schema = json!({ "type": "integer" });
        let first = cache.get_or_compile(&schema).unwrap();
        let second = cache.get_or_compile(&schema).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let cache = ValidatorCache::new(1);
        cache.get_or_compile(&json!({ "type": "string" })).unwrap();
        cache.get_or_compile(&json!({ "type": "number" })).unwrap();
        assert_eq!(cache.len(), 1);
    }
}
