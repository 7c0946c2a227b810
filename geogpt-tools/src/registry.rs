//! Runtime registry for tool metadata and execution.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Result alias for tool operations.
pub type ToolResult<T> = Result<T, ToolError>;

/// Future alias produced by generated tool bindings.
pub type ToolFuture = Pin<Box<dyn Future<Output = ToolResult<Value>> + Send>>;

/// Shared handle to a registered callable.
pub type ToolFn = Arc<dyn Tool>;

/// Trait implemented by tool executors.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Invokes the tool with the given JSON input, returning JSON output.
    async fn invoke(&self, input: Value) -> ToolResult<Value>;
}

#[async_trait]
impl<F, Fut> Tool for F
where
    F: Send + Sync + Fn(Value) -> Fut,
    Fut: Future<Output = ToolResult<Value>> + Send,
{
    async fn invoke(&self, input: Value) -> ToolResult<Value> {
        (self)(input).await
    }
}

/// Metadata stored for every registered function.
///
/// The registry keeps a shared handle to the callable; cloning metadata clones
/// the handle, never the callable itself, so [`FunctionMetadata::func`] is
/// pointer-equal to whatever was registered.
#[derive(Clone)]
pub struct FunctionMetadata {
    name: String,
    description: String,
    func: ToolFn,
    inputs: Vec<String>,
    outputs: Vec<String>,
    tags: BTreeSet<String>,
}

impl FunctionMetadata {
    /// Creates metadata for `func` under `name` with every descriptive field empty.
    #[must_use]
    pub fn new(name: impl Into<String>, func: ToolFn) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            func,
            inputs: Vec::new(),
            outputs: Vec::new(),
            tags: BTreeSet::new(),
        }
    }

    /// Sets the human-readable description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the declared input names.
    #[must_use]
    pub fn with_inputs<I, S>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.inputs = inputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the declared output names.
    #[must_use]
    pub fn with_outputs<I, S>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.outputs = outputs.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the tags used for categorical lookup.
    #[must_use]
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Returns the registry key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the description, possibly empty.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the shared handle to the callable.
    #[must_use]
    pub fn func(&self) -> &ToolFn {
        &self.func
    }

    /// Returns the declared input names.
    #[must_use]
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Returns the declared output names.
    #[must_use]
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Returns the tag set.
    #[must_use]
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Returns `true` if the entry carries `tag` (exact, case-sensitive).
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Invokes the underlying callable.
    ///
    /// # Errors
    ///
    /// Propagates whatever error the callable returns.
    pub async fn invoke(&self, input: Value) -> ToolResult<Value> {
        self.func.invoke(input).await
    }

    /// Returns a serialisable description of this entry.
    #[must_use]
    pub fn descriptor(&self) -> FunctionDescriptor {
        FunctionDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
            tags: self.tags.clone(),
        }
    }
}

impl fmt::Debug for FunctionMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionMetadata")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("tags", &self.tags)
            .finish_non_exhaustive()
    }
}

/// Callable-free view of [`FunctionMetadata`] suitable for listing and export.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionDescriptor {
    /// Registry key.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Declared input names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<String>,
    /// Declared output names.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<String>,
    /// Tags used for categorical lookup.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

/// Registry that maps function names to their metadata.
///
/// Registering a name that already exists replaces the previous entry. Entries
/// are never removed. None of the operations fail: a poisoned lock is
/// recovered because every write leaves the map consistent.
#[derive(Default)]
pub struct FunctionRegistry {
    inner: RwLock<BTreeMap<String, FunctionMetadata>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("registered", &self.names())
            .finish()
    }
}

impl FunctionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry pre-populated with every function annotated with
    /// [`register_function`](crate::register_function) in the final binary.
    #[must_use]
    pub fn with_collected() -> Self {
        let registry = Self::new();
        registry.register_collected();
        registry
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, FunctionMetadata>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, FunctionMetadata>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `func` under `name`, replacing any previous entry with that name.
    pub fn register<I, O, T, S1, S2, S3>(
        &self,
        func: ToolFn,
        name: impl Into<String>,
        description: impl Into<String>,
        inputs: I,
        outputs: O,
        tags: T,
    ) where
        I: IntoIterator<Item = S1>,
        O: IntoIterator<Item = S2>,
        T: IntoIterator<Item = S3>,
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        self.register_metadata(
            FunctionMetadata::new(name, func)
                .with_description(description)
                .with_inputs(inputs)
                .with_outputs(outputs)
                .with_tags(tags),
        );
    }

    /// Registers a pre-built entry keyed by its own name.
    pub fn register_metadata(&self, metadata: FunctionMetadata) {
        let name = metadata.name.clone();
        let previous = self.write().insert(name.clone(), metadata);
        if previous.is_some() {
            warn!(function = %name, "function re-registered; previous entry replaced");
        } else {
            debug!(function = %name, "function registered");
        }
    }

    /// Registers every definition-site registration collected at link time.
    ///
    /// Returns the number of registrations applied.
    pub fn register_collected(&self) -> usize {
        let mut applied = 0;
        for registration in crate::macros::collected() {
            self.register_metadata(registration.to_metadata());
            applied += 1;
        }
        applied
    }

    /// Returns the entry registered under `name`, if any.
    #[must_use]
    pub fn get_function(&self, name: &str) -> Option<FunctionMetadata> {
        self.read().get(name).cloned()
    }

    /// Returns a snapshot of every registered entry keyed by name.
    #[must_use]
    pub fn get_all_functions(&self) -> BTreeMap<String, FunctionMetadata> {
        self.read().clone()
    }

    /// Returns every entry tagged with `tag`, ordered by name.
    #[must_use]
    pub fn get_functions_by_tag(&self, tag: &str) -> Vec<FunctionMetadata> {
        self.read()
            .values()
            .filter(|metadata| metadata.has_tag(tag))
            .cloned()
            .collect()
    }

    /// Returns the registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    /// Returns the number of distinct names registered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Invokes a registered function directly.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] when the function is not found or
    /// propagates the error returned by the implementation.
    pub async fn invoke(&self, name: &str, input: Value) -> ToolResult<Value> {
        let metadata = self
            .get_function(name)
            .ok_or_else(|| ToolError::UnknownTool {
                name: name.to_owned(),
            })?;
        debug!(function = %name, "invoking function");
        metadata.invoke(input).await
    }
}

/// Errors produced by tool invocation.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Requested tool does not exist.
    #[error("tool `{name}` is not registered")]
    UnknownTool {
        /// Name of the missing tool.
        name: String,
    },

    /// Tool input could not be interpreted.
    #[error("invalid arguments for `{tool}`: {reason}")]
    InvalidArguments {
        /// Name of the tool that rejected its input.
        tool: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Tool execution failed.
    #[error("tool execution failed: {reason}")]
    Execution {
        /// Human-readable error returned by the tool implementation.
        reason: String,
    },
}

impl ToolError {
    /// Creates an execution error from the supplied reason.
    #[must_use]
    pub fn execution(reason: impl Into<String>) -> Self {
        Self::Execution {
            reason: reason.into(),
        }
    }

    /// Creates an argument error for `tool`.
    #[must_use]
    pub fn invalid_arguments(tool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            tool: tool.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn echo() -> ToolFn {
        Arc::new(|input: Value| async move { Ok::<_, ToolError>(input) })
    }

    fn tagged(registry: &FunctionRegistry, name: &str, tags: &[&str]) {
        registry.register(
            echo(),
            name,
            "",
            Vec::<String>::new(),
            Vec::<String>::new(),
            tags.iter().copied(),
        );
    }

    #[test]
    fn register_preserves_every_field_and_identity() {
        let registry = FunctionRegistry::new();
        let func = echo();
        registry.register(
            Arc::clone(&func),
            "buffer",
            "Buffer a layer",
            ["layer", "distance"],
            ["buffered"],
            ["vector", "geometry"],
        );

        let metadata = registry.get_function("buffer").expect("registered");
        assert_eq!(metadata.name(), "buffer");
        assert_eq!(metadata.description(), "Buffer a layer");
        assert_eq!(metadata.inputs(), ["layer", "distance"]);
        assert_eq!(metadata.outputs(), ["buffered"]);
        assert!(metadata.has_tag("vector"));
        assert!(metadata.has_tag("geometry"));
        assert_eq!(metadata.tags().len(), 2);
        assert!(Arc::ptr_eq(metadata.func(), &func));
    }

    #[test]
    fn duplicate_registration_overwrites() {
        let registry = FunctionRegistry::new();
        let first = echo();
        let second = echo();
        registry.register(
            Arc::clone(&first),
            "clip",
            "first",
            ["a"],
            ["b"],
            ["old"],
        );
        registry.register(
            Arc::clone(&second),
            "clip",
            "second",
            Vec::<String>::new(),
            Vec::<String>::new(),
            ["new"],
        );

        let metadata = registry.get_function("clip").expect("registered");
        assert_eq!(metadata.description(), "second");
        assert!(metadata.inputs().is_empty());
        assert!(metadata.outputs().is_empty());
        assert!(!metadata.has_tag("old"));
        assert!(metadata.has_tag("new"));
        assert!(Arc::ptr_eq(metadata.func(), &second));
        assert!(!Arc::ptr_eq(metadata.func(), &first));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_name_is_absent() {
        let registry = FunctionRegistry::new();
        assert!(registry.get_function("missing").is_none());
        tagged(&registry, "present", &[]);
        assert!(registry.get_function("Present").is_none());
    }

    #[test]
    fn tag_lookup_returns_exact_matches() {
        let registry = FunctionRegistry::new();
        tagged(&registry, "a", &["geo"]);
        tagged(&registry, "b", &["geo", "vector-ish"]);
        tagged(&registry, "c", &["raster"]);

        let geo: Vec<_> = registry
            .get_functions_by_tag("geo")
            .iter()
            .map(|m| m.name().to_owned())
            .collect();
        assert_eq!(geo, ["a", "b"]);

        let raster = registry.get_functions_by_tag("raster");
        assert_eq!(raster.len(), 1);
        assert_eq!(raster[0].name(), "c");

        assert!(registry.get_functions_by_tag("vector").is_empty());
        assert!(registry.get_functions_by_tag("GEO").is_empty());
    }

    #[test]
    fn all_functions_counts_distinct_names() {
        let registry = FunctionRegistry::new();
        assert!(registry.is_empty());
        tagged(&registry, "a", &[]);
        tagged(&registry, "b", &[]);
        tagged(&registry, "a", &["again"]);

        let all = registry.get_all_functions();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|(key, metadata)| key == metadata.name()));
    }

    #[test]
    fn duplicate_tags_collapse() {
        let registry = FunctionRegistry::new();
        tagged(&registry, "a", &["geo", "geo"]);
        let metadata = registry.get_function("a").expect("registered");
        assert_eq!(metadata.tags().len(), 1);
    }

    #[test]
    fn descriptor_omits_empty_fields() {
        let metadata = FunctionMetadata::new("noop", echo()).with_tags(["misc"]);
        let value = serde_json::to_value(metadata.descriptor()).unwrap();
        assert_eq!(value, json!({ "name": "noop", "tags": ["misc"] }));
    }

    #[tokio::test]
    async fn invoke_dispatches_to_registered_callable() {
        let registry = FunctionRegistry::new();
        tagged(&registry, "echo", &[]);

        let payload = json!({ "message": "hello" });
        let output = registry.invoke("echo", payload.clone()).await.unwrap();
        assert_eq!(output, payload);
    }

    #[tokio::test]
    async fn unknown_tool_errors() {
        let registry = FunctionRegistry::new();
        let err = registry
            .invoke("missing", Value::Null)
            .await
            .expect_err("unknown tool should error");

        assert!(matches!(err, ToolError::UnknownTool { name } if name == "missing"));
    }

    #[test]
    fn registry_is_shareable_across_threads() {
        let registry = Arc::new(FunctionRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || tagged(&registry, &format!("f{i}"), &["shared"]))
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.get_functions_by_tag("shared").len(), 8);
    }
}
