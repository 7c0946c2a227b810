//! Support code for the [`register_function`](crate::register_function) attribute.
//!
//! The attribute leaves the annotated function untouched and submits a
//! [`ToolRegistration`] to a link-time collection. Nothing is registered
//! anywhere until a [`FunctionRegistry`](crate::FunctionRegistry) asks for the
//! collected entries.

use std::sync::Arc;

use serde_json::Value;

use crate::registry::{FunctionMetadata, ToolError, ToolFuture, ToolResult};

/// Static description of a function annotated with `#[register_function]`.
#[derive(Debug, Clone, Copy)]
pub struct ToolRegistration {
    name: &'static str,
    description: &'static str,
    inputs: &'static [&'static str],
    outputs: &'static [&'static str],
    tags: &'static [&'static str],
    executor: fn(Value) -> ToolFuture,
}

impl ToolRegistration {
    /// Creates a registration. Called from macro-generated statics.
    #[must_use]
    pub const fn new(
        name: &'static str,
        description: &'static str,
        inputs: &'static [&'static str],
        outputs: &'static [&'static str],
        tags: &'static [&'static str],
        executor: fn(Value) -> ToolFuture,
    ) -> Self {
        Self {
            name,
            description,
            inputs,
            outputs,
            tags,
            executor,
        }
    }

    /// Returns the registry key.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the tags declared on the attribute.
    #[must_use]
    pub const fn tags(&self) -> &'static [&'static str] {
        self.tags
    }

    /// Builds registry metadata wrapping the generated executor.
    #[must_use]
    pub fn to_metadata(&self) -> FunctionMetadata {
        FunctionMetadata::new(self.name, Arc::new(self.executor))
            .with_description(self.description)
            .with_inputs(self.inputs.iter().copied())
            .with_outputs(self.outputs.iter().copied())
            .with_tags(self.tags.iter().copied())
    }
}

inventory::collect!(ToolRegistration);

/// Iterates every registration linked into the current binary, ordered by name.
pub fn collected() -> impl Iterator<Item = &'static ToolRegistration> {
    let mut registrations: Vec<_> = inventory::iter::<ToolRegistration>
        .into_iter()
        .collect();
    registrations.sort_by_key(|registration| registration.name);
    registrations.into_iter()
}

/// Runs a synchronous tool body on the blocking thread pool.
///
/// Generated executors for non-`async` functions route through here so that
/// file-bound tools do not stall the async runtime.
///
/// # Errors
///
/// Returns the tool's own error, or [`ToolError::Execution`] if the body
/// panicked or was cancelled.
pub async fn run_blocking<F>(body: F) -> ToolResult<Value>
where
    F: FnOnce() -> ToolResult<Value> + Send + 'static,
{
    tokio::task::spawn_blocking(body)
        .await
        .map_err(|err| ToolError::execution(format!("tool task failed: {err}")))?
}
