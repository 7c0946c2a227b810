//! Tool discovery utilities.
//!
//! The modules exposed here make it possible to register callable tools under
//! a name together with descriptive metadata, look them up by name or tag, and
//! invoke them at runtime. Functions annotated with [`register_function`] are
//! collected at link time and can be loaded into a registry in one call.

#![warn(missing_docs, clippy::pedantic)]

// Lets the attribute macro's `::geogpt_tools` paths resolve inside this crate.
extern crate self as geogpt_tools;

pub mod macros;
pub mod registry;

pub use geogpt_tools_macros::register_function;
pub use registry::{
    FunctionDescriptor, FunctionMetadata, FunctionRegistry, Tool, ToolError, ToolFn, ToolFuture,
    ToolResult,
};

#[doc(hidden)]
pub use inventory;
#[doc(hidden)]
pub use serde_json;
