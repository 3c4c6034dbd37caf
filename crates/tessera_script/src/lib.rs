//! Tessera Scripting
//!
//! JavaScript execution via QuickJS for instance init and load scripts.
//!
//! Each script run gets a fresh runtime: instance operations arrive on
//! arbitrary bus threads and a QuickJS runtime is not shared between them.

pub mod error;
pub mod instance;
pub mod runtime;

pub use error::ScriptError;
pub use instance::{run_instance_script, InstanceScriptContext, ScriptPhase};
pub use runtime::ScriptRuntime;

pub use rquickjs;
