//! Instance init and load scripts
//!
//! Scripts see three globals: `instanceOid`, `instanceName` and
//! `scriptPhase`. After the file runs, `onInit()` or `onLoad()` is called if
//! the script defines it.

use crate::{ScriptError, ScriptRuntime};
use std::path::Path;
use tessera_core::ObjectId;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ScriptPhase {
    /// First creation of the instance.
    Init,
    /// Every later load from the store.
    Load,
}

impl ScriptPhase {
    pub fn name(self) -> &'static str {
        match self {
            ScriptPhase::Init => "init",
            ScriptPhase::Load => "load",
        }
    }

    fn entry_point(self) -> &'static str {
        match self {
            ScriptPhase::Init => "onInit",
            ScriptPhase::Load => "onLoad",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InstanceScriptContext {
    pub instance: ObjectId,
    pub name: String,
    pub phase: ScriptPhase,
}

pub fn run_instance_script(path: &Path, context: &InstanceScriptContext) -> Result<(), ScriptError> {
    let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    run_instance_source(&source, context)?;
    tracing::debug!(
        instance = %context.instance,
        script = %path.display(),
        phase = context.phase.name(),
        "instance script finished"
    );
    Ok(())
}

pub(crate) fn run_instance_source(
    source: &str,
    context: &InstanceScriptContext,
) -> Result<ScriptRuntime, ScriptError> {
    let runtime = ScriptRuntime::new()?;
    runtime.set_global_number("instanceOid", context.instance.raw() as f64)?;
    runtime.set_global_str("instanceName", &context.name)?;
    runtime.set_global_str("scriptPhase", context.phase.name())?;
    runtime.execute(source)?;

    let entry = context.phase.entry_point();
    if runtime.has_function(entry) {
        runtime.call_function(entry)?;
    }
    Ok(runtime)
}
