//! Script runtime management
//!
//! Thin wrapper over a QuickJS runtime and context with the host functions
//! scripts expect (`log`, `warn`).

use crate::ScriptError;
use rquickjs::{CatchResultExt, Context, Runtime};
use std::path::Path;

/// Script execution context
pub struct ScriptRuntime {
    #[allow(dead_code)] // Kept alive for context lifetime
    runtime: Runtime,
    pub context: Context,
}

impl ScriptRuntime {
    pub fn new() -> Result<Self, ScriptError> {
        let runtime = Runtime::new()?;
        let context = Context::full(&runtime)?;

        context.with(|ctx| {
            let log_fn = rquickjs::Function::new(ctx.clone(), |msg: String| {
                tracing::info!(target: "tessera_script", "{}", msg);
            })?;
            ctx.globals().set("log", log_fn)?;
            let warn_fn = rquickjs::Function::new(ctx.clone(), |msg: String| {
                tracing::warn!(target: "tessera_script", "{}", msg);
            })?;
            ctx.globals().set("warn", warn_fn)?;
            Ok::<_, rquickjs::Error>(())
        })?;

        Ok(Self { runtime, context })
    }

    pub fn set_global_number(&self, name: &str, value: f64) -> Result<(), ScriptError> {
        self.context.with(|ctx| ctx.globals().set(name, value))?;
        Ok(())
    }

    pub fn set_global_str(&self, name: &str, value: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| ctx.globals().set(name, value))?;
        Ok(())
    }

    pub fn execute_file(&self, path: &Path) -> Result<(), ScriptError> {
        let source = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.execute(&source)
    }

    pub fn execute(&self, source: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            ctx.eval::<(), _>(source)
                .catch(&ctx)
                .map_err(exception)
        })
    }

    /// Evaluate an expression that yields a number.
    pub fn eval_number(&self, source: &str) -> Result<f64, ScriptError> {
        self.context.with(|ctx| {
            ctx.eval::<f64, _>(source)
                .catch(&ctx)
                .map_err(exception)
        })
    }

    /// Call a JavaScript function by name with no arguments.
    pub fn call_function(&self, name: &str) -> Result<(), ScriptError> {
        self.context.with(|ctx| {
            let func: rquickjs::Function = ctx.globals().get(name)?;
            func.call::<_, ()>(())
                .catch(&ctx)
                .map_err(exception)
        })
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.context.with(|ctx| {
            ctx.globals()
                .get::<_, rquickjs::Function>(name)
                .is_ok()
        })
    }
}

fn exception(error: rquickjs::CaughtError<'_>) -> ScriptError {
    ScriptError::Exception(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_are_visible_to_scripts() {
        let rt = ScriptRuntime::new().unwrap();
        rt.set_global_number("answer", 41.0).unwrap();
        assert_eq!(rt.eval_number("answer + 1").unwrap(), 42.0);
    }

    #[test]
    fn thrown_errors_are_reported() {
        let rt = ScriptRuntime::new().unwrap();
        let err = rt.execute("throw new Error('boom')").unwrap_err();
        assert!(matches!(err, ScriptError::Exception(ref m) if m.contains("boom")));
    }

    #[test]
    fn functions_can_be_called_by_name() {
        let rt = ScriptRuntime::new().unwrap();
        rt.execute("var calls = 0; function onLoad() { calls += 1; log('loaded'); }")
            .unwrap();
        assert!(rt.has_function("onLoad"));
        assert!(!rt.has_function("onUnload"));
        rt.call_function("onLoad").unwrap();
        assert_eq!(rt.eval_number("calls").unwrap(), 1.0);
    }
}
