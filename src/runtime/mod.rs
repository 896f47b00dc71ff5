use rustc_hash::FxHashMap;

use crate::surface::ast::Stmt;
use crate::trace::TraceSink;

pub mod builtins;
pub mod environment;
mod interpreter;
pub mod values;

#[cfg(test)]
mod tests;

use self::builtins::register_builtins;
use self::environment::Env;
use self::values::Value;

/// Module path under which the traced program itself executes.
pub const MAIN_MODULE: &str = "__main__";

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("{0}")]
    Message(String),
    #[error("name `{0}` is not defined")]
    NameError(String),
    #[error("assertion failed at line {line}: {text}")]
    Assertion { line: usize, text: String },
    #[error("module `{0}` not found")]
    ImportError(String),
}

impl RuntimeError {
    pub fn msg(message: impl Into<String>) -> Self {
        RuntimeError::Message(message.into())
    }
}

/// Statement-level control flow.
pub enum Flow {
    Normal,
    Return(Value),
}

/// Sources of every importable unit, keyed by dotted module path.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    sources: FxHashMap<String, String>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_module(&mut self, path: impl Into<String>, source: impl Into<String>) {
        self.sources.insert(path.into(), source.into());
    }

    pub fn source(&self, path: &str) -> Option<&str> {
        self.sources.get(path).map(String::as_str)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.sources.contains_key(path)
    }

    pub fn sources_iter(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }
}

/// Tree-walking evaluator for the surface language. One `Runtime` performs
/// one program execution; the optional `TraceSink` is the instrumentation
/// boundary through which the tracer observes stores, loads, and executed
/// lines.
pub struct Runtime {
    pub(crate) registry: ModuleRegistry,
    pub(crate) loaded: FxHashMap<String, std::rc::Rc<values::ModuleValue>>,
    pub(crate) loading: Vec<String>,
    pub(crate) builtins: Env,
    pub(crate) current_module: String,
    pub(crate) frame_depth: usize,
    pub(crate) yield_stack: Vec<Vec<Value>>,
    pub sink: Option<TraceSink>,
    /// Captured `print` output, one line per call.
    pub output: String,
}

impl Runtime {
    pub fn new(registry: ModuleRegistry) -> Self {
        let builtins = Env::new(None);
        register_builtins(&builtins);
        Runtime {
            registry,
            loaded: FxHashMap::default(),
            loading: Vec::new(),
            builtins,
            current_module: MAIN_MODULE.to_string(),
            frame_depth: 0,
            yield_stack: Vec::new(),
            sink: None,
            output: String::new(),
        }
    }

    pub fn with_sink(registry: ModuleRegistry, sink: TraceSink) -> Self {
        let mut runtime = Runtime::new(registry);
        runtime.sink = Some(sink);
        runtime
    }

    /// Executes a whole program in a fresh global scope and returns that
    /// scope for use as the pass oracle.
    pub fn run_program(&mut self, stmts: &[Stmt]) -> Result<Env, RuntimeError> {
        let globals = Env::new(Some(self.builtins.clone()));
        match self.exec_block(stmts, &globals)? {
            Flow::Normal => Ok(globals),
            Flow::Return(_) => Err(RuntimeError::msg("return outside function")),
        }
    }

    pub(crate) fn recording(&self) -> bool {
        self.sink.is_some() && self.current_module == MAIN_MODULE
    }

    pub(crate) fn record_line(&mut self, line: usize) {
        if self.current_module == MAIN_MODULE {
            if let Some(sink) = self.sink.as_mut() {
                sink.on_line(line);
            }
        }
    }

    pub(crate) fn record_store(&mut self, name: &str, line: usize, value: &Value) {
        if self.current_module == MAIN_MODULE {
            let in_closure = self.frame_depth > 0;
            if let Some(sink) = self.sink.as_mut() {
                sink.on_store(name, line, in_closure, value);
            }
        }
    }

    pub(crate) fn record_load(&mut self, name: &str, line: usize, value: &Value) {
        if self.current_module == MAIN_MODULE {
            let in_closure = self.frame_depth > 0;
            if let Some(sink) = self.sink.as_mut() {
                sink.on_load(name, line, in_closure, value);
            }
        }
    }
}
