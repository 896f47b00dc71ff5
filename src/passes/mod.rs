//! The rewrite passes. Each pass is a function from a statement list (plus,
//! for trace-driven passes, the trace of that exact tree) to a new statement
//! list; change detection is the orchestrator's job, by rendered-text
//! comparison.

pub mod clean_imports;
pub mod deadcode;
pub mod expand_tuples;
pub mod inline;
pub mod lifetimes;
pub mod propagation;
pub mod remove_suffixes;
pub mod simplify_varargs;

use crate::inliner::{InlinerOptions, NameGen};
use crate::runtime::ModuleRegistry;
use crate::surface::ast::Stmt;
use crate::targets::Target;
use crate::trace::{Trace, TraceArgs};
use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassId {
    Inline,
    Deadcode,
    CopyPropagation,
    Lifetimes,
    ExpandTuples,
    SimplifyVarargs,
    CleanImports,
    RemoveSuffixes,
}

impl PassId {
    pub fn name(&self) -> &'static str {
        match self {
            PassId::Inline => "inline",
            PassId::Deadcode => "deadcode",
            PassId::CopyPropagation => "copy_propagation",
            PassId::Lifetimes => "lifetimes",
            PassId::ExpandTuples => "expand_tuples",
            PassId::SimplifyVarargs => "simplify_varargs",
            PassId::CleanImports => "clean_imports",
            PassId::RemoveSuffixes => "remove_suffixes",
        }
    }

    pub fn from_name(name: &str) -> Option<PassId> {
        match name {
            "inline" => Some(PassId::Inline),
            "deadcode" => Some(PassId::Deadcode),
            "copy_propagation" => Some(PassId::CopyPropagation),
            "lifetimes" => Some(PassId::Lifetimes),
            "expand_tuples" => Some(PassId::ExpandTuples),
            "simplify_varargs" => Some(PassId::SimplifyVarargs),
            "clean_imports" => Some(PassId::CleanImports),
            "remove_suffixes" => Some(PassId::RemoveSuffixes),
            _ => None,
        }
    }

    /// What the pass needs recorded; `None` means the pass runs without
    /// executing the program at all.
    pub fn trace_args(&self) -> Option<TraceArgs> {
        match self {
            PassId::Inline => Some(TraceArgs::reads()),
            PassId::Deadcode => Some(TraceArgs::lines()),
            PassId::CopyPropagation => Some(TraceArgs::reads_and_lines()),
            PassId::Lifetimes => Some(TraceArgs::reads()),
            PassId::SimplifyVarargs => Some(TraceArgs::default()),
            PassId::ExpandTuples | PassId::CleanImports | PassId::RemoveSuffixes => None,
        }
    }
}

/// Everything a pass may consume: the trace of the tree it is rewriting, the
/// target list, the orchestrator's name generator, and options.
pub struct PassContext<'a> {
    pub trace: Option<Trace>,
    pub targets: &'a [Target],
    pub names: &'a mut NameGen,
    pub options: &'a InlinerOptions,
    pub registry: &'a ModuleRegistry,
}

pub fn run_pass(id: PassId, stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    match id {
        PassId::Inline => inline::run(stmts, cx),
        PassId::Deadcode => deadcode::run(stmts, cx),
        PassId::CopyPropagation => propagation::run(stmts, cx),
        PassId::Lifetimes => lifetimes::run(stmts, cx),
        PassId::ExpandTuples => expand_tuples::run(stmts, cx),
        PassId::SimplifyVarargs => simplify_varargs::run(stmts, cx),
        PassId::CleanImports => clean_imports::run(stmts, cx),
        PassId::RemoveSuffixes => remove_suffixes::run(stmts, cx),
    }
}

pub(crate) fn missing_trace(pass: PassId) -> Error {
    Error::Unsupported(format!("pass `{}` requires a trace", pass.name()))
}
