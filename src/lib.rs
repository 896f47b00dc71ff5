//! planish, a trace-guided source-to-source inliner.
//!
//! Given a program in the crate's small dynamic surface language and a set
//! of inline targets, `planish` repeatedly executes the program under
//! instrumentation, expands qualifying call sites into their callee bodies
//! with capture-avoiding renaming, and runs cleanup passes (dead-code
//! elimination, copy/value propagation, liveness, tuple and keyword-argument
//! normalization, import deduplication, suffix removal) to fixpoint. The
//! result is a flatter, single-effect-per-statement program with the same
//! behavior as the input.
//!
//! ```
//! use planish::{Inliner, InlinerOptions, ModuleRegistry};
//!
//! let program = "\
//! def target(x):
//!     return x + 1
//! assert target(1) == 2
//! ";
//! let mut inliner = Inliner::new(
//!     program,
//!     ModuleRegistry::new(),
//!     InlinerOptions { add_comments: false },
//! ).unwrap();
//! inliner.simplify().unwrap();
//! inliner.execute().unwrap();
//! ```

pub mod diagnostics;
mod inliner;
pub mod passes;
pub mod runtime;
pub mod surface;
pub mod targets;
pub mod trace;
mod visit;

pub use inliner::{
    HistoryEntry, Inliner, InlinerOptions, NameGen, ReplayScript, ReplayStep, TargetSuggestion,
};
pub use passes::PassId;
pub use runtime::ModuleRegistry;
pub use targets::Target;

/// Crate-level error surface, one variant per failure class.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parse error\n{0}")]
    Parse(String),
    #[error("traced program failed: {message}\n--- instrumented source ---\n{source_text}")]
    Traced {
        message: String,
        source_text: String,
    },
    #[error("cannot evaluate `{expr}` against the traced environment")]
    Eval { expr: String },
    #[error("statement has multiple inlinable expressions: `{first}` and `{second}`")]
    AmbiguousRewrite { first: String, second: String },
    #[error("pass `{pass}` aborted: {reason}")]
    PassAborted { pass: &'static str, reason: String },
    #[error("unsupported construct: {0}")]
    Unsupported(String),
    #[error("cannot resolve inline target `{0}`")]
    UnknownTarget(String),
}
