//! The orchestrator: owns the tree, the module registry, the target list,
//! the generated-name counters, and the undo history, and schedules the
//! passes to fixpoint.

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

use crate::diagnostics::render_diagnostic;
use crate::passes::{run_pass, PassContext, PassId};
use crate::runtime::{ModuleRegistry, Runtime};
use crate::surface::ast::{Expr, Stmt, SEP};
use crate::surface::parser::parse_program;
use crate::surface::printer::{render_expr_text, render_program};
use crate::targets::{eval_static, is_resolvable_form, make_target, Callee, Target};
use crate::trace::{TraceArgs, Tracer};
use crate::visit::find_bound_names;
use crate::Error;

/// Fresh-name source for one `Inliner` instance. Counters are seeded with
/// the input program's bound names so a generated name can never shadow a
/// user binding.
pub struct NameGen {
    counters: FxHashMap<String, u32>,
    reserved: FxHashSet<String>,
    issued: FxHashSet<String>,
}

impl NameGen {
    fn with_reserved(reserved: FxHashSet<String>) -> Self {
        NameGen {
            counters: FxHashMap::default(),
            reserved,
            issued: FxHashSet::default(),
        }
    }

    /// `prefix`, then `prefix_2`, `prefix_3`, … skipping reserved names.
    pub fn fresh(&mut self, prefix: &str) -> String {
        loop {
            let count = self.counters.entry(prefix.to_string()).or_insert(0);
            *count += 1;
            let name = if *count == 1 {
                prefix.to_string()
            } else {
                format!("{prefix}_{count}")
            };
            if !self.reserved.contains(&name) {
                self.issued.insert(name.clone());
                return name;
            }
        }
    }

    /// Whether a name was introduced by the pipeline rather than the input
    /// program: either issued by `fresh` or carrying the rename separator.
    pub fn is_generated(&self, name: &str) -> bool {
        self.issued.contains(name) || name.contains(SEP)
    }
}

#[derive(Debug, Clone)]
pub struct InlinerOptions {
    /// Precede each expansion with a comment recording the original call.
    pub add_comments: bool,
}

impl Default for InlinerOptions {
    fn default() -> Self {
        InlinerOptions { add_comments: true }
    }
}

/// One snapshot in the undo history. `history[0]` is always the original
/// input tree.
pub struct HistoryEntry {
    pub source: String,
    pub pass: Option<PassId>,
    pub targets_added: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayStep {
    pub pass: String,
    #[serde(default)]
    pub targets: Vec<String>,
}

/// A minimal script reproducing the current tree: the original program plus
/// the ordered pass invocations (with the targets added before each).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayScript {
    pub program: String,
    pub steps: Vec<ReplayStep>,
}

impl ReplayScript {
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string_pretty(self)
            .map_err(|error| Error::Parse(format!("replay script: {error}")))
    }

    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|error| Error::Parse(format!("replay script: {error}")))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetSuggestion {
    pub path: String,
    pub use_text: String,
}

pub struct Inliner {
    program: Vec<Stmt>,
    registry: ModuleRegistry,
    targets: Vec<Target>,
    pending_specs: Vec<String>,
    history_specs: Vec<String>,
    names: NameGen,
    options: InlinerOptions,
    history: Vec<HistoryEntry>,
}

impl Inliner {
    pub fn new(
        source: &str,
        registry: ModuleRegistry,
        options: InlinerOptions,
    ) -> Result<Self, Error> {
        let program = parse_program(source)
            .map_err(|diag| Error::Parse(render_diagnostic(source, &diag, false)))?;
        let reserved = find_bound_names(&program);
        let history = vec![HistoryEntry {
            source: render_program(&program),
            pass: None,
            targets_added: Vec::new(),
        }];
        Ok(Inliner {
            program,
            registry,
            targets: Vec::new(),
            pending_specs: Vec::new(),
            history_specs: Vec::new(),
            names: NameGen::with_reserved(reserved),
            options,
            history,
        })
    }

    /// Registers a target by string spec. Resolution against the traced
    /// environment is lazy: it happens on the next traced pass.
    pub fn add_target(&mut self, spec: &str) {
        self.pending_specs.push(spec.to_string());
        self.history_specs.push(spec.to_string());
    }

    pub fn add_target_value(&mut self, target: Target) {
        self.history_specs.push(target.to_spec());
        self.targets.push(target);
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Rendered source of the current tree.
    pub fn code(&self) -> String {
        render_program(&self.program)
    }

    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }

    /// Runs one pass: render, re-parse (so spans line up with the trace),
    /// trace if the pass needs it, rewrite, and detect change by rendered
    /// text. An aborted pass restores the pre-pass tree and reports no
    /// change.
    pub fn run_pass(&mut self, id: PassId) -> Result<bool, Error> {
        let before = render_program(&self.program);
        let parsed = parse_program(&before)
            .map_err(|diag| Error::Parse(render_diagnostic(&before, &diag, false)))?;

        let mut trace = match id.trace_args() {
            Some(args) => Some(Tracer::trace(&parsed, &self.registry, args)?),
            None => None,
        };
        if let Some(trace) = trace.as_mut() {
            for spec in std::mem::take(&mut self.pending_specs) {
                self.targets.push(make_target(&spec, trace)?);
            }
        }

        let mut cx = PassContext {
            trace,
            targets: &self.targets,
            names: &mut self.names,
            options: &self.options,
            registry: &self.registry,
        };
        match run_pass(id, parsed, &mut cx) {
            Err(Error::PassAborted { .. }) => Ok(false),
            Err(error) => Err(error),
            Ok(new_stmts) => {
                let after = render_program(&new_stmts);
                let changed = after != before;
                if changed {
                    self.program = new_stmts;
                    self.history.push(HistoryEntry {
                        source: after,
                        pass: Some(id),
                        targets_added: std::mem::take(&mut self.history_specs),
                    });
                }
                Ok(changed)
            }
        }
    }

    /// Expands qualifying call sites once. `inline` to fixpoint is part of
    /// `simplify`.
    pub fn inline(&mut self) -> Result<bool, Error> {
        self.run_pass(PassId::Inline)
    }

    /// The full pipeline: Inline and Dead-Code to convergence, the cleanup
    /// group to a joint fixpoint, then import cleanup and suffix removal
    /// once each, then a parse check of the rendered result.
    pub fn simplify(&mut self) -> Result<(), Error> {
        loop {
            let inlined = self.run_pass(PassId::Inline)?;
            let cleaned = self.run_pass(PassId::Deadcode)?;
            if !inlined && !cleaned {
                break;
            }
        }

        loop {
            let mut any = false;
            for id in [
                PassId::Lifetimes,
                PassId::CopyPropagation,
                PassId::ExpandTuples,
                PassId::SimplifyVarargs,
            ] {
                any |= self.run_pass(id)?;
            }
            if !any {
                break;
            }
        }

        self.run_pass(PassId::CleanImports)?;
        self.run_pass(PassId::RemoveSuffixes)?;

        let rendered = self.code();
        parse_program(&rendered)
            .map_err(|diag| Error::Parse(render_diagnostic(&rendered, &diag, false)))?;
        Ok(())
    }

    /// Pops the most recent snapshot; the original input is never popped.
    pub fn undo(&mut self) -> Result<(), Error> {
        if self.history.len() > 1 {
            self.history.pop();
        }
        let source = match self.history.last() {
            Some(entry) => entry.source.clone(),
            None => String::new(),
        };
        self.program = parse_program(&source)
            .map_err(|diag| Error::Parse(render_diagnostic(&source, &diag, false)))?;
        Ok(())
    }

    /// Executes the current program (side effects are real) and returns its
    /// captured print output.
    pub fn execute(&self) -> Result<String, Error> {
        let mut runtime = Runtime::new(self.registry.clone());
        runtime
            .run_program(&self.program)
            .map_err(|error| Error::Traced {
                message: error.to_string(),
                source_text: self.code(),
            })?;
        Ok(runtime.output)
    }

    /// The replay script for the work done so far.
    pub fn replay(&self) -> ReplayScript {
        ReplayScript {
            program: self
                .history
                .first()
                .map(|entry| entry.source.clone())
                .unwrap_or_default(),
            steps: self
                .history
                .iter()
                .skip(1)
                .filter_map(|entry| {
                    entry.pass.map(|pass| ReplayStep {
                        pass: pass.name().to_string(),
                        targets: entry.targets_added.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Re-runs a replay script from scratch and returns the resulting
    /// orchestrator.
    pub fn run_replay(
        script: &ReplayScript,
        registry: ModuleRegistry,
        options: InlinerOptions,
    ) -> Result<Inliner, Error> {
        let mut inliner = Inliner::new(&script.program, registry, options)?;
        for step in &script.steps {
            for spec in &step.targets {
                inliner.add_target(spec);
            }
            let id = PassId::from_name(&step.pass)
                .ok_or_else(|| Error::Parse(format!("unknown pass `{}`", step.pass)))?;
            inliner.run_pass(id)?;
        }
        Ok(inliner)
    }

    /// Qualified paths of everything the program references that could be
    /// used as an inline target.
    pub fn target_suggestions(&self) -> Result<Vec<TargetSuggestion>, Error> {
        let source = self.code();
        let parsed = parse_program(&source)
            .map_err(|diag| Error::Parse(render_diagnostic(&source, &diag, false)))?;
        let mut trace = Tracer::trace(&parsed, &self.registry, TraceArgs::default())?;

        let mut suggestions: Vec<TargetSuggestion> = Vec::new();
        let mut seen = FxHashSet::default();
        let mut exprs = Vec::new();
        collect_reference_exprs(&parsed, &mut exprs);
        for expr in exprs {
            if !is_resolvable_form(&expr) {
                continue;
            }
            let Ok(value) = eval_static(&expr, &mut trace) else {
                continue;
            };
            let path = match &value {
                crate::runtime::values::Value::Module(module) => module.path.clone(),
                _ => match Callee::from_value(&value) {
                    Some(callee) if callee.module != "builtins" => callee.path(),
                    _ => continue,
                },
            };
            if seen.insert(path.clone()) {
                suggestions.push(TargetSuggestion {
                    path,
                    use_text: render_expr_text(&expr),
                });
            }
        }
        suggestions.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(suggestions)
    }

    /// Start lines of conditional branches that never executed, for editor
    /// code folding.
    pub fn unexecuted_lines(&self) -> Result<Vec<usize>, Error> {
        let source = self.code();
        let parsed = parse_program(&source)
            .map_err(|diag| Error::Parse(render_diagnostic(&source, &diag, false)))?;
        let trace = Tracer::trace(&parsed, &self.registry, TraceArgs::lines())?;

        let mut lines = Vec::new();
        collect_unexecuted(&parsed, &trace, &mut lines);
        lines.sort_unstable();
        lines.dedup();
        Ok(lines)
    }
}

fn collect_unexecuted(stmts: &[Stmt], trace: &crate::trace::Trace, out: &mut Vec<usize>) {
    for stmt in stmts {
        match stmt {
            Stmt::If { body, orelse, .. } => {
                let body_dead = body
                    .iter()
                    .find(|stmt| !stmt.is_comment())
                    .map(|stmt| !trace.span_executed(stmt.span()))
                    .unwrap_or(true);
                let orelse_dead = orelse
                    .iter()
                    .find(|stmt| !stmt.is_comment())
                    .map(|stmt| !trace.span_executed(stmt.span()))
                    .unwrap_or(false);
                if body_dead {
                    out.push(stmt.span().start.line);
                } else if orelse_dead {
                    if let Some(first) = orelse.first() {
                        out.push(first.span().start.line);
                    }
                }
                collect_unexecuted(body, trace, out);
                collect_unexecuted(orelse, trace, out);
            }
            Stmt::For { body, .. } | Stmt::With { body, .. } => {
                collect_unexecuted(body, trace, out)
            }
            Stmt::Try { body, handler, .. } => {
                collect_unexecuted(body, trace, out);
                collect_unexecuted(handler, trace, out);
            }
            _ => {}
        }
    }
}

/// Name and attribute-chain expressions appearing anywhere in the program,
/// in document order.
fn collect_reference_exprs(stmts: &[Stmt], out: &mut Vec<Expr>) {
    use crate::visit::walk_subexprs;

    fn collect_expr(expr: &Expr, out: &mut Vec<Expr>) {
        match expr {
            Expr::Name(_) | Expr::Attribute { .. } => out.push(expr.clone()),
            _ => {}
        }
        walk_subexprs(expr, &mut |sub| collect_expr(sub, out));
    }

    for stmt in stmts {
        match stmt {
            Stmt::Assign { value, .. } => collect_expr(value, out),
            Stmt::ExprStmt { expr, .. } => collect_expr(expr, out),
            Stmt::Assert { expr, message, .. } => {
                collect_expr(expr, out);
                if let Some(message) = message {
                    collect_expr(message, out);
                }
            }
            Stmt::Return { value: Some(value), .. } => collect_expr(value, out),
            Stmt::If {
                cond, body, orelse, ..
            } => {
                collect_expr(cond, out);
                collect_reference_exprs(body, out);
                collect_reference_exprs(orelse, out);
            }
            Stmt::For { iter, body, .. } => {
                collect_expr(iter, out);
                collect_reference_exprs(body, out);
            }
            Stmt::With { context, body, .. } => {
                collect_expr(context, out);
                collect_reference_exprs(body, out);
            }
            Stmt::Try { body, handler, .. } => {
                collect_reference_exprs(body, out);
                collect_reference_exprs(handler, out);
            }
            Stmt::FuncDef(def) => collect_reference_exprs(&def.body, out),
            Stmt::ClassDef(def) => collect_reference_exprs(&def.body, out),
            _ => {}
        }
    }
}
