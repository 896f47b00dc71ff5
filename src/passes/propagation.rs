//! Copy / value propagation.
//!
//! A single-assignment binding is folded into its use sites when the trace
//! proves it safe (CAN) and a readability heuristic says it is worth it
//! (SHOULD):
//!
//! * CAN: the store count equals the baseline execution count (scaled by
//!   enclosing loop iterations), the right-hand side is effect-free, and one
//!   of: the observed value never changed between first and last read, the
//!   read count equals the baseline, or the binding is a direct name alias.
//!   A name with closure-tagged events additionally requires the
//!   value-unchanged condition.
//! * SHOULD: only names generated by the pipeline are folded freely; other
//!   bindings must be small (at most `MAX_TREESIZE` nodes) and call-free.
//!
//! Collected bindings substitute left-to-right, cascading through
//! later-collected values so alias chains like `y = x; z = y` fully resolve.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::surface::ast::{AssignTarget, Expr, Stmt};
use crate::trace::Trace;
use crate::visit::{
    contains_call, expr_names, is_effect_free, replace_name_in_expr, replace_name_in_stmts,
    tree_size,
};
use crate::Error;

use super::{missing_trace, PassContext, PassId};

const MAX_TREESIZE: usize = 10;

pub fn run(stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let trace = cx
        .trace
        .as_ref()
        .ok_or_else(|| missing_trace(PassId::CopyPropagation))?;

    // A name bound at more than one syntactic site (both arms of a
    // collapsed conditional, a loop target, …) has no single defining
    // expression to substitute.
    let mut binding_sites: FxHashMap<String, usize> = FxHashMap::default();
    count_binding_sites(&stmts, &mut binding_sites);

    let mut assignments: Vec<(String, Expr)> = Vec::new();
    let mut loop_targets = FxHashSet::default();
    let mut stmts = collect_block(
        stmts,
        1,
        trace,
        cx.names,
        &binding_sites,
        &mut loop_targets,
        &mut assignments,
    );

    for index in 0..assignments.len() {
        let (name, value) = assignments[index].clone();
        replace_name_in_stmts(&mut stmts, &name, &value);
        // Later-collected values may reference this binding; update them so
        // chained aliases resolve instead of dangling.
        for (_, later) in assignments[index + 1..].iter_mut() {
            replace_name_in_expr(later, &name, &value);
        }
    }

    Ok(stmts)
}

fn collect_target_names(target: &AssignTarget, out: &mut FxHashSet<String>) {
    match target {
        AssignTarget::Name(name) => {
            out.insert(name.name.clone());
        }
        AssignTarget::Tuple { items, .. } => {
            for item in items {
                collect_target_names(item, out);
            }
        }
        _ => {}
    }
}

fn count_target_sites(target: &AssignTarget, counts: &mut FxHashMap<String, usize>) {
    let mut names = FxHashSet::default();
    collect_target_names(target, &mut names);
    for name in names {
        *counts.entry(name).or_insert(0) += 1;
    }
}

fn count_binding_sites(stmts: &[Stmt], counts: &mut FxHashMap<String, usize>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => count_target_sites(target, counts),
            Stmt::For { target, body, .. } => {
                count_target_sites(target, counts);
                count_binding_sites(body, counts);
            }
            Stmt::If { body, orelse, .. } => {
                count_binding_sites(body, counts);
                count_binding_sites(orelse, counts);
            }
            Stmt::With { binding, body, .. } => {
                if let Some(binding) = binding {
                    *counts.entry(binding.name.clone()).or_insert(0) += 1;
                }
                count_binding_sites(body, counts);
            }
            Stmt::Try { body, handler, .. } => {
                count_binding_sites(body, counts);
                count_binding_sites(handler, counts);
            }
            Stmt::FuncDef(def) => {
                *counts.entry(def.name.name.clone()).or_insert(0) += 1;
            }
            Stmt::ClassDef(def) => {
                *counts.entry(def.name.name.clone()).or_insert(0) += 1;
            }
            Stmt::Import { module, alias, .. } => {
                let bound = match alias {
                    Some(alias) => alias.name.clone(),
                    None => module
                        .name
                        .split('.')
                        .next()
                        .unwrap_or(&module.name)
                        .to_string(),
                };
                *counts.entry(bound).or_insert(0) += 1;
            }
            Stmt::FromImport { names, .. } => {
                for alias in names {
                    *counts.entry(alias.bound_name().to_string()).or_insert(0) += 1;
                }
            }
            _ => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_block(
    stmts: Vec<Stmt>,
    baseline: u64,
    trace: &Trace,
    names: &crate::inliner::NameGen,
    binding_sites: &FxHashMap<String, usize>,
    loop_targets: &mut FxHashSet<String>,
    assignments: &mut Vec<(String, Expr)>,
) -> Vec<Stmt> {
    let mut out = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::Assign {
                target: AssignTarget::Name(name),
                value,
                span,
            } => {
                if binding_sites.get(&name.name).copied().unwrap_or(0) == 1
                    && can_propagate(&name.name, &value, baseline, trace, loop_targets)
                    && should_propagate(&name.name, &value, names)
                {
                    assignments.push((name.name.clone(), value));
                } else {
                    out.push(Stmt::Assign {
                        target: AssignTarget::Name(name),
                        value,
                        span,
                    });
                }
            }
            Stmt::If {
                cond,
                body,
                orelse,
                span,
            } => {
                let body = collect_block(body, baseline, trace, names, binding_sites, loop_targets, assignments);
                let orelse =
                    collect_block(orelse, baseline, trace, names, binding_sites, loop_targets, assignments);
                out.push(Stmt::If {
                    cond,
                    body,
                    orelse,
                    span,
                });
            }
            Stmt::For {
                target,
                iter,
                body,
                span,
            } => {
                // Statements in the body execute once per iteration; scale
                // the baseline by the traced iteration count.
                let iters = trace.line_count(span.start.line).saturating_sub(1);
                let body = if iters > 0 {
                    collect_target_names(&target, loop_targets);
                    collect_block(
                        body,
                        baseline * iters,
                        trace,
                        names,
                        binding_sites,
                        loop_targets,
                        assignments,
                    )
                } else {
                    body
                };
                out.push(Stmt::For {
                    target,
                    iter,
                    body,
                    span,
                });
            }
            Stmt::Try {
                body,
                handler,
                span,
            } => {
                let body = collect_block(body, baseline, trace, names, binding_sites, loop_targets, assignments);
                let handler =
                    collect_block(handler, baseline, trace, names, binding_sites, loop_targets, assignments);
                out.push(Stmt::Try {
                    body,
                    handler,
                    span,
                });
            }
            // Assignments inside scoped-resource blocks stay put so no
            // statement migrates across the resource boundary; function and
            // class bodies are opaque.
            other => out.push(other),
        }
    }
    out
}

fn can_propagate(
    name: &str,
    value: &Expr,
    baseline: u64,
    trace: &Trace,
    loop_targets: &FxHashSet<String>,
) -> bool {
    if trace.store_count(name) as u64 != baseline {
        return false;
    }
    if !is_effect_free(value) {
        return false;
    }

    // Substitution moves the expression's evaluation to its use sites; every
    // name it reads must still mean the same thing there. Single-assignment
    // names qualify, as do enclosing loop variables (rebound in lockstep
    // with the binding itself).
    let stable = expr_names(value).into_iter().all(|free| {
        trace.store_count(&free) <= 1 || loop_targets.contains(&free)
    });
    if !stable {
        return false;
    }

    let reads = trace.reads(name);
    let val_eq = match (reads.first(), reads.last()) {
        (Some(first), Some(last)) => first.value.robust_eq(&last.value),
        _ => true,
    };
    if trace.has_closure_event(name) && !val_eq {
        return false;
    }
    val_eq || reads.len() as u64 == baseline || matches!(value, Expr::Name(_))
}

fn should_propagate(name: &str, value: &Expr, names: &crate::inliner::NameGen) -> bool {
    names.is_generated(name) || (tree_size(value) <= MAX_TREESIZE && !contains_call(value))
}
