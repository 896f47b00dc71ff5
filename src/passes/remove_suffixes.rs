//! Renames the `name___func` identifiers left behind by inline expansion to
//! fresh short names, consistently across the module.

use rustc_hash::FxHashSet;

use crate::surface::ast::{AssignTarget, Expr, Stmt, SEP};
use crate::visit::{rename_in_stmts, walk_subexprs};
use crate::Error;

use super::PassContext;

pub fn run(mut stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let mut suffixed = Vec::new();
    let mut seen = FxHashSet::default();
    collect_suffixed(&stmts, &mut suffixed, &mut seen);

    for name in suffixed {
        let base = name.split(SEP).next().unwrap_or(&name).to_string();
        let fresh = cx.names.fresh(&base);
        rename_in_stmts(&mut stmts, &name, &fresh);
    }
    Ok(stmts)
}

fn record(name: &str, out: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    if name.contains(SEP) && seen.insert(name.to_string()) {
        out.push(name.to_string());
    }
}

/// Collects suffixed names in document order so renaming is deterministic.
fn collect_suffixed(stmts: &[Stmt], out: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                collect_target(target, out, seen);
                collect_expr(value, out, seen);
            }
            Stmt::ExprStmt { expr, .. } => collect_expr(expr, out, seen),
            Stmt::Assert { expr, message, .. } => {
                collect_expr(expr, out, seen);
                if let Some(message) = message {
                    collect_expr(message, out, seen);
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    collect_expr(value, out, seen);
                }
            }
            Stmt::If {
                cond, body, orelse, ..
            } => {
                collect_expr(cond, out, seen);
                collect_suffixed(body, out, seen);
                collect_suffixed(orelse, out, seen);
            }
            Stmt::For {
                target, iter, body, ..
            } => {
                collect_target(target, out, seen);
                collect_expr(iter, out, seen);
                collect_suffixed(body, out, seen);
            }
            Stmt::FuncDef(def) => {
                record(&def.name.name, out, seen);
                collect_suffixed(&def.body, out, seen);
            }
            Stmt::ClassDef(def) => {
                record(&def.name.name, out, seen);
                collect_suffixed(&def.body, out, seen);
            }
            Stmt::With {
                context,
                binding,
                body,
                ..
            } => {
                collect_expr(context, out, seen);
                if let Some(binding) = binding {
                    record(&binding.name, out, seen);
                }
                collect_suffixed(body, out, seen);
            }
            Stmt::Try { body, handler, .. } => {
                collect_suffixed(body, out, seen);
                collect_suffixed(handler, out, seen);
            }
            Stmt::Import { .. }
            | Stmt::FromImport { .. }
            | Stmt::Pass { .. }
            | Stmt::Comment { .. } => {}
        }
    }
}

fn collect_target(target: &AssignTarget, out: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    match target {
        AssignTarget::Name(name) => record(&name.name, out, seen),
        AssignTarget::Attribute { base, .. } => collect_expr(base, out, seen),
        AssignTarget::Index { base, index, .. } => {
            collect_expr(base, out, seen);
            collect_expr(index, out, seen);
        }
        AssignTarget::Tuple { items, .. } => {
            for item in items {
                collect_target(item, out, seen);
            }
        }
    }
}

fn collect_expr(expr: &Expr, out: &mut Vec<String>, seen: &mut FxHashSet<String>) {
    if let Expr::Name(name) = expr {
        record(&name.name, out, seen);
    }
    walk_subexprs(expr, &mut |sub| collect_expr(sub, out, seen));
}
