//! Dead-code elimination driven by per-line execution counts: statements
//! whose whole span never ran are removed, conditionals collapse to the
//! branch that ran, and exception blocks collapse to whichever side the
//! trace proves was taken. Comment statements are never dead.

use crate::surface::ast::{Expr, Stmt};
use crate::trace::Trace;
use crate::visit::rewrite_block;
use crate::Error;

use super::{missing_trace, PassContext, PassId};

pub fn run(stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let trace = cx
        .trace
        .as_ref()
        .ok_or_else(|| missing_trace(PassId::Deadcode))?;
    Ok(rewrite_block(stmts, false, &mut |stmt| {
        check_stmt(stmt, trace)
    }))
}

fn live_len(stmts: &[Stmt]) -> usize {
    stmts.iter().filter(|stmt| !stmt.is_comment()).count()
}

fn first_live(stmts: &[Stmt]) -> Option<&Stmt> {
    stmts.iter().find(|stmt| !stmt.is_comment())
}

/// A branch is dead when it has no live statements or its first live
/// statement never executed.
fn branch_dead(stmts: &[Stmt], trace: &Trace) -> bool {
    match first_live(stmts) {
        Some(stmt) => !trace.span_executed(stmt.span()),
        None => true,
    }
}

fn check_stmt(stmt: Stmt, trace: &Trace) -> Vec<Stmt> {
    if stmt.is_comment() {
        return vec![stmt];
    }

    if !trace.span_executed(stmt.span()) {
        return Vec::new();
    }

    match stmt {
        Stmt::If {
            cond,
            body,
            orelse,
            span,
        } => {
            if branch_dead(&body, trace) {
                orelse
            } else if branch_dead(&orelse, trace) {
                // With an explicit else that never ran, the then-branch ran
                // on every visit. Without one, that only holds when the
                // branch count matches the statement count.
                let always_taken = !orelse.is_empty() || {
                    let if_count = trace.line_count(span.start.line);
                    let body_count = first_live(&body)
                        .map(|stmt| trace.line_count(stmt.span().start.line))
                        .unwrap_or(0);
                    body_count >= if_count
                };
                if always_taken {
                    body
                } else {
                    vec![Stmt::If {
                        cond,
                        body,
                        orelse,
                        span,
                    }]
                }
            } else {
                vec![Stmt::If {
                    cond,
                    body,
                    orelse,
                    span,
                }]
            }
        }
        Stmt::For {
            target,
            iter,
            body,
            span,
        } => {
            if live_len(&body) == 0 {
                Vec::new()
            } else {
                vec![Stmt::For {
                    target,
                    iter,
                    body,
                    span,
                }]
            }
        }
        Stmt::Try { body, handler, .. } => {
            // Single-handler collapse: if the handler ran, the protected
            // body must have failed; otherwise the body completed.
            if !branch_dead(&handler, trace) {
                handler
            } else {
                body
            }
        }
        Stmt::ExprStmt { expr, span } => match expr {
            // Executed but valueless: discarding a pure reference or literal.
            Expr::Name(_)
            | Expr::Int { .. }
            | Expr::Float { .. }
            | Expr::Str { .. }
            | Expr::Bool { .. }
            | Expr::None { .. } => Vec::new(),
            expr => vec![Stmt::ExprStmt { expr, span }],
        },
        Stmt::FuncDef(def) => {
            if live_len(&def.body) == 0 {
                Vec::new()
            } else {
                vec![Stmt::FuncDef(def)]
            }
        }
        Stmt::With {
            context,
            binding,
            body,
            span,
        } => {
            if live_len(&body) == 0 {
                Vec::new()
            } else {
                vec![Stmt::With {
                    context,
                    binding,
                    body,
                    span,
                }]
            }
        }
        other => vec![other],
    }
}
