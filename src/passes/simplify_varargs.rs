//! Keyword-spread normalization: a call carrying `**kw` whose runtime dict
//! was empty during the trace drops the spread argument entirely.

use crate::runtime::values::Value;
use crate::surface::ast::{Expr, StarKind, Stmt};
use crate::targets::eval_static;
use crate::trace::Trace;
use crate::Error;

use super::{missing_trace, PassContext, PassId};

pub fn run(mut stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let trace = cx
        .trace
        .as_mut()
        .ok_or_else(|| missing_trace(PassId::SimplifyVarargs))?;
    for stmt in &mut stmts {
        simplify_stmt(stmt, trace)?;
    }
    Ok(stmts)
}

fn simplify_stmt(stmt: &mut Stmt, trace: &mut Trace) -> Result<(), Error> {
    match stmt {
        Stmt::Assign { value, .. } => simplify_expr(value, trace),
        Stmt::ExprStmt { expr, .. } => simplify_expr(expr, trace),
        Stmt::Assert { expr, message, .. } => {
            simplify_expr(expr, trace)?;
            if let Some(message) = message {
                simplify_expr(message, trace)?;
            }
            Ok(())
        }
        Stmt::If {
            cond, body, orelse, ..
        } => {
            simplify_expr(cond, trace)?;
            for stmt in body.iter_mut().chain(orelse.iter_mut()) {
                simplify_stmt(stmt, trace)?;
            }
            Ok(())
        }
        Stmt::For { iter, body, .. } => {
            simplify_expr(iter, trace)?;
            for stmt in body {
                simplify_stmt(stmt, trace)?;
            }
            Ok(())
        }
        Stmt::With { context, body, .. } => {
            simplify_expr(context, trace)?;
            for stmt in body {
                simplify_stmt(stmt, trace)?;
            }
            Ok(())
        }
        Stmt::Try { body, handler, .. } => {
            for stmt in body.iter_mut().chain(handler.iter_mut()) {
                simplify_stmt(stmt, trace)?;
            }
            Ok(())
        }
        Stmt::Return { value, .. } => match value {
            Some(value) => simplify_expr(value, trace),
            None => Ok(()),
        },
        // Function and class bodies are opaque until their own call sites
        // are expanded.
        Stmt::FuncDef(_)
        | Stmt::ClassDef(_)
        | Stmt::Import { .. }
        | Stmt::FromImport { .. }
        | Stmt::Pass { .. }
        | Stmt::Comment { .. } => Ok(()),
    }
}

fn simplify_expr(expr: &mut Expr, trace: &mut Trace) -> Result<(), Error> {
    if let Expr::Call { args, .. } = expr {
        let spread_count = args
            .iter()
            .filter(|arg| arg.star == StarKind::DoubleStar)
            .count();
        if spread_count == 1 {
            let index = args
                .iter()
                .position(|arg| arg.star == StarKind::DoubleStar)
                .unwrap_or(0);
            let value = eval_static(&args[index].value, trace)?;
            if let Value::Dict(entries) = &value {
                if entries.borrow().is_empty() {
                    args.remove(index);
                }
            }
        }
    }

    let mut result = Ok(());
    visit_subexprs_mut(expr, &mut |sub| {
        if result.is_ok() {
            result = simplify_expr(sub, trace);
        }
    });
    result
}

fn visit_subexprs_mut(expr: &mut Expr, f: &mut dyn FnMut(&mut Expr)) {
    match expr {
        Expr::Name(_)
        | Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::None { .. } => {}
        Expr::List { items, .. } | Expr::Tuple { items, .. } => {
            for item in items {
                f(item);
            }
        }
        Expr::Dict { entries, .. } => {
            for (key, value) in entries {
                f(key);
                f(value);
            }
        }
        Expr::Attribute { base, .. } => f(base),
        Expr::Index { base, index, .. } => {
            f(base);
            f(index);
        }
        Expr::Call { func, args, .. } => {
            f(func);
            for arg in args {
                f(&mut arg.value);
            }
        }
        Expr::Unary { operand, .. } => f(operand),
        Expr::Binary { left, right, .. } => {
            f(left);
            f(right);
        }
        Expr::IfExp {
            cond, then, orelse, ..
        } => {
            f(cond);
            f(then);
            f(orelse);
        }
        Expr::ListComp { elt, clauses, .. } => {
            f(elt);
            for clause in clauses {
                f(&mut clause.iter);
                if let Some(cond) = &mut clause.cond {
                    f(cond);
                }
            }
        }
        Expr::Yield { value, .. } => f(value),
    }
}
