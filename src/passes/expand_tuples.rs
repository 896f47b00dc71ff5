//! Expands tuple assignments into element-wise assignments so the
//! propagation passes can see through them.
//!
//! `x, y = (1, 2)` becomes `x = 1` / `y = 2`. Only applies when every
//! right-hand element is simple enough to duplicate freely.

use crate::surface::ast::{AssignTarget, Expr, Stmt};
use crate::visit::rewrite_block;
use crate::Error;

use super::PassContext;

fn is_simple(expr: &Expr) -> bool {
    match expr {
        Expr::Name(_)
        | Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::None { .. }
        | Expr::Attribute { .. } => true,
        Expr::Tuple { items, .. } => items.iter().all(is_simple),
        _ => false,
    }
}

pub fn run(stmts: Vec<Stmt>, _cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    Ok(rewrite_block(stmts, false, &mut |stmt| match stmt {
        Stmt::Assign {
            target: AssignTarget::Tuple { items: targets, .. },
            value: Expr::Tuple { items: values, .. },
            span,
        } if targets.len() == values.len() && values.iter().all(is_simple) => targets
            .into_iter()
            .zip(values)
            .map(|(target, value)| Stmt::Assign {
                target,
                value,
                span,
            })
            .collect(),
        other => vec![other],
    }))
}
