//! Liveness-based removal: a store never observed before the next store of
//! the same name is dead, and dead side-effect-free stores are deleted.
//! Imports and definitions whose bound name is never read fall to the same
//! reasoning.

use crate::surface::ast::{AssignTarget, Stmt};
use crate::visit::{is_effect_free, rewrite_block};
use crate::Error;

use super::{missing_trace, PassContext, PassId};

pub fn run(stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let trace = cx
        .trace
        .as_ref()
        .ok_or_else(|| missing_trace(PassId::Lifetimes))?;
    let unused_stores = trace.unused_store_lines();

    let dead_line = |name: &str, start: usize, end: usize| {
        unused_stores
            .get(name)
            .is_some_and(|lines| lines.iter().any(|line| start <= *line && *line <= end))
    };

    Ok(rewrite_block(stmts, false, &mut |stmt| match stmt {
        Stmt::Assign {
            target: AssignTarget::Name(name),
            value,
            span,
        } => {
            if dead_line(&name.name, span.start.line, span.end.line) && is_effect_free(&value) {
                Vec::new()
            } else {
                vec![Stmt::Assign {
                    target: AssignTarget::Name(name),
                    value,
                    span,
                }]
            }
        }
        Stmt::Import { module, alias, span } => {
            let bound = match &alias {
                Some(alias) => alias.name.clone(),
                None => module
                    .name
                    .split('.')
                    .next()
                    .unwrap_or(&module.name)
                    .to_string(),
            };
            if trace.read_count(&bound) == 0 {
                Vec::new()
            } else {
                vec![Stmt::Import { module, alias, span }]
            }
        }
        Stmt::FromImport {
            module,
            names,
            span,
        } => {
            let kept: Vec<_> = names
                .into_iter()
                .filter(|alias| trace.read_count(alias.bound_name()) > 0)
                .collect();
            if kept.is_empty() {
                Vec::new()
            } else {
                vec![Stmt::FromImport {
                    module,
                    names: kept,
                    span,
                }]
            }
        }
        Stmt::FuncDef(def) => {
            if def.decorators.is_empty() && trace.read_count(&def.name.name) == 0 {
                Vec::new()
            } else {
                vec![Stmt::FuncDef(def)]
            }
        }
        Stmt::ClassDef(def) => {
            if def.decorators.is_empty() && trace.read_count(&def.name.name) == 0 {
                Vec::new()
            } else {
                vec![Stmt::ClassDef(def)]
            }
        }
        other => vec![other],
    }))
}
