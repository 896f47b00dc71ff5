//! Statement and expression rewriting helpers shared by the passes: block
//! rewriting, scope-safe renaming, name substitution, binder collection, and
//! the purity/size checks propagation relies on.

use rustc_hash::FxHashSet;

use crate::surface::ast::{AssignTarget, Expr, FuncDef, Stmt};

/// Rewrites a statement list bottom-up: compound statements get their bodies
/// rewritten first, then `f` maps every statement to its replacement list.
/// Function and class bodies are only entered when `into_defs` is set.
pub fn rewrite_block(
    stmts: Vec<Stmt>,
    into_defs: bool,
    f: &mut dyn FnMut(Stmt) -> Vec<Stmt>,
) -> Vec<Stmt> {
    let mut out = Vec::new();
    for stmt in stmts {
        let stmt = match stmt {
            Stmt::If {
                cond,
                body,
                orelse,
                span,
            } => Stmt::If {
                cond,
                body: rewrite_block(body, into_defs, f),
                orelse: rewrite_block(orelse, into_defs, f),
                span,
            },
            Stmt::For {
                target,
                iter,
                body,
                span,
            } => Stmt::For {
                target,
                iter,
                body: rewrite_block(body, into_defs, f),
                span,
            },
            Stmt::With {
                context,
                binding,
                body,
                span,
            } => Stmt::With {
                context,
                binding,
                body: rewrite_block(body, into_defs, f),
                span,
            },
            Stmt::Try {
                body,
                handler,
                span,
            } => Stmt::Try {
                body: rewrite_block(body, into_defs, f),
                handler: rewrite_block(handler, into_defs, f),
                span,
            },
            Stmt::FuncDef(def) if into_defs => Stmt::FuncDef(FuncDef {
                body: rewrite_block(def.body, into_defs, f),
                ..def
            }),
            other => other,
        };
        out.extend(f(stmt));
    }
    out
}

/// Names bound by a parameter list, used to decide whether a nested function
/// shadows a name being renamed.
fn param_names(def: &FuncDef) -> FxHashSet<&str> {
    let mut names: FxHashSet<&str> = def
        .params
        .params
        .iter()
        .chain(def.params.kwonly.iter())
        .map(|param| param.name.name.as_str())
        .collect();
    if let Some(vararg) = &def.params.vararg {
        names.insert(vararg.name.as_str());
    }
    if let Some(kwarg) = &def.params.kwarg {
        names.insert(kwarg.name.as_str());
    }
    names
}

/// Scope-safe rename of `src` to `dst` across a spliced subtree: every
/// reference and binding of `src` is renamed except inside nested functions
/// whose parameters shadow it.
pub fn rename_in_stmts(stmts: &mut [Stmt], src: &str, dst: &str) {
    for stmt in stmts {
        rename_stmt(stmt, src, dst);
    }
}

fn rename_stmt(stmt: &mut Stmt, src: &str, dst: &str) {
    match stmt {
        Stmt::Assign { target, value, .. } => {
            rename_target(target, src, dst);
            rename_expr(value, src, dst);
        }
        Stmt::ExprStmt { expr, .. } => rename_expr(expr, src, dst),
        Stmt::Assert { expr, message, .. } => {
            rename_expr(expr, src, dst);
            if let Some(message) = message {
                rename_expr(message, src, dst);
            }
        }
        Stmt::If {
            cond, body, orelse, ..
        } => {
            rename_expr(cond, src, dst);
            rename_in_stmts(body, src, dst);
            rename_in_stmts(orelse, src, dst);
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            rename_target(target, src, dst);
            rename_expr(iter, src, dst);
            rename_in_stmts(body, src, dst);
        }
        Stmt::FuncDef(def) => {
            if def.name.name == src {
                def.name.name = dst.to_string();
                rename_in_stmts(&mut def.body, src, dst);
            } else if !param_names(def).contains(src) {
                rename_in_stmts(&mut def.body, src, dst);
            }
            for decorator in &mut def.decorators {
                if decorator.name.name == src {
                    decorator.name.name = dst.to_string();
                }
            }
        }
        Stmt::ClassDef(def) => {
            if def.name.name == src {
                def.name.name = dst.to_string();
            }
            rename_in_stmts(&mut def.body, src, dst);
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                rename_expr(value, src, dst);
            }
        }
        Stmt::With {
            context,
            binding,
            body,
            ..
        } => {
            rename_expr(context, src, dst);
            if let Some(binding) = binding {
                if binding.name == src {
                    binding.name = dst.to_string();
                }
            }
            rename_in_stmts(body, src, dst);
        }
        Stmt::Try { body, handler, .. } => {
            rename_in_stmts(body, src, dst);
            rename_in_stmts(handler, src, dst);
        }
        Stmt::Import { .. }
        | Stmt::FromImport { .. }
        | Stmt::Pass { .. }
        | Stmt::Comment { .. } => {}
    }
}

fn rename_target(target: &mut AssignTarget, src: &str, dst: &str) {
    match target {
        AssignTarget::Name(name) => {
            if name.name == src {
                name.name = dst.to_string();
            }
        }
        AssignTarget::Attribute { base, .. } => rename_expr(base, src, dst),
        AssignTarget::Index { base, index, .. } => {
            rename_expr(base, src, dst);
            rename_expr(index, src, dst);
        }
        AssignTarget::Tuple { items, .. } => {
            for item in items {
                rename_target(item, src, dst);
            }
        }
    }
}

fn rename_expr(expr: &mut Expr, src: &str, dst: &str) {
    match expr {
        Expr::Name(name) => {
            if name.name == src {
                name.name = dst.to_string();
            }
        }
        Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::None { .. } => {}
        Expr::List { items, .. } | Expr::Tuple { items, .. } => {
            for item in items {
                rename_expr(item, src, dst);
            }
        }
        Expr::Dict { entries, .. } => {
            for (key, value) in entries {
                rename_expr(key, src, dst);
                rename_expr(value, src, dst);
            }
        }
        Expr::Attribute { base, .. } => rename_expr(base, src, dst),
        Expr::Index { base, index, .. } => {
            rename_expr(base, src, dst);
            rename_expr(index, src, dst);
        }
        Expr::Call { func, args, .. } => {
            rename_expr(func, src, dst);
            for arg in args {
                rename_expr(&mut arg.value, src, dst);
            }
        }
        Expr::Unary { operand, .. } => rename_expr(operand, src, dst),
        Expr::Binary { left, right, .. } => {
            rename_expr(left, src, dst);
            rename_expr(right, src, dst);
        }
        Expr::IfExp {
            cond, then, orelse, ..
        } => {
            rename_expr(cond, src, dst);
            rename_expr(then, src, dst);
            rename_expr(orelse, src, dst);
        }
        Expr::ListComp { elt, clauses, .. } => {
            rename_expr(elt, src, dst);
            for clause in clauses {
                rename_target(&mut clause.target, src, dst);
                rename_expr(&mut clause.iter, src, dst);
                if let Some(cond) = &mut clause.cond {
                    rename_expr(cond, src, dst);
                }
            }
        }
        Expr::Yield { value, .. } => rename_expr(value, src, dst),
    }
}

/// Substitutes every expression-position reference to `name` with `value`.
/// Returns whether anything was replaced.
pub fn replace_name_in_stmts(stmts: &mut [Stmt], name: &str, value: &Expr) -> bool {
    let mut replaced = false;
    for stmt in stmts {
        replaced |= replace_in_stmt(stmt, name, value);
    }
    replaced
}

fn replace_in_stmt(stmt: &mut Stmt, name: &str, value: &Expr) -> bool {
    let mut replaced = false;
    match stmt {
        Stmt::Assign { target, value: rhs, .. } => {
            replaced |= replace_in_target(target, name, value);
            replaced |= replace_name_in_expr(rhs, name, value);
        }
        Stmt::ExprStmt { expr, .. } => replaced |= replace_name_in_expr(expr, name, value),
        Stmt::Assert { expr, message, .. } => {
            replaced |= replace_name_in_expr(expr, name, value);
            if let Some(message) = message {
                replaced |= replace_name_in_expr(message, name, value);
            }
        }
        Stmt::If {
            cond, body, orelse, ..
        } => {
            replaced |= replace_name_in_expr(cond, name, value);
            replaced |= replace_name_in_stmts(body, name, value);
            replaced |= replace_name_in_stmts(orelse, name, value);
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            replaced |= replace_in_target(target, name, value);
            replaced |= replace_name_in_expr(iter, name, value);
            replaced |= replace_name_in_stmts(body, name, value);
        }
        Stmt::FuncDef(def) => replaced |= replace_name_in_stmts(&mut def.body, name, value),
        Stmt::ClassDef(def) => replaced |= replace_name_in_stmts(&mut def.body, name, value),
        Stmt::Return { value: ret, .. } => {
            if let Some(ret) = ret {
                replaced |= replace_name_in_expr(ret, name, value);
            }
        }
        Stmt::With { context, body, .. } => {
            replaced |= replace_name_in_expr(context, name, value);
            replaced |= replace_name_in_stmts(body, name, value);
        }
        Stmt::Try { body, handler, .. } => {
            replaced |= replace_name_in_stmts(body, name, value);
            replaced |= replace_name_in_stmts(handler, name, value);
        }
        Stmt::Import { .. }
        | Stmt::FromImport { .. }
        | Stmt::Pass { .. }
        | Stmt::Comment { .. } => {}
    }
    replaced
}

fn replace_in_target(target: &mut AssignTarget, name: &str, value: &Expr) -> bool {
    match target {
        // Plain name bindings are left alone; substitution only applies to
        // expression positions.
        AssignTarget::Name(_) => false,
        AssignTarget::Attribute { base, .. } => replace_name_in_expr(base, name, value),
        AssignTarget::Index { base, index, .. } => {
            replace_name_in_expr(base, name, value) | replace_name_in_expr(index, name, value)
        }
        AssignTarget::Tuple { items, .. } => {
            let mut replaced = false;
            for item in items {
                replaced |= replace_in_target(item, name, value);
            }
            replaced
        }
    }
}

pub fn replace_name_in_expr(expr: &mut Expr, name: &str, value: &Expr) -> bool {
    if let Expr::Name(current) = expr {
        if current.name == name {
            *expr = value.clone();
            return true;
        }
        return false;
    }
    let mut replaced = false;
    match expr {
        Expr::Name(_)
        | Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::None { .. } => {}
        Expr::List { items, .. } | Expr::Tuple { items, .. } => {
            for item in items {
                replaced |= replace_name_in_expr(item, name, value);
            }
        }
        Expr::Dict { entries, .. } => {
            for (key, entry) in entries {
                replaced |= replace_name_in_expr(key, name, value);
                replaced |= replace_name_in_expr(entry, name, value);
            }
        }
        Expr::Attribute { base, .. } => replaced |= replace_name_in_expr(base, name, value),
        Expr::Index { base, index, .. } => {
            replaced |= replace_name_in_expr(base, name, value);
            replaced |= replace_name_in_expr(index, name, value);
        }
        Expr::Call { func, args, .. } => {
            replaced |= replace_name_in_expr(func, name, value);
            for arg in args {
                replaced |= replace_name_in_expr(&mut arg.value, name, value);
            }
        }
        Expr::Unary { operand, .. } => replaced |= replace_name_in_expr(operand, name, value),
        Expr::Binary { left, right, .. } => {
            replaced |= replace_name_in_expr(left, name, value);
            replaced |= replace_name_in_expr(right, name, value);
        }
        Expr::IfExp {
            cond, then, orelse, ..
        } => {
            replaced |= replace_name_in_expr(cond, name, value);
            replaced |= replace_name_in_expr(then, name, value);
            replaced |= replace_name_in_expr(orelse, name, value);
        }
        Expr::ListComp { elt, clauses, .. } => {
            replaced |= replace_name_in_expr(elt, name, value);
            for clause in clauses {
                replaced |= replace_name_in_expr(&mut clause.iter, name, value);
                if let Some(cond) = &mut clause.cond {
                    replaced |= replace_name_in_expr(cond, name, value);
                }
            }
        }
        Expr::Yield { value: inner, .. } => {
            replaced |= replace_name_in_expr(inner, name, value)
        }
    }
    replaced
}

fn collect_target_names(target: &AssignTarget, names: &mut FxHashSet<String>) {
    match target {
        AssignTarget::Name(name) => {
            names.insert(name.name.clone());
        }
        AssignTarget::Tuple { items, .. } => {
            for item in items {
                collect_target_names(item, names);
            }
        }
        AssignTarget::Attribute { .. } | AssignTarget::Index { .. } => {}
    }
}

/// All names a statement list binds locally: assignment targets, loop
/// targets, scoped-resource bindings, and nested definition names.
pub fn find_bound_names(stmts: &[Stmt]) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    collect_bound_names(stmts, &mut names);
    names
}

fn collect_bound_names(stmts: &[Stmt], names: &mut FxHashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::Assign { target, .. } => collect_target_names(target, names),
            Stmt::For { target, body, .. } => {
                collect_target_names(target, names);
                collect_bound_names(body, names);
            }
            Stmt::If { body, orelse, .. } => {
                collect_bound_names(body, names);
                collect_bound_names(orelse, names);
            }
            Stmt::With { binding, body, .. } => {
                if let Some(binding) = binding {
                    names.insert(binding.name.clone());
                }
                collect_bound_names(body, names);
            }
            Stmt::Try { body, handler, .. } => {
                collect_bound_names(body, names);
                collect_bound_names(handler, names);
            }
            Stmt::FuncDef(def) => {
                names.insert(def.name.name.clone());
                collect_bound_names(&def.body, names);
            }
            Stmt::ClassDef(def) => {
                names.insert(def.name.name.clone());
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
                names.insert(bound);
            }
            Stmt::FromImport { names: aliases, .. } => {
                for alias in aliases {
                    names.insert(alias.bound_name().to_string());
                }
            }
            _ => {}
        }
    }
}

/// Names referenced anywhere in one expression.
pub fn expr_names(expr: &Expr) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    collect_expr_names(expr, &mut names);
    names
}

/// Every name that appears anywhere in the statements, reference or binding.
pub fn find_used_names(stmts: &[Stmt]) -> FxHashSet<String> {
    let mut names = FxHashSet::default();
    let mut on_expr = |expr: &Expr| collect_expr_names(expr, &mut names);
    for stmt in stmts {
        walk_stmt_exprs(stmt, &mut on_expr);
    }
    names.extend(find_bound_names(stmts));
    names
}

fn collect_expr_names(expr: &Expr, names: &mut FxHashSet<String>) {
    if let Expr::Name(name) = expr {
        names.insert(name.name.clone());
    }
    walk_subexprs(expr, &mut |sub| collect_expr_names(sub, names));
}

/// Calls `f` on every expression directly held by a statement, recursing
/// through nested statement bodies but not into subexpressions.
fn walk_stmt_exprs(stmt: &Stmt, f: &mut dyn FnMut(&Expr)) {
    match stmt {
        Stmt::Assign { target, value, .. } => {
            walk_target_exprs(target, f);
            f(value);
        }
        Stmt::ExprStmt { expr, .. } => f(expr),
        Stmt::Assert { expr, message, .. } => {
            f(expr);
            if let Some(message) = message {
                f(message);
            }
        }
        Stmt::If {
            cond, body, orelse, ..
        } => {
            f(cond);
            for stmt in body.iter().chain(orelse) {
                walk_stmt_exprs(stmt, f);
            }
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            walk_target_exprs(target, f);
            f(iter);
            for stmt in body {
                walk_stmt_exprs(stmt, f);
            }
        }
        Stmt::FuncDef(def) => {
            for param in def.params.params.iter().chain(def.params.kwonly.iter()) {
                if let Some(default) = &param.default {
                    f(default);
                }
            }
            for stmt in &def.body {
                walk_stmt_exprs(stmt, f);
            }
        }
        Stmt::ClassDef(def) => {
            for stmt in &def.body {
                walk_stmt_exprs(stmt, f);
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(value) = value {
                f(value);
            }
        }
        Stmt::With { context, body, .. } => {
            f(context);
            for stmt in body {
                walk_stmt_exprs(stmt, f);
            }
        }
        Stmt::Try { body, handler, .. } => {
            for stmt in body.iter().chain(handler) {
                walk_stmt_exprs(stmt, f);
            }
        }
        Stmt::Import { .. }
        | Stmt::FromImport { .. }
        | Stmt::Pass { .. }
        | Stmt::Comment { .. } => {}
    }
}

fn walk_target_exprs(target: &AssignTarget, f: &mut dyn FnMut(&Expr)) {
    match target {
        AssignTarget::Name(_) => {}
        AssignTarget::Attribute { base, .. } => f(base),
        AssignTarget::Index { base, index, .. } => {
            f(base);
            f(index);
        }
        AssignTarget::Tuple { items, .. } => {
            for item in items {
                walk_target_exprs(item, f);
            }
        }
    }
}

/// Calls `f` on each direct subexpression of `expr`.
pub fn walk_subexprs(expr: &Expr, f: &mut dyn FnMut(&Expr)) {
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
                f(&arg.value);
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
                f(&clause.iter);
                if let Some(cond) = &clause.cond {
                    f(cond);
                }
            }
        }
        Expr::Yield { value, .. } => f(value),
    }
}

/// Node-kind purity check: literals, references, displays, attribute and
/// index access, and operators are effect-free; calls, comprehensions, and
/// yields are not.
pub fn is_effect_free(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } | Expr::ListComp { .. } | Expr::Yield { .. } | Expr::IfExp { .. } => {
            false
        }
        _ => {
            let mut pure = true;
            walk_subexprs(expr, &mut |sub| {
                if !is_effect_free(sub) {
                    pure = false;
                }
            });
            pure
        }
    }
}

pub fn tree_size(expr: &Expr) -> usize {
    let mut size = 1;
    walk_subexprs(expr, &mut |sub| {
        size += tree_size(sub);
    });
    size
}

pub fn contains_call(expr: &Expr) -> bool {
    if matches!(expr, Expr::Call { .. }) {
        return true;
    }
    let mut found = false;
    walk_subexprs(expr, &mut |sub| {
        if contains_call(sub) {
            found = true;
        }
    });
    found
}

fn expr_yields(expr: &Expr) -> bool {
    if matches!(expr, Expr::Yield { .. }) {
        return true;
    }
    let mut found = false;
    walk_subexprs(expr, &mut |sub| {
        if expr_yields(sub) {
            found = true;
        }
    });
    found
}

/// Whether a function body yields, without descending into nested functions.
pub fn body_contains_yield(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::FuncDef(_) | Stmt::ClassDef(_) => false,
        Stmt::Assign { value, .. } => expr_yields(value),
        Stmt::ExprStmt { expr, .. } => expr_yields(expr),
        Stmt::Assert { expr, message, .. } => {
            expr_yields(expr) || message.as_ref().is_some_and(expr_yields)
        }
        Stmt::Return { value, .. } => value.as_ref().is_some_and(expr_yields),
        Stmt::If {
            cond, body, orelse, ..
        } => expr_yields(cond) || body_contains_yield(body) || body_contains_yield(orelse),
        Stmt::For { iter, body, .. } => expr_yields(iter) || body_contains_yield(body),
        Stmt::With { context, body, .. } => expr_yields(context) || body_contains_yield(body),
        Stmt::Try { body, handler, .. } => {
            body_contains_yield(body) || body_contains_yield(handler)
        }
        _ => false,
    })
}
