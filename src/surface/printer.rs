use crate::surface::ast::{
    Arg, AssignTarget, BinOp, Expr, Params, StarKind, Stmt, UnaryOp,
};

/// Renders a program back to source text.
///
/// The output is deterministic and re-parses to a structurally identical
/// tree, so rendered text doubles as the structural-equality key for change
/// detection and import deduplication.
pub fn render_program(stmts: &[Stmt]) -> String {
    let mut out = String::new();
    for stmt in stmts {
        render_stmt(&mut out, stmt, 0);
    }
    out
}

pub fn render_expr_text(expr: &Expr) -> String {
    let mut out = String::new();
    render_expr(&mut out, expr, 0);
    out
}

fn push_indent(out: &mut String, indent: usize) {
    for _ in 0..indent {
        out.push_str("    ");
    }
}

fn render_block(out: &mut String, stmts: &[Stmt], indent: usize) {
    if stmts.is_empty() {
        push_indent(out, indent);
        out.push_str("pass\n");
        return;
    }
    for stmt in stmts {
        render_stmt(out, stmt, indent);
    }
}

fn render_stmt(out: &mut String, stmt: &Stmt, indent: usize) {
    match stmt {
        Stmt::Assign { target, value, .. } => {
            push_indent(out, indent);
            render_target(out, target, true);
            out.push_str(" = ");
            render_expr(out, value, 0);
            out.push('\n');
        }
        Stmt::ExprStmt { expr, .. } => {
            push_indent(out, indent);
            render_expr(out, expr, 0);
            out.push('\n');
        }
        Stmt::Assert { expr, message, .. } => {
            push_indent(out, indent);
            out.push_str("assert ");
            render_expr(out, expr, 0);
            if let Some(message) = message {
                out.push_str(", ");
                render_expr(out, message, 0);
            }
            out.push('\n');
        }
        Stmt::If {
            cond, body, orelse, ..
        } => {
            push_indent(out, indent);
            out.push_str("if ");
            render_expr(out, cond, 0);
            out.push_str(":\n");
            render_block(out, body, indent + 1);
            if !orelse.is_empty() {
                push_indent(out, indent);
                out.push_str("else:\n");
                render_block(out, orelse, indent + 1);
            }
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            push_indent(out, indent);
            out.push_str("for ");
            render_target(out, target, true);
            out.push_str(" in ");
            render_expr(out, iter, 0);
            out.push_str(":\n");
            render_block(out, body, indent + 1);
        }
        Stmt::FuncDef(def) => {
            for decorator in &def.decorators {
                push_indent(out, indent);
                out.push('@');
                out.push_str(&decorator.name.name);
                out.push('\n');
            }
            push_indent(out, indent);
            out.push_str("def ");
            out.push_str(&def.name.name);
            out.push('(');
            render_params(out, &def.params);
            out.push_str("):\n");
            render_block(out, &def.body, indent + 1);
        }
        Stmt::ClassDef(def) => {
            for decorator in &def.decorators {
                push_indent(out, indent);
                out.push('@');
                out.push_str(&decorator.name.name);
                out.push('\n');
            }
            push_indent(out, indent);
            out.push_str("class ");
            out.push_str(&def.name.name);
            out.push_str(":\n");
            render_block(out, &def.body, indent + 1);
        }
        Stmt::Return { value, .. } => {
            push_indent(out, indent);
            out.push_str("return");
            if let Some(value) = value {
                out.push(' ');
                render_expr(out, value, 0);
            }
            out.push('\n');
        }
        Stmt::Import { module, alias, .. } => {
            push_indent(out, indent);
            out.push_str("import ");
            out.push_str(&module.name);
            if let Some(alias) = alias {
                out.push_str(" as ");
                out.push_str(&alias.name);
            }
            out.push('\n');
        }
        Stmt::FromImport { module, names, .. } => {
            push_indent(out, indent);
            out.push_str("from ");
            out.push_str(&module.name);
            out.push_str(" import ");
            for (index, alias) in names.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(&alias.name.name);
                if let Some(as_name) = &alias.alias {
                    out.push_str(" as ");
                    out.push_str(&as_name.name);
                }
            }
            out.push('\n');
        }
        Stmt::With {
            context,
            binding,
            body,
            ..
        } => {
            push_indent(out, indent);
            out.push_str("with ");
            render_expr(out, context, 0);
            if let Some(binding) = binding {
                out.push_str(" as ");
                out.push_str(&binding.name);
            }
            out.push_str(":\n");
            render_block(out, body, indent + 1);
        }
        Stmt::Try { body, handler, .. } => {
            push_indent(out, indent);
            out.push_str("try:\n");
            render_block(out, body, indent + 1);
            push_indent(out, indent);
            out.push_str("except:\n");
            render_block(out, handler, indent + 1);
        }
        Stmt::Pass { .. } => {
            push_indent(out, indent);
            out.push_str("pass\n");
        }
        Stmt::Comment { text, .. } => {
            push_indent(out, indent);
            out.push('#');
            if !text.is_empty() {
                out.push(' ');
                out.push_str(text);
            }
            out.push('\n');
        }
    }
}

fn render_params(out: &mut String, params: &Params) {
    let mut first = true;
    let mut sep = |out: &mut String| {
        if !first {
            out.push_str(", ");
        }
        first = false;
    };
    for param in &params.params {
        sep(out);
        out.push_str(&param.name.name);
        if let Some(default) = &param.default {
            out.push('=');
            render_expr(out, default, 0);
        }
    }
    if let Some(vararg) = &params.vararg {
        sep(out);
        out.push('*');
        out.push_str(&vararg.name);
    }
    for param in &params.kwonly {
        sep(out);
        out.push_str(&param.name.name);
        if let Some(default) = &param.default {
            out.push('=');
            render_expr(out, default, 0);
        }
    }
    if let Some(kwarg) = &params.kwarg {
        sep(out);
        out.push_str("**");
        out.push_str(&kwarg.name);
    }
}

fn render_target(out: &mut String, target: &AssignTarget, toplevel: bool) {
    match target {
        AssignTarget::Name(name) => out.push_str(&name.name),
        AssignTarget::Attribute { base, attr, .. } => {
            render_expr(out, base, PREC_POSTFIX);
            out.push('.');
            out.push_str(&attr.name);
        }
        AssignTarget::Index { base, index, .. } => {
            render_expr(out, base, PREC_POSTFIX);
            out.push('[');
            render_expr(out, index, 0);
            out.push(']');
        }
        AssignTarget::Tuple { items, .. } => {
            if !toplevel {
                out.push('(');
            }
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                render_target(out, item, false);
            }
            if !toplevel {
                out.push(')');
            }
        }
    }
}

const PREC_IFEXP: u8 = 1;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_NOT: u8 = 4;
const PREC_CMP: u8 = 5;
const PREC_ARITH: u8 = 6;
const PREC_TERM: u8 = 7;
const PREC_UNARY: u8 = 8;
const PREC_POSTFIX: u8 = 9;

fn bin_prec(op: BinOp) -> u8 {
    match op {
        BinOp::Or => PREC_OR,
        BinOp::And => PREC_AND,
        BinOp::Eq
        | BinOp::Ne
        | BinOp::Lt
        | BinOp::Le
        | BinOp::Gt
        | BinOp::Ge
        | BinOp::In
        | BinOp::NotIn => PREC_CMP,
        BinOp::Add | BinOp::Sub => PREC_ARITH,
        BinOp::Mul | BinOp::Div | BinOp::Mod => PREC_TERM,
    }
}

/// Renders `expr`, parenthesizing when its precedence is below the context's.
fn render_expr(out: &mut String, expr: &Expr, min_prec: u8) {
    match expr {
        Expr::Name(name) => out.push_str(&name.name),
        Expr::Int { value, .. } => out.push_str(&value.to_string()),
        Expr::Float { value, .. } => {
            let text = value.to_string();
            out.push_str(&text);
            if !text.contains('.') {
                out.push_str(".0");
            }
        }
        Expr::Str { value, .. } => {
            out.push('"');
            for ch in value.chars() {
                match ch {
                    '\n' => out.push_str("\\n"),
                    '\t' => out.push_str("\\t"),
                    '\\' => out.push_str("\\\\"),
                    '"' => out.push_str("\\\""),
                    other => out.push(other),
                }
            }
            out.push('"');
        }
        Expr::Bool { value, .. } => out.push_str(if *value { "True" } else { "False" }),
        Expr::None { .. } => out.push_str("None"),
        Expr::List { items, .. } => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                render_expr(out, item, 0);
            }
            out.push(']');
        }
        Expr::Tuple { items, .. } => {
            out.push('(');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                render_expr(out, item, 0);
            }
            if items.len() == 1 {
                out.push(',');
            }
            out.push(')');
        }
        Expr::Dict { entries, .. } => {
            out.push('{');
            for (index, (key, value)) in entries.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                render_expr(out, key, 0);
                out.push_str(": ");
                render_expr(out, value, 0);
            }
            out.push('}');
        }
        Expr::Attribute { base, attr, .. } => {
            render_expr(out, base, PREC_POSTFIX);
            out.push('.');
            out.push_str(&attr.name);
        }
        Expr::Index { base, index, .. } => {
            render_expr(out, base, PREC_POSTFIX);
            out.push('[');
            render_expr(out, index, 0);
            out.push(']');
        }
        Expr::Call { func, args, .. } => {
            render_expr(out, func, PREC_POSTFIX);
            out.push('(');
            for (index, arg) in args.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                render_arg(out, arg);
            }
            out.push(')');
        }
        Expr::Unary { op, operand, .. } => {
            let (prec, text) = match op {
                UnaryOp::Neg => (PREC_UNARY, "-"),
                UnaryOp::Not => (PREC_NOT, "not "),
            };
            parenthesize(out, prec < min_prec, |out| {
                out.push_str(text);
                render_expr(out, operand, prec);
            });
        }
        Expr::Binary {
            op, left, right, ..
        } => {
            let prec = bin_prec(*op);
            // Comparisons do not chain in this grammar, so both sides of a
            // comparison need parentheses around nested comparisons.
            let left_min = if prec == PREC_CMP { prec + 1 } else { prec };
            parenthesize(out, prec < min_prec, |out| {
                render_expr(out, left, left_min);
                out.push(' ');
                out.push_str(op.symbol());
                out.push(' ');
                render_expr(out, right, prec + 1);
            });
        }
        Expr::IfExp {
            cond, then, orelse, ..
        } => {
            parenthesize(out, PREC_IFEXP < min_prec, |out| {
                render_expr(out, then, PREC_OR);
                out.push_str(" if ");
                render_expr(out, cond, PREC_OR);
                out.push_str(" else ");
                render_expr(out, orelse, PREC_IFEXP);
            });
        }
        Expr::ListComp { elt, clauses, .. } => {
            out.push('[');
            render_expr(out, elt, 0);
            for clause in clauses {
                out.push_str(" for ");
                render_target(out, &clause.target, true);
                out.push_str(" in ");
                render_expr(out, &clause.iter, PREC_OR);
                if let Some(cond) = &clause.cond {
                    out.push_str(" if ");
                    render_expr(out, cond, PREC_OR);
                }
            }
            out.push(']');
        }
        Expr::Yield { value, .. } => {
            out.push_str("yield ");
            render_expr(out, value, 0);
        }
    }
}

fn render_arg(out: &mut String, arg: &Arg) {
    match arg.star {
        StarKind::Star => out.push('*'),
        StarKind::DoubleStar => out.push_str("**"),
        StarKind::None => {}
    }
    if let Some(keyword) = &arg.keyword {
        out.push_str(&keyword.name);
        out.push('=');
    }
    render_expr(out, &arg.value, 0);
}

fn parenthesize(out: &mut String, needed: bool, inner: impl FnOnce(&mut String)) {
    if needed {
        out.push('(');
    }
    inner(out);
    if needed {
        out.push(')');
    }
}
