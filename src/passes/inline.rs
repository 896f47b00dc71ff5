//! The inline pass: expands qualifying call sites into their callee bodies.
//!
//! Per statement, at most one construct is expanded per attempt, searched in
//! priority order: a conditional expression, a comprehension whose element
//! (or first iterable) contains a qualifying call, a property-style
//! attribute access on a qualifying object, then a plain qualifying call.
//! Finding two independent candidates in one statement is a hard error; the
//! one-rewrite-per-statement invariant is what the cleanup passes depend on.

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::inliner::NameGen;
use crate::runtime::builtins::BUILTIN_NAMES;
use crate::runtime::values::{BoundMethodValue, ClassValue, FunctionValue, Value};
use crate::runtime::{ModuleRegistry, MAIN_MODULE};
use crate::surface::ast::{
    make_assign, make_call, Arg, AssignTarget, CompClause, Expr, ImportAlias, SpannedName,
    StarKind, Stmt, UnaryOp, SEP,
};
use crate::surface::parser::parse_program;
use crate::surface::printer::render_expr_text;
use crate::targets::{eval_static, is_resolvable_form, resolve_callee, Callee, CalleeKind, Target};
use crate::trace::Trace;
use crate::visit::{find_bound_names, find_used_names, rename_in_stmts};
use crate::Error;

use super::{missing_trace, PassContext, PassId};

pub fn run(stmts: Vec<Stmt>, cx: &mut PassContext) -> Result<Vec<Stmt>, Error> {
    let trace = cx
        .trace
        .as_mut()
        .ok_or_else(|| missing_trace(PassId::Inline))?;
    let mut st = InlineState {
        trace,
        targets: cx.targets,
        names: &mut *cx.names,
        add_comments: cx.options.add_comments,
        registry: cx.registry,
    };
    inline_block(stmts, &mut st, false)
}

/// Return statements in a body, not counting nested definitions.
fn returns_in(stmts: &[Stmt]) -> usize {
    stmts
        .iter()
        .map(|stmt| match stmt {
            Stmt::Return { .. } => 1,
            Stmt::If { body, orelse, .. } => returns_in(body) + returns_in(orelse),
            Stmt::For { body, .. } | Stmt::With { body, .. } => returns_in(body),
            Stmt::Try { body, handler, .. } => returns_in(body) + returns_in(handler),
            _ => 0,
        })
        .sum()
}

fn any_return(stmts: &[Stmt]) -> bool {
    returns_in(stmts) > 0
}

/// Anything other than a single return as the final statement counts as an
/// early return.
fn has_early_return(stmts: &[Stmt]) -> bool {
    let total = returns_in(stmts);
    total > 0 && !(total == 1 && matches!(stmts.last(), Some(Stmt::Return { .. })))
}

/// A program-local function defined inside another function closes over a
/// frame the rewritten program cannot name; splicing its body would leave
/// its free variables dangling. Such callees stay as calls.
fn closure_free(st: &InlineState, callee: &Callee) -> bool {
    match &callee.kind {
        CalleeKind::Function(func) if func.module == crate::runtime::MAIN_MODULE => {
            func.env.ptr_eq(&st.trace.globals)
        }
        _ => true,
    }
}

/// Whether an expansion of this callee stays correct when its statements
/// execute once per loop iteration. The membership-guarded return rewrite is
/// only sound for statements that execute once, so loop-resident call sites
/// take the plain trailing-return form, and callees that need the guard do
/// not qualify there.
fn loop_safe(callee: &Callee) -> bool {
    match &callee.kind {
        CalleeKind::Function(func) => {
            if func.is_generator {
                !any_return(&func.def.body)
            } else {
                !has_early_return(&func.def.body)
            }
        }
        CalleeKind::Class(class) => match class.methods.get("__init__") {
            Some(init) => !any_return(&init.def.body),
            None => true,
        },
        CalleeKind::Method(_) | CalleeKind::Builtin(_) => true,
    }
}

struct InlineState<'a> {
    trace: &'a mut Trace,
    targets: &'a [Target],
    names: &'a mut NameGen,
    add_comments: bool,
    registry: &'a ModuleRegistry,
}

impl InlineState<'_> {
    fn qualifies(&self, site: &Expr, callee: &Callee) -> bool {
        if matches!(callee.kind, CalleeKind::Builtin(_)) {
            return false;
        }
        callee.is_source_local()
            || self
                .targets
                .iter()
                .any(|target| target.should_inline(site, callee))
    }
}

struct FoundCall {
    call: Expr,
    ret_var: String,
    callee: Callee,
}

struct FoundProp {
    base: Expr,
    getter: Rc<FunctionValue>,
    ret_var: String,
}

fn inline_block(stmts: Vec<Stmt>, st: &mut InlineState, in_loop: bool) -> Result<Vec<Stmt>, Error> {
    let mut out = Vec::new();
    for stmt in stmts {
        match stmt {
            Stmt::If {
                cond,
                body,
                orelse,
                span,
            } => {
                let body = inline_block(body, st, in_loop)?;
                let orelse = inline_block(orelse, st, in_loop)?;
                out.push(Stmt::If {
                    cond,
                    body,
                    orelse,
                    span,
                });
            }
            Stmt::Try {
                body,
                handler,
                span,
            } => {
                let body = inline_block(body, st, in_loop)?;
                let handler = inline_block(handler, st, in_loop)?;
                out.push(Stmt::Try {
                    body,
                    handler,
                    span,
                });
            }
            Stmt::For {
                target,
                iter,
                body,
                span,
            } => {
                let body = inline_block(body, st, true)?;
                // The iterable is processed as a pseudo-statement so a
                // qualifying call in it is hoisted above the loop.
                let pseudo = Stmt::ExprStmt { expr: iter, span };
                let mut expanded = handle_stmt(pseudo, st, in_loop)?;
                let iter = match expanded.pop() {
                    Some(Stmt::ExprStmt { expr, .. }) => expr,
                    _ => {
                        return Err(Error::Unsupported(
                            "loop iterable expansion lost its expression".to_string(),
                        ))
                    }
                };
                out.extend(expanded);
                out.push(Stmt::For {
                    target,
                    iter,
                    body,
                    span,
                });
            }
            Stmt::With {
                context,
                binding,
                body,
                span,
            } => {
                let body = inline_block(body, st, in_loop)?;
                out.extend(expand_with(context, binding, body, span, st)?);
            }
            stmt @ (Stmt::Assign { .. } | Stmt::Assert { .. } | Stmt::ExprStmt { .. }) => {
                out.extend(handle_stmt(stmt, st, in_loop)?);
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// One expansion attempt on a single simple statement. Returns the hoisted
/// statements followed by the (rewritten) statement itself.
fn handle_stmt(mut stmt: Stmt, st: &mut InlineState, in_loop: bool) -> Result<Vec<Stmt>, Error> {
    // 1. Conditional expression.
    if let Some((ret_var, cond, then, orelse)) = find_ifexp(&mut stmt, st.names) {
        let assign = |value: Expr| make_assign(ret_var.clone(), value);
        let hoisted = Stmt::If {
            cond,
            body: vec![assign(then)],
            orelse: vec![assign(orelse)],
            span: Default::default(),
        };
        return Ok(vec![hoisted, stmt]);
    }

    // 2. Comprehension containing a qualifying call.
    let mut found_comp = None;
    with_stmt_exprs(&mut stmt, &mut |expr| {
        scan_comp(expr, st, &mut found_comp, in_loop)
    })?;
    if let Some(comp) = found_comp {
        let mut out = expand_comprehension(comp, st, in_loop)?;
        out.push(stmt);
        return Ok(out);
    }

    // 3. Property-style attribute access.
    let mut found_prop = None;
    with_stmt_exprs(&mut stmt, &mut |expr| {
        scan_property(expr, st, &mut found_prop, in_loop)
    })?;
    if let Some(prop) = found_prop {
        let call = make_call(
            Expr::name(format!("{}_getter", prop.getter.def.name.name)),
            vec![prop.base],
        );
        let mut out = inline_function(st, &prop.getter, &call, &prop.ret_var, None, None, in_loop, false)?;
        out.push(stmt);
        return Ok(out);
    }

    // 4. Plain qualifying call.
    let mut found_call = None;
    with_stmt_exprs(&mut stmt, &mut |expr| {
        scan_calls(expr, st, &mut found_call, in_loop)
    })?;
    if let Some(found) = found_call {
        let mut out = expand_candidate(found, st, in_loop)?;
        out.push(stmt);
        return Ok(out);
    }

    Ok(vec![stmt])
}

/// Applies `f` to each expression directly held by a simple statement.
fn with_stmt_exprs(
    stmt: &mut Stmt,
    f: &mut dyn FnMut(&mut Expr) -> Result<(), Error>,
) -> Result<(), Error> {
    match stmt {
        Stmt::Assign { target, value, .. } => {
            with_target_exprs(target, f)?;
            f(value)
        }
        Stmt::Assert { expr, message, .. } => {
            f(expr)?;
            match message {
                Some(message) => f(message),
                None => Ok(()),
            }
        }
        Stmt::ExprStmt { expr, .. } => f(expr),
        _ => Ok(()),
    }
}

fn with_target_exprs(
    target: &mut AssignTarget,
    f: &mut dyn FnMut(&mut Expr) -> Result<(), Error>,
) -> Result<(), Error> {
    match target {
        AssignTarget::Name(_) => Ok(()),
        AssignTarget::Attribute { base, .. } => f(base),
        AssignTarget::Index { base, index, .. } => {
            f(base)?;
            f(index)
        }
        AssignTarget::Tuple { items, .. } => {
            for item in items {
                with_target_exprs(item, f)?;
            }
            Ok(())
        }
    }
}

/// Finds and detaches the first conditional expression in the statement.
fn find_ifexp(stmt: &mut Stmt, names: &mut NameGen) -> Option<(String, Expr, Expr, Expr)> {
    let mut found = None;
    let mut scan = |expr: &mut Expr| -> Result<(), Error> {
        scan_ifexp(expr, names, &mut found);
        Ok(())
    };
    let _ = with_stmt_exprs(stmt, &mut scan);
    found
}

fn scan_ifexp(
    expr: &mut Expr,
    names: &mut NameGen,
    found: &mut Option<(String, Expr, Expr, Expr)>,
) {
    if found.is_some() {
        return;
    }
    if matches!(expr, Expr::IfExp { .. }) {
        let ret_var = names.fresh("ifexp");
        let taken = std::mem::replace(expr, Expr::name(ret_var.clone()));
        if let Expr::IfExp {
            cond, then, orelse, ..
        } = taken
        {
            *found = Some((ret_var, *cond, *then, *orelse));
        }
        return;
    }
    // Comprehension-local conditionals reference loop variables and cannot
    // be hoisted above the statement.
    if matches!(expr, Expr::ListComp { .. }) {
        return;
    }
    visit_subexprs_mut(expr, &mut |sub| scan_ifexp(sub, names, found));
}

struct FoundComp {
    elt: Expr,
    clauses: Vec<CompClause>,
    ret_var: String,
    call: FoundCall,
    call_in_elt: bool,
}

fn scan_comp(
    expr: &mut Expr,
    st: &mut InlineState,
    found: &mut Option<FoundComp>,
    in_loop: bool,
) -> Result<(), Error> {
    if found.is_some() {
        return Ok(());
    }
    if let Expr::ListComp { elt, clauses, .. } = expr {
        // The element executes once per iteration of the loops the
        // comprehension expands into.
        let mut call = None;
        scan_calls(elt, st, &mut call, true)?;
        let call_in_elt = call.is_some();
        if !call_in_elt {
            // The first iterable is evaluated exactly once, so a call there
            // can be hoisted above the whole comprehension.
            if let Some(first) = clauses.first_mut() {
                scan_calls(&mut first.iter, st, &mut call, in_loop)?;
            }
        }
        if let Some(call) = call {
            let ret_var = st.names.fresh("comp");
            let taken = std::mem::replace(expr, Expr::name(ret_var.clone()));
            if let Expr::ListComp { elt, clauses, .. } = taken {
                *found = Some(FoundComp {
                    elt: *elt,
                    clauses,
                    ret_var,
                    call,
                    call_in_elt,
                });
            }
        }
        return Ok(());
    }
    let mut result = Ok(());
    visit_subexprs_mut(expr, &mut |sub| {
        if result.is_ok() {
            result = scan_comp(sub, st, found, in_loop);
        }
    });
    result
}

fn scan_property(
    expr: &mut Expr,
    st: &mut InlineState,
    found: &mut Option<FoundProp>,
    in_loop: bool,
) -> Result<(), Error> {
    let matched: Option<Rc<FunctionValue>> = match &*expr {
        Expr::Attribute { base, attr, .. } if is_resolvable_form(base) => {
            // A base that no longer evaluates is simply not a candidate.
            match eval_static(base, st.trace) {
                Ok(Value::Instance(instance)) => {
                    let class = instance.borrow().class.clone();
                    match class.properties.get(&attr.name).cloned() {
                        Some(getter) => {
                            let callee = Callee {
                                kind: CalleeKind::Method(Rc::new(BoundMethodValue {
                                    receiver: Value::Instance(instance.clone()),
                                    class: class.clone(),
                                    func: getter.clone(),
                                })),
                                module: getter.module.clone(),
                                qualname: getter.qualname.clone(),
                            };
                            let safe = !in_loop || !has_early_return(&getter.def.body);
                            (safe && st.qualifies(expr, &callee)).then_some(getter)
                        }
                        None => None,
                    }
                }
                _ => None,
            }
        }
        _ => None,
    };

    if let Some(getter) = matched {
        if let Some(existing) = found {
            return Err(Error::AmbiguousRewrite {
                first: render_expr_text(&existing.base),
                second: render_expr_text(expr),
            });
        }
        let attr_name = getter.def.name.name.clone();
        let ret_var = st.names.fresh(&format!("prop_{attr_name}"));
        let taken = std::mem::replace(expr, Expr::name(ret_var.clone()));
        if let Expr::Attribute { base, .. } = taken {
            *found = Some(FoundProp {
                base: *base,
                getter,
                ret_var,
            });
        }
        return Ok(());
    }

    if matches!(expr, Expr::ListComp { .. }) {
        return Ok(());
    }
    let mut result = Ok(());
    visit_subexprs_mut(expr, &mut |sub| {
        if result.is_ok() {
            result = scan_property(sub, st, found, in_loop);
        }
    });
    result
}

fn scan_calls(
    expr: &mut Expr,
    st: &mut InlineState,
    found: &mut Option<FoundCall>,
    in_loop: bool,
) -> Result<(), Error> {
    let matched: Option<Callee> = match &*expr {
        Expr::Call { func, .. } => match resolve_callee(func, st.trace)? {
            Some(callee)
                if (!in_loop || loop_safe(&callee))
                    && closure_free(st, &callee)
                    && st.qualifies(expr, &callee) =>
            {
                Some(callee)
            }
            _ => None,
        },
        _ => None,
    };

    if let Some(callee) = matched {
        if let Some(existing) = found {
            return Err(Error::AmbiguousRewrite {
                first: render_expr_text(&existing.call),
                second: render_expr_text(expr),
            });
        }
        let func_name = match &*expr {
            Expr::Call { func, .. } => match func.as_ref() {
                Expr::Name(name) => name.name.clone(),
                Expr::Attribute { attr, .. } => attr.name.clone(),
                _ => "func".to_string(),
            },
            _ => "func".to_string(),
        };
        let ret_var = st.names.fresh(&format!("{func_name}_ret"));
        let call = std::mem::replace(expr, Expr::name(ret_var.clone()));
        *found = Some(FoundCall {
            call,
            ret_var,
            callee,
        });
        return Ok(());
    }

    // Calls inside comprehensions reference loop variables; only the
    // comprehension scan may hoist those.
    if matches!(expr, Expr::ListComp { .. }) {
        return Ok(());
    }
    let mut result = Ok(());
    visit_subexprs_mut(expr, &mut |sub| {
        if result.is_ok() {
            result = scan_calls(sub, st, found, in_loop);
        }
    });
    result
}

fn expand_candidate(
    found: FoundCall,
    st: &mut InlineState,
    in_loop: bool,
) -> Result<Vec<Stmt>, Error> {
    let FoundCall {
        call,
        ret_var,
        callee,
    } = found;
    match callee.kind {
        CalleeKind::Method(method) => expand_method(st, &method, &call, &ret_var),
        CalleeKind::Class(class) => inline_constructor(st, &class, &call, &ret_var, in_loop),
        CalleeKind::Function(func) => {
            let has_decorator = func
                .def
                .decorators
                .iter()
                .any(|decorator| decorator.name.name != "property");
            if has_decorator {
                inline_decorated(st, &func, &call, &ret_var)
            } else if func.is_generator {
                inline_generator(st, &func, &call, &ret_var, in_loop)
            } else {
                inline_function(st, &func, &call, &ret_var, None, None, in_loop, false)
            }
        }
        CalleeKind::Builtin(name) => Err(Error::Unsupported(format!(
            "cannot inline builtin `{name}`"
        ))),
    }
}

fn expand_comprehension(
    comp: FoundComp,
    st: &mut InlineState,
    in_loop: bool,
) -> Result<Vec<Stmt>, Error> {
    let FoundComp {
        elt,
        clauses,
        ret_var,
        call,
        call_in_elt,
    } = comp;
    let call_stmts = expand_candidate(call, st, if call_in_elt { true } else { in_loop })?;

    let append = Stmt::ExprStmt {
        expr: make_call(
            Expr::Attribute {
                base: Box::new(Expr::name(ret_var.clone())),
                attr: SpannedName::synthetic("append"),
                span: Default::default(),
            },
            vec![elt],
        ),
        span: Default::default(),
    };

    let mut innermost = Vec::new();
    if call_in_elt {
        innermost.extend(call_stmts.iter().cloned());
    }
    innermost.push(append);

    let mut body = innermost;
    for clause in clauses.into_iter().rev() {
        if let Some(cond) = clause.cond {
            body = vec![Stmt::If {
                cond,
                body,
                orelse: Vec::new(),
                span: Default::default(),
            }];
        }
        body = vec![Stmt::For {
            target: clause.target,
            iter: clause.iter,
            body,
            span: Default::default(),
        }];
    }

    let mut out = Vec::new();
    if !call_in_elt {
        out.extend(call_stmts);
    }
    out.push(make_assign(
        ret_var,
        Expr::List {
            items: Vec::new(),
            span: Default::default(),
        },
    ));
    out.extend(body);
    Ok(out)
}

/// `obj.method(args)` becomes `Cls.method(obj, args)` plus an import for
/// `Cls`; the unbound call is expanded on the next fixpoint iteration.
fn expand_method(
    _st: &mut InlineState,
    method: &BoundMethodValue,
    call: &Expr,
    ret_var: &str,
) -> Result<Vec<Stmt>, Error> {
    let Expr::Call { func, args, .. } = call else {
        return Err(Error::Unsupported("method expansion on a non-call".to_string()));
    };
    let Expr::Attribute { base, attr, .. } = func.as_ref() else {
        return Err(Error::Unsupported(
            "method calls must be expressed as `object.method(...)`".to_string(),
        ));
    };

    let class = &method.class;
    let mut out = Vec::new();
    if class.module != MAIN_MODULE {
        out.push(import_symbol(&class.module, &class.name));
    }

    let mut new_args = vec![Arg::positional((**base).clone())];
    new_args.extend(args.iter().cloned());
    let new_call = Expr::Call {
        func: Box::new(Expr::Attribute {
            base: Box::new(Expr::name(class.name.clone())),
            attr: attr.clone(),
            span: Default::default(),
        }),
        args: new_args,
        span: Default::default(),
    };
    out.push(make_assign(ret_var, new_call));
    Ok(out)
}

/// Constructor expansion: raw allocation with `__new__`, then the
/// initializer inlined with the allocated instance as leading argument.
fn inline_constructor(
    st: &mut InlineState,
    class: &Rc<ClassValue>,
    call: &Expr,
    ret_var: &str,
    in_loop: bool,
) -> Result<Vec<Stmt>, Error> {
    let Expr::Call { func, args, span } = call else {
        return Err(Error::Unsupported(
            "constructor expansion on a non-call".to_string(),
        ));
    };

    let mut out = Vec::new();
    if class.module != MAIN_MODULE {
        out.push(import_symbol(&class.module, &class.name));
    }
    out.push(make_assign(
        ret_var,
        make_call(Expr::name("__new__"), vec![Expr::name(class.name.clone())]),
    ));

    if let Some(init) = class.methods.get("__init__").cloned() {
        let mut init_args = vec![Arg::positional(Expr::name(ret_var))];
        init_args.extend(args.iter().cloned());
        let init_call = Expr::Call {
            func: func.clone(),
            args: init_args,
            span: *span,
        };
        out.extend(inline_function(
            st,
            &init,
            &init_call,
            ret_var,
            Some(class.clone()),
            None,
            in_loop,
            true,
        )?);
    }
    Ok(out)
}

/// Generators materialize eagerly: the result becomes a list, every yield an
/// append to it. Lazy or partial consumption is not preserved.
fn inline_generator(
    st: &mut InlineState,
    func: &Rc<FunctionValue>,
    call: &Expr,
    ret_var: &str,
    in_loop: bool,
) -> Result<Vec<Stmt>, Error> {
    let mut body = func.def.body.clone();
    replace_yields(&mut body, ret_var);
    let mut out = vec![make_assign(
        ret_var,
        Expr::List {
            items: Vec::new(),
            span: Default::default(),
        },
    )];
    out.extend(inline_function(
        st,
        func,
        call,
        ret_var,
        None,
        Some(body),
        in_loop,
        true,
    )?);
    Ok(out)
}

/// A single non-builtin decorator: emit the renamed undecorated definition
/// and rewrite the call into `decorator(renamed)(args)`.
fn inline_decorated(
    st: &mut InlineState,
    func: &Rc<FunctionValue>,
    call: &Expr,
    ret_var: &str,
) -> Result<Vec<Stmt>, Error> {
    let Expr::Call { args, .. } = call else {
        return Err(Error::Unsupported(
            "decorator expansion on a non-call".to_string(),
        ));
    };
    let decorators: Vec<_> = func
        .def
        .decorators
        .iter()
        .filter(|decorator| decorator.name.name != "property")
        .collect();
    let [decorator] = decorators.as_slice() else {
        return Err(Error::Unsupported(
            "only a single decorator can be expanded".to_string(),
        ));
    };

    let renamed = st.names.fresh(&func.def.name.name);
    let mut def = (*func.def).clone();
    def.name = SpannedName::synthetic(renamed.clone());
    def.decorators = Vec::new();

    let wrapped = Expr::Call {
        func: Box::new(make_call(
            Expr::name(decorator.name.name.clone()),
            vec![Expr::name(renamed)],
        )),
        args: args.clone(),
        span: Default::default(),
    };
    Ok(vec![Stmt::FuncDef(def), make_assign(ret_var, wrapped)])
}

/// Scoped-resource expansion: a qualifying `with ctx [as name]:` block
/// becomes an explicit enter call, the body, and an exit call.
fn expand_with(
    context: Expr,
    binding: Option<SpannedName>,
    body: Vec<Stmt>,
    span: crate::diagnostics::Span,
    st: &mut InlineState,
) -> Result<Vec<Stmt>, Error> {
    let class = if is_resolvable_form(&context) {
        match eval_static(&context, st.trace) {
            Ok(Value::Instance(instance)) => {
                let class = instance.borrow().class.clone();
                let callee = Callee {
                    kind: CalleeKind::Class(class.clone()),
                    module: class.module.clone(),
                    qualname: class.qualname.clone(),
                };
                st.qualifies(&context, &callee).then_some(class)
            }
            _ => None,
        }
    } else {
        None
    };

    let Some(class) = class else {
        return Ok(vec![Stmt::With {
            context,
            binding,
            body,
            span,
        }]);
    };

    let has_enter = class.methods.contains_key("enter");
    let has_exit = class.methods.contains_key("exit");

    let ctx_var = match (&binding, has_enter) {
        (Some(binding), false) => binding.name.clone(),
        _ => st.names.fresh("ctx"),
    };

    let mut out = vec![make_assign(ctx_var.clone(), context)];
    if has_enter {
        let enter_call = make_call(
            Expr::Attribute {
                base: Box::new(Expr::name(ctx_var.clone())),
                attr: SpannedName::synthetic("enter"),
                span: Default::default(),
            },
            Vec::new(),
        );
        match &binding {
            Some(binding) => out.push(make_assign(binding.name.clone(), enter_call)),
            None => out.push(Stmt::ExprStmt {
                expr: enter_call,
                span: Default::default(),
            }),
        }
    }
    out.extend(body);
    if has_exit {
        out.push(Stmt::ExprStmt {
            expr: make_call(
                Expr::Attribute {
                    base: Box::new(Expr::name(ctx_var)),
                    attr: SpannedName::synthetic("exit"),
                    span: Default::default(),
                },
                Vec::new(),
            ),
            span: Default::default(),
        });
    }
    Ok(out)
}

/// Callable expansion. Copies the callee body under fresh names, binds
/// parameters from the call-site syntax, rewrites returns into guarded
/// assignments of `ret_var`, and prepends imports for the body's non-local
/// references.
#[allow(clippy::too_many_arguments)]
fn inline_function(
    st: &mut InlineState,
    func: &Rc<FunctionValue>,
    call: &Expr,
    ret_var: &str,
    cls: Option<Rc<ClassValue>>,
    body_override: Option<Vec<Stmt>>,
    in_loop: bool,
    ret_prebound: bool,
) -> Result<Vec<Stmt>, Error> {
    let Expr::Call {
        func: call_func,
        args: call_args,
        span: call_span,
    } = call
    else {
        return Err(Error::Unsupported("inline target is not a call".to_string()));
    };

    let def = func.def.clone();
    let fresh_fn_name = st.names.fresh(&def.name.name);
    let mut body = body_override.unwrap_or_else(|| def.body.clone());

    let mut new_stmts: Vec<Stmt> = Vec::new();
    if st.add_comments {
        new_stmts.push(Stmt::Comment {
            text: render_expr_text(call),
            span: Default::default(),
        });
    }

    // Methods reference their class through `self.method(...)` calls; those
    // become explicit `Cls.method(self, ...)` calls.
    let first_is_self = def
        .params
        .params
        .first()
        .is_some_and(|param| param.name.name == "self");
    let mut cls = cls;
    if first_is_self && cls.is_none() {
        if let Expr::Attribute { base, .. } = call_func.as_ref() {
            if let Ok(Value::Class(class)) = eval_static(base, st.trace) {
                cls = Some(class);
            }
        }
    }
    if let Some(class) = &cls {
        replace_self_calls(&mut body, &class.name);
    }

    // Rename every locally-bound non-parameter name to a collision-free one.
    let params = &def.params;
    let mut param_set: FxHashSet<&str> = params
        .params
        .iter()
        .chain(params.kwonly.iter())
        .map(|param| param.name.name.as_str())
        .collect();
    if let Some(vararg) = &params.vararg {
        param_set.insert(vararg.name.as_str());
    }
    if let Some(kwarg) = &params.kwarg {
        param_set.insert(kwarg.name.as_str());
    }

    let assigned = find_bound_names(&body);
    let closed = closed_vars(&body);
    let mut locals: Vec<&String> = assigned
        .iter()
        .filter(|name| !param_set.contains(name.as_str()))
        .collect();
    locals.sort();
    for name in locals {
        rename_in_stmts(&mut body, name, &format!("{name}{SEP}{fresh_fn_name}"));
    }

    // Spread arguments expand to indexed accesses; sizes and keys come from
    // the traced environment.
    let star_arg = call_args
        .iter()
        .find(|arg| arg.star == StarKind::Star)
        .map(|arg| arg.value.clone());
    let mut call_star_args: Vec<Expr> = Vec::new();
    if let Some(star) = &star_arg {
        let value = eval_static(star, st.trace)?;
        let count = match &value {
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            _ => {
                return Err(Error::Eval {
                    expr: render_expr_text(star),
                })
            }
        };
        call_star_args = (0..count)
            .map(|index| Expr::Index {
                base: Box::new(star.clone()),
                index: Box::new(Expr::Int {
                    value: index as i64,
                    span: Default::default(),
                }),
                span: Default::default(),
            })
            .collect();
    }

    let star_kwarg = call_args
        .iter()
        .find(|arg| arg.star == StarKind::DoubleStar)
        .map(|arg| arg.value.clone());
    let mut call_star_kwarg: Vec<(String, Expr)> = Vec::new();
    if let Some(star) = &star_kwarg {
        // Expanding by trace-end keys is unsound if the dict is written
        // again after the call: the key set at call time may differ.
        if let Expr::Name(name) = star {
            let call_line = call_span.start.line;
            let mutated_after = st
                .trace
                .writes(&name.name)
                .iter()
                .any(|event| event.line > call_line);
            if mutated_after {
                return Err(Error::PassAborted {
                    pass: "inline",
                    reason: format!(
                        "`{}` is written after the call site; expanding its keys would be unsound",
                        name.name
                    ),
                });
            }
        }
        let value = eval_static(star, st.trace)?;
        let Value::Dict(entries) = &value else {
            return Err(Error::Eval {
                expr: render_expr_text(star),
            });
        };
        for (key, _) in entries.borrow().iter() {
            let Value::Str(key) = key else {
                return Err(Error::Eval {
                    expr: render_expr_text(star),
                });
            };
            call_star_kwarg.push((
                key.as_str().to_string(),
                Expr::Index {
                    base: Box::new(star.clone()),
                    index: Box::new(Expr::string(key.as_str())),
                    span: Default::default(),
                },
            ));
        }
    }

    let mut call_anon_args: Vec<Expr> = call_args
        .iter()
        .filter(|arg| arg.star == StarKind::None && arg.keyword.is_none())
        .map(|arg| arg.value.clone())
        .collect();
    let mut call_kwargs: Vec<(String, Expr)> = call_args
        .iter()
        .filter_map(|arg| {
            arg.keyword
                .as_ref()
                .map(|keyword| (keyword.name.clone(), arg.value.clone()))
        })
        .collect();

    let mut bind_stmts: Vec<Stmt> = Vec::new();
    let mut bind = |k: &str, v: Expr, body: &mut Vec<Stmt>, bind_stmts: &mut Vec<Stmt>| {
        // A direct name-for-name binding substitutes instead of aliasing,
        // unless the parameter is reassigned or closed over.
        if let Expr::Name(arg_name) = &v {
            if !assigned.contains(k) && !closed.contains(k) {
                rename_in_stmts(body, k, &arg_name.name);
                return;
            }
        }
        let uniq = format!("{k}{SEP}{fresh_fn_name}");
        rename_in_stmts(body, k, &uniq);
        bind_stmts.push(make_assign(uniq, v));
    };

    for param in &params.params {
        let k = param.name.name.as_str();
        let v = if !call_anon_args.is_empty() {
            call_anon_args.remove(0)
        } else if !call_star_args.is_empty() {
            call_star_args.remove(0)
        } else if let Some(index) = call_kwargs.iter().position(|(key, _)| key == k) {
            call_kwargs.remove(index).1
        } else if let Some(index) = call_star_kwarg.iter().position(|(key, _)| key == k) {
            call_star_kwarg.remove(index).1
        } else if let Some(default) = &param.default {
            default.clone()
        } else {
            return Err(Error::Eval {
                expr: render_expr_text(call),
            });
        };
        bind(k, v, &mut body, &mut bind_stmts);
    }

    for param in &params.kwonly {
        let k = param.name.name.as_str();
        let v = if let Some(index) = call_kwargs.iter().position(|(key, _)| key == k) {
            call_kwargs.remove(index).1
        } else if let Some(index) = call_star_kwarg.iter().position(|(key, _)| key == k) {
            call_star_kwarg.remove(index).1
        } else if let Some(default) = &param.default {
            default.clone()
        } else {
            return Err(Error::Eval {
                expr: render_expr_text(call),
            });
        };
        bind(k, v, &mut body, &mut bind_stmts);
    }

    if let Some(vararg) = &params.vararg {
        let uniq = format!("{}{SEP}{fresh_fn_name}", vararg.name);
        rename_in_stmts(&mut body, &vararg.name, &uniq);
        let mut items = call_anon_args.split_off(0);
        items.append(&mut call_star_args);
        bind_stmts.push(make_assign(
            uniq,
            Expr::List {
                items,
                span: Default::default(),
            },
        ));
    }

    if let Some(kwarg) = &params.kwarg {
        let uniq = format!("{}{SEP}{fresh_fn_name}", kwarg.name);
        rename_in_stmts(&mut body, &kwarg.name, &uniq);
        let mut entries: Vec<(Expr, Expr)> = call_kwargs
            .drain(..)
            .map(|(key, value)| (Expr::string(key), value))
            .collect();
        entries.extend(
            call_star_kwarg
                .drain(..)
                .map(|(key, value)| (Expr::string(key), value)),
        );
        bind_stmts.push(make_assign(
            uniq,
            Expr::Dict {
                entries,
                span: Default::default(),
            },
        ));
    }

    // Reify the implicit return, then turn returns into assignments of the
    // result variable: membership-guarded first-one-wins at straight-line
    // sites, the plain trailing form inside loops (the candidate scan only
    // admits loop-safe callees there).
    let ends_with_return = matches!(body.last(), Some(Stmt::Return { .. }));
    if cls.is_none() && !ret_prebound && !ends_with_return {
        body.push(Stmt::Return {
            value: Some(Expr::None {
                span: Default::default(),
            }),
            span: Default::default(),
        });
    }
    let body = if in_loop {
        replace_returns_plain(body, ret_var)
    } else {
        replace_returns(body, ret_var).0
    };

    // Imports for names the body resolves in the callee's defining scope.
    let mut imports: Vec<Stmt> = Vec::new();
    if func.module != MAIN_MODULE {
        let mut used: Vec<String> = find_used_names(&body).into_iter().collect();
        used.sort();
        for name in used {
            if BUILTIN_NAMES.contains(&name.as_str()) || name == "self" {
                continue;
            }
            if let Some(value) = func.env.get(&name) {
                if let Some(stmt) = generate_import(st, &name, &value, &func.module)? {
                    imports.push(stmt);
                }
            }
        }
    }

    new_stmts.extend(imports);
    new_stmts.extend(bind_stmts);
    new_stmts.extend(body);
    Ok(new_stmts)
}

/// Import/reference statement for one (name, runtime value) pair resolved
/// from the callee's defining unit.
fn generate_import(
    st: &mut InlineState,
    name: &str,
    value: &Value,
    defining_module: &str,
) -> Result<Option<Stmt>, Error> {
    // If the defining module's own source imports this name, reuse that
    // exact import statement.
    if let Some(stmt) = module_import_binding(st.registry, defining_module, name) {
        return Ok(Some(stmt));
    }

    match value {
        Value::Module(module) => Ok(Some(Stmt::Import {
            module: SpannedName::synthetic(module.path.clone()),
            alias: (name != module.path).then(|| SpannedName::synthetic(name)),
            span: Default::default(),
        })),
        Value::Function(func) if func.module != MAIN_MODULE => {
            Ok(Some(import_symbol(&func.module, name)))
        }
        Value::Class(class) if class.module != MAIN_MODULE => {
            Ok(Some(import_symbol(&class.module, name)))
        }
        Value::Builtin(_) | Value::BoundBuiltin(_) => Ok(None),
        other => match value_to_expr(other) {
            // Literal values (including closure cell contents) are embedded
            // as equivalent literal constructions.
            Some(expr) => Ok(Some(make_assign(name, expr))),
            None => Ok(Some(import_symbol(defining_module, name))),
        },
    }
}

fn import_symbol(module: &str, name: &str) -> Stmt {
    Stmt::FromImport {
        module: SpannedName::synthetic(module),
        names: vec![ImportAlias {
            name: SpannedName::synthetic(name),
            alias: None,
        }],
        span: Default::default(),
    }
}

/// Scans a registered module's source for an import statement binding `name`.
fn module_import_binding(registry: &ModuleRegistry, module: &str, name: &str) -> Option<Stmt> {
    let source = registry.source(module)?;
    let stmts = parse_program(source).ok()?;
    for stmt in &stmts {
        match stmt {
            Stmt::Import {
                module: imported,
                alias,
                ..
            } => {
                let bound = match alias {
                    Some(alias) => alias.name.as_str(),
                    None => imported.name.split('.').next().unwrap_or(&imported.name),
                };
                if bound == name {
                    return Some(stmt.clone());
                }
            }
            Stmt::FromImport {
                module: imported,
                names,
                ..
            } => {
                for alias in names {
                    if alias.bound_name() == name {
                        return Some(Stmt::FromImport {
                            module: imported.clone(),
                            names: vec![alias.clone()],
                            span: Default::default(),
                        });
                    }
                }
            }
            _ => {}
        }
    }
    None
}

fn value_to_expr(value: &Value) -> Option<Expr> {
    let span = Default::default();
    match value {
        Value::None => Some(Expr::None { span }),
        Value::Bool(v) => Some(Expr::Bool { value: *v, span }),
        Value::Int(v) => Some(Expr::Int { value: *v, span }),
        Value::Float(v) => Some(Expr::Float { value: *v, span }),
        Value::Str(v) => Some(Expr::string(v.as_str())),
        Value::List(items) => {
            let items = items
                .borrow()
                .iter()
                .map(value_to_expr)
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::List { items, span })
        }
        Value::Tuple(items) => {
            let items = items
                .iter()
                .map(value_to_expr)
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::Tuple { items, span })
        }
        Value::Dict(entries) => {
            let entries = entries
                .borrow()
                .iter()
                .map(|(key, value)| Some((value_to_expr(key)?, value_to_expr(value)?)))
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::Dict { entries, span })
        }
        _ => None,
    }
}

/// Rewrites `self.method(...)` calls into `Cls.method(self, ...)`.
fn replace_self_calls(stmts: &mut [Stmt], class_name: &str) {
    for stmt in stmts {
        let _ = with_all_exprs_mut(stmt, &mut |expr| {
            replace_self_in_expr(expr, class_name);
            Ok(())
        });
    }
}

fn replace_self_in_expr(expr: &mut Expr, class_name: &str) {
    if let Expr::Call { func, args, .. } = expr {
        if let Expr::Attribute { base, .. } = func.as_mut() {
            if matches!(base.as_ref(), Expr::Name(name) if name.name == "self") {
                **base = Expr::name(class_name);
                args.insert(0, Arg::positional(Expr::name("self")));
            }
        }
    }
    visit_subexprs_mut(expr, &mut |sub| replace_self_in_expr(sub, class_name));
}

fn replace_yields(stmts: &mut [Stmt], ret_var: &str) {
    for stmt in stmts {
        let _ = with_all_exprs_mut(stmt, &mut |expr| {
            replace_yield_in_expr(expr, ret_var);
            Ok(())
        });
    }
}

fn replace_yield_in_expr(expr: &mut Expr, ret_var: &str) {
    if matches!(expr, Expr::Yield { .. }) {
        let taken = std::mem::replace(expr, Expr::name(ret_var));
        if let Expr::Yield { value, .. } = taken {
            *expr = make_call(
                Expr::Attribute {
                    base: Box::new(Expr::name(ret_var)),
                    attr: SpannedName::synthetic("append"),
                    span: Default::default(),
                },
                vec![*value],
            );
        }
        return;
    }
    visit_subexprs_mut(expr, &mut |sub| replace_yield_in_expr(sub, ret_var));
}

/// Applies `f` to every expression in a statement, recursing through nested
/// bodies (but not into nested function definitions).
fn with_all_exprs_mut(
    stmt: &mut Stmt,
    f: &mut dyn FnMut(&mut Expr) -> Result<(), Error>,
) -> Result<(), Error> {
    match stmt {
        Stmt::If {
            cond, body, orelse, ..
        } => {
            f(cond)?;
            for stmt in body.iter_mut().chain(orelse.iter_mut()) {
                with_all_exprs_mut(stmt, f)?;
            }
            Ok(())
        }
        Stmt::For {
            target, iter, body, ..
        } => {
            with_target_exprs(target, f)?;
            f(iter)?;
            for stmt in body {
                with_all_exprs_mut(stmt, f)?;
            }
            Ok(())
        }
        Stmt::With { context, body, .. } => {
            f(context)?;
            for stmt in body {
                with_all_exprs_mut(stmt, f)?;
            }
            Ok(())
        }
        Stmt::Try { body, handler, .. } => {
            for stmt in body.iter_mut().chain(handler.iter_mut()) {
                with_all_exprs_mut(stmt, f)?;
            }
            Ok(())
        }
        Stmt::Return { value, .. } => match value {
            Some(value) => f(value),
            None => Ok(()),
        },
        other => with_stmt_exprs(other, f),
    }
}

fn closed_vars(stmts: &[Stmt]) -> FxHashSet<String> {
    let mut out = FxHashSet::default();
    collect_closed(stmts, &mut out);
    out
}

fn collect_closed(stmts: &[Stmt], out: &mut FxHashSet<String>) {
    for stmt in stmts {
        match stmt {
            Stmt::FuncDef(def) => {
                out.extend(find_used_names(&def.body));
            }
            Stmt::ClassDef(def) => collect_closed(&def.body, out),
            Stmt::If { body, orelse, .. } => {
                collect_closed(body, out);
                collect_closed(orelse, out);
            }
            Stmt::For { body, .. } | Stmt::With { body, .. } => collect_closed(body, out),
            Stmt::Try { body, handler, .. } => {
                collect_closed(body, out);
                collect_closed(handler, out);
            }
            _ => {}
        }
    }
}

/// Guard statement: `if not defined("ret"): body`.
fn guard_if(ret_var: &str, body: Vec<Stmt>) -> Stmt {
    Stmt::If {
        cond: Expr::Unary {
            op: UnaryOp::Not,
            operand: Box::new(make_call(
                Expr::name("defined"),
                vec![Expr::string(ret_var)],
            )),
            span: Default::default(),
        },
        body,
        orelse: Vec::new(),
        span: Default::default(),
    }
}

/// Loop-resident form: the candidate scan guarantees at most a single
/// trailing return, which becomes a plain assignment.
fn replace_returns_plain(mut stmts: Vec<Stmt>, ret_var: &str) -> Vec<Stmt> {
    if let Some(Stmt::Return { .. }) = stmts.last() {
        if let Some(Stmt::Return { value, span }) = stmts.pop() {
            stmts.push(make_assign(ret_var, value.unwrap_or(Expr::None { span })));
        }
    }
    stmts
}

/// Rewrites every `return e` into a guarded `ret = e` and wraps the
/// statements following a returning statement in the same guard, so only the
/// first dynamically-reached return binds the result.
fn replace_returns(stmts: Vec<Stmt>, ret_var: &str) -> (Vec<Stmt>, bool) {
    let mut out = Vec::new();
    let mut iter = stmts.into_iter();
    while let Some(stmt) = iter.next() {
        let (rewritten, returned) = match stmt {
            Stmt::Return { value, span } => {
                let value = value.unwrap_or(Expr::None { span });
                (guard_if(ret_var, vec![make_assign(ret_var, value)]), true)
            }
            Stmt::If {
                cond,
                body,
                orelse,
                span,
            } => {
                let (body, found_body) = replace_returns(body, ret_var);
                let (orelse, found_orelse) = replace_returns(orelse, ret_var);
                (
                    Stmt::If {
                        cond,
                        body,
                        orelse,
                        span,
                    },
                    found_body || found_orelse,
                )
            }
            Stmt::For {
                target,
                iter: loop_iter,
                body,
                span,
            } => {
                let (body, found) = replace_returns(body, ret_var);
                (
                    Stmt::For {
                        target,
                        iter: loop_iter,
                        body,
                        span,
                    },
                    found,
                )
            }
            Stmt::With {
                context,
                binding,
                body,
                span,
            } => {
                let (body, found) = replace_returns(body, ret_var);
                (
                    Stmt::With {
                        context,
                        binding,
                        body,
                        span,
                    },
                    found,
                )
            }
            Stmt::Try {
                body,
                handler,
                span,
            } => {
                let (body, found_body) = replace_returns(body, ret_var);
                let (handler, found_handler) = replace_returns(handler, ret_var);
                (
                    Stmt::Try {
                        body,
                        handler,
                        span,
                    },
                    found_body || found_handler,
                )
            }
            other => (other, false),
        };

        out.push(rewritten);
        if returned {
            let rest: Vec<Stmt> = iter.collect();
            let (rest, _) = replace_returns(rest, ret_var);
            if !rest.is_empty() {
                out.push(guard_if(ret_var, rest));
            }
            return (out, true);
        }
    }
    (out, false)
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
