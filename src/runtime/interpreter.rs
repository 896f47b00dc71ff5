use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::surface::ast::{Arg, AssignTarget, BinOp, CompClause, Expr, Stmt, StarKind, UnaryOp};
use crate::surface::parser::parse_program;
use crate::surface::printer::render_expr_text;
use crate::visit::body_contains_yield;

use super::environment::Env;
use super::values::{
    format_value, BoundBuiltinValue, BoundMethodValue, ClassValue, FunctionValue, InstanceValue,
    ModuleValue, Value,
};
use super::{Flow, Runtime, RuntimeError};

/// Call-site arguments after spread expansion: `*xs` has been flattened into
/// `positional`, `**kw` into `keyword`.
pub struct CallArgs {
    pub positional: Vec<Value>,
    pub keyword: Vec<(String, Value)>,
}

impl CallArgs {
    pub fn positional(values: Vec<Value>) -> Self {
        CallArgs {
            positional: values,
            keyword: Vec::new(),
        }
    }
}

fn take_keyword(keyword: &mut Vec<(String, Value)>, name: &str) -> Option<Value> {
    let index = keyword.iter().position(|(key, _)| key == name)?;
    Some(keyword.remove(index).1)
}

impl Runtime {
    pub(crate) fn exec_block(&mut self, stmts: &[Stmt], env: &Env) -> Result<Flow, RuntimeError> {
        for stmt in stmts {
            match self.exec_stmt(stmt, env)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    pub(crate) fn exec_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<Flow, RuntimeError> {
        if !stmt.is_comment() {
            self.record_line(stmt.span().start.line);
        }

        match stmt {
            Stmt::Comment { .. } | Stmt::Pass { .. } => Ok(Flow::Normal),
            Stmt::Assign { target, value, .. } => {
                let value = self.eval_expr(value, env)?;
                self.bind_target(target, value, env)?;
                Ok(Flow::Normal)
            }
            Stmt::ExprStmt { expr, .. } => {
                self.eval_expr(expr, env)?;
                Ok(Flow::Normal)
            }
            Stmt::Assert { expr, message, span } => {
                let value = self.eval_expr(expr, env)?;
                if value.is_truthy() {
                    return Ok(Flow::Normal);
                }
                let text = match message {
                    Some(message) => format_value(&self.eval_expr(message, env)?),
                    None => render_expr_text(expr),
                };
                Err(RuntimeError::Assertion {
                    line: span.start.line,
                    text,
                })
            }
            Stmt::If {
                cond, body, orelse, ..
            } => {
                let cond = self.eval_expr(cond, env)?;
                if cond.is_truthy() {
                    self.exec_block(body, env)
                } else {
                    self.exec_block(orelse, env)
                }
            }
            Stmt::For {
                target,
                iter,
                body,
                span,
            } => {
                let iter = self.eval_expr(iter, env)?;
                let items = self.iter_values(&iter)?;
                for item in items {
                    // The header line counts once per iteration, on top of
                    // the entry count, giving n+1 total for n iterations.
                    self.record_line(span.start.line);
                    self.bind_target(target, item, env)?;
                    match self.exec_block(body, env)? {
                        Flow::Normal => {}
                        flow => return Ok(flow),
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::FuncDef(def) => {
                let mut value = Value::Function(Rc::new(FunctionValue {
                    def: Rc::new(def.clone()),
                    module: self.current_module.clone(),
                    qualname: def.name.name.clone(),
                    env: env.clone(),
                    is_generator: body_contains_yield(&def.body),
                }));
                for decorator in def.decorators.iter().rev() {
                    let dec = env
                        .get(&decorator.name.name)
                        .ok_or_else(|| RuntimeError::NameError(decorator.name.name.clone()))?;
                    self.record_load(&decorator.name.name, decorator.span.start.line, &dec);
                    value = self.call_value(dec, CallArgs::positional(vec![value]), env)?;
                }
                env.set(def.name.name.clone(), value.clone());
                self.record_store(&def.name.name, def.name.span.start.line, &value);
                Ok(Flow::Normal)
            }
            Stmt::ClassDef(def) => {
                let value = self.exec_class_def(def, env)?;
                env.set(def.name.name.clone(), value.clone());
                self.record_store(&def.name.name, def.name.span.start.line, &value);
                Ok(Flow::Normal)
            }
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(value) => self.eval_expr(value, env)?,
                    None => Value::None,
                };
                Ok(Flow::Return(value))
            }
            Stmt::Import { module, alias, .. } => {
                let value = self.import_module(&module.name)?;
                match alias {
                    Some(alias) => {
                        env.set(alias.name.clone(), value.clone());
                        self.record_store(&alias.name, alias.span.start.line, &value);
                    }
                    None => {
                        // `import a.b` binds the root name `a`.
                        let root = module.name.split('.').next().unwrap_or(&module.name);
                        let root_value = self.import_module(root)?;
                        env.set(root.to_string(), root_value.clone());
                        self.record_store(root, module.span.start.line, &root_value);
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::FromImport { module, names, .. } => {
                let value = self.import_module(&module.name)?;
                let Value::Module(module_value) = &value else {
                    return Err(RuntimeError::msg("from-import of a non-module"));
                };
                for alias in names {
                    let imported = self.module_attr(module_value, &alias.name.name)?;
                    let bound = alias.bound_name().to_string();
                    env.set(bound.clone(), imported.clone());
                    self.record_store(&bound, alias.name.span.start.line, &imported);
                }
                Ok(Flow::Normal)
            }
            Stmt::With {
                context,
                binding,
                body,
                ..
            } => {
                let context_value = self.eval_expr(context, env)?;
                let entered = match self.scope_method(&context_value, "enter") {
                    Some(enter) => self.call_function(&enter, CallArgs::positional(vec![
                        context_value.clone(),
                    ]))?,
                    None => context_value.clone(),
                };
                if let Some(binding) = binding {
                    env.set(binding.name.clone(), entered.clone());
                    self.record_store(&binding.name, binding.span.start.line, &entered);
                }
                let flow = self.exec_block(body, env)?;
                if let Some(exit) = self.scope_method(&context_value, "exit") {
                    self.call_function(&exit, CallArgs::positional(vec![context_value]))?;
                }
                Ok(flow)
            }
            Stmt::Try { body, handler, .. } => match self.exec_block(body, env) {
                Ok(flow) => Ok(flow),
                Err(_) => self.exec_block(handler, env),
            },
        }
    }

    fn exec_class_def(&mut self, def: &crate::surface::ast::ClassDef, env: &Env) -> Result<Value, RuntimeError> {
        let mut methods = FxHashMap::default();
        let mut properties = FxHashMap::default();
        for stmt in &def.body {
            match stmt {
                Stmt::FuncDef(method) => {
                    let is_property = method
                        .decorators
                        .iter()
                        .any(|decorator| decorator.name.name == "property");
                    if method.decorators.len() > 1
                        || (!method.decorators.is_empty() && !is_property)
                    {
                        return Err(RuntimeError::msg(format!(
                            "unsupported decorator on method `{}.{}`",
                            def.name.name, method.name.name
                        )));
                    }
                    let func = Rc::new(FunctionValue {
                        def: Rc::new(method.clone()),
                        module: self.current_module.clone(),
                        qualname: format!("{}.{}", def.name.name, method.name.name),
                        env: env.clone(),
                        is_generator: body_contains_yield(&method.body),
                    });
                    if is_property {
                        properties.insert(method.name.name.clone(), func);
                    } else {
                        methods.insert(method.name.name.clone(), func);
                    }
                }
                Stmt::Pass { .. } | Stmt::Comment { .. } => {}
                other => {
                    return Err(RuntimeError::msg(format!(
                        "unsupported statement in class body at line {}",
                        other.span().start.line
                    )));
                }
            }
        }
        Ok(Value::Class(Rc::new(ClassValue {
            name: def.name.name.clone(),
            module: self.current_module.clone(),
            qualname: def.name.name.clone(),
            def: Rc::new(def.clone()),
            methods,
            properties,
        })))
    }

    /// Looks up an `enter`/`exit`-style protocol method on a context value.
    fn scope_method(&self, value: &Value, name: &str) -> Option<Rc<FunctionValue>> {
        match value {
            Value::Instance(instance) => instance.borrow().class.methods.get(name).cloned(),
            _ => None,
        }
    }

    pub(crate) fn import_module(&mut self, path: &str) -> Result<Value, RuntimeError> {
        if let Some(module) = self.loaded.get(path) {
            return Ok(Value::Module(module.clone()));
        }
        if self.loading.iter().any(|loading| loading == path) {
            return Err(RuntimeError::msg(format!("cyclic import of `{path}`")));
        }
        let module = if let Some(source) = self.registry.source(path) {
            let source = source.to_string();
            let stmts = parse_program(&source).map_err(|diag| {
                RuntimeError::msg(format!("parse error in module `{path}`: {}", diag.message))
            })?;
            self.loading.push(path.to_string());
            let globals = Env::new(Some(self.builtins.clone()));
            let saved = std::mem::replace(&mut self.current_module, path.to_string());
            let result = self.exec_block(&stmts, &globals);
            self.current_module = saved;
            self.loading.pop();
            result?;
            Rc::new(ModuleValue {
                path: path.to_string(),
                globals,
            })
        } else if self.registry_has_submodules(path) {
            Rc::new(ModuleValue {
                path: path.to_string(),
                globals: Env::new(None),
            })
        } else {
            return Err(RuntimeError::ImportError(path.to_string()));
        };
        self.loaded.insert(path.to_string(), module.clone());
        Ok(Value::Module(module))
    }

    fn registry_has_submodules(&self, path: &str) -> bool {
        let prefix = format!("{path}.");
        self.registry
            .sources_iter()
            .any(|registered| registered.starts_with(&prefix))
    }

    pub(crate) fn module_attr(
        &mut self,
        module: &Rc<ModuleValue>,
        attr: &str,
    ) -> Result<Value, RuntimeError> {
        if let Some(value) = module.globals.get_local(attr) {
            return Ok(value);
        }
        let submodule = format!("{}.{}", module.path, attr);
        if self.registry.contains(&submodule) || self.registry_has_submodules(&submodule) {
            return self.import_module(&submodule);
        }
        Err(RuntimeError::msg(format!(
            "module `{}` has no attribute `{attr}`",
            module.path
        )))
    }

    pub(crate) fn bind_target(
        &mut self,
        target: &AssignTarget,
        value: Value,
        env: &Env,
    ) -> Result<(), RuntimeError> {
        match target {
            AssignTarget::Name(name) => {
                env.set(name.name.clone(), value.clone());
                self.record_store(&name.name, name.span.start.line, &value);
                Ok(())
            }
            AssignTarget::Attribute { base, attr, .. } => {
                let base_value = self.eval_expr(base, env)?;
                match &base_value {
                    Value::Instance(instance) => {
                        instance.borrow_mut().fields.insert(attr.name.clone(), value);
                        // In-place mutation counts as a write of the holding
                        // name, so passes can see the value changed.
                        if let Expr::Name(name) = base {
                            self.record_store(&name.name, name.span.start.line, &base_value);
                        }
                        Ok(())
                    }
                    other => Err(RuntimeError::msg(format!(
                        "cannot set attribute on {}",
                        other.type_name()
                    ))),
                }
            }
            AssignTarget::Index { base, index, .. } => {
                let base_value = self.eval_expr(base, env)?;
                let index = self.eval_expr(index, env)?;
                match &base_value {
                    Value::List(items) => {
                        {
                            let mut items = items.borrow_mut();
                            let position = normalize_index(&index, items.len())?;
                            items[position] = value;
                        }
                        if let Expr::Name(name) = base {
                            self.record_store(&name.name, name.span.start.line, &base_value);
                        }
                        Ok(())
                    }
                    Value::Dict(entries) => {
                        {
                            let mut entries = entries.borrow_mut();
                            if let Some(entry) =
                                entries.iter_mut().find(|(key, _)| key.eq_value(&index))
                            {
                                entry.1 = value;
                            } else {
                                entries.push((index, value));
                            }
                        }
                        if let Expr::Name(name) = base {
                            self.record_store(&name.name, name.span.start.line, &base_value);
                        }
                        Ok(())
                    }
                    other => Err(RuntimeError::msg(format!(
                        "{} does not support item assignment",
                        other.type_name()
                    ))),
                }
            }
            AssignTarget::Tuple { items, .. } => {
                let values = self.iter_values(&value)?;
                if values.len() != items.len() {
                    return Err(RuntimeError::msg(format!(
                        "cannot unpack {} values into {} targets",
                        values.len(),
                        items.len()
                    )));
                }
                for (item, value) in items.iter().zip(values) {
                    self.bind_target(item, value, env)?;
                }
                Ok(())
            }
        }
    }

    pub(crate) fn iter_values(&mut self, value: &Value) -> Result<Vec<Value>, RuntimeError> {
        match value {
            Value::List(items) => Ok(items.borrow().clone()),
            Value::Tuple(items) => Ok(items.as_ref().clone()),
            Value::Dict(entries) => Ok(entries.borrow().iter().map(|(k, _)| k.clone()).collect()),
            Value::Str(text) => Ok(text.chars().map(|ch| Value::str(ch.to_string())).collect()),
            other => Err(RuntimeError::msg(format!(
                "{} is not iterable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Name(name) => {
                let value = env
                    .get(&name.name)
                    .ok_or_else(|| RuntimeError::NameError(name.name.clone()))?;
                self.record_load(&name.name, name.span.start.line, &value);
                Ok(value)
            }
            Expr::Int { value, .. } => Ok(Value::Int(*value)),
            Expr::Float { value, .. } => Ok(Value::Float(*value)),
            Expr::Str { value, .. } => Ok(Value::str(value.clone())),
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::None { .. } => Ok(Value::None),
            Expr::List { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item, env)?);
                }
                Ok(Value::list(values))
            }
            Expr::Tuple { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item, env)?);
                }
                Ok(Value::Tuple(Rc::new(values)))
            }
            Expr::Dict { entries, .. } => {
                let mut values = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    values.push((self.eval_expr(key, env)?, self.eval_expr(value, env)?));
                }
                Ok(Value::Dict(Rc::new(RefCell::new(values))))
            }
            Expr::Attribute { base, attr, .. } => {
                let base = self.eval_expr(base, env)?;
                self.eval_attribute(base, &attr.name)
            }
            Expr::Index { base, index, .. } => {
                let base = self.eval_expr(base, env)?;
                let index = self.eval_expr(index, env)?;
                self.eval_index(&base, &index)
            }
            Expr::Call { func, args, .. } => {
                let callee = self.eval_expr(func, env)?;
                let call_args = self.eval_args(args, env)?;
                self.call_value(callee, call_args, env)
            }
            Expr::Unary { op, operand, .. } => {
                let value = self.eval_expr(operand, env)?;
                match op {
                    UnaryOp::Not => Ok(Value::Bool(!value.is_truthy())),
                    UnaryOp::Neg => match value {
                        Value::Int(v) => Ok(Value::Int(-v)),
                        Value::Float(v) => Ok(Value::Float(-v)),
                        other => Err(RuntimeError::msg(format!(
                            "cannot negate {}",
                            other.type_name()
                        ))),
                    },
                }
            }
            Expr::Binary {
                op, left, right, ..
            } => {
                if matches!(op, BinOp::And | BinOp::Or) {
                    let left = self.eval_expr(left, env)?;
                    // Short-circuit, returning an operand value like Python.
                    return match (op, left.is_truthy()) {
                        (BinOp::And, false) | (BinOp::Or, true) => Ok(left),
                        _ => self.eval_expr(right, env),
                    };
                }
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                self.eval_binop(*op, left, right)
            }
            Expr::IfExp {
                cond, then, orelse, ..
            } => {
                let cond = self.eval_expr(cond, env)?;
                if cond.is_truthy() {
                    self.eval_expr(then, env)
                } else {
                    self.eval_expr(orelse, env)
                }
            }
            Expr::ListComp { elt, clauses, .. } => {
                let mut out = Vec::new();
                self.eval_comp(elt, clauses, 0, env, &mut out)?;
                Ok(Value::list(out))
            }
            Expr::Yield { value, .. } => {
                let value = self.eval_expr(value, env)?;
                match self.yield_stack.last_mut() {
                    Some(yields) => {
                        yields.push(value);
                        Ok(Value::None)
                    }
                    None => Err(RuntimeError::msg("yield outside generator")),
                }
            }
        }
    }

    fn eval_comp(
        &mut self,
        elt: &Expr,
        clauses: &[CompClause],
        index: usize,
        env: &Env,
        out: &mut Vec<Value>,
    ) -> Result<(), RuntimeError> {
        let Some(clause) = clauses.get(index) else {
            let value = self.eval_expr(elt, env)?;
            out.push(value);
            return Ok(());
        };
        let iter = self.eval_expr(&clause.iter, env)?;
        for item in self.iter_values(&iter)? {
            self.bind_target(&clause.target, item, env)?;
            if let Some(cond) = &clause.cond {
                if !self.eval_expr(cond, env)?.is_truthy() {
                    continue;
                }
            }
            self.eval_comp(elt, clauses, index + 1, env, out)?;
        }
        Ok(())
    }

    fn eval_args(&mut self, args: &[Arg], env: &Env) -> Result<CallArgs, RuntimeError> {
        let mut call_args = CallArgs {
            positional: Vec::new(),
            keyword: Vec::new(),
        };
        for arg in args {
            match arg.star {
                StarKind::None => {
                    let value = self.eval_expr(&arg.value, env)?;
                    match &arg.keyword {
                        Some(keyword) => call_args.keyword.push((keyword.name.clone(), value)),
                        None => call_args.positional.push(value),
                    }
                }
                StarKind::Star => {
                    let value = self.eval_expr(&arg.value, env)?;
                    call_args.positional.extend(self.iter_values(&value)?);
                }
                StarKind::DoubleStar => {
                    let value = self.eval_expr(&arg.value, env)?;
                    let Value::Dict(entries) = &value else {
                        return Err(RuntimeError::msg("** argument must be a dict"));
                    };
                    for (key, entry) in entries.borrow().iter() {
                        let Value::Str(key) = key else {
                            return Err(RuntimeError::msg("** argument keys must be strings"));
                        };
                        call_args.keyword.push((key.as_str().to_string(), entry.clone()));
                    }
                }
            }
        }
        Ok(call_args)
    }

    pub(crate) fn call_value(
        &mut self,
        callee: Value,
        args: CallArgs,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::Builtin(builtin) => {
                if !args.keyword.is_empty() {
                    return Err(RuntimeError::msg(format!(
                        "builtin `{}` takes no keyword arguments",
                        builtin.name
                    )));
                }
                (builtin.func)(self, env, args.positional)
            }
            Value::BoundBuiltin(bound) => self.call_bound_builtin(&bound, args),
            Value::Function(func) => self.call_function(&func, args),
            Value::BoundMethod(method) => {
                let mut args = args;
                args.positional.insert(0, method.receiver.clone());
                self.call_function(&method.func, args)
            }
            Value::Class(class) => self.construct(&class, args),
            other => Err(RuntimeError::msg(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    pub(crate) fn construct(
        &mut self,
        class: &Rc<ClassValue>,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        let instance = Value::Instance(Rc::new(RefCell::new(InstanceValue {
            class: class.clone(),
            fields: FxHashMap::default(),
        })));
        if let Some(init) = class.methods.get("__init__").cloned() {
            let mut args = args;
            args.positional.insert(0, instance.clone());
            self.call_function(&init, args)?;
        } else if !args.positional.is_empty() || !args.keyword.is_empty() {
            return Err(RuntimeError::msg(format!(
                "class `{}` takes no constructor arguments",
                class.name
            )));
        }
        Ok(instance)
    }

    pub(crate) fn call_function(
        &mut self,
        func: &Rc<FunctionValue>,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        let env = Env::new(Some(func.env.clone()));
        self.bind_params(func, args, &env)?;
        let saved_module = std::mem::replace(&mut self.current_module, func.module.clone());
        self.frame_depth += 1;
        let result = if func.is_generator {
            self.yield_stack.push(Vec::new());
            let flow = self.exec_block(&func.def.body, &env);
            let yields = self.yield_stack.pop().unwrap_or_default();
            flow.map(|_| Value::list(yields))
        } else {
            self.exec_block(&func.def.body, &env).map(|flow| match flow {
                Flow::Return(value) => value,
                Flow::Normal => Value::None,
            })
        };
        self.frame_depth -= 1;
        self.current_module = saved_module;
        result
    }

    fn bind_params(
        &mut self,
        func: &Rc<FunctionValue>,
        args: CallArgs,
        env: &Env,
    ) -> Result<(), RuntimeError> {
        let params = &func.def.params;
        let mut positional = std::collections::VecDeque::from(args.positional);
        let mut keyword = args.keyword;

        for param in &params.params {
            let name = &param.name.name;
            let value = if let Some(value) = positional.pop_front() {
                value
            } else if let Some(value) = take_keyword(&mut keyword, name) {
                value
            } else if let Some(default) = &param.default {
                self.eval_expr(default, env)?
            } else {
                return Err(RuntimeError::msg(format!(
                    "{}() missing argument `{name}`",
                    func.qualname
                )));
            };
            env.set(name.clone(), value);
        }

        match &params.vararg {
            Some(vararg) => {
                env.set(vararg.name.clone(), Value::list(positional.drain(..).collect()));
            }
            None => {
                if !positional.is_empty() {
                    return Err(RuntimeError::msg(format!(
                        "{}() takes {} positional arguments but more were given",
                        func.qualname,
                        params.params.len()
                    )));
                }
            }
        }

        for param in &params.kwonly {
            let name = &param.name.name;
            let value = if let Some(value) = take_keyword(&mut keyword, name) {
                value
            } else if let Some(default) = &param.default {
                self.eval_expr(default, env)?
            } else {
                return Err(RuntimeError::msg(format!(
                    "{}() missing keyword argument `{name}`",
                    func.qualname
                )));
            };
            env.set(name.clone(), value);
        }

        match &params.kwarg {
            Some(kwarg) => {
                let entries: Vec<(Value, Value)> = keyword
                    .drain(..)
                    .map(|(key, value)| (Value::str(key), value))
                    .collect();
                env.set(kwarg.name.clone(), Value::Dict(Rc::new(RefCell::new(entries))));
            }
            None => {
                if let Some((name, _)) = keyword.first() {
                    return Err(RuntimeError::msg(format!(
                        "{}() got an unexpected keyword argument `{name}`",
                        func.qualname
                    )));
                }
            }
        }

        Ok(())
    }

    pub(crate) fn eval_attribute(&mut self, base: Value, attr: &str) -> Result<Value, RuntimeError> {
        match &base {
            Value::Instance(instance) => {
                if let Some(value) = instance.borrow().fields.get(attr) {
                    return Ok(value.clone());
                }
                let class = instance.borrow().class.clone();
                if let Some(getter) = class.properties.get(attr).cloned() {
                    return self.call_function(&getter, CallArgs::positional(vec![base.clone()]));
                }
                if let Some(method) = class.methods.get(attr).cloned() {
                    return Ok(Value::BoundMethod(Rc::new(BoundMethodValue {
                        receiver: base.clone(),
                        class,
                        func: method,
                    })));
                }
                Err(RuntimeError::msg(format!(
                    "`{}` instance has no attribute `{attr}`",
                    class.qualname
                )))
            }
            Value::Class(class) => {
                if let Some(method) = class.methods.get(attr) {
                    return Ok(Value::Function(method.clone()));
                }
                if let Some(getter) = class.properties.get(attr) {
                    return Ok(Value::Function(getter.clone()));
                }
                Err(RuntimeError::msg(format!(
                    "class `{}` has no attribute `{attr}`",
                    class.qualname
                )))
            }
            Value::Module(module) => {
                let module = module.clone();
                self.module_attr(&module, attr)
            }
            Value::List(_) => match attr {
                "append" | "extend" => Ok(Value::BoundBuiltin(Rc::new(BoundBuiltinValue {
                    receiver: base.clone(),
                    method: if attr == "append" { "append" } else { "extend" },
                }))),
                _ => Err(RuntimeError::msg(format!("list has no attribute `{attr}`"))),
            },
            Value::Dict(_) => match attr {
                "keys" | "values" | "items" | "get" => {
                    let method = match attr {
                        "keys" => "keys",
                        "values" => "values",
                        "items" => "items",
                        _ => "get",
                    };
                    Ok(Value::BoundBuiltin(Rc::new(BoundBuiltinValue {
                        receiver: base.clone(),
                        method,
                    })))
                }
                _ => Err(RuntimeError::msg(format!("dict has no attribute `{attr}`"))),
            },
            other => Err(RuntimeError::msg(format!(
                "{} has no attribute `{attr}`",
                other.type_name()
            ))),
        }
    }

    fn call_bound_builtin(
        &mut self,
        bound: &BoundBuiltinValue,
        args: CallArgs,
    ) -> Result<Value, RuntimeError> {
        if !args.keyword.is_empty() {
            return Err(RuntimeError::msg(format!(
                "`{}` takes no keyword arguments",
                bound.method
            )));
        }
        let mut positional = args.positional;
        match (&bound.receiver, bound.method) {
            (Value::List(items), "append") => {
                if positional.len() != 1 {
                    return Err(RuntimeError::msg("append() takes exactly one argument"));
                }
                items.borrow_mut().push(positional.remove(0));
                Ok(Value::None)
            }
            (Value::List(items), "extend") => {
                if positional.len() != 1 {
                    return Err(RuntimeError::msg("extend() takes exactly one argument"));
                }
                let extra = self.iter_values(&positional.remove(0))?;
                items.borrow_mut().extend(extra);
                Ok(Value::None)
            }
            (Value::Dict(entries), "keys") => Ok(Value::list(
                entries.borrow().iter().map(|(k, _)| k.clone()).collect(),
            )),
            (Value::Dict(entries), "values") => Ok(Value::list(
                entries.borrow().iter().map(|(_, v)| v.clone()).collect(),
            )),
            (Value::Dict(entries), "items") => Ok(Value::list(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| Value::Tuple(Rc::new(vec![k.clone(), v.clone()])))
                    .collect(),
            )),
            (Value::Dict(entries), "get") => {
                let key = positional
                    .first()
                    .ok_or_else(|| RuntimeError::msg("get() takes at least one argument"))?;
                let found = entries
                    .borrow()
                    .iter()
                    .find(|(k, _)| k.eq_value(key))
                    .map(|(_, v)| v.clone());
                Ok(found.unwrap_or_else(|| positional.get(1).cloned().unwrap_or(Value::None)))
            }
            _ => Err(RuntimeError::msg(format!(
                "invalid builtin method `{}`",
                bound.method
            ))),
        }
    }

    pub(crate) fn eval_index(&mut self, base: &Value, index: &Value) -> Result<Value, RuntimeError> {
        match base {
            Value::List(items) => {
                let items = items.borrow();
                let position = normalize_index(index, items.len())?;
                Ok(items[position].clone())
            }
            Value::Tuple(items) => {
                let position = normalize_index(index, items.len())?;
                Ok(items[position].clone())
            }
            Value::Str(text) => {
                let chars: Vec<char> = text.chars().collect();
                let position = normalize_index(index, chars.len())?;
                Ok(Value::str(chars[position].to_string()))
            }
            Value::Dict(entries) => entries
                .borrow()
                .iter()
                .find(|(key, _)| key.eq_value(index))
                .map(|(_, value)| value.clone())
                .ok_or_else(|| RuntimeError::msg(format!("key {}", format_value(index)))),
            other => Err(RuntimeError::msg(format!(
                "{} is not indexable",
                other.type_name()
            ))),
        }
    }

    fn eval_binop(&mut self, op: BinOp, left: Value, right: Value) -> Result<Value, RuntimeError> {
        use Value::Int;
        let type_error = |op: BinOp, left: &Value, right: &Value| {
            RuntimeError::msg(format!(
                "unsupported operand types for `{}`: {} and {}",
                op.symbol(),
                left.type_name(),
                right.type_name()
            ))
        };
        match op {
            BinOp::Add => match (&left, &right) {
                (Int(a), Int(b)) => Ok(Int(a + b)),
                (Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{a}{b}"))),
                (Value::List(a), Value::List(b)) => {
                    let mut items = a.borrow().clone();
                    items.extend(b.borrow().iter().cloned());
                    Ok(Value::list(items))
                }
                _ => numeric_binop(op, &left, &right).ok_or_else(|| type_error(op, &left, &right)),
            },
            BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod => match (&left, &right) {
                (Int(a), Int(b)) if op == BinOp::Sub => Ok(Int(a - b)),
                (Int(a), Int(b)) if op == BinOp::Mul => Ok(Int(a * b)),
                (Int(a), Int(b)) if op == BinOp::Mod => {
                    if *b == 0 {
                        return Err(RuntimeError::msg("modulo by zero"));
                    }
                    Ok(Int(((a % b) + b) % b))
                }
                _ => numeric_binop(op, &left, &right).ok_or_else(|| type_error(op, &left, &right)),
            },
            BinOp::Eq => Ok(Value::Bool(left.eq_value(&right))),
            BinOp::Ne => Ok(Value::Bool(!left.eq_value(&right))),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                let ordering = compare_values(&left, &right)
                    .ok_or_else(|| type_error(op, &left, &right))?;
                Ok(Value::Bool(match op {
                    BinOp::Lt => ordering.is_lt(),
                    BinOp::Le => ordering.is_le(),
                    BinOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinOp::In | BinOp::NotIn => {
                let found = match &right {
                    Value::List(items) => items.borrow().iter().any(|item| item.eq_value(&left)),
                    Value::Tuple(items) => items.iter().any(|item| item.eq_value(&left)),
                    Value::Dict(entries) => {
                        entries.borrow().iter().any(|(key, _)| key.eq_value(&left))
                    }
                    Value::Str(text) => match &left {
                        Value::Str(needle) => text.contains(needle.as_str()),
                        _ => return Err(type_error(op, &left, &right)),
                    },
                    _ => return Err(type_error(op, &left, &right)),
                };
                Ok(Value::Bool(if op == BinOp::In { found } else { !found }))
            }
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops handled by caller"),
        }
    }
}

fn numeric_binop(op: BinOp, left: &Value, right: &Value) -> Option<Value> {
    let as_float = |value: &Value| match value {
        Value::Int(v) => Some(*v as f64),
        Value::Float(v) => Some(*v),
        _ => None,
    };
    let a = as_float(left)?;
    let b = as_float(right)?;
    let result = match op {
        BinOp::Add => a + b,
        BinOp::Sub => a - b,
        BinOp::Mul => a * b,
        BinOp::Div => a / b,
        BinOp::Mod => ((a % b) + b) % b,
        _ => return None,
    };
    Some(Value::Float(result))
}

fn compare_values(left: &Value, right: &Value) -> Option<std::cmp::Ordering> {
    match (left, right) {
        (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => a.partial_cmp(b),
        (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
        (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
        _ => None,
    }
}

fn normalize_index(index: &Value, len: usize) -> Result<usize, RuntimeError> {
    let Value::Int(raw) = index else {
        return Err(RuntimeError::msg("index must be an integer"));
    };
    let position = if *raw < 0 { *raw + len as i64 } else { *raw };
    if position < 0 || position as usize >= len {
        return Err(RuntimeError::msg(format!("index {raw} out of range")));
    }
    Ok(position as usize)
}
