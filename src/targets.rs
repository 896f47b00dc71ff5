//! Inline-target policy and the callee resolver.
//!
//! Candidate selection is two-phase: the inline pass does a purely syntactic
//! scan for call-shaped constructs, then asks `resolve_callee` (the only code
//! that touches the traced runtime) for the callee's identity, and finally
//! asks the targets whether that identity qualifies.

use std::rc::Rc;

use crate::diagnostics::Position;
use crate::runtime::values::{BoundMethodValue, ClassValue, FunctionValue, Value};
use crate::runtime::MAIN_MODULE;
use crate::surface::ast::Expr;
use crate::surface::printer::render_expr_text;
use crate::trace::Trace;
use crate::Error;

/// The resolved identity of a call target: what kind of thing it is, where
/// it was defined, and its qualified name within that unit.
pub struct Callee {
    pub kind: CalleeKind,
    pub module: String,
    pub qualname: String,
}

pub enum CalleeKind {
    Function(Rc<FunctionValue>),
    Class(Rc<ClassValue>),
    Method(Rc<BoundMethodValue>),
    Builtin(String),
}

impl Callee {
    pub fn from_value(value: &Value) -> Option<Callee> {
        match value {
            Value::Function(func) => Some(Callee {
                kind: CalleeKind::Function(func.clone()),
                module: func.module.clone(),
                qualname: func.qualname.clone(),
            }),
            Value::Class(class) => Some(Callee {
                kind: CalleeKind::Class(class.clone()),
                module: class.module.clone(),
                qualname: class.qualname.clone(),
            }),
            Value::BoundMethod(method) => Some(Callee {
                kind: CalleeKind::Method(method.clone()),
                module: method.func.module.clone(),
                qualname: method.func.qualname.clone(),
            }),
            Value::Builtin(builtin) => Some(Callee {
                kind: CalleeKind::Builtin(builtin.name.clone()),
                module: "builtins".to_string(),
                qualname: builtin.name.clone(),
            }),
            Value::BoundBuiltin(bound) => Some(Callee {
                kind: CalleeKind::Builtin(bound.method.to_string()),
                module: "builtins".to_string(),
                qualname: bound.method.to_string(),
            }),
            _ => None,
        }
    }

    /// Dotted path of the callee; names defined in the traced program itself
    /// are unprefixed.
    pub fn path(&self) -> String {
        if self.module == MAIN_MODULE {
            self.qualname.clone()
        } else {
            format!("{}.{}", self.module, self.qualname)
        }
    }

    /// Callables defined in the program text itself are always fair game:
    /// expansion splices new local definitions into the program, and those
    /// must keep qualifying on later fixpoint iterations.
    pub fn is_source_local(&self) -> bool {
        self.module == MAIN_MODULE && !matches!(self.kind, CalleeKind::Builtin(_))
    }

    fn class_path(&self) -> Option<String> {
        let class: &str = match &self.kind {
            CalleeKind::Method(method) => method.class.qualname.as_str(),
            CalleeKind::Class(class) => class.qualname.as_str(),
            // An unbound method's qualified name is `Cls.method`.
            CalleeKind::Function(func) => func.qualname.split_once('.')?.0,
            CalleeKind::Builtin(_) => return None,
        };
        if self.module == MAIN_MODULE {
            Some(class.to_string())
        } else {
            Some(format!("{}.{class}", self.module))
        }
    }
}

/// One selected inline target. `should_inline` is the capability query the
/// inline pass runs against every resolved candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    /// Inline every callable defined in or under a module path.
    Module(String),
    /// Inline exactly this function (or this method when bound).
    Callable(String),
    /// Inline this class: its constructor and all of its methods.
    Type(String),
    /// Inline whatever call expression sits at this source position.
    Cursor(Position),
}

impl Target {
    pub fn should_inline(&self, site: &Expr, callee: &Callee) -> bool {
        match self {
            Target::Module(path) => {
                let module: Vec<&str> = callee.module.split('.').collect();
                let target: Vec<&str> = path.split('.').collect();
                module.len() >= target.len() && module[..target.len()] == target[..]
            }
            Target::Callable(path) => callee.path() == *path,
            Target::Type(path) => {
                if let CalleeKind::Class(_) = callee.kind {
                    return callee.path() == *path;
                }
                callee.class_path().as_deref() == Some(path.as_str())
            }
            Target::Cursor(position) => site.span().contains(*position),
        }
    }

    /// Stable text form used by the replay script.
    pub fn to_spec(&self) -> String {
        match self {
            Target::Module(path) => format!("module:{path}"),
            Target::Callable(path) => format!("callable:{path}"),
            Target::Type(path) => format!("type:{path}"),
            Target::Cursor(position) => format!("cursor:{}:{}", position.line, position.column),
        }
    }

    pub fn from_spec(spec: &str) -> Result<Target, Error> {
        let Some((kind, rest)) = spec.split_once(':') else {
            return Err(Error::UnknownTarget(spec.to_string()));
        };
        match kind {
            "module" => Ok(Target::Module(rest.to_string())),
            "callable" => Ok(Target::Callable(rest.to_string())),
            "type" => Ok(Target::Type(rest.to_string())),
            "cursor" => {
                let (line, column) = rest
                    .split_once(':')
                    .ok_or_else(|| Error::UnknownTarget(spec.to_string()))?;
                let line = line
                    .parse()
                    .map_err(|_| Error::UnknownTarget(spec.to_string()))?;
                let column = column
                    .parse()
                    .map_err(|_| Error::UnknownTarget(spec.to_string()))?;
                Ok(Target::Cursor(Position { line, column }))
            }
            _ => Err(Error::UnknownTarget(spec.to_string())),
        }
    }
}

/// Resolves a target string lazily against the traced environment: a module
/// path registered in the module registry, a `module.symbol` path, or a name
/// bound in the program's globals.
pub fn make_target(spec: &str, trace: &mut Trace) -> Result<Target, Error> {
    if spec.contains(':') {
        return Target::from_spec(spec);
    }
    if spec == MAIN_MODULE || trace.runtime.registry.contains(spec) {
        return Ok(Target::Module(spec.to_string()));
    }

    let resolved = match spec.rsplit_once('.') {
        Some((module_path, symbol)) if trace.runtime.registry.contains(module_path) => {
            let module = trace
                .runtime
                .import_module(module_path)
                .map_err(|_| Error::UnknownTarget(spec.to_string()))?;
            let Value::Module(module) = module else {
                return Err(Error::UnknownTarget(spec.to_string()));
            };
            trace.runtime.module_attr(&module, symbol).ok()
        }
        _ => trace.globals.get(spec),
    };

    match resolved {
        Some(Value::Function(_)) | Some(Value::BoundMethod(_)) => {
            Ok(Target::Callable(spec.to_string()))
        }
        Some(Value::Class(_)) => Ok(Target::Type(spec.to_string())),
        Some(Value::Module(_)) => Ok(Target::Module(spec.to_string())),
        _ => Err(Error::UnknownTarget(spec.to_string())),
    }
}

/// Whether the resolver handles this expression form at all. Anything else
/// is a non-candidate by construction, never an evaluation failure.
pub fn is_resolvable_form(expr: &Expr) -> bool {
    match expr {
        Expr::Name(_)
        | Expr::Int { .. }
        | Expr::Float { .. }
        | Expr::Str { .. }
        | Expr::Bool { .. }
        | Expr::None { .. } => true,
        Expr::Attribute { base, .. } => is_resolvable_form(base),
        Expr::Index { base, index, .. } => is_resolvable_form(base) && is_resolvable_form(index),
        _ => false,
    }
}

/// Evaluates a name/attribute/index chain against the captured environment,
/// without running any user code. Failure is surfaced, not swallowed: a
/// resolvable form that does not evaluate means the tree and the trace no
/// longer agree, or the construct is unsupported.
pub fn eval_static(expr: &Expr, trace: &mut Trace) -> Result<Value, Error> {
    eval_static_inner(expr, trace).ok_or_else(|| Error::Eval {
        expr: render_expr_text(expr),
    })
}

fn eval_static_inner(expr: &Expr, trace: &mut Trace) -> Option<Value> {
    match expr {
        Expr::Name(name) => trace.globals.get(&name.name),
        Expr::Int { value, .. } => Some(Value::Int(*value)),
        Expr::Float { value, .. } => Some(Value::Float(*value)),
        Expr::Str { value, .. } => Some(Value::str(value.clone())),
        Expr::Bool { value, .. } => Some(Value::Bool(*value)),
        Expr::None { .. } => Some(Value::None),
        Expr::Attribute { base, attr, .. } => {
            let base = eval_static_inner(base, trace)?;
            static_attr(&base, &attr.name, trace)
        }
        Expr::Index { base, index, .. } => {
            let base = eval_static_inner(base, trace)?;
            let index = eval_static_inner(index, trace)?;
            trace.runtime.eval_index(&base, &index).ok()
        }
        _ => None,
    }
}

/// Attribute lookup that never calls user code: property accessors are left
/// unevaluated (the inline pass detects them separately).
fn static_attr(base: &Value, attr: &str, trace: &mut Trace) -> Option<Value> {
    match base {
        Value::Instance(instance) => {
            if let Some(value) = instance.borrow().fields.get(attr) {
                return Some(value.clone());
            }
            let class = instance.borrow().class.clone();
            if class.properties.contains_key(attr) {
                return None;
            }
            class.methods.get(attr).map(|method| {
                Value::BoundMethod(Rc::new(BoundMethodValue {
                    receiver: base.clone(),
                    class: class.clone(),
                    func: method.clone(),
                }))
            })
        }
        _ => trace.runtime.eval_attribute(base.clone(), attr).ok(),
    }
}

/// Resolves the callee identity of a call's function expression, or `None`
/// when the expression is not a resolvable form.
pub fn resolve_callee(func: &Expr, trace: &mut Trace) -> Result<Option<Callee>, Error> {
    if !is_resolvable_form(func) {
        return Ok(None);
    }
    let value = eval_static(func, trace)?;
    Ok(Callee::from_value(&value))
}
