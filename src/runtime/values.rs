use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::surface::ast::{ClassDef, FuncDef};

use super::environment::Env;
use super::{Runtime, RuntimeError};

pub type BuiltinFunc = dyn Fn(&mut Runtime, &Env, Vec<Value>) -> Result<Value, RuntimeError>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<String>),
    List(Rc<RefCell<Vec<Value>>>),
    Tuple(Rc<Vec<Value>>),
    /// Association list preserving insertion order; keys compared structurally.
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    Function(Rc<FunctionValue>),
    BoundMethod(Rc<BoundMethodValue>),
    Class(Rc<ClassValue>),
    Instance(Rc<RefCell<InstanceValue>>),
    Module(Rc<ModuleValue>),
    Builtin(Rc<BuiltinValue>),
    /// A builtin method bound to its receiver, e.g. `xs.append`.
    BoundBuiltin(Rc<BoundBuiltinValue>),
}

/// A user function together with its identity and capture record: the
/// defining module, the qualified name, and the environment its free names
/// resolve in.
pub struct FunctionValue {
    pub def: Rc<FuncDef>,
    pub module: String,
    pub qualname: String,
    pub env: Env,
    pub is_generator: bool,
}

pub struct BoundMethodValue {
    pub receiver: Value,
    pub class: Rc<ClassValue>,
    pub func: Rc<FunctionValue>,
}

pub struct ClassValue {
    pub name: String,
    pub module: String,
    pub qualname: String,
    pub def: Rc<ClassDef>,
    pub methods: FxHashMap<String, Rc<FunctionValue>>,
    pub properties: FxHashMap<String, Rc<FunctionValue>>,
}

pub struct InstanceValue {
    pub class: Rc<ClassValue>,
    pub fields: FxHashMap<String, Value>,
}

pub struct ModuleValue {
    pub path: String,
    pub globals: Env,
}

pub struct BuiltinValue {
    pub name: String,
    pub func: Box<BuiltinFunc>,
}

pub struct BoundBuiltinValue {
    pub receiver: Value,
    pub method: &'static str,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Value::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Value::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Value::Str(v) => f.debug_tuple("Str").field(v).finish(),
            Value::List(v) => f.debug_tuple("List").field(&v.borrow()).finish(),
            Value::Tuple(v) => f.debug_tuple("Tuple").field(v).finish(),
            Value::Dict(v) => f.debug_tuple("Dict").field(&v.borrow()).finish(),
            Value::Function(v) => write!(f, "Function({})", v.qualname),
            Value::BoundMethod(v) => write!(f, "BoundMethod({})", v.func.qualname),
            Value::Class(v) => write!(f, "Class({})", v.qualname),
            Value::Instance(v) => write!(f, "Instance({})", v.borrow().class.qualname),
            Value::Module(v) => write!(f, "Module({})", v.path),
            Value::Builtin(v) => write!(f, "Builtin({})", v.name),
            Value::BoundBuiltin(v) => write!(f, "BoundBuiltin({})", v.method),
        }
    }
}

impl Value {
    pub fn str(value: impl Into<String>) -> Value {
        Value::Str(Rc::new(value.into()))
    }

    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "None",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Function(_) | Value::BoundMethod(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
            Value::Module(_) => "module",
            Value::Builtin(_) | Value::BoundBuiltin(_) => "builtin",
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(v) => *v,
            Value::Int(v) => *v != 0,
            Value::Float(v) => *v != 0.0,
            Value::Str(v) => !v.is_empty(),
            Value::List(v) => !v.borrow().is_empty(),
            Value::Tuple(v) => !v.is_empty(),
            Value::Dict(v) => !v.borrow().is_empty(),
            _ => true,
        }
    }

    /// Structural equality for data, identity for callables and instances.
    /// This is the `==` of the interpreted language.
    pub fn eq_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                *a as f64 == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_value(y))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_value(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter()
                            .any(|(k, v)| k.eq_value(key) && v.eq_value(value))
                    })
            }
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            (Value::Instance(a), Value::Instance(b)) => Rc::ptr_eq(a, b),
            (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Deep copy used for trace snapshots, so later in-place mutation cannot
    /// retroactively change a recorded observation.
    pub fn snapshot(&self) -> Value {
        match self {
            Value::List(items) => Value::list(items.borrow().iter().map(Value::snapshot).collect()),
            Value::Tuple(items) => {
                Value::Tuple(Rc::new(items.iter().map(Value::snapshot).collect()))
            }
            Value::Dict(entries) => Value::Dict(Rc::new(RefCell::new(
                entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.snapshot(), v.snapshot()))
                    .collect(),
            ))),
            Value::Instance(instance) => {
                let instance = instance.borrow();
                Value::Instance(Rc::new(RefCell::new(InstanceValue {
                    class: instance.class.clone(),
                    fields: instance
                        .fields
                        .iter()
                        .map(|(name, value)| (name.clone(), value.snapshot()))
                        .collect(),
                })))
            }
            other => other.clone(),
        }
    }

    /// Conservative value-unchanged check between two trace snapshots: deep
    /// comparison for data (instances compare class + fields), identity for
    /// callables, false for anything it cannot decide.
    pub fn robust_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Instance(a), Value::Instance(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                Rc::ptr_eq(&a.class, &b.class)
                    && a.fields.len() == b.fields.len()
                    && a.fields.iter().all(|(name, value)| {
                        b.fields
                            .get(name)
                            .is_some_and(|field| value.robust_eq(field))
                    })
            }
            (Value::List(a), Value::List(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.robust_eq(y))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.robust_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                let a = a.borrow();
                let b = b.borrow();
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter()
                            .any(|(k, v)| k.robust_eq(key) && v.robust_eq(value))
                    })
            }
            (Value::BoundMethod(a), Value::BoundMethod(b)) => {
                Rc::ptr_eq(&a.func, &b.func) && a.receiver.robust_eq(&b.receiver)
            }
            _ => self.eq_value(other),
        }
    }
}

/// `str()`-style rendering: bare strings at the top level, quoted inside
/// containers.
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Str(v) => v.as_str().to_string(),
        other => repr_value(other),
    }
}

pub fn repr_value(value: &Value) -> String {
    match value {
        Value::None => "None".to_string(),
        Value::Bool(v) => if *v { "True" } else { "False" }.to_string(),
        Value::Int(v) => v.to_string(),
        Value::Float(v) => {
            let text = v.to_string();
            if text.contains('.') {
                text
            } else {
                format!("{text}.0")
            }
        }
        Value::Str(v) => format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::List(items) => {
            let parts: Vec<String> = items.borrow().iter().map(repr_value).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Tuple(items) => {
            let parts: Vec<String> = items.iter().map(repr_value).collect();
            if parts.len() == 1 {
                format!("({},)", parts[0])
            } else {
                format!("({})", parts.join(", "))
            }
        }
        Value::Dict(entries) => {
            let parts: Vec<String> = entries
                .borrow()
                .iter()
                .map(|(k, v)| format!("{}: {}", repr_value(k), repr_value(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
        Value::Function(v) => format!("<function {}>", v.qualname),
        Value::BoundMethod(v) => format!("<bound method {}>", v.func.qualname),
        Value::Class(v) => format!("<class {}>", v.qualname),
        Value::Instance(v) => format!("<{} instance>", v.borrow().class.qualname),
        Value::Module(v) => format!("<module {}>", v.path),
        Value::Builtin(v) => format!("<builtin {}>", v.name),
        Value::BoundBuiltin(v) => format!("<builtin method {}>", v.method),
    }
}
