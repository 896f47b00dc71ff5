use std::rc::Rc;

use super::environment::Env;
use super::values::{format_value, repr_value, BuiltinValue, Value};
use super::{Runtime, RuntimeError};

/// Names installed into the root scope. The target predicate and the
/// dependency-import generator both treat these as always in scope.
pub const BUILTIN_NAMES: &[&str] = &[
    "print", "len", "range", "str", "repr", "abs", "sum", "__new__", "defined",
];

pub fn register_builtins(env: &Env) {
    register(env, "print", |runtime, _env, args| {
        let parts: Vec<String> = args.iter().map(format_value).collect();
        runtime.output.push_str(&parts.join(" "));
        runtime.output.push('\n');
        Ok(Value::None)
    });

    register(env, "len", |_runtime, _env, args| {
        let [value] = args.as_slice() else {
            return Err(RuntimeError::msg("len() takes exactly one argument"));
        };
        let len = match value {
            Value::Str(text) => text.chars().count(),
            Value::List(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Dict(entries) => entries.borrow().len(),
            other => {
                return Err(RuntimeError::msg(format!(
                    "{} has no length",
                    other.type_name()
                )))
            }
        };
        Ok(Value::Int(len as i64))
    });

    register(env, "range", |_runtime, _env, args| {
        let bounds: Vec<i64> = args
            .iter()
            .map(|value| match value {
                Value::Int(v) => Ok(*v),
                _ => Err(RuntimeError::msg("range() arguments must be integers")),
            })
            .collect::<Result<_, _>>()?;
        let (start, stop, step) = match bounds.as_slice() {
            [stop] => (0, *stop, 1),
            [start, stop] => (*start, *stop, 1),
            [start, stop, step] if *step != 0 => (*start, *stop, *step),
            _ => return Err(RuntimeError::msg("invalid range() arguments")),
        };
        let mut items = Vec::new();
        let mut current = start;
        while (step > 0 && current < stop) || (step < 0 && current > stop) {
            items.push(Value::Int(current));
            current += step;
        }
        Ok(Value::list(items))
    });

    register(env, "str", |_runtime, _env, args| {
        let [value] = args.as_slice() else {
            return Err(RuntimeError::msg("str() takes exactly one argument"));
        };
        Ok(Value::str(format_value(value)))
    });

    register(env, "repr", |_runtime, _env, args| {
        let [value] = args.as_slice() else {
            return Err(RuntimeError::msg("repr() takes exactly one argument"));
        };
        Ok(Value::str(repr_value(value)))
    });

    register(env, "abs", |_runtime, _env, args| match args.as_slice() {
        [Value::Int(v)] => Ok(Value::Int(v.abs())),
        [Value::Float(v)] => Ok(Value::Float(v.abs())),
        _ => Err(RuntimeError::msg("abs() takes one numeric argument")),
    });

    register(env, "sum", |runtime, _env, args| {
        let [value] = args.as_slice() else {
            return Err(RuntimeError::msg("sum() takes exactly one argument"));
        };
        let mut total_int: i64 = 0;
        let mut total_float = 0.0;
        let mut is_float = false;
        for item in runtime.iter_values(value)? {
            match item {
                Value::Int(v) => {
                    total_int += v;
                    total_float += v as f64;
                }
                Value::Float(v) => {
                    is_float = true;
                    total_float += v;
                }
                other => {
                    return Err(RuntimeError::msg(format!(
                        "cannot sum {}",
                        other.type_name()
                    )))
                }
            }
        }
        Ok(if is_float {
            Value::Float(total_float)
        } else {
            Value::Int(total_int)
        })
    });

    // Raw allocation used by constructor expansion: `__new__(Cls)` makes an
    // uninitialized instance without running `__init__`.
    register(env, "__new__", |_runtime, _env, args| {
        let [value] = args.as_slice() else {
            return Err(RuntimeError::msg("__new__() takes exactly one argument"));
        };
        let Value::Class(class) = value else {
            return Err(RuntimeError::msg("__new__() argument must be a class"));
        };
        Ok(Value::Instance(Rc::new(std::cell::RefCell::new(
            super::values::InstanceValue {
                class: class.clone(),
                fields: rustc_hash::FxHashMap::default(),
            },
        ))))
    });

    // Scope membership test used by the return guards that inline expansion
    // emits: `defined("f_ret")`.
    register(env, "defined", |_runtime, env, args| {
        let [Value::Str(name)] = args.as_slice() else {
            return Err(RuntimeError::msg("defined() takes one string argument"));
        };
        Ok(Value::Bool(env.is_bound(name.as_str())))
    });
}

fn register(
    env: &Env,
    name: &str,
    func: impl Fn(&mut Runtime, &Env, Vec<Value>) -> Result<Value, RuntimeError> + 'static,
) {
    env.set(
        name,
        Value::Builtin(Rc::new(BuiltinValue {
            name: name.to_string(),
            func: Box::new(func),
        })),
    );
}
