use std::cell::RefCell;
use std::rc::Rc;

use rustc_hash::FxHashMap;

use super::values::Value;

/// Parent-chained mutable scope. Lookups walk the chain; assignment always
/// binds in the innermost scope.
#[derive(Clone)]
pub struct Env {
    inner: Rc<EnvInner>,
}

struct EnvInner {
    parent: Option<Env>,
    values: RefCell<FxHashMap<String, Value>>,
}

impl Env {
    pub fn new(parent: Option<Env>) -> Self {
        Env {
            inner: Rc::new(EnvInner {
                parent,
                values: RefCell::new(FxHashMap::default()),
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.inner.values.borrow().get(name) {
            return Some(value.clone());
        }
        self.inner
            .parent
            .as_ref()
            .and_then(|parent| parent.get(name))
    }

    pub fn set(&self, name: impl Into<String>, value: Value) {
        self.inner.values.borrow_mut().insert(name.into(), value);
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn get_local(&self, name: &str) -> Option<Value> {
        self.inner.values.borrow().get(name).cloned()
    }

    /// Names bound directly in this scope, in no particular order.
    pub fn local_names(&self) -> Vec<String> {
        self.inner.values.borrow().keys().cloned().collect()
    }

    /// Whether two handles refer to the same scope.
    pub fn ptr_eq(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
