use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::value::Value;

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One lexical scope frame. Frames form a parent chain ending at the globals.
#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Value>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: None,
            bindings: IndexMap::new(),
        }))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    /// Binds `name` in this frame only, shadowing any outer binding.
    pub fn define(&mut self, name: impl Into<String>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Overwrites the nearest existing binding of `name`. Returns `false`
    /// when no frame in the chain defines it; nothing is created.
    pub fn assign(env: &EnvironmentRef, name: &str, value: Value) -> bool {
        let mut frame = Rc::clone(env);
        loop {
            let parent = {
                let mut scope = frame.borrow_mut();
                if let Some(slot) = scope.bindings.get_mut(name) {
                    *slot = value;
                    return true;
                }
                scope.parent.clone()
            };
            match parent {
                Some(parent) => frame = parent,
                None => return false,
            }
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str) -> Option<Value> {
        let mut frame = Rc::clone(env);
        loop {
            let parent = {
                let scope = frame.borrow();
                if let Some(value) = scope.bindings.get(name) {
                    return Some(value.clone());
                }
                scope.parent.clone()
            };
            frame = parent?;
        }
    }
}
