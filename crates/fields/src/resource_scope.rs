//! Ownership of auxiliary data created during one evaluation.

use std::{any::Any, cell::RefCell, fmt};

enum Resource {
    Value(Box<dyn Any>),
    DestructCall(Box<dyn FnOnce()>),
}

/// Owns resources that have to stay alive for as long as the results of an
/// evaluation are used, e.g. data a [`FieldContext`](crate::FieldContext)
/// computes on the fly.
///
/// Resources are released in reverse order of insertion when the scope is
/// dropped. A scope belongs to exactly one evaluation and is not shared
/// between threads.
#[derive(Default)]
pub struct ResourceScope {
    resources: RefCell<Vec<Resource>>,
}

impl ResourceScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `value` into the scope. It is dropped together with the scope.
    pub fn add_value<T: 'static>(&self, value: T) {
        self.resources
            .borrow_mut()
            .push(Resource::Value(Box::new(value)));
    }

    /// Registers a callback that runs exactly once when the scope is dropped.
    pub fn add_destruct_call<F>(&self, destruct: F)
    where
        F: FnOnce() + 'static,
    {
        self.resources
            .borrow_mut()
            .push(Resource::DestructCall(Box::new(destruct)));
    }

    pub fn len(&self) -> usize {
        self.resources.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.borrow().is_empty()
    }
}

impl Drop for ResourceScope {
    fn drop(&mut self) {
        let resources = self.resources.get_mut();
        while let Some(resource) = resources.pop() {
            match resource {
                Resource::Value(value) => drop(value),
                Resource::DestructCall(destruct) => destruct(),
            }
        }
    }
}

impl fmt::Debug for ResourceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceScope")
            .field("resources", &self.len())
            .finish()
    }
}
