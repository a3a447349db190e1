//! Evaluation scopes.
//!
//! A [`Scope`] pairs a *binding context* (the view-model whose properties
//! expressions read) with an *override context* (local names such as `$event`
//! or repeater locals that shadow the binding context). Scopes chain to
//! their parent so that names not found locally resolve further up, stopping
//! at a boundary scope.

use std::fmt;
use std::rc::{Rc, Weak};

use crate::object::Object;

pub struct Scope {
    binding_context: Rc<Object>,
    override_context: Rc<Object>,
    parent: Option<Weak<Scope>>,
    is_boundary: bool,
}

impl Scope {
    pub fn new(
        parent: Option<&Rc<Scope>>,
        binding_context: Rc<Object>,
        override_context: Rc<Object>,
        is_boundary: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            binding_context,
            override_context,
            parent: parent.map(Rc::downgrade),
            is_boundary,
        })
    }

    /// Root boundary scope over `binding_context`.
    pub fn create(binding_context: Rc<Object>) -> Rc<Self> {
        Self::new(None, binding_context, Object::new(), true)
    }

    /// Child scope with a fresh, empty override context.
    pub fn from_parent(parent: &Rc<Scope>, binding_context: Rc<Object>) -> Rc<Self> {
        Self::new(Some(parent), binding_context, Object::new(), false)
    }

    #[must_use]
    pub fn binding_context(&self) -> &Rc<Object> {
        &self.binding_context
    }

    #[must_use]
    pub fn override_context(&self) -> &Rc<Object> {
        &self.override_context
    }

    #[must_use]
    pub fn parent(&self) -> Option<Rc<Scope>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn is_boundary(&self) -> bool {
        self.is_boundary
    }

    /// Walk `hops` parents up. `None` when the chain is shorter.
    pub fn ancestor(self: &Rc<Self>, hops: u32) -> Option<Rc<Scope>> {
        let mut scope = Rc::clone(self);
        for _ in 0..hops {
            scope = scope.parent()?;
        }
        Some(scope)
    }

    /// The object a scope-relative `name` should be read from or written to.
    ///
    /// With `ancestor > 0`, hop that many parents and pick the override
    /// context if it has `name`, else the binding context. With `ancestor ==
    /// 0`, walk up through non-boundary scopes looking for `name` in either
    /// context. When nothing matches, the starting scope's binding context is
    /// returned so that assignment creates the property there.
    pub fn context_for(self: &Rc<Self>, name: &str, ancestor: u32) -> Option<Rc<Object>> {
        if ancestor > 0 {
            let scope = self.ancestor(ancestor)?;
            return Some(scope.pick(name));
        }

        let mut current = Some(Rc::clone(self));
        while let Some(scope) = current {
            if scope.override_context.has(name) {
                return Some(Rc::clone(&scope.override_context));
            }
            if scope.binding_context.has(name) {
                return Some(Rc::clone(&scope.binding_context));
            }
            if scope.is_boundary {
                break;
            }
            current = scope.parent();
        }
        Some(Rc::clone(&self.binding_context))
    }

    fn pick(&self, name: &str) -> Rc<Object> {
        if self.override_context.has(name) {
            Rc::clone(&self.override_context)
        } else {
            Rc::clone(&self.binding_context)
        }
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("binding_context", &self.binding_context.id())
            .field("override_context", &self.override_context.id())
            .field("has_parent", &self.parent.is_some())
            .field("is_boundary", &self.is_boundary)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn resolves_locally_first() {
        let vm = Object::from_entries([("a", 1)]);
        let scope = Scope::create(Rc::clone(&vm));
        scope.override_context().set("a", Value::from(2)).unwrap();
        let ctx = scope.context_for("a", 0).unwrap();
        assert!(Rc::ptr_eq(&ctx, scope.override_context()));
    }

    #[test]
    fn walks_to_parent_until_boundary() {
        let outer = Object::from_entries([("title", "x")]);
        let root = Scope::create(Rc::clone(&outer));
        let item = Object::from_entries([("name", "row")]);
        let child = Scope::from_parent(&root, Rc::clone(&item));

        let ctx = child.context_for("title", 0).unwrap();
        assert!(Rc::ptr_eq(&ctx, &outer));
        let ctx = child.context_for("name", 0).unwrap();
        assert!(Rc::ptr_eq(&ctx, &item));
        let ctx = child.context_for("missing", 0).unwrap();
        assert!(Rc::ptr_eq(&ctx, &item));
    }

    #[test]
    fn boundary_stops_the_walk() {
        let outer = Object::from_entries([("title", "x")]);
        let root = Scope::create(outer);
        let inner = Object::new();
        let boundary = Scope::new(Some(&root), Rc::clone(&inner), Object::new(), true);
        let ctx = boundary.context_for("title", 0).unwrap();
        assert!(Rc::ptr_eq(&ctx, &inner));
    }

    #[test]
    fn explicit_ancestor_hops() {
        let outer = Object::new();
        let root = Scope::create(Rc::clone(&outer));
        let child = Scope::from_parent(&root, Object::new());
        let ctx = child.context_for("anything", 1).unwrap();
        assert!(Rc::ptr_eq(&ctx, &outer));
        assert!(child.context_for("anything", 2).is_none());
    }
}
