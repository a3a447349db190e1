use std::fmt;
use std::rc::Rc;

use sinew_core::{Result, Scope};

use super::Binding;
use crate::flags::LifecycleFlags;

/// A set of bindings bound and unbound together.
///
/// Binding is all-or-nothing: if one binding fails, the ones already bound
/// are unbound again before the error is returned. Unbinding runs in reverse
/// order. Dropping a group unbinds it.
#[derive(Default)]
pub struct BindingGroup {
    bindings: Vec<Rc<dyn Binding>>,
}

impl BindingGroup {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, binding: Rc<dyn Binding>) {
        self.bindings.push(binding);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<dyn Binding>> {
        self.bindings.iter()
    }

    pub fn bind(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()> {
        for (index, binding) in self.bindings.iter().enumerate() {
            if let Err(err) = binding.bind(flags, scope) {
                for bound in self.bindings[..index].iter().rev() {
                    bound.unbind(flags);
                }
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn unbind(&self, flags: LifecycleFlags) {
        for binding in self.bindings.iter().rev() {
            binding.unbind(flags);
        }
    }

    /// Whether every binding in the group is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        !self.bindings.is_empty() && self.bindings.iter().all(|b| b.is_bound())
    }
}

impl fmt::Debug for BindingGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingGroup")
            .field("len", &self.bindings.len())
            .field("bound", &self.is_bound())
            .finish()
    }
}

impl Drop for BindingGroup {
    fn drop(&mut self) {
        self.unbind(LifecycleFlags::FROM_UNBIND);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{PropertyBinding, RefBinding, Services};
    use crate::expression::Expression;
    use sinew_core::{Error, Object, Value};

    #[test]
    fn failure_rolls_back_earlier_bindings() {
        let services = Services::default();
        let vm = Object::from_entries([("user", Value::Null)]);
        let el = Object::element("input");
        let mut group = BindingGroup::new();
        group.add(RefBinding::new(Expression::scope("input"), Rc::clone(&el), services.clone()));
        group.add(
            PropertyBinding::builder()
                .expression(Expression::scope("user").member("name"))
                .target(Rc::clone(&el))
                .target_property("value")
                .services(services)
                .build()
                .unwrap(),
        );
        let result = group.bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)));
        assert!(matches!(result, Err(Error::NullMemberAccess { .. })));
        assert!(group.iter().all(|b| !b.is_bound()));
        assert_eq!(vm.peek("input"), Value::Null);
    }

    #[test]
    fn drop_unbinds_everything() {
        let vm = Object::from_entries([("n", 1)]);
        let el = Object::element("span");
        let binding = PropertyBinding::builder()
            .expression(Expression::scope("n"))
            .target(Rc::clone(&el))
            .target_property("textContent")
            .services(Services::default())
            .build()
            .unwrap();
        let mut group = BindingGroup::new();
        group.add(Rc::clone(&binding) as Rc<dyn Binding>);
        group.bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm))).unwrap();
        assert!(group.is_bound());
        drop(group);
        assert!(!binding.is_bound());
        vm.set("n", Value::from(2)).unwrap();
        assert_eq!(el.peek("textContent"), Value::from(1));
    }
}
