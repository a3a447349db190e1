//! Compiled view instructions and the renderer that turns them into
//! bindings.
//!
//! Instructions are produced ahead of time by a template compiler and are
//! opaque to the runtime beyond what is listed here.

use std::rc::Rc;

use sinew_core::{Object, Result, Value};

use super::{
    BindingGroup, LetBinding, ListenerBinding, PropertyBinding, RefBinding, Services,
};
use crate::expression::Expression;
use crate::flags::{BindingMode, LifecycleFlags};

#[derive(Debug, Clone)]
pub enum Instruction {
    /// `target.property.bind="expression"` with an explicit mode.
    Property {
        expression: Rc<Expression>,
        target: Rc<Object>,
        property: Rc<str>,
        mode: BindingMode,
    },
    /// `target.event.trigger="expression"`.
    Listener {
        expression: Rc<Expression>,
        target: Rc<Object>,
        event: Rc<str>,
    },
    /// `ref="expression"`.
    Ref {
        expression: Rc<Expression>,
        target: Rc<Object>,
    },
    /// `<let property.bind="expression">`.
    Let {
        expression: Rc<Expression>,
        property: Rc<str>,
        to_binding_context: bool,
    },
    /// A static attribute value written once at render time.
    SetProperty {
        target: Rc<Object>,
        property: Rc<str>,
        value: Value,
    },
}

/// Builds binding groups from instructions against one set of services.
#[derive(Debug, Clone, Default)]
pub struct Renderer {
    services: Services,
}

impl Renderer {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    #[must_use]
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Create (unbound) bindings for `instructions`.
    ///
    /// `SetProperty` is applied immediately and produces no binding.
    pub fn render(&self, instructions: &[Instruction]) -> Result<BindingGroup> {
        let mut group = BindingGroup::new();
        for instruction in instructions {
            match instruction {
                Instruction::Property {
                    expression,
                    target,
                    property,
                    mode,
                } => {
                    let binding = PropertyBinding::builder()
                        .expression(Rc::clone(expression))
                        .target(Rc::clone(target))
                        .target_property(property)
                        .mode(*mode)
                        .services(self.services.clone())
                        .build()?;
                    group.add(binding);
                }
                Instruction::Listener {
                    expression,
                    target,
                    event,
                } => group.add(ListenerBinding::new(
                    Rc::clone(expression),
                    Rc::clone(target),
                    event,
                    self.services.clone(),
                )),
                Instruction::Ref { expression, target } => group.add(RefBinding::new(
                    Rc::clone(expression),
                    Rc::clone(target),
                    self.services.clone(),
                )),
                Instruction::Let {
                    expression,
                    property,
                    to_binding_context,
                } => group.add(LetBinding::new(
                    Rc::clone(expression),
                    property,
                    *to_binding_context,
                    self.services.clone(),
                )),
                Instruction::SetProperty {
                    target,
                    property,
                    value,
                } => {
                    self.services
                        .locator()
                        .get_observer(&Value::Object(Rc::clone(target)), property)
                        .set_value(value.clone(), LifecycleFlags::FROM_BIND)?;
                }
            }
        }
        tracing::debug!(message = "renderer.render", instructions = instructions.len(), bindings = group.len());
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Binding;
    use sinew_core::{Error, Scope};

    #[test]
    fn renders_and_binds_a_small_view() {
        let vm = Object::from_entries([("name", "ada")]);
        let input = Object::element("input");
        let label = Object::element("label");
        let instructions = vec![
            Instruction::SetProperty {
                target: Rc::clone(&input),
                property: Rc::from("type"),
                value: Value::from("text"),
            },
            Instruction::Property {
                expression: Rc::new(Expression::scope("name")),
                target: Rc::clone(&input),
                property: Rc::from("value"),
                mode: BindingMode::TWO_WAY,
            },
            Instruction::Let {
                expression: Rc::new(Expression::scope("name").call("toUpperCase", vec![])),
                property: Rc::from("shout"),
                to_binding_context: false,
            },
            Instruction::Property {
                expression: Rc::new(Expression::scope("shout")),
                target: Rc::clone(&label),
                property: Rc::from("textContent"),
                mode: BindingMode::TO_VIEW,
            },
        ];
        let group = Renderer::default().render(&instructions).unwrap();
        assert_eq!(group.len(), 3);
        assert_eq!(input.peek("type"), Value::from("text"));

        group
            .bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))
            .unwrap();
        assert_eq!(label.peek("textContent"), Value::from("ADA"));

        input.set("value", Value::from("grace")).unwrap();
        assert_eq!(vm.peek("name"), Value::from("grace"));
        assert_eq!(label.peek("textContent"), Value::from("GRACE"));
    }

    #[test]
    fn invalid_instruction_fails_render() {
        let result = Renderer::default().render(&[Instruction::Property {
            expression: Rc::new(Expression::scope("x")),
            target: Object::new(),
            property: Rc::from(""),
            mode: BindingMode::TO_VIEW,
        }]);
        assert!(matches!(
            result,
            Err(Error::InvalidParameter {
                name: "target_property",
                ..
            })
        ));
    }

    #[test]
    fn group_binding_is_observable_per_binding() {
        let group = Renderer::default()
            .render(&[Instruction::Ref {
                expression: Rc::new(Expression::scope("el")),
                target: Object::element("div"),
            }])
            .unwrap();
        let scope = Scope::create(Object::new());
        group.bind(LifecycleFlags::empty(), &scope).unwrap();
        assert!(group.iter().all(|b| b.is_bound()));
    }
}
