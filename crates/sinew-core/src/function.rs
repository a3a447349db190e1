//! Callable values.

use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::value::Value;

type NativeFn = Box<dyn Fn(&Value, &[Value]) -> Result<Value>>;

/// A native function that expressions can call.
///
/// The first argument is the receiver (`this`): the object a member call was
/// made on, or the binding context for a scope call.
pub struct Function {
    name: Rc<str>,
    call: NativeFn,
}

impl Function {
    pub fn new(
        name: &str,
        call: impl Fn(&Value, &[Value]) -> Result<Value> + 'static,
    ) -> Rc<Self> {
        Rc::new(Self {
            name: Rc::from(name),
            call: Box::new(call),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, this: &Value, args: &[Value]) -> Result<Value> {
        (self.call)(this, args)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn calls_with_receiver_and_args() {
        let add = Function::new("add", |_this, args| {
            Ok(Value::from(args.iter().map(Value::to_number).sum::<f64>()))
        });
        assert_eq!(add.name(), "add");
        assert_eq!(
            add.call(&Value::Undefined, &[Value::from(1), Value::from(2)]),
            Ok(Value::from(3))
        );
    }

    #[test]
    fn errors_propagate() {
        let boom = Function::new("boom", |_, _| Err(Error::thrown("boom")));
        assert_eq!(boom.call(&Value::Null, &[]), Err(Error::thrown("boom")));
    }
}
