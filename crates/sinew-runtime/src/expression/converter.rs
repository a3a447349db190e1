//! Value converters and the registry expressions resolve them from.

use std::fmt;
use std::rc::Rc;

use ahash::AHashMap;
use sinew_core::{Error, Result, Value};

/// A named two-way transformation applied by `expr | name:args`.
pub trait ValueConverter {
    /// Source to view.
    fn to_view(&self, value: Value, args: &[Value]) -> Result<Value>;

    /// View to source. Identity unless overridden.
    fn from_view(&self, value: Value, _args: &[Value]) -> Result<Value> {
        Ok(value)
    }
}

/// Converter built from a plain `to_view` closure.
pub struct FnConverter<F> {
    to_view: F,
}

impl<F> FnConverter<F>
where
    F: Fn(Value, &[Value]) -> Result<Value>,
{
    pub fn new(to_view: F) -> Self {
        Self { to_view }
    }
}

impl<F> ValueConverter for FnConverter<F>
where
    F: Fn(Value, &[Value]) -> Result<Value>,
{
    fn to_view(&self, value: Value, args: &[Value]) -> Result<Value> {
        (self.to_view)(value, args)
    }
}

/// Named resources available to expressions.
#[derive(Default, Clone)]
pub struct Resources {
    converters: AHashMap<Rc<str>, Rc<dyn ValueConverter>>,
}

impl Resources {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a converter.
    pub fn register(&mut self, name: &str, converter: impl ValueConverter + 'static) -> &mut Self {
        self.converters.insert(Rc::from(name), Rc::new(converter));
        self
    }

    #[must_use]
    pub fn with_converter(mut self, name: &str, converter: impl ValueConverter + 'static) -> Self {
        self.register(name, converter);
        self
    }

    pub fn converter(&self, name: &str) -> Result<Rc<dyn ValueConverter>> {
        self.converters
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownConverter {
                name: name.to_string(),
            })
    }

    #[must_use]
    pub fn has_converter(&self, name: &str) -> bool {
        self.converters.contains_key(name)
    }
}

impl fmt::Debug for Resources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.converters.keys().map(|k| &**k).collect();
        names.sort_unstable();
        f.debug_struct("Resources")
            .field("converters", &names)
            .finish()
    }
}
