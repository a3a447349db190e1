//! Observer locator configuration.
//!
//! Environment variables take precedence over defaults:
//!
//! | Variable | Values |
//! |---|---|
//! | `SINEW_OBSERVATION` | `intercept` (default) or `explicit` |
//! | `SINEW_LAYOUT_PROPERTIES` | comma-separated property names |

use std::env;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use ahash::AHashSet;
use sinew_core::Error;

/// How native mutations become observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObservationStrategy {
    /// Observers install hooks on objects and collections, so writes and
    /// mutations made directly on them are seen.
    #[default]
    Intercept,
    /// Only writes routed through an observer (`set_value`, collection
    /// observer wrappers) are seen. Objects and collections are never hooked.
    Explicit,
}

impl ObservationStrategy {
    #[must_use]
    pub const fn intercepts(self) -> bool {
        matches!(self, Self::Intercept)
    }
}

impl FromStr for ObservationStrategy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "intercept" => Ok(Self::Intercept),
            "explicit" => Ok(Self::Explicit),
            other => Err(Error::invalid(
                "observation",
                format!("expected `intercept` or `explicit`, got `{other}`"),
            )),
        }
    }
}

impl fmt::Display for ObservationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Intercept => "intercept",
            Self::Explicit => "explicit",
        })
    }
}

/// Element properties whose writes are deferred to the write queue by default.
pub const DEFAULT_LAYOUT_PROPERTIES: &[&str] = &["scrollTop", "scrollLeft", "width", "height"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatorConfig {
    pub strategy: ObservationStrategy,
    /// Element property names classified as layout-affecting.
    pub layout_properties: AHashSet<Rc<str>>,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            strategy: ObservationStrategy::default(),
            layout_properties: DEFAULT_LAYOUT_PROPERTIES
                .iter()
                .map(|&name| Rc::from(name))
                .collect(),
        }
    }
}

impl LocatorConfig {
    #[must_use]
    pub fn with_strategy(mut self, strategy: ObservationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Replace the layout-affecting property set.
    #[must_use]
    pub fn with_layout_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.layout_properties = names.into_iter().map(|n| Rc::from(n.as_ref())).collect();
        self
    }

    #[must_use]
    pub fn is_layout_property(&self, name: &str) -> bool {
        self.layout_properties.contains(name)
    }

    /// Defaults overridden by `SINEW_*` environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for the `SINEW_*` keys.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(val) = lookup("SINEW_OBSERVATION") {
            match val.parse() {
                Ok(strategy) => config.strategy = strategy,
                Err(err) => tracing::warn!(message = "config.invalid", key = "SINEW_OBSERVATION", error = %err),
            }
        }
        if let Some(val) = lookup("SINEW_LAYOUT_PROPERTIES") {
            config = config.with_layout_properties(
                val.split(',').map(str::trim).filter(|name| !name.is_empty()),
            );
        }
        config
    }
}
