use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while constructing, evaluating, or updating bindings.
///
/// Nothing in the observation core recovers from these; they surface to
/// whichever call triggered the bind, the mutation, or the flush.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("missing required binding parameter: {name}")]
    MissingParameter { name: &'static str },

    #[error("invalid binding parameter {name}: {message}")]
    InvalidParameter { name: &'static str, message: String },

    #[error("cannot read property '{key}' of {target}")]
    NullMemberAccess { key: String, target: &'static str },

    #[error("{name} is not a function")]
    NotAFunction { name: String },

    #[error("cannot assign through {expression}: expression is not assignable")]
    NotAssignable { expression: &'static str },

    #[error("cannot assign to read-only property '{key}'")]
    ReadOnlyProperty { key: String },

    #[error("value converter '{name}' is not registered")]
    UnknownConverter { name: String },

    #[error("{message}")]
    Thrown { message: String },
}

impl Error {
    #[must_use]
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::Thrown {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn invalid(name: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn read_only(key: impl Into<String>) -> Self {
        Self::ReadOnlyProperty { key: key.into() }
    }
}

/// Keep the first error of a multi-target delivery pass.
///
/// Returns `true` if `err` was stored, `false` if an earlier error already
/// occupies the slot (the caller is expected to log the later one).
pub fn keep_first(slot: &mut Option<Error>, err: Error) -> bool {
    if slot.is_none() {
        *slot = Some(err);
        true
    } else {
        false
    }
}
