use std::fmt;

/// The principal a mutation is attributed to in audit records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Actor {
    /// An operator identified by the `X-User-ID` header.
    User(String),
    /// An internal job such as the sync worker or the auto-matcher.
    System(&'static str),
}

impl Actor {
    pub fn user(id: impl Into<String>) -> Self {
        Self::User(id.into())
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Self::System(_))
    }

    /// Identifier persisted in `*_by` columns.
    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "{}", id),
            Self::System(name) => write!(f, "system:{}", name),
        }
    }
}
