//! Declarations used to allocate batched state containers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Storage kind of a batched attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    /// One `f64` per walker.
    Scalars,
    /// One `bool` per walker.
    Flags,
    /// One index per walker.
    Indices,
    /// A fixed-width row of `f64` per walker.
    Rows,
}

impl AttributeKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Scalars => "scalars",
            Self::Flags => "flags",
            Self::Indices => "indices",
            Self::Rows => "rows",
        }
    }
}

/// Declaration of a single attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSpec {
    pub kind: AttributeKind,
    /// Row width. Required for [`AttributeKind::Rows`].
    #[serde(default)]
    pub size: Option<usize>,
}

impl AttributeSpec {
    pub fn scalars() -> Self {
        Self {
            kind: AttributeKind::Scalars,
            size: None,
        }
    }

    pub fn flags() -> Self {
        Self {
            kind: AttributeKind::Flags,
            size: None,
        }
    }

    pub fn indices() -> Self {
        Self {
            kind: AttributeKind::Indices,
            size: None,
        }
    }

    pub fn rows(size: usize) -> Self {
        Self {
            kind: AttributeKind::Rows,
            size: Some(size),
        }
    }
}

/// Attribute name to declaration.
pub type StateSpec = BTreeMap<String, AttributeSpec>;

/// Attributes every environment state must expose to the walkers.
pub const ENV_REQUIRED: [(&str, AttributeKind); 4] = [
    ("observs", AttributeKind::Rows),
    ("states", AttributeKind::Rows),
    ("rewards", AttributeKind::Scalars),
    ("ends", AttributeKind::Flags),
];

/// Build the minimal environment spec.
pub fn env_state_spec(obs_size: usize, state_size: usize) -> StateSpec {
    let mut spec = StateSpec::new();
    spec.insert("observs".into(), AttributeSpec::rows(obs_size));
    spec.insert("states".into(), AttributeSpec::rows(state_size));
    spec.insert("rewards".into(), AttributeSpec::scalars());
    spec.insert("ends".into(), AttributeSpec::flags());
    spec
}

/// Check that an environment spec declares everything the walkers read.
pub fn validate_env_spec(spec: &StateSpec) -> Result<(), ConfigError> {
    for (name, kind) in ENV_REQUIRED {
        let declared = spec
            .get(name)
            .ok_or_else(|| ConfigError::MissingAttribute(name.to_string()))?;
        if declared.kind != kind {
            return Err(ConfigError::WrongAttributeKind {
                name: name.to_string(),
                expected: kind.name(),
            });
        }
    }
    Ok(())
}
