//! Batched state containers shared by the environment and the model.
//!
//! A [`States`] holds one [`Attribute`] per name, and every attribute stores
//! exactly one entry (or one row) per walker. The walkers only need three
//! things from these containers: merging partial updates, cloning entries by
//! index while skipping a set of excluded names, and hashing the content of a
//! walker's entry.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::Hasher;

use fnv::FnvHasher;
use serde::{Deserialize, Serialize};

use crate::schema::{AttributeKind, AttributeSpec, ConfigError, StateSpec};

/// Per-walker values of a single attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Scalars(Vec<f64>),
    Flags(Vec<bool>),
    Indices(Vec<usize>),
    /// Row-major storage, `width` values per walker.
    Rows { data: Vec<f64>, width: usize },
}

impl Attribute {
    /// Allocate a zeroed attribute for `batch_size` walkers.
    pub fn zeros(name: &str, spec: &AttributeSpec, batch_size: usize) -> Result<Self, ConfigError> {
        Ok(match spec.kind {
            AttributeKind::Scalars => Self::Scalars(vec![0.0; batch_size]),
            AttributeKind::Flags => Self::Flags(vec![false; batch_size]),
            AttributeKind::Indices => Self::Indices(vec![0; batch_size]),
            AttributeKind::Rows => {
                let width = spec
                    .size
                    .filter(|&w| w > 0)
                    .ok_or_else(|| ConfigError::MissingSize(name.to_string()))?;
                Self::Rows {
                    data: vec![0.0; width * batch_size],
                    width,
                }
            }
        })
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Scalars(_) => AttributeKind::Scalars,
            Self::Flags(_) => AttributeKind::Flags,
            Self::Indices(_) => AttributeKind::Indices,
            Self::Rows { .. } => AttributeKind::Rows,
        }
    }

    /// Number of walkers stored.
    pub fn len(&self) -> usize {
        match self {
            Self::Scalars(v) => v.len(),
            Self::Flags(v) => v.len(),
            Self::Indices(v) => v.len(),
            Self::Rows { data, width } => {
                if *width == 0 {
                    0
                } else {
                    data.len() / width
                }
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_well_formed(&self) -> bool {
        match self {
            Self::Rows { data, width } => *width > 0 && data.len() % width == 0,
            _ => true,
        }
    }

    /// Overwrite every entry flagged in `will_clone` with the entry of its companion.
    ///
    /// Companions are read from a snapshot taken before any write, so a walker
    /// that clones from a walker that is itself cloning receives the old value.
    fn clone_from_companions(&mut self, will_clone: &[bool], compas: &[usize]) {
        match self {
            Self::Scalars(v) => clone_items(v, will_clone, compas),
            Self::Flags(v) => clone_items(v, will_clone, compas),
            Self::Indices(v) => clone_items(v, will_clone, compas),
            Self::Rows { data, width } => {
                let w = *width;
                let source = data.clone();
                for (i, (&clone, &j)) in will_clone.iter().zip(compas).enumerate() {
                    if clone {
                        data[i * w..(i + 1) * w].copy_from_slice(&source[j * w..(j + 1) * w]);
                    }
                }
            }
        }
    }

    /// Content hash of the entry of walker `i`.
    fn entry_hash(&self, i: usize) -> u64 {
        let mut hasher = FnvHasher::default();
        match self {
            Self::Scalars(v) => hash_f64(&mut hasher, v[i]),
            Self::Flags(v) => hasher.write_u8(v[i] as u8),
            Self::Indices(v) => hasher.write_usize(v[i]),
            Self::Rows { data, width } => {
                for &x in &data[i * width..(i + 1) * width] {
                    hash_f64(&mut hasher, x);
                }
            }
        }
        hasher.finish()
    }
}

pub(crate) fn clone_items<T: Clone>(items: &mut [T], will_clone: &[bool], compas: &[usize]) {
    let source = items.to_vec();
    for (i, (&clone, &j)) in will_clone.iter().zip(compas).enumerate() {
        if clone {
            items[i] = source[j].clone();
        }
    }
}

#[inline]
fn hash_f64(hasher: &mut FnvHasher, x: f64) {
    // -0.0 and 0.0 describe the same state
    let x = if x == 0.0 { 0.0 } else { x };
    hasher.write_u64(x.to_bits());
}

/// Errors raised when reading or mutating a [`States`].
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("Attribute `{0}` not found")]
    Missing(String),
    #[error("Attribute `{name}` stores {found}, expected {expected}")]
    WrongKind {
        name: String,
        expected: &'static str,
        found: &'static str,
    },
    #[error("Attribute `{name}` holds {found} walkers, expected {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Attribute `{0}` has rows of inconsistent width")]
    MalformedRows(String),
    #[error("Batch of {found} walkers does not match container of {expected}")]
    BatchMismatch { expected: usize, found: usize },
    #[error("Companion index {index} out of range for {batch_size} walkers")]
    IndexOutOfRange { index: usize, batch_size: usize },
}

/// Keyed container of batched attributes.
///
/// Deserialized containers are checked attribute by attribute, like [`States::insert`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawStates")]
pub struct States {
    batch_size: usize,
    attributes: BTreeMap<String, Attribute>,
}

#[derive(Deserialize)]
struct RawStates {
    batch_size: usize,
    #[serde(default)]
    attributes: BTreeMap<String, Attribute>,
}

impl TryFrom<RawStates> for States {
    type Error = StateError;

    fn try_from(raw: RawStates) -> Result<Self, Self::Error> {
        let mut states = States::new(raw.batch_size);
        for (name, value) in raw.attributes {
            states.insert(name, value)?;
        }
        Ok(states)
    }
}

macro_rules! typed_access {
    ($get:ident, $get_mut:ident, $variant:ident, $ty:ty, $label:literal) => {
        pub fn $get(&self, name: &str) -> Result<&[$ty], StateError> {
            match self.attribute(name)? {
                Attribute::$variant(v) => Ok(v.as_slice()),
                other => Err(wrong_kind(name, $label, other)),
            }
        }

        pub fn $get_mut(&mut self, name: &str) -> Result<&mut [$ty], StateError> {
            match self.attribute_mut(name)? {
                Attribute::$variant(v) => Ok(v.as_mut_slice()),
                other => Err(wrong_kind(name, $label, other)),
            }
        }
    };
}

fn wrong_kind(name: &str, expected: &'static str, found: &Attribute) -> StateError {
    StateError::WrongKind {
        name: name.to_string(),
        expected,
        found: found.kind().name(),
    }
}

impl States {
    /// Create an empty container for `batch_size` walkers.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size,
            attributes: BTreeMap::new(),
        }
    }

    /// Allocate zeroed attributes for every declaration in `spec`.
    pub fn from_spec(spec: &StateSpec, batch_size: usize) -> Result<Self, ConfigError> {
        let attributes = spec
            .iter()
            .map(|(name, attr)| Ok((name.clone(), Attribute::zeros(name, attr, batch_size)?)))
            .collect::<Result<_, ConfigError>>()?;
        Ok(Self {
            batch_size,
            attributes,
        })
    }

    /// Number of walkers.
    #[inline]
    pub fn len(&self) -> usize {
        self.batch_size
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.batch_size == 0
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    fn attribute(&self, name: &str) -> Result<&Attribute, StateError> {
        self.attributes
            .get(name)
            .ok_or_else(|| StateError::Missing(name.to_string()))
    }

    fn attribute_mut(&mut self, name: &str) -> Result<&mut Attribute, StateError> {
        self.attributes
            .get_mut(name)
            .ok_or_else(|| StateError::Missing(name.to_string()))
    }

    /// Insert or replace an attribute, checking it covers the whole batch.
    pub fn insert(&mut self, name: impl Into<String>, value: Attribute) -> Result<(), StateError> {
        let name = name.into();
        if !value.is_well_formed() {
            return Err(StateError::MalformedRows(name));
        }
        if value.len() != self.batch_size {
            return Err(StateError::LengthMismatch {
                name,
                expected: self.batch_size,
                found: value.len(),
            });
        }
        self.attributes.insert(name, value);
        Ok(())
    }

    /// Builder form of [`States::insert`].
    pub fn with(mut self, name: impl Into<String>, value: Attribute) -> Result<Self, StateError> {
        self.insert(name, value)?;
        Ok(self)
    }

    typed_access!(scalars, scalars_mut, Scalars, f64, "scalars");
    typed_access!(flags, flags_mut, Flags, bool, "flags");
    typed_access!(indices, indices_mut, Indices, usize, "indices");

    /// Row-major data and row width of a row attribute.
    pub fn rows(&self, name: &str) -> Result<(&[f64], usize), StateError> {
        match self.attribute(name)? {
            Attribute::Rows { data, width } => Ok((data.as_slice(), *width)),
            other => Err(wrong_kind(name, "rows", other)),
        }
    }

    /// Row of walker `i`.
    pub fn row(&self, name: &str, i: usize) -> Result<&[f64], StateError> {
        let (data, width) = self.rows(name)?;
        self.check_index(i)?;
        Ok(&data[i * width..(i + 1) * width])
    }

    /// Overwrite the row of walker `i`.
    pub fn set_row(&mut self, name: &str, i: usize, values: &[f64]) -> Result<(), StateError> {
        self.check_index(i)?;
        match self.attribute_mut(name)? {
            Attribute::Rows { data, width } => {
                if values.len() != *width {
                    return Err(StateError::LengthMismatch {
                        name: name.to_string(),
                        expected: *width,
                        found: values.len(),
                    });
                }
                data[i * *width..(i + 1) * *width].copy_from_slice(values);
                Ok(())
            }
            other => Err(wrong_kind(name, "rows", other)),
        }
    }

    fn check_index(&self, index: usize) -> Result<(), StateError> {
        if index >= self.batch_size {
            return Err(StateError::IndexOutOfRange {
                index,
                batch_size: self.batch_size,
            });
        }
        Ok(())
    }

    /// Merge every attribute of `other` into this container.
    pub fn update(&mut self, other: &States) -> Result<(), StateError> {
        if other.batch_size != self.batch_size {
            return Err(StateError::BatchMismatch {
                expected: self.batch_size,
                found: other.batch_size,
            });
        }
        for (name, value) in &other.attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    /// Clone the entries of the walkers flagged in `will_clone` from `compas`.
    ///
    /// Attributes named in `ignore` keep their current values.
    pub fn clone_walkers(
        &mut self,
        will_clone: &[bool],
        compas: &[usize],
        ignore: &BTreeSet<String>,
    ) -> Result<(), StateError> {
        check_clone_mapping(self.batch_size, will_clone, compas)?;
        for (name, value) in self.attributes.iter_mut() {
            if !ignore.contains(name) {
                value.clone_from_companions(will_clone, compas);
            }
        }
        Ok(())
    }

    /// Content hash of every walker's entry of `name`.
    pub fn hash_values(&self, name: &str) -> Result<Vec<u64>, StateError> {
        let attribute = self.attribute(name)?;
        Ok((0..self.batch_size)
            .map(|i| attribute.entry_hash(i))
            .collect())
    }
}

/// Validate a clone mapping against a batch size.
pub(crate) fn check_clone_mapping(
    batch_size: usize,
    will_clone: &[bool],
    compas: &[usize],
) -> Result<(), StateError> {
    for (name, len) in [("will_clone", will_clone.len()), ("compas", compas.len())] {
        if len != batch_size {
            return Err(StateError::LengthMismatch {
                name: name.to_string(),
                expected: batch_size,
                found: len,
            });
        }
    }
    if let Some(&index) = compas.iter().find(|&&j| j >= batch_size) {
        return Err(StateError::IndexOutOfRange { index, batch_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::env_state_spec;

    fn sample_states() -> States {
        States::new(3)
            .with("x", Attribute::Scalars(vec![1.0, 2.0, 3.0]))
            .unwrap()
            .with(
                "obs",
                Attribute::Rows {
                    data: vec![0.0, 0.0, 1.0, 1.0, 2.0, 2.0],
                    width: 2,
                },
            )
            .unwrap()
    }

    #[test]
    fn test_from_spec_allocates() {
        let states = States::from_spec(&env_state_spec(4, 2), 5).unwrap();
        assert_eq!(states.len(), 5);
        assert_eq!(states.rows("observs").unwrap().1, 4);
        assert_eq!(states.scalars("rewards").unwrap().len(), 5);
        assert!(states.flags("ends").unwrap().iter().all(|&e| !e));
    }

    #[test]
    fn test_from_spec_requires_row_size() {
        let mut spec = StateSpec::new();
        spec.insert(
            "actions".into(),
            AttributeSpec {
                kind: AttributeKind::Rows,
                size: None,
            },
        );
        assert!(matches!(
            States::from_spec(&spec, 3),
            Err(ConfigError::MissingSize(name)) if name == "actions"
        ));
    }

    #[test]
    fn test_insert_checks_length() {
        let mut states = States::new(3);
        let err = states
            .insert("x", Attribute::Scalars(vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, StateError::LengthMismatch { expected: 3, found: 1, .. }));
    }

    #[test]
    fn test_wrong_kind() {
        let states = sample_states();
        assert!(matches!(
            states.flags("x"),
            Err(StateError::WrongKind { expected: "flags", found: "scalars", .. })
        ));
        assert!(matches!(states.scalars("nope"), Err(StateError::Missing(_))));
    }

    #[test]
    fn test_clone_reads_pre_clone_values() {
        let mut states = sample_states();
        // 0 <- 1 and 1 <- 2 at the same time: walker 0 must get the old value of 1
        states
            .clone_walkers(&[true, true, false], &[1, 2, 2], &BTreeSet::new())
            .unwrap();
        assert_eq!(states.scalars("x").unwrap(), &[2.0, 3.0, 3.0]);
        assert_eq!(states.row("obs", 0).unwrap(), &[1.0, 1.0]);
        assert_eq!(states.row("obs", 1).unwrap(), &[2.0, 2.0]);
    }

    #[test]
    fn test_clone_respects_ignore() {
        let mut states = sample_states();
        let ignore: BTreeSet<String> = ["obs".to_string()].into();
        states
            .clone_walkers(&[true, false, false], &[2, 1, 2], &ignore)
            .unwrap();
        assert_eq!(states.scalars("x").unwrap()[0], 3.0);
        assert_eq!(states.row("obs", 0).unwrap(), &[0.0, 0.0]);
    }

    #[test]
    fn test_clone_rejects_bad_index() {
        let mut states = sample_states();
        assert!(matches!(
            states.clone_walkers(&[true, false, false], &[7, 1, 2], &BTreeSet::new()),
            Err(StateError::IndexOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn test_hash_values_follow_content() {
        let mut states = sample_states();
        let before = states.hash_values("obs").unwrap();
        assert_ne!(before[0], before[1]);

        states.set_row("obs", 0, &[1.0, 1.0]).unwrap();
        let after = states.hash_values("obs").unwrap();
        assert_eq!(after[0], after[1]);
        assert_eq!(after[2], before[2]);
    }

    #[test]
    fn test_update_merges_and_checks_batch() {
        let mut states = sample_states();
        let partial = States::new(3)
            .with("x", Attribute::Scalars(vec![9.0, 9.0, 9.0]))
            .unwrap();
        states.update(&partial).unwrap();
        assert_eq!(states.scalars("x").unwrap(), &[9.0, 9.0, 9.0]);
        assert!(states.contains("obs"));

        assert!(matches!(
            states.update(&States::new(2)),
            Err(StateError::BatchMismatch { expected: 3, found: 2 })
        ));
    }

    #[test]
    fn test_deserialize_checks_attributes() {
        let short = r#"{"batch_size":3,"attributes":{"states":{"Scalars":[1.0]}}}"#;
        let err = serde_json::from_str::<States>(short).unwrap_err();
        assert!(err.to_string().contains("expected 3"));

        let ragged = r#"{"batch_size":2,"attributes":{"o":{"Rows":{"data":[1,2,3],"width":2}}}}"#;
        assert!(serde_json::from_str::<States>(ragged).is_err());

        let zero_width = r#"{"batch_size":0,"attributes":{"obs":{"Rows":{"data":[],"width":0}}}}"#;
        assert!(serde_json::from_str::<States>(zero_width).is_err());
    }

    #[test]
    fn test_deserialize_accepts_serialized_container() {
        let states = sample_states();
        let json = serde_json::to_string(&states).unwrap();
        let back: States = serde_json::from_str(&json).unwrap();
        assert_eq!(back, states);
        assert_eq!(back.hash_values("obs").unwrap(), states.hash_values("obs").unwrap());
    }
}
