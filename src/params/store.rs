//! Host-side table of runtime-settable parameters.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use tracing::debug;

use crate::error::ParamError;
use crate::params::{ParamKind, ParamValue, ParameterDescriptor};
use crate::utils::lock;

#[derive(Debug, Clone)]
struct StoreEntry {
    kind: ParamKind,
    value: Option<ParamValue>,
}

/// Declared parameters and their current values.
///
/// `overrides` are initial values supplied at startup; a declaration picks
/// up the override for its name, if there is one.
#[derive(Debug, Default)]
pub struct ParameterStore {
    entries: Mutex<BTreeMap<String, StoreEntry>>,
    overrides: HashMap<String, ParamValue>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: HashMap<String, ParamValue>) -> Self {
        Self {
            entries: Mutex::default(),
            overrides,
        }
    }

    /// Declare `desc.name` with the descriptor's kind.
    ///
    /// Fails with [`ParamError::TypeMismatch`] when an earlier declaration
    /// has a different kind or the override does not fit the kind, unless
    /// `overwrite` is set, in which case the stale state is dropped.
    /// Returns the initial value to apply, if any.
    pub fn declare(
        &self,
        desc: &ParameterDescriptor,
        overwrite: bool,
    ) -> Result<Option<ParamValue>, ParamError> {
        let mut entries = lock(&self.entries);

        if let Some(existing) = entries.get(&desc.name) {
            if existing.kind != desc.kind && !overwrite {
                return Err(ParamError::TypeMismatch {
                    name: desc.name.clone(),
                    kind: desc.kind.as_str(),
                    value: format!("earlier {} declaration", existing.kind),
                });
            }
        }

        let initial = match self.overrides.get(&desc.name) {
            Some(v) if desc.kind.accepts(v) => Some(v.clone()),
            Some(v) if !overwrite => {
                return Err(ParamError::TypeMismatch {
                    name: desc.name.clone(),
                    kind: desc.kind.as_str(),
                    value: format!("{} {}", v.type_name(), v),
                })
            }
            _ => None,
        };

        entries.insert(
            desc.name.clone(),
            StoreEntry {
                kind: desc.kind,
                value: initial.clone(),
            },
        );
        Ok(initial)
    }

    /// Record new values and return the ones for declared names
    pub fn set(&self, updates: &[(String, ParamValue)]) -> Vec<(String, ParamValue)> {
        let mut entries = lock(&self.entries);
        let mut accepted = Vec::with_capacity(updates.len());
        for (name, value) in updates {
            match entries.get_mut(name) {
                Some(entry) => {
                    entry.value = Some(value.clone());
                    accepted.push((name.clone(), value.clone()));
                }
                None => debug!("ignoring undeclared parameter {}", name),
            }
        }
        accepted
    }

    pub fn get(&self, name: &str) -> Option<ParamValue> {
        lock(&self.entries).get(name).and_then(|e| e.value.clone())
    }

    pub fn kind(&self, name: &str) -> Option<ParamKind> {
        lock(&self.entries).get(name).map(|e| e.kind)
    }

    pub fn names(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(name: &str, kind: ParamKind) -> ParameterDescriptor {
        ParameterDescriptor {
            name: name.into(),
            kind,
            node: "Node".into(),
        }
    }

    #[test]
    fn declare_returns_matching_override() {
        let store = ParameterStore::with_overrides(HashMap::from([(
            "gain_auto".to_string(),
            ParamValue::Enum("Off".into()),
        )]));
        let initial = store.declare(&desc("gain_auto", ParamKind::Enum), false).unwrap();
        assert_eq!(initial, Some(ParamValue::Enum("Off".into())));
        assert_eq!(store.get("gain_auto"), Some(ParamValue::Enum("Off".into())));
    }

    #[test]
    fn mismatched_override_needs_overwrite() {
        let store = ParameterStore::with_overrides(HashMap::from([(
            "frame_rate".to_string(),
            ParamValue::Bool(true),
        )]));
        let d = desc("frame_rate", ParamKind::Float);
        assert!(matches!(
            store.declare(&d, false),
            Err(ParamError::TypeMismatch { .. })
        ));
        assert_eq!(store.declare(&d, true).unwrap(), None);
        assert_eq!(store.kind("frame_rate"), Some(ParamKind::Float));
        assert_eq!(store.get("frame_rate"), None);
    }

    #[test]
    fn redeclaring_with_other_kind_is_stale() {
        let store = ParameterStore::new();
        store.declare(&desc("x", ParamKind::Int), false).unwrap();
        assert!(store.declare(&desc("x", ParamKind::Int), false).is_ok());
        assert!(store.declare(&desc("x", ParamKind::Bool), false).is_err());
        assert!(store.declare(&desc("x", ParamKind::Bool), true).is_ok());
        assert_eq!(store.kind("x"), Some(ParamKind::Bool));
    }

    #[test]
    fn set_ignores_undeclared_names() {
        let store = ParameterStore::new();
        store.declare(&desc("gain", ParamKind::Float), false).unwrap();
        let accepted = store.set(&[
            ("gain".into(), ParamValue::Float(2.0)),
            ("bogus".into(), ParamValue::Int(1)),
        ]);
        assert_eq!(accepted, vec![("gain".to_string(), ParamValue::Float(2.0))]);
        assert_eq!(store.names(), vec!["gain".to_string()]);
    }
}
