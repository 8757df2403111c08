use crate::builtins::is_builtin_module;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A module identifier the bundler left external, plus the package that
/// required it when the bundler could tell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalModuleRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl ExternalModuleRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: None,
        }
    }

    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// The package this reference points into, if it names one at all.
    pub fn package_name(&self) -> Option<String> {
        package_name(&self.name)
    }
}

/// Reduce a module identifier to its package name.
///
/// `@scope/pkg/sub/path` becomes `@scope/pkg`, `pkg/sub` becomes `pkg`.
/// Relative or absolute paths, protocol-qualified identifiers and Node.js core
/// modules are not packages and yield `None`.
pub fn package_name(identifier: &str) -> Option<String> {
    let identifier = identifier.trim();
    if identifier.is_empty()
        || identifier.starts_with('.')
        || identifier.starts_with('/')
        || identifier.starts_with('\\')
    {
        return None;
    }

    let mut segments = identifier.split('/');
    let first = segments.next()?;
    if first.contains(':') {
        return None;
    }

    let name = if first.starts_with('@') {
        let second = segments.next().filter(|s| !s.is_empty())?;
        if first.len() < 2 {
            return None;
        }
        format!("{first}/{second}")
    } else {
        if is_builtin_module(first) {
            return None;
        }
        first.to_owned()
    };
    Some(name)
}

/// Mapping from package name to version spec. Keys are unique and ordered,
/// so serialization is deterministic. Built once per artifact and read-only
/// afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResolvedDependencySet(BTreeMap<String, String>);

impl ResolvedDependencySet {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn as_map(&self) -> &BTreeMap<String, String> {
        &self.0
    }
}

impl FromIterator<(String, String)> for ResolvedDependencySet {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for ResolvedDependencySet {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
