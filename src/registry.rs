use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{OpFinderError, Result};

/// One typed input of a registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputSpec {
    pub type_name: String,
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl InputSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            required: true,
        }
    }

    pub fn optional(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            required: false,
        }
    }
}

/// Raw entry as enumerated from a registry source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpRecord {
    pub name: Option<String>,
    pub fallback_name: String,
    pub namespace: Option<String>,
    pub signature: String,
    pub owner_type: String,
    pub invocation: String,
    pub inputs: Vec<InputSpec>,
}

impl OpRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn with_fallback_name(mut self, fallback_name: impl Into<String>) -> Self {
        self.fallback_name = fallback_name.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = signature.into();
        self
    }

    pub fn with_owner_type(mut self, owner_type: impl Into<String>) -> Self {
        self.owner_type = owner_type.into();
        self
    }

    pub fn with_invocation(mut self, invocation: impl Into<String>) -> Self {
        self.invocation = invocation.into();
        self
    }

    pub fn with_input(mut self, input: InputSpec) -> Self {
        self.inputs.push(input);
        self
    }

    /// Trimmed name, falling back to `fallback_name`. `None` means the record
    /// must be skipped entirely.
    pub fn resolved_name(&self) -> Option<String> {
        let name = resolve(self.name.as_deref(), &self.fallback_name);
        (!name.is_empty()).then_some(name)
    }

    pub fn resolved_namespace(&self, global: &str) -> String {
        resolve(self.namespace.as_deref(), global)
    }
}

fn resolve(value: Option<&str>, fallback: &str) -> String {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => fallback.trim().to_string(),
    }
}

/// Supplier of registry entries and type relationships.
///
/// Enumerated once per session; the finder never re-reads it.
#[cfg_attr(test, mockall::automock)]
pub trait RegistrySource: Send + Sync {
    fn records(&self) -> Vec<OpRecord>;

    /// True when a value of type `candidate` can be used where `target` is
    /// expected.
    fn is_assignable(&self, target: &str, candidate: &str) -> bool {
        target == candidate
    }
}

/// In-memory registry with an explicit supertype graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticRegistry {
    pub records: Vec<OpRecord>,
    /// Type identifier to its direct supertypes.
    pub supertypes: HashMap<String, Vec<String>>,
}

impl StaticRegistry {
    pub fn new(records: Vec<OpRecord>) -> Self {
        Self {
            records,
            supertypes: HashMap::new(),
        }
    }

    pub fn with_supertype(mut self, type_name: impl Into<String>, supertype: impl Into<String>) -> Self {
        self.supertypes
            .entry(type_name.into())
            .or_default()
            .push(supertype.into());
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            OpFinderError::Registry(format!("Failed to read registry file {}: {}", path.display(), e))
        })?;
        let registry = Self::from_json_str(&text)?;
        debug!(path = %path.display(), records = registry.records.len(), "loaded registry file");
        Ok(registry)
    }
}

impl RegistrySource for StaticRegistry {
    fn records(&self) -> Vec<OpRecord> {
        self.records.clone()
    }

    fn is_assignable(&self, target: &str, candidate: &str) -> bool {
        let mut queue = VecDeque::from([candidate]);
        let mut seen = HashSet::new();

        while let Some(current) = queue.pop_front() {
            if current == target {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(parents) = self.supertypes.get(current) {
                queue.extend(parents.iter().map(String::as_str));
            }
        }

        false
    }
}
