//! Module descriptor types and their runtime validation.
//!
//! Required fields are enforced by the types; `validate_module` only checks
//! what serde cannot (non-empty strings, self-dependency). Descriptors that
//! arrive as raw JSON go through `validate_module_value` first so every
//! problem is reported at once instead of serde's first-error-wins.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleCategory {
    Swap,
    Defi,
    Nft,
    Wallet,
    Other,
}

impl ModuleCategory {
    pub const ALL: [ModuleCategory; 5] = [
        ModuleCategory::Swap,
        ModuleCategory::Defi,
        ModuleCategory::Nft,
        ModuleCategory::Wallet,
        ModuleCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleCategory::Swap => "swap",
            ModuleCategory::Defi => "defi",
            ModuleCategory::Nft => "nft",
            ModuleCategory::Wallet => "wallet",
            ModuleCategory::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.as_str() == s)
    }
}

impl fmt::Display for ModuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRoute {
    pub path: String,
    /// Name of the UI surface rendered at this path.
    pub surface: String,
    #[serde(default)]
    pub exact: bool,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub permissions: Vec<String>,
}

/// A module's reference to a gateway service. Not cross-checked against the
/// gateway's own registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceBinding {
    pub name: String,
    pub methods: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    pub id: String,
    pub name: String,
    pub description: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    pub category: ModuleCategory,
    pub permissions: Vec<String>,
    #[serde(default)]
    pub oauth_providers: Vec<String>,
    pub routes: Vec<ModuleRoute>,
    /// Exposed UI surfaces, name → surface identifier.
    pub components: BTreeMap<String, String>,
    /// Exposed behavior hooks, name → hook identifier.
    pub hooks: BTreeMap<String, String>,
    pub services: BTreeMap<String, ServiceBinding>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

pub fn validate_module(module: &ModuleDescriptor) -> ValidationReport {
    let mut errors = Vec::new();

    let required = [
        ("id", &module.id),
        ("name", &module.name),
        ("description", &module.description),
        ("version", &module.version),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.push(format!("Module {} is required", field));
        }
    }

    if !module.id.is_empty() && module.dependencies.iter().any(|d| d == &module.id) {
        errors.push(format!("Module '{}' cannot depend on itself", module.id));
    }

    ValidationReport::from_errors(errors)
}

/// Shape check for an untyped descriptor.
pub fn validate_module_value(value: &Value) -> ValidationReport {
    let Some(obj) = value.as_object() else {
        return ValidationReport::from_errors(vec!["Module configuration must be an object".to_string()]);
    };

    let mut errors = Vec::new();

    for field in ["id", "name", "description", "version", "category"] {
        let present = obj
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            errors.push(format!("Module {} is required", field));
        }
    }

    if let Some(category) = obj.get("category").and_then(Value::as_str)
        && !category.is_empty()
        && ModuleCategory::parse(category).is_none()
    {
        errors.push(format!("Unknown module category '{}'", category));
    }

    for field in ["permissions", "routes"] {
        if !obj.get(field).is_some_and(Value::is_array) {
            errors.push(format!("Module {} must be an array", field));
        }
    }

    for field in ["components", "hooks", "services"] {
        if !obj.get(field).is_some_and(Value::is_object) {
            errors.push(format!("Module {} map is required", field));
        }
    }

    ValidationReport::from_errors(errors)
}
