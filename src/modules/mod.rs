//! Module registry: a passive directory of feature modules.
//!
//! Registering a module only makes its metadata discoverable (routes,
//! surfaces, hooks, service bindings, dependencies). Nothing is loaded or
//! started. Insertion order is preserved so listings are stable.

pub mod builtin;
pub mod descriptor;
pub mod loader;

use std::sync::RwLock;

use serde::Serialize;
use serde_json::Value;

pub use descriptor::{
    validate_module, validate_module_value, ModuleCategory, ModuleDescriptor, ModuleRoute,
    ServiceBinding, ValidationReport,
};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid module configuration: {}", .0.join(", "))]
    Invalid(Vec<String>),

    #[error("Failed to read module descriptor: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse module descriptor: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyReport {
    pub satisfied: bool,
    pub missing: Vec<String>,
}

/// A route together with the module that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteEntry {
    #[serde(flatten)]
    pub route: ModuleRoute,
    pub module_id: String,
}

#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: RwLock<Vec<ModuleDescriptor>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ModuleDescriptor>> {
        self.modules.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ModuleDescriptor>> {
        self.modules.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Inserts or overwrites by id. A descriptor without an id is logged and
    /// ignored; returns whether anything was stored.
    pub fn register_module(&self, module: ModuleDescriptor) -> bool {
        if module.id.trim().is_empty() {
            tracing::warn!(name = %module.name, "Refusing to register module without an id");
            return false;
        }

        let id = module.id.clone();
        let mut modules = self.write();
        match modules.iter_mut().find(|m| m.id == id) {
            Some(existing) => {
                *existing = module;
                tracing::info!(module = %id, "Module re-registered");
            }
            None => {
                modules.push(module);
                tracing::info!(module = %id, "Module registered");
            }
        }
        true
    }

    /// Factory path: validate first, register only when valid.
    pub fn create_module(&self, module: ModuleDescriptor) -> Result<ModuleDescriptor, RegistryError> {
        let report = validate_module(&module);
        if !report.valid {
            tracing::warn!(module = %module.id, errors = ?report.errors, "Module configuration rejected");
            return Err(RegistryError::Invalid(report.errors));
        }
        self.register_module(module.clone());
        Ok(module)
    }

    /// Same as [`create_module`](Self::create_module) for a descriptor that
    /// has not been typed yet.
    pub fn create_module_from_value(&self, value: Value) -> Result<ModuleDescriptor, RegistryError> {
        let report = validate_module_value(&value);
        if !report.valid {
            return Err(RegistryError::Invalid(report.errors));
        }
        let module: ModuleDescriptor = serde_json::from_value(value)?;
        self.create_module(module)
    }

    pub fn get_module(&self, id: &str) -> Option<ModuleDescriptor> {
        self.read().iter().find(|m| m.id == id).cloned()
    }

    pub fn all_modules(&self) -> Vec<ModuleDescriptor> {
        self.read().clone()
    }

    pub fn modules_by_category(&self, category: ModuleCategory) -> Vec<ModuleDescriptor> {
        self.read()
            .iter()
            .filter(|m| m.category == category)
            .cloned()
            .collect()
    }

    pub fn enabled_modules(&self) -> Vec<ModuleDescriptor> {
        self.read().iter().filter(|m| m.enabled).cloned().collect()
    }

    /// Flips the enabled flag in place. Unknown ids are a no-op (returns false).
    pub fn toggle_module(&self, id: &str, enabled: bool) -> bool {
        let mut modules = self.write();
        match modules.iter_mut().find(|m| m.id == id) {
            Some(module) => {
                module.enabled = enabled;
                tracing::info!(module = %id, enabled, "Module toggled");
                true
            }
            None => false,
        }
    }

    /// A dependency is missing when it is unregistered or registered but
    /// disabled. Unknown modules are trivially satisfied.
    pub fn check_dependencies(&self, id: &str) -> DependencyReport {
        let modules = self.read();
        let Some(module) = modules.iter().find(|m| m.id == id) else {
            return DependencyReport { satisfied: true, missing: Vec::new() };
        };

        let missing: Vec<String> = module
            .dependencies
            .iter()
            .filter(|dep| !modules.iter().any(|m| &m.id == *dep && m.enabled))
            .cloned()
            .collect();

        DependencyReport {
            satisfied: missing.is_empty(),
            missing,
        }
    }

    /// Every route of every enabled module, tagged with its owner.
    pub fn all_routes(&self) -> Vec<RouteEntry> {
        self.read()
            .iter()
            .filter(|m| m.enabled)
            .flat_map(|m| {
                m.routes.iter().map(|route| RouteEntry {
                    route: route.clone(),
                    module_id: m.id.clone(),
                })
            })
            .collect()
    }

    pub fn module_routes(&self, id: &str) -> Vec<ModuleRoute> {
        self.get_module(id).map(|m| m.routes).unwrap_or_default()
    }

    pub fn module_component(&self, id: &str, name: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.components.get(name).cloned())
    }

    pub fn module_hook(&self, id: &str, name: &str) -> Option<String> {
        self.read()
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.hooks.get(name).cloned())
    }

    pub fn module_service(&self, id: &str, name: &str) -> Option<ServiceBinding> {
        self.read()
            .iter()
            .find(|m| m.id == id)
            .and_then(|m| m.services.get(name).cloned())
    }

    pub fn unregister_module(&self, id: &str) -> bool {
        let mut modules = self.write();
        let before = modules.len();
        modules.retain(|m| m.id != id);
        let removed = modules.len() != before;
        if removed {
            tracing::info!(module = %id, "Module unregistered");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
