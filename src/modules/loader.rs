// Loads module descriptors from `*.json` files in a directory.

use std::path::Path;

use super::{ModuleRegistry, RegistryError};

fn load_file(registry: &ModuleRegistry, path: &Path) -> Result<String, RegistryError> {
    let raw = std::fs::read_to_string(path)?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let module = registry.create_module_from_value(value)?;
    Ok(module.id)
}

/// Registers every valid descriptor under `dir`. Bad files are logged and
/// skipped. Returns how many modules were registered.
pub fn load_modules(registry: &ModuleRegistry, dir: &Path) -> usize {
    let pattern = dir.join("*.json");
    let pattern = pattern.to_string_lossy();

    let paths = match glob::glob(&pattern) {
        Ok(paths) => paths,
        Err(e) => {
            tracing::warn!("Invalid module descriptor pattern {}: {}", pattern, e);
            return 0;
        }
    };

    let mut loaded = 0;
    for entry in paths {
        let path = match entry {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("Unreadable module descriptor entry: {}", e);
                continue;
            }
        };
        match load_file(registry, &path) {
            Ok(id) => {
                tracing::debug!(module = %id, path = %path.display(), "Loaded module descriptor");
                loaded += 1;
            }
            Err(e) => tracing::warn!(path = %path.display(), "Skipping module descriptor: {}", e),
        }
    }
    loaded
}
