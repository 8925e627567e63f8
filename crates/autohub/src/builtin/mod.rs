//! Built-in objects
//!
//! Metadata and plugins compiled into the server binary.

mod notifications;

use std::sync::Arc;

use crate::metadata::{self, MetadataResult};
use crate::plugin::Plugin;
use crate::registry::ObjectTable;

pub use notifications::{NOTIFICATION_LOGGER_UUID, NotificationLogger};

const CLASSES: &str = include_str!("classes.toml");

/// Register descriptions for the server and the built-in plugins
pub fn register_metadata(registry: &ObjectTable) -> MetadataResult<usize> {
    metadata::load_str(registry, CLASSES, "builtin/classes.toml")
}

/// Plugins that ship with the server
pub fn plugins() -> Vec<Arc<dyn Plugin>> {
    vec![Arc::new(NotificationLogger::new())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Folder, JsonConfigStore};
    use tempfile::TempDir;

    #[test]
    fn test_builtin_metadata_loads() {
        let dir = TempDir::new().unwrap();
        let root = Folder::open_root(dir.path()).unwrap();
        let registry = ObjectTable::new(Arc::new(JsonConfigStore::new(&root).unwrap()));
        assert_eq!(register_metadata(&registry).unwrap(), 2);
    }
}
