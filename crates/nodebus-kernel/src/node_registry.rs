//! [`NodeRegistry`] – unique names for hosted nodes.
//!
//! Two nodes may never share a name.  A node that expects to be instantiated
//! many times (e.g. one laser scanner per robot) registers *anonymously* and
//! receives its base name with a random `-<uuid>` suffix.

use std::collections::BTreeSet;

use nodebus_types::BusError;
use tracing::debug;
use uuid::Uuid;

/// Registry of node names currently in use.
///
/// # Example
///
/// ```
/// use nodebus_kernel::node_registry::NodeRegistry;
///
/// let mut registry = NodeRegistry::new();
/// let name = registry.register("pathfinder", false).unwrap();
/// assert_eq!(name, "pathfinder");
/// assert!(registry.register("pathfinder", false).is_err());
///
/// let scanner = registry.register("laser_scanner", true).unwrap();
/// assert!(scanner.starts_with("laser_scanner-"));
/// ```
#[derive(Debug, Default)]
pub struct NodeRegistry {
    names: BTreeSet<String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `name`, or `name-<uuid>` when `anonymous` is set, and return the
    /// name actually registered.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::DuplicateNode`] when the name is already taken.
    pub fn register(&mut self, name: &str, anonymous: bool) -> Result<String, BusError> {
        let name = if anonymous {
            format!("{name}-{}", Uuid::new_v4())
        } else {
            name.to_string()
        };
        if self.names.contains(&name) {
            return Err(BusError::DuplicateNode(name));
        }
        debug!(node = %name, "node registered");
        self.names.insert(name.clone());
        Ok(name)
    }

    /// Release `name`.  Returns whether it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let removed = self.names.remove(name);
        if removed {
            debug!(node = %name, "node unregistered");
        }
        removed
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Registered names in lexical order.
    pub fn names(&self) -> Vec<String> {
        self.names.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
