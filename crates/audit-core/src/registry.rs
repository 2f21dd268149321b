use crate::{Error, MemoryPublisherFactory, PublisherFactory, Result, StdoutPublisherFactory};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry for publisher factories
pub struct Registry {
    publisher_factories: HashMap<String, Arc<dyn PublisherFactory>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            publisher_factories: HashMap::new(),
        }
    }

    /// Registry preloaded with the `memory` and `stdout` publishers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_publisher(Arc::new(MemoryPublisherFactory));
        registry.register_publisher(Arc::new(StdoutPublisherFactory));
        registry
    }

    /// Register a publisher factory
    pub fn register_publisher(&mut self, factory: Arc<dyn PublisherFactory>) {
        let name = factory.name().to_string();
        self.publisher_factories.insert(name, factory);
    }

    /// Get a publisher factory by name
    pub fn get_publisher_factory(&self, name: &str) -> Result<Arc<dyn PublisherFactory>> {
        self.publisher_factories
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Configuration(format!("Publisher factory '{}' not found", name)))
    }

    /// List all registered publisher types
    pub fn list_publishers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.publisher_factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
