use crate::collective::server::CommunicatorFactory;
use crate::config::{COMMUNICATOR_COMPONENT, RallyConfig};
use crate::error::{RallyError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// A server-side object that can be registered in a `SymbolTable`.
pub trait Component: Any + Send + Sync {
    fn type_name(&self) -> &'static str;

    /// Number of participants the component coordinates.
    fn num_sites(&self) -> u32;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Construction arguments handed to a factory.
#[derive(Debug, Clone)]
pub struct ComponentArgs {
    pub name: String,
    pub num_sites: u32,
}

/// Capability to construct one type of component.
pub trait ComponentFactory: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn create(&self, args: &ComponentArgs) -> Result<Arc<dyn Component>>;
}

/// Installed component factories of a locality, keyed by type name.
pub struct ComponentRegistry {
    factories: HashMap<&'static str, Arc<dyn ComponentFactory>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Install the built-in factories named in `config.components`.
    pub fn from_config(config: &RallyConfig) -> Result<Self> {
        let mut registry = Self::new();
        for type_name in &config.components {
            let factory = builtin_factory(type_name, config).ok_or_else(|| {
                RallyError::UnknownComponent {
                    type_name: type_name.clone(),
                }
            })?;
            registry.install(factory);
        }
        Ok(registry)
    }

    /// Install a factory, replacing any previous one for the same type.
    pub fn install(&mut self, factory: Arc<dyn ComponentFactory>) {
        self.factories.insert(factory.type_name(), factory);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    pub fn create(&self, type_name: &str, args: &ComponentArgs) -> Result<Arc<dyn Component>> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| RallyError::UnknownComponent {
                type_name: type_name.to_owned(),
            })?;
        factory.create(args)
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn builtin_factory(type_name: &str, config: &RallyConfig) -> Option<Arc<dyn ComponentFactory>> {
    match type_name {
        COMMUNICATOR_COMPONENT => Some(Arc::new(CommunicatorFactory::new(
            config.retired_generations,
        ))),
        _ => None,
    }
}
