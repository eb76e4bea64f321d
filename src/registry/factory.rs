//! Explicit symbol → factory mapping.
//!
//! The embedding application registers one factory per exported symbol;
//! resolution is a plain map lookup. The capability contract is the
//! [`Module`](crate::Module) trait itself, enforced by construction, so
//! this is the single place anything resembling dynamic loading occurs.

use std::collections::HashMap;
use std::sync::Arc;

use crate::modules::ModuleRef;
use crate::registry::descriptor::ModuleDescriptor;

/// Builds a module instance for a descriptor. Returns a failure reason
/// when construction is impossible (bad descriptor data, missing model
/// weights, ...).
pub type ModuleFactory = Arc<dyn Fn(&ModuleDescriptor) -> Result<ModuleRef, String> + Send + Sync>;

/// The set of factories the registry resolves symbols against.
#[derive(Clone, Default)]
pub struct FactorySet {
    factories: HashMap<String, ModuleFactory>,
}

impl FactorySet {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `symbol`, replacing any previous one.
    pub fn insert<F>(&mut self, symbol: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleDescriptor) -> Result<ModuleRef, String> + Send + Sync + 'static,
    {
        self.factories.insert(symbol.into(), Arc::new(factory));
    }

    /// Builder-style [`FactorySet::insert`].
    pub fn with<F>(mut self, symbol: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModuleDescriptor) -> Result<ModuleRef, String> + Send + Sync + 'static,
    {
        self.insert(symbol, factory);
        self
    }

    /// Looks up the factory for `symbol`.
    pub fn get(&self, symbol: &str) -> Option<&ModuleFactory> {
        self.factories.get(symbol)
    }

    /// Number of registered symbols.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// True if no factory has been registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}
