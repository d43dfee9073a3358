//! Built-in scheduling plugins and their registry.

pub mod proportion;
pub mod resourcequota;
pub mod tdm;

pub use proportion::ProportionPlugin;
pub use resourcequota::ResourceQuotaPlugin;
pub use tdm::TdmPlugin;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::Local;
use scheduler_framework::{Arguments, Plugin};
use scheduler_shared_types::{Result, SchedulerError};

pub type PluginBuilder = Box<dyn Fn(Arguments) -> Box<dyn Plugin> + Send + Sync>;

/// Name-to-factory registry. Plugin instances are built fresh for every
/// session; builders own whatever state must outlive a cycle (the tdm
/// victim-scan timestamp, for one).
pub struct PluginRegistry {
    builders: BTreeMap<String, PluginBuilder>,
}

impl PluginRegistry {
    pub fn empty() -> Self {
        Self {
            builders: BTreeMap::new(),
        }
    }

    /// Registry with every built-in plugin, wired to the system clock.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(
            proportion::PLUGIN_NAME,
            Box::new(|args| Box::new(ProportionPlugin::new(args))),
        );
        registry.register(
            resourcequota::PLUGIN_NAME,
            Box::new(|args| Box::new(ResourceQuotaPlugin::new(args))),
        );

        let last_evict_at: tdm::LastEvictAt = Arc::new(Mutex::new(None));
        let clock: tdm::Clock = Arc::new(|| Local::now().naive_local());
        registry.register(
            tdm::PLUGIN_NAME,
            Box::new(move |args| {
                Box::new(TdmPlugin::new(args, last_evict_at.clone(), clock.clone()))
            }),
        );
        registry
    }

    pub fn register(&mut self, name: &str, builder: PluginBuilder) {
        self.builders.insert(name.to_string(), builder);
    }

    pub fn build(&self, name: &str, arguments: Arguments) -> Result<Box<dyn Plugin>> {
        let builder = self
            .builders
            .get(name)
            .ok_or_else(|| SchedulerError::Config(format!("unknown plugin {name}")))?;
        Ok(builder(arguments))
    }

    pub fn known(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_builds_all_plugins() {
        let registry = PluginRegistry::with_builtins();
        for name in ["proportion", "tdm", "resourcequota"] {
            assert!(registry.known(name));
            assert!(registry.build(name, Arguments::default()).is_ok());
        }
        assert!(registry.build("nope", Arguments::default()).is_err());
    }
}
