//! Scheduler configuration, loaded from a TOML file.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use scheduler_framework::arguments::parse_duration;
use scheduler_framework::Arguments;
use scheduler_plugins::PluginRegistry;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("invalid duration {field}: {value}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("unknown action {0}")]
    UnknownAction(String),

    #[error("unknown plugin {0}")]
    UnknownPlugin(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PluginConfig {
    pub name: String,
    #[serde(default)]
    pub arguments: BTreeMap<String, String>,
}

impl PluginConfig {
    pub fn arguments(&self) -> Arguments {
        Arguments::new(self.arguments.clone())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Phases executed per cycle, in order.
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,

    /// Plugins opened into every session, in registration order.
    #[serde(default = "default_plugins")]
    pub plugins: Vec<PluginConfig>,

    /// Interval between scheduling cycles.
    #[serde(default = "default_period")]
    schedule_period: String,

    /// Soft deadline for one cycle; remaining phases are dropped past it.
    #[serde(default)]
    cycle_deadline: Option<String>,
}

fn default_actions() -> Vec<String> {
    ["enqueue", "allocate", "preempt", "reclaim", "evict"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_plugins() -> Vec<PluginConfig> {
    ["proportion", "tdm", "resourcequota"]
        .into_iter()
        .map(|name| PluginConfig {
            name: name.to_string(),
            arguments: BTreeMap::new(),
        })
        .collect()
}

fn default_period() -> String {
    "1s".to_string()
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            actions: default_actions(),
            plugins: default_plugins(),
            schedule_period: default_period(),
            cycle_deadline: None,
        }
    }
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: SchedulerConfig = toml::from_str(&raw)?;
        Ok(config)
    }

    pub fn schedule_period(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.schedule_period).ok_or_else(|| ConfigError::InvalidDuration {
            field: "schedule_period",
            value: self.schedule_period.clone(),
        })
    }

    pub fn cycle_deadline(&self) -> Result<Option<Duration>, ConfigError> {
        match &self.cycle_deadline {
            None => Ok(None),
            Some(raw) => parse_duration(raw)
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidDuration {
                    field: "cycle_deadline",
                    value: raw.clone(),
                }),
        }
    }

    /// Check every configured action and plugin resolves.
    pub fn validate(&self, registry: &PluginRegistry) -> Result<(), ConfigError> {
        self.schedule_period()?;
        self.cycle_deadline()?;
        for action in &self.actions {
            if scheduler_framework::actions::action_by_name(action).is_none() {
                return Err(ConfigError::UnknownAction(action.clone()));
            }
        }
        for plugin in &self.plugins {
            if !registry.known(&plugin.name) {
                return Err(ConfigError::UnknownPlugin(plugin.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_against_builtins() {
        let config = SchedulerConfig::default();
        config.validate(&PluginRegistry::with_builtins()).unwrap();
        assert_eq!(config.schedule_period().unwrap(), Duration::from_secs(1));
        assert_eq!(config.cycle_deadline().unwrap(), None);
    }

    #[test]
    fn parses_full_toml() {
        let raw = r#"
            actions = ["enqueue", "allocate"]
            schedule_period = "500ms"
            cycle_deadline = "2s"

            [[plugins]]
            name = "proportion"

            [[plugins]]
            name = "tdm"
            [plugins.arguments]
            "tdm.revocable-zone.rz1" = "10:00-12:00"
            "tdm.evict.period" = "1m"
        "#;
        let config: SchedulerConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.actions, vec!["enqueue", "allocate"]);
        assert_eq!(config.plugins.len(), 2);
        assert_eq!(
            config.plugins[1].arguments["tdm.revocable-zone.rz1"],
            "10:00-12:00"
        );
        config.validate(&PluginRegistry::with_builtins()).unwrap();
    }

    #[test]
    fn unknown_action_is_rejected() {
        let mut config = SchedulerConfig::default();
        config.actions.push("defragment".to_string());
        assert!(matches!(
            config.validate(&PluginRegistry::with_builtins()),
            Err(ConfigError::UnknownAction(_))
        ));
    }
}
