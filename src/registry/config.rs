//! Configuration Files
//!
//! Two formats feed the plugin manager:
//!
//! ```yaml
//! plugins:
//!   - id: memory
//!     options:
//!       MemoryUser: "alice:1001:atlas"
//!   - id: librarian
//! options:
//!   TokenLife: 600
//! ```
//!
//! and the line format, where `LoadPlugin <id>` loads a plugin and any
//! other `<Key> <value>` line is broadcast. Per-plugin options must be
//! claimed by that plugin; broadcast options nobody claims are skipped with
//! a warning.

use super::PluginManager;
use crate::error::{Error, ErrorKind, Result};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StackConfig {
    #[serde(default)]
    pub plugins: Vec<PluginConfig>,
    /// Broadcast options, applied after every plugin is loaded
    #[serde(default)]
    pub options: Mapping,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PluginConfig {
    pub id: String,
    #[serde(default)]
    pub options: Mapping,
}

impl StackConfig {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Render a scalar option value as the string factories receive
fn scalar(key: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        _ => Err(Error::malformed(format!(
            "option {} must be a string, number or boolean",
            key
        ))),
    }
}

fn entries(options: &Mapping) -> Result<Vec<(String, String)>> {
    options
        .iter()
        .map(|(key, value)| {
            let key = key
                .as_str()
                .ok_or_else(|| Error::malformed("option keys must be strings"))?;
            Ok((key.to_string(), scalar(key, value)?))
        })
        .collect()
}

impl PluginManager {
    /// Load a configuration file. `.yaml`/`.yml` files use the YAML form,
    /// anything else the line form.
    pub fn load_configuration(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::from(e).with_context(path.display()))?;
        info!(path = %path.display(), "loading configuration");

        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => self.apply_config(&StackConfig::from_yaml(&text)?),
            _ => self.load_lines(&text),
        }
    }

    pub fn apply_config(&mut self, config: &StackConfig) -> Result<()> {
        for plugin in &config.plugins {
            self.load_plugin(&plugin.id)?;
            for (key, value) in entries(&plugin.options)? {
                self.configure_plugin(&plugin.id, &key, &value)?;
            }
        }
        for (key, value) in entries(&config.options)? {
            self.configure_lenient(&key, &value)?;
        }
        Ok(())
    }

    /// Parse the line format
    pub fn load_lines(&mut self, text: &str) -> Result<()> {
        for (number, raw) in text.lines().enumerate() {
            let line = match raw.split_once('#') {
                Some((before, _)) => before.trim(),
                None => raw.trim(),
            };
            if line.is_empty() {
                continue;
            }

            let (key, value) = match line.split_once(char::is_whitespace) {
                Some((key, value)) => (key, value.trim()),
                None => (line, ""),
            };

            if key == "LoadPlugin" {
                let mut words = value.split_whitespace();
                let (Some(plugin_id), None) = (words.next(), words.next()) else {
                    return Err(Error::malformed(format!(
                        "line {}: expected 'LoadPlugin <plugin-id>', got '{}'",
                        number + 1,
                        line
                    )));
                };
                self.load_plugin(plugin_id)?;
            } else {
                self.configure_lenient(key, value)
                    .map_err(|e| e.with_context(format!("line {}", number + 1)))?;
            }
        }
        Ok(())
    }

    fn configure_lenient(&mut self, key: &str, value: &str) -> Result<()> {
        match self.configure(key, value) {
            Err(e) if e.kind() == ErrorKind::UnknownOption => {
                warn!(key, "no plugin recognised the option, skipping");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_yaml_config() {
        let yaml = r#"
plugins:
  - id: memory
    options:
      MemoryGroup: "atlas:200"
      MemoryUser: "alice:1001:atlas"
  - id: librarian
options:
  WritePlacement: round-robin
  NobodyKnowsMe: 1
"#;
        let mut manager = PluginManager::new();
        manager.apply_config(&StackConfig::from_yaml(yaml).unwrap()).unwrap();

        assert_eq!(manager.loaded_plugins(), ["memory", "librarian"]);
        assert_eq!(manager.placement().name(), "round-robin");
        assert_eq!(manager.get_configuration("MemoryUser").unwrap(), "alice:1001:atlas");
    }

    #[test]
    fn test_yaml_unclaimed_plugin_option_is_fatal() {
        let yaml = "plugins:\n  - id: memory\n    options:\n      TokenLife: 30\n";
        let mut manager = PluginManager::new();
        let err = manager
            .apply_config(&StackConfig::from_yaml(yaml).unwrap())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownOption);
    }

    #[test]
    fn test_yaml_rejects_unknown_sections() {
        assert_matches!(
            StackConfig::from_yaml("plugin: []").map_err(|e| e.kind()),
            Err(ErrorKind::Malformed)
        );
    }

    #[test]
    fn test_line_format() {
        let text = "\
# stack
LoadPlugin memory
MemoryGroup atlas:200   # primary group
MemoryUser  alice:1001:atlas

LoadPlugin profiler
ProfilerSlowMs 50
Unclaimed whatever
";
        let mut manager = PluginManager::new();
        manager.load_lines(text).unwrap();
        assert_eq!(manager.loaded_plugins(), ["memory", "profiler"]);
        assert_eq!(manager.get_configuration("ProfilerSlowMs").unwrap(), "50");
    }

    #[test]
    fn test_malformed_load_line() {
        let mut manager = PluginManager::new();
        let err = manager.load_lines("LoadPlugin\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Malformed);
        assert!(err.message().contains("line 1"));

        assert!(manager.load_lines("LoadPlugin memory extra\n").is_err());
    }

    #[test]
    fn test_load_configuration_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(file, "plugins:\n  - id: memory").unwrap();

        let mut manager = PluginManager::new();
        manager.load_configuration(file.path()).unwrap();
        assert_eq!(manager.loaded_plugins(), ["memory"]);

        assert!(manager.load_configuration("/nonexistent/stack.conf").is_err());
    }
}
