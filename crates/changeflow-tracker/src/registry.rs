//! Aggregate registry loaded from a YAML file.

use std::collections::HashSet;
use std::path::Path;

use changeflow_core::error::BridgeError;
use serde::Deserialize;

/// The set of tracked aggregates, as configured by the operator.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Registry {
    /// All configured aggregates.
    pub aggregates: Vec<Aggregate>,
}

/// One tracked aggregate: its name, polling interval, and change-query.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Aggregate {
    /// Unique name; used to form channels and event types.
    pub name: String,
    /// Polling interval in seconds.
    #[serde(default)]
    pub interval: u64,
    /// Change-query executed against the source database. Receives the
    /// current watermark as its single bind parameter.
    #[serde(default)]
    pub get_query: String,
}

impl Registry {
    /// Reads and parses the registry file.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] when the file is unreadable,
    /// contains unknown fields, or fails validation.
    pub fn load(path: &Path) -> Result<Self, BridgeError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::InvalidConfig(format!(
                "failed to read aggregates file {}: {e}",
                path.display()
            ))
        })?;
        Self::parse(&raw)
    }

    /// Parses registry YAML. Unknown fields at either level are hard errors.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidConfig`] on parse or validation failure.
    pub fn parse(yaml: &str) -> Result<Self, BridgeError> {
        let registry: Self = serde_yaml::from_str(yaml).map_err(|e| {
            BridgeError::InvalidConfig(format!("failed to parse aggregates file: {e}"))
        })?;
        registry.validate()?;
        Ok(registry)
    }

    /// Names of all configured aggregates, in file order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.aggregates.iter().map(|a| a.name.clone()).collect()
    }

    fn validate(&self) -> Result<(), BridgeError> {
        let mut seen = HashSet::new();
        for aggregate in &self.aggregates {
            if aggregate.name.is_empty() {
                return Err(BridgeError::InvalidConfig(
                    "aggregate name must not be empty".into(),
                ));
            }
            if !seen.insert(aggregate.name.as_str()) {
                return Err(BridgeError::InvalidConfig(format!(
                    "aggregate '{}' declared twice",
                    aggregate.name
                )));
            }
            if aggregate.interval == 0 {
                return Err(BridgeError::InvalidConfig(format!(
                    "aggregate '{}': interval must be at least 1 second",
                    aggregate.name
                )));
            }
            if aggregate.get_query.is_empty() {
                return Err(BridgeError::InvalidConfig(format!(
                    "aggregate '{}': get_query must not be empty",
                    aggregate.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reads_all_entries_in_order() {
        let yaml = r#"aggregates:
  - name: "fabric"
    interval: 60
    get_query: |
      SELECT operation, change_version, aggregate_key, payload
      FROM fabric_changes WHERE change_version > $1

  - name: "customer"
    interval: 30
    get_query: |
      SELECT operation, change_version, aggregate_key, payload
      FROM customer_changes WHERE change_version > $1
"#;

        let registry = Registry::parse(yaml).unwrap();

        assert_eq!(registry.aggregates.len(), 2);
        assert_eq!(registry.names(), vec!["fabric", "customer"]);
        assert_eq!(registry.aggregates[0].interval, 60);
        assert!(
            registry.aggregates[1]
                .get_query
                .contains("FROM customer_changes")
        );
        // Literal block scalars keep their trailing newline.
        assert!(registry.aggregates[0].get_query.ends_with('\n'));
    }

    #[test]
    fn test_unknown_entry_field_is_rejected() {
        let yaml = r#"aggregates:
  - name: fabric
  - name: customer
    extra_field: boom
"#;

        let err = Registry::parse(yaml).unwrap_err();

        let message = err.to_string();
        assert!(message.contains("unknown field"));
        assert!(message.contains("extra_field"));
    }

    #[test]
    fn test_unknown_top_level_field_is_rejected() {
        let yaml = "aggregates: []\nrefresh: always\n";

        let err = Registry::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown field"));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let yaml = "aggregates:\n  - name: fabric\n    get_query: SELECT 1\n";

        let err = Registry::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("interval"));
    }

    #[test]
    fn test_missing_query_is_rejected() {
        let yaml = "aggregates:\n  - name: fabric\n    interval: 60\n";

        let err = Registry::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("get_query"));
    }

    #[test]
    fn test_duplicate_names_are_rejected() {
        let yaml = concat!(
            "aggregates:\n",
            "  - {name: fabric, interval: 60, get_query: SELECT 1}\n",
            "  - {name: fabric, interval: 30, get_query: SELECT 2}\n",
        );

        let err = Registry::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("declared twice"));
    }
}
