use std::path::PathBuf;

use anyhow::Context;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_CLINICAL_CLASS: &str = "Clinical";
pub const DEFAULT_LOG_FILTER: &str = "groupscholar_faculty_effort=info,faculty_effort=info";

/// Runtime settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub report_dir: PathBuf,
    /// Assignment-type class whose percentages count as clinical.
    pub clinical_class: String,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .context("DATABASE_URL must be set to a production Postgres instance")?;
        let max_connections = match lookup("EFFORT_DB_MAX_CONNECTIONS") {
            Some(raw) => raw
                .parse::<u32>()
                .with_context(|| format!("EFFORT_DB_MAX_CONNECTIONS is not a number: {raw}"))?,
            None => DEFAULT_MAX_CONNECTIONS,
        };
        let report_dir = lookup("EFFORT_REPORT_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."));
        let clinical_class =
            lookup("EFFORT_CLINICAL_CLASS").unwrap_or_else(|| DEFAULT_CLINICAL_CLASS.to_string());

        Ok(Self {
            database_url,
            max_connections,
            report_dir,
            clinical_class,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_optional_values_missing() {
        let config = AppConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/effort")])).unwrap();
        assert_eq!(config.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(config.clinical_class, "Clinical");
        assert_eq!(config.report_dir, PathBuf::from("."));
    }

    #[test]
    fn database_url_is_required() {
        assert!(AppConfig::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn rejects_non_numeric_pool_size() {
        let result = AppConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/effort"),
            ("EFFORT_DB_MAX_CONNECTIONS", "many"),
        ]));
        assert!(result.is_err());
    }
}
