use std::env;
use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

use crate::classify::RetentionPolicy;
use crate::error::{ReaperError, Result};
use crate::window::TimeWindow;

pub const DEFAULT_CLUSTER_TYPES: [&str; 3] = ["development", "production", "playground"];
pub const EVERY_DAY: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Upper bound for `period_secs` and `grace_period_secs`, ten years
pub const MAX_DURATION_SECS: u64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub registry: String,
    pub cluster_type: String,
    pub cluster_types: Vec<String>,
    pub period_secs: u64,
    pub grace_period_secs: u64,
    pub delete_untagged: bool,
    pub retain_latest_untagged: usize,
    pub perform_delete: bool,
    pub cleanup_days: Vec<String>,
    pub cleanup_start: String,
    pub cleanup_end: String,
    pub timezone: String,
    pub whitelisted: Vec<String>,
    pub cluster_name: Option<String>,
    pub active_cluster_name: Option<String>,
    pub workload_resources: Vec<String>,
    pub az_path: String,
    pub kubectl_path: String,
}

impl AppConfig {
    /// Load settings from defaults, optional config files and `IMGREAPER_*`
    /// environment variables, in increasing order of precedence.
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "dev".into());

        let builder = Self::defaults()?;
        let builder = match config_file {
            Some(path) => builder.add_source(File::from(path)),
            None => builder
                .add_source(File::with_name("config/default").required(false))
                .add_source(File::with_name(&format!("config/{}", run_mode)).required(false)),
        };

        let config = builder
            .add_source(
                Environment::with_prefix("IMGREAPER")
                    .prefix_separator("_")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("cluster_types")
                    .with_list_parse_key("cleanup_days")
                    .with_list_parse_key("whitelisted")
                    .with_list_parse_key("workload_resources")
                    .try_parsing(true),
            )
            .build()?;

        Self::from_config(config)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("port", 8080)?
            .set_default("cluster_types", DEFAULT_CLUSTER_TYPES.to_vec())?
            .set_default("period_secs", 3600)?
            .set_default("grace_period_secs", 3600)?
            .set_default("delete_untagged", false)?
            .set_default("retain_latest_untagged", 5)?
            .set_default("perform_delete", false)?
            .set_default("cleanup_days", EVERY_DAY.to_vec())?
            .set_default("cleanup_start", "0:00")?
            .set_default("cleanup_end", "6:00")?
            .set_default("timezone", "Local")?
            .set_default("whitelisted", Vec::<String>::new())?
            .set_default("workload_resources", vec!["deployments"])?
            .set_default("az_path", "az")?
            .set_default("kubectl_path", "kubectl")?)
    }

    fn from_config(config: Config) -> Result<Self> {
        let cfg: AppConfig = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        if self.registry.trim().is_empty() {
            return Err(ReaperError::Config("registry is required".to_string()));
        }
        if self.cluster_type.trim().is_empty() {
            return Err(ReaperError::Config("cluster_type is required".to_string()));
        }
        if self.period_secs == 0 {
            return Err(ReaperError::Config("period_secs must be positive".to_string()));
        }
        if self.period_secs > MAX_DURATION_SECS {
            return Err(ReaperError::Config(format!(
                "period_secs must not exceed {MAX_DURATION_SECS}"
            )));
        }
        let grace_in_range = i64::try_from(self.grace_period_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .is_some_and(|_| self.grace_period_secs <= MAX_DURATION_SECS);
        if !grace_in_range {
            return Err(ReaperError::Config(format!(
                "grace_period_secs must not exceed {MAX_DURATION_SECS}"
            )));
        }
        if self.workload_resources.is_empty() {
            return Err(ReaperError::Config(
                "workload_resources must name at least one resource".to_string(),
            ));
        }
        Ok(())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.period_secs)
    }

    pub fn grace_period(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.grace_period_secs.min(MAX_DURATION_SECS) as i64)
    }

    pub fn time_window(&self) -> Result<TimeWindow> {
        TimeWindow::from_settings(
            &self.cleanup_days,
            &self.cleanup_start,
            &self.cleanup_end,
            &self.timezone,
        )
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            cluster_type: self.cluster_type.clone(),
            cluster_types: self.cluster_types.clone(),
            grace_period: self.grace_period(),
            delete_untagged: self.delete_untagged,
            retain_latest_untagged: self.retain_latest_untagged,
        }
        .normalized()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn load_toml(toml: &str) -> Result<AppConfig> {
        let config = AppConfig::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;
        AppConfig::from_config(config)
    }

    #[test]
    fn test_defaults() {
        let cfg = load_toml(
            r#"
            registry = "myacr"
            cluster_type = "development"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.period(), Duration::from_secs(3600));
        assert_eq!(cfg.retain_latest_untagged, 5);
        assert!(!cfg.perform_delete);
        assert!(!cfg.delete_untagged);
        assert_eq!(cfg.cleanup_days.len(), 7);
        assert_eq!(cfg.cleanup_start, "0:00");
        assert_eq!(cfg.cleanup_end, "6:00");
        assert_eq!(cfg.timezone, "Local");
        assert!(cfg.whitelisted.is_empty());
        assert_eq!(cfg.cluster_types, DEFAULT_CLUSTER_TYPES.to_vec());
        assert!(cfg.time_window().is_ok());
    }

    #[test]
    fn test_missing_required_settings() {
        assert!(matches!(load_toml(r#"cluster_type = "production""#), Err(ReaperError::Config(_))));
        assert!(matches!(load_toml(r#"registry = "myacr""#), Err(ReaperError::Config(_))));
        assert!(matches!(
            load_toml(
                r#"
                registry = "  "
                cluster_type = "production"
                "#
            ),
            Err(ReaperError::Config(_))
        ));
    }

    #[test]
    fn test_zero_period_rejected() {
        let result = load_toml(
            r#"
            registry = "myacr"
            cluster_type = "production"
            period_secs = 0
            "#,
        );
        assert!(matches!(result, Err(ReaperError::Config(msg)) if msg.contains("period_secs")));
    }

    #[test]
    fn test_out_of_range_durations_rejected() {
        for setting in [
            "grace_period_secs = 1000000000000000",
            "grace_period_secs = 9000000000000000000",
            "period_secs = 1000000000000000",
        ] {
            let result = load_toml(&format!(
                "registry = \"myacr\"\ncluster_type = \"production\"\n{setting}\n"
            ));
            assert!(
                matches!(result, Err(ReaperError::Config(ref msg)) if msg.contains("must not exceed")),
                "{setting} was accepted"
            );
        }
    }

    #[test]
    fn test_longest_durations_accepted() {
        let cfg = load_toml(&format!(
            "registry = \"myacr\"\ncluster_type = \"production\"\nperiod_secs = {MAX_DURATION_SECS}\ngrace_period_secs = {MAX_DURATION_SECS}\n"
        ))
        .unwrap();
        assert_eq!(cfg.retention_policy().grace_period, chrono::Duration::days(3650));
    }

    #[test]
    fn test_named_timezone() {
        let cfg = load_toml(
            r#"
            registry = "myacr"
            cluster_type = "production"
            timezone = "Europe/Oslo"
            "#,
        )
        .unwrap();
        assert!(cfg.time_window().is_ok());
    }

    #[test]
    fn test_policy_includes_current_cluster_type() {
        let cfg = load_toml(
            r#"
            registry = "myacr"
            cluster_type = "staging"
            cluster_types = ["production"]
            delete_untagged = true
            retain_latest_untagged = 3
            grace_period_secs = 600
            "#,
        )
        .unwrap();

        let policy = cfg.retention_policy();
        assert_eq!(policy.cluster_types, vec!["production".to_string(), "staging".to_string()]);
        assert!(policy.delete_untagged);
        assert_eq!(policy.retain_latest_untagged, 3);
        assert_eq!(policy.grace_period, chrono::Duration::minutes(10));
    }

    #[test]
    fn test_invalid_window_surfaces_as_config_error() {
        let cfg = load_toml(
            r#"
            registry = "myacr"
            cluster_type = "production"
            cleanup_start = "25:00"
            "#,
        )
        .unwrap();
        assert!(matches!(cfg.time_window(), Err(ReaperError::Config(_))));
    }
}
