use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::core::retry::PollSchedule;
use crate::distribution::{CacheSetting, Origin, build_aliases};
use crate::domain::{DomainList, root_from_hostname, same_name};
use crate::error::{ProvisionError, Result};
use crate::pipeline::ProvisionRequest;

pub const DEFAULT_CONFIG_FILE: &str = "edge-provision.json";
const ENVIRONMENT_ENV: &str = "EDGE_PROVISION_ENV";

/// Deployment file read by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub name: String,
    /// Name prefix per environment.
    #[serde(default)]
    pub prefix: HashMap<String, String>,
    #[serde(default)]
    pub suffix: HashMap<String, String>,
    #[serde(default)]
    pub domain: Option<DomainList>,
    /// Hosted zone name prefix; the primary domain's parent when absent.
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub region: Vec<String>,
    #[serde(default)]
    pub service: Vec<ServiceEntry>,
    #[serde(default)]
    pub origin: Vec<Origin>,
    #[serde(default)]
    pub cache: Option<CacheSetting>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub poll: Option<PollSettings>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub domain: Option<String>,
}

impl ServiceEntry {
    /// Explicit id, or the service type.
    pub fn id(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.kind)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PollSettings {
    #[serde(default)]
    pub initial_secs: Option<u64>,
    #[serde(default)]
    pub max_secs: Option<u64>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Environment name from `EDGE_PROVISION_ENV`, if set.
pub fn environment() -> Option<String> {
    std::env::var(ENVIRONMENT_ENV)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl DeploymentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ProvisionError::Config(format!("failed to read {}: {err}", path.display()))
        })?;
        let config = Self::from_json(&raw)
            .map_err(|err| ProvisionError::Config(format!("{}: {err}", path.display())))?;
        debug!("[config] loaded {} from {}", config.name, path.display());
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| ProvisionError::Config(format!("invalid deployment file: {err}")))?;
        if config.name.trim().is_empty() {
            return Err(ProvisionError::Config("name must not be empty".into()));
        }
        Ok(config)
    }

    /// `name` with the environment's prefix and suffix applied.
    pub fn deployment_name(&self, env: Option<&str>) -> String {
        let Some(env) = env else {
            return self.name.clone();
        };
        format!(
            "{}{}{}",
            self.prefix.get(env).map(String::as_str).unwrap_or_default(),
            self.name,
            self.suffix.get(env).map(String::as_str).unwrap_or_default()
        )
    }

    pub fn service_name(&self, env: Option<&str>, service: &str) -> String {
        [self.deployment_name(env), service.to_string()].join("_")
    }

    pub fn service(&self, id: &str) -> Option<&ServiceEntry> {
        self.service.iter().find(|s| s.id() == id)
    }

    pub fn poll_schedule(&self) -> PollSchedule {
        let mut schedule = PollSchedule::default();
        if let Some(poll) = self.poll {
            if let Some(secs) = poll.initial_secs {
                schedule.initial = Duration::from_secs(secs);
            }
            if let Some(secs) = poll.max_secs {
                schedule.max_interval = Duration::from_secs(secs);
            }
            if let Some(secs) = poll.timeout_secs {
                schedule.timeout = Duration::from_secs(secs);
            }
        }
        schedule
    }

    /// Resolves the file into one pipeline run.
    ///
    /// The first domain is the primary name and the rest are alternative
    /// names; every domain becomes a distribution alias.
    pub fn to_request(&self, env: Option<&str>) -> Result<ProvisionRequest> {
        let domains: Vec<String> = self
            .domain
            .as_ref()
            .map(DomainList::names)
            .unwrap_or_default()
            .into_iter()
            .map(|name| name.trim().to_string())
            .collect();
        let Some((primary, alternatives)) = domains.split_first() else {
            return Err(ProvisionError::Config("at least one domain is required".into()));
        };
        for (index, name) in domains.iter().enumerate() {
            if domains[..index].iter().any(|earlier| same_name(earlier, name)) {
                return Err(ProvisionError::Config(format!(
                    "{name} is listed more than once"
                )));
            }
        }
        if self.origin.is_empty() {
            return Err(ProvisionError::Config("at least one origin is required".into()));
        }
        let cache = self
            .cache
            .as_ref()
            .map(CacheSetting::resolve)
            .transpose()
            .map_err(|err| ProvisionError::Config(err.to_string()))?;

        Ok(ProvisionRequest {
            primary_domain: primary.clone(),
            alternative_domains: alternatives.to_vec(),
            zone: self
                .zone
                .clone()
                .unwrap_or_else(|| root_from_hostname(primary)),
            origins: self.origin.clone(),
            aliases: build_aliases(self.domain.as_ref()),
            cache,
            comment: self
                .comment
                .clone()
                .unwrap_or_else(|| self.deployment_name(env)),
            schedule: self.poll_schedule().with_env_override(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::CachePolicy;
    use std::io::Write;

    const SAMPLE: &str = r#"{
        "name": "shop",
        "prefix": { "staging": "stg-" },
        "suffix": { "production": "-live" },
        "domain": ["cdn.example.com", "static.example.com"],
        "region": ["eu-west-1"],
        "service": [{ "type": "api" }, { "id": "assets", "type": "cloudfront" }],
        "origin": [
            { "kind": "compute", "name": "api", "domain_name": "abc.execute-api.eu-west-1.amazonaws.com" }
        ],
        "cache": "media",
        "poll": { "timeout_secs": 120 }
    }"#;

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = DeploymentConfig::load(file.path()).unwrap();
        assert_eq!(config.name, "shop");
        assert_eq!(config.origin.len(), 1);
        assert_eq!(config.service("api").unwrap().kind, "api");
        assert_eq!(config.service("assets").unwrap().kind, "cloudfront");
        assert!(config.service("cloudfront").is_none());
    }

    #[test]
    fn missing_or_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = DeploymentConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));

        let err = DeploymentConfig::from_json(r#"{ "name": "" }"#).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(_)));
    }

    #[test]
    fn names_follow_environment() {
        let config = DeploymentConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.deployment_name(None), "shop");
        assert_eq!(config.deployment_name(Some("staging")), "stg-shop");
        assert_eq!(config.deployment_name(Some("production")), "shop-live");
        assert_eq!(config.service_name(Some("staging"), "api"), "stg-shop_api");
    }

    #[test]
    fn request_splits_primary_and_alternatives() {
        let config = DeploymentConfig::from_json(SAMPLE).unwrap();
        let request = config.to_request(Some("staging")).unwrap();

        assert_eq!(request.primary_domain, "cdn.example.com");
        assert_eq!(request.alternative_domains, vec!["static.example.com"]);
        assert_eq!(request.zone, "example.com");
        assert_eq!(request.aliases, vec!["cdn.example.com", "static.example.com"]);
        assert_eq!(request.cache, Some(CachePolicy::Media));
        assert_eq!(request.comment, "stg-shop");
        assert_eq!(request.schedule.initial, PollSchedule::default().initial);
    }

    #[test]
    fn request_needs_domain_and_origin() {
        let no_domain = DeploymentConfig::from_json(r#"{ "name": "shop" }"#).unwrap();
        assert!(matches!(
            no_domain.to_request(None),
            Err(ProvisionError::Config(_))
        ));

        let no_origin =
            DeploymentConfig::from_json(r#"{ "name": "shop", "domain": "example.com" }"#).unwrap();
        assert!(matches!(
            no_origin.to_request(None),
            Err(ProvisionError::Config(_))
        ));
    }

    #[test]
    fn repeated_primary_is_rejected() {
        let config = DeploymentConfig::from_json(
            r#"{
                "name": "shop",
                "domain": ["example.com", "EXAMPLE.com."],
                "origin": [{ "kind": "storage", "name": "s3", "bucket": "assets" }]
            }"#,
        )
        .unwrap();
        assert!(matches!(config.to_request(None), Err(ProvisionError::Config(_))));
    }

    #[test]
    fn repeated_alternative_is_rejected() {
        let config = DeploymentConfig::from_json(
            r#"{
                "name": "shop",
                "domain": ["example.com", "www.example.com", "WWW.example.com."],
                "origin": [{ "kind": "storage", "name": "s3", "bucket": "assets" }]
            }"#,
        )
        .unwrap();
        let err = config.to_request(None).unwrap_err();
        assert!(matches!(err, ProvisionError::Config(ref m) if m.contains("WWW.example.com.")));
    }
}
