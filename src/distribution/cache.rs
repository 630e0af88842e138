use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// CloudFront managed origin request policy `Managed-CORS-S3Origin`.
pub const CORS_S3_ORIGIN_REQUEST_POLICY: &str = "88a5eaf4-2fd4-4709-b370-b4c650ea3fcf";

/// Named CloudFront managed cache policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CachePolicy {
    Disabled,
    Enabled,
    Optimized,
    OptimizeUncompressed,
    Media,
}

impl CachePolicy {
    pub const ALL: [CachePolicy; 5] = [
        Self::Disabled,
        Self::Enabled,
        Self::Optimized,
        Self::OptimizeUncompressed,
        Self::Media,
    ];

    pub fn policy_id(&self) -> &'static str {
        match self {
            Self::Disabled => "4135ea2d-6df8-44a3-9df3-4b5a84be39ad",
            // "enabled" is shorthand for the optimized policy
            Self::Enabled | Self::Optimized => "658327ea-f89d-4fab-a63d-7e88639e58f6",
            Self::OptimizeUncompressed => "b2884449-e4de-46a7-ac36-70bc7f1ddd6d",
            Self::Media => "08627262-05a9-4f76-9ded-b50ca2e3a84f",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Enabled => "enabled",
            Self::Optimized => "optimized",
            Self::OptimizeUncompressed => "optimize-uncompressed",
            Self::Media => "media",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        let wanted = name.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|policy| policy.as_str() == wanted)
            .ok_or_else(|| {
                ProvisionError::invalid_input(format!(
                    "unknown cache policy {name:?} (expected one of {})",
                    Self::ALL.map(|p| p.as_str()).join(", ")
                ))
            })
    }
}

impl std::fmt::Display for CachePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache setting as written in the deployment file: `true`, `false` or a
/// policy name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheSetting {
    Toggle(bool),
    Named(String),
}

impl CacheSetting {
    pub fn resolve(&self) -> Result<CachePolicy> {
        match self {
            Self::Toggle(true) => Ok(CachePolicy::Enabled),
            Self::Toggle(false) => Ok(CachePolicy::Disabled),
            Self::Named(name) => CachePolicy::from_name(name),
        }
    }
}
