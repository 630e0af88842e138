use serde::{Deserialize, Serialize};

use super::cache::{CORS_S3_ORIGIN_REQUEST_POLICY, CachePolicy};
use crate::core::types::{
    CacheBehavior, CustomOriginSettings, OriginHeader, OriginSpec, OriginTransport,
};

const ALL_METHODS: &[&str] = &["GET", "HEAD", "OPTIONS", "PUT", "PATCH", "POST", "DELETE"];
const READ_METHODS: &[&str] = &["HEAD", "GET", "OPTIONS"];
const CACHED_METHODS: &[&str] = &["HEAD", "GET"];

fn owned(methods: &[&str]) -> Vec<String> {
    methods.iter().map(|m| m.to_string()).collect()
}

/// Anything a distribution can forward requests to.
pub trait DescribeOrigin {
    /// Stable identifier, used as the cache behavior's target origin.
    fn origin_name(&self) -> &str;

    fn domain_name(&self) -> String;

    fn describe(&self) -> OriginSpec;

    /// Cache policy used when the deployment does not name one.
    fn default_cache_policy(&self) -> CachePolicy;

    fn cache_behavior(&self, policy: Option<CachePolicy>) -> CacheBehavior;
}

/// A compute endpoint (function URL, load balancer, API) reached over HTTPS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeOrigin {
    pub name: String,
    pub domain_name: String,
    #[serde(default)]
    pub path: String,
    /// Header CloudFront adds so the origin can reject direct traffic.
    #[serde(default)]
    pub secret_header: Option<OriginHeader>,
}

impl DescribeOrigin for ComputeOrigin {
    fn origin_name(&self) -> &str {
        &self.name
    }

    fn domain_name(&self) -> String {
        self.domain_name.clone()
    }

    fn describe(&self) -> OriginSpec {
        OriginSpec {
            id: self.name.clone(),
            domain_name: self.domain_name.clone(),
            origin_path: self.path.clone(),
            custom_headers: self.secret_header.iter().cloned().collect(),
            transport: OriginTransport::Custom(CustomOriginSettings {
                http_port: 80,
                https_port: 443,
                protocol_policy: "https-only".to_string(),
                ssl_protocols: vec!["TLSv1.2".to_string()],
                read_timeout_secs: 30,
                keepalive_timeout_secs: 10,
            }),
        }
    }

    fn default_cache_policy(&self) -> CachePolicy {
        CachePolicy::Disabled
    }

    fn cache_behavior(&self, policy: Option<CachePolicy>) -> CacheBehavior {
        CacheBehavior {
            target_origin_id: self.name.clone(),
            viewer_protocol_policy: "redirect-to-https".to_string(),
            allowed_methods: owned(ALL_METHODS),
            cached_methods: owned(CACHED_METHODS),
            cache_policy_id: policy
                .unwrap_or_else(|| self.default_cache_policy())
                .policy_id()
                .to_string(),
            origin_request_policy_id: None,
        }
    }
}

/// An S3 bucket served through its REST endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageOrigin {
    pub name: String,
    pub bucket: String,
    #[serde(default)]
    pub path: String,
    /// `origin-access-identity/cloudfront/<id>`, empty for public buckets.
    #[serde(default)]
    pub origin_access_identity: Option<String>,
}

impl DescribeOrigin for StorageOrigin {
    fn origin_name(&self) -> &str {
        &self.name
    }

    fn domain_name(&self) -> String {
        format!("{}.s3.amazonaws.com", self.bucket)
    }

    fn describe(&self) -> OriginSpec {
        OriginSpec {
            id: self.name.clone(),
            domain_name: self.domain_name(),
            origin_path: self.path.clone(),
            custom_headers: Vec::new(),
            transport: OriginTransport::Storage {
                origin_access_identity: self.origin_access_identity.clone().unwrap_or_default(),
            },
        }
    }

    fn default_cache_policy(&self) -> CachePolicy {
        CachePolicy::Optimized
    }

    fn cache_behavior(&self, policy: Option<CachePolicy>) -> CacheBehavior {
        CacheBehavior {
            target_origin_id: self.name.clone(),
            viewer_protocol_policy: "redirect-to-https".to_string(),
            allowed_methods: owned(READ_METHODS),
            cached_methods: owned(READ_METHODS),
            cache_policy_id: policy
                .unwrap_or_else(|| self.default_cache_policy())
                .policy_id()
                .to_string(),
            origin_request_policy_id: Some(CORS_S3_ORIGIN_REQUEST_POLICY.to_string()),
        }
    }
}

/// Closed set of origin kinds, chosen when the deployment is read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Origin {
    Compute(ComputeOrigin),
    Storage(StorageOrigin),
}

impl Origin {
    fn inner(&self) -> &dyn DescribeOrigin {
        match self {
            Self::Compute(origin) => origin,
            Self::Storage(origin) => origin,
        }
    }
}

impl DescribeOrigin for Origin {
    fn origin_name(&self) -> &str {
        self.inner().origin_name()
    }

    fn domain_name(&self) -> String {
        self.inner().domain_name()
    }

    fn describe(&self) -> OriginSpec {
        self.inner().describe()
    }

    fn default_cache_policy(&self) -> CachePolicy {
        self.inner().default_cache_policy()
    }

    fn cache_behavior(&self, policy: Option<CachePolicy>) -> CacheBehavior {
        self.inner().cache_behavior(policy)
    }
}
