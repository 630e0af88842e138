use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::same_name;

/// Lifecycle status of a managed certificate as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    PendingValidation,
    Issued,
    Inactive,
    Expired,
    Revoked,
    Failed,
    ValidationTimedOut,
    #[default]
    Unknown,
}

impl CertificateStatus {
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "PENDING_VALIDATION" => Self::PendingValidation,
            "ISSUED" => Self::Issued,
            "INACTIVE" => Self::Inactive,
            "EXPIRED" => Self::Expired,
            "REVOKED" => Self::Revoked,
            "FAILED" => Self::Failed,
            "VALIDATION_TIMED_OUT" => Self::ValidationTimedOut,
            _ => Self::Unknown,
        }
    }

    pub fn as_provider_str(&self) -> &'static str {
        match self {
            Self::PendingValidation => "PENDING_VALIDATION",
            Self::Issued => "ISSUED",
            Self::Inactive => "INACTIVE",
            Self::Expired => "EXPIRED",
            Self::Revoked => "REVOKED",
            Self::Failed => "FAILED",
            Self::ValidationTimedOut => "VALIDATION_TIMED_OUT",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Statuses after which polling stops.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Issued | Self::Failed | Self::Revoked | Self::Expired | Self::ValidationTimedOut
        )
    }
}

impl std::fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_provider_str())
    }
}

/// DNS record the provider requires to prove ownership of a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub name: String,
    pub value: String,
    pub record_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainValidation {
    pub domain_name: String,
    /// Absent until the provider has generated the record.
    pub record: Option<ValidationRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateSummary {
    pub arn: String,
    pub domain_name: String,
    pub status: CertificateStatus,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateDetail {
    pub arn: String,
    pub domain_name: String,
    pub alternative_names: Vec<String>,
    pub status: CertificateStatus,
    pub validation: Vec<DomainValidation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZoneSummary {
    pub id: String,
    pub name: String,
    pub record_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostedZoneDetail {
    pub id: String,
    pub name: String,
    pub record_count: u64,
    pub name_servers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliasTarget {
    pub hosted_zone_id: String,
    pub dns_name: String,
    pub evaluate_target_health: bool,
}

/// A record set as stored in a hosted zone. Alias records carry `alias`
/// instead of `values` and have no TTL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordSet {
    pub name: String,
    pub record_type: String,
    pub ttl: Option<u64>,
    pub values: Vec<String>,
    pub alias: Option<AliasTarget>,
}

impl RecordSet {
    pub fn simple(name: &str, record_type: &str, ttl: u64, value: &str) -> Self {
        Self {
            name: name.to_string(),
            record_type: record_type.to_string(),
            ttl: Some(ttl),
            values: vec![value.to_string()],
            alias: None,
        }
    }

    pub fn is_named(&self, name: &str, record_type: &str) -> bool {
        same_name(&self.name, name) && self.record_type.eq_ignore_ascii_case(record_type)
    }

    pub fn contains_value(&self, value: &str) -> bool {
        self.values.iter().any(|existing| existing == value)
    }
}

/// Continuation point for record-set listings; Route 53 needs the name, type
/// and (for weighted sets) identifier of the next record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordCursor {
    pub name: String,
    pub record_type: Option<String>,
    pub identifier: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeAction {
    Create,
    Upsert,
    Delete,
}

impl ChangeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Upsert => "UPSERT",
            Self::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    pub action: ChangeAction,
    pub record: RecordSet,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeBatch {
    pub comment: Option<String>,
    pub changes: Vec<Change>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInfo {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginHeader {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomOriginSettings {
    pub http_port: u16,
    pub https_port: u16,
    pub protocol_policy: String,
    pub ssl_protocols: Vec<String>,
    pub read_timeout_secs: u32,
    pub keepalive_timeout_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OriginTransport {
    Custom(CustomOriginSettings),
    Storage { origin_access_identity: String },
}

/// Provider-facing description of one distribution origin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginSpec {
    pub id: String,
    pub domain_name: String,
    pub origin_path: String,
    pub custom_headers: Vec<OriginHeader>,
    pub transport: OriginTransport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheBehavior {
    pub target_origin_id: String,
    pub viewer_protocol_policy: String,
    pub allowed_methods: Vec<String>,
    pub cached_methods: Vec<String>,
    pub cache_policy_id: String,
    pub origin_request_policy_id: Option<String>,
}

/// TLS binding of a distribution to a managed certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerCertificate {
    pub certificate_arn: String,
    pub minimum_protocol_version: String,
    pub ssl_support_method: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionConfig {
    pub caller_reference: String,
    pub comment: String,
    pub enabled: bool,
    pub price_class: String,
    pub origins: Vec<OriginSpec>,
    pub aliases: Vec<String>,
    pub default_cache_behavior: CacheBehavior,
    pub viewer_certificate: Option<ViewerCertificate>,
    /// Provider-native config this one was read from. Writes patch the
    /// managed fields onto it so settings made outside this crate survive.
    #[serde(skip)]
    pub live: LiveConfig,
}

/// Opaque snapshot of a provider's own config type.
///
/// Equal only to itself: two reads of the same distribution give two
/// snapshots that compare unequal.
#[derive(Clone, Default)]
pub struct LiveConfig(Option<Arc<dyn Any + Send + Sync>>);

impl LiveConfig {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Some(Arc::new(value)))
    }

    pub fn get<T: Any>(&self) -> Option<&T> {
        self.0.as_deref().and_then(|value| value.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("LiveConfig(..)"),
            None => f.write_str("LiveConfig(None)"),
        }
    }
}

impl PartialEq for LiveConfig {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Eq for LiveConfig {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionSummary {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    pub status: String,
    pub aliases: Vec<String>,
}

/// Full distribution state returned by create, get and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionState {
    pub id: String,
    pub arn: String,
    pub domain_name: String,
    pub status: String,
    pub etag: Option<String>,
    pub config: DistributionConfig,
}
