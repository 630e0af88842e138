//! Provider boundaries for the three external systems the pipeline drives.
//!
//! Each boundary is a narrow async trait; the AWS adapters translate SDK
//! shapes into `core::types`, and `MemoryCloud` implements all three for
//! tests and local runs.

use std::sync::Arc;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_route53::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use log::info;

use crate::core::paging::Page;
use crate::core::types::{
    CertificateDetail, CertificateSummary, ChangeBatch, ChangeInfo, DistributionConfig,
    DistributionState, DistributionSummary, HostedZoneDetail, HostedZoneSummary, RecordCursor,
    RecordSet,
};
use crate::error::{ProvisionError, Result};

mod acm;
mod cloudfront;
pub mod memory;
mod route53;

pub use acm::AcmCertificates;
pub use cloudfront::CloudFrontDistributions;
pub use memory::MemoryCloud;
pub use route53::Route53Zones;

/// CloudFront only reads certificates from this region.
pub const CERTIFICATE_REGION: &str = "us-east-1";

#[async_trait]
pub trait CertificateApi: Send + Sync {
    /// Requests a DNS-validated certificate and returns its identifier.
    async fn request_certificate(&self, primary: &str, alternatives: &[String]) -> Result<String>;

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail>;

    async fn list_certificates(&self, cursor: Option<String>) -> Result<Page<CertificateSummary>>;
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn list_hosted_zones(&self, cursor: Option<String>) -> Result<Page<HostedZoneSummary>>;

    async fn get_hosted_zone(&self, zone_id: &str) -> Result<HostedZoneDetail>;

    async fn list_record_sets(
        &self,
        zone_id: &str,
        cursor: Option<RecordCursor>,
    ) -> Result<Page<RecordSet, RecordCursor>>;

    /// Applies the whole batch or nothing.
    async fn change_record_sets(&self, zone_id: &str, batch: &ChangeBatch) -> Result<ChangeInfo>;
}

#[async_trait]
pub trait DistributionApi: Send + Sync {
    async fn list_distributions(&self, cursor: Option<String>) -> Result<Page<DistributionSummary>>;

    async fn create_distribution(&self, config: &DistributionConfig) -> Result<DistributionState>;

    async fn get_distribution(&self, id: &str) -> Result<DistributionState>;

    /// Replaces the configuration; fails with `Conflict` when `etag` is stale.
    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: &DistributionConfig,
    ) -> Result<DistributionState>;
}

/// Client handles built once per process and shared by every component.
#[derive(Clone)]
pub struct ClientProvider {
    certificates: Arc<dyn CertificateApi>,
    dns: Arc<dyn DnsApi>,
    distributions: Arc<dyn DistributionApi>,
}

impl ClientProvider {
    pub fn new(
        certificates: Arc<dyn CertificateApi>,
        dns: Arc<dyn DnsApi>,
        distributions: Arc<dyn DistributionApi>,
    ) -> Self {
        Self {
            certificates,
            dns,
            distributions,
        }
    }

    /// Loads AWS configuration from the environment and builds all three clients.
    pub async fn from_env() -> Self {
        let shared = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let certificate_config = aws_sdk_acm::config::Builder::from(&shared)
            .region(Region::new(CERTIFICATE_REGION))
            .build();
        info!(
            "[clients] AWS clients initialized (region: {})",
            shared.region().map(|r| r.as_ref()).unwrap_or("default")
        );

        Self::new(
            Arc::new(AcmCertificates::new(aws_sdk_acm::Client::from_conf(
                certificate_config,
            ))),
            Arc::new(Route53Zones::new(aws_sdk_route53::Client::new(&shared))),
            Arc::new(CloudFrontDistributions::new(aws_sdk_cloudfront::Client::new(
                &shared,
            ))),
        )
    }

    /// All three boundaries served by one in-memory cloud.
    pub fn in_memory(cloud: Arc<MemoryCloud>) -> Self {
        Self::new(cloud.clone(), cloud.clone(), cloud)
    }

    pub fn certificates(&self) -> Arc<dyn CertificateApi> {
        self.certificates.clone()
    }

    pub fn dns(&self) -> Arc<dyn DnsApi> {
        self.dns.clone()
    }

    pub fn distributions(&self) -> Arc<dyn DistributionApi> {
        self.distributions.clone()
    }
}

const NOT_FOUND_CODES: &[&str] = &[
    "NoSuchHostedZone",
    "NoSuchDistribution",
    "ResourceNotFoundException",
];
const CONFLICT_CODES: &[&str] = &["PreconditionFailed", "InvalidIfMatchVersion"];
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "ThrottledException",
    "TooManyRequestsException",
    "PriorRequestNotComplete",
    "ServiceUnavailable",
    "InternalFailure",
    "RequestTimeout",
];

/// Maps an SDK failure onto the crate's error taxonomy.
pub(crate) fn sdk_error<E, R>(
    service: &'static str,
    operation: &'static str,
    err: SdkError<E, R>,
) -> ProvisionError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let code = err.code().unwrap_or("Unknown").to_string();
    let message = err
        .message()
        .map(str::to_string)
        .unwrap_or_else(|| DisplayErrorContext(&err).to_string());
    let transport_failure = matches!(
        err,
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_)
    );
    classify(service, operation, code, message, transport_failure)
}

fn classify(
    service: &'static str,
    operation: &'static str,
    code: String,
    message: String,
    transport_failure: bool,
) -> ProvisionError {
    if NOT_FOUND_CODES.contains(&code.as_str()) {
        return ProvisionError::NotFound(format!("{service} {operation}: {message}"));
    }
    if CONFLICT_CODES.contains(&code.as_str()) {
        return ProvisionError::Conflict(format!("{service} {operation}: {message}"));
    }
    ProvisionError::Provider {
        service,
        operation,
        transient: transport_failure || TRANSIENT_CODES.contains(&code.as_str()),
        code,
        message,
    }
}

/// Reads an SDK boolean whether the generated accessor is optional or not.
pub(crate) fn flag(value: impl Into<Option<bool>>) -> bool {
    value.into().unwrap_or(false)
}

/// Error for a response missing a field the provider always sends.
pub(crate) fn missing_field(service: &'static str, operation: &'static str, field: &str) -> ProvisionError {
    ProvisionError::Provider {
        service,
        operation,
        code: "MissingField".into(),
        message: format!("response did not include {field}"),
        transient: false,
    }
}
