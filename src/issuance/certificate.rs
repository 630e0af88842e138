use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::Serialize;

use crate::core::paging::PagedLister;
use crate::core::types::{
    CertificateStatus, CertificateSummary, Change, ChangeAction, ChangeInfo, DomainValidation,
    RecordSet, ValidationRecord, ViewerCertificate,
};
use crate::dns::HostedZone;
use crate::domain::same_name;
use crate::error::{ProvisionError, Result};
use crate::providers::CertificateApi;

/// TTL of submitted validation records, in seconds.
pub const VALIDATION_TTL: u64 = 60;
const VALIDATION_COMMENT: &str = "ACM validation";
const MINIMUM_PROTOCOL_VERSION: &str = "TLSv1.1_2016";

/// Binds `arn` to a distribution with SNI-only delivery.
pub fn viewer_certificate(arn: &str) -> ViewerCertificate {
    ViewerCertificate {
        certificate_arn: arn.to_string(),
        minimum_protocol_version: MINIMUM_PROTOCOL_VERSION.to_string(),
        ssl_support_method: "sni-only".to_string(),
    }
}

/// One record set per validation name, in the provider's order.
///
/// A CNAME holds a single value, so when the provider reports two values
/// for one name the first is kept.
pub fn dedupe_validation_records(records: &[ValidationRecord]) -> Vec<RecordSet> {
    let mut scheduled: HashMap<(String, String), &str> = HashMap::new();
    let mut sets: Vec<RecordSet> = Vec::new();

    for record in records {
        let key = (
            record.name.trim_end_matches('.').to_ascii_lowercase(),
            record.record_type.to_ascii_uppercase(),
        );
        if let Some(kept) = scheduled.get(&key) {
            if *kept != record.value {
                warn!(
                    "[certificate] {} already scheduled as {kept}; skipping {}",
                    record.name, record.value
                );
            }
            continue;
        }
        scheduled.insert(key, &record.value);
        sets.push(RecordSet::simple(
            &record.name,
            &record.record_type,
            VALIDATION_TTL,
            &record.value,
        ));
    }
    sets
}

/// Changes needed to publish `wanted` on top of `existing`, and the number of
/// records that were already there.
///
/// A name holding a stale value is replaced with an `UPSERT`.
fn plan_validation_changes(wanted: Vec<RecordSet>, existing: &[RecordSet]) -> (Vec<Change>, usize) {
    let mut changes = Vec::new();
    let mut already_present = 0;

    for set in wanted {
        let current = existing
            .iter()
            .find(|record| record.is_named(&set.name, &set.record_type));
        match current {
            Some(current) if set.values.iter().all(|v| current.contains_value(v)) => {
                already_present += 1;
            }
            Some(_) => changes.push(Change {
                action: ChangeAction::Upsert,
                record: set,
            }),
            None => changes.push(Change {
                action: ChangeAction::Create,
                record: set,
            }),
        }
    }
    (changes, already_present)
}

/// Result of one `validate()` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationSubmission {
    /// Record sets written by this pass.
    pub submitted: Vec<RecordSet>,
    /// Validation records found already published in the zone.
    pub already_present: usize,
    /// Domains whose validation record the provider has not produced yet.
    pub awaiting_records: Vec<String>,
    pub change: Option<ChangeInfo>,
}

impl ValidationSubmission {
    pub fn is_complete(&self) -> bool {
        self.awaiting_records.is_empty()
    }
}

/// An ACM certificate validated through DNS records in one hosted zone.
pub struct Certificate {
    api: Arc<dyn CertificateApi>,
    zone: HostedZone,
    arn: Option<String>,
    domains: Vec<String>,
    status: CertificateStatus,
    validation: Vec<DomainValidation>,
}

impl Certificate {
    /// Unrequested certificate whose validation records go to `zone`.
    pub fn new(api: Arc<dyn CertificateApi>, zone: HostedZone) -> Self {
        Self {
            api,
            zone,
            arn: None,
            domains: Vec::new(),
            status: CertificateStatus::Unknown,
            validation: Vec::new(),
        }
    }

    /// Handle for an already requested certificate.
    pub fn with_arn(api: Arc<dyn CertificateApi>, zone: HostedZone, arn: impl Into<String>) -> Self {
        let mut certificate = Self::new(api, zone);
        certificate.arn = Some(arn.into());
        certificate
    }

    /// Requests a DNS-validated certificate for `primary` plus `alternatives`
    /// and publishes its validation records.
    pub async fn request(
        &mut self,
        primary: &str,
        alternatives: &[String],
    ) -> Result<ValidationSubmission> {
        if primary.trim().is_empty() {
            return Err(ProvisionError::invalid_input("primary domain is required"));
        }
        if alternatives.iter().any(|alt| same_name(alt, primary)) {
            return Err(ProvisionError::invalid_input(format!(
                "alternative names must not repeat the primary domain {primary}"
            )));
        }
        if let Some(arn) = &self.arn {
            return Err(ProvisionError::invalid_state(format!(
                "certificate {arn} was already requested"
            )));
        }

        let arn = self.api.request_certificate(primary, alternatives).await?;
        info!(
            "[certificate] requested {arn} for {primary} (+{} alternative name(s))",
            alternatives.len()
        );
        self.domains = std::iter::once(primary.to_string())
            .chain(alternatives.iter().cloned())
            .collect();
        self.status = CertificateStatus::PendingValidation;
        self.arn = Some(arn);

        self.validate().await
    }

    /// Refreshes status and validation requirements from the provider.
    pub async fn get(&mut self) -> Result<()> {
        let arn = self.require_arn()?.to_string();
        let detail = self.api.describe_certificate(&arn).await?;
        if detail.status != self.status {
            debug!("[certificate] {arn}: {} -> {}", self.status, detail.status);
        }
        self.domains = std::iter::once(detail.domain_name)
            .chain(detail.alternative_names)
            .filter(|name| !name.is_empty())
            .collect();
        self.dedupe_domains();
        self.status = detail.status;
        self.validation = detail.validation;
        Ok(())
    }

    // ACM lists the primary among the alternative names.
    fn dedupe_domains(&mut self) {
        let mut seen = HashSet::new();
        self.domains
            .retain(|domain| seen.insert(domain.trim_end_matches('.').to_ascii_lowercase()));
    }

    /// Publishes the validation records the provider currently asks for.
    ///
    /// Pairs already present in the zone are skipped, and nothing is written
    /// when every pair is there. Domains without a generated record yet are
    /// reported in `awaiting_records`; call again on a later poll.
    pub async fn validate(&mut self) -> Result<ValidationSubmission> {
        let arn = self.require_arn()?.to_string();
        self.get().await?;

        let mut awaiting_records = Vec::new();
        let mut required = Vec::new();
        for option in &self.validation {
            match &option.record {
                Some(record) => required.push(record.clone()),
                None => awaiting_records.push(option.domain_name.clone()),
            }
        }
        if !awaiting_records.is_empty() {
            debug!(
                "[certificate] {arn}: no validation record yet for {}",
                awaiting_records.join(", ")
            );
        }

        let wanted = dedupe_validation_records(&required);
        if wanted.is_empty() {
            return Ok(ValidationSubmission {
                awaiting_records,
                ..Default::default()
            });
        }

        let existing = self.zone.get_records().await?;
        let (changes, already_present) = plan_validation_changes(wanted, &existing);
        if changes.is_empty() {
            debug!("[certificate] {arn}: validation records already published");
            return Ok(ValidationSubmission {
                already_present,
                awaiting_records,
                ..Default::default()
            });
        }

        let submitted: Vec<RecordSet> = changes.iter().map(|c| c.record.clone()).collect();
        let change = self
            .zone
            .submit_change(changes, Some(VALIDATION_COMMENT))
            .await?;
        info!(
            "[certificate] {arn}: published {} validation record set(s) in {}",
            submitted.len(),
            self.zone.zone_name()
        );
        Ok(ValidationSubmission {
            submitted,
            already_present,
            awaiting_records,
            change: Some(change),
        })
    }

    fn require_arn(&self) -> Result<&str> {
        self.arn
            .as_deref()
            .ok_or_else(|| ProvisionError::invalid_state("certificate has not been requested"))
    }

    pub async fn list(api: Arc<dyn CertificateApi>) -> Result<Vec<CertificateSummary>> {
        PagedLister::new("certificate", move |cursor| {
            let api = api.clone();
            async move { api.list_certificates(cursor).await }
        })
        .collect_all()
        .await
    }

    /// Newest issued or pending certificate whose primary name is `domain`.
    pub async fn find_for_domain(
        api: Arc<dyn CertificateApi>,
        domain: &str,
    ) -> Result<Option<CertificateSummary>> {
        let candidates = match Self::list(api).await {
            Ok(candidates) => candidates,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let found = candidates
            .into_iter()
            .filter(|summary| same_name(&summary.domain_name, domain))
            .filter(|summary| {
                matches!(
                    summary.status,
                    CertificateStatus::Issued | CertificateStatus::PendingValidation
                )
            })
            .max_by_key(|summary| (summary.status == CertificateStatus::Issued, summary.created_at));
        if found.is_none() {
            info!("[certificate] no usable certificate for {domain}");
        }
        Ok(found)
    }

    pub fn viewer_certificate(&self) -> Result<ViewerCertificate> {
        Ok(viewer_certificate(self.require_arn()?))
    }

    pub fn arn(&self) -> Option<&str> {
        self.arn.as_deref()
    }

    /// Requested names, primary first.
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    pub fn status(&self) -> CertificateStatus {
        self.status
    }

    pub fn validation(&self) -> &[DomainValidation] {
        &self.validation
    }

    pub fn zone(&self) -> &HostedZone {
        &self.zone
    }

    pub fn is_issued(&self) -> bool {
        self.status == CertificateStatus::Issued
    }

    pub fn is_inactive(&self) -> bool {
        self.status == CertificateStatus::Inactive
    }

    pub fn is_expired(&self) -> bool {
        self.status == CertificateStatus::Expired
    }

    pub fn is_revoked(&self) -> bool {
        self.status == CertificateStatus::Revoked
    }

    pub fn is_failed(&self) -> bool {
        self.status == CertificateStatus::Failed
    }

    pub fn validation_pending(&self) -> bool {
        self.status == CertificateStatus::PendingValidation
    }

    pub fn validation_timed_out(&self) -> bool {
        self.status == CertificateStatus::ValidationTimedOut
    }
}
