//! In-memory stand-in for ACM, Route 53 and CloudFront.
//!
//! Mirrors the provider behaviour the pipeline relies on: cursor pagination,
//! atomic change batches that reject duplicate or conflicting entries,
//! ETag-checked distribution updates, and certificates that issue once their
//! validation records are published in a hosted zone.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use log::debug;

use super::{CERTIFICATE_REGION, CertificateApi, DistributionApi, DnsApi};
use crate::core::paging::Page;
use crate::core::types::{
    CertificateDetail, CertificateStatus, CertificateSummary, ChangeAction, ChangeBatch,
    ChangeInfo, DistributionConfig, DistributionState, DistributionSummary, DomainValidation,
    HostedZoneDetail, HostedZoneSummary, RecordCursor, RecordSet, ValidationRecord,
};
use crate::domain::fully_qualified;
use crate::error::{ProvisionError, Result};

const DEFAULT_PAGE_SIZE: usize = 100;
const ACCOUNT_ID: &str = "000000000000";
const WRITE_OPERATIONS: &[&str] = &[
    "RequestCertificate",
    "ChangeResourceRecordSets",
    "CreateDistribution",
    "UpdateDistribution",
];

struct ZoneEntry {
    id: String,
    name: String,
    name_servers: Vec<String>,
    records: Vec<RecordSet>,
}

struct CertificateEntry {
    summary: CertificateSummary,
    alternative_names: Vec<String>,
    describes: u32,
    forced: bool,
}

struct DistributionEntry {
    state: DistributionState,
    version: u64,
}

#[derive(Default)]
struct CloudState {
    sequence: u64,
    zones: Vec<ZoneEntry>,
    certificates: Vec<CertificateEntry>,
    distributions: Vec<DistributionEntry>,
    hold_validation_records: u32,
    calls: Vec<&'static str>,
    batches: Vec<(String, ChangeBatch)>,
    requests: Vec<Vec<String>>,
    failures: HashSet<&'static str>,
}

impl CloudState {
    fn next_id(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    fn record(&mut self, operation: &'static str) -> Result<()> {
        self.calls.push(operation);
        if self.failures.remove(operation) {
            return Err(ProvisionError::Provider {
                service: "memory",
                operation,
                code: "ServiceUnavailable".into(),
                message: "injected failure".into(),
                transient: true,
            });
        }
        Ok(())
    }

    fn zone(&self, zone_id: &str) -> Result<&ZoneEntry> {
        self.zones
            .iter()
            .find(|zone| zone.id == zone_id)
            .ok_or_else(|| ProvisionError::not_found(format!("hosted zone {zone_id}")))
    }

    fn describe(&mut self, arn: &str) -> Result<CertificateDetail> {
        let hold = self.hold_validation_records;
        let index = self
            .certificates
            .iter()
            .position(|c| c.summary.arn == arn)
            .ok_or_else(|| ProvisionError::not_found(format!("certificate {arn}")))?;

        let (domains, withheld) = {
            let entry = &mut self.certificates[index];
            entry.describes += 1;
            let mut domains = vec![entry.summary.domain_name.clone()];
            domains.extend(entry.alternative_names.iter().cloned());
            (domains, entry.describes <= hold)
        };

        let validation: Vec<DomainValidation> = domains
            .iter()
            .map(|domain| DomainValidation {
                domain_name: domain.clone(),
                record: (!withheld).then(|| validation_record(domain)),
            })
            .collect();

        let entry = &self.certificates[index];
        let should_issue = !entry.forced
            && entry.summary.status == CertificateStatus::PendingValidation
            && !withheld
            && validation
                .iter()
                .filter_map(|v| v.record.as_ref())
                .all(|record| self.record_published(record));
        if should_issue {
            debug!("[memory] issuing {arn}");
            self.certificates[index].summary.status = CertificateStatus::Issued;
        }

        let entry = &self.certificates[index];
        Ok(CertificateDetail {
            arn: entry.summary.arn.clone(),
            domain_name: entry.summary.domain_name.clone(),
            alternative_names: entry.alternative_names.clone(),
            status: entry.summary.status,
            validation,
        })
    }

    fn record_published(&self, record: &ValidationRecord) -> bool {
        self.zones.iter().any(|zone| {
            zone.records.iter().any(|existing| {
                existing.is_named(&record.name, &record.record_type)
                    && existing.contains_value(&record.value)
            })
        })
    }
}

/// Route 53-style rejection of a change batch.
fn invalid_batch(message: String) -> ProvisionError {
    ProvisionError::Provider {
        service: "route53",
        operation: "ChangeResourceRecordSets",
        code: "InvalidChangeBatch".into(),
        message,
        transient: false,
    }
}

fn page_of<T: Clone>(items: &[T], cursor: Option<String>, page_size: usize) -> Result<Page<T>> {
    let start = match cursor {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| ProvisionError::invalid_input(format!("invalid pagination cursor {raw}")))?,
        None => 0,
    };
    let end = (start + page_size).min(items.len());
    let slice = items.get(start..end).unwrap_or_default().to_vec();
    let next = (end < items.len()).then(|| end.to_string());
    Ok(Page::new(slice, next))
}

fn etag(id: &str, version: u64) -> String {
    format!("ETAG{version}-{id}")
}

/// FNV-1a, enough to give each domain a stable validation token.
fn token(input: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in input.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{hash:016x}")
}

/// Validation CNAME for a requested domain. A wildcard shares the record of
/// its base name, as ACM does.
fn validation_record(domain: &str) -> ValidationRecord {
    let base = domain.trim_start_matches("*.").trim_end_matches('.').to_lowercase();
    ValidationRecord {
        name: format!("_{}.{base}.", token(&base)),
        value: format!("_{}.acm-validations.aws.", token(&format!("{base}/value"))),
        record_type: "CNAME".to_string(),
    }
}

pub struct MemoryCloud {
    state: Mutex<CloudState>,
    page_size: usize,
}

impl Default for MemoryCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CloudState::default()),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn state(&self) -> MutexGuard<'_, CloudState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a hosted zone with its SOA and NS records and returns its id.
    pub fn add_zone(&self, name: &str) -> String {
        let mut state = self.state();
        let id = format!("/hostedzone/Z{:012}", state.next_id());
        let name = fully_qualified(&name.to_lowercase());
        let name_servers: Vec<String> = (1..=4)
            .map(|n| format!("ns-{n}.awsdns-{n:02}.example.net."))
            .collect();
        let records = vec![
            RecordSet {
                name: name.clone(),
                record_type: "NS".into(),
                ttl: Some(172_800),
                values: name_servers.clone(),
                alias: None,
            },
            RecordSet::simple(
                &name,
                "SOA",
                900,
                &format!("{} awsdns-hostmaster.amazon.com. 1 7200 900 1209600 86400", name_servers[0]),
            ),
        ];
        state.zones.push(ZoneEntry {
            id: id.clone(),
            name,
            name_servers,
            records,
        });
        id
    }

    /// Record sets currently stored in a zone.
    pub fn zone_records(&self, zone_id: &str) -> Vec<RecordSet> {
        self.state()
            .zone(zone_id)
            .map(|zone| zone.records.clone())
            .unwrap_or_default()
    }

    /// Every change batch accepted so far, in order.
    pub fn change_batches(&self) -> Vec<(String, ChangeBatch)> {
        self.state().batches.clone()
    }

    /// Domain lists of every certificate request, in order.
    pub fn certificate_requests(&self) -> Vec<Vec<String>> {
        self.state().requests.clone()
    }

    /// Number of calls made to a provider operation, e.g. `"ListHostedZones"`.
    pub fn calls(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|called| **called == operation)
            .count()
    }

    /// Number of mutating calls made so far.
    pub fn write_count(&self) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|called| WRITE_OPERATIONS.contains(called))
            .count()
    }

    /// Makes the next call to `operation` fail with a transient provider error.
    pub fn fail_next(&self, operation: &'static str) {
        self.state().failures.insert(operation);
    }

    /// Withholds validation records until each certificate has been described
    /// this many times.
    pub fn hold_validation_records(&self, describes: u32) {
        self.state().hold_validation_records = describes;
    }

    /// Pins a certificate to `status`; it no longer issues on its own.
    pub fn set_certificate_status(&self, arn: &str, status: CertificateStatus) {
        let mut state = self.state();
        if let Some(entry) = state.certificates.iter_mut().find(|c| c.summary.arn == arn) {
            entry.summary.status = status;
            entry.forced = true;
        }
    }

    pub fn distribution(&self, id: &str) -> Option<DistributionState> {
        self.state()
            .distributions
            .iter()
            .find(|d| d.state.id == id)
            .map(|d| d.state.clone())
    }

    /// Simulates a concurrent writer: the stored ETag moves on while the
    /// configuration stays as it is.
    pub fn touch_distribution(&self, id: &str) {
        let mut state = self.state();
        if let Some(entry) = state.distributions.iter_mut().find(|d| d.state.id == id) {
            entry.version += 1;
            entry.state.etag = Some(etag(&entry.state.id, entry.version));
        }
    }
}

#[async_trait]
impl CertificateApi for MemoryCloud {
    async fn request_certificate(&self, primary: &str, alternatives: &[String]) -> Result<String> {
        let mut state = self.state();
        state.record("RequestCertificate")?;

        let mut domains = vec![primary.to_string()];
        domains.extend(alternatives.iter().cloned());
        let unique: HashSet<&String> = domains.iter().collect();
        if unique.len() != domains.len() {
            return Err(ProvisionError::Provider {
                service: "acm",
                operation: "RequestCertificate",
                code: "InvalidParameterException".into(),
                message: "duplicate domain names in request".into(),
                transient: false,
            });
        }

        let arn = format!(
            "arn:aws:acm:{CERTIFICATE_REGION}:{ACCOUNT_ID}:certificate/{}",
            uuid::Uuid::new_v4()
        );
        state.requests.push(domains);
        state.certificates.push(CertificateEntry {
            summary: CertificateSummary {
                arn: arn.clone(),
                domain_name: primary.to_string(),
                status: CertificateStatus::PendingValidation,
                created_at: Some(Utc::now()),
            },
            alternative_names: alternatives.to_vec(),
            describes: 0,
            forced: false,
        });
        Ok(arn)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail> {
        let mut state = self.state();
        state.record("DescribeCertificate")?;
        state.describe(arn)
    }

    async fn list_certificates(&self, cursor: Option<String>) -> Result<Page<CertificateSummary>> {
        let mut state = self.state();
        state.record("ListCertificates")?;
        let summaries: Vec<CertificateSummary> =
            state.certificates.iter().map(|c| c.summary.clone()).collect();
        page_of(&summaries, cursor, self.page_size)
    }
}

#[async_trait]
impl DnsApi for MemoryCloud {
    async fn list_hosted_zones(&self, cursor: Option<String>) -> Result<Page<HostedZoneSummary>> {
        let mut state = self.state();
        state.record("ListHostedZones")?;
        let zones: Vec<HostedZoneSummary> = state
            .zones
            .iter()
            .map(|zone| HostedZoneSummary {
                id: zone.id.clone(),
                name: zone.name.clone(),
                record_count: zone.records.len() as u64,
            })
            .collect();
        page_of(&zones, cursor, self.page_size)
    }

    async fn get_hosted_zone(&self, zone_id: &str) -> Result<HostedZoneDetail> {
        let mut state = self.state();
        state.record("GetHostedZone")?;
        let zone = state.zone(zone_id)?;
        Ok(HostedZoneDetail {
            id: zone.id.clone(),
            name: zone.name.clone(),
            record_count: zone.records.len() as u64,
            name_servers: zone.name_servers.clone(),
        })
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        cursor: Option<RecordCursor>,
    ) -> Result<Page<RecordSet, RecordCursor>> {
        let mut state = self.state();
        state.record("ListResourceRecordSets")?;
        let records = &state.zone(zone_id)?.records;

        let start = match cursor {
            Some(cursor) => records
                .iter()
                .position(|r| {
                    r.is_named(&cursor.name, cursor.record_type.as_deref().unwrap_or(r.record_type.as_str()))
                })
                .unwrap_or(records.len()),
            None => 0,
        };
        let end = (start + self.page_size).min(records.len());
        let items = records[start..end].to_vec();
        let next = records.get(end).map(|r| RecordCursor {
            name: r.name.clone(),
            record_type: Some(r.record_type.clone()),
            identifier: None,
        });
        Ok(Page::from_truncated(items, end < records.len(), next))
    }

    async fn change_record_sets(&self, zone_id: &str, batch: &ChangeBatch) -> Result<ChangeInfo> {
        let mut state = self.state();
        state.record("ChangeResourceRecordSets")?;
        let change_id = format!("/change/C{:012}", state.next_id());

        let zone_index = state
            .zones
            .iter()
            .position(|zone| zone.id == zone_id)
            .ok_or_else(|| ProvisionError::not_found(format!("hosted zone {zone_id}")))?;
        if batch.changes.is_empty() {
            return Err(invalid_batch("change batch is empty".into()));
        }

        let mut seen = HashSet::new();
        for change in &batch.changes {
            let key = (
                fully_qualified(&change.record.name.to_lowercase()),
                change.record.record_type.to_uppercase(),
            );
            if !seen.insert(key) {
                return Err(invalid_batch(format!(
                    "duplicate resource record set {} {} in batch",
                    change.record.name, change.record.record_type
                )));
            }
        }

        // Applied to a copy so a rejected change leaves the zone untouched.
        let mut records = state.zones[zone_index].records.clone();
        for change in &batch.changes {
            let record = &change.record;
            let existing = records
                .iter()
                .position(|r| r.is_named(&record.name, &record.record_type));
            let mut stored = record.clone();
            stored.name = fully_qualified(&record.name);
            match (change.action, existing) {
                (ChangeAction::Create, Some(_)) => {
                    return Err(invalid_batch(format!(
                        "record {} {} already exists",
                        record.name, record.record_type
                    )));
                }
                (ChangeAction::Create, None) | (ChangeAction::Upsert, None) => records.push(stored),
                (ChangeAction::Upsert, Some(index)) => records[index] = stored,
                (ChangeAction::Delete, Some(index)) if records[index].values == record.values
                    && records[index].alias == record.alias =>
                {
                    records.remove(index);
                }
                (ChangeAction::Delete, _) => {
                    return Err(invalid_batch(format!(
                        "record {} {} to delete was not found",
                        record.name, record.record_type
                    )));
                }
            }
        }

        state.zones[zone_index].records = records;
        state.batches.push((zone_id.to_string(), batch.clone()));
        Ok(ChangeInfo {
            id: change_id,
            status: "PENDING".into(),
        })
    }
}

#[async_trait]
impl DistributionApi for MemoryCloud {
    async fn list_distributions(&self, cursor: Option<String>) -> Result<Page<DistributionSummary>> {
        let mut state = self.state();
        state.record("ListDistributions")?;
        let summaries: Vec<DistributionSummary> = state
            .distributions
            .iter()
            .map(|d| DistributionSummary {
                id: d.state.id.clone(),
                arn: d.state.arn.clone(),
                domain_name: d.state.domain_name.clone(),
                status: d.state.status.clone(),
                aliases: d.state.config.aliases.clone(),
            })
            .collect();
        page_of(&summaries, cursor, self.page_size)
    }

    async fn create_distribution(&self, config: &DistributionConfig) -> Result<DistributionState> {
        let mut state = self.state();
        state.record("CreateDistribution")?;

        if state
            .distributions
            .iter()
            .any(|d| d.state.config.caller_reference == config.caller_reference)
        {
            return Err(ProvisionError::Provider {
                service: "cloudfront",
                operation: "CreateDistribution",
                code: "DistributionAlreadyExists".into(),
                message: format!("caller reference {} already used", config.caller_reference),
                transient: false,
            });
        }
        let taken: HashMap<&str, &str> = state
            .distributions
            .iter()
            .flat_map(|d| d.state.config.aliases.iter().map(|a| (a.as_str(), d.state.id.as_str())))
            .collect();
        if let Some(alias) = config.aliases.iter().find(|a| taken.contains_key(a.as_str())) {
            return Err(ProvisionError::Provider {
                service: "cloudfront",
                operation: "CreateDistribution",
                code: "CNAMEAlreadyExists".into(),
                message: format!("{alias} is already served by {}", taken[alias.as_str()]),
                transient: false,
            });
        }

        let serial = state.next_id();
        let id = format!("E{serial:013X}");
        let created = DistributionState {
            arn: format!("arn:aws:cloudfront::{ACCOUNT_ID}:distribution/{id}"),
            domain_name: format!("d{serial:013x}.cloudfront.net"),
            status: "InProgress".into(),
            etag: Some(etag(&id, 1)),
            config: config.clone(),
            id,
        };
        state.distributions.push(DistributionEntry {
            state: created.clone(),
            version: 1,
        });
        Ok(created)
    }

    async fn get_distribution(&self, id: &str) -> Result<DistributionState> {
        let mut state = self.state();
        state.record("GetDistribution")?;
        let entry = state
            .distributions
            .iter_mut()
            .find(|d| d.state.id == id)
            .ok_or_else(|| ProvisionError::not_found(format!("distribution {id}")))?;
        entry.state.status = "Deployed".into();
        Ok(entry.state.clone())
    }

    async fn update_distribution(
        &self,
        id: &str,
        if_match: &str,
        config: &DistributionConfig,
    ) -> Result<DistributionState> {
        let mut state = self.state();
        state.record("UpdateDistribution")?;
        let entry = state
            .distributions
            .iter_mut()
            .find(|d| d.state.id == id)
            .ok_or_else(|| ProvisionError::not_found(format!("distribution {id}")))?;

        if entry.state.etag.as_deref() != Some(if_match) {
            return Err(ProvisionError::Conflict(format!(
                "distribution {id} has moved past {if_match}"
            )));
        }
        if entry.state.config.caller_reference != config.caller_reference {
            return Err(ProvisionError::Provider {
                service: "cloudfront",
                operation: "UpdateDistribution",
                code: "IllegalUpdate".into(),
                message: "caller reference cannot change".into(),
                transient: false,
            });
        }

        entry.version += 1;
        entry.state.config = config.clone();
        entry.state.status = "InProgress".into();
        entry.state.etag = Some(etag(id, entry.version));
        Ok(entry.state.clone())
    }
}
