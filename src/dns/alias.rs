use log::info;
use serde::Serialize;

use super::zone::HostedZone;
use crate::core::types::{AliasTarget, Change, ChangeAction, RecordSet};
use crate::distribution::Distribution;
use crate::domain::{fully_qualified, same_name};
use crate::error::{ProvisionError, Result};

/// Hosted zone id Route 53 uses for every CloudFront alias target.
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AliasOutcome {
    Created,
    Updated,
    Unchanged,
}

/// An `A` alias record pointing a zone name at a distribution.
///
/// Building one has no side effect; nothing is written until `submit()`.
#[derive(Debug, Clone)]
pub struct AliasRecord {
    zone: HostedZone,
    subdomain: Option<String>,
    target: Option<String>,
}

impl AliasRecord {
    /// Alias for the zone apex.
    pub fn new(zone: &HostedZone) -> Self {
        Self {
            zone: zone.clone(),
            subdomain: None,
            target: None,
        }
    }

    pub fn for_subdomain(mut self, label: Option<&str>) -> Self {
        self.subdomain = label
            .map(|l| l.trim().trim_end_matches('.').to_string())
            .filter(|l| !l.is_empty());
        self
    }

    /// Points the record at `distribution`, which must already have its
    /// CloudFront domain name.
    pub fn for_cache(mut self, distribution: &Distribution) -> Result<Self> {
        let target = distribution.domain_name().ok_or_else(|| {
            ProvisionError::invalid_state(
                "cannot link an alias before the distribution has a domain name",
            )
        })?;
        self.target = Some(target.to_string());
        Ok(self)
    }

    pub fn record_name(&self) -> String {
        match &self.subdomain {
            Some(label) => self.zone.get_subdomain(label).fqdn().to_string(),
            None => self.zone.fqdn().to_string(),
        }
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn record(&self) -> Result<RecordSet> {
        let target = self.target.as_ref().ok_or_else(|| {
            ProvisionError::invalid_state("alias record has no distribution target")
        })?;
        Ok(RecordSet {
            name: self.record_name(),
            record_type: "A".to_string(),
            ttl: None,
            values: Vec::new(),
            alias: Some(AliasTarget {
                hosted_zone_id: CLOUDFRONT_HOSTED_ZONE_ID.to_string(),
                dns_name: fully_qualified(target),
                evaluate_target_health: false,
            }),
        })
    }

    pub fn create_change(&self) -> Result<Change> {
        Ok(Change {
            action: ChangeAction::Create,
            record: self.record()?,
        })
    }

    pub fn upsert_change(&self) -> Result<Change> {
        Ok(Change {
            action: ChangeAction::Upsert,
            record: self.record()?,
        })
    }

    /// Whether `records` already hold this alias with the same target.
    pub fn is_applied(&self, records: &[RecordSet]) -> Result<bool> {
        let wanted = self.record()?;
        Ok(records.iter().any(|existing| {
            existing.is_named(&wanted.name, &wanted.record_type)
                && matches!(
                    (&existing.alias, &wanted.alias),
                    (Some(have), Some(want)) if same_name(&have.dns_name, &want.dns_name)
                        && have.hosted_zone_id == want.hosted_zone_id
                )
        }))
    }

    /// Writes the record unless the zone already has it: `CREATE` when the
    /// name is free, `UPSERT` when it points somewhere else.
    pub async fn submit(&self) -> Result<AliasOutcome> {
        let wanted = self.record()?;
        let records = self.zone.get_records().await?;
        if self.is_applied(&records)? {
            info!("[alias] {} already points at {:?}", wanted.name, self.target);
            return Ok(AliasOutcome::Unchanged);
        }

        let taken = records
            .iter()
            .any(|existing| existing.is_named(&wanted.name, &wanted.record_type));
        let (change, outcome) = if taken {
            (self.upsert_change()?, AliasOutcome::Updated)
        } else {
            (self.create_change()?, AliasOutcome::Created)
        };
        self.zone
            .submit_change(vec![change], Some("CloudFront alias"))
            .await?;
        info!(
            "[alias] {} -> {:?} ({outcome:?})",
            wanted.name, self.target
        );
        Ok(outcome)
    }
}
