//! Certificate, distribution and alias record provisioned in order.
//!
//! Every stage checks what already exists before writing, so a run that
//! failed part way can simply be started again: finished stages are detected
//! and skipped.

use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::retry::{PollSchedule, poll_until};
use crate::core::types::ViewerCertificate;
use crate::distribution::{CachePolicy, Distribution, Origin};
use crate::dns::{AliasOutcome, AliasRecord, HostedZone};
use crate::domain::{root_from_hostname, same_name, subdomain_label};
use crate::error::ProvisionError;
use crate::issuance::{Certificate, ValidationSubmission};
use crate::providers::ClientProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    CertPending,
    CertValidating,
    CertIssued,
    DistCreating,
    DistReady,
    AliasLinked,
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::CertPending => "CertPending",
            Self::CertValidating => "CertValidating",
            Self::CertIssued => "CertIssued",
            Self::DistCreating => "DistCreating",
            Self::DistReady => "DistReady",
            Self::AliasLinked => "AliasLinked",
        };
        f.write_str(name)
    }
}

/// A provisioning run that stopped at `stage`; resume from there.
#[derive(Debug, Error)]
#[error("provisioning failed at {stage}: {source}")]
pub struct PipelineError {
    pub stage: PipelineStage,
    #[source]
    pub source: ProvisionError,
}

impl PipelineError {
    pub fn new(stage: PipelineStage, source: ProvisionError) -> Self {
        Self { stage, source }
    }
}

fn at(stage: PipelineStage) -> impl FnOnce(ProvisionError) -> PipelineError {
    move |source| PipelineError::new(stage, source)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PipelineAction {
    CertificateReused { arn: String },
    CertificateRequested { arn: String },
    ValidationRecordsSubmitted { record_sets: usize },
    CertificateIssued { arn: String },
    DistributionReused { id: String },
    DistributionCreated { id: String },
    DistributionUpdated { id: String },
    AliasLinked { name: String, outcome: AliasOutcome },
}

impl PipelineAction {
    /// Whether the action wrote to a provider.
    pub fn is_write(&self) -> bool {
        match self {
            Self::CertificateRequested { .. }
            | Self::ValidationRecordsSubmitted { .. }
            | Self::DistributionCreated { .. }
            | Self::DistributionUpdated { .. } => true,
            Self::AliasLinked { outcome, .. } => *outcome != AliasOutcome::Unchanged,
            Self::CertificateReused { .. }
            | Self::CertificateIssued { .. }
            | Self::DistributionReused { .. } => false,
        }
    }
}

/// Everything one run needs, already resolved from configuration.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub primary_domain: String,
    pub alternative_domains: Vec<String>,
    /// Hosted zone name prefix.
    pub zone: String,
    pub origins: Vec<Origin>,
    pub aliases: Vec<String>,
    pub cache: Option<CachePolicy>,
    pub comment: String,
    pub schedule: PollSchedule,
}

impl ProvisionRequest {
    /// Request for `primary_domain` alone, served under its own name, in the
    /// zone made of its last two labels.
    pub fn new(primary_domain: &str, origins: Vec<Origin>) -> Self {
        Self {
            primary_domain: primary_domain.to_string(),
            alternative_domains: Vec::new(),
            zone: root_from_hostname(primary_domain),
            origins,
            aliases: vec![primary_domain.to_string()],
            cache: None,
            comment: String::new(),
            schedule: PollSchedule::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stage: PipelineStage,
    pub zone_id: String,
    pub certificate_arn: String,
    pub distribution_id: String,
    pub distribution_domain: String,
    pub alias: String,
    pub actions: Vec<PipelineAction>,
}

impl ProvisionReport {
    pub fn writes(&self) -> usize {
        self.actions.iter().filter(|a| a.is_write()).count()
    }
}

pub struct Pipeline {
    clients: ClientProvider,
}

impl Pipeline {
    pub fn new(clients: ClientProvider) -> Self {
        Self { clients }
    }

    pub fn clients(&self) -> &ClientProvider {
        &self.clients
    }

    /// Runs every stage through to `AliasLinked`.
    ///
    /// Failures carry the stage they happened in. Dropping the returned future
    /// cancels the in-flight call, but anything already submitted stays
    /// submitted; the next run picks it up through its existence checks.
    pub async fn run(&self, request: &ProvisionRequest) -> Result<ProvisionReport, PipelineError> {
        let started_at = Utc::now();
        let mut actions = Vec::new();

        info!("[pipeline] {} -> {}", request.primary_domain, PipelineStage::CertPending);
        let (zone, label) = self
            .resolve_zone(request)
            .await
            .map_err(at(PipelineStage::CertPending))?;
        let mut certificate = self
            .ensure_certificate(request, &zone, &mut actions)
            .await
            .map_err(at(PipelineStage::CertPending))?;

        info!("[pipeline] {} -> {}", request.primary_domain, PipelineStage::CertValidating);
        let issued_now = self
            .await_issuance(&mut certificate, request.schedule, &mut actions)
            .await
            .map_err(at(PipelineStage::CertValidating))?;
        let viewer = certificate
            .viewer_certificate()
            .map_err(at(PipelineStage::CertValidating))?;
        if issued_now {
            actions.push(PipelineAction::CertificateIssued {
                arn: viewer.certificate_arn.clone(),
            });
        }
        info!("[pipeline] {} -> {}", request.primary_domain, PipelineStage::CertIssued);

        info!("[pipeline] {} -> {}", request.primary_domain, PipelineStage::DistCreating);
        let distribution = self
            .ensure_distribution(request, viewer.clone(), &mut actions)
            .await
            .map_err(at(PipelineStage::DistCreating))?;

        info!("[pipeline] {} -> {}", request.primary_domain, PipelineStage::DistReady);
        let alias = AliasRecord::new(&zone)
            .for_subdomain(label.as_deref())
            .for_cache(&distribution)
            .map_err(at(PipelineStage::DistReady))?;
        let outcome = alias.submit().await.map_err(at(PipelineStage::DistReady))?;
        actions.push(PipelineAction::AliasLinked {
            name: alias.record_name(),
            outcome,
        });

        info!("[pipeline] {} -> {}", request.primary_domain, PipelineStage::AliasLinked);
        Ok(ProvisionReport {
            started_at,
            finished_at: Utc::now(),
            stage: PipelineStage::AliasLinked,
            zone_id: zone.id().to_string(),
            certificate_arn: viewer.certificate_arn,
            distribution_id: distribution.id().unwrap_or_default().to_string(),
            distribution_domain: distribution.domain_name().unwrap_or_default().to_string(),
            alias: alias.record_name(),
            actions,
        })
    }

    /// Finds the hosted zone and the primary domain's label inside it.
    async fn resolve_zone(
        &self,
        request: &ProvisionRequest,
    ) -> Result<(HostedZone, Option<String>), ProvisionError> {
        let zone = HostedZone::find(self.clients.dns(), &request.zone)
            .await?
            .ok_or_else(|| {
                ProvisionError::not_found(format!("no hosted zone matches {}", request.zone))
            })?;
        let label = subdomain_label(&request.primary_domain, zone.name())?;
        info!(
            "[pipeline] using zone {} ({}) for {}",
            zone.name(),
            zone.id(),
            request.primary_domain
        );
        Ok((zone, label))
    }

    async fn ensure_certificate(
        &self,
        request: &ProvisionRequest,
        zone: &HostedZone,
        actions: &mut Vec<PipelineAction>,
    ) -> Result<Certificate, ProvisionError> {
        let api = self.clients.certificates();

        if let Some(summary) = Certificate::find_for_domain(api.clone(), &request.primary_domain).await? {
            let mut existing = Certificate::with_arn(api.clone(), zone.clone(), summary.arn);
            existing.get().await?;
            if covers(existing.domains(), request) {
                let arn = existing.arn().unwrap_or_default().to_string();
                info!("[pipeline] reusing certificate {arn} ({})", existing.status());
                actions.push(PipelineAction::CertificateReused { arn });
                if existing.validation_pending() {
                    let submission = existing.validate().await?;
                    record_submission(&submission, actions);
                }
                return Ok(existing);
            }
            info!(
                "[pipeline] certificate {} covers {:?}, requesting a new one",
                existing.arn().unwrap_or_default(),
                existing.domains()
            );
        }

        let mut certificate = Certificate::new(api, zone.clone());
        let submission = certificate
            .request(&request.primary_domain, &request.alternative_domains)
            .await?;
        actions.push(PipelineAction::CertificateRequested {
            arn: certificate.arn().unwrap_or_default().to_string(),
        });
        record_submission(&submission, actions);
        Ok(certificate)
    }

    /// Polls until the certificate is issued. Returns whether it was still
    /// pending when polling started.
    async fn await_issuance(
        &self,
        certificate: &mut Certificate,
        schedule: PollSchedule,
        actions: &mut Vec<PipelineAction>,
    ) -> Result<bool, ProvisionError> {
        if certificate.is_issued() {
            return Ok(false);
        }
        let arn = certificate.arn().unwrap_or_default().to_string();

        let result = poll_until("certificate issuance", schedule, async || -> Result<Option<()>, ProvisionError> {
            // Refreshes the status and publishes records the provider has
            // generated since the last pass; writes nothing once all are live.
            let submission = certificate.validate().await?;
            record_submission(&submission, actions);

            if certificate.is_issued() {
                return Ok(Some(()));
            }
            if certificate.validation_timed_out() {
                return Err(ProvisionError::ValidationTimedOut(arn.clone()));
            }
            if certificate.is_failed()
                || certificate.is_revoked()
                || certificate.is_expired()
                || certificate.is_inactive()
            {
                return Err(ProvisionError::invalid_state(format!(
                    "certificate {arn} is {}",
                    certificate.status()
                )));
            }
            Ok(None)
        })
        .await;

        match result {
            Ok(()) => {
                info!("[pipeline] certificate {arn} issued");
                Ok(true)
            }
            Err(ProvisionError::Timeout(message)) => {
                Err(ProvisionError::ValidationTimedOut(format!("{arn}: {message}")))
            }
            Err(err) => Err(err),
        }
    }

    async fn ensure_distribution(
        &self,
        request: &ProvisionRequest,
        viewer: ViewerCertificate,
        actions: &mut Vec<PipelineAction>,
    ) -> Result<Distribution, ProvisionError> {
        let api = self.clients.distributions();
        let lookup = request
            .aliases
            .first()
            .unwrap_or(&request.primary_domain)
            .clone();

        if let Some(summary) = Distribution::find_by_alias(api.clone(), &lookup).await? {
            let mut distribution = Distribution::with_id(api, summary.id.clone());
            distribution.get().await?;
            if reconcile(&mut distribution, &viewer, &request.aliases)? {
                update_with_refresh(&mut distribution, &viewer, &request.aliases).await?;
                actions.push(PipelineAction::DistributionUpdated { id: summary.id });
            } else {
                info!("[pipeline] distribution {} already serves {lookup}", summary.id);
                actions.push(PipelineAction::DistributionReused { id: summary.id });
            }
            return Ok(distribution);
        }

        let mut distribution = Distribution::new(api)
            .comment(request.comment.clone())
            .cache_policy(request.cache);
        distribution
            .create(&request.origins, request.aliases.clone(), Some(viewer))
            .await?;
        actions.push(PipelineAction::DistributionCreated {
            id: distribution.id().unwrap_or_default().to_string(),
        });
        Ok(distribution)
    }
}

/// Whether a certificate's names are exactly the requested ones.
fn covers(domains: &[String], request: &ProvisionRequest) -> bool {
    let wanted: Vec<&String> = std::iter::once(&request.primary_domain)
        .chain(request.alternative_domains.iter())
        .collect();
    domains.len() == wanted.len()
        && wanted
            .iter()
            .all(|name| domains.iter().any(|have| same_name(have, name)))
}

fn record_submission(submission: &ValidationSubmission, actions: &mut Vec<PipelineAction>) {
    if !submission.submitted.is_empty() {
        actions.push(PipelineAction::ValidationRecordsSubmitted {
            record_sets: submission.submitted.len(),
        });
    }
}

/// Applies certificate and aliases; returns whether anything changed.
fn reconcile(
    distribution: &mut Distribution,
    viewer: &ViewerCertificate,
    aliases: &[String],
) -> Result<bool, ProvisionError> {
    let certificate_changed = distribution.set_viewer_certificate(viewer.clone())?;
    let aliases_changed = distribution.set_aliases(aliases.to_vec())?;
    Ok(certificate_changed || aliases_changed)
}

/// Updates once; on a stale token refreshes, reapplies and tries once more.
async fn update_with_refresh(
    distribution: &mut Distribution,
    viewer: &ViewerCertificate,
    aliases: &[String],
) -> Result<(), ProvisionError> {
    match distribution.update().await {
        Err(err) if err.is_conflict() => {
            warn!(
                "[pipeline] distribution {} changed concurrently, refreshing",
                distribution.id().unwrap_or_default()
            );
            distribution.get().await?;
            if reconcile(distribution, viewer, aliases)? {
                distribution.update().await?;
            }
            Ok(())
        }
        other => other,
    }
}
