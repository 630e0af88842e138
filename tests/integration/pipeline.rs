use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use edge_provision::core::Page;
use edge_provision::core::types::{
    CertificateDetail, CertificateStatus, CertificateSummary, ChangeAction, DistributionConfig,
    DistributionState, DistributionSummary,
};
use edge_provision::dns::{AliasOutcome, CLOUDFRONT_HOSTED_ZONE_ID};
use edge_provision::issuance::VALIDATION_TTL;
use edge_provision::providers::{CertificateApi, DistributionApi};
use edge_provision::{
    ClientProvider, MemoryCloud, Pipeline, PipelineAction, PipelineStage, ProvisionError,
};

use super::support::{cloud, pipeline, request};

/// Reports no validation options on the first describe, as ACM does right
/// after a request.
struct SlowValidationOptions {
    cloud: Arc<MemoryCloud>,
    describes: AtomicUsize,
}

#[async_trait]
impl CertificateApi for SlowValidationOptions {
    async fn request_certificate(
        &self,
        primary: &str,
        alternatives: &[String],
    ) -> edge_provision::Result<String> {
        self.cloud.request_certificate(primary, alternatives).await
    }

    async fn describe_certificate(&self, arn: &str) -> edge_provision::Result<CertificateDetail> {
        let mut detail = self.cloud.describe_certificate(arn).await?;
        if self.describes.fetch_add(1, Ordering::SeqCst) == 0 {
            detail.validation.clear();
        }
        Ok(detail)
    }

    async fn list_certificates(
        &self,
        cursor: Option<String>,
    ) -> edge_provision::Result<Page<CertificateSummary>> {
        self.cloud.list_certificates(cursor).await
    }
}

/// Moves the distribution's ETag right before the next `races` updates.
struct RacingDistributions {
    cloud: Arc<MemoryCloud>,
    races: AtomicUsize,
}

#[async_trait]
impl DistributionApi for RacingDistributions {
    async fn list_distributions(
        &self,
        cursor: Option<String>,
    ) -> edge_provision::Result<Page<DistributionSummary>> {
        self.cloud.list_distributions(cursor).await
    }

    async fn create_distribution(
        &self,
        config: &DistributionConfig,
    ) -> edge_provision::Result<DistributionState> {
        self.cloud.create_distribution(config).await
    }

    async fn get_distribution(&self, id: &str) -> edge_provision::Result<DistributionState> {
        self.cloud.get_distribution(id).await
    }

    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: &DistributionConfig,
    ) -> edge_provision::Result<DistributionState> {
        let raced = self
            .races
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if raced {
            self.cloud.touch_distribution(id);
        }
        self.cloud.update_distribution(id, etag, config).await
    }
}

fn racing_pipeline(cloud: &Arc<MemoryCloud>, races: usize) -> Pipeline {
    let distributions = Arc::new(RacingDistributions {
        cloud: cloud.clone(),
        races: AtomicUsize::new(races),
    });
    Pipeline::new(ClientProvider::new(cloud.clone(), cloud.clone(), distributions))
}

#[tokio::test(start_paused = true)]
async fn pipeline_provisions_cdn_subdomain_end_to_end() -> Result<()> {
    let cloud = cloud();
    let zone_id = cloud.add_zone("example.com");

    let report = pipeline(&cloud).run(&request("cdn.example.com")).await?;

    assert_eq!(report.stage, PipelineStage::AliasLinked);
    assert_eq!(report.zone_id, zone_id);
    assert_eq!(report.alias, "cdn.example.com.");
    assert_eq!(cloud.certificate_requests(), vec![vec!["cdn.example.com".to_string()]]);

    let batches = cloud.change_batches();
    let validation: Vec<_> = batches
        .iter()
        .filter(|(_, batch)| batch.comment.as_deref() == Some("ACM validation"))
        .collect();
    if validation.len() != 1 {
        return Err(anyhow!("expected one validation batch, got {}", validation.len()));
    }
    let changes = &validation[0].1.changes;
    assert_eq!(changes.len(), 1);
    assert_eq!(changes[0].action, ChangeAction::Create);
    assert_eq!(changes[0].record.ttl, Some(VALIDATION_TTL));
    assert_eq!(changes[0].record.record_type, "CNAME");
    assert_eq!(changes[0].record.values.len(), 1);

    let distribution = cloud
        .distribution(&report.distribution_id)
        .ok_or_else(|| anyhow!("distribution {} missing", report.distribution_id))?;
    assert_eq!(distribution.config.aliases, vec!["cdn.example.com"]);
    assert_eq!(
        distribution
            .config
            .viewer_certificate
            .as_ref()
            .map(|v| v.certificate_arn.as_str()),
        Some(report.certificate_arn.as_str())
    );

    let alias = cloud
        .zone_records(&zone_id)
        .into_iter()
        .find(|r| r.is_named("cdn.example.com", "A"))
        .and_then(|r| r.alias)
        .ok_or_else(|| anyhow!("alias record missing"))?;
    assert_eq!(alias.hosted_zone_id, CLOUDFRONT_HOSTED_ZONE_ID);
    assert_eq!(alias.dns_name, format!("{}.", distribution.domain_name));
    assert!(!alias.evaluate_target_health);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_second_run_performs_no_writes() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.com");
    let pipeline = pipeline(&cloud);
    let request = request("cdn.example.com");

    let first = pipeline.run(&request).await?;
    let writes = cloud.write_count();
    assert!(writes > 0);

    let second = pipeline.run(&request).await?;
    assert_eq!(cloud.write_count(), writes);
    assert_eq!(second.writes(), 0);
    assert_eq!(second.certificate_arn, first.certificate_arn);
    assert_eq!(second.distribution_id, first.distribution_id);
    assert!(second.actions.contains(&PipelineAction::AliasLinked {
        name: "cdn.example.com.".into(),
        outcome: AliasOutcome::Unchanged,
    }));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_reports_stage_and_resumes_after_failure() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.com");
    let pipeline = pipeline(&cloud);
    let request = request("cdn.example.com");

    cloud.fail_next("CreateDistribution");
    let err = pipeline
        .run(&request)
        .await
        .err()
        .ok_or_else(|| anyhow!("expected the injected failure"))?;
    assert_eq!(err.stage, PipelineStage::DistCreating);
    assert!(err.source.is_transient());

    let report = pipeline.run(&request).await?;
    assert_eq!(report.stage, PipelineStage::AliasLinked);
    assert_eq!(cloud.certificate_requests().len(), 1);
    assert!(matches!(
        report.actions.first(),
        Some(PipelineAction::CertificateReused { .. })
    ));
    assert!(
        report
            .actions
            .iter()
            .any(|a| matches!(a, PipelineAction::DistributionCreated { .. }))
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_waits_for_late_validation_records() -> Result<()> {
    let cloud = cloud();
    let zone_id = cloud.add_zone("example.com");
    cloud.hold_validation_records(2);

    let report = pipeline(&cloud).run(&request("cdn.example.com")).await?;

    assert_eq!(report.stage, PipelineStage::AliasLinked);
    assert!(
        report
            .actions
            .iter()
            .any(|a| matches!(a, PipelineAction::CertificateIssued { .. }))
    );
    let published = cloud
        .zone_records(&zone_id)
        .into_iter()
        .filter(|r| r.record_type == "CNAME")
        .count();
    assert_eq!(published, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_stops_when_validation_never_completes() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.com");
    let arn = cloud.request_certificate("cdn.example.com", &[]).await?;
    cloud.set_certificate_status(&arn, CertificateStatus::PendingValidation);

    let err = pipeline(&cloud)
        .run(&request("cdn.example.com"))
        .await
        .err()
        .ok_or_else(|| anyhow!("expected validation to time out"))?;

    assert_eq!(err.stage, PipelineStage::CertValidating);
    assert!(matches!(err.source, ProvisionError::ValidationTimedOut(_)));
    assert_eq!(cloud.calls("CreateDistribution"), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_without_zone_fails_before_any_write() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.org");

    let err = pipeline(&cloud)
        .run(&request("cdn.example.com"))
        .await
        .err()
        .ok_or_else(|| anyhow!("expected a missing zone"))?;

    assert_eq!(err.stage, PipelineStage::CertPending);
    assert!(err.source.is_not_found());
    assert_eq!(cloud.write_count(), 0);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_moves_existing_distribution_to_new_certificate() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.com");
    let pipeline = pipeline(&cloud);

    let first = pipeline.run(&request("cdn.example.com")).await?;
    cloud.set_certificate_status(&first.certificate_arn, CertificateStatus::Revoked);

    let second = pipeline.run(&request("cdn.example.com")).await?;

    assert_ne!(second.certificate_arn, first.certificate_arn);
    assert_eq!(second.distribution_id, first.distribution_id);
    assert!(second.actions.contains(&PipelineAction::DistributionUpdated {
        id: first.distribution_id.clone(),
    }));
    let distribution = cloud
        .distribution(&first.distribution_id)
        .ok_or_else(|| anyhow!("distribution missing"))?;
    assert_eq!(
        distribution
            .config
            .viewer_certificate
            .map(|v| v.certificate_arn),
        Some(second.certificate_arn)
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_publishes_records_that_appear_after_the_first_describe() -> Result<()> {
    let cloud = cloud();
    let zone_id = cloud.add_zone("example.com");
    let certificates = Arc::new(SlowValidationOptions {
        cloud: cloud.clone(),
        describes: AtomicUsize::new(0),
    });
    let pipeline = Pipeline::new(ClientProvider::new(certificates, cloud.clone(), cloud.clone()));

    let report = pipeline.run(&request("cdn.example.com")).await?;

    assert_eq!(report.stage, PipelineStage::AliasLinked);
    assert!(!cloud.change_batches().is_empty());
    assert!(report.actions.iter().any(|a| matches!(
        a,
        PipelineAction::ValidationRecordsSubmitted { record_sets: 1 }
    )));
    let published = cloud
        .zone_records(&zone_id)
        .into_iter()
        .filter(|r| r.record_type == "CNAME")
        .count();
    assert_eq!(published, 1);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_retries_update_once_after_a_conflict() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.com");
    let first = pipeline(&cloud).run(&request("cdn.example.com")).await?;
    cloud.set_certificate_status(&first.certificate_arn, CertificateStatus::Revoked);

    let second = racing_pipeline(&cloud, 1).run(&request("cdn.example.com")).await?;

    assert_eq!(cloud.calls("UpdateDistribution"), 2);
    assert_eq!(second.distribution_id, first.distribution_id);
    assert!(second.actions.contains(&PipelineAction::DistributionUpdated {
        id: first.distribution_id.clone(),
    }));
    let distribution = cloud
        .distribution(&first.distribution_id)
        .ok_or_else(|| anyhow!("distribution missing"))?;
    assert_eq!(
        distribution
            .config
            .viewer_certificate
            .map(|v| v.certificate_arn),
        Some(second.certificate_arn)
    );

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn pipeline_reports_a_second_conflict() -> Result<()> {
    let cloud = cloud();
    cloud.add_zone("example.com");
    let first = pipeline(&cloud).run(&request("cdn.example.com")).await?;
    cloud.set_certificate_status(&first.certificate_arn, CertificateStatus::Revoked);

    let err = racing_pipeline(&cloud, 2)
        .run(&request("cdn.example.com"))
        .await
        .err()
        .ok_or_else(|| anyhow!("expected the second conflict to propagate"))?;

    assert_eq!(err.stage, PipelineStage::DistCreating);
    assert!(err.source.is_conflict());
    assert_eq!(cloud.calls("UpdateDistribution"), 2);

    Ok(())
}
