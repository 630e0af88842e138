use anyhow::{Result, anyhow};

use edge_provision::ProvisionError;
use edge_provision::core::types::ChangeAction;
use edge_provision::issuance::Certificate;

use super::support::{cloud, zone};

#[tokio::test]
async fn certificate_wildcard_and_apex_share_one_validation_record() -> Result<()> {
    let cloud = cloud();
    let zone = zone(&cloud, "example.com");

    let mut certificate = Certificate::new(cloud.clone(), zone);
    let submission = certificate
        .request("example.com", &["*.example.com".to_string()])
        .await?;

    assert_eq!(submission.submitted.len(), 1);
    assert_eq!(submission.submitted[0].values.len(), 1);

    let batches = cloud.change_batches();
    let (_, batch) = batches
        .first()
        .ok_or_else(|| anyhow!("no change batch submitted"))?;
    assert_eq!(batch.changes.len(), 1);
    assert_eq!(batch.changes[0].action, ChangeAction::Create);

    Ok(())
}

#[tokio::test]
async fn certificate_alternatives_repeating_primary_are_rejected_offline() -> Result<()> {
    let cloud = cloud();
    let zone = zone(&cloud, "example.com");

    let mut certificate = Certificate::new(cloud.clone(), zone);
    let err = certificate
        .request(
            "example.com",
            &["www.example.com".to_string(), "EXAMPLE.com.".to_string()],
        )
        .await
        .err()
        .ok_or_else(|| anyhow!("expected the request to be rejected"))?;

    assert!(matches!(err, ProvisionError::InvalidInput(_)));
    assert_eq!(cloud.calls("RequestCertificate"), 0);
    assert_eq!(cloud.calls("DescribeCertificate"), 0);
    assert!(certificate.arn().is_none());

    Ok(())
}

#[tokio::test]
async fn certificate_revalidation_skips_published_records() -> Result<()> {
    let cloud = cloud();
    let zone = zone(&cloud, "example.com");

    let mut certificate = Certificate::new(cloud.clone(), zone);
    certificate
        .request("cdn.example.com", &["static.example.com".to_string()])
        .await?;
    assert_eq!(cloud.change_batches().len(), 1);

    let again = certificate.validate().await?;
    assert!(again.submitted.is_empty());
    assert_eq!(again.already_present, 2);
    assert!(again.change.is_none());
    assert_eq!(cloud.change_batches().len(), 1);

    certificate.get().await?;
    assert!(certificate.is_issued());

    Ok(())
}

#[tokio::test]
async fn certificate_lookup_prefers_issued_over_newer_pending() -> Result<()> {
    let cloud = cloud();
    let zone = zone(&cloud, "example.com");

    let mut issued = Certificate::new(cloud.clone(), zone.clone());
    issued.request("cdn.example.com", &[]).await?;
    issued.get().await?;
    assert!(issued.is_issued());

    let mut pending = Certificate::new(cloud.clone(), zone);
    cloud.hold_validation_records(u32::MAX);
    pending.request("cdn.example.com", &[]).await?;

    let found = Certificate::find_for_domain(cloud.clone(), "cdn.example.com")
        .await?
        .ok_or_else(|| anyhow!("no certificate found"))?;
    assert_eq!(Some(found.arn.as_str()), issued.arn());

    assert!(
        Certificate::find_for_domain(cloud.clone(), "other.example.com")
            .await?
            .is_none()
    );

    Ok(())
}
