use anyhow::{Result, anyhow};

use edge_provision::ProvisionError;
use edge_provision::distribution::{CachePolicy, Distribution, build_aliases};
use edge_provision::domain::DomainList;
use edge_provision::issuance::viewer_certificate;

use super::support::{api_origin, cloud};

const ARN: &str = "arn:aws:acm:us-east-1:000000000000:certificate/test";

#[test]
fn distribution_aliases_follow_domain_list() {
    assert_eq!(build_aliases(None).len(), 0);
    assert_eq!(
        build_aliases(Some(&DomainList::One("a.com".into()))),
        vec!["a.com"]
    );
    assert_eq!(
        build_aliases(Some(&DomainList::Many(vec!["a.com".into(), "b.com".into()]))),
        vec!["a.com", "b.com"]
    );
}

#[tokio::test]
async fn distribution_stale_etag_conflicts_without_changing_config() -> Result<()> {
    let cloud = cloud();
    let mut distribution = Distribution::new(cloud.clone()).cache_policy(Some(CachePolicy::Enabled));
    distribution
        .create(
            &[api_origin()],
            vec!["cdn.example.com".into()],
            Some(viewer_certificate(ARN)),
        )
        .await?;
    let id = distribution
        .id()
        .ok_or_else(|| anyhow!("created distribution has no id"))?
        .to_string();
    let before = cloud
        .distribution(&id)
        .ok_or_else(|| anyhow!("distribution {id} missing"))?;

    cloud.touch_distribution(&id);
    distribution.set_aliases(vec!["cdn.example.com".into(), "www.example.com".into()])?;
    let err = distribution
        .update()
        .await
        .err()
        .ok_or_else(|| anyhow!("expected a conflict"))?;

    assert!(matches!(err, ProvisionError::Conflict(_)));
    let after = cloud
        .distribution(&id)
        .ok_or_else(|| anyhow!("distribution {id} missing"))?;
    assert_eq!(after.config, before.config);

    // A fresh read picks up the current token.
    distribution.get().await?;
    distribution.set_aliases(vec!["cdn.example.com".into(), "www.example.com".into()])?;
    distribution.update().await?;
    let updated = cloud
        .distribution(&id)
        .ok_or_else(|| anyhow!("distribution {id} missing"))?;
    assert_eq!(updated.config.aliases, vec!["cdn.example.com", "www.example.com"]);

    Ok(())
}

#[tokio::test]
async fn distribution_lookup_by_alias_and_existence() -> Result<()> {
    let cloud = cloud();
    let mut distribution = Distribution::new(cloud.clone());
    assert!(!distribution.exists().await?);

    distribution
        .create(
            &[api_origin()],
            vec!["cdn.example.com".into()],
            Some(viewer_certificate(ARN)),
        )
        .await?;
    assert!(distribution.domain_name().is_some());
    assert!(distribution.exists().await?);
    assert!(distribution.is_deployed());

    let found = Distribution::find_by_alias(cloud.clone(), "CDN.example.com.")
        .await?
        .ok_or_else(|| anyhow!("distribution not found by alias"))?;
    assert_eq!(Some(found.id.as_str()), distribution.id());
    assert!(
        Distribution::find_by_alias(cloud.clone(), "www.example.com")
            .await?
            .is_none()
    );

    let mut missing = Distribution::with_id(cloud.clone(), "E000000000000");
    assert!(!missing.exists().await?);

    Ok(())
}

#[tokio::test]
async fn distribution_create_requires_an_origin() -> Result<()> {
    let cloud = cloud();
    let err = Distribution::new(cloud.clone())
        .create(&[], vec![], None)
        .await
        .err()
        .ok_or_else(|| anyhow!("expected invalid input"))?;

    assert!(matches!(err, ProvisionError::InvalidInput(_)));
    assert_eq!(cloud.write_count(), 0);
    Ok(())
}
