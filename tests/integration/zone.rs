use anyhow::{Result, anyhow};

use edge_provision::core::types::{Change, ChangeAction, RecordSet};
use edge_provision::dns::HostedZone;

use super::support::cloud;

#[tokio::test]
async fn zone_find_returns_first_provider_ordered_prefix_match() -> Result<()> {
    let cloud = cloud();
    let first = cloud.add_zone("example.com");
    cloud.add_zone("example.com.au");

    let zone = HostedZone::find(cloud.clone(), "example.com")
        .await?
        .ok_or_else(|| anyhow!("no zone found"))?;
    assert_eq!(zone.id(), first);
    assert_eq!(zone.fqdn(), "example.com.");

    assert!(HostedZone::find(cloud.clone(), "example.org").await?.is_none());
    Ok(())
}

#[tokio::test]
async fn zone_find_keeps_listing_order_when_longer_name_comes_first() -> Result<()> {
    let cloud = cloud();
    let first = cloud.add_zone("example.com.au");
    cloud.add_zone("example.com");

    let zone = HostedZone::find(cloud.clone(), "example.com")
        .await?
        .ok_or_else(|| anyhow!("no zone found"))?;
    assert_eq!(zone.id(), first);
    assert_eq!(zone.name(), "example.com.au");
    Ok(())
}

#[tokio::test]
async fn zone_rejected_batch_leaves_records_untouched() -> Result<()> {
    let cloud = cloud();
    let id = cloud.add_zone("example.com");
    let zone = HostedZone::new(cloud.clone(), id.clone(), "example.com");
    let before = zone.get_records().await?;

    let record = RecordSet::simple("_a.example.com", "CNAME", 60, "_b.acm-validations.aws.");
    let duplicate = vec![
        Change {
            action: ChangeAction::Create,
            record: record.clone(),
        },
        Change {
            action: ChangeAction::Create,
            record,
        },
    ];
    assert!(zone.submit_change(duplicate, None).await.is_err());
    assert_eq!(zone.get_records().await?, before);

    let mut refreshed = zone.get_subdomain("cdn");
    refreshed.get().await?;
    assert_eq!(refreshed.record_count(), 2);
    assert_eq!(refreshed.name_servers().len(), 4);
    assert_eq!(refreshed.id(), id);
    Ok(())
}
