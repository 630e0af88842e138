use async_trait::async_trait;
use aws_sdk_route53::Client;
use aws_sdk_route53::types::{
    AliasTarget as SdkAliasTarget, Change as SdkChange, ChangeAction as SdkChangeAction,
    ChangeBatch as SdkChangeBatch, ResourceRecord, ResourceRecordSet, RrType,
};
use log::debug;

use super::{DnsApi, flag, missing_field, sdk_error};
use crate::core::paging::Page;
use crate::core::types::{
    AliasTarget, Change, ChangeBatch, ChangeInfo, HostedZoneDetail, HostedZoneSummary,
    RecordCursor, RecordSet,
};
use crate::error::{ProvisionError, Result};

const SERVICE: &str = "route53";

pub struct Route53Zones {
    client: Client,
}

impl Route53Zones {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn record_from_sdk(record: &ResourceRecordSet) -> RecordSet {
    RecordSet {
        name: record.name().to_string(),
        record_type: record.r#type().as_str().to_string(),
        ttl: record.ttl().and_then(|ttl| u64::try_from(ttl).ok()),
        values: record
            .resource_records()
            .iter()
            .map(|value| value.value().to_string())
            .collect(),
        alias: record.alias_target().map(|target| AliasTarget {
            hosted_zone_id: target.hosted_zone_id().to_string(),
            dns_name: target.dns_name().to_string(),
            evaluate_target_health: flag(target.evaluate_target_health()),
        }),
    }
}

fn build_error(what: &str, err: impl std::fmt::Display) -> ProvisionError {
    ProvisionError::invalid_input(format!("failed to build Route 53 {what}: {err}"))
}

fn record_to_sdk(record: &RecordSet) -> Result<ResourceRecordSet> {
    let mut builder = ResourceRecordSet::builder()
        .name(&record.name)
        .r#type(RrType::from(record.record_type.as_str()));

    if let Some(alias) = &record.alias {
        let target = SdkAliasTarget::builder()
            .hosted_zone_id(&alias.hosted_zone_id)
            .dns_name(&alias.dns_name)
            .evaluate_target_health(alias.evaluate_target_health)
            .build()
            .map_err(|e| build_error("AliasTarget", e))?;
        builder = builder.alias_target(target);
    } else {
        let values = record
            .values
            .iter()
            .map(|value| {
                ResourceRecord::builder()
                    .value(value)
                    .build()
                    .map_err(|e| build_error("ResourceRecord", e))
            })
            .collect::<Result<Vec<_>>>()?;
        builder = builder.set_resource_records(Some(values));
        if let Some(ttl) = record.ttl {
            builder = builder.ttl(i64::try_from(ttl).unwrap_or(i64::MAX));
        }
    }

    builder.build().map_err(|e| build_error("ResourceRecordSet", e))
}

fn change_to_sdk(change: &Change) -> Result<SdkChange> {
    SdkChange::builder()
        .action(SdkChangeAction::from(change.action.as_str()))
        .resource_record_set(record_to_sdk(&change.record)?)
        .build()
        .map_err(|e| build_error("Change", e))
}

#[async_trait]
impl DnsApi for Route53Zones {
    async fn list_hosted_zones(&self, cursor: Option<String>) -> Result<Page<HostedZoneSummary>> {
        let page = self
            .client
            .list_hosted_zones()
            .set_marker(cursor)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "ListHostedZones", e))?;

        let zones = page
            .hosted_zones()
            .iter()
            .map(|zone| HostedZoneSummary {
                id: zone.id().to_string(),
                name: zone.name().to_string(),
                record_count: zone
                    .resource_record_set_count()
                    .and_then(|count| u64::try_from(count).ok())
                    .unwrap_or(0),
            })
            .collect();

        Ok(Page::from_truncated(
            zones,
            flag(page.is_truncated()),
            page.next_marker().map(str::to_string),
        ))
    }

    async fn get_hosted_zone(&self, zone_id: &str) -> Result<HostedZoneDetail> {
        let result = self
            .client
            .get_hosted_zone()
            .id(zone_id)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "GetHostedZone", e))?;

        let zone = result
            .hosted_zone()
            .ok_or_else(|| missing_field(SERVICE, "GetHostedZone", "HostedZone"))?;
        let name_servers = result
            .delegation_set()
            .map(|set| set.name_servers().to_vec())
            .unwrap_or_default();

        Ok(HostedZoneDetail {
            id: zone.id().to_string(),
            name: zone.name().to_string(),
            record_count: zone
                .resource_record_set_count()
                .and_then(|count| u64::try_from(count).ok())
                .unwrap_or(0),
            name_servers,
        })
    }

    async fn list_record_sets(
        &self,
        zone_id: &str,
        cursor: Option<RecordCursor>,
    ) -> Result<Page<RecordSet, RecordCursor>> {
        let mut request = self.client.list_resource_record_sets().hosted_zone_id(zone_id);
        if let Some(cursor) = cursor {
            request = request
                .start_record_name(cursor.name)
                .set_start_record_type(cursor.record_type.as_deref().map(RrType::from))
                .set_start_record_identifier(cursor.identifier);
        }
        let page = request
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "ListResourceRecordSets", e))?;

        let records = page.resource_record_sets().iter().map(record_from_sdk).collect();
        let next = page.next_record_name().map(|name| RecordCursor {
            name: name.to_string(),
            record_type: page.next_record_type().map(|t| t.as_str().to_string()),
            identifier: page.next_record_identifier().map(str::to_string),
        });

        Ok(Page::from_truncated(records, flag(page.is_truncated()), next))
    }

    async fn change_record_sets(&self, zone_id: &str, batch: &ChangeBatch) -> Result<ChangeInfo> {
        let changes = batch
            .changes
            .iter()
            .map(change_to_sdk)
            .collect::<Result<Vec<_>>>()?;
        let change_batch = SdkChangeBatch::builder()
            .set_changes(Some(changes))
            .set_comment(batch.comment.clone())
            .build()
            .map_err(|e| build_error("ChangeBatch", e))?;

        debug!(
            "[route53] submitting {} change(s) to {}",
            batch.changes.len(),
            zone_id
        );
        let result = self
            .client
            .change_resource_record_sets()
            .hosted_zone_id(zone_id)
            .change_batch(change_batch)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "ChangeResourceRecordSets", e))?;

        let info = result
            .change_info()
            .ok_or_else(|| missing_field(SERVICE, "ChangeResourceRecordSets", "ChangeInfo"))?;
        Ok(ChangeInfo {
            id: info.id().to_string(),
            status: info.status().as_str().to_string(),
        })
    }
}
