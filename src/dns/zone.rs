use std::sync::Arc;

use log::{debug, info};

use crate::core::paging::PagedLister;
use crate::core::types::{
    Change, ChangeBatch, ChangeInfo, HostedZoneDetail, HostedZoneSummary, RecordSet,
};
use crate::domain::{fully_qualified, join_label};
use crate::error::{ProvisionError, Result};
use crate::providers::DnsApi;

/// A Route 53 hosted zone, or a name inside one.
///
/// Handles from [`HostedZone::get_subdomain`] keep the parent's identifier:
/// records for `label.zone` are written to the parent zone.
#[derive(Clone)]
pub struct HostedZone {
    dns: Arc<dyn DnsApi>,
    id: String,
    zone_name: String,
    name: String,
    record_count: u64,
    name_servers: Vec<String>,
}

impl std::fmt::Debug for HostedZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedZone")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("record_count", &self.record_count)
            .finish()
    }
}

impl HostedZone {
    pub fn new(dns: Arc<dyn DnsApi>, id: impl Into<String>, name: &str) -> Self {
        let name = fully_qualified(name);
        Self {
            dns,
            id: id.into(),
            zone_name: name.clone(),
            name,
            record_count: 0,
            name_servers: Vec::new(),
        }
    }

    fn from_summary(dns: Arc<dyn DnsApi>, summary: HostedZoneSummary) -> Self {
        let mut zone = Self::new(dns, summary.id, &summary.name);
        zone.record_count = summary.record_count;
        zone
    }

    /// First zone, in provider order, whose name starts with `prefix`.
    ///
    /// Route 53 names carry a trailing dot, so `example.com` matches both
    /// `example.com.` and `example.com.au.`; whichever is listed first wins.
    pub async fn find(dns: Arc<dyn DnsApi>, prefix: &str) -> Result<Option<Self>> {
        let lister = PagedLister::new("hosted zone", {
            let dns = dns.clone();
            move |cursor| {
                let dns = dns.clone();
                async move { dns.list_hosted_zones(cursor).await }
            }
        });

        match lister
            .find_first(|zone: &HostedZoneSummary| zone.name.starts_with(prefix))
            .await
        {
            Ok(Some(summary)) => {
                debug!("[zone] {prefix} resolved to {} ({})", summary.name, summary.id);
                Ok(Some(Self::from_summary(dns, summary)))
            }
            Ok(None) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Every hosted zone visible to the caller's credentials.
    pub async fn list(dns: Arc<dyn DnsApi>) -> Result<Vec<Self>> {
        let summaries = PagedLister::new("hosted zone", {
            let dns = dns.clone();
            move |cursor| {
                let dns = dns.clone();
                async move { dns.list_hosted_zones(cursor).await }
            }
        })
        .collect_all()
        .await?;

        Ok(summaries
            .into_iter()
            .map(|summary| Self::from_summary(dns.clone(), summary))
            .collect())
    }

    /// Refreshes name, record count and delegated name servers.
    pub async fn get(&mut self) -> Result<()> {
        let HostedZoneDetail {
            name,
            record_count,
            name_servers,
            ..
        } = self.dns.get_hosted_zone(&self.id).await?;

        let name = fully_qualified(&name);
        if self.name == self.zone_name {
            self.name = name.clone();
        }
        self.zone_name = name;
        self.record_count = record_count;
        self.name_servers = name_servers;
        Ok(())
    }

    pub async fn get_records(&self) -> Result<Vec<RecordSet>> {
        let dns = self.dns.clone();
        let zone_id = self.id.clone();
        PagedLister::new("record set", move |cursor| {
            let dns = dns.clone();
            let zone_id = zone_id.clone();
            async move { dns.list_record_sets(&zone_id, cursor).await }
        })
        .collect_all()
        .await
    }

    /// Submits `changes` as one atomic batch.
    pub async fn submit_change(&self, changes: Vec<Change>, comment: Option<&str>) -> Result<ChangeInfo> {
        if changes.is_empty() {
            return Err(ProvisionError::invalid_input(format!(
                "no record changes to submit to {}",
                self.zone_name
            )));
        }
        let count = changes.len();
        let batch = ChangeBatch {
            comment: comment.map(str::to_string),
            changes,
        };
        let info = self.dns.change_record_sets(&self.id, &batch).await?;
        info!(
            "[zone] submitted {count} change(s) to {} ({}), change {} is {}",
            self.zone_name, self.id, info.id, info.status
        );
        Ok(info)
    }

    /// Handle for `label.<this name>` inside the same zone.
    pub fn get_subdomain(&self, label: &str) -> Self {
        let mut subdomain = self.clone();
        subdomain.name = fully_qualified(&join_label(label, &self.name));
        subdomain
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Name without the trailing dot.
    pub fn name(&self) -> &str {
        self.name.trim_end_matches('.')
    }

    pub fn fqdn(&self) -> &str {
        &self.name
    }

    /// Name of the hosted zone itself, which differs from `name` for
    /// subdomain handles.
    pub fn zone_name(&self) -> &str {
        self.zone_name.trim_end_matches('.')
    }

    pub fn is_subdomain(&self) -> bool {
        self.name != self.zone_name
    }

    pub fn record_count(&self) -> u64 {
        self.record_count
    }

    pub fn name_servers(&self) -> &[String] {
        &self.name_servers
    }
}
