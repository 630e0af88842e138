use std::sync::Arc;

use log::{debug, info};

use super::cache::CachePolicy;
use super::origin::{DescribeOrigin, Origin};
use crate::core::paging::PagedLister;
use crate::core::types::{
    DistributionConfig, DistributionState, DistributionSummary, ViewerCertificate,
};
use crate::domain::same_name;
use crate::error::{ProvisionError, Result};
use crate::providers::DistributionApi;

const DEFAULT_PRICE_CLASS: &str = "PriceClass_All";

/// A CloudFront distribution and the concurrency token of its last read.
///
/// `update()` sends the in-memory configuration with the ETag returned by the
/// most recent `create()`, `get()` or `update()`. CloudFront rejects a stale
/// ETag, which surfaces as [`ProvisionError::Conflict`].
pub struct Distribution {
    api: Arc<dyn DistributionApi>,
    id: Option<String>,
    arn: Option<String>,
    domain_name: Option<String>,
    status: Option<String>,
    etag: Option<String>,
    config: Option<DistributionConfig>,
    comment: String,
    cache_policy: Option<CachePolicy>,
    price_class: String,
}

impl Distribution {
    pub fn new(api: Arc<dyn DistributionApi>) -> Self {
        Self {
            api,
            id: None,
            arn: None,
            domain_name: None,
            status: None,
            etag: None,
            config: None,
            comment: String::new(),
            cache_policy: None,
            price_class: DEFAULT_PRICE_CLASS.to_string(),
        }
    }

    /// Handle for an existing distribution; call `get()` before `update()`.
    pub fn with_id(api: Arc<dyn DistributionApi>, id: impl Into<String>) -> Self {
        let mut distribution = Self::new(api);
        distribution.id = Some(id.into());
        distribution
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    pub fn cache_policy(mut self, policy: Option<CachePolicy>) -> Self {
        self.cache_policy = policy;
        self
    }

    pub fn price_class(mut self, price_class: impl Into<String>) -> Self {
        self.price_class = price_class.into();
        self
    }

    fn apply(&mut self, state: DistributionState) {
        self.id = Some(state.id);
        self.arn = Some(state.arn);
        self.domain_name = Some(state.domain_name);
        self.status = Some(state.status);
        self.etag = state.etag;
        self.config = Some(state.config);
    }

    fn require_id(&self) -> Result<&str> {
        self.id
            .as_deref()
            .ok_or_else(|| ProvisionError::invalid_state("distribution has not been created"))
    }

    /// Creates the distribution with a default cache behavior bound to the
    /// first origin.
    pub async fn create(
        &mut self,
        origins: &[Origin],
        aliases: Vec<String>,
        certificate: Option<ViewerCertificate>,
    ) -> Result<()> {
        if let Some(id) = &self.id {
            return Err(ProvisionError::invalid_state(format!(
                "distribution {id} already exists"
            )));
        }
        let Some(primary) = origins.first() else {
            return Err(ProvisionError::invalid_input(
                "a distribution needs at least one origin",
            ));
        };
        if !aliases.is_empty() && certificate.is_none() {
            return Err(ProvisionError::invalid_input(
                "aliases require a viewer certificate",
            ));
        }

        let config = DistributionConfig {
            caller_reference: uuid::Uuid::new_v4().to_string(),
            comment: self.comment.clone(),
            enabled: true,
            price_class: self.price_class.clone(),
            origins: origins.iter().map(DescribeOrigin::describe).collect(),
            aliases,
            default_cache_behavior: primary.cache_behavior(self.cache_policy),
            viewer_certificate: certificate,
            live: Default::default(),
        };

        let state = self.api.create_distribution(&config).await?;
        info!(
            "[distribution] created {} ({}) for {:?}",
            state.id, state.domain_name, state.config.aliases
        );
        self.apply(state);
        Ok(())
    }

    /// Sends the current configuration as a full replacement.
    pub async fn update(&mut self) -> Result<()> {
        let id = self.require_id()?.to_string();
        let etag = self.etag.clone().ok_or_else(|| {
            ProvisionError::invalid_state(format!("distribution {id} has no concurrency token; call get() first"))
        })?;
        let config = self.config.as_ref().ok_or_else(|| {
            ProvisionError::invalid_state(format!("distribution {id} has no configuration loaded"))
        })?;

        let state = self.api.update_distribution(&id, &etag, config).await?;
        info!("[distribution] updated {id}");
        self.apply(state);
        Ok(())
    }

    pub async fn get(&mut self) -> Result<()> {
        let id = self.require_id()?.to_string();
        let state = self.api.get_distribution(&id).await?;
        debug!(
            "[distribution] {id} is {} (etag {:?})",
            state.status, state.etag
        );
        self.apply(state);
        Ok(())
    }

    /// Whether the distribution can be fetched; a handle without an id does
    /// not exist yet.
    pub async fn exists(&mut self) -> Result<bool> {
        if self.id.is_none() {
            return Ok(false);
        }
        match self.get().await {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub async fn list(api: Arc<dyn DistributionApi>) -> Result<Vec<DistributionSummary>> {
        PagedLister::new("distribution", move |cursor| {
            let api = api.clone();
            async move { api.list_distributions(cursor).await }
        })
        .collect_all()
        .await
    }

    /// First distribution in provider order serving `alias`.
    pub async fn find_by_alias(
        api: Arc<dyn DistributionApi>,
        alias: &str,
    ) -> Result<Option<DistributionSummary>> {
        PagedLister::new("distribution", move |cursor| {
            let api = api.clone();
            async move { api.list_distributions(cursor).await }
        })
        .find_first(|summary: &DistributionSummary| {
            summary.aliases.iter().any(|existing| same_name(existing, alias))
        })
        .await
    }

    fn config_mut(&mut self) -> Result<&mut DistributionConfig> {
        self.config
            .as_mut()
            .ok_or_else(|| ProvisionError::invalid_state("distribution configuration not loaded"))
    }

    /// Returns whether the configuration changed.
    ///
    /// Only the certificate ARN is compared. When the ARN changes, a protocol
    /// floor already set on the distribution is kept.
    pub fn set_viewer_certificate(&mut self, mut certificate: ViewerCertificate) -> Result<bool> {
        let config = self.config_mut()?;
        if let Some(current) = &config.viewer_certificate {
            if current.certificate_arn == certificate.certificate_arn {
                return Ok(false);
            }
            if !current.minimum_protocol_version.is_empty() {
                certificate.minimum_protocol_version = current.minimum_protocol_version.clone();
            }
        }
        config.viewer_certificate = Some(certificate);
        Ok(true)
    }

    /// Returns whether the configuration changed. Order is kept as given.
    pub fn set_aliases(&mut self, aliases: Vec<String>) -> Result<bool> {
        let config = self.config_mut()?;
        let same = config.aliases.len() == aliases.len()
            && aliases
                .iter()
                .all(|alias| config.aliases.iter().any(|existing| same_name(existing, alias)));
        if same {
            return Ok(false);
        }
        config.aliases = aliases;
        Ok(true)
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn arn(&self) -> Option<&str> {
        self.arn.as_deref()
    }

    /// `dXXXX.cloudfront.net`; known only once created or fetched.
    pub fn domain_name(&self) -> Option<&str> {
        self.domain_name.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_deployed(&self) -> bool {
        self.status.as_deref() == Some("Deployed")
    }

    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    pub fn config(&self) -> Option<&DistributionConfig> {
        self.config.as_ref()
    }

    pub fn aliases(&self) -> &[String] {
        self.config.as_ref().map(|c| c.aliases.as_slice()).unwrap_or_default()
    }
}
