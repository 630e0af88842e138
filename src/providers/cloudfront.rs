use async_trait::async_trait;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::types::{
    Aliases, AllowedMethods, CachedMethods, CustomHeaders, CustomOriginConfig,
    DefaultCacheBehavior, Distribution as SdkDistribution,
    DistributionConfig as SdkDistributionConfig, Method, MinimumProtocolVersion, Origin,
    OriginCustomHeader, OriginProtocolPolicy, OriginSslProtocols, Origins, PriceClass,
    S3OriginConfig, SslProtocol, SslSupportMethod, ViewerCertificate as SdkViewerCertificate,
    ViewerProtocolPolicy,
};
use log::debug;

use super::{DistributionApi, flag, missing_field, sdk_error};
use crate::core::paging::Page;
use crate::core::types::{
    CacheBehavior, CustomOriginSettings, DistributionConfig, DistributionState,
    DistributionSummary, LiveConfig, OriginHeader, OriginSpec, OriginTransport,
    ViewerCertificate,
};
use crate::error::{ProvisionError, Result};

const SERVICE: &str = "cloudfront";

pub struct CloudFrontDistributions {
    client: Client,
}

impl CloudFrontDistributions {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn build_error(what: &str, err: impl std::fmt::Display) -> ProvisionError {
    ProvisionError::invalid_input(format!("failed to build CloudFront {what}: {err}"))
}

fn quantity(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

fn number(value: impl Into<Option<i32>>) -> Option<i32> {
    value.into()
}

fn methods(items: &[String]) -> Vec<Method> {
    items.iter().map(|m| Method::from(m.as_str())).collect()
}

fn method_names(items: &[Method]) -> Vec<String> {
    items.iter().map(|m| m.as_str().to_string()).collect()
}

fn origin_to_sdk(spec: &OriginSpec) -> Result<Origin> {
    let headers = spec
        .custom_headers
        .iter()
        .map(|header| {
            OriginCustomHeader::builder()
                .header_name(&header.name)
                .header_value(&header.value)
                .build()
                .map_err(|e| build_error("OriginCustomHeader", e))
        })
        .collect::<Result<Vec<_>>>()?;
    let custom_headers = CustomHeaders::builder()
        .quantity(quantity(headers.len()))
        .set_items(Some(headers))
        .build()
        .map_err(|e| build_error("CustomHeaders", e))?;

    let mut builder = Origin::builder()
        .id(&spec.id)
        .domain_name(&spec.domain_name)
        .origin_path(&spec.origin_path)
        .custom_headers(custom_headers);

    builder = match &spec.transport {
        OriginTransport::Custom(settings) => {
            let protocols = settings
                .ssl_protocols
                .iter()
                .map(|p| SslProtocol::from(p.as_str()))
                .collect::<Vec<_>>();
            let ssl_protocols = OriginSslProtocols::builder()
                .quantity(quantity(protocols.len()))
                .set_items(Some(protocols))
                .build()
                .map_err(|e| build_error("OriginSslProtocols", e))?;
            let config = CustomOriginConfig::builder()
                .http_port(i32::from(settings.http_port))
                .https_port(i32::from(settings.https_port))
                .origin_protocol_policy(OriginProtocolPolicy::from(
                    settings.protocol_policy.as_str(),
                ))
                .origin_ssl_protocols(ssl_protocols)
                .origin_read_timeout(i32::try_from(settings.read_timeout_secs).unwrap_or(i32::MAX))
                .origin_keepalive_timeout(
                    i32::try_from(settings.keepalive_timeout_secs).unwrap_or(i32::MAX),
                )
                .build()
                .map_err(|e| build_error("CustomOriginConfig", e))?;
            builder.custom_origin_config(config)
        }
        OriginTransport::Storage {
            origin_access_identity,
        } => {
            let config = S3OriginConfig::builder()
                .origin_access_identity(origin_access_identity)
                .build();
            builder.s3_origin_config(config)
        }
    };

    builder.build().map_err(|e| build_error("Origin", e))
}

fn cache_behavior_to_sdk(behavior: &CacheBehavior) -> Result<DefaultCacheBehavior> {
    let allowed = methods(&behavior.allowed_methods);
    let cached = methods(&behavior.cached_methods);
    let cached_methods = CachedMethods::builder()
        .quantity(quantity(cached.len()))
        .set_items(Some(cached))
        .build()
        .map_err(|e| build_error("CachedMethods", e))?;
    let allowed_methods = AllowedMethods::builder()
        .quantity(quantity(allowed.len()))
        .set_items(Some(allowed))
        .cached_methods(cached_methods)
        .build()
        .map_err(|e| build_error("AllowedMethods", e))?;

    DefaultCacheBehavior::builder()
        .target_origin_id(&behavior.target_origin_id)
        .viewer_protocol_policy(ViewerProtocolPolicy::from(
            behavior.viewer_protocol_policy.as_str(),
        ))
        .allowed_methods(allowed_methods)
        .cache_policy_id(&behavior.cache_policy_id)
        .set_origin_request_policy_id(behavior.origin_request_policy_id.clone())
        .build()
        .map_err(|e| build_error("DefaultCacheBehavior", e))
}

fn viewer_certificate_to_sdk(certificate: Option<&ViewerCertificate>) -> SdkViewerCertificate {
    match certificate {
        Some(cert) => SdkViewerCertificate::builder()
            .cloud_front_default_certificate(false)
            .acm_certificate_arn(&cert.certificate_arn)
            .minimum_protocol_version(MinimumProtocolVersion::from(
                cert.minimum_protocol_version.as_str(),
            ))
            .ssl_support_method(SslSupportMethod::from(cert.ssl_support_method.as_str()))
            .build(),
        None => SdkViewerCertificate::builder()
            .cloud_front_default_certificate(true)
            .build(),
    }
}

fn aliases_to_sdk(aliases: &[String]) -> Result<Aliases> {
    Aliases::builder()
        .quantity(quantity(aliases.len()))
        .set_items(Some(aliases.to_vec()))
        .build()
        .map_err(|e| build_error("Aliases", e))
}

/// Config to send for `config`. A config read back from CloudFront is
/// patched in place, so only aliases and the viewer certificate change.
fn config_to_sdk(config: &DistributionConfig) -> Result<SdkDistributionConfig> {
    if let Some(live) = config.live.get::<SdkDistributionConfig>() {
        let mut patched = live.clone();
        patched.aliases = Some(aliases_to_sdk(&config.aliases)?);
        patched.viewer_certificate =
            Some(viewer_certificate_to_sdk(config.viewer_certificate.as_ref()));
        return Ok(patched);
    }
    build_config(config)
}

fn build_config(config: &DistributionConfig) -> Result<SdkDistributionConfig> {
    let origins = config
        .origins
        .iter()
        .map(origin_to_sdk)
        .collect::<Result<Vec<_>>>()?;
    let origins = Origins::builder()
        .quantity(quantity(origins.len()))
        .set_items(Some(origins))
        .build()
        .map_err(|e| build_error("Origins", e))?;

    SdkDistributionConfig::builder()
        .caller_reference(&config.caller_reference)
        .comment(&config.comment)
        .enabled(config.enabled)
        .price_class(PriceClass::from(config.price_class.as_str()))
        .origins(origins)
        .aliases(aliases_to_sdk(&config.aliases)?)
        .default_cache_behavior(cache_behavior_to_sdk(&config.default_cache_behavior)?)
        .viewer_certificate(viewer_certificate_to_sdk(config.viewer_certificate.as_ref()))
        .build()
        .map_err(|e| build_error("DistributionConfig", e))
}

fn origin_from_sdk(origin: &Origin) -> OriginSpec {
    let custom_headers = origin
        .custom_headers()
        .map(|headers| {
            headers
                .items()
                .iter()
                .map(|h| OriginHeader {
                    name: h.header_name().to_string(),
                    value: h.header_value().to_string(),
                })
                .collect()
        })
        .unwrap_or_default();

    let transport = match origin.custom_origin_config() {
        Some(custom) => OriginTransport::Custom(CustomOriginSettings {
            http_port: number(custom.http_port())
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(80),
            https_port: number(custom.https_port())
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(443),
            protocol_policy: custom.origin_protocol_policy().as_str().to_string(),
            ssl_protocols: custom
                .origin_ssl_protocols()
                .map(|p| p.items().iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
            read_timeout_secs: number(custom.origin_read_timeout())
                .and_then(|t| u32::try_from(t).ok())
                .unwrap_or(30),
            keepalive_timeout_secs: number(custom.origin_keepalive_timeout())
                .and_then(|t| u32::try_from(t).ok())
                .unwrap_or(5),
        }),
        None => OriginTransport::Storage {
            origin_access_identity: origin
                .s3_origin_config()
                .map(|s3| s3.origin_access_identity().to_string())
                .unwrap_or_default(),
        },
    };

    OriginSpec {
        id: origin.id().to_string(),
        domain_name: origin.domain_name().to_string(),
        origin_path: origin.origin_path().unwrap_or_default().to_string(),
        custom_headers,
        transport,
    }
}

fn cache_behavior_from_sdk(behavior: Option<&DefaultCacheBehavior>) -> CacheBehavior {
    let Some(behavior) = behavior else {
        return CacheBehavior {
            target_origin_id: String::new(),
            viewer_protocol_policy: String::new(),
            allowed_methods: Vec::new(),
            cached_methods: Vec::new(),
            cache_policy_id: String::new(),
            origin_request_policy_id: None,
        };
    };
    let allowed = behavior.allowed_methods();
    CacheBehavior {
        target_origin_id: behavior.target_origin_id().to_string(),
        viewer_protocol_policy: behavior.viewer_protocol_policy().as_str().to_string(),
        allowed_methods: allowed.map(|a| method_names(a.items())).unwrap_or_default(),
        cached_methods: allowed
            .and_then(|a| a.cached_methods())
            .map(|c| method_names(c.items()))
            .unwrap_or_default(),
        cache_policy_id: behavior.cache_policy_id().unwrap_or_default().to_string(),
        origin_request_policy_id: behavior.origin_request_policy_id().map(str::to_string),
    }
}

/// Reads back the fields this crate manages and keeps the whole SDK config
/// in `live` for the next update.
fn config_from_sdk(config: &SdkDistributionConfig) -> DistributionConfig {
    let viewer_certificate = config.viewer_certificate().and_then(|cert| {
        Some(ViewerCertificate {
            certificate_arn: cert.acm_certificate_arn()?.to_string(),
            minimum_protocol_version: cert
                .minimum_protocol_version()
                .map(|v| v.as_str().to_string())
                .unwrap_or_default(),
            ssl_support_method: cert
                .ssl_support_method()
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
        })
    });

    DistributionConfig {
        caller_reference: config.caller_reference().to_string(),
        comment: config.comment().to_string(),
        enabled: flag(config.enabled()),
        price_class: config
            .price_class()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default(),
        origins: config
            .origins()
            .map(|o| o.items().iter().map(origin_from_sdk).collect())
            .unwrap_or_default(),
        aliases: config
            .aliases()
            .map(|a| a.items().to_vec())
            .unwrap_or_default(),
        default_cache_behavior: cache_behavior_from_sdk(config.default_cache_behavior()),
        viewer_certificate,
        live: LiveConfig::new(config.clone()),
    }
}

fn state_from_sdk(
    operation: &'static str,
    distribution: Option<&SdkDistribution>,
    etag: Option<&str>,
) -> Result<DistributionState> {
    let distribution =
        distribution.ok_or_else(|| missing_field(SERVICE, operation, "Distribution"))?;
    let config = distribution
        .distribution_config()
        .ok_or_else(|| missing_field(SERVICE, operation, "DistributionConfig"))?;

    Ok(DistributionState {
        id: distribution.id().to_string(),
        arn: distribution.arn().to_string(),
        domain_name: distribution.domain_name().to_string(),
        status: distribution.status().to_string(),
        etag: etag.map(str::to_string),
        config: config_from_sdk(config),
    })
}

#[async_trait]
impl DistributionApi for CloudFrontDistributions {
    async fn list_distributions(&self, cursor: Option<String>) -> Result<Page<DistributionSummary>> {
        let result = self
            .client
            .list_distributions()
            .set_marker(cursor)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "ListDistributions", e))?;

        let Some(list) = result.distribution_list() else {
            return Ok(Page::last(Vec::new()));
        };
        let distributions = list
            .items()
            .iter()
            .map(|summary| DistributionSummary {
                id: summary.id().to_string(),
                arn: summary.arn().to_string(),
                domain_name: summary.domain_name().to_string(),
                status: summary.status().to_string(),
                aliases: summary
                    .aliases()
                    .map(|a| a.items().to_vec())
                    .unwrap_or_default(),
            })
            .collect();

        Ok(Page::from_truncated(
            distributions,
            flag(list.is_truncated()),
            list.next_marker().map(str::to_string),
        ))
    }

    async fn create_distribution(&self, config: &DistributionConfig) -> Result<DistributionState> {
        let sdk_config = config_to_sdk(config)?;
        debug!(
            "[cloudfront] creating distribution {} with {} origin(s)",
            config.caller_reference,
            config.origins.len()
        );
        let result = self
            .client
            .create_distribution()
            .distribution_config(sdk_config)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "CreateDistribution", e))?;

        state_from_sdk("CreateDistribution", result.distribution(), result.e_tag())
    }

    async fn get_distribution(&self, id: &str) -> Result<DistributionState> {
        let result = self
            .client
            .get_distribution()
            .id(id)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "GetDistribution", e))?;

        state_from_sdk("GetDistribution", result.distribution(), result.e_tag())
    }

    async fn update_distribution(
        &self,
        id: &str,
        etag: &str,
        config: &DistributionConfig,
    ) -> Result<DistributionState> {
        let sdk_config = config_to_sdk(config)?;
        let result = self
            .client
            .update_distribution()
            .id(id)
            .if_match(etag)
            .distribution_config(sdk_config)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "UpdateDistribution", e))?;

        state_from_sdk("UpdateDistribution", result.distribution(), result.e_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> DistributionConfig {
        DistributionConfig {
            caller_reference: "ref-1".into(),
            comment: "edge".into(),
            enabled: true,
            price_class: "PriceClass_All".into(),
            origins: vec![OriginSpec {
                id: "api".into(),
                domain_name: "abc.lambda-url.us-east-1.on.aws".into(),
                origin_path: String::new(),
                custom_headers: vec![OriginHeader {
                    name: "X-Origin-Token".into(),
                    value: "secret".into(),
                }],
                transport: OriginTransport::Custom(CustomOriginSettings {
                    http_port: 80,
                    https_port: 443,
                    protocol_policy: "https-only".into(),
                    ssl_protocols: vec!["TLSv1.2".into()],
                    read_timeout_secs: 30,
                    keepalive_timeout_secs: 10,
                }),
            }],
            aliases: vec!["cdn.example.com".into()],
            default_cache_behavior: CacheBehavior {
                target_origin_id: "api".into(),
                viewer_protocol_policy: "redirect-to-https".into(),
                allowed_methods: vec!["GET".into(), "HEAD".into()],
                cached_methods: vec!["GET".into(), "HEAD".into()],
                cache_policy_id: "4135ea2d-6df8-44a3-9df3-4b5a84be39ad".into(),
                origin_request_policy_id: None,
            },
            viewer_certificate: Some(ViewerCertificate {
                certificate_arn: "arn:aws:acm:us-east-1:1:certificate/x".into(),
                minimum_protocol_version: "TLSv1.1_2016".into(),
                ssl_support_method: "sni-only".into(),
            }),
            live: LiveConfig::default(),
        }
    }

    #[test]
    fn managed_fields_survive_sdk_conversion() {
        let config = sample_config();
        let sdk = config_to_sdk(&config).unwrap();

        let origins = sdk.origins().unwrap();
        assert_eq!(number(origins.quantity()), Some(1));
        let aliases = sdk.aliases().unwrap();
        assert_eq!(aliases.items().to_vec(), vec!["cdn.example.com".to_string()]);

        let mut read = config_from_sdk(&sdk);
        assert!(!read.live.is_empty());
        read.live = LiveConfig::default();
        assert_eq!(read, config);
    }

    #[test]
    fn update_keeps_settings_made_outside_this_crate() {
        let behavior = aws_sdk_cloudfront::types::CacheBehavior::builder()
            .path_pattern("/static/*")
            .target_origin_id("api")
            .viewer_protocol_policy(ViewerProtocolPolicy::HttpsOnly)
            .cache_policy_id("658327ea-f89d-4fab-a63d-7e88639e58f6")
            .build()
            .unwrap();
        let mut live = config_to_sdk(&sample_config()).unwrap();
        live.web_acl_id = Some("arn:aws:wafv2:us-east-1:1:global/webacl/edge/abc".into());
        live.cache_behaviors = Some(
            aws_sdk_cloudfront::types::CacheBehaviors::builder()
                .quantity(1)
                .items(behavior)
                .build()
                .unwrap(),
        );

        let mut config = config_from_sdk(&live);
        config.aliases.push("static.example.com".into());
        config.viewer_certificate = Some(ViewerCertificate {
            certificate_arn: "arn:aws:acm:us-east-1:1:certificate/y".into(),
            minimum_protocol_version: "TLSv1.2_2021".into(),
            ssl_support_method: "sni-only".into(),
        });
        let sent = config_to_sdk(&config).unwrap();

        assert_eq!(sent.web_acl_id(), live.web_acl_id());
        assert_eq!(sent.cache_behaviors(), live.cache_behaviors());
        assert_eq!(
            sent.aliases().unwrap().items().to_vec(),
            vec!["cdn.example.com".to_string(), "static.example.com".to_string()]
        );
        assert_eq!(
            sent.viewer_certificate().and_then(|v| v.acm_certificate_arn()),
            Some("arn:aws:acm:us-east-1:1:certificate/y")
        );
    }

    #[test]
    fn missing_certificate_falls_back_to_default_certificate() {
        let sdk = viewer_certificate_to_sdk(None);
        assert_eq!(sdk.cloud_front_default_certificate(), Some(true));
        assert!(sdk.acm_certificate_arn().is_none());
    }
}
