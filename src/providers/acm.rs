use async_trait::async_trait;
use aws_sdk_acm::Client;
use aws_sdk_acm::types::{
    CertificateDetail as SdkCertificateDetail, CertificateStatus as SdkCertificateStatus,
    DomainValidation as SdkDomainValidation, ValidationMethod,
};
use chrono::{DateTime, Utc};
use log::debug;

use super::{CertificateApi, missing_field, sdk_error};
use crate::core::paging::Page;
use crate::core::types::{
    CertificateDetail, CertificateStatus, CertificateSummary, DomainValidation, ValidationRecord,
};
use crate::error::Result;

const SERVICE: &str = "acm";
/// ACM caps idempotency tokens at 32 characters.
const IDEMPOTENCY_TOKEN_LEN: usize = 32;

pub struct AcmCertificates {
    client: Client,
}

impl AcmCertificates {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn status_from_sdk(status: Option<&SdkCertificateStatus>) -> CertificateStatus {
    status
        .map(|s| CertificateStatus::from_provider(s.as_str()))
        .unwrap_or_default()
}

fn timestamp(value: Option<&aws_sdk_acm::primitives::DateTime>) -> Option<DateTime<Utc>> {
    value.and_then(|v| DateTime::from_timestamp(v.secs(), v.subsec_nanos()))
}

fn validation_from_sdk(option: &SdkDomainValidation) -> DomainValidation {
    DomainValidation {
        domain_name: option.domain_name().to_string(),
        record: option.resource_record().map(|record| ValidationRecord {
            name: record.name().to_string(),
            value: record.value().to_string(),
            record_type: record.r#type().as_str().to_string(),
        }),
    }
}

fn detail_from_sdk(arn: &str, detail: &SdkCertificateDetail) -> CertificateDetail {
    CertificateDetail {
        arn: detail.certificate_arn().unwrap_or(arn).to_string(),
        domain_name: detail.domain_name().unwrap_or_default().to_string(),
        alternative_names: detail.subject_alternative_names().to_vec(),
        status: status_from_sdk(detail.status()),
        validation: detail
            .domain_validation_options()
            .iter()
            .map(validation_from_sdk)
            .collect(),
    }
}

#[async_trait]
impl CertificateApi for AcmCertificates {
    async fn request_certificate(&self, primary: &str, alternatives: &[String]) -> Result<String> {
        let mut token = uuid::Uuid::new_v4().simple().to_string();
        token.truncate(IDEMPOTENCY_TOKEN_LEN);

        let result = self
            .client
            .request_certificate()
            .domain_name(primary)
            .set_subject_alternative_names(
                (!alternatives.is_empty()).then(|| alternatives.to_vec()),
            )
            .validation_method(ValidationMethod::Dns)
            .idempotency_token(token)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "RequestCertificate", e))?;

        let arn = result
            .certificate_arn()
            .ok_or_else(|| missing_field(SERVICE, "RequestCertificate", "CertificateArn"))?;
        debug!("[acm] requested {arn} for {primary}");
        Ok(arn.to_string())
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail> {
        let result = self
            .client
            .describe_certificate()
            .certificate_arn(arn)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "DescribeCertificate", e))?;

        let detail = result
            .certificate()
            .ok_or_else(|| missing_field(SERVICE, "DescribeCertificate", "Certificate"))?;
        Ok(detail_from_sdk(arn, detail))
    }

    async fn list_certificates(&self, cursor: Option<String>) -> Result<Page<CertificateSummary>> {
        let page = self
            .client
            .list_certificates()
            .set_next_token(cursor)
            .send()
            .await
            .map_err(|e| sdk_error(SERVICE, "ListCertificates", e))?;

        let certificates = page
            .certificate_summary_list()
            .iter()
            .filter_map(|summary| {
                Some(CertificateSummary {
                    arn: summary.certificate_arn()?.to_string(),
                    domain_name: summary.domain_name().unwrap_or_default().to_string(),
                    status: status_from_sdk(summary.status()),
                    created_at: timestamp(summary.created_at()),
                })
            })
            .collect();

        // ListCertificates has no truncation flag; the token alone signals more.
        Ok(Page::new(certificates, page.next_token().map(str::to_string)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_acm::types::{RecordType, ResourceRecord};

    #[test]
    fn pending_detail_keeps_missing_validation_records() {
        let ready = SdkDomainValidation::builder()
            .domain_name("cdn.example.com")
            .resource_record(
                ResourceRecord::builder()
                    .name("_a1.cdn.example.com.")
                    .r#type(RecordType::Cname)
                    .value("_b2.acm-validations.aws.")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap();
        let waiting = SdkDomainValidation::builder()
            .domain_name("www.example.com")
            .build()
            .unwrap();
        let detail = SdkCertificateDetail::builder()
            .domain_name("cdn.example.com")
            .subject_alternative_names("www.example.com")
            .status(SdkCertificateStatus::PendingValidation)
            .domain_validation_options(ready)
            .domain_validation_options(waiting)
            .build();

        let converted = detail_from_sdk("arn:aws:acm:us-east-1:1:certificate/x", &detail);

        assert_eq!(converted.arn, "arn:aws:acm:us-east-1:1:certificate/x");
        assert_eq!(converted.status, CertificateStatus::PendingValidation);
        assert_eq!(converted.alternative_names, vec!["www.example.com"]);
        let record = converted.validation[0].record.as_ref().unwrap();
        assert_eq!(record.record_type, "CNAME");
        assert!(converted.validation[1].record.is_none());
    }
}
