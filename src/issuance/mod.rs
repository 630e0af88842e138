//! DNS-validated certificate issuance through ACM and Route 53.

pub mod certificate;

pub use certificate::{
    Certificate, VALIDATION_TTL, ValidationSubmission, dedupe_validation_records,
    viewer_certificate,
};
