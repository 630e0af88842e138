pub mod alias;
pub mod zone;

pub use alias::{AliasOutcome, AliasRecord, CLOUDFRONT_HOSTED_ZONE_ID};
pub use zone::HostedZone;
