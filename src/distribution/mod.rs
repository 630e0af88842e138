//! CloudFront distribution provisioning: origins, named cache policies and
//! the distribution itself.

pub mod cache;
pub mod origin;
pub mod provisioner;

pub use cache::{CachePolicy, CacheSetting};
pub use origin::{ComputeOrigin, DescribeOrigin, Origin, StorageOrigin};
pub use provisioner::Distribution;

use crate::domain::DomainList;

/// Alias list for a distribution: no domain gives no alias, one domain one
/// alias, and every domain of a list is kept in order.
pub fn build_aliases(domains: Option<&DomainList>) -> Vec<String> {
    match domains {
        None => Vec::new(),
        Some(DomainList::One(name)) => vec![name.clone()],
        Some(DomainList::Many(names)) => names.clone(),
    }
}
