use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

/// One domain or several, as written in the deployment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DomainList {
    One(String),
    Many(Vec<String>),
}

impl DomainList {
    pub fn names(&self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name.clone()],
            Self::Many(names) => names.clone(),
        }
    }
}

/// Lower-cased ASCII form of a domain name without the trailing dot.
pub fn normalize_domain(input: &str) -> Result<String> {
    let trimmed = input.trim().trim_end_matches('.');
    if trimmed.is_empty() {
        return Err(ProvisionError::invalid_input("domain name is required"));
    }
    let ascii = idna::domain_to_ascii(trimmed)
        .map_err(|err| ProvisionError::invalid_input(format!("invalid domain name: {err}")))?;
    Ok(ascii.to_lowercase())
}

/// Fully-qualified form with exactly one trailing dot, as Route 53 reports names.
pub fn fully_qualified(input: &str) -> String {
    format!("{}.", input.trim().trim_end_matches('.'))
}

/// Compares two record names ignoring case and the trailing dot.
pub fn same_name(left: &str, right: &str) -> bool {
    left.trim_end_matches('.')
        .eq_ignore_ascii_case(right.trim_end_matches('.'))
}

/// Prepends `label` to `parent`; an empty label yields the parent itself.
pub fn join_label(label: &str, parent: &str) -> String {
    let label = label.trim().trim_end_matches('.');
    let parent = parent.trim().trim_end_matches('.');
    if label.is_empty() {
        parent.to_string()
    } else {
        format!("{label}.{parent}")
    }
}

/// Last two labels of a hostname, used as the default hosted zone.
pub fn root_from_hostname(hostname: &str) -> String {
    let parts: Vec<&str> = hostname.trim_end_matches('.').split('.').collect();
    if parts.len() >= 2 {
        format!("{}.{}", parts[parts.len() - 2], parts[parts.len() - 1])
    } else {
        hostname.to_string()
    }
}

/// Label(s) of `hostname` below `zone`, or `None` when the hostname is the zone apex.
pub fn subdomain_label(hostname: &str, zone: &str) -> Result<Option<String>> {
    let hostname = normalize_domain(hostname)?;
    let zone = normalize_domain(zone)?;
    if hostname == zone {
        return Ok(None);
    }
    match hostname.strip_suffix(&format!(".{zone}")) {
        Some(label) => Ok(Some(label.to_string())),
        None => Err(ProvisionError::invalid_input(format!(
            "{hostname} is not inside zone {zone}"
        ))),
    }
}
