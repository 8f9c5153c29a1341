//! Parsing of the comma separated startup lists.

use rustc_hash::FxHashSet;

use crate::error::ConfigError;
use crate::upstream::CustomDomain;

/// Split a comma separated list, trimming entries and dropping empty ones
/// and repeats. Order of first occurrence is kept.
pub fn split_list(raw: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_string()))
        .map(str::to_string)
        .collect()
}

/// Custom upstream servers from `--servers`.
pub fn parse_servers(raw: &str) -> Result<Vec<String>, ConfigError> {
    let servers = split_list(raw);
    if servers.is_empty() {
        return Err(ConfigError::EmptyList("servers"));
    }
    Ok(servers)
}

/// Custom domains from `--domains`. Each one names a resolver file, so
/// path separators and dot-only names are rejected.
pub fn parse_domains(raw: &str) -> Result<Vec<CustomDomain>, ConfigError> {
    let mut domains = Vec::new();
    for entry in split_list(raw) {
        let domain = CustomDomain::new(&entry);
        let name = domain.as_str();
        if name.is_empty() || name.contains('/') || name.trim_matches('.').is_empty() {
            return Err(ConfigError::InvalidDomain(entry));
        }
        if !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    if domains.is_empty() {
        return Err(ConfigError::EmptyList("domains"));
    }
    Ok(domains)
}
