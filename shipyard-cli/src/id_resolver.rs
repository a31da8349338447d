//! Version resolver
//!
//! Versions are commit hashes; users can type any unambiguous prefix
//! instead of the full hash.

use anyhow::{Context, Result, anyhow};
use shipyard_client::ShipyardClient;

/// Resolve a version or prefix to a known version
///
/// # Errors
/// Returns an error if:
/// - No version matches the prefix
/// - Multiple versions match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_version(client: &ShipyardClient, id_or_prefix: &str) -> Result<String> {
    let list = client
        .list_versions()
        .await
        .context("Failed to fetch versions for ID resolution")?;

    match_version(&list.versions, id_or_prefix)
}

fn match_version(versions: &[String], id_or_prefix: &str) -> Result<String> {
    // An exact match wins even when it prefixes another version
    if versions.iter().any(|v| v == id_or_prefix) {
        return Ok(id_or_prefix.to_string());
    }

    let prefix = id_or_prefix.to_lowercase();
    let matches: Vec<_> = versions
        .iter()
        .filter(|v| v.to_lowercase().starts_with(&prefix))
        .collect();

    match matches.len() {
        0 => Err(anyhow!("No version found starting with '{}'", id_or_prefix)),
        1 => Ok(matches[0].clone()),
        _ => {
            let ids: Vec<&str> = matches.iter().map(|v| v.as_str()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple versions: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
