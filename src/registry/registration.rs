//! Registration of this gateway process.
//!
//! # Responsibilities
//! - Build the `ServiceInstance` this process registers as
//! - Tag it with the locally deployed version, read from a version file
//!
//! # Design Decisions
//! - Version tagging is put-if-absent: an explicit `version` in the
//!   configured metadata wins over the file
//! - A missing or unreadable version file degrades to an untagged
//!   registration with a warning

use std::path::Path;

use crate::config::RegistrationConfig;
use crate::registry::{RegistryError, ServiceInstance, VERSION_METADATA_KEY};

/// Build the registration for this process.
///
/// `fallback_host` is used when the config does not pin a host.
pub async fn build_registration(
    config: &RegistrationConfig,
    fallback_host: &str,
) -> Result<ServiceInstance, RegistryError> {
    if config.service.trim().is_empty() {
        return Err(RegistryError::InvalidRegistration(
            "registration.service must be set".to_string(),
        ));
    }

    let host = config
        .host
        .clone()
        .unwrap_or_else(|| fallback_host.to_string());
    let mut instance = ServiceInstance::new(config.service.clone(), host, config.port);
    instance.instance_id = uuid::Uuid::new_v4().to_string();
    instance.metadata.extend(config.metadata.clone());

    if let Some(path) = &config.version_file {
        match read_version_file(Path::new(path)).await {
            Ok(Some(version)) => {
                instance
                    .metadata
                    .entry(VERSION_METADATA_KEY.to_string())
                    .or_insert(version);
            }
            Ok(None) => {
                tracing::debug!(path = %path, "Version file is blank, registering without version tag");
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Failed to read version file, registering without version tag");
            }
        }
    }

    tracing::info!(instance = %instance, id = %instance.instance_id, "Registration prepared");
    Ok(instance)
}

/// Read a version identifier. Lines are concatenated and surrounding
/// whitespace trimmed; blank content yields `None`.
pub async fn read_version_file(path: &Path) -> std::io::Result<Option<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    let version: String = content.lines().collect::<Vec<_>>().join("");
    let version = version.trim();
    if version.is_empty() {
        Ok(None)
    } else {
        Ok(Some(version.to_string()))
    }
}
