//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (ttl > 0, ports valid, addresses parse)
//! - Check that enabled features carry the settings they need
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("{field} must not be empty")]
    Empty { field: &'static str },
    #[error("registry.instances[{index}]: {reason}")]
    InvalidInstance { index: usize, reason: String },
}

/// Validate a parsed configuration.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.observability.metrics_enabled {
        check_address(&mut errors, "observability.metrics_address", &config.observability.metrics_address);
    }
    if config.admin.enabled {
        check_address(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "admin.api_key" });
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "timeouts.request_secs" });
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "timeouts.connect_secs" });
    }
    if config.cache.enabled && config.cache.ttl_secs == 0 {
        errors.push(ValidationError::NotPositive { field: "cache.ttl_secs" });
    }
    if config.registry.group.trim().is_empty() {
        errors.push(ValidationError::Empty { field: "registry.group" });
    }

    for (index, seed) in config.registry.instances.iter().enumerate() {
        if seed.service.trim().is_empty() {
            errors.push(ValidationError::InvalidInstance { index, reason: "service is empty".to_string() });
        } else if seed.service.contains('/') {
            errors.push(ValidationError::InvalidInstance { index, reason: "service contains '/'".to_string() });
        }
        if seed.host.trim().is_empty() {
            errors.push(ValidationError::InvalidInstance { index, reason: "host is empty".to_string() });
        }
        if seed.port == 0 {
            errors.push(ValidationError::InvalidInstance { index, reason: "port is zero".to_string() });
        }
    }

    if config.registration.enabled {
        if config.registration.service.trim().is_empty() {
            errors.push(ValidationError::Empty { field: "registration.service" });
        }
        if config.registration.port == 0 {
            errors.push(ValidationError::NotPositive { field: "registration.port" });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress { field, value: value.to_string() });
    }
}
