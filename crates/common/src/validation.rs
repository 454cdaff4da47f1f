//! Field validation for managed service records

use crate::types::{NewService, MIN_PORT};
use crate::{Error, Result};

const MAX_FIELD_LEN: usize = 255;
const MAX_DESCRIPTION_LEN: usize = 4096;

/// Validate every field of a new service.
pub fn validate_new(new: &NewService) -> Result<()> {
    validate_name(&new.name)?;
    validate_service_name(&new.service_name)?;
    validate_domain_name(&new.domain_name)?;
    validate_description(&new.description)?;
    validate_repo_url(&new.repo_url)?;
    validate_port(new.port)?;
    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    check_length("name", name)?;
    if name.trim().is_empty() {
        return Err(Error::validation("name", "must not be empty"));
    }
    Ok(())
}

/// Service names become a unit name and a path segment.
pub fn validate_service_name(service_name: &str) -> Result<()> {
    check_length("service_name", service_name)?;
    if service_name.is_empty() || service_name == "." || service_name == ".." {
        return Err(Error::validation("service_name", "must be a non-empty file name"));
    }
    if let Some(c) = service_name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@')))
    {
        return Err(Error::validation(
            "service_name",
            format!("character '{}' is not allowed", c),
        ));
    }
    Ok(())
}

pub fn validate_domain_name(domain_name: &str) -> Result<()> {
    check_length("domain_name", domain_name)?;
    if domain_name.is_empty() {
        return Err(Error::validation("domain_name", "must not be empty"));
    }
    for label in domain_name.split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(Error::validation(
                "domain_name",
                format!("'{}' is not a valid host name", domain_name),
            ));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::validation(
                "domain_name",
                format!("label '{}' may not start or end with '-'", label),
            ));
        }
        if !label
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(Error::validation(
                "domain_name",
                format!("label '{}' must be lowercase letters, digits or '-'", label),
            ));
        }
    }
    Ok(())
}

pub fn validate_description(description: &str) -> Result<()> {
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(Error::validation(
            "description",
            format!("must be at most {} characters", MAX_DESCRIPTION_LEN),
        ));
    }
    Ok(())
}

pub fn validate_repo_url(repo_url: &str) -> Result<()> {
    check_length("repo_url", repo_url)?;
    let url = url::Url::parse(repo_url)
        .map_err(|e| Error::validation("repo_url", e.to_string()))?;
    if url.cannot_be_a_base() {
        return Err(Error::validation("repo_url", "must be an absolute URL"));
    }
    Ok(())
}

pub fn validate_port(port: u16) -> Result<()> {
    if port < MIN_PORT {
        return Err(Error::validation(
            "port",
            format!("must be between {} and {}", MIN_PORT, u16::MAX),
        ));
    }
    Ok(())
}

fn check_length(field: &str, value: &str) -> Result<()> {
    if value.chars().count() > MAX_FIELD_LEN {
        return Err(Error::validation(
            field,
            format!("must be at most {} characters", MAX_FIELD_LEN),
        ));
    }
    Ok(())
}
