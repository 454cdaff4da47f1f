//! Core types for multiserver

use crate::lifecycle::ServiceState;
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a managed service
pub type ServiceId = i64;

/// Lowest port a managed service may bind
pub const MIN_PORT: u16 = 1024;

/// A service provisioned and controlled by the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedService {
    pub id: ServiceId,
    pub name: String,
    /// systemd unit identifier; also names the unit file and the checkout
    pub service_name: String,
    /// nginx site identifier; also names the site config file
    pub domain_name: String,
    #[serde(default)]
    pub description: String,
    pub repo_url: String,
    pub port: u16,
    pub state: ServiceState,
    pub created_at: i64,
    pub updated_at: i64,
    pub applied_at: Option<i64>,
}

impl ManagedService {
    /// systemd unit name passed to `systemctl restart`
    pub fn unit_name(&self) -> String {
        format!("{}.service", self.service_name)
    }

    /// File name of the site config in nginx's directories
    pub fn site_file_name(&self) -> String {
        format!("{}.conf", self.domain_name)
    }

    /// Stamp `applied_at`, never moving it backwards.
    pub fn stamp_applied(&mut self, now: i64) {
        let stamp = match self.applied_at {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        self.applied_at = Some(stamp);
    }
}

impl std::fmt::Display for ManagedService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Input for creating a managed service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewService {
    pub name: String,
    pub service_name: String,
    pub domain_name: String,
    #[serde(default)]
    pub description: String,
    pub repo_url: String,
    pub port: u16,
    /// Contents of the systemd unit file
    pub systemd_unit: String,
    /// Contents of the nginx site config
    pub nginx_config: String,
}

/// Partial update of a managed service; `None` leaves a field unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceUpdate {
    pub name: Option<String>,
    pub service_name: Option<String>,
    pub domain_name: Option<String>,
    pub description: Option<String>,
    pub repo_url: Option<String>,
    pub port: Option<u16>,
    pub systemd_unit: Option<String>,
    pub nginx_config: Option<String>,
}

impl ServiceUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.service_name.is_none()
            && self.domain_name.is_none()
            && self.description.is_none()
            && self.repo_url.is_none()
            && self.port.is_none()
            && self.systemd_unit.is_none()
            && self.nginx_config.is_none()
    }
}

/// A service together with its stored artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceDetail {
    #[serde(flatten)]
    pub service: ManagedService,
    pub systemd_unit: Option<String>,
    pub nginx_config: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ManagedService {
        ManagedService {
            id: 1,
            name: "Blog".to_string(),
            service_name: "blog".to_string(),
            domain_name: "blog.example.com".to_string(),
            description: String::new(),
            repo_url: "https://example.com/blog.git".to_string(),
            port: 8001,
            state: ServiceState::default(),
            created_at: 100,
            updated_at: 100,
            applied_at: None,
        }
    }

    #[test]
    fn test_derived_names() {
        let svc = sample();
        assert_eq!(svc.unit_name(), "blog.service");
        assert_eq!(svc.site_file_name(), "blog.example.com.conf");
        assert_eq!(svc.to_string(), "Blog");
    }

    #[test]
    fn test_stamp_applied_is_monotonic() {
        let mut svc = sample();
        svc.stamp_applied(200);
        assert_eq!(svc.applied_at, Some(200));
        svc.stamp_applied(150);
        assert_eq!(svc.applied_at, Some(200));
        svc.stamp_applied(300);
        assert_eq!(svc.applied_at, Some(300));
    }

    #[test]
    fn test_state_serializes_as_names() {
        let json = serde_json::to_value(sample()).unwrap();
        assert_eq!(json["state"]["init"], "uninitialized");
        assert_eq!(json["state"]["systemd"], "pending");
        assert_eq!(json["state"]["site"], "disabled");
    }

    #[test]
    fn test_empty_update() {
        assert!(ServiceUpdate::default().is_empty());
        let update = ServiceUpdate {
            port: Some(9000),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
