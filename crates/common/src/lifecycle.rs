//! Lifecycle state of a managed service
//!
//! Each concern (checkout, systemd unit, nginx site config, site activation)
//! carries its own two-valued state. [`ServiceState::transition`] is the
//! single transition table every lifecycle operation goes through.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the initial provisioning sequence has run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitState {
    #[default]
    Uninitialized,
    Initialized,
}

/// Whether the stored unit file has been loaded and the unit restarted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemdState {
    #[default]
    Pending,
    Applied,
}

/// Whether nginx has been reloaded with the stored site config
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NginxState {
    #[default]
    Pending,
    Applied,
}

/// Whether the site is linked into nginx's enabled directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteState {
    #[default]
    Disabled,
    Enabled,
}

/// Combined lifecycle state of one managed service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServiceState {
    pub init: InitState,
    pub systemd: SystemdState,
    pub nginx: NginxState,
    pub site: SiteState,
}

/// Operations that move a service between states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Initialize,
    ApplySystemd,
    ApplyNginx,
    Enable,
    Disable,
    ResetSystemd,
    ResetNginx,
}

impl Action {
    /// Actions that only make sense once the service has been initialized.
    pub fn requires_initialized(self) -> bool {
        matches!(
            self,
            Action::ApplySystemd | Action::ApplyNginx | Action::Enable | Action::Disable
        )
    }

    /// Actions that stamp `applied_at` when they perform work.
    pub fn stamps_applied_at(self) -> bool {
        matches!(self, Action::ApplySystemd | Action::ApplyNginx)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Initialize => "initialize",
            Action::ApplySystemd => "apply-systemd",
            Action::ApplyNginx => "apply-nginx",
            Action::Enable => "enable",
            Action::Disable => "disable",
            Action::ResetSystemd => "reset-systemd",
            Action::ResetNginx => "reset-nginx",
        };
        f.write_str(name)
    }
}

/// Result of looking an action up in the transition table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The service is already in the target state; nothing to do.
    Unchanged,
    /// Perform the action's side effects, then move to this state.
    Next(ServiceState),
}

impl ServiceState {
    /// Build from the four persisted flags.
    pub fn from_flags(initialized: bool, systemd_applied: bool, nginx_applied: bool, enabled: bool) -> Self {
        Self {
            init: if initialized { InitState::Initialized } else { InitState::Uninitialized },
            systemd: if systemd_applied { SystemdState::Applied } else { SystemdState::Pending },
            nginx: if nginx_applied { NginxState::Applied } else { NginxState::Pending },
            site: if enabled { SiteState::Enabled } else { SiteState::Disabled },
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.init == InitState::Initialized
    }

    pub fn is_systemd_applied(&self) -> bool {
        self.systemd == SystemdState::Applied
    }

    pub fn is_nginx_applied(&self) -> bool {
        self.nginx == NginxState::Applied
    }

    pub fn is_enabled(&self) -> bool {
        self.site == SiteState::Enabled
    }

    /// Look up `action` in the transition table.
    ///
    /// Returns [`Error::InvalidStateTransition`] when the action needs an
    /// initialized service and this one is not. Callers that want to cascade
    /// into initialization check [`Action::requires_initialized`] first.
    pub fn transition(self, action: Action) -> Result<Transition> {
        if action.requires_initialized() && !self.is_initialized() {
            return Err(Error::InvalidStateTransition {
                from: self.to_string(),
                to: action.to_string(),
            });
        }

        let mut next = self;
        match action {
            Action::Initialize => next.init = InitState::Initialized,
            Action::ApplySystemd => next.systemd = SystemdState::Applied,
            Action::ApplyNginx => next.nginx = NginxState::Applied,
            Action::Enable => next.site = SiteState::Enabled,
            Action::Disable => next.site = SiteState::Disabled,
            Action::ResetSystemd => next.systemd = SystemdState::Pending,
            Action::ResetNginx => next.nginx = NginxState::Pending,
        }

        if next == self {
            Ok(Transition::Unchanged)
        } else {
            Ok(Transition::Next(next))
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let init = match self.init {
            InitState::Uninitialized => "uninitialized",
            InitState::Initialized => "initialized",
        };
        let systemd = match self.systemd {
            SystemdState::Pending => "systemd-pending",
            SystemdState::Applied => "systemd-applied",
        };
        let nginx = match self.nginx {
            NginxState::Pending => "nginx-pending",
            NginxState::Applied => "nginx-applied",
        };
        let site = match self.site {
            SiteState::Disabled => "disabled",
            SiteState::Enabled => "enabled",
        };
        write!(f, "{}/{}/{}/{}", init, systemd, nginx, site)
    }
}
