//! Access gate: the only authorization boundary.
//!
//! Access is granted only once identity resolution has finished and the
//! resolved id equals the single configured allow-listed id. A pending
//! identity gets no decision at all. Nothing is mounted and nothing observes
//! the page unless the decision is [`AccessDecision::Granted`].

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{AuditEvent, AuditLog};
use crate::host::HostPage;

/// Identity as handed over by the host's authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Identity {
    pub id: Option<String>,
    pub email: Option<String>,
    pub is_loading: bool,
}

impl Identity {
    pub fn pending() -> Self {
        Self {
            is_loading: true,
            ..Self::default()
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(id: impl Into<String>, email: Option<&str>) -> Self {
        Self {
            id: Some(id.into()),
            email: email.map(str::to_string),
            is_loading: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    SignedOut,
    NotAllowListed,
    NoAllowListConfigured,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::SignedOut => "signed_out",
            DenialReason::NotAllowListed => "not_allow_listed",
            DenialReason::NoAllowListConfigured => "no_allow_list_configured",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Identity still resolving; no decision and no audit.
    Pending,
    Granted,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    allowed_user_id: String,
}

impl AccessGate {
    pub fn new(allowed_user_id: impl Into<String>) -> Self {
        Self {
            allowed_user_id: allowed_user_id.into(),
        }
    }

    pub fn decide(&self, identity: &Identity) -> AccessDecision {
        if identity.is_loading {
            return AccessDecision::Pending;
        }
        if self.allowed_user_id.is_empty() {
            return AccessDecision::Denied(DenialReason::NoAllowListConfigured);
        }
        match identity.id.as_deref() {
            None | Some("") => AccessDecision::Denied(DenialReason::SignedOut),
            Some(id) if id == self.allowed_user_id => AccessDecision::Granted,
            Some(_) => AccessDecision::Denied(DenialReason::NotAllowListed),
        }
    }

    /// Decides and writes the audit line for every settled decision.
    pub fn authorize(&self, identity: &Identity, audit: &AuditLog, page: &HostPage) -> AccessDecision {
        let decision = self.decide(identity);
        let attempted = json!({ "userId": identity.id, "email": identity.email });
        match decision {
            AccessDecision::Pending => {}
            AccessDecision::Granted => {
                audit.emit(page, AuditEvent::AccessGranted, attempted);
            }
            AccessDecision::Denied(reason) => {
                let mut details = attempted;
                details["reason"] = json!(reason.as_str());
                audit.emit(page, AuditEvent::AccessDenied, details);
            }
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_the_allow_listed_id_is_granted() {
        let gate = AccessGate::new("user_owner");
        assert_eq!(
            gate.decide(&Identity::user("user_owner", Some("o@example.com"))),
            AccessDecision::Granted
        );
        assert_eq!(
            gate.decide(&Identity::user("user_other", None)),
            AccessDecision::Denied(DenialReason::NotAllowListed)
        );
        assert_eq!(
            gate.decide(&Identity::anonymous()),
            AccessDecision::Denied(DenialReason::SignedOut)
        );
    }

    #[test]
    fn pending_identity_gets_no_decision() {
        let gate = AccessGate::new("user_owner");
        let mut identity = Identity::pending();
        identity.id = Some("user_owner".to_string());
        assert_eq!(gate.decide(&identity), AccessDecision::Pending);
    }

    #[test]
    fn empty_allow_list_denies_everyone() {
        let gate = AccessGate::new("");
        assert_eq!(
            gate.decide(&Identity::user("", None)),
            AccessDecision::Denied(DenialReason::NoAllowListConfigured)
        );
    }

    #[test]
    fn identity_parses_host_shape() {
        let identity: Identity =
            serde_json::from_str(r#"{"id":"user_1","email":"a@b.c","isLoading":false}"#).unwrap();
        assert_eq!(identity, Identity::user("user_1", Some("a@b.c")));
    }
}
