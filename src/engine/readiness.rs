//! Readiness of the long-lived resources

use serde::Serialize;

/// State of one background resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "lowercase")]
pub enum ResourceStatus {
    Pending,
    Ready,
    /// The worker stopped on an unrecoverable error
    Failed(String),
}

impl ResourceStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ResourceStatus::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ResourceStatus::Failed(_))
    }
}

/// Per-resource readiness as reported by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub book: ResourceStatus,
    pub order_events: ResourceStatus,
    pub positions: ResourceStatus,
    pub balances: ResourceStatus,
}

impl Readiness {
    fn resources(&self) -> [(&'static str, &ResourceStatus); 4] {
        [
            ("book", &self.book),
            ("order_events", &self.order_events),
            ("positions", &self.positions),
            ("balances", &self.balances),
        ]
    }

    pub fn all_ready(&self) -> bool {
        self.resources().iter().all(|(_, status)| status.is_ready())
    }

    /// Names of the resources that are not ready yet
    pub fn pending(&self) -> Vec<&'static str> {
        self.resources()
            .iter()
            .filter(|(_, status)| !status.is_ready())
            .map(|(name, _)| *name)
            .collect()
    }

    /// First failed resource with its reason
    pub fn failure(&self) -> Option<(&'static str, String)> {
        self.resources().iter().find_map(|(name, status)| match status {
            ResourceStatus::Failed(reason) => Some((*name, reason.clone())),
            _ => None,
        })
    }
}
