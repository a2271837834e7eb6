use crate::status::InstanceStatus;
use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: usize = 50;

/// Query used to list persisted instances, newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceFilter {
    pub tenant_id: Option<String>,
    pub status: Option<InstanceStatus>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for InstanceFilter {
    fn default() -> Self {
        Self {
            tenant_id: None,
            status: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl InstanceFilter {
    pub fn for_tenant(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: Some(tenant_id.into()),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn page(mut self, limit: usize, offset: usize) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Whether an instance with the given tenant and status passes the filter.
    pub fn matches(&self, tenant_id: &str, status: InstanceStatus) -> bool {
        self.tenant_id.as_deref().map_or(true, |t| t == tenant_id)
            && self.status.map_or(true, |s| s == status)
    }
}
