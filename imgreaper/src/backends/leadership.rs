use async_trait::async_trait;
use tracing::debug;

use crate::collaborators::LeadershipCheck;

/// Leadership decided by comparing this cluster's name with the name of the
/// cluster currently marked active.
///
/// With either name unset there is only one cluster to consider, and it is
/// always active.
#[derive(Debug, Clone, Default)]
pub struct ConfiguredLeadership {
    cluster_name: Option<String>,
    active_cluster_name: Option<String>,
}

impl ConfiguredLeadership {
    pub fn new(cluster_name: Option<String>, active_cluster_name: Option<String>) -> Self {
        Self {
            cluster_name,
            active_cluster_name,
        }
    }
}

#[async_trait]
impl LeadershipCheck for ConfiguredLeadership {
    async fn is_active_cluster(&self) -> bool {
        match (&self.cluster_name, &self.active_cluster_name) {
            (Some(name), Some(active)) => {
                debug!(cluster = %name, active_cluster = %active, "Checking active cluster");
                name.eq_ignore_ascii_case(active)
            }
            _ => true,
        }
    }
}
