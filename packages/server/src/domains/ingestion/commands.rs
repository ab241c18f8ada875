//! Queue payload contracts for the pipeline's job types.
//!
//! The queue only carries a type tag and a small JSON payload: a
//! subscription id, or an external item id plus subscription id.

use serde::{Deserialize, Serialize};

use crate::kernel::jobs::CommandMeta;

/// Poll one subscribed channel for new items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckChannelJob {
    pub subscription_id: i64,
}

impl CheckChannelJob {
    pub const JOB_TYPE: &'static str = "channel:check";
}

impl CommandMeta for CheckChannelJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    // Listing deadline plus the courtesy delay.
    fn timeout_ms(&self) -> i64 {
        180_000
    }
}

/// Download and transcode one discovered item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessEpisodeJob {
    pub external_id: String,
    pub subscription_id: i64,
}

impl ProcessEpisodeJob {
    pub const JOB_TYPE: &'static str = "episode:process";
}

impl CommandMeta for ProcessEpisodeJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }

    fn max_retries(&self) -> i32 {
        5
    }

    // Extraction deadline plus the courtesy delay.
    fn timeout_ms(&self) -> i64 {
        960_000
    }
}

/// Fan out a channel check for every active subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAllSubscriptionsJob {}

impl CheckAllSubscriptionsJob {
    pub const JOB_TYPE: &'static str = "subscriptions:check_all";
}

impl CommandMeta for CheckAllSubscriptionsJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }
}

/// Reset aged failures and re-enqueue them for another attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReclaimFailedJob {}

impl ReclaimFailedJob {
    pub const JOB_TYPE: &'static str = "episodes:reclaim_failed";
}

impl CommandMeta for ReclaimFailedJob {
    fn command_type(&self) -> &'static str {
        Self::JOB_TYPE
    }
}
