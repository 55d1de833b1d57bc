//! Run identity shared by every layer of one orchestration run

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one orchestration run.
///
/// `generation` increases monotonically per orchestrator and is what updates
/// are compared against; `id` is a random UUID for correlating logs and events.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunTag {
    pub generation: u64,
    pub id: Uuid,
}

impl RunTag {
    pub fn new(generation: u64) -> Self {
        Self {
            generation,
            id: Uuid::new_v4(),
        }
    }
}
