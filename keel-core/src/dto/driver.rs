//! Driver DTOs

use serde::{Deserialize, Serialize};

use crate::domain::engine::{CapabilitySet, Engine};

/// Capabilities advertised for one engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineCapabilities {
    pub engine: Engine,
    pub capabilities: CapabilitySet,
}
