use serde::{Deserialize, Serialize};

/// Policy knobs for the engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// How long an invitation stays acceptable.
    pub invitation_ttl_days: i64,
    /// Lifetime cap on approved amendments per contract.
    pub max_approved_amendments: u32,
    /// Length of generated invitation codes.
    pub invitation_code_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            invitation_ttl_days: 7,
            max_approved_amendments: 2,
            invitation_code_length: 32,
        }
    }
}
