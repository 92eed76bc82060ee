// ABOUTME: Response envelopes for the BeatSaver maps API
// ABOUTME: Individual map documents stay as raw JSON for the normalizer

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Deserialize)]
pub struct PageResponse {
    #[serde(default)]
    pub docs: Vec<Value>,
}
