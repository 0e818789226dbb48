//! HTTP request/response envelopes and the per-turn response blocks.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quest::Quest;
use crate::state::{Position, SessionState, StreamParams};
use crate::{ApiError, Delta, SettlementKind};

pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub seed: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub status: String,
    pub state: SessionState,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrateRequest {
    pub action: String,
}

/// Per-cluster visibility line in `post_state_facts`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterVisibility {
    pub cluster_id: String,
    pub tier: SettlementKind,
    pub revealed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostStateFacts {
    pub position: Position,
    /// Row letter + column number of the current macro cell, e.g. `D4`.
    pub l0_id: String,
    pub l1_dims: crate::state::GridDims,
    pub stream: StreamParams,
    pub clusters: Vec<ClusterVisibility>,
    pub inventory_digest: String,
}

/// The two ordered delta blocks of a turn response: world changes first,
/// then history and fingerprints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnBlocks {
    #[serde(rename = "STATE-DELTA 1/2")]
    pub world_deltas: Vec<Delta>,
    #[serde(rename = "STATE-DELTA 2/2")]
    pub meta_deltas: Vec<Delta>,
    pub post_state_facts: PostStateFacts,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScenePayload {
    pub layer: u8,
    pub position: Position,
    pub location: String,
    pub time_utc: String,
    pub visible_cells: Vec<SceneCell>,
    pub present_npcs: Vec<SceneNpc>,
    pub active_quests: Vec<SceneQuest>,
    pub inventory_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneCell {
    pub key: String,
    #[serde(rename = "type")]
    pub cell_type: String,
    pub subtype: String,
    pub description: String,
    pub distance: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneNpc {
    pub id: String,
    pub job_category: String,
    pub is_quest_giver: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneQuest {
    pub id: String,
    pub objective: String,
    pub current_step: usize,
    pub total_steps: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrateResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_output: Option<TurnBlocks>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene: Option<ScenePayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug: Option<Value>,
    #[serde(rename = "systemCommand", skip_serializing_if = "Option::is_none")]
    pub system_command: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveRequest {
    #[serde(rename = "saveName")]
    pub save_name: String,
    #[serde(rename = "gameState")]
    pub game_state: Option<SessionState>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoadRequest {
    #[serde(rename = "saveName")]
    pub save_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveFileMeta {
    #[serde(rename = "saveName")]
    pub save_name: String,
    pub timestamp: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveResponse {
    pub success: bool,
    #[serde(rename = "saveName", skip_serializing_if = "Option::is_none")]
    pub save_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "gameState", skip_serializing_if = "Option::is_none")]
    pub game_state: Option<SessionState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saves: Option<Vec<SaveFileMeta>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

/// On-disk save envelope: `saves/<session_id>/<sanitized_name>.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaveFile {
    #[serde(rename = "gameState")]
    pub game_state: SessionState,
    pub timestamp: String,
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "saveName")]
    pub save_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestAcceptRequest {
    #[serde(rename = "questId")]
    pub quest_id: String,
    #[serde(rename = "npcId", default)]
    pub npc_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestProgressRequest {
    #[serde(rename = "questId")]
    pub quest_id: String,
    #[serde(default)]
    pub step: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestCompleteRequest {
    #[serde(rename = "questId")]
    pub quest_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestListResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub quests: Vec<Quest>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestMutationResponse {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest: Option<Quest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatusResponse {
    pub schema_version: String,
    pub sessions: usize,
    pub llm_available: bool,
    pub ruleset_rev: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrate_response_skips_empty_fields() {
        let response = NarrateResponse {
            session_id: "s1".to_string(),
            narrative: Some("You stand on a windswept shore.".to_string()),
            state: None,
            engine_output: None,
            scene: None,
            debug: None,
            system_command: None,
            restart: None,
            error: None,
        };
        let json = serde_json::to_value(&response).expect("serialize");
        assert!(json.get("error").is_none());
        assert!(json.get("systemCommand").is_none());
        assert_eq!(json["sessionId"], "s1");
    }

    #[test]
    fn turn_blocks_use_delta_block_labels() {
        let blocks = TurnBlocks {
            world_deltas: Vec::new(),
            meta_deltas: Vec::new(),
            post_state_facts: PostStateFacts {
                position: Position {
                    mx: 3,
                    my: 3,
                    lx: 6,
                    ly: 6,
                },
                l0_id: "D4".to_string(),
                l1_dims: crate::state::GridDims { w: 12, h: 12 },
                stream: StreamParams { r: 2, p: 1 },
                clusters: Vec::new(),
                inventory_digest: String::new(),
            },
        };
        let json = serde_json::to_value(&blocks).expect("serialize");
        assert!(json.get("STATE-DELTA 1/2").is_some());
        assert!(json.get("STATE-DELTA 2/2").is_some());
    }
}
