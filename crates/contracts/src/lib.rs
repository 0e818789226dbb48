//! v3 cross-boundary contracts for the world engine, API, and persistence.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod action;
pub mod api;
pub mod quest;
pub mod state;

pub const SCHEMA_VERSION_V3: &str = "3.0";
pub const RULESET_REV: &str = "phase3c";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Biome {
    Urban,
    Rural,
    Forest,
    Desert,
    Tundra,
    Jungle,
    Coast,
    Mountain,
    Wetland,
}

impl Biome {
    /// Detection order is fixed; the first biome with any keyword hit wins.
    pub const DETECTION_ORDER: [Biome; 9] = [
        Biome::Urban,
        Biome::Rural,
        Biome::Forest,
        Biome::Desert,
        Biome::Tundra,
        Biome::Jungle,
        Biome::Coast,
        Biome::Mountain,
        Biome::Wetland,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Urban => "urban",
            Self::Rural => "rural",
            Self::Forest => "forest",
            Self::Desert => "desert",
            Self::Tundra => "tundra",
            Self::Jungle => "jungle",
            Self::Coast => "coast",
            Self::Mountain => "mountain",
            Self::Wetland => "wetland",
        }
    }
}

impl fmt::Display for Biome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Outpost,
    Hamlet,
    Village,
    Town,
    City,
    Metropolis,
}

impl SettlementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outpost => "outpost",
            Self::Hamlet => "hamlet",
            Self::Village => "village",
            Self::Town => "town",
            Self::City => "city",
            Self::Metropolis => "metropolis",
        }
    }
}

impl fmt::Display for SettlementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    pub schema_version: String,
    #[serde(default = "default_l0_w")]
    pub l0_w: i64,
    #[serde(default = "default_l0_h")]
    pub l0_h: i64,
    #[serde(default = "default_l1_w")]
    pub l1_w: i64,
    #[serde(default = "default_l1_h")]
    pub l1_h: i64,
    #[serde(default = "default_stream_radius")]
    pub stream_radius: i64,
    #[serde(default = "default_stream_prefetch")]
    pub stream_prefetch: i64,
    #[serde(default = "default_city_cap")]
    pub city_cap_per_macro: u8,
    #[serde(default)]
    pub metropolis_cap_per_macro: u8,
    #[serde(default = "default_max_active_quests")]
    pub max_active_quests: usize,
    #[serde(default = "default_max_quests_per_settlement")]
    pub max_quests_per_settlement: usize,
    #[serde(default = "default_max_save_slots")]
    pub max_save_slots: usize,
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default = "default_merchant_restock_every")]
    pub merchant_restock_every: u64,
    #[serde(default = "default_intent_cache_ttl_secs")]
    pub intent_cache_ttl_secs: u64,
    #[serde(default)]
    pub world_wrap: bool,
    #[serde(default = "default_ruleset_rev")]
    pub ruleset_rev: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V3.to_string(),
            l0_w: default_l0_w(),
            l0_h: default_l0_h(),
            l1_w: default_l1_w(),
            l1_h: default_l1_h(),
            stream_radius: default_stream_radius(),
            stream_prefetch: default_stream_prefetch(),
            city_cap_per_macro: default_city_cap(),
            metropolis_cap_per_macro: 0,
            max_active_quests: default_max_active_quests(),
            max_quests_per_settlement: default_max_quests_per_settlement(),
            max_save_slots: default_max_save_slots(),
            history_window: default_history_window(),
            merchant_restock_every: default_merchant_restock_every(),
            intent_cache_ttl_secs: default_intent_cache_ttl_secs(),
            world_wrap: false,
            ruleset_rev: default_ruleset_rev(),
        }
    }
}

fn default_l0_w() -> i64 {
    8
}

fn default_l0_h() -> i64 {
    8
}

fn default_l1_w() -> i64 {
    12
}

fn default_l1_h() -> i64 {
    12
}

fn default_stream_radius() -> i64 {
    2
}

fn default_stream_prefetch() -> i64 {
    1
}

fn default_city_cap() -> u8 {
    1
}

fn default_max_active_quests() -> usize {
    10
}

fn default_max_quests_per_settlement() -> usize {
    5
}

fn default_max_save_slots() -> usize {
    5
}

fn default_history_window() -> usize {
    200
}

fn default_merchant_restock_every() -> u64 {
    10
}

fn default_intent_cache_ttl_secs() -> u64 {
    30
}

fn default_ruleset_rev() -> String {
    RULESET_REV.to_string()
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NoIntent,
    NoPrimaryAction,
    EmptyAction,
    InvalidDirection,
    TargetNotFoundInCell,
    TargetNotInInventory,
    TargetNotVisible,
    NpcNotPresent,
    NoNpcTarget,
    InvalidNpcIdFormat,
    NpcNotFound,
    NpcNotQuestGiver,
    NoQuestAvailable,
    QuestAlreadyActive,
    QuestAlreadyCompleted,
    MaxActiveQuestsReached,
    NoQuestId,
    QuestNotActive,
    WrongQuestGiver,
    IncompleteQuest,
    EmptyInput,
    NoApiKey,
    LlmUnavailable,
    ParseFailed,
    LowConfidence,
    MissingSessionId,
    SessionNotFound,
    InvalidSaveName,
    InvalidGameState,
    SaveLimitExceeded,
    SaveNotFound,
    InvalidSaveFile,
    SaveFailed,
    LoadFailed,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NoIntent => "NO_INTENT",
            Self::NoPrimaryAction => "NO_PRIMARY_ACTION",
            Self::EmptyAction => "EMPTY_ACTION",
            Self::InvalidDirection => "INVALID_DIRECTION",
            Self::TargetNotFoundInCell => "TARGET_NOT_FOUND_IN_CELL",
            Self::TargetNotInInventory => "TARGET_NOT_IN_INVENTORY",
            Self::TargetNotVisible => "TARGET_NOT_VISIBLE",
            Self::NpcNotPresent => "NPC_NOT_PRESENT",
            Self::NoNpcTarget => "NO_NPC_TARGET",
            Self::InvalidNpcIdFormat => "INVALID_NPC_ID_FORMAT",
            Self::NpcNotFound => "NPC_NOT_FOUND",
            Self::NpcNotQuestGiver => "NPC_NOT_QUEST_GIVER",
            Self::NoQuestAvailable => "NO_QUEST_AVAILABLE",
            Self::QuestAlreadyActive => "QUEST_ALREADY_ACTIVE",
            Self::QuestAlreadyCompleted => "QUEST_ALREADY_COMPLETED",
            Self::MaxActiveQuestsReached => "MAX_ACTIVE_QUESTS_REACHED",
            Self::NoQuestId => "NO_QUEST_ID",
            Self::QuestNotActive => "QUEST_NOT_ACTIVE",
            Self::WrongQuestGiver => "WRONG_QUEST_GIVER",
            Self::IncompleteQuest => "INCOMPLETE_QUEST",
            Self::EmptyInput => "EMPTY_INPUT",
            Self::NoApiKey => "NO_API_KEY",
            Self::LlmUnavailable => "LLM_UNAVAILABLE",
            Self::ParseFailed => "PARSE_FAILED",
            Self::LowConfidence => "LOW_CONFIDENCE",
            Self::MissingSessionId => "MISSING_SESSION_ID",
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::InvalidSaveName => "INVALID_SAVE_NAME",
            Self::InvalidGameState => "INVALID_GAME_STATE",
            Self::SaveLimitExceeded => "SAVE_LIMIT_EXCEEDED",
            Self::SaveNotFound => "SAVE_NOT_FOUND",
            Self::InvalidSaveFile => "INVALID_SAVE_FILE",
            Self::SaveFailed => "SAVE_FAILED",
            Self::LoadFailed => "LOAD_FAILED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    pub schema_version: String,
    pub error_code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(error_code: ErrorCode, message: impl Into<String>, details: Option<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION_V3.to_string(),
            error_code,
            message: message.into(),
            details,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_code, self.message)
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeltaOp {
    Set,
    Add,
    Del,
    Inc,
}

/// One ordered state mutation. Paths follow the state tree literally,
/// e.g. `/world/cells/L1:0,0:6,6`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Delta {
    pub op: DeltaOp,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Delta {
    pub fn set(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: DeltaOp::Set,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn add(path: impl Into<String>, value: Value) -> Self {
        Self {
            op: DeltaOp::Add,
            path: path.into(),
            value: Some(value),
        }
    }

    pub fn del(path: impl Into<String>) -> Self {
        Self {
            op: DeltaOp::Del,
            path: path.into(),
            value: None,
        }
    }

    pub fn inc(path: impl Into<String>, by: i64) -> Self {
        Self {
            op: DeltaOp::Inc,
            path: path.into(),
            value: Some(Value::from(by)),
        }
    }
}
