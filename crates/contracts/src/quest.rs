//! Quest records: constraints rolled before narrative, step structure, and
//! the narrative payload contract with the external generator.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Trivial,
    Easy,
    Moderate,
    Hard,
    Deadly,
}

impl Difficulty {
    pub const ALL: [Difficulty; 5] = [
        Difficulty::Trivial,
        Difficulty::Easy,
        Difficulty::Moderate,
        Difficulty::Hard,
        Difficulty::Deadly,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Easy => "easy",
            Self::Moderate => "moderate",
            Self::Hard => "hard",
            Self::Deadly => "deadly",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Available,
    Accepted,
    Active,
    ReadyToComplete,
    Completed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Single,
    Short,
    Medium,
    Dynamic,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureTriggerKind {
    Observability,
    Innocence,
    Destruction,
    MoralChoice,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FailureConsequence {
    PermanentFailure,
    EscalatedDifficulty,
    RedemptionAvailable,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailureTrigger {
    pub kind: FailureTriggerKind,
    pub consequence: FailureConsequence,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepChoice {
    pub id: String,
    pub leads_to_step: usize,
    #[serde(default)]
    pub consequences: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestStep {
    pub id: usize,
    pub narrative: String,
    pub objective: String,
    #[serde(default)]
    pub choices: Vec<StepChoice>,
    #[serde(default)]
    pub failure_triggers: Vec<FailureTrigger>,
}

/// Everything decided before any narrative is generated. Narrative text is
/// validated against these fields and rejected on mismatch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestConstraints {
    pub difficulty: Difficulty,
    pub reward_gold: i64,
    pub reward_items: u8,
    pub enemy_types: Vec<String>,
    pub enemy_count: i64,
    pub travel_distance: i64,
    pub forbidden_keywords: Vec<String>,
    pub complexity: Complexity,
    pub total_steps: usize,
    pub settlement_type: crate::SettlementKind,
    pub population: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quest {
    pub id: String,
    pub tier: u8,
    pub status: QuestStatus,
    pub difficulty: Difficulty,
    pub reward_gold: i64,
    #[serde(default)]
    pub reward_items: Vec<String>,
    pub enemy_types: Vec<String>,
    pub enemy_count: i64,
    pub complexity: Complexity,
    pub travel_distance: i64,
    pub forbidden_keywords: Vec<String>,
    pub settlement_type: crate::SettlementKind,
    pub population: i64,
    pub constraints: QuestConstraints,
    pub steps: Vec<QuestStep>,
    pub current_step: usize,
    pub total_steps: usize,
    pub giver_npc_id: String,
    pub protagonist: String,
    pub antagonist: String,
    pub narrative: String,
    pub objective_description: String,
    pub reward_description: String,
    #[serde(default)]
    pub narrative_hooks: Vec<String>,
    #[serde(default)]
    pub complications: Vec<String>,
    #[serde(default)]
    pub failure_conditions: Vec<String>,
    #[serde(default)]
    pub is_fallback: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestConfig {
    #[serde(default = "default_max_active_quests")]
    pub max_active_quests: usize,
    #[serde(default = "default_max_quests_per_settlement")]
    pub max_quests_per_settlement: usize,
}

impl Default for QuestConfig {
    fn default() -> Self {
        Self {
            max_active_quests: default_max_active_quests(),
            max_quests_per_settlement: default_max_quests_per_settlement(),
        }
    }
}

fn default_max_active_quests() -> usize {
    10
}

fn default_max_quests_per_settlement() -> usize {
    5
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QuestLog {
    #[serde(default)]
    pub active: Vec<Quest>,
    #[serde(default)]
    pub completed: Vec<Quest>,
    #[serde(rename = "allQuestsSeeded", default)]
    pub all_quests_seeded: BTreeMap<String, Vec<Quest>>,
    #[serde(default)]
    pub config: QuestConfig,
}

impl QuestLog {
    pub fn find_active(&self, quest_id: &str) -> Option<&Quest> {
        self.active.iter().find(|quest| quest.id == quest_id)
    }

    pub fn find_seeded(&self, settlement_id: &str, quest_id: &str) -> Option<&Quest> {
        self.all_quests_seeded
            .get(settlement_id)?
            .iter()
            .find(|quest| quest.id == quest_id)
    }
}

/// Request handed to the external narrative generator: the constraint
/// record plus the structural skeleton it must fill.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NarrativeRequest {
    pub quest_id: String,
    pub settlement_id: String,
    pub settlement_name: String,
    pub constraints: QuestConstraints,
    pub step_ids: Vec<usize>,
}

/// Candidate narrative as returned by the generator, validated before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestNarrative {
    pub narrative: String,
    pub objective_description: String,
    pub reward_description: String,
    pub protagonist: String,
    pub antagonist: String,
    #[serde(default)]
    pub narrative_hooks: Vec<String>,
    #[serde(default)]
    pub complications: Vec<String>,
    #[serde(default)]
    pub failure_conditions: Vec<String>,
    #[serde(default)]
    pub step_narratives: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quest_log_defaults_to_engine_limits() {
        let log = QuestLog::default();
        assert_eq!(log.config.max_active_quests, 10);
        assert_eq!(log.config.max_quests_per_settlement, 5);
        assert!(log.active.is_empty());
    }

    #[test]
    fn difficulty_order_is_trivial_to_deadly() {
        assert!(Difficulty::Trivial < Difficulty::Deadly);
        assert_eq!(Difficulty::ALL.len(), 5);
    }

    #[test]
    fn seeded_quest_map_serializes_with_legacy_key() {
        let log = QuestLog::default();
        let json = serde_json::to_value(&log).expect("serialize");
        assert!(json.get("allQuestsSeeded").is_some());
    }
}
