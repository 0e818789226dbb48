//! Session and world state records. All maps are `BTreeMap` so JSON
//! projections of state are deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::quest::QuestLog;
use crate::{Biome, SettlementKind};

/// Canonical key of an L1 cell: `L1:{mx},{my}:{lx},{ly}`.
pub fn cell_key(mx: i64, my: i64, lx: i64, ly: i64) -> String {
    format!("L1:{mx},{my}:{lx},{ly}")
}

/// Key of a macro entry: `{mx},{my}`.
pub fn macro_key(mx: i64, my: i64) -> String {
    format!("{mx},{my}")
}

pub fn chebyshev(ax: i64, ay: i64, bx: i64, by: i64) -> i64 {
    (ax - bx).abs().max((ay - by).abs())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub schema_version: String,
    pub rng_seed: u32,
    pub turn_counter: u64,
    pub player: PlayerState,
    pub world: WorldState,
    pub quests: QuestLog,
    pub counters: Counters,
    pub fingerprint: Fingerprint,
    pub digests: Digests,
    pub history: Vec<HistoryEntry>,
    #[serde(default)]
    pub ledger_len: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlayerState {
    pub id: String,
    pub aliases: Vec<String>,
    pub stats: PlayerStats,
    pub inventory: Vec<Item>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerStats {
    pub stamina: i64,
    pub clarity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Item {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub props: ItemProps,
    pub property_revision: u64,
    #[serde(default = "default_item_qty")]
    pub qty: i64,
}

fn default_item_qty() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemProps {
    pub slot: String,
    pub rarity: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct GridDims {
    pub w: i64,
    pub h: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct StreamParams {
    pub r: i64,
    pub p: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Position {
    pub mx: i64,
    pub my: i64,
    pub lx: i64,
    pub ly: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubPosition {
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CellOffset {
    pub lx: i64,
    pub ly: i64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct MacroCaps {
    pub city: u8,
    pub metropolis: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedCluster {
    pub cluster_id: String,
    pub tier: SettlementKind,
    pub center: CellOffset,
    pub cells: Vec<CellOffset>,
    pub seg_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SitePlan {
    pub target: i64,
    pub clusters: Vec<PlannedCluster>,
    pub warn_shortfall: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MacroEntry {
    pub id: String,
    pub mx: i64,
    pub my: i64,
    pub l1: GridDims,
    pub caps: MacroCaps,
    pub biome: Biome,
    #[serde(default)]
    pub site_plan: Option<SitePlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Cell {
    pub id: String,
    pub mx: i64,
    pub my: i64,
    pub lx: i64,
    pub ly: i64,
    #[serde(rename = "type")]
    pub cell_type: Option<String>,
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub known: bool,
    pub hydrated: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Site {
    pub id: String,
    pub mx: i64,
    pub my: i64,
    pub cluster_id: String,
    pub seg_index: usize,
    pub tier: SettlementKind,
    pub cells: Vec<CellOffset>,
    pub promoted: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BuildingPurpose {
    House,
    Shop,
    Tavern,
    Temple,
    Guildhall,
    Palace,
}

impl BuildingPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::House => "house",
            Self::Shop => "shop",
            Self::Tavern => "tavern",
            Self::Temple => "temple",
            Self::Guildhall => "guildhall",
            Self::Palace => "palace",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub exits: BTreeMap<String, String>,
    #[serde(default)]
    pub npcs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Building {
    pub id: String,
    pub name: String,
    pub purpose: BuildingPurpose,
    pub x: i64,
    pub y: i64,
    #[serde(default)]
    pub rooms: Vec<Room>,
    #[serde(default)]
    pub npcs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settlement {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: SettlementKind,
    pub tier: u8,
    pub population: i64,
    pub width: i64,
    pub height: i64,
    pub grid: Vec<Vec<String>>,
    pub buildings: Vec<Building>,
    pub npcs: Vec<Npc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    Water,
    Collapse,
    Gas,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Hazard {
    pub kind: HazardKind,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoiInterior {
    pub id: String,
    pub width: i64,
    pub height: i64,
    pub hazards: Vec<Hazard>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Npc {
    pub id: String,
    pub site_id: String,
    pub age: i64,
    pub gender: Gender,
    pub tier: u8,
    pub job_category: String,
    /// A site id, `"wanderer"`, or null.
    pub home_location: Option<String>,
    pub faction_id: Option<String>,
    pub wealth_tier: u8,
    pub player_reputation: i64,
    pub traits: Vec<String>,
    pub corruption_level: f64,
    pub is_criminal: bool,
    pub position: Position,
    pub state: String,
    pub created_at_utc: String,
    pub expires_at_utc: String,
    pub schedule: Option<Value>,
    #[serde(default)]
    pub is_quest_giver: bool,
    #[serde(default)]
    pub quest_giver_rank: u32,
    #[serde(default)]
    pub stock_level: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorldState {
    pub time_utc: String,
    pub l0: GridDims,
    #[serde(rename = "macro")]
    pub macro_cells: BTreeMap<String, MacroEntry>,
    pub l1_default: GridDims,
    pub stream: StreamParams,
    pub position: Position,
    pub cells: BTreeMap<String, Cell>,
    pub sites: BTreeMap<String, Site>,
    pub settlements: BTreeMap<String, Settlement>,
    #[serde(default)]
    pub pois: BTreeMap<String, PoiInterior>,
    pub l2_active: Option<String>,
    pub l3_active: Option<String>,
    #[serde(default)]
    pub l2_position: Option<SubPosition>,
    pub current_layer: u8,
    pub macro_biome: Option<Biome>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counters {
    pub state_rev: u64,
    pub cell_rev: u64,
    pub site_rev: u64,
    pub inventory_rev: u64,
    pub merchant_state_rev: u64,
    pub faction_rev: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Fingerprint {
    pub schema_version: String,
    pub world_seed: u32,
    pub ruleset_rev: String,
    pub hex_digest_stable: String,
    pub hex_digest_state: String,
    pub hex_digest: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Digests {
    pub inventory_digest: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    pub turn_id: String,
    pub timestamp_utc: String,
    pub intent: String,
    pub summary: String,
}

impl Position {
    pub fn chebyshev_to(&self, lx: i64, ly: i64) -> i64 {
        chebyshev(self.lx, self.ly, lx, ly)
    }
}

impl Cell {
    pub fn key(&self) -> String {
        cell_key(self.mx, self.my, self.lx, self.ly)
    }
}

impl SettlementKind {
    pub fn tier_index(self) -> u8 {
        match self {
            Self::Outpost => 1,
            Self::Hamlet => 2,
            Self::Village => 3,
            Self::Town => 4,
            Self::City => 5,
            Self::Metropolis => 6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_key_matches_grammar() {
        assert_eq!(cell_key(0, 0, 6, 6), "L1:0,0:6,6");
        assert_eq!(cell_key(7, 3, 11, 0), "L1:7,3:11,0");
    }

    #[test]
    fn chebyshev_is_symmetric() {
        assert_eq!(chebyshev(1, 2, 4, 0), 3);
        assert_eq!(chebyshev(4, 0, 1, 2), 3);
        assert_eq!(chebyshev(5, 5, 5, 5), 0);
    }

    #[test]
    fn npc_round_trip_preserves_nullable_fields() {
        let npc = Npc {
            id: "site_0x0_1#npc_42".to_string(),
            site_id: "site_0x0_1".to_string(),
            age: 31,
            gender: Gender::Female,
            tier: 3,
            job_category: "cooper".to_string(),
            home_location: Some("wanderer".to_string()),
            faction_id: None,
            wealth_tier: 4,
            player_reputation: -12,
            traits: vec!["patient".to_string(), "sullen".to_string()],
            corruption_level: 0.41,
            is_criminal: false,
            position: Position {
                mx: 0,
                my: 0,
                lx: 4,
                ly: 9,
            },
            state: "active".to_string(),
            created_at_utc: "2026-08-01T00:00:00Z".to_string(),
            expires_at_utc: "2026-08-15T00:00:00Z".to_string(),
            schedule: None,
            is_quest_giver: true,
            quest_giver_rank: 2,
            stock_level: 0,
        };

        let json = serde_json::to_string(&npc).expect("serialize npc");
        let decoded: Npc = serde_json::from_str(&json).expect("deserialize npc");
        assert_eq!(npc, decoded);
    }
}
