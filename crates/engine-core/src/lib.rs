//! Deterministic simulation core of the world server: PRNG primitives,
//! catalogs, NPC generation, hierarchical worldgen, the action pipeline,
//! the quest constraint engine, and the turn orchestrator.

pub mod action;
pub mod catalog;
pub mod npc;
pub mod quest;
pub mod rng;
pub mod session;
pub mod turn;
pub mod worldgen;

use contracts::Delta;

/// Accumulated side effects of one turn: the ordered delta list plus the
/// revision-counter flags resolved at the end of the turn.
#[derive(Debug, Default)]
pub struct Effects {
    pub deltas: Vec<Delta>,
    pub cell_rev: bool,
    pub site_rev: bool,
    pub inventory_rev: bool,
    pub merchant_state_rev: bool,
    pub faction_rev: bool,
}

impl Effects {
    pub fn new() -> Self {
        Self::default()
    }
}
