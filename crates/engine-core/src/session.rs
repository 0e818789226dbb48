//! Session state construction and key normalization.

use chrono::{DateTime, Utc};

use contracts::state::{
    cell_key, Counters, Digests, Fingerprint, GridDims, PlayerState, PlayerStats, Position,
    SessionState, StreamParams, WorldState,
};
use contracts::{EngineConfig, SCHEMA_VERSION_V3};

use crate::npc::format_utc;
use crate::turn::stable_fingerprint_digest;

/// Fresh session state. The world stays unseeded (no macro grid, no biome)
/// until the first turn's prompt arrives; a zero seed means "derive from
/// the prompt".
pub fn new_session_state(config: &EngineConfig, seed: u32, now: DateTime<Utc>) -> SessionState {
    let world = WorldState {
        time_utc: format_utc(now),
        l0: GridDims {
            w: config.l0_w,
            h: config.l0_h,
        },
        macro_cells: Default::default(),
        l1_default: GridDims {
            w: config.l1_w,
            h: config.l1_h,
        },
        stream: StreamParams {
            r: config.stream_radius,
            p: config.stream_prefetch,
        },
        position: Position {
            mx: config.l0_w / 2 - 1,
            my: config.l0_h / 2 - 1,
            lx: config.l1_w / 2,
            ly: config.l1_h / 2,
        },
        cells: Default::default(),
        sites: Default::default(),
        settlements: Default::default(),
        pois: Default::default(),
        l2_active: None,
        l3_active: None,
        l2_position: None,
        current_layer: 1,
        macro_biome: None,
    };

    SessionState {
        schema_version: SCHEMA_VERSION_V3.to_string(),
        rng_seed: seed,
        turn_counter: 0,
        player: PlayerState {
            id: "player".to_string(),
            aliases: vec!["you".to_string(), "traveler".to_string()],
            stats: PlayerStats {
                stamina: 100,
                clarity: 100,
            },
            inventory: Vec::new(),
        },
        world,
        quests: Default::default(),
        counters: Counters::default(),
        fingerprint: Fingerprint {
            schema_version: SCHEMA_VERSION_V3.to_string(),
            world_seed: seed,
            ruleset_rev: config.ruleset_rev.clone(),
            hex_digest_stable: stable_fingerprint_digest(SCHEMA_VERSION_V3, seed, &config.ruleset_rev),
            hex_digest_state: String::new(),
            hex_digest: String::new(),
        },
        digests: Digests::default(),
        history: Vec::new(),
        ledger_len: 0,
    }
}

/// Rewrites any cell entry whose key does not match the canonical grammar
/// in place, using the cell's own coordinates. Applied on load.
pub fn normalize_cell_keys(state: &mut SessionState) {
    let mismatched: Vec<String> = state
        .world
        .cells
        .iter()
        .filter(|(key, cell)| **key != cell_key(cell.mx, cell.my, cell.lx, cell.ly))
        .map(|(key, _)| key.clone())
        .collect();
    for stale_key in mismatched {
        if let Some(mut cell) = state.world.cells.remove(&stale_key) {
            let canonical = cell_key(cell.mx, cell.my, cell.lx, cell.ly);
            cell.id = canonical.clone();
            state.world.cells.insert(canonical, cell);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::state::Cell;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-08-01T12:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc)
    }

    #[test]
    fn new_session_starts_centered_and_unseeded() {
        let state = new_session_state(&EngineConfig::default(), 0, fixed_now());
        assert_eq!(state.turn_counter, 0);
        assert_eq!(state.world.position.mx, 3);
        assert_eq!(state.world.position.lx, 6);
        assert!(state.world.macro_cells.is_empty());
        assert!(state.world.macro_biome.is_none());
        assert_eq!(state.world.current_layer, 1);
        assert!(!state.fingerprint.hex_digest_stable.is_empty());
    }

    #[test]
    fn normalize_rewrites_non_canonical_keys() {
        let mut state = new_session_state(&EngineConfig::default(), 7, fixed_now());
        state.world.cells.insert(
            "bogus-key".to_string(),
            Cell {
                id: "bogus-key".to_string(),
                mx: 3,
                my: 3,
                lx: 5,
                ly: 5,
                cell_type: None,
                subtype: None,
                description: None,
                known: true,
                hydrated: false,
                tags: Vec::new(),
                is_custom: false,
                items: Vec::new(),
            },
        );
        normalize_cell_keys(&mut state);
        assert!(state.world.cells.contains_key("L1:3,3:5,5"));
        assert!(!state.world.cells.contains_key("bogus-key"));
        assert_eq!(state.world.cells["L1:3,3:5,5"].id, "L1:3,3:5,5");
    }
}
