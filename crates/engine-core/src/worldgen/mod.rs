//! Hierarchical world generation: the L0 macro grid, per-macro site plans,
//! the L1 streaming window, and L2/L3 interiors.

mod interior;
mod plan;
mod stream;

pub use interior::{
    enter_l2_from_l1, enter_l3_from_l2, exit_l2, exit_l3, generate_poi_interior,
    generate_settlement, settlement_name, L2Entry,
};
pub use plan::build_site_plan;
pub use stream::{site_id_for_cluster, world_gen_step};

use sha2::{Digest, Sha256};

use contracts::state::{macro_key, GridDims, MacroCaps, MacroEntry, SitePlan, WorldState};
use contracts::{Biome, Delta, EngineConfig};

use crate::catalog::biome_keywords;
use crate::Effects;

/// Row letter + column number of a macro cell, e.g. `D4` for `(3,3)`.
pub fn l0_id(mx: i64, my: i64) -> String {
    let row = (b'A' + (my.clamp(0, 25) as u8)) as char;
    format!("{row}{}", mx + 1)
}

/// Keyword scan over the prompt; the first biome in the fixed enumeration
/// order with any hit wins.
pub fn detect_biome(prompt: &str) -> Biome {
    let lowered = prompt.to_lowercase();
    for biome in Biome::DETECTION_ORDER {
        if biome_keywords(biome)
            .iter()
            .any(|keyword| lowered.contains(keyword))
        {
            return biome;
        }
    }
    Biome::Rural
}

/// World seed from a prompt when the caller supplies none: first 32 bits of
/// the SHA-256 digest, masked non-negative.
pub fn derive_world_seed(prompt: &str) -> u32 {
    let digest = Sha256::digest(prompt.trim().to_lowercase().as_bytes());
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]) & 0x7FFF_FFFF
}

/// Tags all macro cells with the detected biome and installs empty site
/// plans to be built lazily on first access.
pub fn seed_world_from_prompt(
    world: &mut WorldState,
    config: &EngineConfig,
    prompt: &str,
    effects: &mut Effects,
) -> Biome {
    let biome = detect_biome(prompt);
    world.macro_biome = Some(biome);
    effects.deltas.push(Delta::set(
        "/world/macro_biome",
        serde_json::json!(biome.as_str()),
    ));

    for my in 0..config.l0_h {
        for mx in 0..config.l0_w {
            let key = macro_key(mx, my);
            if world.macro_cells.contains_key(&key) {
                continue;
            }
            let entry = MacroEntry {
                id: l0_id(mx, my),
                mx,
                my,
                l1: GridDims {
                    w: config.l1_w,
                    h: config.l1_h,
                },
                caps: MacroCaps {
                    city: config.city_cap_per_macro,
                    metropolis: config.metropolis_cap_per_macro,
                },
                biome,
                site_plan: None,
            };
            effects.deltas.push(Delta::add(
                format!("/world/macro/{key}"),
                serde_json::json!({ "id": entry.id, "biome": biome.as_str() }),
            ));
            world.macro_cells.insert(key, entry);
        }
    }

    biome
}

/// Plan for a macro cell, built on first access, cached in the macro entry,
/// and returned by value thereafter.
pub fn site_plan_for(world: &mut WorldState, seed: u32, mx: i64, my: i64) -> Option<SitePlan> {
    let key = macro_key(mx, my);
    let entry = world.macro_cells.get_mut(&key)?;
    if entry.site_plan.is_none() {
        entry.site_plan = Some(build_site_plan(seed, mx, my, entry.l1, entry.caps));
    }
    entry.site_plan.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biome_detection_prefers_enumeration_order() {
        assert_eq!(detect_biome("A windy coast of pine islands."), Biome::Coast);
        assert_eq!(detect_biome("A dry canyon."), Biome::Desert);
        assert_eq!(detect_biome("Streets of the old city."), Biome::Urban);
        // "sand" and "shore" both present: desert precedes coast.
        assert_eq!(detect_biome("sand along the shore"), Biome::Desert);
        assert_eq!(detect_biome("a gray nothing"), Biome::Rural);
    }

    #[test]
    fn derived_seed_is_stable_and_non_negative() {
        let a = derive_world_seed("A dry canyon.");
        let b = derive_world_seed("A dry canyon.");
        assert_eq!(a, b);
        assert!(a <= 0x7FFF_FFFF);
        assert_ne!(a, derive_world_seed("A wet canyon."));
    }

    #[test]
    fn l0_ids_are_row_letter_col_number() {
        assert_eq!(l0_id(0, 0), "A1");
        assert_eq!(l0_id(3, 3), "D4");
        assert_eq!(l0_id(7, 7), "H8");
    }
}
