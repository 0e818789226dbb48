//! The sliding streaming window: hydration, eviction, site reveal, and
//! terrain/description backfill. Running the step twice without movement
//! must produce zero deltas the second time.

use std::collections::BTreeMap;

use contracts::state::{cell_key, chebyshev, Cell, CellOffset, Site, SitePlan, WorldState};
use contracts::{Biome, Delta, SettlementKind};

use crate::catalog::{description_templates, terrain_palette};
use crate::rng::keyed_float;
use crate::worldgen::site_plan_for;
use crate::Effects;

/// Terrain types that mark a cell as a point of interest.
const POI_TYPES: [&str; 3] = ["ruin", "cave", "oasis"];

pub fn site_id_for_cluster(cluster_id: &str) -> String {
    format!("site_{cluster_id}")
}

fn cell_value(cell: &Cell) -> serde_json::Value {
    serde_json::to_value(cell).unwrap_or_else(|_| serde_json::json!({}))
}

/// One worldgen step at the current player position: ensure the plan,
/// hydrate the window, evict beyond it, reveal sites, backfill terrain.
pub fn world_gen_step(world: &mut WorldState, seed: u32, effects: &mut Effects) {
    let position = world.position;
    let Some(plan) = site_plan_for(world, seed, position.mx, position.my) else {
        return;
    };
    let biome = world
        .macro_cells
        .get(&contracts::state::macro_key(position.mx, position.my))
        .map(|entry| entry.biome)
        .or(world.macro_biome)
        .unwrap_or(Biome::Rural);

    let dims = world.l1_default;
    let radius = world.stream.r;
    let reach = world.stream.r + world.stream.p;

    // Hydration pass, row-major over the window.
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            let lx = position.lx + dx;
            let ly = position.ly + dy;
            if lx < 0 || ly < 0 || lx >= dims.w || ly >= dims.h {
                continue;
            }
            let dist = dx.abs().max(dy.abs());
            let key = cell_key(position.mx, position.my, lx, ly);
            let hydrated = dist <= radius;

            match world.cells.get_mut(&key) {
                None => {
                    let cell = Cell {
                        id: key.clone(),
                        mx: position.mx,
                        my: position.my,
                        lx,
                        ly,
                        cell_type: None,
                        subtype: None,
                        description: None,
                        known: true,
                        hydrated,
                        tags: Vec::new(),
                        is_custom: false,
                        items: Vec::new(),
                    };
                    effects
                        .deltas
                        .push(Delta::add(format!("/world/cells/{key}"), cell_value(&cell)));
                    world.cells.insert(key, cell);
                    effects.cell_rev = true;
                }
                Some(cell) => {
                    let mut changed = false;
                    if !cell.known {
                        cell.known = true;
                        changed = true;
                    }
                    if cell.hydrated != hydrated {
                        cell.hydrated = hydrated;
                        changed = true;
                    }
                    if changed {
                        effects
                            .deltas
                            .push(Delta::set(format!("/world/cells/{key}"), cell_value(cell)));
                        effects.cell_rev = true;
                    }
                }
            }
        }
    }

    // Eviction: nothing in the current macro survives beyond R+P.
    let evicted: Vec<String> = world
        .cells
        .values()
        .filter(|cell| {
            cell.mx == position.mx
                && cell.my == position.my
                && chebyshev(cell.lx, cell.ly, position.lx, position.ly) > reach
        })
        .map(|cell| cell.key())
        .collect();
    for key in evicted {
        world.cells.remove(&key);
        effects.deltas.push(Delta::del(format!("/world/cells/{key}")));
        effects.cell_rev = true;
    }

    reveal_sites(world, &plan, position.mx, position.my, effects);
    backfill_cells(world, &plan, seed, biome, position.mx, position.my, effects);
}

/// Promotes plan clusters whose center cell is currently hydrated. Sites
/// never unreveal.
fn reveal_sites(world: &mut WorldState, plan: &SitePlan, mx: i64, my: i64, effects: &mut Effects) {
    for cluster in &plan.clusters {
        let site_id = site_id_for_cluster(&cluster.cluster_id);
        if world.sites.contains_key(&site_id) {
            continue;
        }
        let center_key = cell_key(mx, my, cluster.center.lx, cluster.center.ly);
        let center_hydrated = world
            .cells
            .get(&center_key)
            .map(|cell| cell.hydrated)
            .unwrap_or(false);
        if !center_hydrated {
            continue;
        }
        let site = Site {
            id: site_id.clone(),
            mx,
            my,
            cluster_id: cluster.cluster_id.clone(),
            seg_index: cluster.seg_index,
            tier: cluster.tier,
            cells: cluster.cells.clone(),
            promoted: false,
        };
        effects.deltas.push(Delta::add(
            format!("/world/sites/{site_id}"),
            serde_json::to_value(&site).unwrap_or_else(|_| serde_json::json!({})),
        ));
        world.sites.insert(site_id, site);
        effects.site_rev = true;
    }
}

fn cluster_index(plan: &SitePlan) -> BTreeMap<(i64, i64), SettlementKind> {
    let mut index = BTreeMap::new();
    for cluster in &plan.clusters {
        for CellOffset { lx, ly } in &cluster.cells {
            index.insert((*lx, *ly), cluster.tier);
        }
    }
    index
}

/// Fills `(type, subtype)` for hydrated cells and a working description for
/// typed cells. `is_custom` cells are never overwritten.
fn backfill_cells(
    world: &mut WorldState,
    plan: &SitePlan,
    seed: u32,
    biome: Biome,
    mx: i64,
    my: i64,
    effects: &mut Effects,
) {
    let site_cells = cluster_index(plan);
    let palette = terrain_palette(biome);
    let templates = description_templates(biome);
    let mx_key = mx.to_string();
    let my_key = my.to_string();

    for cell in world.cells.values_mut() {
        if cell.mx != mx || cell.my != my || cell.is_custom {
            continue;
        }
        let mut changed = false;
        let lx_key = cell.lx.to_string();
        let ly_key = cell.ly.to_string();

        if cell.hydrated && cell.cell_type.is_none() {
            if let Some(tier) = site_cells.get(&(cell.lx, cell.ly)) {
                cell.cell_type = Some("settlement".to_string());
                cell.subtype = Some(tier.as_str().to_string());
                if !cell.tags.iter().any(|tag| tag == "site") {
                    cell.tags.push("site".to_string());
                }
            } else {
                let roll = keyed_float(seed, &["terrain", &mx_key, &my_key, &lx_key, &ly_key]);
                let idx = ((roll * palette.len() as f64) as usize).min(palette.len() - 1);
                let (cell_type, subtype) = palette[idx];
                cell.cell_type = Some(cell_type.to_string());
                cell.subtype = Some(subtype.to_string());
                if POI_TYPES.contains(&cell_type) && !cell.tags.iter().any(|tag| tag == "poi") {
                    cell.tags.push("poi".to_string());
                }
            }
            changed = true;
        }

        if cell.description.is_none() {
            if let (Some(cell_type), Some(subtype)) = (&cell.cell_type, &cell.subtype) {
                let roll = keyed_float(seed, &["desc", &mx_key, &my_key, &lx_key, &ly_key]);
                let idx = ((roll * templates.len() as f64) as usize).min(templates.len() - 1);
                let description = templates[idx]
                    .replace("{type}", &cell_type.replace('_', " "))
                    .replace("{subtype}", subtype);
                cell.description = Some(description);
                changed = true;
            }
        }

        if changed {
            let key = cell.key();
            effects
                .deltas
                .push(Delta::set(format!("/world/cells/{key}"), cell_value(cell)));
            effects.cell_rev = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::state::{macro_key, GridDims, MacroCaps, Position, StreamParams};
    use contracts::EngineConfig;

    fn test_world() -> WorldState {
        let config = EngineConfig::default();
        let mut world = WorldState {
            time_utc: "2026-08-01T00:00:00Z".to_string(),
            l0: GridDims {
                w: config.l0_w,
                h: config.l0_h,
            },
            macro_cells: BTreeMap::new(),
            l1_default: GridDims {
                w: config.l1_w,
                h: config.l1_h,
            },
            stream: StreamParams { r: 2, p: 1 },
            position: Position {
                mx: 3,
                my: 3,
                lx: 6,
                ly: 6,
            },
            cells: BTreeMap::new(),
            sites: BTreeMap::new(),
            settlements: BTreeMap::new(),
            pois: BTreeMap::new(),
            l2_active: None,
            l3_active: None,
            l2_position: None,
            current_layer: 1,
            macro_biome: Some(Biome::Coast),
        };
        let mut effects = Effects::new();
        crate::worldgen::seed_world_from_prompt(
            &mut world,
            &config,
            "A windy coast of pine islands.",
            &mut effects,
        );
        world
    }

    #[test]
    fn second_step_without_movement_is_silent() {
        let mut world = test_world();
        let mut first = Effects::new();
        world_gen_step(&mut world, 1337, &mut first);
        assert!(!first.deltas.is_empty());

        let known_before: Vec<String> = world.cells.keys().cloned().collect();
        let mut second = Effects::new();
        world_gen_step(&mut world, 1337, &mut second);
        assert!(second.deltas.is_empty(), "{:?}", second.deltas);
        let known_after: Vec<String> = world.cells.keys().cloned().collect();
        assert_eq!(known_before, known_after);
    }

    #[test]
    fn window_hydrates_within_r_and_knows_within_r_plus_p() {
        let mut world = test_world();
        let mut effects = Effects::new();
        world_gen_step(&mut world, 7, &mut effects);

        for cell in world.cells.values() {
            let dist = chebyshev(cell.lx, cell.ly, 6, 6);
            assert!(dist <= 3);
            assert!(cell.known);
            assert_eq!(cell.hydrated, dist <= 2, "cell {} dist {dist}", cell.id);
            if cell.hydrated {
                assert!(cell.cell_type.is_some());
                assert!(cell.description.is_some());
            }
        }
        let hydrated = world.cells.values().filter(|cell| cell.hydrated).count();
        assert!(hydrated >= 9);
    }

    #[test]
    fn movement_evicts_beyond_the_window() {
        let mut world = test_world();
        let mut effects = Effects::new();
        world_gen_step(&mut world, 42, &mut effects);

        world.position.lx = 9;
        let mut moved = Effects::new();
        world_gen_step(&mut world, 42, &mut moved);

        for cell in world.cells.values() {
            assert!(chebyshev(cell.lx, cell.ly, 9, 6) <= 3, "stale cell {}", cell.id);
        }
        assert!(moved
            .deltas
            .iter()
            .any(|delta| matches!(delta.op, contracts::DeltaOp::Del)));
    }

    #[test]
    fn revealed_sites_have_hydrated_centers_and_never_unreveal() {
        let mut world = test_world();
        // Walk the whole macro so every cluster center hydrates at least once.
        for ly in 0..12 {
            for lx in 0..12 {
                world.position.lx = lx;
                world.position.ly = ly;
                let mut effects = Effects::new();
                world_gen_step(&mut world, 1337, &mut effects);
            }
        }
        let plan = world
            .macro_cells
            .get(&macro_key(3, 3))
            .and_then(|entry| entry.site_plan.clone())
            .expect("plan cached");
        assert_eq!(world.sites.len(), plan.clusters.len());
        for site in world.sites.values() {
            assert!(!site.promoted);
            assert_eq!(site.mx, 3);
        }
    }

    #[test]
    fn custom_cells_are_never_overwritten() {
        let mut world = test_world();
        let key = cell_key(3, 3, 6, 6);
        world.cells.insert(
            key.clone(),
            Cell {
                id: key.clone(),
                mx: 3,
                my: 3,
                lx: 6,
                ly: 6,
                cell_type: Some("shrine".to_string()),
                subtype: Some("forgotten".to_string()),
                description: Some("A hand-written place.".to_string()),
                known: true,
                hydrated: true,
                tags: Vec::new(),
                is_custom: true,
                items: Vec::new(),
            },
        );
        let mut effects = Effects::new();
        world_gen_step(&mut world, 5, &mut effects);
        let cell = world.cells.get(&key).expect("still present");
        assert_eq!(cell.cell_type.as_deref(), Some("shrine"));
        assert_eq!(cell.description.as_deref(), Some("A hand-written place."));
    }

    #[test]
    fn macro_caps_hold_in_cached_plans() {
        let mut world = test_world();
        let plan = site_plan_for(&mut world, 2026, 3, 3).expect("plan");
        let entry = world.macro_cells.get(&macro_key(3, 3)).expect("macro");
        assert_eq!(entry.caps, MacroCaps { city: 1, metropolis: 0 });
        let again = site_plan_for(&mut world, 2026, 3, 3).expect("cached plan");
        assert_eq!(plan, again);
    }
}
