//! L2 settlement and POI interiors, L3 building interiors, and the layer
//! transitions between them. Settlements persist in `world.settlements`
//! and are reused by id.

use chrono::{DateTime, Utc};

use contracts::state::{
    Building, BuildingPurpose, Hazard, HazardKind, PoiInterior, Room, Settlement, SubPosition,
    WorldState,
};
use contracts::{Delta, ErrorCode, SettlementKind};

use crate::catalog::{
    building_name_pool, building_purpose_weights, room_count_range, settlement_building_count,
    settlement_interior_size, SETTLEMENT_NAME_PREFIXES, SETTLEMENT_NAME_SUFFIXES,
};
use crate::npc::{generate_npc_pool, npc_count_for_site};
use crate::rng::{choice, derive_seed, weighted_choice, KeyedRng};
use crate::Effects;

const STREET: &str = "street";
const LOT: &str = "lot";
const BUILDING_PLACEMENT_TRIES: usize = 40;

/// Settlement name from fixed word lists, picked by a seeded stream keyed
/// on `worldSeed|settlement_id|"name"`.
pub fn settlement_name(seed: u32, settlement_id: &str) -> String {
    let mut rng = KeyedRng::new(seed, &[settlement_id, "name"]);
    let prefix = choice(&SETTLEMENT_NAME_PREFIXES, rng.next_f64()).unwrap_or(&"Ald");
    let suffix = choice(&SETTLEMENT_NAME_SUFFIXES, rng.next_f64()).unwrap_or(&"ford");
    format!("{prefix}{suffix}")
}

fn settlement_population(seed: u32, settlement_id: &str, kind: SettlementKind) -> i64 {
    let base = match kind {
        SettlementKind::Outpost => 12,
        SettlementKind::Hamlet => 45,
        SettlementKind::Village => 160,
        SettlementKind::Town => 600,
        SettlementKind::City => 2_500,
        SettlementKind::Metropolis => 9_000,
    };
    let mut rng = KeyedRng::new(seed, &[settlement_id, "pop"]);
    base + rng.next_int(0, base / 5)
}

/// Builds a settlement interior: a square grid with a "+" of streets, a
/// scatter of named buildings, and the NPC pool distributed 70% to streets
/// (insertion order, round-robin) and the rest round-robin over buildings.
pub fn generate_settlement(
    seed: u32,
    settlement_id: &str,
    kind: SettlementKind,
    now: DateTime<Utc>,
) -> Settlement {
    let size = settlement_interior_size(kind);
    let mut grid: Vec<Vec<String>> = (0..size)
        .map(|_| (0..size).map(|_| LOT.to_string()).collect())
        .collect();

    let mid = size / 2;
    for x in 0..size {
        grid[mid as usize][x as usize] = STREET.to_string();
    }
    for row in grid.iter_mut() {
        row[mid as usize] = STREET.to_string();
    }

    let mut buildings = Vec::new();
    let mut rng = KeyedRng::new(seed, &[settlement_id, "buildings"]);
    for index in 0..settlement_building_count(kind) {
        let purpose = weighted_choice(building_purpose_weights(kind), rng.next_f64())
            .copied()
            .unwrap_or(BuildingPurpose::House);
        let mut placed_at = None;
        for _ in 0..BUILDING_PLACEMENT_TRIES {
            let x = rng.next_int(0, size - 1);
            let y = rng.next_int(0, size - 1);
            if grid[y as usize][x as usize] == LOT {
                placed_at = Some((x, y));
                break;
            }
        }
        let Some((x, y)) = placed_at else {
            continue;
        };
        let id = format!("bld_{settlement_id}_{index}");
        grid[y as usize][x as usize] = format!("building:{id}");
        let pool = building_name_pool(purpose);
        let name = choice(pool, rng.next_f64())
            .copied()
            .unwrap_or("an unmarked building")
            .to_string();
        buildings.push(Building {
            id,
            name,
            purpose,
            x,
            y,
            rooms: Vec::new(),
            npcs: Vec::new(),
        });
    }

    let npc_seed = derive_seed(seed, &[settlement_id, "npcs"]);
    let mut npcs = generate_npc_pool(settlement_id, npc_count_for_site(Some(kind)), npc_seed, now);

    // Street slots in row-major insertion order.
    let street_cells: Vec<(i64, i64)> = (0..size)
        .flat_map(|y| (0..size).map(move |x| (x, y)))
        .filter(|(x, y)| grid[*y as usize][*x as usize] == STREET)
        .collect();
    let street_share = npcs.len() * 7 / 10;
    for (index, npc) in npcs.iter_mut().take(street_share).enumerate() {
        if let Some((x, y)) = street_cells.get(index % street_cells.len().max(1)) {
            npc.position.lx = *x;
            npc.position.ly = *y;
        }
    }
    if !buildings.is_empty() {
        let buildings_len = buildings.len();
        for (index, npc) in npcs.iter().enumerate().skip(street_share) {
            let building = &mut buildings[(index - street_share) % buildings_len];
            building.npcs.push(npc.id.clone());
        }
    }

    Settlement {
        id: settlement_id.to_string(),
        name: settlement_name(seed, settlement_id),
        kind,
        tier: kind.tier_index(),
        population: settlement_population(seed, settlement_id, kind),
        width: size,
        height: size,
        grid,
        buildings,
        npcs,
    }
}

/// POI interior: a small grid sprinkled with 0..2 hazards.
pub fn generate_poi_interior(seed: u32, poi_id: &str) -> PoiInterior {
    let mut rng = KeyedRng::new(seed, &[poi_id, "poi"]);
    let size = rng.next_int(4, 7);
    let hazard_count = rng.next_int(0, 2);
    let kinds = [HazardKind::Water, HazardKind::Collapse, HazardKind::Gas];
    let hazards = (0..hazard_count)
        .map(|_| {
            let kind = choice(&kinds, rng.next_f64())
                .copied()
                .unwrap_or(HazardKind::Water);
            Hazard {
                kind,
                x: rng.next_int(0, size - 1),
                y: rng.next_int(0, size - 1),
            }
        })
        .collect();
    PoiInterior {
        id: poi_id.to_string(),
        width: size,
        height: size,
        hazards,
    }
}

/// Chain-connected rooms for one building; NPCs assigned round-robin.
fn generate_rooms(seed: u32, building: &Building) -> Vec<Room> {
    let (min_rooms, max_rooms) = room_count_range(building.purpose);
    let mut rng = KeyedRng::new(seed, &[&building.id, "rooms"]);
    let count = rng.next_int(min_rooms, max_rooms) as usize;

    let mut rooms: Vec<Room> = (0..count)
        .map(|index| Room {
            id: format!("{}_room_{index}", building.id),
            name: format!("{} room {}", building.purpose.as_str(), index + 1),
            exits: Default::default(),
            npcs: Vec::new(),
        })
        .collect();

    for index in 0..rooms.len().saturating_sub(1) {
        let next_id = rooms[index + 1].id.clone();
        let this_id = rooms[index].id.clone();
        rooms[index]
            .exits
            .insert(format!("to_{next_id}"), next_id.clone());
        rooms[index + 1].exits.insert(format!("to_{this_id}"), this_id);
    }

    if !rooms.is_empty() {
        for (index, npc_id) in building.npcs.iter().enumerate() {
            let slot = index % rooms.len();
            rooms[slot].npcs.push(npc_id.clone());
        }
    }

    rooms
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct L2Entry {
    pub interior_id: String,
    /// True when the settlement was generated by this transition; the
    /// caller seeds quests exactly once, on creation.
    pub created: bool,
    pub is_poi: bool,
}

/// Enters the interior under the player's current L1 cell. Settlements are
/// created on first entry and reused by id afterwards.
pub fn enter_l2_from_l1(
    world: &mut WorldState,
    seed: u32,
    now: DateTime<Utc>,
    effects: &mut Effects,
) -> Result<L2Entry, ErrorCode> {
    let position = world.position;
    let cell_key = contracts::state::cell_key(position.mx, position.my, position.lx, position.ly);
    let is_poi_cell = world
        .cells
        .get(&cell_key)
        .map(|cell| cell.tags.iter().any(|tag| tag == "poi"))
        .unwrap_or(false);

    let site = world.sites.values().find(|site| {
        site.mx == position.mx
            && site.my == position.my
            && site
                .cells
                .iter()
                .any(|cell| cell.lx == position.lx && cell.ly == position.ly)
    });

    let entry = if let Some(site) = site {
        let settlement_id = site.id.clone();
        let tier = site.tier;
        let created = if world.settlements.contains_key(&settlement_id) {
            false
        } else {
            let settlement = generate_settlement(seed, &settlement_id, tier, now);
            effects.deltas.push(Delta::add(
                format!("/world/settlements/{settlement_id}"),
                serde_json::json!({
                    "id": settlement.id,
                    "name": settlement.name,
                    "type": settlement.kind.as_str(),
                }),
            ));
            world.settlements.insert(settlement_id.clone(), settlement);
            true
        };
        L2Entry {
            interior_id: settlement_id,
            created,
            is_poi: false,
        }
    } else if is_poi_cell {
        let poi_id = format!("poi_{}_{}_{}_{}", position.mx, position.my, position.lx, position.ly);
        let created = if world.pois.contains_key(&poi_id) {
            false
        } else {
            let interior = generate_poi_interior(seed, &poi_id);
            effects.deltas.push(Delta::add(
                format!("/world/pois/{poi_id}"),
                serde_json::to_value(&interior).unwrap_or_else(|_| serde_json::json!({})),
            ));
            world.pois.insert(poi_id.clone(), interior);
            true
        };
        L2Entry {
            interior_id: poi_id,
            created,
            is_poi: true,
        }
    } else {
        return Err(ErrorCode::TargetNotVisible);
    };

    world.l2_active = Some(entry.interior_id.clone());
    world.l3_active = None;
    world.current_layer = 2;
    let center = world
        .settlements
        .get(&entry.interior_id)
        .map(|settlement| settlement.width / 2)
        .or_else(|| world.pois.get(&entry.interior_id).map(|poi| poi.width / 2))
        .unwrap_or(0);
    world.l2_position = Some(SubPosition {
        x: center,
        y: center,
    });
    effects.deltas.push(Delta::set(
        "/world/current_layer",
        serde_json::json!(2),
    ));
    effects.deltas.push(Delta::set(
        "/world/l2_active",
        serde_json::json!(entry.interior_id),
    ));

    Ok(entry)
}

pub fn exit_l2(world: &mut WorldState, effects: &mut Effects) {
    world.l2_active = None;
    world.l3_active = None;
    world.l2_position = None;
    world.current_layer = 1;
    effects
        .deltas
        .push(Delta::set("/world/current_layer", serde_json::json!(1)));
    effects
        .deltas
        .push(Delta::set("/world/l2_active", serde_json::Value::Null));
}

/// Enters a building within the active settlement, generating its rooms on
/// first entry.
pub fn enter_l3_from_l2(
    world: &mut WorldState,
    seed: u32,
    building_id: &str,
    effects: &mut Effects,
) -> Result<(), ErrorCode> {
    let Some(settlement_id) = world.l2_active.clone() else {
        return Err(ErrorCode::TargetNotVisible);
    };
    let Some(settlement) = world.settlements.get_mut(&settlement_id) else {
        return Err(ErrorCode::TargetNotVisible);
    };
    let Some(building) = settlement
        .buildings
        .iter_mut()
        .find(|building| building.id == building_id)
    else {
        return Err(ErrorCode::TargetNotVisible);
    };

    if building.rooms.is_empty() {
        building.rooms = generate_rooms(seed, building);
        effects.deltas.push(Delta::set(
            format!("/world/settlements/{settlement_id}/buildings/{building_id}/rooms"),
            serde_json::json!(building.rooms.len()),
        ));
    }

    world.l3_active = Some(building_id.to_string());
    world.current_layer = 3;
    effects
        .deltas
        .push(Delta::set("/world/current_layer", serde_json::json!(3)));
    effects.deltas.push(Delta::set(
        "/world/l3_active",
        serde_json::json!(building_id),
    ));
    Ok(())
}

pub fn exit_l3(world: &mut WorldState, effects: &mut Effects) {
    world.l3_active = None;
    world.current_layer = 2;
    effects
        .deltas
        .push(Delta::set("/world/current_layer", serde_json::json!(2)));
    effects
        .deltas
        .push(Delta::set("/world/l3_active", serde_json::Value::Null));
}
