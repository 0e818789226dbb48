//! Intent normalization, validation, and application. Validation never
//! mutates state; every failure is a stable error code with state
//! unchanged.

use chrono::{DateTime, Utc};

use contracts::action::{
    Action, Direction, Intent, QuestActionKind, RawAction, RawIntent, ShallowKind, TrivialKind,
};
use contracts::state::{Cell, Item, Npc, SessionState};
use contracts::{Delta, ErrorCode};

use crate::worldgen::{enter_l2_from_l1, enter_l3_from_l2, exit_l2, exit_l3, L2Entry};
use crate::Effects;

pub const MIN_PARSER_CONFIDENCE: f64 = 0.5;
const CELL_MATCH_THRESHOLD: i64 = 6;
const INVENTORY_ACCEPT_SCORE: i64 = 20;
const INVENTORY_ACCEPT_GAP: i64 = 10;

/// What the orchestrator must do after an action applies.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    None,
    Moved,
    EnteredL2(L2Entry),
    QuestAction {
        kind: QuestActionKind,
        quest_id: Option<String>,
        npc_id: Option<String>,
    },
}

pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (row, ca) in a.iter().enumerate() {
        current[0] = row + 1;
        for (col, cb) in b.iter().enumerate() {
            let substitution = prev[col] + usize::from(ca != cb);
            current[col + 1] = substitution.min(prev[col + 1] + 1).min(current[col] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

/// Alias score: 10 for a name match, +6 for an alias match, + context
/// bonus capped at 4, −2 when the closest edit distance exceeds 2.
pub fn alias_score(query: &str, name: &str, aliases: &[String], ctx_bonus: i64) -> i64 {
    let query = query.trim().to_lowercase();
    let name_lower = name.to_lowercase();
    let mut score = 0;
    if query == name_lower {
        score += 10;
    }
    if aliases.iter().any(|alias| alias.to_lowercase() == query) {
        score += 6;
    }
    score += ctx_bonus.min(4);
    let min_distance = std::iter::once(&name_lower)
        .chain(aliases.iter().map(|alias| alias as &String))
        .map(|candidate| levenshtein(&query, &candidate.to_lowercase()))
        .min()
        .unwrap_or(usize::MAX);
    if min_distance > 2 {
        score -= 2;
    }
    score
}

/// Strict inventory resolution: the top candidate wins only with score ≥ 20
/// and a gap of ≥ 10 to the runner-up.
pub fn resolve_inventory_index(query: &str, items: &[Item]) -> Option<usize> {
    let mut scored: Vec<(usize, i64)> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let exact_bonus = if item.name.to_lowercase() == query.trim().to_lowercase() {
                4
            } else {
                0
            };
            (index, alias_score(query, &item.name, &item.aliases, exact_bonus))
        })
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1));
    let (best_index, best_score) = *scored.first()?;
    if best_score < INVENTORY_ACCEPT_SCORE {
        return None;
    }
    let runner_up = scored.get(1).map(|(_, score)| *score).unwrap_or(i64::MIN);
    if best_score - runner_up < INVENTORY_ACCEPT_GAP {
        return None;
    }
    Some(best_index)
}

/// Loose inventory match by case-insensitive name or alias, the shape used
/// by `drop` validation.
pub fn inventory_name_match(query: &str, items: &[Item]) -> Option<usize> {
    let query = query.trim().to_lowercase();
    items.iter().position(|item| {
        item.name.to_lowercase() == query
            || item.aliases.iter().any(|alias| alias.to_lowercase() == query)
    })
}

pub fn current_cell(state: &SessionState) -> Option<&Cell> {
    let position = state.world.position;
    state.world.cells.get(&contracts::state::cell_key(
        position.mx,
        position.my,
        position.lx,
        position.ly,
    ))
}

/// NPCs the player can currently see: the active settlement's pool when
/// inside one, nothing out on open terrain.
pub fn present_npcs(state: &SessionState) -> Vec<&Npc> {
    let Some(settlement_id) = state.world.l2_active.as_ref() else {
        return Vec::new();
    };
    state
        .world
        .settlements
        .get(settlement_id)
        .map(|settlement| settlement.npcs.iter().collect())
        .unwrap_or_default()
}

fn normalize_action(raw: &RawAction) -> Result<Action, ErrorCode> {
    let verb = raw.action.trim().to_lowercase();
    if verb.is_empty() {
        return Err(ErrorCode::EmptyAction);
    }
    if let Some(trivial) = TrivialKind::parse(&verb) {
        return Ok(Action::Trivial { verb: trivial });
    }
    if let Some(shallow) = ShallowKind::parse(&verb) {
        return Ok(Action::Shallow { verb: shallow });
    }
    let target = raw.target.as_deref().map(str::trim).unwrap_or_default();
    match verb.as_str() {
        "move" | "go" | "walk" | "travel" => {
            let dir_raw = raw.dir.as_deref().unwrap_or(target);
            match Direction::canonicalize(dir_raw) {
                Some(dir) => Ok(Action::Move { dir }),
                None => Err(ErrorCode::InvalidDirection),
            }
        }
        "take" | "get" | "grab" | "pick_up" => {
            if target.is_empty() {
                Err(ErrorCode::EmptyAction)
            } else {
                Ok(Action::Take {
                    target: target.to_string(),
                })
            }
        }
        "drop" => {
            if target.is_empty() {
                Err(ErrorCode::EmptyAction)
            } else {
                Ok(Action::Drop {
                    target: target.to_string(),
                })
            }
        }
        "examine" | "inspect" | "look_at" => Ok(Action::Examine {
            target: target.to_string(),
        }),
        "talk" | "talk_to" | "speak" => Ok(Action::Talk {
            target: target.to_string(),
        }),
        "accept_quest" => Ok(Action::Quest {
            action: QuestActionKind::Accept,
            quest_id: raw.target.clone(),
            npc_id: None,
        }),
        "complete_quest" => Ok(Action::Quest {
            action: QuestActionKind::Complete,
            quest_id: raw.target.clone(),
            npc_id: None,
        }),
        "ask_about_quest" => Ok(Action::Quest {
            action: QuestActionKind::AskAbout,
            quest_id: None,
            npc_id: raw.target.clone(),
        }),
        _ => Ok(Action::Unknown { raw: verb }),
    }
}

/// Legacy pattern fallback: `look`, `take X`, `drop X`, `move <dir>`.
pub fn parse_fallback(text: &str) -> Option<Intent> {
    let trimmed = text.trim().to_lowercase();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed == "look" || trimmed == "look around" {
        return Some(Intent::simple(Action::Trivial {
            verb: TrivialKind::Look,
        }));
    }
    let (verb, rest) = match trimmed.split_once(' ') {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (trimmed.as_str(), ""),
    };
    match verb {
        "take" | "get" if !rest.is_empty() => Some(Intent::simple(Action::Take {
            target: rest.to_string(),
        })),
        "drop" if !rest.is_empty() => Some(Intent::simple(Action::Drop {
            target: rest.to_string(),
        })),
        "move" | "go" => Direction::canonicalize(rest)
            .map(|dir| Intent::simple(Action::Move { dir })),
        _ => None,
    }
}

const NOOP_RAW: &str = "noop";

pub fn noop_intent() -> Intent {
    Intent {
        primary: Action::Unknown {
            raw: NOOP_RAW.to_string(),
        },
        secondary: Vec::new(),
        compound: false,
        confidence: 0.0,
    }
}

/// Turns the semantic parser's raw reply into a normalized intent, falling
/// back to the pattern parser on failure, low confidence, or a missing
/// primary action; a dead end yields a noop.
pub fn resolve_intent(raw: Option<&RawIntent>, text: &str) -> Result<Intent, ErrorCode> {
    if text.trim().is_empty() {
        return Err(ErrorCode::EmptyInput);
    }

    if let Some(raw) = raw {
        let usable = raw.primary_action.is_some() && raw.confidence >= MIN_PARSER_CONFIDENCE;
        if usable {
            let primary_raw = raw.primary_action.as_ref().ok_or(ErrorCode::NoPrimaryAction)?;
            // A confident parse with a bad payload is a validation failure,
            // not a parser failure; it surfaces instead of falling back.
            let primary = normalize_action(primary_raw)?;
            let mut secondary = Vec::new();
            for entry in &raw.secondary_actions {
                if let Ok(action) = normalize_action(entry) {
                    secondary.push(action);
                }
            }
            return Ok(Intent {
                primary,
                secondary,
                compound: raw.compound,
                confidence: raw.confidence,
            });
        }
    }

    Ok(parse_fallback(text).unwrap_or_else(noop_intent))
}

/// Builds the action queue and validates each entry against current state
/// without mutating anything.
pub fn validate_queue(state: &SessionState, intent: &Intent) -> Result<Vec<Action>, ErrorCode> {
    let mut queue = vec![intent.primary.clone()];
    if intent.compound {
        queue.extend(intent.secondary.iter().cloned());
    }

    for action in &queue {
        validate_action(state, action)?;
    }
    Ok(queue)
}

fn validate_action(state: &SessionState, action: &Action) -> Result<(), ErrorCode> {
    match action {
        // Canonicalization happened at normalize time; any Direction is valid.
        Action::Move { .. } => Ok(()),
        Action::Take { target } => {
            let cell = current_cell(state).ok_or(ErrorCode::TargetNotFoundInCell)?;
            let best = cell
                .items
                .iter()
                .map(|item| alias_score(target, &item.name, &item.aliases, 0))
                .max()
                .unwrap_or(i64::MIN);
            if best >= CELL_MATCH_THRESHOLD {
                Ok(())
            } else {
                Err(ErrorCode::TargetNotFoundInCell)
            }
        }
        Action::Drop { target } => inventory_name_match(target, &state.player.inventory)
            .map(|_| ())
            .ok_or(ErrorCode::TargetNotInInventory),
        Action::Examine { target } => {
            let in_cell = current_cell(state)
                .map(|cell| {
                    cell.items
                        .iter()
                        .any(|item| alias_score(target, &item.name, &item.aliases, 0) >= CELL_MATCH_THRESHOLD)
                })
                .unwrap_or(false);
            let in_inventory = inventory_name_match(target, &state.player.inventory).is_some();
            let npc_visible = find_present_npc(state, target).is_some();
            if in_cell || in_inventory || npc_visible {
                Ok(())
            } else {
                Err(ErrorCode::TargetNotVisible)
            }
        }
        Action::Talk { target } => find_present_npc(state, target)
            .map(|_| ())
            .ok_or(ErrorCode::NpcNotPresent),
        // Quest transitions re-validate in depth when they apply.
        Action::Quest { .. } => Ok(()),
        Action::Trivial { .. } => Ok(()),
        // Noted in the result but never failed.
        Action::Shallow { .. } => Ok(()),
        // Unknown actions pass through with a note.
        Action::Unknown { .. } => Ok(()),
    }
}

/// Case-insensitive NPC lookup by id, job category, or id tail.
pub fn find_present_npc<'a>(state: &'a SessionState, target: &str) -> Option<&'a Npc> {
    let needle = target.trim().to_lowercase();
    if needle.is_empty() {
        return None;
    }
    present_npcs(state).into_iter().find(|npc| {
        npc.id.to_lowercase() == needle
            || npc.job_category.to_lowercase() == needle
            || npc
                .id
                .rsplit_once('#')
                .map(|(_, tail)| tail.to_lowercase() == needle)
                .unwrap_or(false)
    })
}

/// Applies one validated action. Movement routes back through worldgen;
/// `drop` splices inventory and re-emits the whole list; the trivial and
/// shallow groups do not mutate.
pub fn apply_action(
    state: &mut SessionState,
    action: &Action,
    now: DateTime<Utc>,
    effects: &mut Effects,
) -> Result<Applied, ErrorCode> {
    match action {
        Action::Move { dir } => apply_move(state, *dir, now, effects),
        Action::Drop { target } => {
            let index = inventory_name_match(target, &state.player.inventory)
                .ok_or(ErrorCode::TargetNotInInventory)?;
            state.player.inventory.remove(index);
            effects.deltas.push(Delta::set(
                "/player/inventory",
                serde_json::to_value(&state.player.inventory)
                    .unwrap_or_else(|_| serde_json::json!([])),
            ));
            effects.inventory_rev = true;
            Ok(Applied::None)
        }
        Action::Quest {
            action,
            quest_id,
            npc_id,
        } => Ok(Applied::QuestAction {
            kind: *action,
            quest_id: quest_id.clone(),
            npc_id: npc_id.clone(),
        }),
        Action::Take { .. }
        | Action::Examine { .. }
        | Action::Talk { .. }
        | Action::Trivial { .. }
        | Action::Shallow { .. }
        | Action::Unknown { .. } => Ok(Applied::None),
    }
}

fn apply_move(
    state: &mut SessionState,
    dir: Direction,
    now: DateTime<Utc>,
    effects: &mut Effects,
) -> Result<Applied, ErrorCode> {
    let layer = state.world.current_layer;
    match (dir, layer) {
        (Direction::Down, 1) => match enter_l2_from_l1(&mut state.world, state.rng_seed, now, effects)
        {
            Ok(entry) => Ok(Applied::EnteredL2(entry)),
            // Plain terrain under the player: vertical moves no-op.
            Err(_) => Ok(Applied::None),
        },
        (Direction::Up, 2) => {
            exit_l2(&mut state.world, effects);
            Ok(Applied::None)
        }
        (Direction::Up, 3) => {
            exit_l3(&mut state.world, effects);
            Ok(Applied::None)
        }
        (Direction::Down, 2) => {
            let building_id = state.world.l2_active.clone().and_then(|settlement_id| {
                let sub = state.world.l2_position?;
                state
                    .world
                    .settlements
                    .get(&settlement_id)
                    .and_then(|settlement| {
                        settlement
                            .buildings
                            .iter()
                            .find(|building| building.x == sub.x && building.y == sub.y)
                            .map(|building| building.id.clone())
                    })
            });
            if let Some(building_id) = building_id {
                let _ = enter_l3_from_l2(&mut state.world, state.rng_seed, &building_id, effects);
            }
            Ok(Applied::None)
        }
        (Direction::Up, _) | (Direction::Down, _) => Ok(Applied::None),
        (_, 1) => {
            let (dx, dy) = dir.grid_delta();
            let dims = state.world.l1_default;
            let position = &mut state.world.position;
            let nx = (position.lx + dx).clamp(0, dims.w - 1);
            let ny = (position.ly + dy).clamp(0, dims.h - 1);
            let moved = nx != position.lx || ny != position.ly;
            position.lx = nx;
            position.ly = ny;
            if moved {
                effects.deltas.push(Delta::set(
                    "/world/position",
                    serde_json::to_value(*position).unwrap_or_else(|_| serde_json::json!({})),
                ));
                Ok(Applied::Moved)
            } else {
                // Off-grid movement is a silent no-op; WORLD_WRAP stays off.
                Ok(Applied::None)
            }
        }
        (_, _) => {
            let (dx, dy) = dir.grid_delta();
            if let (Some(sub), Some(settlement_id)) =
                (state.world.l2_position, state.world.l2_active.clone())
            {
                let bound = state
                    .world
                    .settlements
                    .get(&settlement_id)
                    .map(|settlement| (settlement.width, settlement.height))
                    .or_else(|| {
                        state
                            .world
                            .pois
                            .get(&settlement_id)
                            .map(|poi| (poi.width, poi.height))
                    });
                if let Some((width, height)) = bound {
                    let moved = contracts::state::SubPosition {
                        x: (sub.x + dx).clamp(0, width - 1),
                        y: (sub.y + dy).clamp(0, height - 1),
                    };
                    if moved != sub {
                        state.world.l2_position = Some(moved);
                        effects.deltas.push(Delta::set(
                            "/world/l2_position",
                            serde_json::to_value(moved).unwrap_or_else(|_| serde_json::json!({})),
                        ));
                    }
                }
            }
            Ok(Applied::None)
        }
    }
}
