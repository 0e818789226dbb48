//! Constraint-first quest engine. Rewards, enemies, and travel are fixed
//! before any narrative exists; narrative replies are validated against the
//! constraint record and fall back to deterministic templates on any
//! violation.

use contracts::quest::{
    Complexity, Difficulty, FailureConsequence, FailureTrigger, FailureTriggerKind,
    NarrativeRequest, Quest, QuestConstraints, QuestNarrative, QuestStatus, QuestStep, StepChoice,
};
use contracts::state::{Item, ItemProps, SessionState};
use contracts::{Delta, ErrorCode, SettlementKind};

use crate::rng::{choice, weighted_choice, KeyedRng};
use crate::Effects;

pub const GOLD_ITEM_ID: &str = "gold";

const DIFFICULTY_WEIGHTS: [(Difficulty, f64); 5] = [
    (Difficulty::Trivial, 0.15),
    (Difficulty::Easy, 0.30),
    (Difficulty::Moderate, 0.35),
    (Difficulty::Hard, 0.15),
    (Difficulty::Deadly, 0.05),
];

const COMPLEXITY_WEIGHTS: [(Complexity, f64); 4] = [
    (Complexity::Single, 0.4),
    (Complexity::Short, 0.3),
    (Complexity::Medium, 0.2),
    (Complexity::Dynamic, 0.1),
];

const REWARD_ITEM_WEIGHTS: [(u8, f64); 3] = [(0, 0.70), (1, 0.25), (2, 0.05)];

const FAILURE_KINDS: [FailureTriggerKind; 4] = [
    FailureTriggerKind::Observability,
    FailureTriggerKind::Innocence,
    FailureTriggerKind::Destruction,
    FailureTriggerKind::MoralChoice,
];

const CONSEQUENCE_WEIGHTS: [(FailureConsequence, f64); 3] = [
    (FailureConsequence::PermanentFailure, 0.4),
    (FailureConsequence::EscalatedDifficulty, 0.3),
    (FailureConsequence::RedemptionAvailable, 0.3),
];

/// Quest availability probability range per settlement size; kinds outside
/// the table never offer quests.
pub fn availability_range(kind: SettlementKind) -> Option<(f64, f64)> {
    match kind {
        SettlementKind::Hamlet => Some((0.10, 0.20)),
        SettlementKind::Village => Some((0.30, 0.40)),
        SettlementKind::Town => Some((0.50, 0.70)),
        SettlementKind::City => Some((0.80, 1.00)),
        SettlementKind::Outpost | SettlementKind::Metropolis => None,
    }
}

pub fn reward_gold_range(difficulty: Difficulty) -> (i64, i64) {
    match difficulty {
        Difficulty::Trivial => (5, 25),
        Difficulty::Easy => (25, 75),
        Difficulty::Moderate => (75, 250),
        Difficulty::Hard => (250, 750),
        Difficulty::Deadly => (750, 2_000),
    }
}

pub fn allowed_enemy_types(difficulty: Difficulty) -> &'static [&'static str] {
    match difficulty {
        Difficulty::Trivial => &["rats", "stray dog", "petty thief"],
        Difficulty::Easy => &["bandit", "wolf", "boar", "grave robber"],
        Difficulty::Moderate => &["brigand band", "ghoul", "giant spider", "cultist"],
        Difficulty::Hard => &["ogre", "wraith", "mercenary company", "troll"],
        Difficulty::Deadly => &["lich", "wyvern", "demon", "elder horror"],
    }
}

pub fn forbidden_keywords(difficulty: Difficulty) -> &'static [&'static str] {
    match difficulty {
        Difficulty::Trivial | Difficulty::Easy => {
            &["dragon", "god", "demon", "lich", "ancient evil"]
        }
        Difficulty::Moderate => &["dragon", "god"],
        Difficulty::Hard => &["god"],
        Difficulty::Deadly => &[],
    }
}

fn enemy_count_range(difficulty: Difficulty) -> (i64, i64) {
    match difficulty {
        Difficulty::Trivial => (0, 1),
        Difficulty::Easy => (0, 2),
        Difficulty::Moderate => (1, 4),
        Difficulty::Hard => (2, 6),
        Difficulty::Deadly => (3, 10),
    }
}

fn travel_distance_range(difficulty: Difficulty) -> (i64, i64) {
    match difficulty {
        Difficulty::Trivial => (0, 1),
        Difficulty::Easy => (1, 3),
        Difficulty::Moderate => (2, 5),
        Difficulty::Hard => (3, 8),
        Difficulty::Deadly => (5, 12),
    }
}

/// Settlement-size multiplier applied to the difficulty weights. A hamlet
/// never rolls deadly.
fn difficulty_modifier(kind: SettlementKind, difficulty: Difficulty) -> f64 {
    let row: [f64; 5] = match kind {
        SettlementKind::Hamlet => [1.5, 1.2, 0.8, 0.4, 0.0],
        SettlementKind::Village => [1.2, 1.1, 1.0, 0.7, 0.2],
        SettlementKind::Town => [1.0, 1.0, 1.1, 1.0, 0.6],
        SettlementKind::City => [0.8, 0.9, 1.1, 1.2, 1.0],
        SettlementKind::Outpost | SettlementKind::Metropolis => [1.0, 1.0, 1.0, 1.0, 1.0],
    };
    row[difficulty as usize]
}

fn step_count(complexity: Complexity, rng: &mut KeyedRng) -> usize {
    match complexity {
        Complexity::Single => 1,
        Complexity::Short => rng.next_int(2, 3) as usize,
        Complexity::Medium => rng.next_int(4, 6) as usize,
        Complexity::Dynamic => rng.next_int(3, 5) as usize,
    }
}

/// Rolls the full constraint record for one quest slot. Everything here is
/// decided before narrative generation.
pub fn roll_quest_constraints(
    rng: &mut KeyedRng,
    kind: SettlementKind,
    population: i64,
) -> QuestConstraints {
    let weights: Vec<(Difficulty, f64)> = DIFFICULTY_WEIGHTS
        .iter()
        .map(|(difficulty, weight)| (*difficulty, weight * difficulty_modifier(kind, *difficulty)))
        .collect();
    let difficulty = weighted_choice(&weights, rng.next_f64())
        .copied()
        .unwrap_or(Difficulty::Easy);

    let (gold_lo, gold_hi) = reward_gold_range(difficulty);
    let reward_gold = rng.next_int(gold_lo, gold_hi);

    let allowed = allowed_enemy_types(difficulty);
    let pick_count = rng.next_int(1, 3.min(allowed.len() as i64)) as usize;
    let mut enemy_types: Vec<String> = Vec::with_capacity(pick_count);
    while enemy_types.len() < pick_count {
        let mut idx = ((rng.next_f64() * allowed.len() as f64) as usize).min(allowed.len() - 1);
        while enemy_types.iter().any(|existing| existing == allowed[idx]) {
            idx = (idx + 1) % allowed.len();
        }
        enemy_types.push(allowed[idx].to_string());
    }

    let (count_lo, count_hi) = enemy_count_range(difficulty);
    let enemy_count = rng.next_int(count_lo, count_hi);

    let (travel_lo, travel_hi) = travel_distance_range(difficulty);
    let travel_distance = rng.next_int(travel_lo, travel_hi);

    let reward_items = weighted_choice(&REWARD_ITEM_WEIGHTS, rng.next_f64())
        .copied()
        .unwrap_or(0);

    let complexity = weighted_choice(&COMPLEXITY_WEIGHTS, rng.next_f64())
        .copied()
        .unwrap_or(Complexity::Single);
    let total_steps = step_count(complexity, rng);

    QuestConstraints {
        difficulty,
        reward_gold,
        reward_items,
        enemy_types,
        enemy_count,
        travel_distance,
        forbidden_keywords: forbidden_keywords(difficulty)
            .iter()
            .map(|keyword| keyword.to_string())
            .collect(),
        complexity,
        total_steps,
        settlement_type: kind,
        population,
    }
}

/// Step skeleton: 2–3 forward-pointing choices on every non-final step and
/// 1–2 failure triggers per step.
pub fn build_steps(rng: &mut KeyedRng, total_steps: usize) -> Vec<QuestStep> {
    (1..=total_steps)
        .map(|step_id| {
            let choices = if step_id < total_steps {
                let count = rng.next_int(2, 3) as usize;
                (0..count)
                    .map(|choice_index| {
                        let leads_to =
                            rng.next_int(step_id as i64 + 1, total_steps as i64) as usize;
                        StepChoice {
                            id: format!("choice_{step_id}_{choice_index}"),
                            leads_to_step: leads_to,
                            consequences: Vec::new(),
                        }
                    })
                    .collect()
            } else {
                Vec::new()
            };

            let trigger_count = rng.next_int(1, 2) as usize;
            let failure_triggers = (0..trigger_count)
                .map(|_| {
                    let kind = choice(&FAILURE_KINDS, rng.next_f64())
                        .copied()
                        .unwrap_or(FailureTriggerKind::Observability);
                    let consequence = weighted_choice(&CONSEQUENCE_WEIGHTS, rng.next_f64())
                        .copied()
                        .unwrap_or(FailureConsequence::PermanentFailure);
                    FailureTrigger { kind, consequence }
                })
                .collect();

            QuestStep {
                id: step_id,
                narrative: String::new(),
                objective: format!("advance the task ({step_id}/{total_steps})"),
                choices,
                failure_triggers,
            }
        })
        .collect()
}

/// Narrative validation failures, in check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NarrativeViolation {
    MissingField(&'static str),
    ForbiddenKeyword(String),
    RewardMismatch,
    DisallowedEnemy(String),
    UnknownStepId(String),
}

fn narrative_texts(candidate: &QuestNarrative) -> Vec<&str> {
    let mut texts = vec![
        candidate.narrative.as_str(),
        candidate.objective_description.as_str(),
        candidate.reward_description.as_str(),
    ];
    texts.extend(candidate.narrative_hooks.iter().map(String::as_str));
    texts.extend(candidate.complications.iter().map(String::as_str));
    texts.extend(candidate.failure_conditions.iter().map(String::as_str));
    texts.extend(candidate.step_narratives.values().map(String::as_str));
    texts
}

/// Validates a candidate narrative against the constraint record:
/// required fields, forbidden keywords, reward amount, allowed enemies,
/// and declared step ids.
pub fn validate_narrative(
    constraints: &QuestConstraints,
    step_ids: &[usize],
    candidate: &QuestNarrative,
) -> Result<(), NarrativeViolation> {
    for (field, value) in [
        ("narrative", &candidate.narrative),
        ("objective_description", &candidate.objective_description),
        ("reward_description", &candidate.reward_description),
        ("protagonist", &candidate.protagonist),
        ("antagonist", &candidate.antagonist),
    ] {
        if value.trim().is_empty() {
            return Err(NarrativeViolation::MissingField(field));
        }
    }

    let texts = narrative_texts(candidate);
    for keyword in &constraints.forbidden_keywords {
        let keyword_lower = keyword.to_lowercase();
        if texts
            .iter()
            .any(|text| text.to_lowercase().contains(&keyword_lower))
        {
            return Err(NarrativeViolation::ForbiddenKeyword(keyword.clone()));
        }
    }

    if mentions_wrong_gold(&candidate.reward_description, constraints.reward_gold) {
        return Err(NarrativeViolation::RewardMismatch);
    }

    let allowed = allowed_enemy_types(constraints.difficulty);
    for difficulty in Difficulty::ALL {
        for enemy in allowed_enemy_types(difficulty) {
            if allowed.contains(enemy) {
                continue;
            }
            let enemy_lower = enemy.to_lowercase();
            if texts
                .iter()
                .any(|text| text.to_lowercase().contains(&enemy_lower))
            {
                return Err(NarrativeViolation::DisallowedEnemy(enemy.to_string()));
            }
        }
    }

    for key in candidate.step_narratives.keys() {
        let parsed: Option<usize> = key.parse().ok();
        let known = parsed.map(|id| step_ids.contains(&id)).unwrap_or(false);
        if !known {
            return Err(NarrativeViolation::UnknownStepId(key.clone()));
        }
    }

    Ok(())
}

/// True when the reward text names a gold amount different from the rolled
/// one.
fn mentions_wrong_gold(reward_description: &str, reward_gold: i64) -> bool {
    let tokens: Vec<&str> = reward_description.split_whitespace().collect();
    for window in tokens.windows(2) {
        let amount: Option<i64> = window[0]
            .trim_matches(|c: char| !c.is_ascii_digit())
            .parse()
            .ok();
        let names_gold = window[1].to_lowercase().starts_with("gold");
        if let (Some(amount), true) = (amount, names_gold) {
            if amount != reward_gold {
                return true;
            }
        }
    }
    false
}

/// Deterministic template narrative, used whenever the generated candidate
/// fails validation or no generator is available.
pub fn fallback_narrative(
    constraints: &QuestConstraints,
    settlement_name: &str,
) -> QuestNarrative {
    let antagonist = constraints
        .enemy_types
        .first()
        .cloned()
        .unwrap_or_else(|| "trouble on the road".to_string());
    let template = match constraints.difficulty {
        Difficulty::Trivial => "Small trouble in ${settlement}: ${antagonist} have been at the stores again. Someone should deal with it before it grows.",
        Difficulty::Easy => "Word in ${settlement} is that ${antagonist} have been seen near the outlying paths. The locals will pay to be rid of the worry.",
        Difficulty::Moderate => "${settlement} has a real problem: ${antagonist} struck twice this week, and the council is offering coin to whoever ends it.",
        Difficulty::Hard => "People in ${settlement} bar their doors at dusk. The ${antagonist} behind it has bested every attempt so far; the reward has grown accordingly.",
        Difficulty::Deadly => "No one in ${settlement} speaks of it above a whisper. Whatever the ${antagonist} wants, it is patient, and the purse offered for its end would buy a farm.",
    };
    let narrative = template
        .replace("${settlement}", settlement_name)
        .replace("${antagonist}", &antagonist);
    QuestNarrative {
        narrative,
        objective_description: format!(
            "Resolve the trouble plaguing {settlement_name} ({} steps).",
            constraints.total_steps
        ),
        reward_description: format!("{} gold on completion.", constraints.reward_gold),
        protagonist: "a capable traveler".to_string(),
        antagonist,
        narrative_hooks: Vec::new(),
        complications: Vec::new(),
        failure_conditions: Vec::new(),
        step_narratives: Default::default(),
    }
}

/// Folds a validated (or fallback) narrative into the quest structure.
pub fn integrate_narrative(quest: &mut Quest, candidate: Option<QuestNarrative>, settlement_name: &str) {
    let step_ids: Vec<usize> = quest.steps.iter().map(|step| step.id).collect();
    let (narrative, is_fallback) = match candidate {
        Some(candidate)
            if validate_narrative(&quest.constraints, &step_ids, &candidate).is_ok() =>
        {
            (candidate, false)
        }
        _ => (fallback_narrative(&quest.constraints, settlement_name), true),
    };

    for step in quest.steps.iter_mut() {
        if let Some(text) = narrative.step_narratives.get(&step.id.to_string()) {
            step.narrative = text.clone();
        } else if step.narrative.is_empty() {
            step.narrative = format!("{} ({} of {})", narrative.narrative, step.id, quest.total_steps);
        }
    }

    quest.narrative = narrative.narrative;
    quest.objective_description = narrative.objective_description;
    quest.reward_description = narrative.reward_description;
    quest.protagonist = narrative.protagonist;
    quest.antagonist = narrative.antagonist;
    quest.narrative_hooks = narrative.narrative_hooks;
    quest.complications = narrative.complications;
    quest.failure_conditions = narrative.failure_conditions;
    quest.is_fallback = is_fallback;
}

/// Seeds a newly created settlement with up to the per-settlement quest cap
/// and returns narrative requests for the non-fallback path.
pub fn seed_settlement_quests(
    state: &mut SessionState,
    settlement_id: &str,
    effects: &mut Effects,
) -> Vec<NarrativeRequest> {
    let seed = state.rng_seed;
    let Some(settlement) = state.world.settlements.get_mut(settlement_id) else {
        return Vec::new();
    };
    let Some((prob_lo, prob_hi)) = availability_range(settlement.kind) else {
        return Vec::new();
    };

    let mut prob_rng = KeyedRng::new(seed, &[settlement_id, "quest_prob"]);
    let availability = prob_lo + prob_rng.next_f64() * (prob_hi - prob_lo);

    let max_per_settlement = state.quests.config.max_quests_per_settlement;
    let mut seeded = Vec::new();
    let mut requests = Vec::new();

    for slot in 0..max_per_settlement {
        let slot_key = slot.to_string();
        let mut rng = KeyedRng::new(seed, &[settlement_id, "quest", &slot_key]);
        if rng.next_f64() >= availability {
            continue;
        }

        let constraints = roll_quest_constraints(&mut rng, settlement.kind, settlement.population);
        let steps = build_steps(&mut rng, constraints.total_steps);

        let giver_index = if settlement.npcs.is_empty() {
            None
        } else {
            Some(
                ((rng.next_f64() * settlement.npcs.len() as f64) as usize)
                    .min(settlement.npcs.len() - 1),
            )
        };
        let giver_npc_id = match giver_index {
            Some(index) => {
                let giver = &mut settlement.npcs[index];
                giver.is_quest_giver = true;
                giver.quest_giver_rank += 1;
                giver.id.clone()
            }
            None => format!("{settlement_id}#npc_0"),
        };

        let quest_id = format!("quest_{settlement_id}_{slot}");
        let mut quest = Quest {
            id: quest_id.clone(),
            tier: settlement.kind.tier_index(),
            status: QuestStatus::Available,
            difficulty: constraints.difficulty,
            reward_gold: constraints.reward_gold,
            reward_items: Vec::new(),
            enemy_types: constraints.enemy_types.clone(),
            enemy_count: constraints.enemy_count,
            complexity: constraints.complexity,
            travel_distance: constraints.travel_distance,
            forbidden_keywords: constraints.forbidden_keywords.clone(),
            settlement_type: settlement.kind,
            population: settlement.population,
            constraints: constraints.clone(),
            total_steps: steps.len(),
            steps,
            current_step: 0,
            giver_npc_id,
            protagonist: String::new(),
            antagonist: String::new(),
            narrative: String::new(),
            objective_description: String::new(),
            reward_description: String::new(),
            narrative_hooks: Vec::new(),
            complications: Vec::new(),
            failure_conditions: Vec::new(),
            is_fallback: false,
        };

        // Fallback text up front; a validated narrative may replace it.
        let settlement_name = settlement.name.clone();
        integrate_narrative(&mut quest, None, &settlement_name);
        requests.push(NarrativeRequest {
            quest_id: quest_id.clone(),
            settlement_id: settlement_id.to_string(),
            settlement_name,
            constraints,
            step_ids: quest.steps.iter().map(|step| step.id).collect(),
        });
        seeded.push(quest);
    }

    if !seeded.is_empty() {
        effects.deltas.push(Delta::set(
            format!("/quests/allQuestsSeeded/{settlement_id}"),
            serde_json::json!(seeded.iter().map(|quest| quest.id.clone()).collect::<Vec<_>>()),
        ));
    }
    state
        .quests
        .all_quests_seeded
        .insert(settlement_id.to_string(), seeded);

    requests
}

/// Replaces a seeded quest's fallback narrative with a generated candidate
/// when it validates; a failing candidate leaves the fallback in place.
pub fn attach_narrative(
    state: &mut SessionState,
    settlement_id: &str,
    quest_id: &str,
    candidate: Option<QuestNarrative>,
) -> bool {
    let settlement_name = state
        .world
        .settlements
        .get(settlement_id)
        .map(|settlement| settlement.name.clone())
        .unwrap_or_else(|| settlement_id.to_string());
    let Some(quests) = state.quests.all_quests_seeded.get_mut(settlement_id) else {
        return false;
    };
    let Some(quest) = quests.iter_mut().find(|quest| quest.id == quest_id) else {
        return false;
    };
    integrate_narrative(quest, candidate, &settlement_name);
    !quest.is_fallback
}

fn find_seeded_quest<'a>(
    state: &'a SessionState,
    quest_id: &str,
) -> Option<(&'a str, &'a Quest)> {
    for (settlement_id, quests) in &state.quests.all_quests_seeded {
        if let Some(quest) = quests.iter().find(|quest| quest.id == quest_id) {
            return Some((settlement_id.as_str(), quest));
        }
    }
    None
}

pub fn accept_quest(
    state: &mut SessionState,
    quest_id: Option<&str>,
    effects: &mut Effects,
) -> Result<Quest, ErrorCode> {
    let quest_id = quest_id.filter(|id| !id.trim().is_empty()).ok_or(ErrorCode::NoQuestId)?;

    if state.quests.completed.iter().any(|quest| quest.id == quest_id) {
        return Err(ErrorCode::QuestAlreadyCompleted);
    }
    if state.quests.active.iter().any(|quest| quest.id == quest_id) {
        return Err(ErrorCode::QuestAlreadyActive);
    }
    let Some((_, seeded)) = find_seeded_quest(state, quest_id) else {
        return Err(ErrorCode::NoQuestAvailable);
    };
    if state.quests.active.len() >= state.quests.config.max_active_quests {
        return Err(ErrorCode::MaxActiveQuestsReached);
    }

    let mut accepted = seeded.clone();
    accepted.status = QuestStatus::Active;
    accepted.current_step = 1.min(accepted.total_steps);
    state.quests.active.push(accepted.clone());
    effects.deltas.push(Delta::add(
        "/quests/active",
        serde_json::json!(accepted.id),
    ));
    Ok(accepted)
}

pub fn progress_quest(
    state: &mut SessionState,
    quest_id: Option<&str>,
    step: Option<usize>,
    effects: &mut Effects,
) -> Result<Quest, ErrorCode> {
    let quest_id = quest_id.filter(|id| !id.trim().is_empty()).ok_or(ErrorCode::NoQuestId)?;
    let quest = state
        .quests
        .active
        .iter_mut()
        .find(|quest| quest.id == quest_id)
        .ok_or(ErrorCode::QuestNotActive)?;

    let next = step.unwrap_or(quest.current_step + 1).min(quest.total_steps);
    quest.current_step = next;
    if quest.current_step >= quest.total_steps {
        quest.status = QuestStatus::ReadyToComplete;
    }
    effects.deltas.push(Delta::set(
        format!("/quests/active/{quest_id}/current_step"),
        serde_json::json!(quest.current_step),
    ));
    Ok(quest.clone())
}

/// Completion moves the quest to the completed list, merges the gold
/// reward into the inventory, and decrements the giver's rank (floor 0).
pub fn complete_quest(
    state: &mut SessionState,
    quest_id: Option<&str>,
    claimed_npc_id: Option<&str>,
    effects: &mut Effects,
) -> Result<Quest, ErrorCode> {
    let quest_id = quest_id.filter(|id| !id.trim().is_empty()).ok_or(ErrorCode::NoQuestId)?;
    let index = state
        .quests
        .active
        .iter()
        .position(|quest| quest.id == quest_id)
        .ok_or(ErrorCode::QuestNotActive)?;

    let quest = &state.quests.active[index];
    if quest.current_step < quest.total_steps {
        return Err(ErrorCode::IncompleteQuest);
    }
    if let Some(claimed) = claimed_npc_id {
        if claimed != quest.giver_npc_id {
            return Err(ErrorCode::WrongQuestGiver);
        }
    }
    let giver_npc_id = quest.giver_npc_id.clone();
    let reward_gold = quest.reward_gold;

    let mut completed = state.quests.active.remove(index);
    completed.status = QuestStatus::Completed;
    state.quests.completed.push(completed.clone());

    match state
        .player
        .inventory
        .iter_mut()
        .find(|item| item.id == GOLD_ITEM_ID)
    {
        Some(gold) => {
            gold.qty += reward_gold;
            gold.property_revision += 1;
        }
        None => state.player.inventory.push(Item {
            id: GOLD_ITEM_ID.to_string(),
            name: "gold coins".to_string(),
            aliases: vec!["gold".to_string(), "coins".to_string()],
            props: ItemProps {
                slot: "pouch".to_string(),
                rarity: "common".to_string(),
            },
            property_revision: 0,
            qty: reward_gold,
        }),
    }
    effects.inventory_rev = true;
    effects.deltas.push(Delta::set(
        "/player/inventory",
        serde_json::to_value(&state.player.inventory).unwrap_or_else(|_| serde_json::json!([])),
    ));
    effects.deltas.push(Delta::add(
        "/quests/completed",
        serde_json::json!(quest_id),
    ));

    for settlement in state.world.settlements.values_mut() {
        if let Some(giver) = settlement
            .npcs
            .iter_mut()
            .find(|npc| npc.id == giver_npc_id)
        {
            giver.quest_giver_rank = giver.quest_giver_rank.saturating_sub(1);
            if giver.quest_giver_rank == 0 {
                giver.is_quest_giver = false;
            }
        }
    }

    Ok(completed)
}

/// `ask_about_quest`: surfaces the giver's still-available quests.
pub fn quests_from_giver(
    state: &SessionState,
    npc_id: Option<&str>,
) -> Result<Vec<Quest>, ErrorCode> {
    let npc_id = npc_id.filter(|id| !id.trim().is_empty()).ok_or(ErrorCode::NoNpcTarget)?;
    if !npc_id.contains("#npc_") {
        return Err(ErrorCode::InvalidNpcIdFormat);
    }
    let npc = state
        .world
        .settlements
        .values()
        .flat_map(|settlement| settlement.npcs.iter())
        .find(|npc| npc.id == npc_id)
        .ok_or(ErrorCode::NpcNotFound)?;
    if !npc.is_quest_giver {
        return Err(ErrorCode::NpcNotQuestGiver);
    }

    let offered: Vec<Quest> = state
        .quests
        .all_quests_seeded
        .values()
        .flatten()
        .filter(|quest| {
            quest.giver_npc_id == npc_id
                && quest.status == QuestStatus::Available
                && !state.quests.active.iter().any(|active| active.id == quest.id)
                && !state
                    .quests
                    .completed
                    .iter()
                    .any(|completed| completed.id == quest.id)
        })
        .cloned()
        .collect();

    if offered.is_empty() {
        return Err(ErrorCode::NoQuestAvailable);
    }
    Ok(offered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rng(tag: &str) -> KeyedRng {
        KeyedRng::new(1337, &["quest_test", tag])
    }

    #[test]
    fn constraint_rolls_stay_in_difficulty_ranges() {
        for slot in 0..40 {
            let tag = slot.to_string();
            let mut stream = rng(&tag);
            let constraints =
                roll_quest_constraints(&mut stream, SettlementKind::Town, 600);
            let (lo, hi) = reward_gold_range(constraints.difficulty);
            assert!((lo..=hi).contains(&constraints.reward_gold));

            let allowed = allowed_enemy_types(constraints.difficulty);
            assert!(!constraints.enemy_types.is_empty());
            assert!(constraints.enemy_types.len() <= 3);
            for enemy in &constraints.enemy_types {
                assert!(allowed.contains(&enemy.as_str()), "{enemy} not allowed");
            }

            let (count_lo, count_hi) = enemy_count_range(constraints.difficulty);
            assert!((count_lo..=count_hi).contains(&constraints.enemy_count));
            let (travel_lo, travel_hi) = travel_distance_range(constraints.difficulty);
            assert!((travel_lo..=travel_hi).contains(&constraints.travel_distance));
            assert!(constraints.reward_items <= 2);
            assert!(constraints.total_steps >= 1 && constraints.total_steps <= 6);
        }
    }

    #[test]
    fn hamlet_quests_are_never_deadly() {
        for slot in 0..60 {
            let tag = format!("hamlet_{slot}");
            let mut stream = rng(&tag);
            let constraints = roll_quest_constraints(&mut stream, SettlementKind::Hamlet, 45);
            assert_ne!(constraints.difficulty, Difficulty::Deadly);
            assert!((5..=750).contains(&constraints.reward_gold));
        }
    }

    #[test]
    fn steps_chain_forward_only() {
        let mut stream = rng("steps");
        let steps = build_steps(&mut stream, 5);
        assert_eq!(steps.len(), 5);
        for step in &steps {
            if step.id < 5 {
                assert!((2..=3).contains(&step.choices.len()));
                for choice in &step.choices {
                    assert!(choice.leads_to_step > step.id);
                    assert!(choice.leads_to_step <= 5);
                    assert!(choice.id.starts_with(&format!("choice_{}_", step.id)));
                }
            } else {
                assert!(step.choices.is_empty());
            }
            assert!((1..=2).contains(&step.failure_triggers.len()));
        }
    }

    #[test]
    fn narrative_validation_rejects_each_violation_kind() {
        let constraints = QuestConstraints {
            difficulty: Difficulty::Easy,
            reward_gold: 50,
            reward_items: 0,
            enemy_types: vec!["bandit".to_string()],
            enemy_count: 2,
            travel_distance: 2,
            forbidden_keywords: forbidden_keywords(Difficulty::Easy)
                .iter()
                .map(|keyword| keyword.to_string())
                .collect(),
            complexity: Complexity::Short,
            total_steps: 2,
            settlement_type: SettlementKind::Village,
            population: 160,
        };
        let good = QuestNarrative {
            narrative: "Bandits menace the mill road.".to_string(),
            objective_description: "Clear the road.".to_string(),
            reward_description: "50 gold pieces.".to_string(),
            protagonist: "a drifter".to_string(),
            antagonist: "bandit".to_string(),
            narrative_hooks: Vec::new(),
            complications: Vec::new(),
            failure_conditions: Vec::new(),
            step_narratives: Default::default(),
        };
        assert_eq!(validate_narrative(&constraints, &[1, 2], &good), Ok(()));

        let mut forbidden = good.clone();
        forbidden.narrative = "A dragon menaces the mill road.".to_string();
        assert_eq!(
            validate_narrative(&constraints, &[1, 2], &forbidden),
            Err(NarrativeViolation::ForbiddenKeyword("dragon".to_string()))
        );

        let mut wrong_gold = good.clone();
        wrong_gold.reward_description = "A purse of 500 gold.".to_string();
        assert_eq!(
            validate_narrative(&constraints, &[1, 2], &wrong_gold),
            Err(NarrativeViolation::RewardMismatch)
        );

        let mut wrong_enemy = good.clone();
        wrong_enemy.narrative = "A wyvern circles the mill road.".to_string();
        assert_eq!(
            validate_narrative(&constraints, &[1, 2], &wrong_enemy),
            Err(NarrativeViolation::DisallowedEnemy("wyvern".to_string()))
        );

        let mut bad_step = good.clone();
        bad_step
            .step_narratives
            .insert("9".to_string(), "phantom step".to_string());
        assert_eq!(
            validate_narrative(&constraints, &[1, 2], &bad_step),
            Err(NarrativeViolation::UnknownStepId("9".to_string()))
        );

        let mut empty_field = good;
        empty_field.antagonist = String::new();
        assert_eq!(
            validate_narrative(&constraints, &[1, 2], &empty_field),
            Err(NarrativeViolation::MissingField("antagonist"))
        );
    }

    #[test]
    fn fallback_narrative_fills_placeholders_and_reuses_first_enemy() {
        let constraints = QuestConstraints {
            difficulty: Difficulty::Moderate,
            reward_gold: 120,
            reward_items: 0,
            enemy_types: vec!["ghoul".to_string(), "cultist".to_string()],
            enemy_count: 3,
            travel_distance: 4,
            forbidden_keywords: Vec::new(),
            complexity: Complexity::Medium,
            total_steps: 4,
            settlement_type: SettlementKind::Town,
            population: 640,
        };
        let narrative = fallback_narrative(&constraints, "Thornmere");
        assert!(narrative.narrative.contains("Thornmere"));
        assert_eq!(narrative.antagonist, "ghoul");
        assert!(narrative.reward_description.contains("120 gold"));
        // The fallback must pass its own validation.
        assert_eq!(
            validate_narrative(&constraints, &[1, 2, 3, 4], &narrative),
            Ok(())
        );
    }
}
