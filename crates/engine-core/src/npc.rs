//! Deterministic NPC generation. One LCG stream per NPC, drawn in a fixed
//! order; the draw order is part of the contract.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use contracts::state::{Gender, Npc, Position};
use contracts::SettlementKind;

use crate::catalog::{self, catalog, Job};
use crate::rng::Lcg;

pub const NPC_TTL_DAYS: i64 = 14;
const DEFAULT_L1_W: i64 = 12;
const DEFAULT_L1_H: i64 = 12;

fn tier_for_roll(roll: f64) -> u8 {
    if roll < 0.05 {
        1
    } else if roll < 0.25 {
        2
    } else if roll < 0.90 {
        3
    } else {
        4
    }
}

fn corruption_for_rolls(range_roll: f64, value_roll: f64) -> f64 {
    let (lo, hi) = if range_roll < 0.60 {
        (0.0, 0.3)
    } else if range_roll < 0.90 {
        (0.3, 0.7)
    } else {
        (0.7, 1.0)
    };
    lo + value_roll * (hi - lo)
}

fn wealth_range(tier: u8) -> (i64, i64) {
    match tier {
        1 => (7, 9),
        2 => (5, 8),
        3 => (2, 5),
        _ => (0, 1),
    }
}

pub fn format_utc(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Generates one NPC from `(seed, site_id)`. Bit-identical across runs for
/// the same inputs and `now`.
pub fn generate_npc(seed: u32, site_id: &str, now: DateTime<Utc>) -> Npc {
    let catalog = catalog();
    let mut rng = Lcg::new(seed);

    let tier = tier_for_roll(rng.next_f64());
    let age = 5 + (rng.next_f64() * 80.0) as i64;
    let gender = if rng.next_f64() < 0.5 {
        Gender::Male
    } else {
        Gender::Female
    };

    let eligible: Vec<&Job> = catalog
        .jobs_for_tier(tier)
        .into_iter()
        .filter(|job| age >= job.min_age)
        .collect();
    let placeholder = catalog::UNEMPLOYED_JOB;
    let job_roll = rng.next_f64();
    let job: &Job = if eligible.is_empty() {
        &placeholder
    } else {
        let idx = ((job_roll * eligible.len() as f64) as usize).min(eligible.len() - 1);
        eligible[idx]
    };

    let is_criminal = if job.criminal_weight >= 1.0 {
        true
    } else if job.criminal_weight == 0.0 {
        false
    } else {
        rng.next_f64() < job.criminal_weight
    };

    let corruption_level = corruption_for_rolls(rng.next_f64(), rng.next_f64());

    let trait_roll = rng.next_f64();
    let trait_count = if trait_roll < 0.35 {
        1
    } else if trait_roll < 0.75 {
        2
    } else {
        3
    };
    let mut trait_indices: Vec<usize> = Vec::with_capacity(trait_count);
    while trait_indices.len() < trait_count {
        let mut idx =
            ((rng.next_f64() * catalog.traits.len() as f64) as usize).min(catalog.traits.len() - 1);
        // Collisions are rare at ≤3 picks; probe forward instead of
        // spinning the stream.
        while trait_indices.contains(&idx) {
            idx = (idx + 1) % catalog.traits.len();
        }
        trait_indices.push(idx);
    }
    let traits = trait_indices
        .iter()
        .map(|idx| catalog.traits[*idx].to_string())
        .collect();

    let (wealth_lo, wealth_hi) = wealth_range(tier);
    let wealth_tier = rng.next_int(wealth_lo, wealth_hi) as u8;

    let player_reputation = ((rng.next_f64() - 0.5) * 50.0).floor() as i64;

    let home_roll = rng.next_f64();
    let home_location = if home_roll < 0.8 {
        Some(site_id.to_string())
    } else if home_roll < 0.95 {
        Some("wanderer".to_string())
    } else {
        None
    };

    let lx = rng.next_int(0, DEFAULT_L1_W - 1);
    let ly = rng.next_int(0, DEFAULT_L1_H - 1);

    Npc {
        id: format!("{site_id}#npc_{seed}"),
        site_id: site_id.to_string(),
        age,
        gender,
        tier,
        job_category: job.name.to_string(),
        home_location,
        faction_id: None,
        wealth_tier,
        player_reputation,
        traits,
        corruption_level,
        is_criminal,
        position: Position {
            mx: 0,
            my: 0,
            lx,
            ly,
        },
        state: "active".to_string(),
        created_at_utc: format_utc(now),
        expires_at_utc: format_utc(now + Duration::days(NPC_TTL_DAYS)),
        schedule: None,
        is_quest_giver: false,
        quest_giver_rank: 0,
        stock_level: 0,
    }
}

/// Pool for a site: consecutive seeds starting at `base_seed`.
pub fn generate_npc_pool(
    site_id: &str,
    count: usize,
    base_seed: u32,
    now: DateTime<Utc>,
) -> Vec<Npc> {
    (0..count)
        .map(|offset| generate_npc(base_seed.wrapping_add(offset as u32), site_id, now))
        .collect()
}

pub fn npc_count_for_site(kind: Option<SettlementKind>) -> usize {
    kind.map(catalog::settlement_npc_count)
        .unwrap_or(catalog::DEFAULT_SITE_NPC_COUNT)
}
