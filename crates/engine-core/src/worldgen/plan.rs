//! Deterministic per-macro site planning: capacity caps, Chebyshev spacing,
//! and breadth-random footprint growth.

use std::collections::BTreeSet;

use contracts::state::{chebyshev, CellOffset, GridDims, MacroCaps, PlannedCluster, SitePlan};
use contracts::SettlementKind;

use crate::catalog::{cluster_footprint, cluster_spacing};
use crate::rng::{choice, keyed_float, rnd_int};

const CANDIDATES_PER_PLACEMENT: u32 = 80;
const TOWN_ATTEMPTS: u32 = 200;
const GROWTH_ATTEMPTS: u32 = 200;

const CARDINALS: [(i64, i64); 4] = [(1, 0), (-1, 0), (0, 1), (0, -1)];

struct Planner {
    seed: u32,
    mx: i64,
    my: i64,
    dims: GridDims,
    occupied: BTreeSet<(i64, i64)>,
    clusters: Vec<PlannedCluster>,
    /// Bumped on every draw so each try reads a distinct stream.
    epoch: u32,
}

impl Planner {
    fn draw_float(&mut self, tag: &str) -> f64 {
        self.epoch += 1;
        let mx = self.mx.to_string();
        let my = self.my.to_string();
        let epoch = self.epoch.to_string();
        keyed_float(self.seed, &["plan", &mx, &my, tag, &epoch])
    }

    fn draw_int(&mut self, tag: &str, min: i64, max: i64) -> i64 {
        self.epoch += 1;
        let mx = self.mx.to_string();
        let my = self.my.to_string();
        let epoch = self.epoch.to_string();
        rnd_int(self.seed, &["plan", &mx, &my, tag, &epoch], min, max)
    }

    fn center_is_valid(&self, tier: SettlementKind, lx: i64, ly: i64) -> bool {
        if self.occupied.contains(&(lx, ly)) {
            return false;
        }
        self.clusters.iter().all(|existing| {
            let required = cluster_spacing(existing.tier.max(tier));
            chebyshev(existing.center.lx, existing.center.ly, lx, ly) >= required
        })
    }

    /// One placement: up to 80 candidate centers, then footprint growth.
    fn try_place(&mut self, tier: SettlementKind) -> bool {
        for _ in 0..CANDIDATES_PER_PLACEMENT {
            let lx = self.draw_int("x", 0, self.dims.w - 1);
            let ly = self.draw_int("y", 0, self.dims.h - 1);
            if !self.center_is_valid(tier, lx, ly) {
                continue;
            }
            let cells = self.grow_footprint(tier, lx, ly);
            let seg_index = self.clusters.len();
            self.clusters.push(PlannedCluster {
                cluster_id: format!("{}x{}_{}", self.mx, self.my, seg_index),
                tier,
                center: CellOffset { lx, ly },
                cells,
                seg_index,
            });
            return true;
        }
        false
    }

    /// Breadth-random growth in the four cardinal directions from the
    /// center until the tier footprint is reached or attempts run out.
    fn grow_footprint(&mut self, tier: SettlementKind, lx: i64, ly: i64) -> Vec<CellOffset> {
        let footprint = cluster_footprint(tier);
        let mut cells = vec![CellOffset { lx, ly }];
        self.occupied.insert((lx, ly));

        let mut attempts = 0;
        while cells.len() < footprint && attempts < GROWTH_ATTEMPTS {
            attempts += 1;
            let base_roll = self.draw_float("grow_cell");
            let base = match choice(&cells, base_roll) {
                Some(cell) => *cell,
                None => break,
            };
            let dir_roll = self.draw_float("grow_dir");
            let Some((dx, dy)) = choice(&CARDINALS, dir_roll).copied() else {
                break;
            };
            let candidate = (base.lx + dx, base.ly + dy);
            if candidate.0 < 0
                || candidate.1 < 0
                || candidate.0 >= self.dims.w
                || candidate.1 >= self.dims.h
                || self.occupied.contains(&candidate)
            {
                continue;
            }
            self.occupied.insert(candidate);
            cells.push(CellOffset {
                lx: candidate.0,
                ly: candidate.1,
            });
        }

        cells
    }
}

pub fn build_site_plan(seed: u32, mx: i64, my: i64, dims: GridDims, caps: MacroCaps) -> SitePlan {
    let mx_key = mx.to_string();
    let my_key = my.to_string();
    let target = rnd_int(seed, &["target", &mx_key, &my_key], 7, 11);

    let mut planner = Planner {
        seed,
        mx,
        my,
        dims,
        occupied: BTreeSet::new(),
        clusters: Vec::new(),
        epoch: 0,
    };

    for _ in 0..caps.metropolis {
        planner.try_place(SettlementKind::Metropolis);
    }
    for _ in 0..caps.city {
        planner.try_place(SettlementKind::City);
    }

    let mut attempts = 0;
    while (planner.clusters.len() as i64) < target && attempts < TOWN_ATTEMPTS {
        attempts += 1;
        planner.try_place(SettlementKind::Town);
    }

    let mut place_hamlet = true;
    let alternation_budget = (2 * dims.w * dims.h) as u32;
    for _ in 0..alternation_budget {
        if planner.clusters.len() as i64 >= target {
            break;
        }
        let tier = if place_hamlet {
            SettlementKind::Hamlet
        } else {
            SettlementKind::Outpost
        };
        planner.try_place(tier);
        place_hamlet = !place_hamlet;
    }

    let placed = planner.clusters.len() as i64;
    SitePlan {
        target,
        clusters: planner.clusters,
        warn_shortfall: placed < target,
    }
}
