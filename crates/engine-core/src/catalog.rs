//! Static catalogs, built once at startup and shared across sessions.
//! Load fails fatally when any table invariant is violated.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use contracts::state::BuildingPurpose;
use contracts::{Biome, SettlementKind};

pub const TRAIT_COUNT: usize = 104;
pub const POSITIVE_TRAIT_COUNT: usize = 40;
pub const NEGATIVE_TRAIT_COUNT: usize = 40;
pub const NEUTRAL_TRAIT_COUNT: usize = 24;
pub const JOB_TIER_COUNTS: [usize; 4] = [11, 22, 27, 12];

const POSITIVE_TRAITS: [&str; POSITIVE_TRAIT_COUNT] = [
    "brave",
    "kind",
    "honest",
    "loyal",
    "generous",
    "patient",
    "diligent",
    "cheerful",
    "humble",
    "gracious",
    "steadfast",
    "clever",
    "curious",
    "gentle",
    "merciful",
    "prudent",
    "resourceful",
    "sincere",
    "tactful",
    "temperate",
    "thrifty",
    "valiant",
    "warmhearted",
    "witty",
    "adaptable",
    "attentive",
    "candid",
    "charitable",
    "courteous",
    "decisive",
    "devout",
    "earnest",
    "fairminded",
    "forgiving",
    "hospitable",
    "industrious",
    "levelheaded",
    "optimistic",
    "perceptive",
    "reliable",
];

const NEGATIVE_TRAITS: [&str; NEGATIVE_TRAIT_COUNT] = [
    "cruel",
    "greedy",
    "deceitful",
    "cowardly",
    "lazy",
    "arrogant",
    "spiteful",
    "jealous",
    "reckless",
    "sullen",
    "vindictive",
    "callous",
    "cynical",
    "dishonest",
    "envious",
    "gluttonous",
    "gullible",
    "impatient",
    "impulsive",
    "irritable",
    "manipulative",
    "miserly",
    "morose",
    "obstinate",
    "paranoid",
    "petty",
    "pompous",
    "quarrelsome",
    "resentful",
    "ruthless",
    "secretive",
    "selfish",
    "slothful",
    "suspicious",
    "treacherous",
    "vain",
    "venal",
    "volatile",
    "wasteful",
    "wrathful",
];

const NEUTRAL_TRAITS: [&str; NEUTRAL_TRAIT_COUNT] = [
    "quiet",
    "talkative",
    "superstitious",
    "pragmatic",
    "traditional",
    "eccentric",
    "stoic",
    "dreamy",
    "blunt",
    "formal",
    "frugal",
    "nostalgic",
    "restless",
    "solitary",
    "gregarious",
    "bookish",
    "rustic",
    "worldly",
    "pious",
    "skeptical",
    "ambitious",
    "cautious",
    "fatalistic",
    "whimsical",
];

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub name: &'static str,
    pub tier: u8,
    pub criminal_weight: f64,
    pub min_age: i64,
}

const fn job(name: &'static str, tier: u8, criminal_weight: f64, min_age: i64) -> Job {
    Job {
        name,
        tier,
        criminal_weight,
        min_age,
    }
}

const JOBS: [Job; 72] = [
    // Tier 1: rulers and patrons.
    job("magistrate", 1, 0.10, 30),
    job("high priest", 1, 0.05, 35),
    job("guild master", 1, 0.20, 30),
    job("noble", 1, 0.15, 18),
    job("banker", 1, 0.30, 25),
    job("judge", 1, 0.10, 35),
    job("court mage", 1, 0.05, 25),
    job("ambassador", 1, 0.10, 30),
    job("harbormaster", 1, 0.20, 30),
    job("spymaster", 1, 0.90, 30),
    job("chancellor", 1, 0.15, 40),
    // Tier 2: professions and trade.
    job("merchant", 2, 0.25, 18),
    job("physician", 2, 0.05, 25),
    job("alchemist", 2, 0.15, 22),
    job("scribe", 2, 0.05, 16),
    job("jeweler", 2, 0.20, 20),
    job("moneylender", 2, 0.40, 25),
    job("sea captain", 2, 0.30, 25),
    job("architect", 2, 0.05, 25),
    job("apothecary", 2, 0.10, 20),
    job("cartographer", 2, 0.05, 20),
    job("trader", 2, 0.30, 18),
    job("innkeeper", 2, 0.15, 21),
    job("priest", 2, 0.02, 20),
    job("engineer", 2, 0.05, 22),
    job("notary", 2, 0.10, 22),
    job("silversmith", 2, 0.15, 20),
    job("vintner", 2, 0.10, 22),
    job("horse breeder", 2, 0.10, 20),
    job("shipwright", 2, 0.05, 22),
    job("armorer", 2, 0.10, 20),
    job("tax collector", 2, 0.35, 25),
    job("auctioneer", 2, 0.25, 20),
    // Tier 3: crafts and labor.
    job("farmer", 3, 0.05, 14),
    job("blacksmith", 3, 0.05, 16),
    job("carpenter", 3, 0.05, 16),
    job("baker", 3, 0.05, 14),
    job("fisher", 3, 0.05, 12),
    job("weaver", 3, 0.05, 14),
    job("tanner", 3, 0.10, 16),
    job("cooper", 3, 0.05, 16),
    job("mason", 3, 0.05, 16),
    job("miller", 3, 0.10, 16),
    job("brewer", 3, 0.10, 18),
    job("butcher", 3, 0.05, 16),
    job("cobbler", 3, 0.05, 14),
    job("potter", 3, 0.05, 14),
    job("shepherd", 3, 0.05, 10),
    job("hunter", 3, 0.15, 14),
    job("miner", 3, 0.10, 16),
    job("sailor", 3, 0.20, 16),
    job("guard", 3, 0.10, 18),
    job("carter", 3, 0.10, 16),
    job("stablehand", 3, 0.05, 12),
    job("fletcher", 3, 0.05, 16),
    job("chandler", 3, 0.05, 16),
    job("thatcher", 3, 0.05, 16),
    job("midwife", 3, 0.02, 20),
    job("herbalist", 3, 0.10, 16),
    job("ferryman", 3, 0.15, 16),
    // Tier 4: the margins.
    job("beggar", 4, 0.30, 5),
    job("laborer", 4, 0.10, 12),
    job("scullion", 4, 0.05, 8),
    job("ragpicker", 4, 0.20, 8),
    job("gravedigger", 4, 0.10, 16),
    job("street performer", 4, 0.20, 10),
    job("pickpocket", 4, 1.0, 8),
    job("smuggler", 4, 1.0, 16),
    job("fence", 4, 1.0, 18),
    job("poacher", 4, 0.90, 12),
    job("vagrant", 4, 0.25, 5),
    job("urchin", 4, 0.50, 5),
];

pub const UNEMPLOYED_JOB: Job = job("unemployed", 4, 0.0, 0);

#[derive(Debug)]
pub enum CatalogError {
    TraitCount {
        expected: usize,
        got: usize,
    },
    DuplicateTrait(String),
    TraitNotLowercase(String),
    JobTierCount {
        tier: u8,
        expected: usize,
        got: usize,
    },
    JobFieldOutOfRange {
        name: &'static str,
        field: &'static str,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TraitCount { expected, got } => {
                write!(f, "trait catalog has {got} entries, expected {expected}")
            }
            Self::DuplicateTrait(name) => write!(f, "duplicate trait: {name}"),
            Self::TraitNotLowercase(name) => write!(f, "trait is not lowercase: {name}"),
            Self::JobTierCount {
                tier,
                expected,
                got,
            } => write!(f, "tier {tier} has {got} jobs, expected {expected}"),
            Self::JobFieldOutOfRange { name, field } => {
                write!(f, "job {name} has out-of-range {field}")
            }
        }
    }
}

impl std::error::Error for CatalogError {}

#[derive(Debug)]
pub struct Catalog {
    pub positive_traits: Vec<&'static str>,
    pub negative_traits: Vec<&'static str>,
    pub neutral_traits: Vec<&'static str>,
    /// All 104 traits in catalog order; trait sampling indexes into this.
    pub traits: Vec<&'static str>,
    pub jobs: Vec<Job>,
}

impl Catalog {
    pub fn load() -> Result<Self, CatalogError> {
        let traits: Vec<&'static str> = POSITIVE_TRAITS
            .iter()
            .chain(NEGATIVE_TRAITS.iter())
            .chain(NEUTRAL_TRAITS.iter())
            .copied()
            .collect();

        if traits.len() != TRAIT_COUNT {
            return Err(CatalogError::TraitCount {
                expected: TRAIT_COUNT,
                got: traits.len(),
            });
        }

        let mut seen = BTreeSet::new();
        for name in &traits {
            if *name != name.to_lowercase() {
                return Err(CatalogError::TraitNotLowercase(name.to_string()));
            }
            if !seen.insert(*name) {
                return Err(CatalogError::DuplicateTrait(name.to_string()));
            }
        }

        let jobs: Vec<Job> = JOBS.to_vec();
        for (tier, expected) in (1_u8..=4).zip(JOB_TIER_COUNTS) {
            let got = jobs.iter().filter(|entry| entry.tier == tier).count();
            if got != expected {
                return Err(CatalogError::JobTierCount {
                    tier,
                    expected,
                    got,
                });
            }
        }
        for entry in &jobs {
            if !(0.0..=1.0).contains(&entry.criminal_weight) {
                return Err(CatalogError::JobFieldOutOfRange {
                    name: entry.name,
                    field: "criminal_weight",
                });
            }
            if entry.min_age < 0 {
                return Err(CatalogError::JobFieldOutOfRange {
                    name: entry.name,
                    field: "min_age",
                });
            }
        }

        Ok(Self {
            positive_traits: POSITIVE_TRAITS.to_vec(),
            negative_traits: NEGATIVE_TRAITS.to_vec(),
            neutral_traits: NEUTRAL_TRAITS.to_vec(),
            traits,
            jobs,
        })
    }

    pub fn jobs_for_tier(&self, tier: u8) -> Vec<&Job> {
        self.jobs.iter().filter(|entry| entry.tier == tier).collect()
    }
}

static CATALOG: OnceLock<Catalog> = OnceLock::new();

/// Shared catalog instance. Violated invariants abort startup.
pub fn catalog() -> &'static Catalog {
    CATALOG.get_or_init(|| match Catalog::load() {
        Ok(catalog) => catalog,
        Err(err) => panic!("catalog invariant violated at startup: {err}"),
    })
}

pub fn biome_keywords(biome: Biome) -> &'static [&'static str] {
    match biome {
        Biome::Urban => &["city", "urban", "street", "metropolis", "plaza"],
        Biome::Rural => &["farm", "rural", "pasture", "meadow", "orchard"],
        Biome::Forest => &["forest", "wood", "grove", "timber", "glade"],
        Biome::Desert => &["desert", "dune", "sand", "canyon", "arid", "dry"],
        Biome::Tundra => &["tundra", "snow", "frozen", "ice", "glacier"],
        Biome::Jungle => &["jungle", "rainforest", "vine", "tropic"],
        Biome::Coast => &["coast", "shore", "island", "sea", "beach", "harbor"],
        Biome::Mountain => &["mountain", "peak", "cliff", "crag", "highland"],
        Biome::Wetland => &["wetland", "swamp", "marsh", "bog", "fen"],
    }
}

/// Terrain palette per biome: `(type, subtype)` pairs, indexed by a keyed
/// hash during backfill.
pub fn terrain_palette(biome: Biome) -> &'static [(&'static str, &'static str)] {
    match biome {
        Biome::Urban => &[
            ("street", "cobbled"),
            ("square", "market"),
            ("alley", "narrow"),
            ("yard", "walled"),
            ("ruin", "burned"),
        ],
        Biome::Rural => &[
            ("field", "wheat"),
            ("pasture", "sheep"),
            ("hedgerow", "bramble"),
            ("orchard", "apple"),
            ("lane", "rutted"),
        ],
        Biome::Forest => &[
            ("woodland", "oak"),
            ("thicket", "briar"),
            ("clearing", "fern"),
            ("deadfall", "mossy"),
            ("stream", "shaded"),
        ],
        Biome::Desert => &[
            ("dunes", "shifting"),
            ("hardpan", "cracked"),
            ("canyon", "red"),
            ("scrub", "thorn"),
            ("oasis", "palm"),
        ],
        Biome::Tundra => &[
            ("snowfield", "wind-carved"),
            ("ice_sheet", "blue"),
            ("scree", "frost-split"),
            ("bog", "frozen"),
            ("ridge", "bare"),
        ],
        Biome::Jungle => &[
            ("canopy", "dense"),
            ("undergrowth", "vine-choked"),
            ("river", "brown"),
            ("clearing", "steaming"),
            ("ruin", "overgrown"),
        ],
        Biome::Coast => &[
            ("beach", "sand"),
            ("cliff", "chalk"),
            ("dunes", "grass"),
            ("tidal_flat", "mud"),
            ("cove", "pebble"),
        ],
        Biome::Mountain => &[
            ("slope", "scree"),
            ("ledge", "granite"),
            ("pass", "windswept"),
            ("meadow", "alpine"),
            ("cave", "cold"),
        ],
        Biome::Wetland => &[
            ("marsh", "reed"),
            ("pool", "black"),
            ("hummock", "sedge"),
            ("channel", "sluggish"),
            ("mire", "sucking"),
        ],
    }
}

/// Working-prose description templates. The narrator rewrites these; they
/// only need to carry the terrain facts.
pub fn description_templates(biome: Biome) -> &'static [&'static str] {
    match biome {
        Biome::Urban => &[
            "A {subtype} {type} hemmed in by leaning housefronts.",
            "The {type} here is {subtype}, loud with carts and voices.",
            "A {subtype} {type}, its gutters dark with yesterday's rain.",
        ],
        Biome::Rural => &[
            "A {subtype} {type} stretching toward a low fence line.",
            "The {type} is {subtype}; crows argue somewhere out of sight.",
            "A quiet {subtype} {type} smelling of turned earth.",
        ],
        Biome::Forest => &[
            "A {subtype} {type} where the light falls in narrow bars.",
            "The {type} here is {subtype} and close, every sound muffled.",
            "A {subtype} {type}; old leaves give underfoot.",
        ],
        Biome::Desert => &[
            "A {subtype} {type} shimmering under a flat white sky.",
            "The {type} is {subtype}, the heat pressing down like a hand.",
            "A {subtype} {type}, silent except for the wind's dry hiss.",
        ],
        Biome::Tundra => &[
            "A {subtype} {type} under a sky the color of old tin.",
            "The {type} here is {subtype}; the cold finds every seam.",
            "A {subtype} {type}, crusted snow creaking at each step.",
        ],
        Biome::Jungle => &[
            "A {subtype} {type} dripping in the green half-dark.",
            "The {type} is {subtype}, alive with unseen movement.",
            "A {subtype} {type}; the air is thick enough to chew.",
        ],
        Biome::Coast => &[
            "A {subtype} {type} where gulls wheel against the wind.",
            "The {type} here is {subtype}, salt-sprayed and shining.",
            "A {subtype} {type}; the tide mutters against the stones.",
        ],
        Biome::Mountain => &[
            "A {subtype} {type} with the valley floor far below.",
            "The {type} is {subtype}; wind saws across the rock.",
            "A {subtype} {type}, thin air sharp in the lungs.",
        ],
        Biome::Wetland => &[
            "A {subtype} {type} breathing out marsh-gas and midges.",
            "The {type} here is {subtype}, water standing in every print.",
            "A {subtype} {type}; something plops away unseen.",
        ],
    }
}

/// Chebyshev spacing required around a cluster center, by tier.
pub fn cluster_spacing(kind: SettlementKind) -> i64 {
    match kind {
        SettlementKind::Outpost => 1,
        SettlementKind::Hamlet => 2,
        SettlementKind::Village => 2,
        SettlementKind::Town => 3,
        SettlementKind::City => 4,
        SettlementKind::Metropolis => 6,
    }
}

/// Cluster footprint in L1 cells, by tier.
pub fn cluster_footprint(kind: SettlementKind) -> usize {
    match kind {
        SettlementKind::Outpost => 1,
        SettlementKind::Hamlet => 1,
        SettlementKind::Village => 1,
        SettlementKind::Town => 1,
        SettlementKind::City => 3,
        SettlementKind::Metropolis => 7,
    }
}

pub fn settlement_npc_count(kind: SettlementKind) -> usize {
    match kind {
        SettlementKind::Outpost => 3,
        SettlementKind::Hamlet => 8,
        SettlementKind::Village => 15,
        SettlementKind::Town => 30,
        SettlementKind::City => 60,
        SettlementKind::Metropolis => 120,
    }
}

/// NPC count for site kinds outside the settlement table.
pub const DEFAULT_SITE_NPC_COUNT: usize = 10;

pub fn settlement_interior_size(kind: SettlementKind) -> i64 {
    match kind {
        SettlementKind::Outpost => 5,
        SettlementKind::Hamlet => 7,
        SettlementKind::Village => 9,
        SettlementKind::Town => 12,
        SettlementKind::City => 16,
        SettlementKind::Metropolis => 20,
    }
}

pub fn settlement_building_count(kind: SettlementKind) -> usize {
    match kind {
        SettlementKind::Outpost => 1,
        SettlementKind::Hamlet => 3,
        SettlementKind::Village => 5,
        SettlementKind::Town => 8,
        SettlementKind::City => 14,
        SettlementKind::Metropolis => 22,
    }
}

/// Room count range per building purpose.
pub fn room_count_range(purpose: BuildingPurpose) -> (i64, i64) {
    match purpose {
        BuildingPurpose::House => (1, 2),
        BuildingPurpose::Shop => (2, 3),
        BuildingPurpose::Tavern => (3, 4),
        BuildingPurpose::Temple => (3, 5),
        BuildingPurpose::Guildhall => (5, 7),
        BuildingPurpose::Palace => (6, 8),
    }
}

pub fn building_name_pool(purpose: BuildingPurpose) -> &'static [&'static str] {
    match purpose {
        BuildingPurpose::House => &[
            "the cooper's house",
            "a low turf-roofed cottage",
            "a narrow timbered house",
            "the widow's house",
            "a whitewashed row house",
        ],
        BuildingPurpose::Shop => &[
            "The Gilded Scale",
            "The Copper Kettle",
            "The Crooked Needle",
            "The Salt Cellar",
            "The Waxed Thread",
        ],
        BuildingPurpose::Tavern => &[
            "The Drowned Rat",
            "The Oaken Flagon",
            "The Limping Dog",
            "The Broken Oar",
            "The Ashen Hearth",
        ],
        BuildingPurpose::Temple => &[
            "Shrine of the Dawn",
            "Chapel of the Quiet Hand",
            "House of the Two Lanterns",
            "Sanctum of the Reed",
        ],
        BuildingPurpose::Guildhall => &[
            "the carters' guildhall",
            "the weavers' hall",
            "the masons' lodge",
            "the mercers' exchange",
        ],
        BuildingPurpose::Palace => &[
            "the magistrate's seat",
            "the old keep",
            "the governor's residence",
        ],
    }
}

/// Building purpose mix, weighted; larger settlements unlock grander
/// purposes through the extra entries.
pub fn building_purpose_weights(kind: SettlementKind) -> &'static [(BuildingPurpose, f64)] {
    match kind {
        SettlementKind::Outpost | SettlementKind::Hamlet => &[
            (BuildingPurpose::House, 0.7),
            (BuildingPurpose::Shop, 0.2),
            (BuildingPurpose::Tavern, 0.1),
        ],
        SettlementKind::Village => &[
            (BuildingPurpose::House, 0.55),
            (BuildingPurpose::Shop, 0.2),
            (BuildingPurpose::Tavern, 0.15),
            (BuildingPurpose::Temple, 0.1),
        ],
        SettlementKind::Town => &[
            (BuildingPurpose::House, 0.45),
            (BuildingPurpose::Shop, 0.25),
            (BuildingPurpose::Tavern, 0.12),
            (BuildingPurpose::Temple, 0.1),
            (BuildingPurpose::Guildhall, 0.08),
        ],
        SettlementKind::City | SettlementKind::Metropolis => &[
            (BuildingPurpose::House, 0.4),
            (BuildingPurpose::Shop, 0.25),
            (BuildingPurpose::Tavern, 0.12),
            (BuildingPurpose::Temple, 0.1),
            (BuildingPurpose::Guildhall, 0.08),
            (BuildingPurpose::Palace, 0.05),
        ],
    }
}

pub const SETTLEMENT_NAME_PREFIXES: [&str; 20] = [
    "Ald", "Brack", "Cold", "Dun", "Ember", "Fen", "Gor", "Hollow", "Iron", "Kes", "Lark", "Mire",
    "Nor", "Oak", "Pike", "Quar", "Raven", "Salt", "Thorn", "Wulf",
];

pub const SETTLEMENT_NAME_SUFFIXES: [&str; 12] = [
    "burg", "dale", "ford", "gate", "haven", "hold", "mark", "mere", "moor", "stead", "ton",
    "wick",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trait_catalog_counts_and_distinctness() {
        let catalog = catalog();
        assert_eq!(catalog.positive_traits.len(), 40);
        assert_eq!(catalog.negative_traits.len(), 40);
        assert_eq!(catalog.neutral_traits.len(), 24);
        assert_eq!(catalog.traits.len(), TRAIT_COUNT);

        let distinct: BTreeSet<_> = catalog.traits.iter().collect();
        assert_eq!(distinct.len(), TRAIT_COUNT);
        assert!(catalog
            .traits
            .iter()
            .all(|name| *name == name.to_lowercase()));
    }

    #[test]
    fn job_catalog_partition_and_fields() {
        let catalog = catalog();
        for (tier, expected) in (1_u8..=4).zip(JOB_TIER_COUNTS) {
            assert_eq!(catalog.jobs_for_tier(tier).len(), expected);
        }
        assert_eq!(catalog.jobs.len(), JOB_TIER_COUNTS.iter().sum::<usize>());
        for entry in &catalog.jobs {
            assert!((0.0..=1.0).contains(&entry.criminal_weight), "{}", entry.name);
            assert!(entry.min_age >= 0);
            assert!(!entry.name.is_empty());
        }
    }

    #[test]
    fn every_biome_has_palette_templates_and_keywords() {
        for biome in Biome::DETECTION_ORDER {
            assert!(!terrain_palette(biome).is_empty());
            assert!(!description_templates(biome).is_empty());
            assert!(!biome_keywords(biome).is_empty());
        }
    }

    #[test]
    fn spacing_grows_with_tier() {
        assert_eq!(cluster_spacing(SettlementKind::Outpost), 1);
        assert_eq!(cluster_spacing(SettlementKind::Hamlet), 2);
        assert_eq!(cluster_spacing(SettlementKind::Town), 3);
        assert_eq!(cluster_spacing(SettlementKind::City), 4);
        assert_eq!(cluster_spacing(SettlementKind::Metropolis), 6);
        assert_eq!(cluster_footprint(SettlementKind::City), 3);
        assert_eq!(cluster_footprint(SettlementKind::Metropolis), 7);
    }

    #[test]
    fn settlement_npc_counts_match_table() {
        assert_eq!(settlement_npc_count(SettlementKind::Outpost), 3);
        assert_eq!(settlement_npc_count(SettlementKind::Hamlet), 8);
        assert_eq!(settlement_npc_count(SettlementKind::Village), 15);
        assert_eq!(settlement_npc_count(SettlementKind::Town), 30);
        assert_eq!(settlement_npc_count(SettlementKind::City), 60);
        assert_eq!(settlement_npc_count(SettlementKind::Metropolis), 120);
    }
}
