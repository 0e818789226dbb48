//! Intent and action variants exchanged between the parser, the validator,
//! and the turn orchestrator.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    North,
    South,
    East,
    West,
    Up,
    Down,
}

impl Direction {
    /// Accepts short and long aliases; canonical forms are lowercase long names.
    pub fn canonicalize(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "n" | "north" => Some(Self::North),
            "s" | "south" => Some(Self::South),
            "e" | "east" => Some(Self::East),
            "w" | "west" => Some(Self::West),
            "u" | "up" => Some(Self::Up),
            "d" | "down" => Some(Self::Down),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::North => "north",
            Self::South => "south",
            Self::East => "east",
            Self::West => "west",
            Self::Up => "up",
            Self::Down => "down",
        }
    }

    /// Grid delta on the L1 plane; vertical directions do not translate.
    pub fn grid_delta(self) -> (i64, i64) {
        match self {
            Self::North => (0, -1),
            Self::South => (0, 1),
            Self::East => (1, 0),
            Self::West => (-1, 0),
            Self::Up | Self::Down => (0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestActionKind {
    Accept,
    Complete,
    AskAbout,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrivialKind {
    Sit,
    Stand,
    Wait,
    Listen,
    Look,
    Inventory,
    Help,
}

impl TrivialKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "sit" => Some(Self::Sit),
            "stand" => Some(Self::Stand),
            "wait" => Some(Self::Wait),
            "listen" => Some(Self::Listen),
            "look" => Some(Self::Look),
            "inventory" => Some(Self::Inventory),
            "help" => Some(Self::Help),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ShallowKind {
    Cast,
    Attack,
    Sneak,
}

impl ShallowKind {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cast" => Some(Self::Cast),
            "attack" => Some(Self::Attack),
            "sneak" => Some(Self::Sneak),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Move {
        dir: Direction,
    },
    Take {
        target: String,
    },
    Drop {
        target: String,
    },
    Examine {
        target: String,
    },
    Talk {
        target: String,
    },
    Quest {
        action: QuestActionKind,
        quest_id: Option<String>,
        npc_id: Option<String>,
    },
    Trivial {
        verb: TrivialKind,
    },
    Shallow {
        verb: ShallowKind,
    },
    Unknown {
        raw: String,
    },
}

impl Action {
    pub fn label(&self) -> String {
        match self {
            Self::Move { dir } => format!("move {}", dir.as_str()),
            Self::Take { target } => format!("take {target}"),
            Self::Drop { target } => format!("drop {target}"),
            Self::Examine { target } => format!("examine {target}"),
            Self::Talk { target } => format!("talk {target}"),
            Self::Quest { action, .. } => match action {
                QuestActionKind::Accept => "accept_quest".to_string(),
                QuestActionKind::Complete => "complete_quest".to_string(),
                QuestActionKind::AskAbout => "ask_about_quest".to_string(),
            },
            Self::Trivial { verb } => format!("{verb:?}").to_lowercase(),
            Self::Shallow { verb } => format!("{verb:?}").to_lowercase(),
            Self::Unknown { raw } => format!("unknown:{raw}"),
        }
    }
}

/// Wire shape returned by the semantic parser before normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawIntent {
    #[serde(rename = "primaryAction")]
    pub primary_action: Option<RawAction>,
    #[serde(rename = "secondaryActions", default)]
    pub secondary_actions: Vec<RawAction>,
    #[serde(default)]
    pub compound: bool,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawAction {
    pub action: String,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub dir: Option<String>,
}

/// Normalized intent: a primary action, optional secondaries, and the
/// parser's confidence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Intent {
    pub primary: Action,
    #[serde(default)]
    pub secondary: Vec<Action>,
    #[serde(default)]
    pub compound: bool,
    pub confidence: f64,
}

impl Intent {
    pub fn simple(primary: Action) -> Self {
        Self {
            primary,
            secondary: Vec::new(),
            compound: false,
            confidence: 1.0,
        }
    }
}

/// Compact context handed to the semantic parser; also the serialized half
/// of the intent-cache key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameContext {
    pub layer: u8,
    pub position: crate::state::Position,
    pub visible_npcs: Vec<String>,
    pub inventory_names: Vec<String>,
    pub cell_item_names: Vec<String>,
}
