use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Conformance level requested for a run. Each level includes every lower one.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(from = "LevelParam", into = "u8")]
pub enum ConformanceLevel {
    #[default]
    One,
    Two,
    Three,
}

impl ConformanceLevel {
    pub const ALL: [ConformanceLevel; 3] = [Self::One, Self::Two, Self::Three];

    /// Lenient parse of a run parameter. Missing, non-numeric and
    /// out-of-range values all select level 1.
    pub fn from_param(param: Option<&str>) -> Self {
        let Some(param) = param else {
            return Self::default();
        };
        param
            .trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_number)
            .unwrap_or_else(|| {
                warn!(requested = param, "unknown conformance level, using level 1");
                Self::default()
            })
    }

    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            _ => None,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
        }
    }

    /// Whether a group tagged `group` runs at this level
    pub fn includes(self, group: ConformanceLevel) -> bool {
        group <= self
    }
}

impl fmt::Display for ConformanceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}

/// A level as written in a configuration file, either `2` or `"2"`
#[derive(Deserialize)]
#[serde(untagged)]
enum LevelParam {
    Number(i64),
    Text(String),
}

impl From<LevelParam> for ConformanceLevel {
    fn from(param: LevelParam) -> Self {
        match param {
            LevelParam::Number(n) => Self::from_param(Some(&n.to_string())),
            LevelParam::Text(text) => Self::from_param(Some(&text)),
        }
    }
}

/// Lenient command-line parser for `--level`
pub fn parse_level(arg: &str) -> Result<ConformanceLevel, std::convert::Infallible> {
    Ok(ConformanceLevel::from_param(Some(arg)))
}

impl From<ConformanceLevel> for u8 {
    fn from(level: ConformanceLevel) -> Self {
        level.number()
    }
}

/// Selects the rule groups that run for a level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelGate {
    level: ConformanceLevel,
}

impl LevelGate {
    pub fn new(level: ConformanceLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> ConformanceLevel {
        self.level
    }

    pub fn admits(&self, group: ConformanceLevel) -> bool {
        self.level.includes(group)
    }
}
