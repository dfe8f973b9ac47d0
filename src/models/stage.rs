use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A step of the fixed compute pipeline: Unions -> Rules -> Classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Approximations of unions of ordered decision classes
    Unions,
    /// Decision rules induced from the unions
    Rules,
    /// Objects classified with the induced rules
    Classification,
}

impl StageKind {
    /// All stages in pipeline order
    pub const ALL: [StageKind; 3] = [StageKind::Unions, StageKind::Rules, StageKind::Classification];

    /// Fixed position in the pipeline (0, 1, 2)
    pub fn position(self) -> usize {
        match self {
            StageKind::Unions => 0,
            StageKind::Rules => 1,
            StageKind::Classification => 2,
        }
    }

    pub fn from_position(position: usize) -> Option<Self> {
        Self::ALL.get(position).copied()
    }

    /// The stage whose result this stage consumes
    pub fn upstream(self) -> Option<Self> {
        self.position()
            .checked_sub(1)
            .and_then(Self::from_position)
    }

    /// The stage that consumes this stage's result
    pub fn downstream(self) -> Option<Self> {
        Self::from_position(self.position() + 1)
    }

    /// Every stage after this one, in pipeline order
    pub fn downstream_chain(self) -> impl Iterator<Item = StageKind> {
        Self::ALL.into_iter().skip(self.position() + 1)
    }

    /// Path segment used by the compute service
    pub fn path_segment(self) -> &'static str {
        match self {
            StageKind::Unions => "unions",
            StageKind::Rules => "rules",
            StageKind::Classification => "classification",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageKind::Unions => "Unions",
            StageKind::Rules => "Rules",
            StageKind::Classification => "Classification",
        };
        f.write_str(name)
    }
}

impl FromStr for StageKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "unions" => Ok(StageKind::Unions),
            "rules" => Ok(StageKind::Rules),
            "classification" => Ok(StageKind::Classification),
            other => Err(format!("unknown stage: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        assert_eq!(StageKind::Unions.upstream(), None);
        assert_eq!(StageKind::Rules.upstream(), Some(StageKind::Unions));
        assert_eq!(StageKind::Classification.upstream(), Some(StageKind::Rules));
        assert_eq!(StageKind::Classification.downstream(), None);

        let chain: Vec<_> = StageKind::Unions.downstream_chain().collect();
        assert_eq!(chain, vec![StageKind::Rules, StageKind::Classification]);
        assert_eq!(StageKind::Classification.downstream_chain().count(), 0);
    }

    #[test]
    fn test_parse_stage() {
        assert_eq!("Rules".parse::<StageKind>(), Ok(StageKind::Rules));
        assert_eq!(" classification ".parse::<StageKind>(), Ok(StageKind::Classification));
        assert!("cones".parse::<StageKind>().is_err());
    }
}
