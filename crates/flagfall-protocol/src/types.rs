use serde::{Deserialize, Serialize};

/// The five fixed unit archetypes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Archetype {
    General,
    Sweeper,
    Ranger,
    Maker,
    Defuser,
}

impl Archetype {
    pub const ALL: [Archetype; 5] = [
        Archetype::General,
        Archetype::Sweeper,
        Archetype::Ranger,
        Archetype::Maker,
        Archetype::Defuser,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MineKind {
    Normal,
    Slow,
    Smoke,
    Chain,
    Nuke,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BuildingKind {
    Tower,
    Hub,
    Factory,
}

/// One of the two independent evolution tracks per archetype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Branch {
    A,
    B,
}

/// The permanent level-3 fork.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Variant {
    One,
    Two,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Placement,
    Thinking,
    Action,
    GameOver,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OreSize {
    Small,
    Medium,
    Large,
}
