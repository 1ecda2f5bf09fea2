use serde::{Deserialize, Serialize};

use crate::Command;

/// A complete recorded game: the setup seed plus every accepted command in
/// order. Re-applying the commands to a fresh engine with the same seed
/// reproduces the game bit-for-bit.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayFile {
    pub version: u32,
    pub seed: u64,
    pub commands: Vec<Command>,
}

pub const REPLAY_VERSION: u32 = 1;
