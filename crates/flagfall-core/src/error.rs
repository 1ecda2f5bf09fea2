use thiserror::Error;

/// Rejection taxonomy for action intents. Every rejection is recoverable:
/// the state is left untouched and a single error-category log entry is
/// emitted; the engine itself never dies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    #[error("illegal target")]
    IllegalTarget,
    #[error("insufficient energy: need {need}, have {have}")]
    InsufficientEnergy { need: i32, have: i32 },
    #[error("spend cap exceeded: cap {cap}, spent {spent}, cost {cost}")]
    CapExceeded { cap: i32, spent: i32, cost: i32 },
    #[error("not your turn")]
    NotYourTurn,
    #[error("unit already acted this round")]
    UnitAlreadyActed,
    #[error("another unit is active and must end its turn first")]
    AnotherUnitActive,
    #[error("prerequisite not met")]
    PrerequisiteNotMet,
    #[error("limit reached")]
    LimitReached,
    #[error("wrong phase for this action")]
    WrongPhase,
    #[error("unknown unit")]
    UnknownUnit,
    #[error("the game is over")]
    GameOver,
}
