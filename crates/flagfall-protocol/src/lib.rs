mod command;
mod coord;
mod event;
mod ids;
mod log;
mod replay;
mod snapshot;
mod types;
mod ui;
mod wire;

pub use crate::command::*;
pub use crate::coord::*;
pub use crate::event::*;
pub use crate::ids::*;
pub use crate::log::*;
pub use crate::replay::*;
pub use crate::snapshot::*;
pub use crate::types::*;
pub use crate::ui::*;
pub use crate::wire::*;
