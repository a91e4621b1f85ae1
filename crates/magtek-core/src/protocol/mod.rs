//! Protocol module - MagTek feature report and input report definitions.

pub mod command;
pub mod constants;
pub mod swipe;
pub mod track_format;

pub use command::{CommandBuffer, CommandResponse};
pub use constants::*;
pub use swipe::{CardType, SwipeData};
pub use track_format::{TrackFormat, TrackMode};
