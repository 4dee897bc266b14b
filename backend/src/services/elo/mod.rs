pub mod engine;
pub mod formula;
pub mod params;

pub use engine::{EloEngine, EloRunStats};
pub use params::{classify_level, EloParams, TournamentLevel};
