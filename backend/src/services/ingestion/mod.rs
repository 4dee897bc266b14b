pub mod draw;
pub mod results;
pub mod schedule;
