pub mod elo_parameter_set;
pub mod elo_rating_history;
pub mod elo_state;
pub mod match_row;
pub mod pipeline_run;
pub mod player;
pub mod scrape_queue;
pub mod tournament;

pub use elo_parameter_set::EloParameterSet;
pub use elo_rating_history::EloRatingHistory;
pub use elo_state::PlayerEloState;
pub use match_row::{EloWriteback, Match, MatchStatus, RoundRank};
pub use pipeline_run::{PipelineCheckpoint, PipelineRun, PipelineStageRun};
pub use player::{Player, PlayerAlias, PlayerReviewQueue, ReviewStatus};
pub use scrape_queue::{ScrapeTask, TaskStatus};
pub use tournament::{Tour, Tournament, TournamentEdition};
