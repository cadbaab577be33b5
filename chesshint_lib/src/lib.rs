//! Move-suggestion trainer core: a game you play against yourself while a UCI
//! engine, running as a subprocess, keeps proposing the best reply for the
//! side to move.

pub mod config;
pub mod error;
pub mod history;
pub mod messages;
pub mod pgn;
pub mod position;
pub mod process;
pub mod suggest;
pub mod trainer;
pub mod uci;

pub use config::{SessionConfig, ThinkTime};
pub use error::{ConfigError, EngineError, IllegalMoveError, NoMoveToUndoError, PgnError};
pub use messages::{EngineMessage, Generation, Suggestion};
pub use position::{Move, Position};
pub use suggest::Orchestrator;
pub use trainer::Trainer;
