use crate::position::Move;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{mv} is not a legal move in {fen}")]
pub struct IllegalMoveError {
   pub mv: Move,
   pub fen: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no move to undo")]
pub struct NoMoveToUndoError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid FEN {fen:?}: {reason}")]
pub struct FenError {
   pub fen: String,
   pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveParseError {
   #[error("a move has to be 4-5 bytes long, got {0:?}")]
   Length(String),
   #[error("{0:?} is not a square, expected a1..=h8")]
   Square(String),
   #[error("expected one of nbrq for promotion target, got {0:?}")]
   Promotion(String),
}

/// Failures of the engine session. `Launch`, `HandshakeTimeout` and `Crashed`
/// invalidate the whole session; `ProtocolParse` only fails one request.
#[derive(Debug, Error)]
pub enum EngineError {
   #[error("failed to launch engine at {}: {source}", path.display())]
   Launch {
      path: PathBuf,
      #[source]
      source: io::Error,
   },
   #[error("engine did not answer with {expected} in time")]
   HandshakeTimeout { expected: &'static str },
   #[error("engine crashed: {reason}")]
   Crashed { reason: String },
   #[error("could not parse engine output {line:?}")]
   ProtocolParse { line: String },
   #[error("engine is not ready ({state:?})")]
   NotReady { state: crate::uci::ClientState },
   #[error("no engine configured and none found on PATH")]
   NotConfigured,
}

impl EngineError {
   pub(crate) fn crashed(reason: impl Into<String>) -> EngineError {
      EngineError::Crashed { reason: reason.into() }
   }
}

#[derive(Debug, Error)]
pub enum ConfigError {
   #[error("settings I/O error: {0}")]
   Io(#[from] io::Error),
   #[error("settings serialization error: {0}")]
   Serialization(#[from] serde_json::Error),
   #[error("{} is not an executable engine", .0.display())]
   InvalidEnginePath(PathBuf),
}

#[derive(Debug, Error)]
pub enum PgnError {
   #[error("can't read game file: {0}")]
   Io(#[from] io::Error),
   #[error("no game found")]
   NoGame,
   #[error(transparent)]
   Fen(#[from] FenError),
   #[error("move {ply} ({san}) is not legal")]
   IllegalSan { ply: usize, san: String },
}
