use crate::position::Move;
use crate::process::EngineCommand;
use std::fmt;
use std::time::Duration;

// Intraprocess Communication Messages

/// Tag of one suggestion request. Only the latest issued generation is ever shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "#{}", self.0)
   }
}

/// Identity of one engine session. Each restart starts a new epoch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Epoch(pub u64);

impl fmt::Display for Epoch {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "session {}", self.0)
   }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SuggestionRequest {
   pub fen: String,
   pub think_time: Duration,
   pub generation: Generation,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Suggestion {
   pub mv: Move,
   pub ponder: Option<Move>,
   pub generation: Generation,
}

// Interface to Engine
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InterfaceMessage {
   Search(SuggestionRequest),
   Cancel,                        // Stop and drain the running search, if any
   NewGame,                       // Cancel, then ucinewgame
   Restart(EngineCommand, Epoch), // Replace the engine session
   Shutdown,
}

// Engine to Interface
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EngineMessage {
   Ready { epoch: Epoch, name: Option<String> },
   Suggestion(Suggestion),
   /// The engine answered but the answer was unusable; the session is fine.
   RequestFailed { generation: Generation, reason: String },
   Crashed { epoch: Epoch, reason: String },
   LaunchFailed { epoch: Epoch, reason: String },
   HandshakeTimedOut { epoch: Epoch, reason: String },
}

impl EngineMessage {
   /// The session a lifecycle message belongs to. Suggestions are tagged by
   /// generation instead.
   pub fn epoch(&self) -> Option<Epoch> {
      match self {
         EngineMessage::Ready { epoch, .. }
         | EngineMessage::Crashed { epoch, .. }
         | EngineMessage::LaunchFailed { epoch, .. }
         | EngineMessage::HandshakeTimedOut { epoch, .. } => Some(*epoch),
         EngineMessage::Suggestion(_) | EngineMessage::RequestFailed { .. } => None,
      }
   }

   /// True for the messages after which no suggestions come until a restart.
   pub fn ends_session(&self) -> bool {
      matches!(
         self,
         EngineMessage::Crashed { .. } | EngineMessage::LaunchFailed { .. } | EngineMessage::HandshakeTimedOut { .. }
      )
   }
}
