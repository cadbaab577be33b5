//! The current game, owned by the control thread.
//!
//! Every change to the game goes through a [`Trainer`] method, and every one of
//! them that changes the position also re-asks the engine for the best reply.

use crate::config::{validate_engine_path, SessionConfig, ThinkTime};
use crate::error::{ConfigError, EngineError, IllegalMoveError, NoMoveToUndoError};
use crate::history::History;
use crate::messages::{EngineMessage, Generation, Suggestion};
use crate::position::{Move, Position};
use crate::suggest::Orchestrator;
use crate::uci::Timeouts;
use crossbeam_channel::Receiver;
use log::{debug, warn};
use std::time::{Duration, Instant};

pub struct Trainer {
   history: History,
   rotated: bool,
   config: SessionConfig,
   orchestrator: Orchestrator,
   last_suggestion: Option<Suggestion>,
}

impl Trainer {
   /// Starts the configured (or detected) engine and asks for a first suggestion.
   pub fn new(config: SessionConfig, start: Position, timeouts: Timeouts) -> Trainer {
      let orchestrator = Orchestrator::spawn(config.engine_command(), config.think_time, timeouts);
      Trainer::with_orchestrator(config, start, orchestrator)
   }

   pub fn with_orchestrator(config: SessionConfig, start: Position, orchestrator: Orchestrator) -> Trainer {
      let mut trainer = Trainer {
         history: History::new(start),
         rotated: false,
         config,
         orchestrator,
         last_suggestion: None,
      };
      trainer.position_changed();
      trainer
   }

   pub fn position(&self) -> &Position {
      self.history.current()
   }

   pub fn history(&self) -> &History {
      &self.history
   }

   pub fn config(&self) -> &SessionConfig {
      &self.config
   }

   pub fn orchestrator(&self) -> &Orchestrator {
      &self.orchestrator
   }

   pub fn last_suggestion(&self) -> Option<Suggestion> {
      self.last_suggestion
   }

   pub fn is_rotated(&self) -> bool {
      self.rotated
   }

   /// Flips the presentation flag. The position is untouched.
   pub fn rotate(&mut self) -> bool {
      self.rotated = !self.rotated;
      self.rotated
   }

   pub fn play(&mut self, mv: Move) -> Result<Option<Generation>, IllegalMoveError> {
      self.history.play(mv)?;
      Ok(self.position_changed())
   }

   pub fn undo(&mut self) -> Result<Option<Generation>, NoMoveToUndoError> {
      self.history.undo()?;
      self.orchestrator.cancel();
      Ok(self.position_changed())
   }

   pub fn new_game(&mut self, start: Position) -> Option<Generation> {
      self.orchestrator.new_game();
      self.history.reset(start);
      self.position_changed()
   }

   /// Replaces the game with `start` followed by `moves`; the current game is
   /// kept if any move is illegal.
   pub fn load(&mut self, start: Position, moves: &[Move]) -> Result<Option<Generation>, IllegalMoveError> {
      let mut history = History::new(start);
      history.play_all(moves)?;
      self.orchestrator.new_game();
      self.history = history;
      Ok(self.position_changed())
   }

   pub fn set_think_time(&mut self, ms: u64) -> ThinkTime {
      let think_time = ThinkTime::from_millis(ms);
      self.config.think_time = think_time;
      self.orchestrator.on_config_changed(think_time);
      think_time
   }

   /// Validates and switches to another engine binary. Arguments configured
   /// for the previous binary are dropped.
   pub fn set_engine_path(&mut self, text: &str) -> Result<(), ConfigError> {
      let path = validate_engine_path(text)?;
      self.config.engine_path = Some(path);
      self.config.engine_args.clear();
      if let Err(e) = self.restart_engine() {
         warn!("{}", e);
      }
      Ok(())
   }

   /// Forgets the configured engine and restarts with whatever is detected.
   pub fn use_detected_engine(&mut self) -> Result<Option<Generation>, EngineError> {
      self.config.engine_path = None;
      self.config.engine_args.clear();
      self.restart_engine()
   }

   pub fn restart_engine(&mut self) -> Result<Option<Generation>, EngineError> {
      let command = self.config.engine_command().ok_or(EngineError::NotConfigured)?;
      self.orchestrator.restart(command);
      Ok(self.position_changed())
   }

   pub fn events(&self) -> &Receiver<EngineMessage> {
      self.orchestrator.events()
   }

   /// Filters an engine message for display. Stale suggestions, and suggestions
   /// that are not legal here, are dropped.
   pub fn admit(&mut self, message: EngineMessage) -> Option<EngineMessage> {
      let message = self.orchestrator.admit(message)?;
      if let EngineMessage::Suggestion(suggestion) = &message {
         if !self.position().is_legal(suggestion.mv) {
            warn!("engine suggested illegal move {}", suggestion.mv);
            return None;
         }
         self.last_suggestion = Some(*suggestion);
      }
      Some(message)
   }

   pub fn next_event(&mut self, timeout: Duration) -> Option<EngineMessage> {
      let deadline = Instant::now() + timeout;
      loop {
         let message = self.events().recv_deadline(deadline).ok()?;
         if let Some(message) = self.admit(message) {
            return Some(message);
         }
      }
   }

   /// "Nf3" when the move is legal in the current position, UCI text otherwise.
   pub fn describe(&self, mv: Move) -> String {
      self.position().san(mv).unwrap_or_else(|| mv.to_string())
   }

   pub fn shutdown(&mut self) {
      self.orchestrator.shutdown();
   }

   fn position_changed(&mut self) -> Option<Generation> {
      self.last_suggestion = None;
      let generation = self.orchestrator.on_position_changed(self.history.current());
      debug!("position {} -> {:?}", self.history.current().to_fen(), generation);
      generation
   }
}
