//! Client side of the UCI protocol, layered on an [`EngineProcess`].
//!
//! The client is a small state machine:
//!
//! ```text
//! Unstarted -> Handshaking -> Ready <-> Searching
//!                  any state -> Crashed
//! ```
//!
//! Only one search is ever outstanding. A new search must wait for [`UciClient::stop`]
//! to drain the previous `bestmove` line so the line stream never interleaves
//! two searches.

use crate::error::EngineError;
use crate::position::Move;
use crate::process::{EngineCommand, EngineProcess, ProcessEvent};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{debug, trace, warn};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
   Unstarted,
   Handshaking,
   Ready,
   Searching,
   Crashed,
   Stopped,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
   /// Bound on each of `uciok` and `readyok`.
   pub handshake: Duration,
   /// Added to the think time before a search counts as hung; also bounds a stop/drain.
   pub slack: Duration,
}

impl Default for Timeouts {
   fn default() -> Timeouts {
      Timeouts {
         handshake: Duration::from_secs(5),
         slack: Duration::from_secs(2),
      }
   }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EngineId {
   pub name: Option<String>,
   pub author: Option<String>,
}

/// Answer to one `go`. `mv` is `None` when the engine reports no legal move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BestMove {
   pub mv: Option<Move>,
   pub ponder: Option<Move>,
}

/// Parses `bestmove <move> [ponder <move>]`.
pub fn parse_best_move(line: &str) -> Result<BestMove, EngineError> {
   let malformed = || EngineError::ProtocolParse { line: line.to_owned() };
   let mut tokens = line.split_whitespace();
   if tokens.next() != Some("bestmove") {
      return Err(malformed());
   }
   let mv = match tokens.next() {
      Some("(none)") | Some("0000") => None,
      Some(text) => Some(text.parse::<Move>().map_err(|_| malformed())?),
      None => return Err(malformed()),
   };
   let ponder = match (tokens.next(), tokens.next()) {
      (Some("ponder"), Some(text)) => text.parse::<Move>().ok(),
      _ => None,
   };
   Ok(BestMove { mv, ponder })
}

fn is_best_move_line(line: &str) -> bool {
   line.split_whitespace().next() == Some("bestmove")
}

pub struct UciClient {
   process: Option<EngineProcess>,
   state: ClientState,
   id: EngineId,
   timeouts: Timeouts,
   search_deadline: Option<Instant>,
}

impl UciClient {
   pub fn new(timeouts: Timeouts) -> UciClient {
      UciClient {
         process: None,
         state: ClientState::Unstarted,
         id: EngineId::default(),
         timeouts,
         search_deadline: None,
      }
   }

   /// Spawns the engine and runs the handshake.
   pub fn launch(command: &EngineCommand, timeouts: Timeouts) -> Result<UciClient, EngineError> {
      let mut client = UciClient::new(timeouts);
      client.start(command)?;
      Ok(client)
   }

   pub fn state(&self) -> ClientState {
      self.state
   }

   pub fn engine_id(&self) -> &EngineId {
      &self.id
   }

   pub fn is_searching(&self) -> bool {
      self.state == ClientState::Searching
   }

   /// Engine output for callers that wait on several channels at once.
   pub fn events(&self) -> Option<&Receiver<ProcessEvent>> {
      self.process.as_ref().map(EngineProcess::events)
   }

   pub fn search_deadline(&self) -> Option<Instant> {
      self.search_deadline
   }

   pub fn start(&mut self, command: &EngineCommand) -> Result<(), EngineError> {
      if self.state != ClientState::Unstarted {
         return Err(EngineError::NotReady { state: self.state });
      }
      let process = EngineProcess::start(command).map_err(|e| {
         self.state = ClientState::Crashed;
         e
      })?;
      self.process = Some(process);
      self.set_state(ClientState::Handshaking);

      self.send("uci")?;
      self.await_token("uciok", Instant::now() + self.timeouts.handshake)?;
      self.send("ucinewgame")?;
      self.send("isready")?;
      self.await_token("readyok", Instant::now() + self.timeouts.handshake)?;
      self.set_state(ClientState::Ready);
      Ok(())
   }

   /// `ucinewgame` followed by an `isready` sync.
   pub fn new_game(&mut self) -> Result<(), EngineError> {
      self.require_ready()?;
      self.send("ucinewgame")?;
      self.send("isready")?;
      let deadline = Instant::now() + self.timeouts.slack;
      self.await_token("readyok", deadline).map_err(|e| match e {
         EngineError::HandshakeTimeout { .. } => self.crash("no readyok after ucinewgame"),
         other => other,
      })
   }

   /// Sends `position` and `go`; the answer arrives through [`UciClient::handle_event`].
   /// A search still running is stopped and drained first.
   pub fn begin_search(&mut self, fen: &str, think_time: Duration) -> Result<(), EngineError> {
      self.stop()?;
      self.require_ready()?;
      self.send(&format!("position fen {}", fen))?;
      self.send(&format!("go movetime {}", think_time.as_millis()))?;
      self.search_deadline = Some(Instant::now() + think_time + self.timeouts.slack);
      self.set_state(ClientState::Searching);
      Ok(())
   }

   /// Feeds one line (or the exit notice) from the engine. Returns the best move
   /// once the running search finishes; everything else is skipped.
   pub fn handle_event(&mut self, event: ProcessEvent) -> Result<Option<BestMove>, EngineError> {
      match event {
         ProcessEvent::Exited => {
            if self.state == ClientState::Stopped {
               return Ok(None);
            }
            Err(self.crash("engine process exited"))
         }
         ProcessEvent::Line(line) => {
            if self.state != ClientState::Searching || !is_best_move_line(&line) {
               trace!("skipping engine line {:?}", line);
               return Ok(None);
            }
            self.search_deadline = None;
            self.set_state(ClientState::Ready);
            parse_best_move(&line).map(Some)
         }
      }
   }

   /// Fails the session if the running search has outlived its deadline.
   pub fn check_deadline(&mut self) -> Result<(), EngineError> {
      match self.search_deadline {
         Some(deadline) if self.state == ClientState::Searching && Instant::now() >= deadline => {
            Err(self.crash("search overran its think time"))
         }
         _ => Ok(()),
      }
   }

   /// Blocks until the running search answers or its deadline passes.
   pub fn wait_best_move(&mut self) -> Result<BestMove, EngineError> {
      while self.state == ClientState::Searching {
         let deadline = self.search_deadline.unwrap_or_else(Instant::now);
         match self.recv_deadline(deadline) {
            Ok(event) => {
               if let Some(best) = self.handle_event(event)? {
                  return Ok(best);
               }
            }
            Err(RecvTimeoutError::Timeout) => self.check_deadline()?,
            Err(RecvTimeoutError::Disconnected) => return Err(self.crash("engine output closed")),
         }
      }
      Err(EngineError::NotReady { state: self.state })
   }

   pub fn search(&mut self, fen: &str, think_time: Duration) -> Result<BestMove, EngineError> {
      self.begin_search(fen, think_time)?;
      self.wait_best_move()
   }

   /// Sends one `stop` and discards the pending `bestmove`. No-op unless searching.
   pub fn stop(&mut self) -> Result<(), EngineError> {
      if self.state != ClientState::Searching {
         return Ok(());
      }
      self.send("stop")?;
      let deadline = Instant::now() + self.timeouts.slack;
      while self.state == ClientState::Searching {
         match self.recv_deadline(deadline) {
            Ok(event) => match self.handle_event(event) {
               Ok(Some(best)) => debug!("drained stopped search ({:?})", best.mv),
               Ok(None) => {}
               Err(EngineError::ProtocolParse { line }) => debug!("drained stopped search ({:?})", line),
               Err(e) => return Err(e),
            },
            Err(RecvTimeoutError::Timeout) => return Err(self.crash("no bestmove after stop")),
            Err(RecvTimeoutError::Disconnected) => return Err(self.crash("engine output closed")),
         }
      }
      Ok(())
   }

   /// Orderly shutdown: `quit`, then kill if the engine lingers.
   pub fn quit(&mut self) {
      if let Some(mut process) = self.process.take() {
         process.terminate();
      }
      self.search_deadline = None;
      if self.state != ClientState::Crashed {
         self.set_state(ClientState::Stopped);
      }
   }

   fn require_ready(&self) -> Result<(), EngineError> {
      if self.state == ClientState::Ready {
         Ok(())
      } else {
         Err(EngineError::NotReady { state: self.state })
      }
   }

   fn set_state(&mut self, state: ClientState) {
      debug!("uci client {:?} -> {:?}", self.state, state);
      self.state = state;
   }

   /// Marks the session dead and tears the process down.
   fn crash(&mut self, reason: &str) -> EngineError {
      warn!("engine session lost: {}", reason);
      self.set_state(ClientState::Crashed);
      self.search_deadline = None;
      if let Some(mut process) = self.process.take() {
         process.terminate();
      }
      EngineError::crashed(reason)
   }

   fn send(&mut self, line: &str) -> Result<(), EngineError> {
      let result = match self.process.as_mut() {
         Some(process) => process.write_line(line),
         None => return Err(EngineError::NotReady { state: self.state }),
      };
      result.map_err(|e| match e {
         EngineError::Crashed { reason } => self.crash(&reason),
         other => other,
      })
   }

   fn recv_deadline(&self, deadline: Instant) -> Result<ProcessEvent, RecvTimeoutError> {
      match self.process.as_ref() {
         Some(process) => process.events().recv_deadline(deadline),
         None => Err(RecvTimeoutError::Disconnected),
      }
   }

   fn await_token(&mut self, token: &'static str, deadline: Instant) -> Result<(), EngineError> {
      loop {
         match self.recv_deadline(deadline) {
            Ok(ProcessEvent::Line(line)) => {
               if line == token {
                  return Ok(());
               }
               if let Some(rest) = line.strip_prefix("id name ") {
                  self.id.name = Some(rest.trim().to_owned());
               } else if let Some(rest) = line.strip_prefix("id author ") {
                  self.id.author = Some(rest.trim().to_owned());
               } else {
                  trace!("skipping engine line {:?} while waiting for {}", line, token);
               }
            }
            Ok(ProcessEvent::Exited) | Err(RecvTimeoutError::Disconnected) => {
               return Err(self.crash(&format!("engine exited while waiting for {}", token)));
            }
            Err(RecvTimeoutError::Timeout) => {
               self.crash(&format!("timed out waiting for {}", token));
               return Err(EngineError::HandshakeTimeout { expected: token });
            }
         }
      }
   }
}

impl Drop for UciClient {
   fn drop(&mut self) {
      self.quit();
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::position::{PromotionTarget, Square};

   #[test]
   fn parses_plain_best_move() {
      let best = parse_best_move("bestmove e2e4").unwrap();
      assert_eq!(best.mv, Some(Move::new(Square::E2, Square::E4)));
      assert_eq!(best.ponder, None);
   }

   #[test]
   fn parses_best_move_with_ponder_and_promotion() {
      let best = parse_best_move("bestmove b7b8q ponder h7h6").unwrap();
      assert_eq!(best.mv.and_then(|m| m.promotion), Some(PromotionTarget::Queen));
      assert_eq!(best.ponder, Some(Move::new(Square::H7, Square::H6)));
   }

   #[test]
   fn no_move_answers() {
      assert_eq!(parse_best_move("bestmove (none)").unwrap().mv, None);
      assert_eq!(parse_best_move("bestmove 0000").unwrap().mv, None);
   }

   #[test]
   fn malformed_best_move_lines() {
      for line in ["bestmove", "bestmove zz99", "bestmove e2e4e", "bestmov e2e4", "info depth 1"] {
         assert!(
            matches!(parse_best_move(line), Err(EngineError::ProtocolParse { .. })),
            "{} should not parse",
            line
         );
      }
   }

   #[test]
   fn only_best_move_token_ends_a_search() {
      assert!(is_best_move_line("bestmove e2e4 ponder e7e5"));
      assert!(is_best_move_line("  bestmove (none)"));
      assert!(!is_best_move_line("info string bestmove soon"));
      assert!(!is_best_move_line("bestmoves e2e4"));
   }

   #[test]
   fn unstarted_client_refuses_work() {
      let mut client = UciClient::new(Timeouts::default());
      assert_eq!(client.state(), ClientState::Unstarted);
      assert!(matches!(
         client.begin_search("8/8/8/8/8/8/8/8 w - - 0 1", Duration::from_millis(50)),
         Err(EngineError::NotReady {
            state: ClientState::Unstarted
         })
      ));
      assert!(client.stop().is_ok());
      client.quit();
      assert_eq!(client.state(), ClientState::Stopped);
   }
}
