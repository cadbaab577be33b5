//! Keeps the UI fed with the freshest best-move suggestion.
//!
//! The control thread calls [`Orchestrator::on_position_changed`] after every
//! change to the game. Each call issues a new [`Generation`]; the engine worker
//! runs searches one at a time on its own thread, and any answer whose
//! generation is no longer the latest is dropped, both on the worker before it
//! is sent and again on the control thread when it is received.

use crate::config::ThinkTime;
use crate::error::EngineError;
use crate::messages::{EngineMessage, Epoch, Generation, InterfaceMessage, Suggestion, SuggestionRequest};
use crate::position::Position;
use crate::process::{EngineCommand, ProcessEvent};
use crate::uci::{Timeouts, UciClient};
use crossbeam_channel::{at, never, select, unbounded, Receiver, Sender};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrchestratorState {
   Idle,
   Pending(Generation),
}

/// State shared with the worker. Staleness is a plain comparison against
/// `latest` for requests and against `epoch` for engine sessions.
struct Shared {
   latest: AtomicU64,
   epoch: AtomicU64,
   engine_usable: AtomicBool,
}

impl Shared {
   fn is_current(&self, generation: Generation) -> bool {
      self.latest.load(Ordering::SeqCst) == generation.0
   }

   fn is_current_epoch(&self, epoch: Epoch) -> bool {
      self.epoch.load(Ordering::SeqCst) == epoch.0
   }
}

pub struct Orchestrator {
   sender: Sender<InterfaceMessage>,
   events: Receiver<EngineMessage>,
   shared: Arc<Shared>,
   think_time: ThinkTime,
   state: OrchestratorState,
   worker: Option<JoinHandle<()>>,
}

impl Orchestrator {
   /// Starts the engine worker. Launch and handshake happen on the worker; their
   /// outcome arrives as an [`EngineMessage`].
   pub fn spawn(engine: Option<EngineCommand>, think_time: ThinkTime, timeouts: Timeouts) -> Orchestrator {
      let (ite_tx, ite_rx) = unbounded(); // Interface to Engine
      let (eti_tx, eti_rx) = unbounded(); // Engine to Interface
      let shared = Arc::new(Shared {
         latest: AtomicU64::new(0),
         epoch: AtomicU64::new(0),
         engine_usable: AtomicBool::new(engine.is_some()),
      });

      let worker_shared = Arc::clone(&shared);
      let worker = thread::Builder::new()
         .name("engine-worker".into())
         .spawn(move || start(engine, timeouts, ite_rx, eti_tx, worker_shared));
      let worker = match worker {
         Ok(handle) => Some(handle),
         Err(e) => {
            error!("could not start the engine worker: {}", e);
            shared.engine_usable.store(false, Ordering::SeqCst);
            None
         }
      };

      Orchestrator {
         sender: ite_tx,
         events: eti_rx,
         shared,
         think_time,
         state: OrchestratorState::Idle,
         worker,
      }
   }

   pub fn latest(&self) -> Generation {
      Generation(self.shared.latest.load(Ordering::SeqCst))
   }

   pub fn is_current(&self, generation: Generation) -> bool {
      self.shared.is_current(generation)
   }

   /// The engine session the latest restart asked for.
   pub fn epoch(&self) -> Epoch {
      Epoch(self.shared.epoch.load(Ordering::SeqCst))
   }

   /// False after a crash or failed launch, until [`Orchestrator::restart`].
   pub fn engine_usable(&self) -> bool {
      self.worker.is_some() && self.shared.engine_usable.load(Ordering::SeqCst)
   }

   pub fn state(&self) -> OrchestratorState {
      self.state
   }

   pub fn think_time(&self) -> ThinkTime {
      self.think_time
   }

   /// Supersedes whatever is in flight and asks for the best move in `position`.
   /// Returns the new request's generation, or `None` when nothing was asked
   /// because the game is over or the engine is down.
   pub fn on_position_changed(&mut self, position: &Position) -> Option<Generation> {
      let generation = self.bump();
      if position.is_terminal() || !self.engine_usable() {
         debug!("not requesting a suggestion for {}", generation);
         self.send(InterfaceMessage::Cancel);
         self.state = OrchestratorState::Idle;
         return None;
      }
      let request = SuggestionRequest {
         fen: position.to_fen(),
         think_time: self.think_time.as_duration(),
         generation,
      };
      self.send(InterfaceMessage::Search(request));
      self.state = OrchestratorState::Pending(generation);
      Some(generation)
   }

   /// Applies from the next request on.
   pub fn on_config_changed(&mut self, think_time: ThinkTime) {
      self.think_time = think_time;
   }

   /// Invalidates the pending request and stops the engine's current search.
   pub fn cancel(&mut self) {
      let generation = self.bump();
      debug!("cancelled, latest is now {}", generation);
      self.send(InterfaceMessage::Cancel);
      self.state = OrchestratorState::Idle;
   }

   pub fn new_game(&mut self) {
      self.bump();
      self.send(InterfaceMessage::NewGame);
      self.state = OrchestratorState::Idle;
   }

   /// Replaces the engine session, e.g. after a crash or a path change.
   /// Lifecycle messages from the replaced session are dropped from here on.
   pub fn restart(&mut self, engine: EngineCommand) {
      self.bump();
      let epoch = Epoch(self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1);
      self.shared.engine_usable.store(true, Ordering::SeqCst);
      self.send(InterfaceMessage::Restart(engine, epoch));
      self.state = OrchestratorState::Idle;
   }

   /// Engine messages for callers that `select!` over several channels; pass
   /// each one through [`Orchestrator::admit`].
   pub fn events(&self) -> &Receiver<EngineMessage> {
      &self.events
   }

   /// Drops superseded answers and returns what the UI should see.
   pub fn admit(&mut self, message: EngineMessage) -> Option<EngineMessage> {
      if let Some(epoch) = message.epoch() {
         if !self.shared.is_current_epoch(epoch) {
            debug!("discarding {:?} from replaced {}", message, epoch);
            return None;
         }
      }
      match &message {
         EngineMessage::Suggestion(Suggestion { generation, .. })
         | EngineMessage::RequestFailed { generation, .. } => {
            if !self.is_current(*generation) {
               debug!("discarding stale answer for {}", generation);
               return None;
            }
            self.state = OrchestratorState::Idle;
         }
         EngineMessage::Ready { .. } => {}
         EngineMessage::Crashed { .. } | EngineMessage::LaunchFailed { .. } | EngineMessage::HandshakeTimedOut { .. } => {
            self.state = OrchestratorState::Idle;
         }
      }
      Some(message)
   }

   /// Waits up to `timeout` for the next message worth showing.
   pub fn next_event(&mut self, timeout: Duration) -> Option<EngineMessage> {
      let deadline = Instant::now() + timeout;
      loop {
         let message = self.events.recv_deadline(deadline).ok()?;
         if let Some(message) = self.admit(message) {
            return Some(message);
         }
      }
   }

   /// Stops the worker, which quits the engine. Called on drop as well.
   pub fn shutdown(&mut self) {
      if let Some(worker) = self.worker.take() {
         self.send(InterfaceMessage::Shutdown);
         if worker.join().is_err() {
            error!("engine worker panicked");
         }
      }
   }

   fn bump(&mut self) -> Generation {
      Generation(self.shared.latest.fetch_add(1, Ordering::SeqCst) + 1)
   }

   fn send(&self, message: InterfaceMessage) {
      if self.sender.send(message).is_err() {
         warn!("engine worker is gone");
      }
   }
}

impl Drop for Orchestrator {
   fn drop(&mut self) {
      self.shutdown();
   }
}

struct Worker {
   receiver: Receiver<InterfaceMessage>,
   sender: Sender<EngineMessage>,
   shared: Arc<Shared>,
   timeouts: Timeouts,
   client: Option<UciClient>,
   epoch: Epoch,
   pending: Option<Generation>,
}

fn start(
   engine: Option<EngineCommand>,
   timeouts: Timeouts,
   receiver: Receiver<InterfaceMessage>,
   sender: Sender<EngineMessage>,
   shared: Arc<Shared>,
) {
   let mut worker = Worker {
      receiver,
      sender,
      shared,
      timeouts,
      client: None,
      epoch: Epoch(0),
      pending: None,
   };
   worker.launch(engine);

   loop {
      let commands = worker.receiver.clone();
      let engine_rx = worker
         .client
         .as_ref()
         .and_then(UciClient::events)
         .cloned()
         .unwrap_or_else(never);
      let timer = worker
         .client
         .as_ref()
         .and_then(UciClient::search_deadline)
         .map(at)
         .unwrap_or_else(never);

      select! {
         recv(commands) -> message => match message {
            Ok(InterfaceMessage::Shutdown) | Err(_) => break,
            Ok(message) => worker.handle_message(message),
         },
         recv(engine_rx) -> event => match event {
            Ok(event) => worker.handle_engine_event(event),
            Err(_) => worker.handle_engine_event(ProcessEvent::Exited),
         },
         recv(timer) -> _ => worker.check_deadline(),
      }
   }

   if let Some(mut client) = worker.client.take() {
      client.quit();
   }
   debug!("engine worker finished");
}

impl Worker {
   fn launch(&mut self, engine: Option<EngineCommand>) {
      let command = match engine {
         Some(command) => command,
         None => return self.fail(EngineError::NotConfigured),
      };
      match UciClient::launch(&command, self.timeouts) {
         Ok(client) => {
            let id = client.engine_id();
            let name = id.name.clone();
            info!(
               "engine {} ready ({} by {})",
               command,
               name.as_deref().unwrap_or("unnamed"),
               id.author.as_deref().unwrap_or("unknown")
            );
            if self.shared.is_current_epoch(self.epoch) {
               self.shared.engine_usable.store(true, Ordering::SeqCst);
            }
            self.client = Some(client);
            self.emit(EngineMessage::Ready { epoch: self.epoch, name });
         }
         Err(e) => self.fail(e),
      }
   }

   fn handle_message(&mut self, message: InterfaceMessage) {
      match message {
         InterfaceMessage::Search(request) => self.search(request),
         InterfaceMessage::Cancel => {
            self.stop_search();
         }
         InterfaceMessage::NewGame => {
            if self.stop_search() {
               if let Some(client) = self.client.as_mut() {
                  if let Err(e) = client.new_game() {
                     self.fail(e);
                  }
               }
            }
         }
         InterfaceMessage::Restart(command, epoch) => {
            if let Some(mut client) = self.client.take() {
               client.quit();
            }
            self.epoch = epoch;
            self.pending = None;
            self.launch(Some(command));
         }
         InterfaceMessage::Shutdown => {}
      }
   }

   fn search(&mut self, request: SuggestionRequest) {
      if !self.shared.is_current(request.generation) {
         // A newer request or a cancel is already queued behind this one.
         debug!("skipping superseded request {}", request.generation);
         return;
      }
      if !self.stop_search() {
         return;
      }
      let client = match self.client.as_mut() {
         Some(client) => client,
         None => {
            debug!("no engine session for {}", request.generation);
            return;
         }
      };
      match client.begin_search(&request.fen, request.think_time) {
         Ok(()) => {
            debug!("searching {} for {:?}", request.generation, request.think_time);
            self.pending = Some(request.generation);
         }
         Err(e) => self.fail(e),
      }
   }

   /// Finishes any running stop/drain cycle. False if the session died doing so.
   fn stop_search(&mut self) -> bool {
      let stale = self.pending.take();
      let result = match self.client.as_mut() {
         Some(client) if client.is_searching() => client.stop(),
         _ => return true,
      };
      match result {
         Ok(()) => {
            if let Some(generation) = stale {
               debug!("stopped search {}", generation);
            }
            true
         }
         Err(e) => {
            self.fail(e);
            false
         }
      }
   }

   fn handle_engine_event(&mut self, event: ProcessEvent) {
      let client = match self.client.as_mut() {
         Some(client) => client,
         None => return,
      };
      match client.handle_event(event) {
         Ok(None) => {}
         Ok(Some(best)) => {
            let generation = match self.pending.take() {
               Some(generation) => generation,
               None => return,
            };
            if !self.shared.is_current(generation) {
               debug!("dropping stale answer for {}", generation);
               return;
            }
            match best.mv {
               Some(mv) => self.emit(EngineMessage::Suggestion(Suggestion {
                  mv,
                  ponder: best.ponder,
                  generation,
               })),
               None => info!("engine has no move for {}", generation),
            }
         }
         Err(EngineError::ProtocolParse { line }) => {
            if let Some(generation) = self.pending.take() {
               warn!("unusable answer for {}: {:?}", generation, line);
               self.emit(EngineMessage::RequestFailed {
                  generation,
                  reason: format!("could not parse {:?}", line),
               });
            }
         }
         Err(e) => self.fail(e),
      }
   }

   fn check_deadline(&mut self) {
      let result = match self.client.as_mut() {
         Some(client) => client.check_deadline(),
         None => return,
      };
      if let Err(e) = result {
         self.fail(e);
      }
   }

   /// Ends the session; requests are refused until a restart. A session that a
   /// queued restart already replaces leaves `engine_usable` alone.
   fn fail(&mut self, e: EngineError) {
      error!("{} ({})", e, self.epoch);
      if self.shared.is_current_epoch(self.epoch) {
         self.shared.engine_usable.store(false, Ordering::SeqCst);
      }
      self.pending = None;
      if let Some(mut client) = self.client.take() {
         client.quit();
      }
      let reason = e.to_string();
      let epoch = self.epoch;
      self.emit(match e {
         EngineError::HandshakeTimeout { .. } => EngineMessage::HandshakeTimedOut { epoch, reason },
         EngineError::Launch { .. } | EngineError::NotConfigured => EngineMessage::LaunchFailed { epoch, reason },
         _ => EngineMessage::Crashed { epoch, reason },
      });
   }

   fn emit(&self, message: EngineMessage) {
      if self.sender.send(message).is_err() {
         debug!("interface is gone, dropping engine message");
      }
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::position::Move;

   fn idle_orchestrator() -> Orchestrator {
      Orchestrator::spawn(None, ThinkTime::default(), Timeouts::default())
   }

   fn suggestion(generation: Generation) -> EngineMessage {
      EngineMessage::Suggestion(Suggestion {
         mv: "e2e4".parse::<Move>().unwrap(),
         ponder: None,
         generation,
      })
   }

   #[test]
   fn missing_engine_is_reported() {
      let mut orchestrator = idle_orchestrator();
      let message = orchestrator.next_event(Duration::from_secs(5));
      assert!(matches!(message, Some(EngineMessage::LaunchFailed { .. })));
      assert!(!orchestrator.engine_usable());
      assert_eq!(orchestrator.on_position_changed(&Position::initial()), None);
   }

   #[test]
   fn generations_strictly_increase() {
      let mut orchestrator = idle_orchestrator();
      let first = orchestrator.latest();
      orchestrator.cancel();
      let second = orchestrator.latest();
      orchestrator.on_position_changed(&Position::initial());
      let third = orchestrator.latest();
      assert!(first < second && second < third);
   }

   #[test]
   fn only_latest_generation_is_admitted() {
      let mut orchestrator = idle_orchestrator();
      orchestrator.cancel();
      let old = orchestrator.latest();
      orchestrator.cancel();
      let new = orchestrator.latest();

      // The newer answer can arrive first; the older one is still dropped.
      assert_eq!(orchestrator.admit(suggestion(new)), Some(suggestion(new)));
      assert_eq!(orchestrator.admit(suggestion(old)), None);
      assert_eq!(
         orchestrator.admit(EngineMessage::RequestFailed {
            generation: old,
            reason: String::new()
         }),
         None
      );
   }

   #[test]
   fn config_change_applies_to_next_request() {
      let mut orchestrator = idle_orchestrator();
      assert_eq!(orchestrator.think_time(), ThinkTime::default());
      orchestrator.on_config_changed(ThinkTime::from_millis(300));
      assert_eq!(orchestrator.think_time().millis(), 300);
   }
}
