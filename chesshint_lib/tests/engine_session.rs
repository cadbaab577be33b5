use chesshint_lib::error::EngineError;
use chesshint_lib::position::{Position, START_FEN};
use chesshint_lib::process::EngineCommand;
use chesshint_lib::uci::{ClientState, Timeouts, UciClient};
use std::time::{Duration, Instant};

const THINK: Duration = Duration::from_millis(1000);

fn stub() -> EngineCommand {
   EngineCommand::new(env!("CARGO_BIN_EXE_uci_stub"))
}

fn short_timeouts() -> Timeouts {
   Timeouts {
      handshake: Duration::from_millis(500),
      slack: Duration::from_millis(500),
   }
}

#[test]
fn handshake_then_search() {
   let command = stub().arg("--name").arg("Fake Fish");
   let mut client = UciClient::launch(&command, Timeouts::default()).unwrap();
   assert_eq!(client.state(), ClientState::Ready);
   assert_eq!(client.engine_id().name.as_deref(), Some("Fake Fish"));
   assert_eq!(client.engine_id().author.as_deref(), Some("chesshint"));

   let best = client.search(START_FEN, THINK).unwrap();
   let mv = best.mv.unwrap();
   assert!(Position::initial().is_legal(mv));
   assert_eq!(client.state(), ClientState::Ready);

   client.quit();
   assert_eq!(client.state(), ClientState::Stopped);
}

#[test]
fn silent_engine_times_out_handshake() {
   let started = Instant::now();
   let result = UciClient::launch(&stub().arg("--silent"), short_timeouts());
   assert!(matches!(result, Err(EngineError::HandshakeTimeout { expected: "uciok" })));
   assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn missing_binary_fails_to_launch() {
   let mut client = UciClient::new(Timeouts::default());
   let result = client.start(&EngineCommand::new("/definitely/not/an/engine"));
   assert!(matches!(result, Err(EngineError::Launch { .. })));
   assert_eq!(client.state(), ClientState::Crashed);
}

#[test]
fn malformed_answer_keeps_session() {
   let mut client = UciClient::launch(&stub().arg("--malformed-answers").arg("1"), Timeouts::default()).unwrap();
   let result = client.search(START_FEN, THINK);
   assert!(matches!(result, Err(EngineError::ProtocolParse { .. })));
   assert_eq!(client.state(), ClientState::Ready);
   assert!(client.search(START_FEN, THINK).unwrap().mv.is_some());
}

#[test]
fn no_legal_move_answer() {
   let mated = "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3";
   let mut client = UciClient::launch(&stub(), Timeouts::default()).unwrap();
   assert_eq!(client.search(mated, THINK).unwrap().mv, None);
}

#[test]
fn stop_drains_the_running_search() {
   let command = stub().arg("--first-go-delay-ms").arg("3000").arg("--go-delay-ms").arg("50");
   let mut client = UciClient::launch(&command, Timeouts::default()).unwrap();
   client.begin_search(START_FEN, THINK).unwrap();
   assert!(client.is_searching());

   let started = Instant::now();
   client.stop().unwrap();
   assert!(started.elapsed() < Duration::from_millis(1500));
   assert_eq!(client.state(), ClientState::Ready);

   // The drained answer must not be mistaken for the next one.
   let best = client.search(START_FEN, THINK).unwrap();
   assert!(best.mv.is_some());
}

#[test]
fn stop_waits_for_a_stubborn_engine() {
   let command = stub().arg("--ignore-stop").arg("--first-go-delay-ms").arg("400");
   let mut client = UciClient::launch(&command, Timeouts::default()).unwrap();
   client.begin_search(START_FEN, THINK).unwrap();
   let started = Instant::now();
   client.stop().unwrap();
   assert!(started.elapsed() >= Duration::from_millis(200));
   assert_eq!(client.state(), ClientState::Ready);
}

#[test]
fn unanswered_stop_ends_the_session() {
   let command = stub().arg("--ignore-stop").arg("--first-go-delay-ms").arg("5000");
   let mut client = UciClient::launch(&command, short_timeouts()).unwrap();
   client.begin_search(START_FEN, THINK).unwrap();
   assert!(matches!(client.stop(), Err(EngineError::Crashed { .. })));
   assert_eq!(client.state(), ClientState::Crashed);
}

#[test]
fn engine_exit_mid_search_is_a_crash() {
   let mut client = UciClient::launch(&stub().arg("--exit-on-go-after-ms").arg("100"), Timeouts::default()).unwrap();
   let result = client.search(START_FEN, THINK);
   assert!(matches!(result, Err(EngineError::Crashed { .. })));
   assert_eq!(client.state(), ClientState::Crashed);
   assert!(matches!(
      client.begin_search(START_FEN, THINK),
      Err(EngineError::NotReady {
         state: ClientState::Crashed
      })
   ));
}

#[test]
fn search_overrun_is_a_crash() {
   let mut client = UciClient::launch(&stub().arg("--go-delay-ms").arg("5000"), short_timeouts()).unwrap();
   let started = Instant::now();
   let result = client.search(START_FEN, Duration::from_millis(100));
   assert!(matches!(result, Err(EngineError::Crashed { .. })));
   assert!(started.elapsed() < Duration::from_secs(3));
}

#[test]
fn new_search_replaces_the_running_one() {
   let command = stub().arg("--first-go-delay-ms").arg("3000").arg("--go-delay-ms").arg("50");
   let mut client = UciClient::launch(&command, Timeouts::default()).unwrap();
   client.begin_search(START_FEN, THINK).unwrap();
   let after_e4 = Position::initial().apply_move("e2e4".parse().unwrap()).unwrap();
   let best = client.search(&after_e4.to_fen(), THINK).unwrap();
   assert!(after_e4.is_legal(best.mv.unwrap()));
}

#[test]
fn engine_exit_while_idle_is_a_crash() {
   let mut client = UciClient::launch(&stub().arg("--exit-after-ready-ms").arg("100"), Timeouts::default()).unwrap();
   let events = client.events().unwrap().clone();
   let result = loop {
      let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
      match client.handle_event(event) {
         Ok(None) => continue,
         other => break other,
      }
   };
   assert!(matches!(result, Err(EngineError::Crashed { .. })));
   assert_eq!(client.state(), ClientState::Crashed);
}
