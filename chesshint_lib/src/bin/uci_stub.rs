//! A scriptable stand-in for a UCI engine, used by the integration tests.
//!
//! It speaks just enough UCI to be driven by `chesshint_lib::uci::UciClient`, and
//! its misbehaviour (slow answers, ignored `stop`, crashes, garbage) is chosen by
//! flags. With `--log` every received line is appended to a file before it is
//! acted on, so a test can check exactly what was sent.

use chesshint_lib::position::{Move, Position};
use log::{debug, error, warn};
use parking_lot::Mutex;
use rand::seq::SliceRandom;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use structopt::StructOpt;

/// Fake UCI engine
#[derive(StructOpt, Debug)]
#[structopt(name = "uci_stub")]
struct Opt {
   /// Reported in `id name`
   #[structopt(long = "name", default_value = "uci_stub")]
   name: String,
   /// How long each search takes before `bestmove` is printed
   #[structopt(long = "go-delay-ms", default_value = "100")]
   go_delay_ms: u64,
   /// Overrides the delay for the first search only
   #[structopt(long = "first-go-delay-ms")]
   first_go_delay_ms: Option<u64>,
   /// Keep searching after `stop`; the answer still comes at the usual time
   #[structopt(long = "ignore-stop")]
   ignore_stop: bool,
   /// Exit without answering this many milliseconds after a `go`
   #[structopt(long = "exit-on-go-after-ms")]
   exit_on_go_after_ms: Option<u64>,
   /// Exit this many milliseconds after the first `readyok`, searching or not
   #[structopt(long = "exit-after-ready-ms")]
   exit_after_ready_ms: Option<u64>,
   /// Never answer `uci` or `isready`
   #[structopt(long = "silent")]
   silent: bool,
   /// Answer the first n searches with an unparseable `bestmove` line
   #[structopt(long = "malformed-answers", default_value = "0")]
   malformed_answers: u32,
   /// `info` lines printed before each `bestmove`
   #[structopt(long = "info-lines", default_value = "2")]
   info_lines: u32,
   /// Append every received line to this file
   #[structopt(long = "log", parse(from_os_str))]
   log: Option<PathBuf>,
   /// Always answer with this move, legal or not
   #[structopt(long = "move")]
   fixed_move: Option<Move>,
   /// Pick a random legal move instead of the first one
   #[structopt(long = "random")]
   random: bool,
}

struct Search {
   id: u64,
   answer: Vec<String>,
}

struct Stub {
   opt: Opt,
   out: Mutex<io::Stdout>,
   pending: Mutex<Option<Search>>,
}

impl Stub {
   fn send(&self, lines: &[String]) {
      let mut out = self.out.lock();
      for line in lines {
         debug!("<< {}", line);
         if writeln!(out, "{}", line).and_then(|_| out.flush()).is_err() {
            // Nobody is listening anymore
            process::exit(0);
         }
      }
   }

   fn answer_for(&self, position: &Position, search_index: u32) -> Vec<String> {
      let mut lines: Vec<String> = (1..=self.opt.info_lines)
         .map(|depth| format!("info depth {} score cp {} nodes {}", depth, 10 * depth, 1000 * depth))
         .collect();
      if search_index < self.opt.malformed_answers {
         lines.push("bestmove xyz".to_owned());
         return lines;
      }
      let moves = position.legal_moves();
      let chosen = match self.opt.fixed_move {
         Some(mv) => Some(mv),
         None if self.opt.random => moves.choose(&mut rand::thread_rng()).copied(),
         None => moves.first().copied(),
      };
      lines.push(match chosen {
         Some(mv) => format!("bestmove {}", mv),
         None => "bestmove (none)".to_owned(),
      });
      lines
   }

   /// Prints the answer of search `id` if it has not been answered yet.
   fn finish(&self, id: Option<u64>) {
      let answer = {
         let mut pending = self.pending.lock();
         match (pending.as_ref(), id) {
            (Some(search), Some(id)) if search.id != id => return,
            (None, _) => return,
            _ => {}
         }
         pending.take().map(|search| search.answer)
      };
      if let Some(answer) = answer {
         self.send(&answer);
      }
   }
}

fn parse_position(args: &[&str]) -> Option<Position> {
   let moves_at = args.iter().position(|arg| *arg == "moves");
   let setup_end = moves_at.unwrap_or(args.len());
   let mut position = match args.get(1) {
      Some(&"startpos") => Position::initial(),
      Some(&"fen") => Position::from_fen(&args[2..setup_end].join(" ")).ok()?,
      _ => return None,
   };
   if let Some(moves_at) = moves_at {
      for text in &args[moves_at + 1..] {
         let mv: Move = text.parse().ok()?;
         position = position.apply_move(mv).ok()?;
      }
   }
   Some(position)
}

fn open_log(path: &Option<PathBuf>) -> io::Result<Option<File>> {
   match path {
      Some(path) => Ok(Some(OpenOptions::new().create(true).append(true).open(path)?)),
      None => Ok(None),
   }
}

fn main() {
   pretty_env_logger::init();
   let opt = Opt::from_args();

   let mut log_file = match open_log(&opt.log) {
      Ok(f) => f,
      Err(e) => {
         error!("can't open log file: {}", e);
         process::exit(2);
      }
   };

   let stub = Arc::new(Stub {
      opt,
      out: Mutex::new(io::stdout()),
      pending: Mutex::new(None),
   });

   let stdin = io::stdin();
   let mut in_handle = stdin.lock();
   let mut line_buf = String::new();
   let mut position = Position::initial();
   let mut searches: u32 = 0;
   let mut exit_timer = stub.opt.exit_after_ready_ms;

   loop {
      line_buf.clear();
      match in_handle.read_line(&mut line_buf) {
         Ok(0) => break,
         Ok(_) => (),
         Err(e) => {
            error!("Encountered I/O error reading in UCI loop: {}", e);
            break;
         }
      }
      let line = line_buf.trim();
      if let Some(f) = log_file.as_mut() {
         let _ = writeln!(f, "{}", line).and_then(|_| f.flush());
      }
      debug!(">> {}", line);

      let args: Vec<&str> = line.split_whitespace().collect();
      if args.is_empty() {
         continue;
      }

      match args[0] {
         "uci" => {
            if !stub.opt.silent {
               stub.send(&[
                  format!("id name {}", stub.opt.name),
                  "id author chesshint".to_owned(),
                  "uciok".to_owned(),
               ]);
            }
         }
         "isready" => {
            if !stub.opt.silent {
               stub.send(&["readyok".to_owned()]);
            }
            if let Some(ms) = exit_timer.take() {
               thread::spawn(move || {
                  thread::sleep(Duration::from_millis(ms));
                  process::exit(4);
               });
            }
         }
         "ucinewgame" => {
            position = Position::initial();
         }
         "position" => match parse_position(&args) {
            Some(p) => position = p,
            None => warn!("can't understand '{}'", line),
         },
         "go" => {
            if let Some(ms) = stub.opt.exit_on_go_after_ms {
               thread::spawn(move || {
                  thread::sleep(Duration::from_millis(ms));
                  process::exit(3);
               });
               continue;
            }
            let delay = match (searches, stub.opt.first_go_delay_ms) {
               (0, Some(first)) => first,
               _ => stub.opt.go_delay_ms,
            };
            let id = u64::from(searches);
            let answer = stub.answer_for(&position, searches);
            searches += 1;
            *stub.pending.lock() = Some(Search { id, answer });

            let stub = Arc::clone(&stub);
            thread::spawn(move || {
               thread::sleep(Duration::from_millis(delay));
               stub.finish(Some(id));
            });
         }
         "stop" => {
            if !stub.opt.ignore_stop {
               stub.finish(None);
            }
         }
         "quit" => break,
         _ => warn!("Unexpected input {}", line),
      }
   }
}
