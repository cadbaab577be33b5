mod console;

use chesshint_lib::config::{self, SessionConfig, ThinkTime};
use chesshint_lib::messages::EngineMessage;
use chesshint_lib::pgn;
use chesshint_lib::position::Position;
use chesshint_lib::trainer::Trainer;
use chesshint_lib::uci::Timeouts;
use console::Command;
use crossbeam_channel::{select, unbounded, Receiver};
use log::{error, info, warn};
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process;
use std::thread;
use structopt::StructOpt;

/// Play both sides while a UCI engine suggests the best move
#[derive(StructOpt, Debug)]
#[structopt(name = "chesshint")]
struct Opt {
   /// UCI engine to run, overrides the settings file
   #[structopt(short = "e", long = "engine", parse(from_os_str))]
   engine: Option<PathBuf>,
   /// Engine think time per move in milliseconds
   #[structopt(short = "t", long = "movetime")]
   movetime: Option<u64>,
   /// Start from this position instead of the initial one
   #[structopt(long = "fen")]
   fen: Option<String>,
   /// Settings file to read and update
   #[structopt(long = "settings", parse(from_os_str))]
   settings: Option<PathBuf>,
}

fn stdin_lines() -> Receiver<String> {
   let (tx, rx) = unbounded();
   let spawned = thread::Builder::new().name("stdin".into()).spawn(move || {
      let stdin = io::stdin();
      for line in stdin.lock().lines() {
         match line {
            Ok(l) => {
               if tx.send(l).is_err() {
                  return;
               }
            }
            Err(e) => {
               error!("Encountered I/O error reading stdin: {}", e);
               return;
            }
         }
      }
   });
   if let Err(e) = spawned {
      error!("could not read stdin: {}", e);
   }
   rx
}

struct Session {
   trainer: Trainer,
   start: Position,
   settings: PathBuf,
}

impl Session {
   fn save_settings(&self) {
      match self.trainer.config().save(&self.settings) {
         Ok(()) => info!("saved settings to {}", self.settings.display()),
         Err(e) => warn!("could not save settings: {}", e),
      }
   }

   fn print_position(&self) {
      let position = self.trainer.position();
      println!("{}", console::render(position, self.trainer.is_rotated()));
      let last_move = self.trainer.history().last_move();
      let suggestion = self.trainer.last_suggestion().map(|s| s.mv);
      for line in console::summary(position, last_move, suggestion) {
         println!("{}", line);
      }
   }

   /// Returns false when the session should end.
   fn handle_line(&mut self, line: &str) -> bool {
      let command = match console::parse(line) {
         Ok(command) => command,
         Err(console::ParseError::Empty) => return true,
         Err(e) => {
            println!("{}", e);
            return true;
         }
      };

      match command {
         Command::Play(mv) => match self.trainer.play(mv) {
            Ok(_) => self.print_position(),
            Err(e) => println!("{}", e),
         },
         Command::Undo => match self.trainer.undo() {
            Ok(_) => self.print_position(),
            Err(e) => println!("{}", e),
         },
         Command::New => {
            self.trainer.new_game(self.start.clone());
            self.print_position();
         }
         Command::Flip => {
            self.trainer.rotate();
            self.print_position();
         }
         Command::Time(ms) => {
            let think_time = self.trainer.set_think_time(ms);
            if think_time.millis() != ms {
               println!(
                  "think time must be within {}..={} ms, using {}",
                  ThinkTime::MIN,
                  ThinkTime::MAX,
                  think_time.millis()
               );
            }
            self.save_settings();
         }
         Command::Engine(path) => match self.trainer.set_engine_path(&path) {
            Ok(()) => self.save_settings(),
            Err(e) => println!("{}", e),
         },
         Command::AutoEngine => {
            if let Err(e) = self.trainer.use_detected_engine() {
               println!("{}", e);
            }
            self.save_settings();
         }
         Command::Restart => {
            if let Err(e) = self.trainer.restart_engine() {
               println!("{}", e);
            }
         }
         Command::Load { fen, moves } => {
            let start = match fen {
               Some(fen) => match Position::from_fen(&fen) {
                  Ok(position) => position,
                  Err(e) => {
                     println!("{}", e);
                     return true;
                  }
               },
               None => Position::initial(),
            };
            match self.trainer.load(start, &moves) {
               Ok(_) => self.print_position(),
               Err(e) => println!("{}", e),
            }
         }
         Command::Open(path) => match pgn::open(&path) {
            Ok(game) => match self.trainer.load(game.start, &game.moves) {
               Ok(_) => {
                  println!("loaded {}, final position shown", path.display());
                  self.print_position();
               }
               Err(e) => println!("{}", e),
            },
            Err(e) => println!("{}: {}", path.display(), e),
         },
         Command::Fen => println!("{}", self.trainer.position().to_fen()),
         Command::Board => self.print_position(),
         Command::Moves => {
            let position = self.trainer.position();
            let moves: Vec<String> = position.legal_moves().iter().map(|mv| self.trainer.describe(*mv)).collect();
            println!("{}", moves.join(" "));
         }
         Command::Help => println!("{}", console::HELP),
         Command::Quit => return false,
      }
      true
   }

   fn handle_engine(&mut self, message: EngineMessage) {
      let message = match self.trainer.admit(message) {
         Some(message) => message,
         None => return,
      };
      match message {
         EngineMessage::Ready { name, .. } => println!("engine ready: {}", name.as_deref().unwrap_or("unnamed")),
         EngineMessage::Suggestion(suggestion) => {
            println!("{}", console::suggestion_line(self.trainer.position(), suggestion.mv))
         }
         EngineMessage::RequestFailed { reason, .. } => println!("no suggestion this time: {}", reason),
         EngineMessage::Crashed { reason, .. }
         | EngineMessage::LaunchFailed { reason, .. }
         | EngineMessage::HandshakeTimedOut { reason, .. } => {
            println!("{}", reason);
            println!("suggestions are off; use 'engine <path>' or 'restart'");
         }
      }
   }
}

fn main() {
   pretty_env_logger::init();
   let opt = Opt::from_args();

   let settings = opt.settings.unwrap_or_else(config::settings_path);
   let mut session_config = SessionConfig::load(&settings);
   if let Some(engine) = opt.engine {
      session_config.engine_path = Some(engine);
   }
   if let Some(ms) = opt.movetime {
      session_config.think_time = ThinkTime::from_millis(ms);
   }

   let start = match opt.fen.as_deref().map(Position::from_fen) {
      Some(Ok(position)) => position,
      Some(Err(e)) => {
         eprintln!("{}", e);
         process::exit(1);
      }
      None => Position::initial(),
   };

   let trainer = Trainer::new(session_config, start.clone(), Timeouts::default());
   let mut session = Session { trainer, start, settings };
   session.print_position();

   let input = stdin_lines();
   loop {
      let events = session.trainer.events().clone();
      select! {
         recv(input) -> line => match line {
            Ok(line) => {
               if !session.handle_line(&line) {
                  break;
               }
            }
            Err(_) => break,
         },
         recv(events) -> message => match message {
            Ok(message) => session.handle_engine(message),
            Err(_) => {
               error!("engine worker stopped");
               break;
            }
         },
      }
   }

   session.trainer.shutdown();
}
