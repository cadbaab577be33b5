use chesshint_lib::error::MoveParseError;
use chesshint_lib::position::{color_name, File, GameStatus, Move, Position, Rank, Square};
use std::fmt::Write;
use std::path::PathBuf;

pub const HELP: &str = "\
commands:
  <move>            play a move in UCI notation, e.g. e2e4 or e7e8q
  undo              take back the last move
  new               start a new game
  flip              rotate the board
  time <ms>         engine think time per move (50-10000)
  engine <path>     switch to another UCI engine
  engine auto       forget the engine path and detect one
  restart           restart the engine
  load [fen <FEN> moves] <moves...>
                    replace the game with a move list
  open <file.pgn>   load the mainline of a game file
  fen               print the current FEN
  board             print the board
  moves             list the legal moves
  help              show this text
  quit              leave";

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
   Play(Move),
   Undo,
   New,
   Flip,
   Time(u64),
   Engine(String),
   AutoEngine,
   Restart,
   Load { fen: Option<String>, moves: Vec<Move> },
   Open(PathBuf),
   Fen,
   Board,
   Moves,
   Help,
   Quit,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
   Empty,
   Unknown(String),
   BadArgument(&'static str),
   BadMove(MoveParseError),
}

impl std::fmt::Display for ParseError {
   fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
      match self {
         ParseError::Empty => write!(f, "nothing to do"),
         ParseError::Unknown(word) => write!(f, "unknown command {:?}, try 'help'", word),
         ParseError::BadArgument(usage) => write!(f, "usage: {}", usage),
         ParseError::BadMove(e) => write!(f, "{}", e),
      }
   }
}

fn parse_moves(words: &[&str]) -> Result<Vec<Move>, ParseError> {
   words.iter().map(|w| w.parse::<Move>().map_err(ParseError::BadMove)).collect()
}

pub fn parse(line: &str) -> Result<Command, ParseError> {
   let args: Vec<&str> = line.split_whitespace().collect();
   let (&first, rest) = args.split_first().ok_or(ParseError::Empty)?;
   match first {
      "undo" => Ok(Command::Undo),
      "new" => Ok(Command::New),
      "flip" => Ok(Command::Flip),
      "time" => match rest {
         [ms] => ms.parse().map(Command::Time).map_err(|_| ParseError::BadArgument("time <ms>")),
         _ => Err(ParseError::BadArgument("time <ms>")),
      },
      "engine" => match rest {
         [] | ["auto"] => Ok(Command::AutoEngine),
         _ => Ok(Command::Engine(rest.join(" "))),
      },
      "restart" => Ok(Command::Restart),
      "load" => {
         if rest.first() == Some(&"fen") {
            let moves_at = rest.iter().position(|w| *w == "moves").unwrap_or(rest.len());
            if moves_at <= 1 {
               return Err(ParseError::BadArgument("load fen <FEN> moves <moves...>"));
            }
            Ok(Command::Load {
               fen: Some(rest[1..moves_at].join(" ")),
               moves: parse_moves(rest.get(moves_at + 1..).unwrap_or(&[]))?,
            })
         } else {
            Ok(Command::Load {
               fen: None,
               moves: parse_moves(rest)?,
            })
         }
      }
      "open" => {
         if rest.is_empty() {
            Err(ParseError::BadArgument("open <file.pgn>"))
         } else {
            Ok(Command::Open(PathBuf::from(rest.join(" "))))
         }
      }
      "fen" => Ok(Command::Fen),
      "board" => Ok(Command::Board),
      "moves" => Ok(Command::Moves),
      "help" | "?" => Ok(Command::Help),
      "quit" | "exit" => Ok(Command::Quit),
      word if rest.is_empty() && (4..=5).contains(&word.len()) => {
         word.parse().map(Command::Play).map_err(ParseError::BadMove)
      }
      word => Err(ParseError::Unknown(word.to_owned())),
   }
}

/// ASCII diagram, White at the bottom unless `rotated`.
pub fn render(position: &Position, rotated: bool) -> String {
   let mut ranks: Vec<Rank> = Rank::ALL.iter().rev().copied().collect();
   let mut files: Vec<File> = File::ALL.to_vec();
   if rotated {
      ranks.reverse();
      files.reverse();
   }

   let mut out = String::new();
   for rank in &ranks {
      let _ = write!(out, "{} ", rank.char());
      for file in &files {
         let piece = position.piece_at(Square::from_coords(*file, *rank)).unwrap_or('.');
         let _ = write!(out, " {}", piece);
      }
      out.push('\n');
   }
   out.push_str("  ");
   for file in &files {
      let _ = write!(out, " {}", file.char());
   }
   out
}

/// "engine suggests for White: Nf3", falling back to UCI text when the move
/// does not fit the position.
pub fn suggestion_line(position: &Position, mv: Move) -> String {
   let text = position.san(mv).unwrap_or_else(|| mv.to_string());
   format!("engine suggests for {}: {}", color_name(position.side_to_move()), text)
}

/// The lines printed under the board.
pub fn summary(position: &Position, last_move: Option<Move>, suggestion: Option<Move>) -> Vec<String> {
   let mut lines = Vec::new();
   if let Some(mv) = last_move {
      lines.push(format!("last move: {}", mv));
   }
   if let Some(mv) = suggestion {
      lines.push(suggestion_line(position, mv));
   }
   lines.push(match position.status() {
      GameStatus::Ongoing => format!("{} to move", color_name(position.side_to_move())),
      status => status.to_string(),
   });
   lines
}

#[cfg(test)]
mod tests {
   use super::*;

   #[test]
   fn parses_commands() {
      assert_eq!(parse("e2e4"), Ok(Command::Play("e2e4".parse().unwrap())));
      assert_eq!(parse("  undo "), Ok(Command::Undo));
      assert_eq!(parse("time 250"), Ok(Command::Time(250)));
      assert_eq!(parse("time soon"), Err(ParseError::BadArgument("time <ms>")));
      assert_eq!(parse("engine /opt/my engine"), Ok(Command::Engine("/opt/my engine".into())));
      assert_eq!(parse("engine auto"), Ok(Command::AutoEngine));
      assert_eq!(parse("engine"), Ok(Command::AutoEngine));
      assert_eq!(parse("open games/today.pgn"), Ok(Command::Open(PathBuf::from("games/today.pgn"))));
      assert_eq!(parse("open"), Err(ParseError::BadArgument("open <file.pgn>")));
      assert_eq!(parse(""), Err(ParseError::Empty));
      assert_eq!(parse("castle"), Err(ParseError::Unknown("castle".into())));
      assert!(matches!(parse("e2e9"), Err(ParseError::BadMove(_))));
   }

   #[test]
   fn parses_load() {
      assert_eq!(
         parse("load e2e4 e7e5"),
         Ok(Command::Load {
            fen: None,
            moves: vec!["e2e4".parse().unwrap(), "e7e5".parse().unwrap()]
         })
      );
      assert_eq!(
         parse("load fen 8/8/8/8/8/8/k7/K7 w - - 0 1 moves a1b1"),
         Ok(Command::Load {
            fen: Some("8/8/8/8/8/8/k7/K7 w - - 0 1".into()),
            moves: vec!["a1b1".parse().unwrap()]
         })
      );
      assert!(parse("load fen moves").is_err());
   }

   #[test]
   fn renders_both_orientations() {
      let position = Position::initial();
      let board = render(&position, false);
      let lines: Vec<&str> = board.lines().collect();
      assert_eq!(lines[0], "8  r n b q k b n r");
      assert_eq!(lines[7], "1  R N B Q K B N R");
      assert_eq!(lines[8], "   a b c d e f g h");

      let flipped = render(&position, true);
      let lines: Vec<&str> = flipped.lines().collect();
      assert_eq!(lines[0], "1  R N B K Q B N R");
      assert_eq!(lines[8], "   h g f e d c b a");
   }

   #[test]
   fn summary_shows_last_move_and_suggestion() {
      let after_e4 = Position::initial().apply_move("e2e4".parse().unwrap()).unwrap();
      let lines = summary(&after_e4, Some("e2e4".parse().unwrap()), Some("g8f6".parse().unwrap()));
      assert_eq!(
         lines,
         vec!["last move: e2e4", "engine suggests for Black: Nf6", "Black to move"]
      );
      assert_eq!(summary(&Position::initial(), None, None), vec!["White to move"]);
   }

   #[test]
   fn suggestion_line_falls_back_to_uci() {
      let start = Position::initial();
      assert_eq!(suggestion_line(&start, "g1f3".parse().unwrap()), "engine suggests for White: Nf3");
      assert_eq!(suggestion_line(&start, "g1g3".parse().unwrap()), "engine suggests for White: g1g3");
   }
}
