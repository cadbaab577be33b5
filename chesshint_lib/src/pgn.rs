//! Reading the mainline of a game score so it can be loaded as the current game.

use crate::error::PgnError;
use crate::position::{Move, Position};
use pgn_reader::{BufferedReader, RawHeader, SanPlus, Skip, Visitor};
use std::fs::File;
use std::io::Read;
use std::mem;
use std::path::Path;

/// Start position (initial, or the `FEN` tag) plus the mainline moves.
#[derive(Clone, Debug, Default)]
pub struct Game {
   pub start: Position,
   pub moves: Vec<Move>,
}

#[derive(Default)]
struct Mainline {
   game: Game,
   current: Position,
   error: Option<PgnError>,
}

impl Visitor for Mainline {
   type Result = Result<Game, PgnError>;

   fn begin_game(&mut self) {
      *self = Mainline::default();
   }

   fn header(&mut self, key: &[u8], value: RawHeader<'_>) {
      if key != b"FEN" {
         return;
      }
      match Position::from_fen(&String::from_utf8_lossy(value.as_bytes())) {
         Ok(position) => {
            self.game.start = position.clone();
            self.current = position;
         }
         Err(e) => self.error = Some(e.into()),
      }
   }

   fn end_headers(&mut self) -> Skip {
      Skip(self.error.is_some())
   }

   fn san(&mut self, san_plus: SanPlus) {
      if self.error.is_some() {
         return;
      }
      match self.current.play_san(&san_plus.san) {
         Some((mv, next)) => {
            self.game.moves.push(mv);
            self.current = next;
         }
         None => {
            self.error = Some(PgnError::IllegalSan {
               ply: self.game.moves.len() + 1,
               san: san_plus.to_string(),
            })
         }
      }
   }

   fn begin_variation(&mut self) -> Skip {
      Skip(true) // mainline only
   }

   fn end_game(&mut self) -> Self::Result {
      match self.error.take() {
         Some(e) => Err(e),
         None => Ok(mem::take(&mut self.game)),
      }
   }
}

/// The first game in `reader`.
pub fn read_game<R: Read>(reader: R) -> Result<Game, PgnError> {
   let mut reader = BufferedReader::new(reader);
   let mut mainline = Mainline::default();
   reader.read_game(&mut mainline)?.unwrap_or(Err(PgnError::NoGame))
}

pub fn open(path: &Path) -> Result<Game, PgnError> {
   read_game(File::open(path)?)
}
