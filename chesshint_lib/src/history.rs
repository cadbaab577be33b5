use crate::error::{IllegalMoveError, NoMoveToUndoError};
use crate::position::{Move, Position};

/// Moves played from a fixed initial position, each with the position it produced.
#[derive(Clone, Debug, Default)]
pub struct History {
   initial: Position,
   plies: Vec<(Move, Position)>,
}

impl History {
   pub fn new(initial: Position) -> History {
      History {
         initial,
         plies: Vec::new(),
      }
   }

   pub fn current(&self) -> &Position {
      self.plies.last().map(|(_, p)| p).unwrap_or(&self.initial)
   }

   pub fn initial(&self) -> &Position {
      &self.initial
   }

   pub fn last_move(&self) -> Option<Move> {
      self.plies.last().map(|(m, _)| *m)
   }

   pub fn len(&self) -> usize {
      self.plies.len()
   }

   pub fn is_empty(&self) -> bool {
      self.plies.is_empty()
   }

   pub fn moves(&self) -> impl Iterator<Item = Move> + '_ {
      self.plies.iter().map(|(m, _)| *m)
   }

   /// Validates `mv` against the current position and pushes the result.
   pub fn play(&mut self, mv: Move) -> Result<&Position, IllegalMoveError> {
      let next = self.current().apply_move(mv)?;
      self.plies.push((mv, next));
      Ok(self.current())
   }

   /// Plays `moves` in order. Nothing is kept if any of them is illegal.
   pub fn play_all(&mut self, moves: &[Move]) -> Result<&Position, IllegalMoveError> {
      let mut position = self.current().clone();
      let mut played = Vec::with_capacity(moves.len());
      for &mv in moves {
         position = position.apply_move(mv)?;
         played.push((mv, position.clone()));
      }
      self.plies.extend(played);
      Ok(self.current())
   }

   /// Drops the last ply and returns the position before it.
   pub fn undo(&mut self) -> Result<Position, NoMoveToUndoError> {
      self.plies.pop().ok_or(NoMoveToUndoError)?;
      Ok(self.current().clone())
   }

   pub fn reset(&mut self, initial: Position) {
      self.initial = initial;
      self.plies.clear();
   }
}

#[cfg(test)]
mod tests {
   use super::*;
   use crate::position::START_FEN;

   fn history_from_moves(moves: &str) -> History {
      let mut history = History::default();
      for mv in moves.split_whitespace() {
         history.play(mv.parse().unwrap()).unwrap();
      }
      history
   }

   #[test]
   fn empty_history_is_initial_position() {
      let mut history = History::default();
      assert_eq!(history.current().to_fen(), START_FEN);
      assert_eq!(history.undo().unwrap_err(), NoMoveToUndoError);
      assert_eq!(history.current().to_fen(), START_FEN);
   }

   #[test]
   fn play_then_undo_restores_every_position() {
      let fens = [
         START_FEN,
         "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
         "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
         "rnbq1k1r/pp1Pbppp/2p5/8/2B5/8/PPP1NnPP/RNBQK2R w KQ - 1 8",
      ];
      for fen in fens.iter() {
         let mut history = History::new(Position::from_fen(fen).unwrap());
         let before = history.current().to_fen();
         let moves = history.current().legal_moves();
         for mv in moves {
            history.play(mv).unwrap();
            let restored = history.undo().unwrap();
            assert_eq!(restored.to_fen(), before, "undo after {}", mv);
            assert_eq!(history.current().to_fen(), before);
         }
      }
   }

   #[test]
   fn illegal_move_leaves_history_alone() {
      let mut history = history_from_moves("e2e4 e7e5");
      let before = history.current().to_fen();
      assert!(history.play("e4e5".parse().unwrap()).is_err());
      assert_eq!(history.len(), 2);
      assert_eq!(history.current().to_fen(), before);
   }

   #[test]
   fn undo_walks_back_to_start() {
      let mut history = history_from_moves("e2e4 e7e5 g1f3");
      assert_eq!(history.last_move(), Some("g1f3".parse().unwrap()));
      history.undo().unwrap();
      let after_e4 = history.undo().unwrap();
      assert_eq!(after_e4.to_fen(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq - 0 1");
      assert_eq!(history.undo().unwrap().to_fen(), START_FEN);
      assert!(history.is_empty());
   }

   #[test]
   fn play_all_is_atomic() {
      let mut history = History::default();
      let moves: Vec<Move> = ["e2e4", "e7e5", "e4e5"].iter().map(|m| m.parse().unwrap()).collect();
      assert!(history.play_all(&moves).is_err());
      assert!(history.is_empty());
      history.play_all(&moves[..2]).unwrap();
      assert_eq!(history.moves().count(), 2);
   }
}
