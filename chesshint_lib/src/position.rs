//! Immutable board snapshots on top of the `shakmaty` rules.
//!
//! A [`Position`] is never changed after it is built: [`Position::apply_move`]
//! validates the move against the legal-move set and returns a new snapshot.

use crate::error::{FenError, IllegalMoveError, MoveParseError};
use shakmaty::fen::Fen;
use shakmaty::san::San;
use shakmaty::uci::UciMove;
use shakmaty::{CastlingMode, Chess, EnPassantMode, Position as _, Role};
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

pub use shakmaty::{Color, File, Rank, Square};

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PromotionTarget {
   Knight,
   Bishop,
   Rook,
   Queen,
}

impl PromotionTarget {
   fn role(self) -> Role {
      match self {
         PromotionTarget::Knight => Role::Knight,
         PromotionTarget::Bishop => Role::Bishop,
         PromotionTarget::Rook => Role::Rook,
         PromotionTarget::Queen => Role::Queen,
      }
   }

   fn from_role(role: Role) -> Option<PromotionTarget> {
      match role {
         Role::Knight => Some(PromotionTarget::Knight),
         Role::Bishop => Some(PromotionTarget::Bishop),
         Role::Rook => Some(PromotionTarget::Rook),
         Role::Queen => Some(PromotionTarget::Queen),
         Role::Pawn | Role::King => None,
      }
   }
}

impl fmt::Display for PromotionTarget {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      let display = match self {
         PromotionTarget::Knight => "n",
         PromotionTarget::Bishop => "b",
         PromotionTarget::Rook => "r",
         PromotionTarget::Queen => "q",
      };
      write!(f, "{}", display)
   }
}

impl FromStr for PromotionTarget {
   type Err = MoveParseError;

   fn from_str(s: &str) -> Result<PromotionTarget, MoveParseError> {
      match s {
         "n" => Ok(PromotionTarget::Knight),
         "b" => Ok(PromotionTarget::Bishop),
         "r" => Ok(PromotionTarget::Rook),
         "q" => Ok(PromotionTarget::Queen),
         _ => Err(MoveParseError::Promotion(s.to_owned())),
      }
   }
}

/// A move in UCI long algebraic form. Castling is the king's two-square step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Move {
   pub origin: Square,
   pub destination: Square,
   pub promotion: Option<PromotionTarget>,
}

impl Move {
   pub fn new(origin: Square, destination: Square) -> Move {
      Move {
         origin,
         destination,
         promotion: None,
      }
   }

   fn to_uci(self) -> UciMove {
      UciMove::Normal {
         from: self.origin,
         to: self.destination,
         promotion: self.promotion.map(PromotionTarget::role),
      }
   }

   fn from_shakmaty(m: &shakmaty::Move) -> Option<Move> {
      match m.to_uci(CastlingMode::Standard) {
         UciMove::Normal { from, to, promotion } => Some(Move {
            origin: from,
            destination: to,
            promotion: promotion.and_then(PromotionTarget::from_role),
         }),
         UciMove::Put { .. } | UciMove::Null => None,
      }
   }
}

impl fmt::Display for Move {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      write!(f, "{}{}", self.origin, self.destination)?;
      if let Some(promotion) = self.promotion {
         write!(f, "{}", promotion)?;
      }
      Ok(())
   }
}

impl FromStr for Move {
   type Err = MoveParseError;

   fn from_str(s: &str) -> Result<Move, MoveParseError> {
      if !s.is_ascii() || s.len() < 4 || s.len() > 5 {
         return Err(MoveParseError::Length(s.to_owned()));
      }
      let parse_square = |text: &str| text.parse::<Square>().map_err(|_| MoveParseError::Square(text.to_owned()));
      let promotion = match s.get(4..5) {
         Some(target) => Some(target.parse::<PromotionTarget>()?),
         None => None,
      };
      Ok(Move {
         origin: parse_square(&s[..2])?,
         destination: parse_square(&s[2..4])?,
         promotion,
      })
   }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GameStatus {
   Ongoing,
   Checkmate { winner: Color },
   Stalemate,
   InsufficientMaterial,
}

impl fmt::Display for GameStatus {
   fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
      match self {
         GameStatus::Ongoing => write!(f, "ongoing"),
         GameStatus::Checkmate { winner } => write!(f, "checkmate, {} wins", color_name(*winner)),
         GameStatus::Stalemate => write!(f, "stalemate"),
         GameStatus::InsufficientMaterial => write!(f, "draw by insufficient material"),
      }
   }
}

pub fn color_name(color: Color) -> &'static str {
   match color {
      Color::White => "White",
      Color::Black => "Black",
   }
}

#[derive(Clone, Debug)]
pub struct Position {
   chess: Chess,
}

impl Default for Position {
   fn default() -> Position {
      Position::initial()
   }
}

impl Position {
   pub fn initial() -> Position {
      Position { chess: Chess::default() }
   }

   pub fn from_fen(fen: &str) -> Result<Position, FenError> {
      let parsed: Fen = fen.trim().parse().map_err(|e| FenError {
         fen: fen.to_owned(),
         reason: format!("{}", e),
      })?;
      let chess = parsed.into_position::<Chess>(CastlingMode::Standard).map_err(|e| FenError {
         fen: fen.to_owned(),
         reason: format!("{}", e),
      })?;
      Ok(Position { chess })
   }

   pub fn to_fen(&self) -> String {
      Fen(self.chess.clone().into_setup(EnPassantMode::Legal)).to_string()
   }

   pub fn side_to_move(&self) -> Color {
      self.chess.turn()
   }

   pub fn legal_moves(&self) -> SmallVec<[Move; 64]> {
      self.chess.legal_moves().iter().filter_map(Move::from_shakmaty).collect()
   }

   pub fn is_legal(&self, mv: Move) -> bool {
      mv.to_uci().to_move(&self.chess).is_ok()
   }

   #[must_use = "positions are immutable, the new position is returned"]
   pub fn apply_move(&self, mv: Move) -> Result<Position, IllegalMoveError> {
      let legal = mv.to_uci().to_move(&self.chess).map_err(|_| IllegalMoveError {
         mv,
         fen: self.to_fen(),
      })?;
      let mut chess = self.chess.clone();
      chess.play_unchecked(&legal);
      Ok(Position { chess })
   }

   pub fn is_terminal(&self) -> bool {
      self.chess.is_game_over()
   }

   pub fn status(&self) -> GameStatus {
      if self.chess.is_checkmate() {
         GameStatus::Checkmate {
            winner: !self.chess.turn(),
         }
      } else if self.chess.is_stalemate() {
         GameStatus::Stalemate
      } else if self.chess.is_insufficient_material() {
         GameStatus::InsufficientMaterial
      } else {
         GameStatus::Ongoing
      }
   }

   /// Standard algebraic notation for a legal move, `None` otherwise.
   pub fn san(&self, mv: Move) -> Option<String> {
      let legal = mv.to_uci().to_move(&self.chess).ok()?;
      Some(San::from_move(&self.chess, &legal).to_string())
   }

   /// Resolves and plays a SAN move, as read from a game score.
   pub(crate) fn play_san(&self, san: &San) -> Option<(Move, Position)> {
      let legal = san.to_move(&self.chess).ok()?;
      let mv = Move::from_shakmaty(&legal)?;
      let mut chess = self.chess.clone();
      chess.play_unchecked(&legal);
      Some((mv, Position { chess }))
   }

   /// FEN piece letter on the given square, if any.
   pub fn piece_at(&self, square: Square) -> Option<char> {
      self.chess.board().piece_at(square).map(|piece| piece.char())
   }
}
