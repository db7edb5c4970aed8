use crate::board::{Point};
use crate::position::{Board, BoardError};
use crate::search::{SearchBudget, SearchError};

use thiserror::{Error};

pub mod random;
pub mod search;

#[derive(Debug, Error)]
pub enum AgentError {
  #[error(transparent)]
  Search(#[from] SearchError),
  #[error(transparent)]
  Board(#[from] BoardError),
}

/// A player. The board passed in is the current game position with the
/// agent to move.
pub trait Agent {
  fn generate_move(&mut self, board: &Board) -> Result<Point, AgentError>;

  /// Thinks about `board` on the opponent's time.
  fn ponder(&mut self, _board: &Board, _budget: SearchBudget) -> Result<(), AgentError> {
    Ok(())
  }

  fn on_game_end(&mut self) {
  }
}
