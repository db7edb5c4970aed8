use crate::agents::{Agent, AgentError};
use crate::board::{Point, Stone};
use crate::position::{Board};
use crate::random::{XorShift128PlusRng, random_shuffle};

use rand::{SeedableRng};

/// Plays a uniformly random legal move that does not fill one of its own
/// eyes, or passes.
pub struct RandomAgent {
  rng:    XorShift128PlusRng,
  cands:  Vec<Point>,
}

impl RandomAgent {
  pub fn new(seed: u64) -> RandomAgent {
    RandomAgent{
      rng:    XorShift128PlusRng::seed_from_u64(seed),
      cands:  vec![],
    }
  }
}

impl Agent for RandomAgent {
  fn generate_move(&mut self, board: &Board) -> Result<Point, AgentError> {
    let mut work = board.clone();
    let color = work.to_play();
    self.cands.clear();
    for &point in board.topology().points() {
      if work.stone(point) == Stone::Empty && !work.is_eyelike(point, color) {
        self.cands.push(point);
      }
    }
    random_shuffle(&mut self.cands, &mut self.rng);
    for &point in self.cands.iter() {
      if work.is_legal(point, color) {
        return Ok(point);
      }
    }
    Ok(Point::PASS)
  }
}
