//! Multi-threaded Monte Carlo tree search guided by a batched policy/value
//! evaluator.

use crate::array_util::{array_argmax_by, array_normalize};
use crate::board::{Point};
use crate::hyper::{ConfigError, MoveSelect};
use crate::position::{BoardError};
use crate::random::{choose_weighted};
use crate::search::control::{StopReason};
use crate::topology::{Topology};

use rand::{Rng};
use thiserror::{Error};

use std::time::{Duration};

pub mod bridge;
pub mod control;
pub mod evaluator;
pub mod node;
pub mod parallel_tree;
pub mod tree;

pub use self::control::{SearchBudget};
pub use self::parallel_tree::{ParallelSearch, SearchParams};
pub use self::tree::{SearchTree, TreeError};

#[derive(Debug, Error)]
pub enum SearchError {
  #[error(transparent)]
  Config(#[from] ConfigError),
  #[error(transparent)]
  Board(#[from] BoardError),
  #[error("no candidate moves at the root")]
  NoCandidates,
  #[error("search worker disconnected")]
  Disconnected,
}

/// Statistics of one root child; `mean` is from the root player's view.
#[derive(Clone, Copy, PartialEq, Debug)]
pub struct ChildStats {
  pub mv:     Point,
  pub visits: u32,
  pub mean:   Option<f32>,
  pub prior:  f32,
}

#[derive(Clone, Debug)]
pub struct SearchResult {
  pub best_move:    Point,
  /// Expected outcome for the side to move at the root, in [-1, 1].
  pub value:        f32,
  pub root_visits:  u32,
  pub iterations:   u64,
  pub elapsed:      Duration,
  pub stop_reason:  StopReason,
  pub children:     Vec<ChildStats>,
  pub num_prunes:   usize,
}

impl SearchResult {
  /// Root visit counts as a dense distribution over policy indices.
  pub fn visit_distribution(&self, topo: &Topology) -> Vec<f32> {
    let mut dist = vec![0.0; topo.policy_len()];
    for child in self.children.iter() {
      dist[topo.policy_idx(child.mv)] += child.visits as f32;
    }
    array_normalize(&mut dist);
    dist
  }

  pub fn best_child(&self) -> Option<&ChildStats> {
    self.children.iter().find(|c| c.mv == self.best_move)
  }
}

/// Picks the move to play among the root children.
pub fn select_move<R: Rng>(children: &[ChildStats], select: MoveSelect, rng: &mut R) -> Option<usize> {
  let most_visited = || array_argmax_by(children, |c| {
    (c.visits, c.mean.unwrap_or(-1.0), c.prior)
  });
  match select {
    MoveSelect::MostVisited => most_visited(),
    MoveSelect::Sample{temperature} => {
      let inv_t = 1.0 / temperature;
      let max_visits = children.iter().map(|c| c.visits).max().unwrap_or(0).max(1) as f32;
      let weights: Vec<f32> = children.iter().map(|c| (c.visits as f32 / max_visits).powf(inv_t)).collect();
      choose_weighted(&weights, rng).or_else(most_visited)
    }
  }
}
