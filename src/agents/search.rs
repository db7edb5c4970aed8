use crate::agents::{Agent, AgentError};
use crate::board::{Point, Stone};
use crate::hyper::{SearchConfig};
use crate::position::{Board};
use crate::search::{ParallelSearch, SearchBudget, SearchParams, SearchResult};
use crate::search::evaluator::{Evaluator};

use log::{debug};

use std::sync::{Arc};

/// Agent backed by a `ParallelSearch`. Keeps the tree between moves when the
/// new position follows from the previously searched one.
pub struct SearchAgent {
  search:       ParallelSearch,
  budget:       SearchBudget,
  reuse:        bool,
  last_moves:   Option<Vec<(Point, Stone)>>,
  last_result:  Option<SearchResult>,
}

impl SearchAgent {
  pub fn new(cfg: SearchConfig, size: usize, evaluator: Arc<dyn Evaluator>) -> Result<SearchAgent, AgentError> {
    let budget = cfg.budget();
    let reuse = cfg.reuse_subtree;
    Ok(SearchAgent{
      search:       ParallelSearch::new(cfg, size, evaluator)?,
      budget:       budget,
      reuse:        reuse,
      last_moves:   None,
      last_result:  None,
    })
  }

  pub fn set_budget(&mut self, budget: SearchBudget) {
    self.budget = budget;
  }

  pub fn search(&self) -> &ParallelSearch {
    &self.search
  }

  pub fn last_result(&self) -> Option<&SearchResult> {
    self.last_result.as_ref()
  }

  fn prepare_tree(&mut self, board: &Board) {
    let moves: Vec<(Point, Stone)> = board.moves().collect();
    let reused = match self.last_moves.take() {
      Some(ref prev) if self.reuse && moves.len() >= prev.len() && moves[.. prev.len()] == prev[..] => {
        let suffix: Vec<Point> = moves[prev.len() ..].iter().map(|&(p, _)| p).collect();
        self.search.reuse_subtree(&suffix)
      }
      _ => false,
    };
    if !reused {
      self.search.clear_tree();
    }
    debug!("search agent: tree {}", if reused { "reused" } else { "cleared" });
    self.last_moves = Some(moves);
  }
}

impl Agent for SearchAgent {
  fn generate_move(&mut self, board: &Board) -> Result<Point, AgentError> {
    self.prepare_tree(board);
    let result = self.search.search(board, SearchParams::new(self.budget))?;
    let mv = result.best_move;
    self.last_result = Some(result);
    Ok(mv)
  }

  fn ponder(&mut self, board: &Board, budget: SearchBudget) -> Result<(), AgentError> {
    self.prepare_tree(board);
    self.search.search(board, SearchParams::new(budget))?;
    Ok(())
  }

  fn on_game_end(&mut self) {
    self.search.clear_tree();
    self.last_moves = None;
    self.last_result = None;
  }
}
