use crate::array_util::{array_normalize};
use crate::board::{Point, Stone};
use crate::hyper::{ConfigError, LockMode, MoveSelect, RootNoise, SearchConfig};
use crate::position::{Board};
use crate::position::features::{FeatureSpec};
use crate::random::{XorShift128PlusRng};
use crate::search::{ChildStats, SearchError, SearchResult, select_move};
use crate::search::bridge::{EvalBridge};
use crate::search::control::{SearchBudget, SearchControl, StopReason};
use crate::search::evaluator::{EvalOutput, Evaluator};
use crate::search::node::{NodeId};
use crate::search::tree::{ROOT, SearchTree, TreeError};
use crate::worker::{CancelToken};

use log::{debug, info, warn};
use rand::{Rng, SeedableRng};
use rand_distr::{Dirichlet, Distribution};
use threadpool::{ThreadPool};

use std::sync::{Arc, Barrier, Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::mpsc::{Sender, channel};

fn read_tree(tree: &RwLock<SearchTree>) -> RwLockReadGuard<SearchTree> {
  tree.read().unwrap_or_else(|e| e.into_inner())
}

fn write_tree(tree: &RwLock<SearchTree>) -> RwLockWriteGuard<SearchTree> {
  tree.write().unwrap_or_else(|e| e.into_inner())
}

fn lock_tree_ops(lock: &Option<Arc<Mutex<()>>>) -> Option<MutexGuard<()>> {
  lock.as_ref().map(|m| m.lock().unwrap_or_else(|e| e.into_inner()))
}

/// Mixes Dirichlet noise into normalized priors.
fn mix_root_noise<R: Rng>(priors: &mut [f32], noise: RootNoise, rng: &mut R) {
  array_normalize(priors);
  if priors.len() < 2 || noise.fraction <= 0.0 {
    return;
  }
  let dirichlet = match Dirichlet::new_with_size(noise.alpha, priors.len()) {
    Ok(d) => d,
    Err(e) => {
      warn!("root noise disabled: {}", e);
      return;
    }
  };
  let eta: Vec<f32> = dirichlet.sample(rng);
  for (p, &n) in priors.iter_mut().zip(eta.iter()) {
    *p = (1.0 - noise.fraction) * *p + noise.fraction * n;
  }
}

/// Outcome of a finished game from the side to move, by area score.
fn terminal_value(board: &mut Board, komi: f32) -> f32 {
  let score = board.score_area(komi);
  let black_value = if score > 0.0 {
    1.0
  } else if score < 0.0 {
    -1.0
  } else {
    0.0
  };
  match board.to_play() {
    Stone::White => -black_value,
    _ => black_value,
  }
}

/// Where a descent ended.
enum Leaf {
  /// No iteration ticket was available.
  Skip,
  /// The descent hit a move the worker board refused.
  Aborted,
  Terminal(f32),
  Expand,
}

pub struct TreeOps;

impl TreeOps {
  /// PUCT choice among the children of `parent`, skipping moves in
  /// `filter`. Visible statistics include other threads' virtual losses.
  pub fn select_child(tree: &SearchTree, parent: NodeId, c_puct: f32, fpu_value: f32, filter: &[Point]) -> Option<NodeId> {
    let (parent_visits, _) = tree.node(parent).visible_stats();
    let sqrt_n = (parent_visits.max(1) as f32).sqrt();
    let mut best: Option<(NodeId, f32)> = None;
    for c in tree.children(parent) {
      let node = tree.node(c);
      if !filter.is_empty() && filter.contains(&node.mv()) {
        continue;
      }
      let (n, mean) = node.visible_stats();
      let q = mean.unwrap_or(fpu_value);
      let u = c_puct * node.prior() * sqrt_n / (1 + n) as f32;
      let score = q + u;
      if best.map_or(true, |(_, s)| score > s) {
        best = Some((c, score));
      }
    }
    best.map(|(c, _)| c)
  }

  pub fn root_children(tree: &SearchTree, filter: &[Point]) -> Vec<ChildStats> {
    tree.children(ROOT)
      .map(|c| tree.node(c))
      .filter(|node| !filter.contains(&node.mv()))
      .map(|node| ChildStats{
        mv:     node.mv(),
        visits: node.visits(),
        mean:   node.mean(),
        prior:  node.prior(),
      })
      .collect()
  }
}

pub enum SearchWorkerCommand {
  Search{
    board:        Board,
    root_filter:  Arc<Vec<Point>>,
    control:      Arc<SearchControl>,
  },
  Quit,
}

struct SearchWorker {
  tid:      usize,
  cfg:      SearchConfig,
  tree:     Arc<RwLock<SearchTree>>,
  bridge:   Arc<EvalBridge>,
  lock:     Option<Arc<Mutex<()>>>,
  rng:      XorShift128PlusRng,
  path:     Vec<NodeId>,
  moves:    Vec<Point>,
  cands:    Vec<Point>,
  priors:   Vec<f32>,
  children: Vec<(Point, f32)>,
}

impl SearchWorker {
  fn run_phase(&mut self, board: &mut Board, root_filter: &[Point], control: &SearchControl) {
    let tree_lock = self.tree.clone();
    let tree = read_tree(&tree_lock);
    loop {
      let leaf = if control.try_begin_iteration() {
        self.descend(&tree, board, root_filter)
      } else {
        Leaf::Skip
      };
      match leaf {
        Leaf::Expand => self.bridge.submit(self.tid, Some(board)),
        _ => self.bridge.submit(self.tid, None),
      }
      let exchange = self.bridge.exchange(self.tid, |status| control.check_round(&tree, status));
      match leaf {
        Leaf::Skip => {}
        Leaf::Aborted => {
          self.release(&tree);
        }
        Leaf::Terminal(value) => {
          self.backup(&tree, value);
          control.finish_iteration();
        }
        Leaf::Expand => match exchange.output {
          Some(Ok(output)) => {
            self.expand(&tree, board, root_filter, &output, control);
            self.backup(&tree, output.value);
            control.finish_iteration();
          }
          Some(Err(e)) => {
            debug!("worker {}: skipping iteration: {}", self.tid, e);
            self.release(&tree);
          }
          None => {
            warn!("worker {}: no evaluation for submitted leaf", self.tid);
            self.release(&tree);
          }
        }
      }
      self.rewind(board);
      if exchange.stop {
        break;
      }
    }
  }

  /// Walks from the root to a leaf, playing each move on `board` and
  /// marking the path with virtual loss.
  fn descend(&mut self, tree: &SearchTree, board: &mut Board, root_filter: &[Point]) -> Leaf {
    let _guard = lock_tree_ops(&self.lock);
    self.path.clear();
    self.moves.clear();
    let mut cursor = ROOT;
    self.path.push(cursor);
    if self.cfg.virtual_loss {
      tree.node(cursor).add_virtual_loss();
    }
    loop {
      if board.is_game_over() || board.is_history_full() {
        return Leaf::Terminal(terminal_value(board, self.cfg.komi));
      }
      let filter = if cursor == ROOT { root_filter } else { &[] };
      let next = match TreeOps::select_child(tree, cursor, self.cfg.c_puct, self.cfg.fpu_value, filter) {
        None => return Leaf::Expand,
        Some(next) => next,
      };
      let mv = tree.node(next).mv();
      let color = board.to_play();
      if let Err(e) = board.play(mv, color) {
        warn!("worker {}: tree move {:?} rejected: {}", self.tid, mv, e);
        return Leaf::Aborted;
      }
      self.moves.push(mv);
      if let Some(reason) = board.last_move_illegal() {
        warn!("worker {}: tree move {:?} is illegal ({:?})", self.tid, mv, reason);
        return Leaf::Aborted;
      }
      cursor = next;
      self.path.push(cursor);
      if self.cfg.virtual_loss {
        tree.node(cursor).add_virtual_loss();
      }
    }
  }

  fn expand(&mut self, tree: &SearchTree, board: &mut Board, root_filter: &[Point], output: &EvalOutput, control: &SearchControl) {
    let leaf = match self.path.last() {
      Some(&leaf) => leaf,
      None => return,
    };
    if tree.node(leaf).is_expanded() {
      return;
    }
    let at_root = leaf == ROOT;
    let topo = board.topology().clone();
    self.cands.clear();
    self.priors.clear();
    for mv in board.legal_moves() {
      if at_root && root_filter.contains(&mv) {
        continue;
      }
      self.cands.push(mv);
      self.priors.push(output.policy.get(topo.policy_idx(mv)).cloned().unwrap_or(0.0));
    }
    if self.cands.is_empty() {
      return;
    }
    if at_root {
      if let Some(noise) = self.cfg.root_noise {
        mix_root_noise(&mut self.priors, noise, &mut self.rng);
      }
    }
    self.children.clear();
    self.children.extend(self.cands.iter().cloned().zip(self.priors.iter().cloned()));
    let _guard = lock_tree_ops(&self.lock);
    match tree.expand(self.tid, leaf, &self.children) {
      Ok(_) => {}
      Err(TreeError::CapacityExceeded{segment, requested, available}) => {
        debug!("worker {}: segment {} full ({} requested, {} left)", self.tid, segment, requested, available);
        control.set_arena_full();
      }
      Err(e) => {
        warn!("worker {}: expansion failed: {}", self.tid, e);
      }
    }
  }

  fn backup(&mut self, tree: &SearchTree, value: f32) {
    let _guard = lock_tree_ops(&self.lock);
    if self.cfg.virtual_loss {
      tree.remove_virtual_loss(&self.path);
    }
    tree.backup(&self.path, value);
  }

  fn release(&mut self, tree: &SearchTree) {
    let _guard = lock_tree_ops(&self.lock);
    if self.cfg.virtual_loss {
      tree.remove_virtual_loss(&self.path);
    }
  }

  fn rewind(&mut self, board: &mut Board) {
    for _ in 0 .. self.moves.len() {
      if let Err(e) = board.undo() {
        warn!("worker {}: rewind failed: {}", self.tid, e);
        break;
      }
    }
    self.moves.clear();
    self.path.clear();
  }
}

pub struct SearchParams {
  pub budget:       SearchBudget,
  /// Moves never considered at the root.
  pub root_filter:  Vec<Point>,
  /// A tree to search from instead of the current one; its root must be
  /// the searched position.
  pub init_tree:    Option<SearchTree>,
}

impl SearchParams {
  pub fn new(budget: SearchBudget) -> SearchParams {
    SearchParams{
      budget:       budget,
      root_filter:  vec![],
      init_tree:    None,
    }
  }

  pub fn with_root_filter(mut self, root_filter: Vec<Point>) -> SearchParams {
    self.root_filter = root_filter;
    self
  }

  pub fn with_init_tree(mut self, init_tree: SearchTree) -> SearchParams {
    self.init_tree = Some(init_tree);
    self
  }
}

/// Search server. Owns a pool of long-lived workers that search the shared
/// tree in phases; between phases the server alone touches the tree.
pub struct ParallelSearch {
  cfg:          SearchConfig,
  size:         usize,
  num_workers:  usize,
  pool:         ThreadPool,
  in_txs:       Vec<Sender<SearchWorkerCommand>>,
  out_barrier:  Arc<Barrier>,
  tree:         Arc<RwLock<SearchTree>>,
  spare:        SearchTree,
  bridge:       Arc<EvalBridge>,
  cancel:       CancelToken,
  rng:          XorShift128PlusRng,
  /// Whether the current root's priors already carry noise.
  root_noised:  bool,
}

impl Drop for ParallelSearch {
  fn drop(&mut self) {
    for tid in 0 .. self.num_workers {
      let _ = self.in_txs[tid].send(SearchWorkerCommand::Quit);
    }
    self.pool.join();
  }
}

impl ParallelSearch {
  pub fn new(cfg: SearchConfig, size: usize, evaluator: Arc<dyn Evaluator>) -> Result<ParallelSearch, SearchError> {
    cfg.validate_for_size(size)?;
    let num_workers = cfg.num_threads;
    if evaluator.max_batch_size() < num_workers {
      return Err(ConfigError::Invalid(format!(
          "evaluator batches at most {} inputs, {} threads configured",
          evaluator.max_batch_size(), num_workers)).into());
    }
    let spec = FeatureSpec::new(size, cfg.channel_order);
    let bridge = Arc::new(EvalBridge::new(evaluator, spec, cfg.value_convention, num_workers));
    let tree = Arc::new(RwLock::new(SearchTree::new(cfg.max_nodes, num_workers)));
    let spare = SearchTree::new(cfg.max_nodes, num_workers);
    let lock = match cfg.lock_mode {
      LockMode::LockFree => None,
      LockMode::Locked => Some(Arc::new(Mutex::new(()))),
    };

    let pool = ThreadPool::new(num_workers);
    let out_barrier = Arc::new(Barrier::new(num_workers + 1));
    let mut in_txs = vec![];
    for tid in 0 .. num_workers {
      let (in_tx, in_rx) = channel();
      in_txs.push(in_tx);
      let out_barrier = out_barrier.clone();
      let mut worker = SearchWorker{
        tid:      tid,
        cfg:      cfg.clone(),
        tree:     tree.clone(),
        bridge:   bridge.clone(),
        lock:     lock.clone(),
        rng:      XorShift128PlusRng::seed_from_u64(cfg.seed.wrapping_add(1 + tid as u64)),
        path:     vec![],
        moves:    vec![],
        cands:    vec![],
        priors:   vec![],
        children: vec![],
      };
      pool.execute(move || {
        loop {
          let cmd: SearchWorkerCommand = match in_rx.recv() {
            Ok(cmd) => cmd,
            Err(_) => break,
          };
          match cmd {
            SearchWorkerCommand::Search{mut board, root_filter, control} => {
              worker.run_phase(&mut board, &root_filter, &control);
              out_barrier.wait();
            }
            SearchWorkerCommand::Quit => break,
          }
        }
      });
    }

    Ok(ParallelSearch{
      rng:          XorShift128PlusRng::seed_from_u64(cfg.seed),
      cfg:          cfg,
      size:         size,
      num_workers:  num_workers,
      pool:         pool,
      in_txs:       in_txs,
      out_barrier:  out_barrier,
      tree:         tree,
      spare:        spare,
      bridge:       bridge,
      cancel:       CancelToken::new(),
      root_noised:  false,
    })
  }

  pub fn config(&self) -> &SearchConfig {
    &self.cfg
  }

  pub fn num_workers(&self) -> usize {
    self.num_workers
  }

  /// Flag that stops a running search from any thread. It is reset when a
  /// search starts.
  pub fn cancel_token(&self) -> CancelToken {
    self.cancel.clone()
  }

  /// Evaluator calls made so far.
  pub fn num_eval_calls(&self) -> u64 {
    self.bridge.num_calls()
  }

  pub fn num_eval_inputs(&self) -> u64 {
    self.bridge.num_inputs()
  }

  pub fn tree(&self) -> RwLockReadGuard<SearchTree> {
    read_tree(&self.tree)
  }

  /// Drops the whole tree, e.g. for a new game.
  pub fn clear_tree(&mut self) {
    write_tree(&self.tree).clear();
    self.root_noised = false;
  }

  /// Takes the current tree out, leaving an empty one in its place.
  pub fn take_tree(&mut self) -> SearchTree {
    let mut taken = SearchTree::new(self.cfg.max_nodes, self.num_workers);
    write_tree(&self.tree).swap(&mut taken);
    self.root_noised = false;
    taken
  }

  /// Keeps only the subtree reached by `moves` from the current root.
  /// Returns whether that subtree existed; if not, the tree is cleared.
  pub fn reuse_subtree(&mut self, moves: &[Point]) -> bool {
    let mut tree = write_tree(&self.tree);
    let found = tree.extract_subtree(&mut self.spare, moves);
    tree.swap(&mut self.spare);
    self.spare.clear();
    self.root_noised = false;
    if found {
      debug!("reusing subtree: {} nodes, {} root visits", tree.num_nodes(), tree.root_node().visits());
    }
    found
  }

  fn enqueue(&self, tid: usize, cmd: SearchWorkerCommand) -> Result<(), SearchError> {
    self.in_txs[tid].send(cmd).map_err(|_| SearchError::Disconnected)
  }

  /// Rebuilds the tree without rarely visited subtrees, doubling
  /// `min_visits` until the copy is small enough. Returns whether enough
  /// room was freed to continue.
  fn prune(&mut self, min_visits: &mut u32) -> bool {
    let max_ratio = self.cfg.prune_max_ratio;
    let mut tree = write_tree(&self.tree);
    let before = tree.num_nodes();
    let root_visits = tree.root_node().visits();
    loop {
      let ratio = tree.copy_prune_low_count(&mut self.spare, *min_visits);
      if ratio <= max_ratio || *min_visits > root_visits {
        break;
      }
      *min_visits = min_visits.saturating_mul(2);
    }
    tree.swap(&mut self.spare);
    self.spare.clear();
    let after = tree.num_nodes();
    info!("pruned search tree: {} -> {} nodes (min visits {})", before, after, min_visits);
    (after as f32) <= max_ratio * tree.capacity() as f32
  }

  fn prepare_root(&mut self, init_tree: Option<SearchTree>, root_filter: &[Point]) {
    let mut tree = write_tree(&self.tree);
    if let Some(mut init_tree) = init_tree {
      tree.swap(&mut init_tree);
      self.root_noised = false;
    }
    if tree.root_node().is_expanded() && !root_filter.is_empty() {
      let open = tree.children(ROOT).any(|c| !root_filter.contains(&tree.node(c).mv()));
      if !open {
        tree.clear();
        self.root_noised = false;
      }
    }
    if self.root_noised {
      return;
    }
    if let Some(noise) = self.cfg.root_noise {
      let children: Vec<NodeId> = tree.children(ROOT).collect();
      if !children.is_empty() {
        let mut priors: Vec<f32> = children.iter().map(|&c| tree.node(c).prior()).collect();
        mix_root_noise(&mut priors, noise, &mut self.rng);
        for (&c, &p) in children.iter().zip(priors.iter()) {
          tree.node(c).set_prior(p);
        }
      }
    }
  }

  /// Searches from `board` until the budget runs out or a stop condition
  /// fires, then picks a move by the configured rule.
  pub fn search(&mut self, board: &Board, params: SearchParams) -> Result<SearchResult, SearchError> {
    if board.size() != self.size {
      return Err(ConfigError::Invalid(format!(
          "search set up for size {}, board has size {}", self.size, board.size())).into());
    }
    if board.is_game_over() {
      return Err(SearchError::NoCandidates);
    }
    let SearchParams{budget, root_filter, init_tree} = params;
    {
      let mut root_board = board.clone();
      if !root_board.legal_moves().iter().any(|mv| !root_filter.contains(mv)) {
        return Err(SearchError::NoCandidates);
      }
    }
    self.prepare_root(init_tree, &root_filter);

    self.cancel.reset();
    let root_filter = Arc::new(root_filter);
    let control = Arc::new(SearchControl::new(budget, self.cancel.clone())
        .with_early_abort(self.cfg.early_abort)
        .with_catch_up(self.cfg.move_select == MoveSelect::MostVisited)
        .with_max_eval_failures(self.cfg.max_eval_failures)
        .with_root_filter(root_filter.clone()));
    let mut min_visits = self.cfg.prune_min_visits.max(1);
    let mut num_prunes = 0;
    loop {
      for tid in 0 .. self.num_workers {
        self.enqueue(tid, SearchWorkerCommand::Search{
          board:        board.clone(),
          root_filter:  root_filter.clone(),
          control:      control.clone(),
        })?;
      }
      self.out_barrier.wait();
      match control.stop_reason() {
        Some(StopReason::TreeFull) if self.cfg.prune_full_tree => {
          let resumed = self.prune(&mut min_visits);
          num_prunes += 1;
          if !resumed {
            warn!("search tree still full after pruning, stopping");
            break;
          }
          control.resume();
        }
        _ => break,
      }
    }
    let stop_reason = control.stop_reason().unwrap_or(StopReason::Cancelled);

    let tree = read_tree(&self.tree);
    // Root expansions and `prepare_root` both noise the root priors.
    self.root_noised = self.cfg.root_noise.is_some() && tree.root_node().is_expanded();
    let children = TreeOps::root_children(&tree, &root_filter);
    let best_idx = select_move(&children, self.cfg.move_select, &mut self.rng).ok_or(SearchError::NoCandidates)?;
    let best_move = children[best_idx].mv;
    let root = tree.root_node();
    let result = SearchResult{
      best_move:    best_move,
      value:        -root.mean().unwrap_or(0.0),
      root_visits:  root.visits(),
      iterations:   control.iterations(),
      elapsed:      control.elapsed(),
      stop_reason:  stop_reason,
      children:     children,
      num_prunes:   num_prunes,
    };
    info!("search: {} iterations in {:.3}s ({:?}), best {} ({} visits), value {:.3}, {} nodes",
        result.iterations, result.elapsed.as_secs_f64(), result.stop_reason,
        board.topology().point_to_string(best_move), result.children[best_idx].visits,
        result.value, tree.num_nodes());
    Ok(result)
  }
}
