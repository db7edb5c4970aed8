use crate::board::{Point};
use crate::hyper::{EarlyAbortConfig};
use crate::search::tree::{SearchTree};
use crate::worker::{CancelToken};

use log::{debug};

use std::sync::{Arc, Mutex, MutexGuard};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Target period between two reads of the clock.
const CLOCK_PERIOD_SECS: f64 = 0.010;
const MAX_CHECK_INTERVAL: u64 = 1 << 16;

#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct SearchBudget {
  pub max_iterations: Option<u64>,
  pub max_time:       Option<Duration>,
}

impl SearchBudget {
  pub fn iterations(n: u64) -> SearchBudget {
    SearchBudget{
      max_iterations: Some(n),
      max_time:       None,
    }
  }

  pub fn time(t: Duration) -> SearchBudget {
    SearchBudget{
      max_iterations: None,
      max_time:       Some(t),
    }
  }

  pub fn is_unbounded(&self) -> bool {
    self.max_iterations.is_none() && self.max_time.is_none()
  }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum StopReason {
  IterationBudget,
  TimeBudget,
  EarlyAbort,
  CannotCatchUp,
  Cancelled,
  TreeFull,
  EvaluatorFailures,
}

/// Outcome of the evaluator call made during one round.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BatchStatus {
  Idle,
  Evaluated,
  Failed,
}

struct ClockState {
  rounds:     u64,
  interval:   u64,
  last_check: Instant,
}

/// Loop control for one search, shared by every worker and the server
/// across all phases. Workers take an iteration ticket before each
/// iteration; the round leader alone calls `check_round`.
pub struct SearchControl {
  budget:             SearchBudget,
  early_abort:        Option<EarlyAbortConfig>,
  catch_up:           bool,
  max_eval_failures:  u32,
  root_filter:        Arc<Vec<Point>>,
  cancel:             CancelToken,
  start:              Instant,
  started:            AtomicU64,
  completed:          AtomicU64,
  arena_full:         AtomicBool,
  eval_failures:      AtomicU32,
  clock:              Mutex<ClockState>,
  stop_reason:        Mutex<Option<StopReason>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
  m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SearchControl {
  pub fn new(budget: SearchBudget, cancel: CancelToken) -> SearchControl {
    let now = Instant::now();
    SearchControl{
      budget:             budget,
      early_abort:        None,
      catch_up:           false,
      max_eval_failures:  0,
      root_filter:        Arc::new(vec![]),
      cancel:             cancel,
      start:              now,
      started:            AtomicU64::new(0),
      completed:          AtomicU64::new(0),
      arena_full:         AtomicBool::new(false),
      eval_failures:      AtomicU32::new(0),
      clock:              Mutex::new(ClockState{
        rounds:     0,
        interval:   1,
        last_check: now,
      }),
      stop_reason:        Mutex::new(None),
    }
  }

  pub fn with_early_abort(mut self, early_abort: Option<EarlyAbortConfig>) -> SearchControl {
    self.early_abort = early_abort;
    self
  }

  /// Stop as soon as the runner-up can no longer overtake the leader in
  /// visits. Only meaningful when the most visited move is played.
  pub fn with_catch_up(mut self, catch_up: bool) -> SearchControl {
    self.catch_up = catch_up;
    self
  }

  /// Zero disables the limit.
  pub fn with_max_eval_failures(mut self, max_eval_failures: u32) -> SearchControl {
    self.max_eval_failures = max_eval_failures;
    self
  }

  /// Root moves the search will never play; the stop checks ignore them.
  pub fn with_root_filter(mut self, root_filter: Arc<Vec<Point>>) -> SearchControl {
    self.root_filter = root_filter;
    self
  }

  pub fn budget(&self) -> &SearchBudget {
    &self.budget
  }

  pub fn elapsed(&self) -> Duration {
    self.start.elapsed()
  }

  /// Completed iterations.
  pub fn iterations(&self) -> u64 {
    self.completed.load(Ordering::Acquire)
  }

  pub fn stop_reason(&self) -> Option<StopReason> {
    *lock(&self.stop_reason)
  }

  /// Claims one iteration of the budget. Returns `false` once the
  /// iteration budget is spent.
  pub fn try_begin_iteration(&self) -> bool {
    match self.budget.max_iterations {
      None => true,
      Some(max) => self.started.fetch_add(1, Ordering::AcqRel) < max,
    }
  }

  pub fn finish_iteration(&self) {
    self.completed.fetch_add(1, Ordering::AcqRel);
  }

  pub fn set_arena_full(&self) {
    self.arena_full.store(true, Ordering::Release);
  }

  /// Clears the tree-full stop so the search can continue after a prune.
  pub fn resume(&self) {
    self.arena_full.store(false, Ordering::Release);
    *lock(&self.stop_reason) = None;
  }

  /// Decides whether the round just evaluated is the last one. Called by the
  /// round leader only, while every other worker waits at the barrier.
  pub fn check_round(&self, tree: &SearchTree, batch: BatchStatus) -> bool {
    let reason = self.round_stop_reason(tree, batch);
    if let Some(reason) = reason {
      debug!("search stopping: {:?} after {} iterations", reason, self.iterations());
      *lock(&self.stop_reason) = Some(reason);
    }
    reason.is_some()
  }

  fn round_stop_reason(&self, tree: &SearchTree, batch: BatchStatus) -> Option<StopReason> {
    if self.cancel.is_cancelled() {
      return Some(StopReason::Cancelled);
    }
    if self.arena_full.load(Ordering::Acquire) {
      return Some(StopReason::TreeFull);
    }
    match batch {
      BatchStatus::Idle => {}
      BatchStatus::Evaluated => {
        self.eval_failures.store(0, Ordering::Release);
      }
      BatchStatus::Failed => {
        let failures = self.eval_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if self.max_eval_failures > 0 && failures >= self.max_eval_failures {
          return Some(StopReason::EvaluatorFailures);
        }
      }
    }
    if let Some(max) = self.budget.max_iterations {
      if self.started.load(Ordering::Acquire) >= max {
        return Some(StopReason::IterationBudget);
      }
    }
    if self.check_clock() {
      return Some(StopReason::TimeBudget);
    }
    if let Some(early_abort) = self.early_abort {
      if let Some((visits, mean)) = best_child(tree, &self.root_filter) {
        if visits >= early_abort.threshold_visits() && 0.5 * (mean + 1.0) >= early_abort.threshold {
          return Some(StopReason::EarlyAbort);
        }
      }
    }
    if self.catch_up && self.cannot_catch_up(tree) {
      return Some(StopReason::CannotCatchUp);
    }
    None
  }

  /// Reads the clock once every `interval` rounds and retunes the interval
  /// from the measured round rate.
  fn check_clock(&self) -> bool {
    let max_time = match self.budget.max_time {
      None => return false,
      Some(t) => t,
    };
    let mut clock = lock(&self.clock);
    clock.rounds += 1;
    if clock.rounds < clock.interval {
      return false;
    }
    let now = Instant::now();
    let dt = now.duration_since(clock.last_check).as_secs_f64();
    if dt > 0.0 {
      let rate = clock.rounds as f64 / dt;
      clock.interval = ((rate * CLOCK_PERIOD_SECS) as u64).max(1).min(MAX_CHECK_INTERVAL);
    }
    clock.rounds = 0;
    clock.last_check = now;
    now.duration_since(self.start) >= max_time
  }

  fn remaining_iterations(&self) -> Option<u64> {
    let mut remaining = None;
    if let Some(max) = self.budget.max_iterations {
      remaining = Some(max.saturating_sub(self.started.load(Ordering::Acquire)));
    }
    if let Some(max_time) = self.budget.max_time {
      let elapsed = self.elapsed();
      let done = self.iterations();
      let secs = elapsed.as_secs_f64();
      if done > 0 && secs > 0.0 {
        let left = max_time.saturating_sub(elapsed).as_secs_f64();
        let est = (done as f64 / secs * left) as u64;
        remaining = Some(remaining.map_or(est, |r: u64| r.min(est)));
      }
    }
    remaining
  }

  fn cannot_catch_up(&self, tree: &SearchTree) -> bool {
    let remaining = match self.remaining_iterations() {
      None => return false,
      Some(r) => r,
    };
    let mut first = 0;
    let mut second = 0;
    for c in tree.children(tree.root()) {
      let node = tree.node(c);
      if self.root_filter.contains(&node.mv()) {
        continue;
      }
      let n = node.visits();
      if n > first {
        second = first;
        first = n;
      } else if n > second {
        second = n;
      }
    }
    first > 0 && (first - second) as u64 > remaining
  }
}

impl EarlyAbortConfig {
  fn threshold_visits(&self) -> u32 {
    self.min_visits.max(1)
  }
}

/// Visits and mean of the most visited root child outside `filter`.
fn best_child(tree: &SearchTree, filter: &[Point]) -> Option<(u32, f32)> {
  let mut best: Option<(u32, f32)> = None;
  for c in tree.children(tree.root()) {
    let node = tree.node(c);
    if filter.contains(&node.mv()) {
      continue;
    }
    if let Some(mean) = node.mean() {
      let n = node.visits();
      if best.map_or(true, |(bn, _)| n > bn) {
        best = Some((n, mean));
      }
    }
  }
  best
}
