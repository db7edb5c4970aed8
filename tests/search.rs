use moriarty::agents::{Agent};
use moriarty::agents::random::{RandomAgent};
use moriarty::agents::search::{SearchAgent};
use moriarty::board::{Point, RuleSet, Stone};
use moriarty::hyper::{EarlyAbortConfig, LockMode, MoveSelect, RootNoise, SearchConfig};
use moriarty::position::{Board};
use moriarty::position::features::{FeatureSpec};
use moriarty::random::{XorShift128PlusRng};
use moriarty::search::{ParallelSearch, SearchBudget, SearchError, SearchParams, select_move};
use moriarty::search::control::{StopReason};
use moriarty::search::evaluator::{EvalOutput, Evaluator, EvaluatorError, FnEvaluator, UniformEvaluator, ValueConvention};
use moriarty::search::tree::{SearchTree};
use moriarty::topology::{TopologyRegistry};

use rand::{SeedableRng};

use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration};

fn empty_board(size: usize) -> Board {
  let registry = TopologyRegistry::new();
  Board::with_size(&registry, size, RuleSet::Chinese.rules()).unwrap()
}

fn config(num_threads: usize) -> SearchConfig {
  SearchConfig{
    num_threads:  num_threads,
    max_nodes:    50_000,
    ..SearchConfig::default()
  }
}

/// Sampling at the root leaves the catch-up stop off, so iteration budgets
/// run to the end.
fn sampling_config(num_threads: usize) -> SearchConfig {
  SearchConfig{
    move_select:  MoveSelect::Sample{temperature: 1.0},
    ..config(num_threads)
  }
}

fn uniform_output(spec: &FeatureSpec, value: f32) -> EvalOutput {
  let n = spec.size * spec.size + 1;
  EvalOutput{
    policy: vec![1.0 / n as f32; n],
    value:  value,
  }
}

fn constant_evaluator(value: f32) -> Arc<dyn Evaluator> {
  Arc::new(FnEvaluator::new(move |spec: &FeatureSpec, _: &[f32]| Ok(uniform_output(spec, value))))
}

/// Records the size of every batch it sees.
#[derive(Default)]
struct RecordingEvaluator {
  batches:  Mutex<Vec<usize>>,
}

impl Evaluator for RecordingEvaluator {
  fn evaluate_batch(&self, spec: &FeatureSpec, inputs: &[&[f32]]) -> Result<Vec<EvalOutput>, EvaluatorError> {
    for input in inputs.iter() {
      assert_eq!(input.len(), spec.len());
    }
    self.batches.lock().unwrap().push(inputs.len());
    Ok(inputs.iter().map(|_| uniform_output(spec, 0.0)).collect())
  }
}

fn check_tree_settled(search: &ParallelSearch) {
  let tree = search.tree();
  let mut stack = vec![tree.root()];
  while let Some(id) = stack.pop() {
    let node = tree.node(id);
    assert_eq!(node.virtual_loss(), 0);
    let mut child_visits = 0;
    for c in tree.children(id) {
      child_visits += tree.node(c).visits();
      stack.push(c);
    }
    assert!(node.visits() >= child_visits);
  }
}

#[test]
fn single_thread_runs_the_exact_budget() {
  let board = empty_board(9);
  let mut search = ParallelSearch::new(config(1), 9, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(60))).unwrap();
  assert_eq!(result.stop_reason, StopReason::IterationBudget);
  assert_eq!(result.iterations, 60);
  assert_eq!(result.root_visits, 60);
  assert_eq!(search.num_eval_calls(), 60);
  assert_eq!(search.num_eval_inputs(), 60);
  assert_eq!(result.children.len(), 82);
  assert_eq!(result.num_prunes, 0);
  assert!(result.best_child().is_some());
  check_tree_settled(&search);
}

#[test]
fn same_seed_same_search() {
  let board = empty_board(7);
  let cfg = SearchConfig{
    seed: 17,
    root_noise: Some(RootNoise{alpha: 0.3, fraction: 0.25}),
    ..sampling_config(1)
  };
  let mut results = vec![];
  for _ in 0 .. 2 {
    let mut search = ParallelSearch::new(cfg.clone(), 7, Arc::new(UniformEvaluator)).unwrap();
    results.push(search.search(&board, SearchParams::new(SearchBudget::iterations(120))).unwrap());
  }
  assert_eq!(results[0].best_move, results[1].best_move);
  assert_eq!(results[0].children, results[1].children);
}

#[test]
fn one_evaluator_call_per_round() {
  let board = empty_board(9);
  let evaluator = Arc::new(RecordingEvaluator::default());
  let mut search = ParallelSearch::new(sampling_config(4), 9, evaluator.clone()).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(200))).unwrap();
  assert_eq!(result.iterations, 200);
  assert_eq!(result.root_visits, 200);
  let batches = evaluator.batches.lock().unwrap();
  assert_eq!(batches.len() as u64, search.num_eval_calls());
  assert_eq!(batches.iter().sum::<usize>() as u64, search.num_eval_inputs());
  assert!(batches.iter().all(|&n| n >= 1 && n <= 4));
  // Four workers fill most batches.
  assert!(batches.len() < 200);
  check_tree_settled(&search);
}

#[test]
fn locked_mode_agrees_on_counts() {
  let board = empty_board(9);
  let cfg = SearchConfig{
    lock_mode:  LockMode::Locked,
    ..sampling_config(3)
  };
  let mut search = ParallelSearch::new(cfg, 9, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(150))).unwrap();
  assert_eq!(result.iterations, 150);
  assert_eq!(result.root_visits, 150);
  check_tree_settled(&search);
}

#[test]
fn failing_evaluator_stops_without_damage() {
  let board = empty_board(9);
  let evaluator = FnEvaluator::new(|_: &FeatureSpec, _: &[f32]| {
    Err(EvaluatorError::EvaluationFailed("offline".to_string()))
  });
  let cfg = SearchConfig{
    max_eval_failures:  5,
    ..config(2)
  };
  let mut search = ParallelSearch::new(cfg, 9, Arc::new(evaluator)).unwrap();
  match search.search(&board, SearchParams::new(SearchBudget::iterations(100))) {
    Err(SearchError::NoCandidates) => {}
    other => panic!("unexpected search outcome: {:?}", other.map(|r| r.stop_reason)),
  }
  assert_eq!(search.num_eval_calls(), 5);
  let tree = search.tree();
  assert_eq!(tree.num_nodes(), 1);
  assert_eq!(tree.root_node().visits(), 0);
  assert_eq!(tree.root_node().virtual_loss(), 0);
}

#[test]
fn failed_iterations_are_skipped() {
  let board = empty_board(9);
  let calls = Arc::new(AtomicUsize::new(0));
  let evaluator = {
    let calls = calls.clone();
    FnEvaluator::new(move |spec: &FeatureSpec, _: &[f32]| {
      if calls.fetch_add(1, Ordering::SeqCst) % 2 == 1 {
        Err(EvaluatorError::NotReady)
      } else {
        Ok(uniform_output(spec, 0.0))
      }
    })
  };
  let mut search = ParallelSearch::new(sampling_config(1), 9, Arc::new(evaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(40))).unwrap();
  assert_eq!(result.stop_reason, StopReason::IterationBudget);
  assert_eq!(calls.load(Ordering::SeqCst), 40);
  assert_eq!(result.iterations, 20);
  assert_eq!(result.root_visits, 20);
  check_tree_settled(&search);
}

#[test]
fn malformed_output_is_a_failure() {
  let board = empty_board(5);
  let evaluator = FnEvaluator::new(|_: &FeatureSpec, _: &[f32]| {
    Ok(EvalOutput{policy: vec![1.0; 3], value: 0.0})
  });
  let cfg = SearchConfig{
    max_eval_failures:  3,
    ..config(1)
  };
  let mut search = ParallelSearch::new(cfg, 5, Arc::new(evaluator)).unwrap();
  assert!(search.search(&board, SearchParams::new(SearchBudget::iterations(10))).is_err());
  assert_eq!(search.num_eval_calls(), 3);
  assert_eq!(search.tree().num_nodes(), 1);
}

#[test]
fn cancel_from_another_thread() {
  let board = empty_board(9);
  let mut search = ParallelSearch::new(sampling_config(2), 9, Arc::new(UniformEvaluator)).unwrap();
  let token = search.cancel_token();
  let done = Arc::new(AtomicBool::new(false));
  let canceller = {
    let done = done.clone();
    thread::spawn(move || {
      while !done.load(Ordering::Acquire) {
        thread::sleep(Duration::from_millis(20));
        token.cancel();
      }
    })
  };
  let result = search.search(&board, SearchParams::new(SearchBudget::default())).unwrap();
  done.store(true, Ordering::Release);
  canceller.join().unwrap();
  assert_eq!(result.stop_reason, StopReason::Cancelled);
  assert!(result.iterations > 0);
  check_tree_settled(&search);

  // The next search starts with the flag cleared.
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(10))).unwrap();
  assert_eq!(result.stop_reason, StopReason::IterationBudget);
}

#[test]
fn time_budget() {
  let board = empty_board(9);
  let mut search = ParallelSearch::new(sampling_config(2), 9, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::time(Duration::from_millis(40)))).unwrap();
  assert_eq!(result.stop_reason, StopReason::TimeBudget);
  assert!(result.elapsed >= Duration::from_millis(40));
  assert!(result.elapsed < Duration::from_secs(10));
}

#[test]
fn early_abort_on_a_clear_winner() {
  let board = empty_board(9);
  let cfg = SearchConfig{
    early_abort:  Some(EarlyAbortConfig{threshold: 0.75, min_visits: 1}),
    ..config(1)
  };
  // Every position looks lost for the side to move, so the first reply
  // already looks won from the root.
  let mut search = ParallelSearch::new(cfg, 9, constant_evaluator(-1.0)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(500))).unwrap();
  assert_eq!(result.stop_reason, StopReason::EarlyAbort);
  assert!(result.iterations < 10);
}

#[test]
fn leader_that_cannot_be_caught() {
  let board = empty_board(5);
  let evaluator = FnEvaluator::new(|spec: &FeatureSpec, _: &[f32]| {
    let n = spec.size * spec.size + 1;
    let mut policy = vec![0.0; n];
    policy[12] = 1.0;
    Ok(EvalOutput{policy: policy, value: 0.0})
  });
  let mut search = ParallelSearch::new(config(1), 5, Arc::new(evaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(400))).unwrap();
  assert_eq!(result.stop_reason, StopReason::CannotCatchUp);
  assert!(result.iterations < 400);
  let topo = board.topology();
  assert_eq!(result.best_move, topo.parse_point("C3").unwrap());
}

#[test]
fn filtered_leader_does_not_stop_the_search() {
  let board = empty_board(5);
  let topo = board.topology().clone();
  let c3 = topo.parse_point("C3").unwrap();
  let evaluator = FnEvaluator::new(|spec: &FeatureSpec, _: &[f32]| {
    let n = spec.size * spec.size + 1;
    let mut policy = vec![0.2 / (n - 1) as f32; n];
    policy[12] = 0.8;
    Ok(EvalOutput{policy: policy, value: 0.0})
  });
  let mut search = ParallelSearch::new(config(1), 5, Arc::new(evaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(200))).unwrap();
  assert_eq!(result.best_move, c3);
  let lead = result.best_child().unwrap().visits;
  assert!(2 * lead > result.root_visits);

  // C3 keeps its lead in the tree, but it is never played, so neither the
  // catch-up stop nor the early abort may look at it.
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(300)).with_root_filter(vec![c3])).unwrap();
  assert_eq!(result.stop_reason, StopReason::IterationBudget);
  assert_eq!(result.iterations, 300);
  assert!(result.best_move != c3);
  assert!(result.children.iter().all(|c| c.mv != c3));
}

#[test]
fn value_follows_the_convention() {
  let board = empty_board(9);
  let mut search = ParallelSearch::new(config(1), 9, constant_evaluator(0.5)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(1))).unwrap();
  assert!((result.value - 0.5).abs() < 1.0e-6);

  let cfg = SearchConfig{
    value_convention: ValueConvention::SignFlipped,
    ..config(1)
  };
  let mut search = ParallelSearch::new(cfg, 9, constant_evaluator(0.5)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(1))).unwrap();
  assert!((result.value + 0.5).abs() < 1.0e-6);
}

#[test]
fn root_filter_excludes_moves() {
  let board = empty_board(5);
  let topo = board.topology().clone();
  let mut search = ParallelSearch::new(config(1), 5, Arc::new(UniformEvaluator)).unwrap();
  let filter: Vec<Point> = topo.points().iter().cloned().filter(|&p| topo.line(p) == 1).collect();
  assert_eq!(filter.len(), 16);
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(50)).with_root_filter(filter.clone())).unwrap();
  assert_eq!(result.children.len(), 10);
  assert!(result.children.iter().all(|c| !filter.contains(&c.mv)));
  assert!(!filter.contains(&result.best_move));

  search.clear_tree();
  let everything: Vec<Point> = topo.points().to_vec();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(10)).with_root_filter(everything.clone())).unwrap();
  assert_eq!(result.best_move, Point::PASS);

  let mut all_moves = everything;
  all_moves.push(Point::PASS);
  match search.search(&board, SearchParams::new(SearchBudget::iterations(10)).with_root_filter(all_moves)) {
    Err(SearchError::NoCandidates) => {}
    other => panic!("unexpected search outcome: {:?}", other.map(|r| r.best_move)),
  }
}

#[test]
fn finished_game_has_no_candidates() {
  let mut board = empty_board(5);
  board.play_move(Point::PASS).unwrap();
  board.play_move(Point::PASS).unwrap();
  let mut search = ParallelSearch::new(config(1), 5, Arc::new(UniformEvaluator)).unwrap();
  assert!(matches!(search.search(&board, SearchParams::new(SearchBudget::iterations(10))), Err(SearchError::NoCandidates)));
  let board = empty_board(9);
  assert!(matches!(search.search(&board, SearchParams::new(SearchBudget::iterations(10))), Err(SearchError::Config(_))));
}

#[test]
fn bad_config_is_rejected() {
  assert!(ParallelSearch::new(config(0), 9, Arc::new(UniformEvaluator)).is_err());
  let cfg = SearchConfig{
    max_nodes:  4,
    ..config(2)
  };
  assert!(matches!(ParallelSearch::new(cfg, 9, Arc::new(UniformEvaluator)), Err(SearchError::Config(_))));

  // Each thread's share of the arena must fit a full root expansion.
  let cfg = SearchConfig{
    max_nodes:  1000,
    ..config(4)
  };
  assert!(cfg.validate().is_ok());
  assert!(matches!(ParallelSearch::new(cfg.clone(), 19, Arc::new(UniformEvaluator)), Err(SearchError::Config(_))));
  assert!(ParallelSearch::new(cfg, 9, Arc::new(UniformEvaluator)).is_ok());
  let cfg = SearchConfig{
    max_nodes:  1 + 4 * 362,
    ..config(4)
  };
  assert!(ParallelSearch::new(cfg, 19, Arc::new(UniformEvaluator)).is_ok());
}

#[test]
fn reuse_keeps_the_played_subtree() {
  let mut board = empty_board(9);
  let mut search = ParallelSearch::new(sampling_config(1), 9, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(200))).unwrap();
  let best = *result.best_child().unwrap();
  assert!(best.visits > 0);
  assert!(search.reuse_subtree(&[best.mv]));
  assert_eq!(search.tree().root_node().visits(), best.visits);
  board.play_move(best.mv).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(50))).unwrap();
  assert_eq!(result.iterations, 50);
  assert_eq!(result.root_visits, best.visits + 50);

  assert!(!search.reuse_subtree(&[Point::PASS, Point::PASS, Point::PASS]));
  assert_eq!(search.tree().num_nodes(), 1);
}

#[test]
fn init_tree_replaces_the_current_tree() {
  let board = empty_board(9);
  let mut search = ParallelSearch::new(sampling_config(1), 9, Arc::new(UniformEvaluator)).unwrap();
  search.search(&board, SearchParams::new(SearchBudget::iterations(30))).unwrap();
  let taken = search.take_tree();
  assert_eq!(taken.root_node().visits(), 30);
  assert_eq!(search.tree().num_nodes(), 1);
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(20)).with_init_tree(taken)).unwrap();
  assert_eq!(result.root_visits, 50);
  let fresh = SearchTree::new(50_000, 1);
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(20)).with_init_tree(fresh)).unwrap();
  assert_eq!(result.root_visits, 20);
}

#[test]
fn full_tree_is_pruned_and_search_continues() {
  let board = empty_board(5);
  let cfg = SearchConfig{
    max_nodes:        300,
    prune_min_visits: 2,
    ..sampling_config(1)
  };
  let mut search = ParallelSearch::new(cfg.clone(), 5, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(400))).unwrap();
  assert!(result.num_prunes > 0);
  assert_eq!(result.stop_reason, StopReason::IterationBudget);
  assert_eq!(result.iterations, 400);
  assert!(search.tree().num_nodes() <= 300);
  check_tree_settled(&search);

  let cfg = SearchConfig{
    prune_full_tree:  false,
    ..cfg
  };
  let mut search = ParallelSearch::new(cfg, 5, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(400))).unwrap();
  assert_eq!(result.stop_reason, StopReason::TreeFull);
  assert_eq!(result.num_prunes, 0);
  assert!(result.iterations < 400);
}

#[test]
fn root_noise_perturbs_priors() {
  let board = empty_board(9);
  let cfg = SearchConfig{
    root_noise: Some(RootNoise{alpha: 0.03, fraction: 0.25}),
    ..config(1)
  };
  let mut search = ParallelSearch::new(cfg, 9, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(5))).unwrap();
  let priors: Vec<f32> = result.children.iter().map(|c| c.prior).collect();
  assert!((priors.iter().sum::<f32>() - 1.0).abs() < 1.0e-3);
  let max = priors.iter().cloned().fold(0.0, f32::max);
  let min = priors.iter().cloned().fold(1.0, f32::min);
  assert!(max > min);

  // Searching the same root again keeps the noise it already has.
  let again = search.search(&board, SearchParams::new(SearchBudget::iterations(5))).unwrap();
  let again_priors: Vec<f32> = again.children.iter().map(|c| c.prior).collect();
  assert_eq!(again_priors, priors);

  // A new root is noised once.
  search.clear_tree();
  let fresh = search.search(&board, SearchParams::new(SearchBudget::iterations(5))).unwrap();
  let fresh_priors: Vec<f32> = fresh.children.iter().map(|c| c.prior).collect();
  assert!((fresh_priors.iter().sum::<f32>() - 1.0).abs() < 1.0e-3);
  assert_ne!(fresh_priors, priors);
}

#[test]
fn visit_distribution_is_normalized() {
  let board = empty_board(9);
  let mut search = ParallelSearch::new(config(1), 9, Arc::new(UniformEvaluator)).unwrap();
  let result = search.search(&board, SearchParams::new(SearchBudget::iterations(100))).unwrap();
  let dist = result.visit_distribution(board.topology());
  assert_eq!(dist.len(), 82);
  assert!((dist.iter().sum::<f32>() - 1.0).abs() < 1.0e-4);
  let best_idx = board.topology().policy_idx(result.best_move);
  assert!(dist.iter().all(|&p| p <= dist[best_idx]));
}

#[test]
fn move_selection_rules() {
  use moriarty::search::{ChildStats};
  let children = vec![
    ChildStats{mv: Point(30), visits: 10, mean: Some(0.1), prior: 0.2},
    ChildStats{mv: Point(31), visits: 12, mean: Some(-0.2), prior: 0.1},
    ChildStats{mv: Point(32), visits: 12, mean: Some(0.3), prior: 0.1},
    ChildStats{mv: Point(33), visits: 0, mean: None, prior: 0.6},
  ];
  let mut rng = XorShift128PlusRng::seed_from_u64(5);
  assert_eq!(select_move(&children, MoveSelect::MostVisited, &mut rng), Some(2));
  assert_eq!(select_move(&[], MoveSelect::MostVisited, &mut rng), None);
  let mut counts = [0; 4];
  for _ in 0 .. 500 {
    let k = select_move(&children, MoveSelect::Sample{temperature: 1.0}, &mut rng).unwrap();
    counts[k] += 1;
  }
  assert_eq!(counts[3], 0);
  assert!(counts[0] > 0 && counts[1] > 0 && counts[2] > 0);
  // A tiny temperature is close to picking the most visited.
  for _ in 0 .. 50 {
    let k = select_move(&children, MoveSelect::Sample{temperature: 0.01}, &mut rng).unwrap();
    assert!(k == 1 || k == 2);
  }
}

#[test]
fn search_agent_plays_a_game() {
  let mut board = empty_board(5);
  let cfg = SearchConfig{
    max_iterations: Some(64),
    ..config(2)
  };
  let mut black = SearchAgent::new(cfg, 5, Arc::new(UniformEvaluator)).unwrap();
  let mut white = RandomAgent::new(3);
  for _ in 0 .. 40 {
    if board.is_game_over() {
      break;
    }
    let mv = if board.to_play() == Stone::Black {
      let mv = black.generate_move(&board).unwrap();
      let result = black.last_result().unwrap();
      assert!(result.root_visits as u64 >= result.iterations);
      mv
    } else {
      white.generate_move(&board).unwrap()
    };
    if !mv.is_pass() {
      assert!(board.is_legal(mv, board.to_play()));
    }
    board.play_move(mv).unwrap();
    assert!(!board.last_move_was_illegal());
  }
  if !board.is_game_over() {
    black.ponder(&board, SearchBudget::iterations(8)).unwrap();
  }
  black.on_game_end();
  assert!(black.last_result().is_none());
  assert_eq!(black.search().tree().num_nodes(), 1);
}

#[test]
fn random_agent_keeps_its_eyes() {
  let mut board = empty_board(5);
  let topo = board.topology().clone();
  // Black owns the board except two single-point eyes.
  for &p in topo.points() {
    let code = topo.point_to_string(p);
    if code != "A1" && code != "C3" {
      board.set_to_play(Stone::Black).unwrap();
      board.play(p, Stone::Black).unwrap();
    }
  }
  board.set_to_play(Stone::Black).unwrap();
  let mut agent = RandomAgent::new(11);
  assert_eq!(agent.generate_move(&board).unwrap(), Point::PASS);
  board.set_to_play(Stone::White).unwrap();
  // Both points are suicide for White.
  assert_eq!(agent.generate_move(&board).unwrap(), Point::PASS);
}
