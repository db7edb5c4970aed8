use moriarty::agents::{Agent};
use moriarty::agents::random::{RandomAgent};
use moriarty::agents::search::{SearchAgent};
use moriarty::board::{Point};
use moriarty::hyper::{EngineConfig, load_engine_config, load_engine_config_from_env};
use moriarty::position::{Board};
use moriarty::search::{ParallelSearch, SearchParams};
use moriarty::search::evaluator::{Evaluator, UniformEvaluator};
use moriarty::topology::{TopologyRegistry};

use getopts::{Options};
use log::{error, info};

use std::env;
use std::error::{Error};
use std::process;
use std::sync::{Arc};

fn run() -> Result<(), Box<dyn Error>> {
  let args: Vec<_> = env::args().collect();
  let mut opts = Options::new();
  opts.optopt("c", "config", "TOML engine config", "PATH");
  opts.optopt("m", "moves", "searched positions in the timing run (default 10)", "N");
  opts.optopt("g", "game-moves", "move limit of the self-play game (default 60)", "N");
  let matches = opts.parse(&args[1 ..])?;
  let cfg: EngineConfig = match matches.opt_str("c") {
    Some(path) => load_engine_config(path)?,
    None => load_engine_config_from_env()?,
  };
  let num_searches: usize = matches.opt_str("m").map_or(Ok(10), |s| s.parse())?;
  let game_moves: usize = matches.opt_str("g").map_or(Ok(60), |s| s.parse())?;

  let registry = TopologyRegistry::new();
  let evaluator: Arc<dyn Evaluator> = Arc::new(UniformEvaluator);
  let size = cfg.board.size;

  // Timing run: the same engine searches a sequence of positions.
  let mut search = ParallelSearch::new(cfg.search.clone(), size, evaluator.clone())?;
  let mut board = Board::with_hash_config(registry.get(size)?, cfg.board.rules(), cfg.board.hash);
  for k in 0 .. num_searches {
    let result = search.search(&board, SearchParams::new(cfg.search.budget()))?;
    info!("search {}: {} iterations, {:.3} s, {:?}, {} prunes",
        k, result.iterations, result.elapsed.as_secs_f64(), result.stop_reason, result.num_prunes);
    board.play_move(result.best_move)?;
    search.reuse_subtree(&[result.best_move]);
    if board.is_game_over() {
      break;
    }
  }
  info!("evaluator: {} calls, {} inputs", search.num_eval_calls(), search.num_eval_inputs());
  drop(search);

  // Self-play: search agent as Black against the random agent.
  let mut agents: Vec<Box<dyn Agent>> = vec![
    Box::new(SearchAgent::new(cfg.search.clone(), size, evaluator)?),
    Box::new(RandomAgent::new(cfg.search.seed)),
  ];
  let mut board = Board::with_hash_config(registry.get(size)?, cfg.board.rules(), cfg.board.hash);
  for ply in 0 .. game_moves {
    if board.is_game_over() || board.is_history_full() {
      break;
    }
    let agent = &mut agents[ply % 2];
    let mv: Point = agent.generate_move(&board)?;
    board.play_move(mv)?;
    if board.last_move_was_illegal() {
      board.undo()?;
      board.play_move(Point::PASS)?;
    }
    info!("ply {}: {}", ply, board.topology().point_to_string(mv));
  }
  for agent in agents.iter_mut() {
    agent.on_game_end();
  }
  for row in board.to_debug_strings() {
    println!("{}", row);
  }
  println!("area score (black): {:.1}", board.score_area(cfg.search.komi));
  Ok(())
}

fn main() {
  env_logger::init();
  if let Err(e) = run() {
    error!("bench-search: {}", e);
    process::exit(1);
  }
}
