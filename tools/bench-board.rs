use moriarty::board::{Point, Rules, Stone};
use moriarty::position::{Board};
use moriarty::random::{XorShift128PlusRng, random_shuffle};
use moriarty::topology::{TopologyRegistry};

use getopts::{Options};
use log::{error, info};
use rand::{SeedableRng};

use std::env;
use std::error::{Error};
use std::process;
use std::time::{Instant};

fn run() -> Result<(), Box<dyn Error>> {
  let args: Vec<_> = env::args().collect();
  let mut opts = Options::new();
  opts.optopt("s", "size", "board size (default 19)", "SIZE");
  opts.optopt("n", "games", "number of random games (default 2000)", "N");
  opts.optopt("", "seed", "rng seed", "SEED");
  let matches = opts.parse(&args[1 ..])?;
  let size: usize = matches.opt_str("s").map_or(Ok(19), |s| s.parse())?;
  let num_games: usize = matches.opt_str("n").map_or(Ok(2000), |s| s.parse())?;
  let seed: u64 = matches.opt_str("seed").map_or(Ok(1234), |s| s.parse())?;

  let registry = TopologyRegistry::new();
  let mut board = Board::with_size(&registry, size, Rules::default())?;
  let topo = board.topology().clone();
  let mut rng = XorShift128PlusRng::seed_from_u64(seed);
  let mut cands: Vec<Point> = topo.points().to_vec();

  let start = Instant::now();
  let mut num_moves = 0;
  let mut num_undos = 0;
  for _ in 0 .. num_games {
    board.clear();
    let mut passes = 0;
    while passes < 2 && !board.is_history_full() {
      let color = board.to_play();
      random_shuffle(&mut cands, &mut rng);
      let mut played = false;
      for &point in cands.iter() {
        if board.stone(point) != Stone::Empty || board.is_eyelike(point, color) {
          continue;
        }
        board.play(point, color)?;
        if board.last_move_was_illegal() {
          board.undo()?;
          num_undos += 1;
          continue;
        }
        played = true;
        break;
      }
      if played {
        passes = 0;
      } else {
        board.play(Point::PASS, color)?;
        passes += 1;
      }
      num_moves += 1;
    }
    while board.history_len() > 0 {
      board.undo()?;
      num_undos += 1;
    }
  }
  let elapsed = start.elapsed().as_secs_f64();
  info!("bench-board: size {} games {} moves {} undos {}", size, num_games, num_moves, num_undos);
  println!("{} games in {:.3} s: {:.0} moves/s, {:.0} undos/s",
      num_games, elapsed, num_moves as f64 / elapsed, num_undos as f64 / elapsed);
  Ok(())
}

fn main() {
  env_logger::init();
  if let Err(e) = run() {
    error!("bench-board: {}", e);
    process::exit(1);
  }
}
