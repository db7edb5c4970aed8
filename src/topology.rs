//! Per-size board geometry, computed once and shared.
//!
//! Points live on a padded grid of stride `size + 2`: every on-board point
//! has four in-bounds neighbors, and the outer ring is `Stone::Border`.

use crate::board::{Coord, Point};
use crate::point_set::{PointSet};
use crate::random::{XorShift128PlusRng};

use rand::{RngCore};
use thiserror::{Error};
use vec_map::{VecMap};

use std::sync::{Arc, RwLock};

pub const MIN_SIZE:   usize = 2;
pub const MAX_SIZE:   usize = 19;
pub const MAX_STRIDE: usize = MAX_SIZE + 2;
pub const MAX_POINTS: usize = MAX_STRIDE * MAX_STRIDE;

const NUM_KO_LEVEL_KEYS: usize = 64;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum TopologyError {
  #[error("unsupported board size {0} (expected {min} to {max})", min = MIN_SIZE, max = MAX_SIZE)]
  UnsupportedSize(usize),
}

/// Random keys for incremental hashing. Generated from a fixed seed per
/// board size, so hashes agree across boards and runs.
pub struct ZobristKeys {
  stones:   [Vec<u64>; 2],
  to_play:  u64,
  ko_level: Vec<u64>,
  captures: [Vec<u64>; 2],
}

impl ZobristKeys {
  fn new(size: usize, num_points: usize) -> ZobristKeys {
    let mut rng = XorShift128PlusRng::from_state([0x2545_f491_4f6c_dd1d ^ size as u64, 0x9e37_79b9_7f4a_7c15]);
    let mut table = |n: usize| -> Vec<u64> {
      (0 .. n).map(|_| rng.next_u64()).collect()
    };
    let stones = [table(num_points), table(num_points)];
    let ko_level = table(NUM_KO_LEVEL_KEYS);
    let captures = [table(num_points), table(num_points)];
    let to_play = rng.next_u64();
    ZobristKeys{
      stones:   stones,
      to_play:  to_play,
      ko_level: ko_level,
      captures: captures,
    }
  }

  #[inline]
  pub fn stone(&self, color_offset: usize, point: Point) -> u64 {
    self.stones[color_offset][point.idx()]
  }

  #[inline]
  pub fn to_play(&self) -> u64 {
    self.to_play
  }

  #[inline]
  pub fn ko_level(&self, level: u32) -> u64 {
    if level == 0 {
      0
    } else {
      self.ko_level[level as usize % NUM_KO_LEVEL_KEYS]
    }
  }

  #[inline]
  pub fn captures(&self, color_offset: usize, count: usize) -> u64 {
    if count == 0 {
      0
    } else {
      let table = &self.captures[color_offset];
      table[count % table.len()]
    }
  }
}

pub struct Topology {
  size:         usize,
  stride:       i16,
  num_points:   usize,
  nbr_offsets:  [i16; 4],
  diag_offsets: [i16; 4],
  on_board:     Vec<bool>,
  points:       Vec<Point>,
  line:         Vec<u8>,
  pos:          Vec<u8>,
  up:           Vec<i16>,
  all:              PointSet,
  corners:          PointSet,
  edges:            PointSet,
  side_extensions:  PointSet,
  center:           PointSet,
  line_points:  Vec<Vec<Point>>,
  zobrist:      ZobristKeys,
}

impl Topology {
  pub fn new(size: usize) -> Result<Topology, TopologyError> {
    if size < MIN_SIZE || size > MAX_SIZE {
      return Err(TopologyError::UnsupportedSize(size));
    }
    let stride = (size + 2) as i16;
    let num_points = (size + 2) * (size + 2);
    let max_line = (size + 1) / 2;

    let mut on_board = vec![false; num_points];
    let mut points = Vec::with_capacity(size * size);
    let mut line = vec![0_u8; num_points];
    let mut pos = vec![0_u8; num_points];
    let mut up = vec![0_i16; num_points];
    let mut all = PointSet::new();
    let mut corners = PointSet::new();
    let mut edges = PointSet::new();
    let mut side_extensions = PointSet::new();
    let mut center = PointSet::new();
    let mut line_points = vec![vec![]; max_line + 1];

    for y in 0 .. size {
      for x in 0 .. size {
        let point = Point(((y + 1) as i16) * stride + (x + 1) as i16);
        let p = point.idx();
        on_board[p] = true;
        points.push(point);
        all.insert(point);

        // Distances to the left, right, bottom and top edges, paired with
        // the direction pointing away from that edge.
        let dists = [
          (x, 1),
          (size - 1 - x, -1),
          (y, stride),
          (size - 1 - y, -stride),
        ];
        let mut sorted: Vec<usize> = dists.iter().map(|&(d, _)| d).collect();
        sorted.sort();
        let min_d = sorted[0];
        line[p] = (min_d + 1) as u8;
        pos[p] = (sorted[1] + 1) as u8;
        let closest: Vec<i16> = dists.iter().filter(|&&(d, _)| d == min_d).map(|&(_, dir)| dir).collect();
        up[p] = if closest.len() == 1 { closest[0] } else { 0 };

        let l = line[p];
        if l == 1 && pos[p] == 1 {
          corners.insert(point);
        } else if l == 1 {
          edges.insert(point);
        }
        if (l == 3 || l == 4) && pos[p] >= 5 {
          side_extensions.insert(point);
        }
        if l >= 5 {
          center.insert(point);
        }
        line_points[l as usize].push(point);
      }
    }

    Ok(Topology{
      size:         size,
      stride:       stride,
      num_points:   num_points,
      nbr_offsets:  [-stride, -1, 1, stride],
      diag_offsets: [-stride - 1, -stride + 1, stride - 1, stride + 1],
      on_board:     on_board,
      points:       points,
      line:         line,
      pos:          pos,
      up:           up,
      all:              all,
      corners:          corners,
      edges:            edges,
      side_extensions:  side_extensions,
      center:           center,
      line_points:  line_points,
      zobrist:      ZobristKeys::new(size, num_points),
    })
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.size
  }

  #[inline]
  pub fn stride(&self) -> i16 {
    self.stride
  }

  /// Number of cells in the padded grid, border included.
  #[inline]
  pub fn num_points(&self) -> usize {
    self.num_points
  }

  /// On-board points in increasing index order.
  #[inline]
  pub fn points(&self) -> &[Point] {
    &self.points
  }

  #[inline]
  pub fn is_on_board(&self, point: Point) -> bool {
    point.is_grid() && point.idx() < self.num_points && self.on_board[point.idx()]
  }

  #[inline]
  pub fn neighbor_offsets(&self) -> &[i16; 4] {
    &self.nbr_offsets
  }

  /// The four orthogonal neighbors, border cells included.
  #[inline]
  pub fn adjacent(&self, point: Point) -> [Point; 4] {
    let o = &self.nbr_offsets;
    [point.offset(o[0]), point.offset(o[1]), point.offset(o[2]), point.offset(o[3])]
  }

  pub fn for_each_adjacent<F>(&self, point: Point, mut f: F) where F: FnMut(Point) {
    for &delta in self.nbr_offsets.iter() {
      let adj_point = point.offset(delta);
      if self.on_board[adj_point.idx()] {
        f(adj_point);
      }
    }
  }

  pub fn for_each_diagonal<F>(&self, point: Point, mut f: F) where F: FnMut(Point) {
    for &delta in self.diag_offsets.iter() {
      let diag_point = point.offset(delta);
      if self.on_board[diag_point.idx()] {
        f(diag_point);
      }
    }
  }

  /// Distance from the nearest edge, counting the edge itself as line 1.
  #[inline]
  pub fn line(&self, point: Point) -> usize {
    self.line[point.idx()] as usize
  }

  /// Distance along the line to the nearest corner, 1-based.
  #[inline]
  pub fn pos(&self, point: Point) -> usize {
    self.pos[point.idx()] as usize
  }

  /// Offset stepping away from the closest edge, or 0 when two edges are
  /// equally close.
  #[inline]
  pub fn up(&self, point: Point) -> i16 {
    self.up[point.idx()]
  }

  pub fn max_line(&self) -> usize {
    self.line_points.len() - 1
  }

  pub fn line_points(&self, line: usize) -> &[Point] {
    match self.line_points.get(line) {
      Some(ps) => ps,
      None => &[],
    }
  }

  pub fn all_points(&self) -> &PointSet {
    &self.all
  }

  pub fn corners(&self) -> &PointSet {
    &self.corners
  }

  pub fn edges(&self) -> &PointSet {
    &self.edges
  }

  pub fn side_extensions(&self) -> &PointSet {
    &self.side_extensions
  }

  pub fn center(&self) -> &PointSet {
    &self.center
  }

  pub fn zobrist(&self) -> &ZobristKeys {
    &self.zobrist
  }

  pub fn point(&self, x: usize, y: usize) -> Option<Point> {
    if x >= self.size || y >= self.size {
      return None;
    }
    Some(Point(((y + 1) as i16) * self.stride + (x + 1) as i16))
  }

  pub fn point_from_coord(&self, coord: Coord) -> Option<Point> {
    self.point(coord.x as usize, coord.y as usize)
  }

  /// Parses a move code such as `D4` or `pass`.
  pub fn parse_point(&self, code: &str) -> Option<Point> {
    if code.eq_ignore_ascii_case("pass") {
      return Some(Point::PASS);
    }
    Coord::from_code(code.as_bytes()).and_then(|c| self.point_from_coord(c))
  }

  pub fn coord(&self, point: Point) -> Option<Coord> {
    if !self.is_on_board(point) {
      return None;
    }
    let stride = self.stride as usize;
    let p = point.idx();
    Some(Coord::new((p % stride - 1) as u8, (p / stride - 1) as u8))
  }

  pub fn point_to_string(&self, point: Point) -> String {
    if point.is_pass() {
      return "pass".to_string();
    }
    match self.coord(point) {
      Some(coord) => coord.to_string(),
      None => format!("?{}", point.0),
    }
  }

  /// Length of a dense evaluator policy vector: every point plus pass.
  #[inline]
  pub fn policy_len(&self) -> usize {
    self.size * self.size + 1
  }

  /// Dense row-major index used by the evaluator; pass is the last entry.
  #[inline]
  pub fn policy_idx(&self, point: Point) -> usize {
    if point.is_pass() {
      return self.size * self.size;
    }
    let stride = self.stride as usize;
    let p = point.idx();
    (p / stride - 1) * self.size + (p % stride - 1)
  }

  pub fn point_from_policy_idx(&self, idx: usize) -> Option<Point> {
    let n = self.size * self.size;
    if idx == n {
      Some(Point::PASS)
    } else if idx < n {
      self.point(idx % self.size, idx / self.size)
    } else {
      None
    }
  }
}

/// Shared cache of topologies keyed by board size. Each entry is built on
/// first request and immutable afterwards.
#[derive(Default)]
pub struct TopologyRegistry {
  cache:  RwLock<VecMap<Arc<Topology>>>,
}

impl TopologyRegistry {
  pub fn new() -> TopologyRegistry {
    TopologyRegistry{
      cache:  RwLock::new(VecMap::new()),
    }
  }

  pub fn get(&self, size: usize) -> Result<Arc<Topology>, TopologyError> {
    {
      let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
      if let Some(topo) = cache.get(size) {
        return Ok(topo.clone());
      }
    }
    let topo = Arc::new(Topology::new(size)?);
    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    // Another caller may have won the race; keep the first instance.
    let entry = cache.entry(size).or_insert(topo);
    Ok(entry.clone())
  }

  pub fn len(&self) -> usize {
    self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
