//! Incremental Go board with exact undo.
//!
//! `play` always applies a well-formed move, even one that breaks a game
//! rule; the rule outcome is reported through `last_move_illegal` and the
//! caller is expected to `undo` an illegal move. Malformed input (off-board
//! point, occupied point, wrong color) is rejected with a `BoardError` before
//! anything changes.

use crate::board::{Rules, KoRule, HashConfig, IllegalReason, Stone, Point};
use crate::point_set::{PointSet, Marker};
use crate::topology::{Topology, TopologyError, TopologyRegistry};
use self::blocks::{Block, BlockId, BlockList, NO_BLOCK};

use bit_vec::{BitVec};
use serde::{Deserialize, Serialize};
use thiserror::{Error};

use std::sync::{Arc};

pub mod blocks;
pub mod features;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BoardError {
  #[error(transparent)]
  Topology(#[from] TopologyError),
  #[error("point {0:?} is not on the board")]
  OutOfRange(Point),
  #[error("point {0:?} is occupied")]
  Occupied(Point),
  #[error("{0:?} is not a player color")]
  BadColor(Stone),
  #[error("expected {expected:?} to play, got {got:?}")]
  WrongTurn{expected: Stone, got: Stone},
  #[error("move history is full ({0} moves)")]
  HistoryFull(usize),
  #[error("no move to undo")]
  EmptyHistory,
  #[error("bad snapshot: {0}")]
  Snapshot(String),
}

/// How the stone at the played point relates to the blocks it touched.
#[derive(Clone, Debug)]
enum Joined {
  Pass,
  Created,
  Extended{libs: Vec<Point>, anchor: Point},
  Merged{blocks: Vec<Block>},
}

#[derive(Clone, Debug)]
struct UndoEntry {
  point:            Point,
  color:            Stone,
  prev_to_play:     Stone,
  prev_ko:          Option<(Stone, Point)>,
  prev_ko_level:    u32,
  prev_hash:        u64,
  prev_extra_hash:  u64,
  prev_prisoners:   [usize; 2],
  was_first:        bool,
  joined:           Joined,
  captured:         Vec<Block>,
  suicide:          Option<Block>,
  illegal:          Option<IllegalReason>,
}

impl UndoEntry {
  fn is_pass(&self) -> bool {
    self.point.is_pass()
  }
}

#[derive(Clone)]
pub struct Board {
  topo:         Arc<Topology>,
  rules:        Rules,
  hash_cfg:     HashConfig,
  stones:       Vec<Stone>,
  block_of:     Vec<BlockId>,
  blocks:       BlockList,
  nb_empty:     Vec<u8>,
  nb_color:     [Vec<u8>; 2],
  num_stones:   [usize; 2],
  prisoners:    [usize; 2],
  to_play:      Stone,
  initial_to_play:  Stone,
  ko:           Option<(Stone, Point)>,
  ko_level:     u32,
  hash:         u64,
  extra_hash:   u64,
  first_play:   BitVec,
  history:      Vec<UndoEntry>,
  max_history:  usize,
  marker:       Marker,
}

impl Board {
  pub fn new(topo: Arc<Topology>, rules: Rules) -> Board {
    Board::with_hash_config(topo, rules, HashConfig::default())
  }

  pub fn with_hash_config(topo: Arc<Topology>, rules: Rules, hash_cfg: HashConfig) -> Board {
    let num_points = topo.num_points();
    let size = topo.size();
    let mut board = Board{
      topo:         topo,
      rules:        rules,
      hash_cfg:     hash_cfg,
      stones:       vec![Stone::Border; num_points],
      block_of:     vec![NO_BLOCK; num_points],
      blocks:       BlockList::with_capacity(size * size),
      nb_empty:     vec![0; num_points],
      nb_color:     [vec![0; num_points], vec![0; num_points]],
      num_stones:   [0, 0],
      prisoners:    [0, 0],
      to_play:      Stone::Black,
      initial_to_play:  Stone::Black,
      ko:           None,
      ko_level:     0,
      hash:         0,
      extra_hash:   0,
      first_play:   BitVec::from_elem(num_points, true),
      history:      Vec::with_capacity(3 * size * size),
      max_history:  3 * size * size,
      marker:       Marker::new(),
    };
    board.clear();
    board
  }

  /// Convenience constructor going through a registry.
  pub fn with_size(registry: &TopologyRegistry, size: usize, rules: Rules) -> Result<Board, BoardError> {
    let topo = registry.get(size)?;
    Ok(Board::new(topo, rules))
  }

  pub fn clear(&mut self) {
    for s in self.stones.iter_mut() {
      *s = Stone::Border;
    }
    for b in self.block_of.iter_mut() {
      *b = NO_BLOCK;
    }
    for n in self.nb_empty.iter_mut() {
      *n = 0;
    }
    for c in 0 .. 2 {
      for n in self.nb_color[c].iter_mut() {
        *n = 0;
      }
    }
    let topo = self.topo.clone();
    for &point in topo.points() {
      self.stones[point.idx()] = Stone::Empty;
    }
    for &point in topo.points() {
      let mut n = 0;
      topo.for_each_adjacent(point, |_| n += 1);
      self.nb_empty[point.idx()] = n;
    }
    self.blocks.clear();
    self.num_stones = [0, 0];
    self.prisoners = [0, 0];
    self.to_play = Stone::Black;
    self.initial_to_play = Stone::Black;
    self.ko = None;
    self.ko_level = 0;
    self.hash = 0;
    self.extra_hash = 0;
    self.first_play.set_all();
    self.history.clear();
  }

  pub fn topology(&self) -> &Arc<Topology> {
    &self.topo
  }

  pub fn size(&self) -> usize {
    self.topo.size()
  }

  pub fn rules(&self) -> &Rules {
    &self.rules
  }

  pub fn set_rules(&mut self, rules: Rules) {
    self.rules = rules;
  }

  pub fn hash_config(&self) -> HashConfig {
    self.hash_cfg
  }

  #[inline]
  pub fn to_play(&self) -> Stone {
    self.to_play
  }

  /// Overrides the side to move, for setup and handicap placement.
  pub fn set_to_play(&mut self, color: Stone) -> Result<(), BoardError> {
    if !color.is_color() {
      return Err(BoardError::BadColor(color));
    }
    self.to_play = color;
    if self.history.is_empty() {
      self.initial_to_play = color;
    }
    Ok(())
  }

  #[inline]
  pub fn stone(&self, point: Point) -> Stone {
    if point.is_grid() && point.idx() < self.stones.len() {
      self.stones[point.idx()]
    } else {
      Stone::Border
    }
  }

  /// Zero for anything but `Black` and `White`.
  pub fn num_stones(&self, color: Stone) -> usize {
    if !color.is_color() {
      return 0;
    }
    self.num_stones[color.offset()]
  }

  /// Number of `color` stones captured so far.
  pub fn num_prisoners(&self, color: Stone) -> usize {
    if !color.is_color() {
      return 0;
    }
    self.prisoners[color.offset()]
  }

  /// The point the side to move may not play because of ko, if any.
  pub fn ko_point(&self) -> Option<Point> {
    match self.ko {
      Some((color, point)) if color == self.to_play => Some(point),
      _ => None,
    }
  }

  pub fn ko_level(&self) -> u32 {
    self.ko_level
  }

  /// Zobrist hash of the stone placement alone.
  #[inline]
  pub fn hash(&self) -> u64 {
    self.hash
  }

  /// Hash including the side to move and the optional components selected
  /// by the `HashConfig`.
  pub fn full_hash(&self) -> u64 {
    let mut h = self.hash ^ self.extra_hash;
    if self.to_play == Stone::White {
      h ^= self.topo.zobrist().to_play();
    }
    h
  }

  /// Stone hash computed from scratch.
  pub fn recompute_hash(&self) -> u64 {
    let zobrist = self.topo.zobrist();
    let mut h = 0;
    for &point in self.topo.points() {
      let stone = self.stones[point.idx()];
      if stone.is_color() {
        h ^= zobrist.stone(stone.offset(), point);
      }
    }
    h
  }

  /// Whether no stone has been placed on `point` since the last reset.
  pub fn is_first_play(&self, point: Point) -> bool {
    self.first_play.get(point.idx()).unwrap_or(false)
  }

  #[inline]
  fn block_at(&self, point: Point) -> Option<&Block> {
    if !self.topo.is_on_board(point) {
      return None;
    }
    let id = self.block_of[point.idx()];
    if id == NO_BLOCK {
      None
    } else {
      Some(self.blocks.get(id))
    }
  }

  pub fn num_liberties(&self, point: Point) -> usize {
    self.block_at(point).map_or(0, |b| b.num_libs())
  }

  pub fn liberties(&self, point: Point) -> &[Point] {
    match self.block_at(point) {
      Some(b) => &b.libs,
      None => &[],
    }
  }

  pub fn in_atari(&self, point: Point) -> bool {
    self.block_at(point).map_or(false, |b| b.num_libs() == 1)
  }

  pub fn anchor_of(&self, point: Point) -> Option<Point> {
    self.block_at(point).map(|b| b.anchor)
  }

  pub fn block_stones(&self, point: Point) -> &[Point] {
    match self.block_at(point) {
      Some(b) => &b.stones,
      None => &[],
    }
  }

  pub fn block_point_set(&self, point: Point) -> PointSet {
    PointSet::from_points(self.block_stones(point).iter().cloned())
  }

  pub fn point_set_of(&self, stone: Stone) -> PointSet {
    PointSet::from_points(self.topo.points().iter().cloned().filter(|&p| self.stones[p.idx()] == stone))
  }

  /// Anchors of all blocks on the board, in point order.
  pub fn block_anchors(&self) -> Vec<Point> {
    let mut anchors: Vec<Point> = self.blocks.iter_live().map(|b| b.anchor).collect();
    anchors.sort();
    anchors
  }

  pub fn num_blocks(&self) -> usize {
    self.blocks.num_live()
  }

  #[inline]
  pub fn num_empty_neighbors(&self, point: Point) -> usize {
    if !point.is_grid() {
      return 0;
    }
    self.nb_empty[point.idx()] as usize
  }

  #[inline]
  pub fn num_neighbors(&self, point: Point, color: Stone) -> usize {
    if !point.is_grid() {
      return 0;
    }
    match color {
      Stone::Empty => self.nb_empty[point.idx()] as usize,
      Stone::Black | Stone::White => self.nb_color[color.offset()][point.idx()] as usize,
      Stone::Border => {
        let mut n = 0;
        for &adj_point in self.topo.adjacent(point).iter() {
          if self.stones[adj_point.idx()] == Stone::Border {
            n += 1;
          }
        }
        n
      }
    }
  }

  pub fn history_len(&self) -> usize {
    self.history.len()
  }

  pub fn max_history(&self) -> usize {
    self.max_history
  }

  pub fn is_history_full(&self) -> bool {
    self.history.len() >= self.max_history
  }

  pub fn moves<'a>(&'a self) -> impl Iterator<Item=(Point, Stone)> + 'a {
    self.history.iter().map(|e| (e.point, e.color))
  }

  pub fn last_move(&self) -> Option<(Point, Stone)> {
    self.history.last().map(|e| (e.point, e.color))
  }

  pub fn last_move_illegal(&self) -> Option<IllegalReason> {
    self.history.last().and_then(|e| e.illegal)
  }

  pub fn last_move_was_illegal(&self) -> bool {
    self.last_move_illegal().is_some()
  }

  pub fn last_move_was_suicide(&self) -> bool {
    self.history.last().map_or(false, |e| e.suicide.is_some())
  }

  /// Opponent stones removed by the last move.
  pub fn captured_stones(&self) -> Vec<Point> {
    match self.history.last() {
      Some(e) => e.captured.iter().flat_map(|b| b.stones.iter().cloned()).collect(),
      None => vec![],
    }
  }

  /// Two passes in a row end the game.
  pub fn is_game_over(&self) -> bool {
    let n = self.history.len();
    n >= 2 && self.history[n - 1].is_pass() && self.history[n - 2].is_pass()
  }

  fn validate(&self, point: Point, color: Stone) -> Result<(), BoardError> {
    if !color.is_color() {
      return Err(BoardError::BadColor(color));
    }
    if !point.is_pass() {
      if !self.topo.is_on_board(point) {
        return Err(BoardError::OutOfRange(point));
      }
      if self.stones[point.idx()] != Stone::Empty {
        return Err(BoardError::Occupied(point));
      }
    }
    if self.history.len() >= self.max_history {
      return Err(BoardError::HistoryFull(self.max_history));
    }
    Ok(())
  }

  /// Plays `color` at `point` (or passes). The move is applied even if it
  /// breaks a rule; check `last_move_was_illegal` afterwards.
  pub fn play(&mut self, point: Point, color: Stone) -> Result<(), BoardError> {
    if color.is_color() && color != self.to_play {
      return Err(BoardError::WrongTurn{expected: self.to_play, got: color});
    }
    self.validate(point, color)?;
    self.apply(point, color);
    Ok(())
  }

  pub fn play_move(&mut self, point: Point) -> Result<(), BoardError> {
    let color = self.to_play;
    self.play(point, color)
  }

  /// Plays and keeps the move only if it is legal. Returns the rule that
  /// was broken otherwise, leaving the board unchanged.
  pub fn try_play(&mut self, point: Point) -> Result<Option<IllegalReason>, BoardError> {
    self.play_move(point)?;
    match self.last_move_illegal() {
      Some(reason) => {
        self.undo()?;
        Ok(Some(reason))
      }
      None => Ok(None),
    }
  }

  fn set_ko_level(&mut self, level: u32) {
    if self.hash_cfg.ko_level {
      let zobrist = self.topo.zobrist();
      self.extra_hash ^= zobrist.ko_level(self.ko_level) ^ zobrist.ko_level(level);
    }
    self.ko_level = level;
  }

  fn add_prisoners(&mut self, color: Stone, n: usize) {
    let c = color.offset();
    let prev = self.prisoners[c];
    if self.hash_cfg.captures {
      let zobrist = self.topo.zobrist();
      self.extra_hash ^= zobrist.captures(c, prev) ^ zobrist.captures(c, prev + n);
    }
    self.prisoners[c] = prev + n;
  }

  fn place_stone(&mut self, point: Point, color: Stone) {
    let p = point.idx();
    let c = color.offset();
    self.stones[p] = color;
    self.num_stones[c] += 1;
    self.hash ^= self.topo.zobrist().stone(c, point);
    for &adj_point in self.topo.adjacent(point).iter() {
      let a = adj_point.idx();
      if self.stones[a] != Stone::Border {
        self.nb_empty[a] -= 1;
        self.nb_color[c][a] += 1;
      }
    }
  }

  fn remove_stone(&mut self, point: Point) {
    let p = point.idx();
    let color = self.stones[p];
    let c = color.offset();
    self.stones[p] = Stone::Empty;
    self.block_of[p] = NO_BLOCK;
    self.num_stones[c] -= 1;
    self.hash ^= self.topo.zobrist().stone(c, point);
    for &adj_point in self.topo.adjacent(point).iter() {
      let a = adj_point.idx();
      if self.stones[a] != Stone::Border {
        self.nb_empty[a] += 1;
        self.nb_color[c][a] -= 1;
      }
    }
  }

  /// Takes a block off the board. Its stones become liberties of the
  /// surrounding blocks and count as prisoners.
  fn kill_block(&mut self, id: BlockId) -> Block {
    let block = self.blocks.take(id);
    let opp = block.color.opponent();
    for &point in block.stones.iter() {
      self.remove_stone(point);
    }
    for &point in block.stones.iter() {
      for &adj_point in self.topo.adjacent(point).iter() {
        let a = adj_point.idx();
        if self.stones[a] == opp && self.block_of[a] != NO_BLOCK {
          self.blocks.get_mut(self.block_of[a]).add_lib(point);
        }
      }
    }
    self.add_prisoners(block.color, block.stones.len());
    block
  }

  /// Reverse of `kill_block`, with the liberties the block had before it was
  /// killed.
  fn revive_block(&mut self, mut block: Block, libs: Vec<Point>) {
    let color = block.color;
    let opp = color.opponent();
    block.libs = libs;
    for &point in block.stones.iter() {
      self.place_stone(point, color);
    }
    let stones = block.stones.clone();
    let id = self.blocks.alloc(block);
    for &point in stones.iter() {
      self.block_of[point.idx()] = id;
    }
    for &point in stones.iter() {
      for &adj_point in self.topo.adjacent(point).iter() {
        let a = adj_point.idx();
        if self.stones[a] == opp && self.block_of[a] != NO_BLOCK {
          self.blocks.get_mut(self.block_of[a]).remove_lib(point);
        }
      }
    }
  }

  fn relink_block(&mut self, block: Block) -> BlockId {
    let stones = block.stones.clone();
    let id = self.blocks.alloc(block);
    for &point in stones.iter() {
      self.block_of[point.idx()] = id;
    }
    id
  }

  fn adjacent_blocks(&self, point: Point, color: Stone) -> Vec<BlockId> {
    let mut ids = Vec::with_capacity(4);
    for &adj_point in self.topo.adjacent(point).iter() {
      let a = adj_point.idx();
      if self.stones[a] == color {
        let id = self.block_of[a];
        if !ids.contains(&id) {
          ids.push(id);
        }
      }
    }
    ids
  }

  /// Links the new stone at `point` into the blocks around it.
  fn join(&mut self, point: Point, color: Stone) -> Joined {
    let own_ids = self.adjacent_blocks(point, color);
    let adj_points = self.topo.adjacent(point);
    match own_ids.len() {
      0 => {
        let libs: Vec<Point> = adj_points.iter().cloned()
          .filter(|p| self.stones[p.idx()] == Stone::Empty)
          .collect();
        let id = self.blocks.alloc(Block::single(color, point, libs));
        self.block_of[point.idx()] = id;
        Joined::Created
      }
      1 => {
        let id = own_ids[0];
        let (saved_libs, saved_anchor) = {
          let block = self.blocks.get(id);
          (block.libs.clone(), block.anchor)
        };
        let empty_adj: Vec<Point> = adj_points.iter().cloned()
          .filter(|p| self.stones[p.idx()] == Stone::Empty)
          .collect();
        {
          let block = self.blocks.get_mut(id);
          block.stones.push(point);
          block.remove_lib(point);
          for &lib in empty_adj.iter() {
            block.add_lib(lib);
          }
          if point < block.anchor {
            block.anchor = point;
          }
        }
        self.block_of[point.idx()] = id;
        Joined::Extended{libs: saved_libs, anchor: saved_anchor}
      }
      _ => {
        let mut saved = Vec::with_capacity(own_ids.len());
        for &id in own_ids.iter() {
          saved.push(self.blocks.take(id));
        }
        let mut merged = Block::single(color, point, vec![]);
        for block in saved.iter() {
          merged.stones.extend_from_slice(&block.stones);
          if block.anchor < merged.anchor {
            merged.anchor = block.anchor;
          }
        }
        self.marker.clear();
        for &stone in merged.stones.iter() {
          for &adj_point in self.topo.adjacent(stone).iter() {
            if self.stones[adj_point.idx()] == Stone::Empty && self.marker.mark(adj_point) {
              merged.libs.push(adj_point);
            }
          }
        }
        self.relink_block(merged);
        Joined::Merged{blocks: saved}
      }
    }
  }

  /// Whether the current stone placement, with `next_to_play` to move under
  /// situational superko, occurred before the last move or anywhere in the
  /// history.
  fn is_repetition(&self, pre_move_hash: u64, pre_move_to_play: Stone, next_to_play: Stone) -> bool {
    let situational = self.rules.ko_rule == KoRule::SituationalSuperko;
    if self.hash == pre_move_hash && (!situational || pre_move_to_play == next_to_play) {
      return true;
    }
    // XXX: Walks the whole history in the worst case.
    for entry in self.history.iter().rev() {
      if entry.prev_hash == self.hash && (!situational || entry.prev_to_play == next_to_play) {
        return true;
      }
    }
    false
  }

  fn apply(&mut self, point: Point, color: Stone) {
    let opp = color.opponent();
    let mut entry = UndoEntry{
      point:            point,
      color:            color,
      prev_to_play:     self.to_play,
      prev_ko:          self.ko,
      prev_ko_level:    self.ko_level,
      prev_hash:        self.hash,
      prev_extra_hash:  self.extra_hash,
      prev_prisoners:   self.prisoners,
      was_first:        false,
      joined:           Joined::Pass,
      captured:         vec![],
      suicide:          None,
      illegal:          None,
    };

    if point.is_pass() {
      self.ko = None;
      self.to_play = opp;
      self.history.push(entry);
      return;
    }

    let p = point.idx();
    if let Some((ko_color, ko_point)) = self.ko {
      if ko_color == color && ko_point == point {
        if self.rules.allow_ko_repetition {
          let level = self.ko_level + 1;
          self.set_ko_level(level);
        } else {
          entry.illegal = Some(IllegalReason::Ko);
        }
      }
    }
    entry.was_first = self.first_play.get(p).unwrap_or(false);
    self.first_play.set(p, false);

    self.place_stone(point, color);

    // Opposing blocks lose the liberty; those left with none are captured.
    for id in self.adjacent_blocks(point, opp) {
      let dead = {
        let block = self.blocks.get_mut(id);
        block.remove_lib(point);
        block.libs.is_empty()
      };
      if dead {
        let block = self.kill_block(id);
        entry.captured.push(block);
      }
    }

    entry.joined = self.join(point, color);

    let own_id = self.block_of[p];
    if self.blocks.get(own_id).libs.is_empty() {
      if self.rules.allows_suicide() {
        let block = self.kill_block(own_id);
        entry.suicide = Some(block);
      } else if entry.illegal.is_none() {
        entry.illegal = Some(IllegalReason::Suicide);
      }
    }

    self.ko = None;
    if entry.suicide.is_none() && entry.captured.len() == 1 && entry.captured[0].num_stones() == 1 {
      let block = self.blocks.get(own_id);
      if block.num_stones() == 1 && block.num_libs() == 1 {
        self.ko = Some((opp, block.libs[0]));
      }
    }

    if entry.illegal.is_none() && self.rules.is_superko() && !self.rules.allow_ko_repetition {
      // A stone on a never-played point gives a new position, unless the
      // stone itself was removed again by suicide.
      if !entry.was_first || entry.suicide.is_some() {
        if self.is_repetition(entry.prev_hash, entry.prev_to_play, opp) {
          entry.illegal = Some(IllegalReason::Superko);
        }
      }
    }

    self.to_play = opp;
    self.history.push(entry);
  }

  /// Reverses the most recent `play`.
  pub fn undo(&mut self) -> Result<(), BoardError> {
    let entry = match self.history.pop() {
      Some(entry) => entry,
      None => return Err(BoardError::EmptyHistory),
    };
    let UndoEntry{
      point, color,
      prev_to_play, prev_ko, prev_ko_level, prev_hash, prev_extra_hash, prev_prisoners,
      was_first, joined, captured, suicide, ..
    } = entry;

    if !point.is_pass() {
      let p = point.idx();
      let opp = color.opponent();

      if let Some(block) = suicide {
        self.revive_block(block, vec![]);
      }

      let own_id = self.block_of[p];
      match joined {
        Joined::Pass => {}
        Joined::Created => {
          self.blocks.take(own_id);
        }
        Joined::Extended{libs, anchor} => {
          let block = self.blocks.get_mut(own_id);
          let last = block.stones.pop();
          debug_assert_eq!(last, Some(point));
          block.libs = libs;
          block.anchor = anchor;
        }
        Joined::Merged{blocks} => {
          self.blocks.take(own_id);
          for block in blocks {
            self.relink_block(block);
          }
        }
      }
      self.block_of[p] = NO_BLOCK;

      for block in captured.into_iter().rev() {
        self.revive_block(block, vec![point]);
      }

      self.remove_stone(point);
      for id in self.adjacent_blocks(point, opp) {
        self.blocks.get_mut(id).add_lib(point);
      }
      self.first_play.set(p, was_first);
    }

    debug_assert_eq!(self.hash, prev_hash);
    self.to_play = prev_to_play;
    self.ko = prev_ko;
    self.ko_level = prev_ko_level;
    self.hash = prev_hash;
    self.extra_hash = prev_extra_hash;
    self.prisoners = prev_prisoners;
    Ok(())
  }

  /// Quick legality answer from local information only. `None` means a
  /// full-board repetition check is needed.
  fn check_legal_simple(&self, point: Point, color: Stone) -> Option<bool> {
    if point.is_pass() {
      return Some(true);
    }
    if !self.topo.is_on_board(point) || self.stones[point.idx()] != Stone::Empty {
      return Some(false);
    }
    if !self.rules.allow_ko_repetition {
      if let Some((ko_color, ko_point)) = self.ko {
        if ko_color == color && ko_point == point {
          return Some(false);
        }
      }
    }
    let suicide = self.is_suicide(point, color);
    if suicide && !self.rules.allows_suicide() {
      return Some(false);
    }
    if !self.rules.is_superko() || self.rules.allow_ko_repetition {
      return Some(true);
    }
    if self.first_play.get(point.idx()).unwrap_or(false) && !suicide {
      return Some(true);
    }
    None
  }

  /// Whether playing at the empty `point` would leave `color` without
  /// liberties, captures included.
  pub fn is_suicide(&self, point: Point, color: Stone) -> bool {
    if self.nb_empty[point.idx()] > 0 {
      return false;
    }
    let opp = color.opponent();
    for &adj_point in self.topo.adjacent(point).iter() {
      let a = adj_point.idx();
      let stone = self.stones[a];
      if stone == color {
        if self.blocks.get(self.block_of[a]).num_libs() > 1 {
          return false;
        }
      } else if stone == opp {
        if self.blocks.get(self.block_of[a]).num_libs() == 1 {
          return false;
        }
      }
    }
    true
  }

  /// Full legality under the active rules. Superko positions are decided by
  /// playing the move and taking it back, which leaves the board exactly as
  /// it was.
  pub fn is_legal(&mut self, point: Point, color: Stone) -> bool {
    if !color.is_color() {
      return false;
    }
    if let Some(legal) = self.check_legal_simple(point, color) {
      return legal;
    }
    if self.history.len() >= self.max_history {
      return false;
    }
    self.apply(point, color);
    let legal = !self.last_move_was_illegal();
    // The history cannot be empty right after `apply`.
    let _ = self.undo();
    legal
  }

  /// Legal moves for the side to move; pass is always last.
  pub fn legal_moves(&mut self) -> Vec<Point> {
    let color = self.to_play;
    let topo = self.topo.clone();
    let mut moves = Vec::with_capacity(topo.points().len() + 1);
    for &point in topo.points() {
      if self.stones[point.idx()] == Stone::Empty && self.is_legal(point, color) {
        moves.push(point);
      }
    }
    moves.push(Point::PASS);
    moves
  }

  /// A point is "eyeish" for a stone if it is surrounded on all sides by
  /// that stone, and the surrounding blocks have at least 2 liberties.
  pub fn is_eyeish(&self, point: Point, stone: Stone) -> bool {
    for &adj_point in self.topo.adjacent(point).iter() {
      let a = adj_point.idx();
      match self.stones[a] {
        Stone::Border => {}
        s if s == stone => {
          if self.blocks.get(self.block_of[a]).num_libs() <= 1 {
            return false;
          }
        }
        _ => return false,
      }
    }
    true
  }

  /// The "2/4" rule: an eyeish point with fewer than two opposing diagonals
  /// (one on the edge). Misses some true eyes.
  pub fn is_eyelike(&self, point: Point, stone: Stone) -> bool {
    if !self.is_eyeish(point, stone) {
      return false;
    }
    let opp = stone.opponent();
    let mut false_count = if self.topo.line(point) == 1 { 1 } else { 0 };
    self.topo.for_each_diagonal(point, |diag_point| {
      if self.stones[diag_point.idx()] == opp {
        false_count += 1;
      }
    });
    false_count < 2
  }

  /// Tromp-Taylor area score from Black's point of view: stones plus empty
  /// regions reaching only one color, minus komi.
  pub fn score_area(&mut self, komi: f32) -> f32 {
    let topo = self.topo.clone();
    let mut area = [self.num_stones[0] as i32, self.num_stones[1] as i32];
    self.marker.clear();
    let mut stack = vec![];
    for &seed in topo.points() {
      if self.stones[seed.idx()] != Stone::Empty || !self.marker.mark(seed) {
        continue;
      }
      let mut region = 0;
      let mut reaches = [false, false];
      stack.clear();
      stack.push(seed);
      while let Some(point) = stack.pop() {
        region += 1;
        for &adj_point in topo.adjacent(point).iter() {
          match self.stones[adj_point.idx()] {
            Stone::Empty => {
              if self.marker.mark(adj_point) {
                stack.push(adj_point);
              }
            }
            Stone::Black => reaches[0] = true,
            Stone::White => reaches[1] = true,
            Stone::Border => {}
          }
        }
      }
      match (reaches[0], reaches[1]) {
        (true, false) => area[0] += region,
        (false, true) => area[1] += region,
        _ => {}
      }
    }
    (area[0] - area[1]) as f32 - komi
  }

  pub fn snapshot(&self) -> BoardSnapshot {
    BoardSnapshot{
      size:             self.topo.size(),
      rules:            self.rules,
      hash_config:      self.hash_cfg,
      initial_to_play:  self.initial_to_play,
      moves:            self.moves().collect(),
    }
  }

  /// Rebuilds a board by replaying a snapshot's moves.
  pub fn restore(registry: &TopologyRegistry, snapshot: &BoardSnapshot) -> Result<Board, BoardError> {
    let topo = registry.get(snapshot.size)?;
    let mut board = Board::with_hash_config(topo, snapshot.rules, snapshot.hash_config);
    board.set_to_play(snapshot.initial_to_play)?;
    for &(point, color) in snapshot.moves.iter() {
      board.validate(point, color)?;
      board.to_play = color;
      board.apply(point, color);
    }
    Ok(board)
  }

  pub fn to_debug_strings(&self) -> Vec<String> {
    let size = self.topo.size();
    let mut strs = Vec::with_capacity(size);
    for y in (0 .. size).rev() {
      let mut s = String::with_capacity(size);
      for x in 0 .. size {
        let ch = match self.topo.point(x, y) {
          Some(point) if self.ko_point() == Some(point) => '*',
          Some(point) => self.stones[point.idx()].to_char(),
          None => '?',
        };
        s.push(ch);
      }
      strs.push(s);
    }
    strs
  }
}

/// A position as the rules, the side to move at the start, and the moves
/// played since.
#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
pub struct BoardSnapshot {
  pub size:             usize,
  pub rules:            Rules,
  pub hash_config:      HashConfig,
  pub initial_to_play:  Stone,
  pub moves:            Vec<(Point, Stone)>,
}

impl BoardSnapshot {
  pub fn to_bytes(&self) -> Result<Vec<u8>, BoardError> {
    bincode::serialize(self).map_err(|e| BoardError::Snapshot(e.to_string()))
  }

  pub fn from_bytes(bytes: &[u8]) -> Result<BoardSnapshot, BoardError> {
    bincode::deserialize(bytes).map_err(|e| BoardError::Snapshot(e.to_string()))
  }
}
