use crate::board::{Stone, Point};

use std::mem::{replace};

pub type BlockId = u16;

pub const NO_BLOCK: BlockId = BlockId::MAX;

/// A maximal group of 4-connected stones of one color.
#[derive(Clone, Debug)]
pub struct Block {
  pub color:  Stone,
  /// Smallest point in the block.
  pub anchor: Point,
  pub stones: Vec<Point>,
  /// Distinct empty points adjacent to the block.
  pub libs:   Vec<Point>,
}

impl Default for Block {
  fn default() -> Block {
    Block{
      color:  Stone::Empty,
      anchor: Point::NONE,
      stones: vec![],
      libs:   vec![],
    }
  }
}

impl Block {
  pub fn single(color: Stone, point: Point, libs: Vec<Point>) -> Block {
    Block{
      color:  color,
      anchor: point,
      stones: vec![point],
      libs:   libs,
    }
  }

  #[inline]
  pub fn num_stones(&self) -> usize {
    self.stones.len()
  }

  #[inline]
  pub fn num_libs(&self) -> usize {
    self.libs.len()
  }

  #[inline]
  pub fn has_lib(&self, point: Point) -> bool {
    self.libs.contains(&point)
  }

  pub fn add_lib(&mut self, point: Point) -> bool {
    if self.has_lib(point) {
      false
    } else {
      self.libs.push(point);
      true
    }
  }

  pub fn remove_lib(&mut self, point: Point) -> bool {
    match self.libs.iter().position(|&lib| lib == point) {
      Some(j) => {
        self.libs.swap_remove(j);
        true
      }
      None => false,
    }
  }
}

/// Slot storage for blocks. Freed slots are recycled, so a `BlockId` is only
/// meaningful while the block is live.
#[derive(Clone, Default)]
pub struct BlockList {
  slots:  Vec<Block>,
  free:   Vec<BlockId>,
}

impl BlockList {
  pub fn with_capacity(n: usize) -> BlockList {
    BlockList{
      slots:  Vec::with_capacity(n),
      free:   Vec::with_capacity(n),
    }
  }

  pub fn clear(&mut self) {
    self.slots.clear();
    self.free.clear();
  }

  pub fn alloc(&mut self, block: Block) -> BlockId {
    match self.free.pop() {
      Some(id) => {
        self.slots[id as usize] = block;
        id
      }
      None => {
        self.slots.push(block);
        (self.slots.len() - 1) as BlockId
      }
    }
  }

  /// Removes a block and hands it back to the caller.
  pub fn take(&mut self, id: BlockId) -> Block {
    self.free.push(id);
    replace(&mut self.slots[id as usize], Block::default())
  }

  #[inline]
  pub fn get(&self, id: BlockId) -> &Block {
    &self.slots[id as usize]
  }

  #[inline]
  pub fn get_mut(&mut self, id: BlockId) -> &mut Block {
    &mut self.slots[id as usize]
  }

  pub fn num_live(&self) -> usize {
    self.slots.len() - self.free.len()
  }

  pub fn iter_live<'a>(&'a self) -> impl Iterator<Item=&'a Block> + 'a {
    self.slots.iter().filter(|b| b.color.is_color())
  }
}
