use crate::board::{Point};

use std::ops::{Range};
use std::sync::atomic::{AtomicI16, AtomicU8, AtomicU32, AtomicU64, Ordering};

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct NodeId(pub u32);

impl NodeId {
  #[inline]
  pub fn idx(self) -> usize {
    self.0 as usize
  }
}

const NO_PARENT: u32 = u32::MAX;

const STATE_LEAF:       u8 = 0;
const STATE_EXPANDING:  u8 = 1;
const STATE_EXPANDED:   u8 = 2;

fn atomic_add_f64(x: &AtomicU64, delta: f64) {
  let mut prev = x.load(Ordering::Relaxed);
  loop {
    let next = (f64::from_bits(prev) + delta).to_bits();
    match x.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed) {
      Ok(_) => return,
      Err(curr) => prev = curr,
    }
  }
}

/// A search node. Every field is atomic so nodes can be read while other
/// threads update statistics; the move, prior and parent are written once
/// before the node is published through its parent.
///
/// `mean` is from the point of view of the player who made `mv`.
pub struct Node {
  mv:           AtomicI16,
  prior:        AtomicU32,
  parent:       AtomicU32,
  first_child:  AtomicU32,
  num_children: AtomicU32,
  state:        AtomicU8,
  visits:       AtomicU32,
  value_sum:    AtomicU64,
  value_sq_sum: AtomicU64,
  virtual_loss: AtomicU32,
}

impl Node {
  pub(crate) fn empty() -> Node {
    Node{
      mv:           AtomicI16::new(Point::NONE.0),
      prior:        AtomicU32::new(0),
      parent:       AtomicU32::new(NO_PARENT),
      first_child:  AtomicU32::new(0),
      num_children: AtomicU32::new(0),
      state:        AtomicU8::new(STATE_LEAF),
      visits:       AtomicU32::new(0),
      value_sum:    AtomicU64::new(0),
      value_sq_sum: AtomicU64::new(0),
      virtual_loss: AtomicU32::new(0),
    }
  }

  pub(crate) fn init(&self, mv: Point, prior: f32, parent: Option<NodeId>) {
    self.mv.store(mv.0, Ordering::Relaxed);
    self.prior.store(prior.to_bits(), Ordering::Relaxed);
    self.parent.store(parent.map_or(NO_PARENT, |p| p.0), Ordering::Relaxed);
    self.first_child.store(0, Ordering::Relaxed);
    self.num_children.store(0, Ordering::Relaxed);
    self.state.store(STATE_LEAF, Ordering::Relaxed);
    self.visits.store(0, Ordering::Relaxed);
    self.value_sum.store(0.0_f64.to_bits(), Ordering::Relaxed);
    self.value_sq_sum.store(0.0_f64.to_bits(), Ordering::Relaxed);
    self.virtual_loss.store(0, Ordering::Relaxed);
  }

  /// Copies move, prior and statistics of `src`; children are not copied.
  pub(crate) fn init_from(&self, src: &Node, parent: Option<NodeId>) {
    self.init(src.mv(), src.prior(), parent);
    self.visits.store(src.visits(), Ordering::Relaxed);
    self.value_sum.store(src.value_sum.load(Ordering::Relaxed), Ordering::Relaxed);
    self.value_sq_sum.store(src.value_sq_sum.load(Ordering::Relaxed), Ordering::Relaxed);
  }

  #[inline]
  pub fn mv(&self) -> Point {
    Point(self.mv.load(Ordering::Relaxed))
  }

  #[inline]
  pub fn prior(&self) -> f32 {
    f32::from_bits(self.prior.load(Ordering::Relaxed))
  }

  pub(crate) fn set_prior(&self, prior: f32) {
    self.prior.store(prior.to_bits(), Ordering::Relaxed);
  }

  pub fn parent(&self) -> Option<NodeId> {
    match self.parent.load(Ordering::Relaxed) {
      NO_PARENT => None,
      p => Some(NodeId(p)),
    }
  }

  #[inline]
  pub fn visits(&self) -> u32 {
    self.visits.load(Ordering::Relaxed)
  }

  pub fn value_sum(&self) -> f64 {
    f64::from_bits(self.value_sum.load(Ordering::Relaxed))
  }

  pub fn mean(&self) -> Option<f32> {
    let n = self.visits();
    if n == 0 {
      None
    } else {
      Some((self.value_sum() / n as f64) as f32)
    }
  }

  pub fn variance(&self) -> Option<f32> {
    let n = self.visits();
    if n == 0 {
      return None;
    }
    let mean = self.value_sum() / n as f64;
    let sq_mean = f64::from_bits(self.value_sq_sum.load(Ordering::Relaxed)) / n as f64;
    Some((sq_mean - mean * mean).max(0.0) as f32)
  }

  #[inline]
  pub fn virtual_loss(&self) -> u32 {
    self.virtual_loss.load(Ordering::Relaxed)
  }

  /// Visit count and mean as seen by selection, with each in-flight visit
  /// counted as a loss for the player who made `mv`.
  pub fn visible_stats(&self) -> (u32, Option<f32>) {
    let n = self.visits();
    let vl = self.virtual_loss();
    let n_eff = n + vl;
    if n_eff == 0 {
      (0, None)
    } else {
      let sum = self.value_sum() - vl as f64;
      (n_eff, Some((sum / n_eff as f64) as f32))
    }
  }

  pub(crate) fn add_value(&self, value: f32) {
    let v = value as f64;
    atomic_add_f64(&self.value_sum, v);
    atomic_add_f64(&self.value_sq_sum, v * v);
    self.visits.fetch_add(1, Ordering::AcqRel);
  }

  pub(crate) fn add_virtual_loss(&self) {
    self.virtual_loss.fetch_add(1, Ordering::AcqRel);
  }

  pub(crate) fn remove_virtual_loss(&self) {
    let prev = self.virtual_loss.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(prev > 0);
  }

  #[inline]
  pub fn is_expanded(&self) -> bool {
    self.state.load(Ordering::Acquire) == STATE_EXPANDED
  }

  /// Claims the right to expand this node. Fails if another thread already
  /// holds it or has finished.
  pub(crate) fn begin_expand(&self) -> bool {
    self.state.compare_exchange(STATE_LEAF, STATE_EXPANDING, Ordering::AcqRel, Ordering::Acquire).is_ok()
  }

  pub(crate) fn abort_expand(&self) {
    self.state.store(STATE_LEAF, Ordering::Release);
  }

  /// Links an initialized run of children. The release store on the state
  /// publishes the run to readers of `children`.
  pub(crate) fn publish_children(&self, first: u32, count: u32) {
    self.first_child.store(first, Ordering::Relaxed);
    self.num_children.store(count, Ordering::Relaxed);
    self.state.store(STATE_EXPANDED, Ordering::Release);
  }

  /// Index range of the children, or `None` for a leaf.
  pub fn children(&self) -> Option<Range<u32>> {
    if !self.is_expanded() {
      return None;
    }
    let first = self.first_child.load(Ordering::Relaxed);
    let count = self.num_children.load(Ordering::Relaxed);
    Some(first .. first + count)
  }

  pub fn num_children(&self) -> usize {
    self.children().map_or(0, |r| r.len())
  }
}
