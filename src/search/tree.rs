use crate::board::{Point};
use crate::search::node::{Node, NodeId};

use log::{warn};
use thiserror::{Error};

use std::mem::{swap};
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Error)]
pub enum TreeError {
  #[error("arena segment {segment} cannot hold {requested} more nodes ({available} left)")]
  CapacityExceeded{segment: usize, requested: usize, available: usize},
  #[error("no such node: {0:?}")]
  BadNode(NodeId),
}

pub const ROOT: NodeId = NodeId(0);

/// One allocator's slice of the node arena. Normally only its owning
/// thread allocates from it, but a tree with fewer segments than threads
/// shares them, so claims go through a compare-exchange.
struct Segment {
  start:  u32,
  end:    u32,
  next:   AtomicU32,
}

impl Segment {
  fn available(&self) -> usize {
    (self.end - self.next.load(Ordering::Relaxed)) as usize
  }

  fn used(&self) -> usize {
    (self.next.load(Ordering::Relaxed) - self.start) as usize
  }
}

/// Search tree stored in a fixed node arena. Children of a node occupy a
/// contiguous run `first_child .. first_child + count`; node 0 is the root.
pub struct SearchTree {
  nodes:    Box<[Node]>,
  segments: Vec<Segment>,
}

impl SearchTree {
  /// Arena of `max_nodes` nodes, the root included, split evenly between
  /// `num_segments` allocators.
  pub fn new(max_nodes: usize, num_segments: usize) -> SearchTree {
    let max_nodes = max_nodes.max(2);
    let num_segments = num_segments.max(1);
    let nodes: Vec<Node> = (0 .. max_nodes).map(|_| Node::empty()).collect();
    let per_segment = (max_nodes - 1) / num_segments;
    let mut segments = Vec::with_capacity(num_segments);
    for s in 0 .. num_segments {
      let start = 1 + s * per_segment;
      let end = if s + 1 == num_segments { max_nodes } else { start + per_segment };
      segments.push(Segment{
        start:  start as u32,
        end:    end as u32,
        next:   AtomicU32::new(start as u32),
      });
    }
    let tree = SearchTree{
      nodes:    nodes.into_boxed_slice(),
      segments: segments,
    };
    tree.root_node().init(Point::NONE, 1.0, None);
    tree
  }

  pub fn capacity(&self) -> usize {
    self.nodes.len()
  }

  pub fn num_segments(&self) -> usize {
    self.segments.len()
  }

  pub fn num_nodes(&self) -> usize {
    1 + self.segments.iter().map(|s| s.used()).sum::<usize>()
  }

  pub fn segment_available(&self, segment: usize) -> usize {
    self.segments.get(segment).map_or(0, |s| s.available())
  }

  pub fn clear(&mut self) {
    for s in self.segments.iter() {
      s.next.store(s.start, Ordering::Relaxed);
    }
    self.root_node().init(Point::NONE, 1.0, None);
  }

  pub fn swap(&mut self, other: &mut SearchTree) {
    swap(self, other);
  }

  #[inline]
  pub fn root(&self) -> NodeId {
    ROOT
  }

  #[inline]
  pub fn root_node(&self) -> &Node {
    &self.nodes[0]
  }

  #[inline]
  pub fn node(&self, id: NodeId) -> &Node {
    &self.nodes[id.idx()]
  }

  pub fn get(&self, id: NodeId) -> Result<&Node, TreeError> {
    self.nodes.get(id.idx()).ok_or(TreeError::BadNode(id))
  }

  pub fn children<'a>(&'a self, id: NodeId) -> impl Iterator<Item=NodeId> + 'a {
    self.node(id).children().unwrap_or(0 .. 0).map(NodeId)
  }

  pub fn find_child(&self, id: NodeId, mv: Point) -> Option<NodeId> {
    self.children(id).find(|&c| self.node(c).mv() == mv)
  }

  fn alloc(&self, segment: usize, count: usize) -> Result<u32, TreeError> {
    let seg = &self.segments[segment % self.segments.len()];
    let mut next = seg.next.load(Ordering::Relaxed);
    loop {
      let available = (seg.end - next) as usize;
      if count > available {
        return Err(TreeError::CapacityExceeded{
          segment:    segment,
          requested:  count,
          available:  available,
        });
      }
      match seg.next.compare_exchange_weak(next, next + count as u32, Ordering::AcqRel, Ordering::Relaxed) {
        Ok(_) => return Ok(next),
        Err(actual) => next = actual,
      }
    }
  }

  /// Expands `parent` with one child per candidate move, taking nodes from
  /// `segment`. Priors are normalized over the candidates (uniform if they
  /// sum to zero). Returns `Ok(false)` if another thread claimed the node
  /// first.
  pub fn expand(&self, segment: usize, parent: NodeId, moves: &[(Point, f32)]) -> Result<bool, TreeError> {
    let parent_node = self.get(parent)?;
    if moves.is_empty() || !parent_node.begin_expand() {
      return Ok(false);
    }
    let first = match self.alloc(segment, moves.len()) {
      Ok(first) => first,
      Err(e) => {
        parent_node.abort_expand();
        return Err(e);
      }
    };
    let total: f32 = moves.iter().map(|&(_, p)| if p.is_finite() && p > 0.0 { p } else { 0.0 }).sum();
    let uniform = 1.0 / moves.len() as f32;
    for (k, &(mv, p)) in moves.iter().enumerate() {
      let prior = if total > 0.0 {
        if p.is_finite() && p > 0.0 { p / total } else { 0.0 }
      } else {
        uniform
      };
      self.nodes[first as usize + k].init(mv, prior, Some(parent));
    }
    parent_node.publish_children(first, moves.len() as u32);
    Ok(true)
  }

  pub fn add_virtual_loss(&self, path: &[NodeId]) {
    for &id in path.iter() {
      self.node(id).add_virtual_loss();
    }
  }

  pub fn remove_virtual_loss(&self, path: &[NodeId]) {
    for &id in path.iter() {
      self.node(id).remove_virtual_loss();
    }
  }

  /// Folds `value`, from the point of view of the side to move at the last
  /// node of `path`, into every node of the path. The sign flips each ply.
  pub fn backup(&self, path: &[NodeId], value: f32) {
    let mut v = -value;
    for &id in path.iter().rev() {
      self.node(id).add_value(v);
      v = -v;
    }
  }

  /// Takes `count` nodes from whichever segment has the most room, so a
  /// copied tree leaves every allocator with a similar share.
  fn copy_alloc(&self, count: usize) -> Option<u32> {
    let s = (0 .. self.segments.len()).max_by_key(|&s| self.segments[s].available())?;
    self.alloc(s, count).ok()
  }

  /// Copies the subtree under `src_root` into `target`, which is cleared
  /// first. Children of a node are copied only if the node has at least
  /// `min_visits` visits (the new root always keeps its children); a node
  /// whose children are dropped stays in the copy as a leaf with its
  /// statistics. Returns `false` if `target` ran out of space.
  fn copy_into(&self, target: &mut SearchTree, src_root: NodeId, min_visits: u32) -> bool {
    target.clear();
    target.root_node().init_from(self.node(src_root), None);
    let mut complete = true;
    let mut stack = vec![(src_root, ROOT)];
    while let Some((src, dst)) = stack.pop() {
      let src_node = self.node(src);
      let range = match src_node.children() {
        Some(range) if !range.is_empty() => range,
        _ => continue,
      };
      if src != src_root && src_node.visits() < min_visits {
        continue;
      }
      let count = range.len();
      let first = match target.copy_alloc(count) {
        Some(first) => first,
        None => {
          complete = false;
          continue;
        }
      };
      for (k, c) in range.enumerate() {
        let child = NodeId(first + k as u32);
        target.node(child).init_from(self.node(NodeId(c)), Some(dst));
        stack.push((NodeId(c), child));
      }
      target.node(dst).publish_children(first, count as u32);
    }
    complete
  }

  /// Rebuilds the tree into `target` without the subtrees of nodes visited
  /// fewer than `min_visits` times. Returns the size of the copy relative to
  /// this tree.
  pub fn copy_prune_low_count(&self, target: &mut SearchTree, min_visits: u32) -> f32 {
    if !self.copy_into(target, ROOT, min_visits) {
      warn!("copy_prune_low_count: target tree full, copy truncated ({} nodes)", target.num_nodes());
    }
    target.num_nodes() as f32 / self.num_nodes() as f32
  }

  /// Follows `moves` from the root and copies the subtree found there into
  /// `target` as its new root. If the path leaves the tree, `target` is
  /// cleared and `false` is returned.
  pub fn extract_subtree(&self, target: &mut SearchTree, moves: &[Point]) -> bool {
    let mut cursor = ROOT;
    for &mv in moves.iter() {
      match self.find_child(cursor, mv) {
        Some(child) => cursor = child,
        None => {
          target.clear();
          return false;
        }
      }
    }
    if !self.copy_into(target, cursor, 0) {
      warn!("extract_subtree: target tree full, copy truncated ({} nodes)", target.num_nodes());
    }
    true
  }

  /// Longest root-to-leaf path length, in plies.
  pub fn max_depth(&self) -> usize {
    let mut max_depth = 0;
    let mut stack = vec![(ROOT, 0)];
    while let Some((id, depth)) = stack.pop() {
      if depth > max_depth {
        max_depth = depth;
      }
      for child in self.children(id) {
        stack.push((child, depth + 1));
      }
    }
    max_depth
  }
}
