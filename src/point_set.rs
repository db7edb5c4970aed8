use crate::board::{Point};
use crate::topology::{MAX_POINTS, Topology};

use bit_set::{BitSet};

use std::fmt;

/// Fixed-capacity set of grid points, sized for the largest supported board.
#[derive(Clone, PartialEq, Eq)]
pub struct PointSet {
  bits: BitSet,
}

impl Default for PointSet {
  fn default() -> PointSet {
    PointSet::new()
  }
}

impl fmt::Debug for PointSet {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    f.debug_set().entries(self.iter().map(|p| p.0)).finish()
  }
}

impl PointSet {
  pub fn new() -> PointSet {
    PointSet{
      bits: BitSet::with_capacity(MAX_POINTS),
    }
  }

  pub fn from_points<I>(points: I) -> PointSet where I: IntoIterator<Item=Point> {
    let mut set = PointSet::new();
    for point in points {
      set.insert(point);
    }
    set
  }

  #[inline]
  pub fn insert(&mut self, point: Point) -> bool {
    point.is_grid() && self.bits.insert(point.idx())
  }

  #[inline]
  pub fn remove(&mut self, point: Point) -> bool {
    point.is_grid() && self.bits.remove(point.idx())
  }

  #[inline]
  pub fn contains(&self, point: Point) -> bool {
    point.is_grid() && self.bits.contains(point.idx())
  }

  pub fn len(&self) -> usize {
    self.bits.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bits.is_empty()
  }

  pub fn clear(&mut self) {
    self.bits.clear();
  }

  pub fn iter<'a>(&'a self) -> impl Iterator<Item=Point> + 'a {
    self.bits.iter().map(Point::from_idx)
  }

  pub fn is_subset(&self, other: &PointSet) -> bool {
    self.bits.is_subset(&other.bits)
  }

  pub fn union_with(&mut self, other: &PointSet) {
    self.bits.union_with(&other.bits);
  }

  pub fn intersect_with(&mut self, other: &PointSet) {
    self.bits.intersect_with(&other.bits);
  }

  pub fn difference_with(&mut self, other: &PointSet) {
    self.bits.difference_with(&other.bits);
  }

  pub fn union(&self, other: &PointSet) -> PointSet {
    let mut set = self.clone();
    set.union_with(other);
    set
  }

  pub fn intersection(&self, other: &PointSet) -> PointSet {
    let mut set = self.clone();
    set.intersect_with(other);
    set
  }

  pub fn difference(&self, other: &PointSet) -> PointSet {
    let mut set = self.clone();
    set.difference_with(other);
    set
  }

  /// On-board points adjacent to the set but not in it.
  pub fn border(&self, topo: &Topology) -> PointSet {
    let mut border = PointSet::new();
    for point in self.iter() {
      topo.for_each_adjacent(point, |adj_point| {
        if !self.contains(adj_point) {
          border.insert(adj_point);
        }
      });
    }
    border
  }

  /// The set together with its border.
  pub fn grow(&self, topo: &Topology) -> PointSet {
    let mut set = self.border(topo);
    set.union_with(self);
    set
  }

  /// Points of the set whose on-board neighbors all lie in the set.
  pub fn shrink(&self, topo: &Topology) -> PointSet {
    let mut set = PointSet::new();
    for point in self.iter() {
      let mut interior = true;
      topo.for_each_adjacent(point, |adj_point| {
        if !self.contains(adj_point) {
          interior = false;
        }
      });
      if interior {
        set.insert(point);
      }
    }
    set
  }

  /// The 4-connected component of the set containing `point`; empty if the
  /// point is not in the set.
  pub fn component_of(&self, topo: &Topology, point: Point) -> PointSet {
    let mut component = PointSet::new();
    if !self.contains(point) {
      return component;
    }
    let mut stack = vec![point];
    component.insert(point);
    while let Some(cursor) = stack.pop() {
      topo.for_each_adjacent(cursor, |adj_point| {
        if self.contains(adj_point) && component.insert(adj_point) {
          stack.push(adj_point);
        }
      });
    }
    component
  }

  /// Splits the set into 4-connected components, ordered by their smallest
  /// point.
  pub fn components(&self, topo: &Topology) -> Vec<PointSet> {
    let mut rest = self.clone();
    let mut components = vec![];
    loop {
      let seed = match rest.iter().next() {
        Some(seed) => seed,
        None => break,
      };
      let component = rest.component_of(topo, seed);
      rest.difference_with(&component);
      components.push(component);
    }
    components
  }

  pub fn is_connected(&self, topo: &Topology) -> bool {
    match self.iter().next() {
      None => true,
      Some(seed) => self.component_of(topo, seed).len() == self.len(),
    }
  }
}

/// Reusable visitation marks. Clearing bumps a generation counter, so a walk
/// costs nothing to reset.
#[derive(Clone)]
pub struct Marker {
  marks:  Vec<u32>,
  gen:    u32,
}

impl Default for Marker {
  fn default() -> Marker {
    Marker::new()
  }
}

impl Marker {
  pub fn new() -> Marker {
    Marker{
      marks:  vec![0; MAX_POINTS],
      gen:    1,
    }
  }

  pub fn clear(&mut self) {
    if self.gen == u32::MAX {
      for m in self.marks.iter_mut() {
        *m = 0;
      }
      self.gen = 1;
    } else {
      self.gen += 1;
    }
  }

  /// Marks `point`, returning `true` if it was not already marked.
  #[inline]
  pub fn mark(&mut self, point: Point) -> bool {
    let m = &mut self.marks[point.idx()];
    if *m == self.gen {
      false
    } else {
      *m = self.gen;
      true
    }
  }

  #[inline]
  pub fn is_marked(&self, point: Point) -> bool {
    self.marks[point.idx()] == self.gen
  }
}
