use moriarty::board::{Point};
use moriarty::topology::{MAX_SIZE, MIN_SIZE, Topology, TopologyError, TopologyRegistry};

use std::sync::{Arc};

#[test]
fn registry_returns_cached_instance() {
  let registry = TopologyRegistry::new();
  assert!(registry.is_empty());
  let a = registry.get(9).unwrap();
  let b = registry.get(9).unwrap();
  assert!(Arc::ptr_eq(&a, &b));
  let c = registry.get(13).unwrap();
  assert!(!Arc::ptr_eq(&a, &c));
  assert_eq!(registry.len(), 2);
}

#[test]
fn unsupported_sizes_are_errors() {
  let registry = TopologyRegistry::new();
  assert_eq!(registry.get(MIN_SIZE - 1).err(), Some(TopologyError::UnsupportedSize(MIN_SIZE - 1)));
  assert_eq!(registry.get(MAX_SIZE + 1).err(), Some(TopologyError::UnsupportedSize(MAX_SIZE + 1)));
  assert!(Topology::new(0).is_err());
  assert!(registry.is_empty());
}

#[test]
fn point_classes_19x19() {
  let topo = Topology::new(19).unwrap();
  assert_eq!(topo.points().len(), 361);
  assert_eq!(topo.all_points().len(), 361);
  assert_eq!(topo.corners().len(), 4);
  assert_eq!(topo.edges().len(), 4 * 17);
  assert_eq!(topo.center().len(), 11 * 11);
  assert!(topo.corners().contains(topo.point(0, 0).unwrap()));
  assert!(topo.corners().contains(topo.point(18, 18).unwrap()));
  assert!(topo.edges().contains(topo.point(0, 7).unwrap()));
  assert!(!topo.edges().contains(topo.point(0, 0).unwrap()));
  assert!(topo.side_extensions().contains(topo.point(4, 2).unwrap()));
  assert!(!topo.side_extensions().contains(topo.point(3, 2).unwrap()));
  assert!(topo.center().contains(topo.point(9, 9).unwrap()));
  assert!(!topo.center().contains(topo.point(3, 9).unwrap()));
}

#[test]
fn small_board_has_no_center() {
  let topo = Topology::new(7).unwrap();
  assert!(topo.center().is_empty());
  assert_eq!(topo.max_line(), 4);
  assert_eq!(topo.line_points(4), &[topo.point(3, 3).unwrap()]);
}

#[test]
fn lines_and_uphill() {
  let topo = Topology::new(19).unwrap();
  let stride = topo.stride();
  assert_eq!(topo.line(topo.point(0, 0).unwrap()), 1);
  assert_eq!(topo.line(topo.point(3, 3).unwrap()), 4);
  assert_eq!(topo.line(topo.point(9, 9).unwrap()), 10);
  assert_eq!(topo.pos(topo.point(2, 6).unwrap()), 7);
  assert_eq!(topo.up(topo.point(0, 9).unwrap()), 1);
  assert_eq!(topo.up(topo.point(18, 9).unwrap()), -1);
  assert_eq!(topo.up(topo.point(9, 0).unwrap()), stride);
  assert_eq!(topo.up(topo.point(9, 18).unwrap()), -stride);
  assert_eq!(topo.up(topo.point(0, 0).unwrap()), 0);
  assert_eq!(topo.up(topo.point(9, 9).unwrap()), 0);
  let line1: usize = topo.line_points(1).len();
  assert_eq!(line1, 4 * 18);
  for l in 1 ..= topo.max_line() {
    for &p in topo.line_points(l) {
      assert_eq!(topo.line(p), l);
    }
  }
}

#[test]
fn neighbors_stay_on_board() {
  let topo = Topology::new(5).unwrap();
  let corner = topo.point(0, 0).unwrap();
  let mut n = 0;
  topo.for_each_adjacent(corner, |p| {
    assert!(topo.is_on_board(p));
    n += 1;
  });
  assert_eq!(n, 2);
  let mut d = 0;
  topo.for_each_diagonal(topo.point(2, 2).unwrap(), |_| d += 1);
  assert_eq!(d, 4);
  let adj = topo.adjacent(corner);
  assert_eq!(adj.iter().filter(|&&p| topo.is_on_board(p)).count(), 2);
}

#[test]
fn coordinates_and_policy_indices() {
  let topo = Topology::new(9).unwrap();
  assert_eq!(topo.parse_point("D4"), topo.point(3, 3));
  assert_eq!(topo.parse_point("J1"), topo.point(8, 0));
  assert_eq!(topo.parse_point("pass"), Some(Point::PASS));
  assert_eq!(topo.parse_point("Z9"), None);
  let p = topo.point(2, 5).unwrap();
  assert_eq!(topo.point_to_string(p), "C6");
  assert_eq!(topo.point_to_string(Point::PASS), "pass");
  assert_eq!(topo.policy_len(), 82);
  assert_eq!(topo.policy_idx(p), 5 * 9 + 2);
  assert_eq!(topo.policy_idx(Point::PASS), 81);
  for idx in 0 .. topo.policy_len() {
    let q = topo.point_from_policy_idx(idx).unwrap();
    assert_eq!(topo.policy_idx(q), idx);
  }
  assert_eq!(topo.point_from_policy_idx(82), None);
  assert_eq!(topo.coord(p).map(|c| (c.x, c.y)), Some((2, 5)));
}

#[test]
fn zobrist_keys_are_stable() {
  let a = Topology::new(9).unwrap();
  let b = Topology::new(9).unwrap();
  let c = Topology::new(13).unwrap();
  let p = a.point(4, 4).unwrap();
  assert_eq!(a.zobrist().stone(0, p), b.zobrist().stone(0, p));
  assert_ne!(a.zobrist().stone(0, p), a.zobrist().stone(1, p));
  assert_ne!(a.zobrist().to_play(), c.zobrist().to_play());
  assert_eq!(a.zobrist().ko_level(0), 0);
  assert_eq!(a.zobrist().captures(1, 0), 0);
}
