use crate::board::{Stone};
use crate::position::{Board};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelOrder {
  /// Plane-major: `[channel][y][x]`.
  ChannelsFirst,
  /// Point-major: `[y][x][channel]`.
  ChannelsLast,
}

impl Default for ChannelOrder {
  fn default() -> ChannelOrder {
    ChannelOrder::ChannelsFirst
  }
}

/// Shape of one evaluator input: `size * size * channels` floats.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FeatureSpec {
  pub size:     usize,
  pub channels: usize,
  pub order:    ChannelOrder,
}

impl FeatureSpec {
  pub const OWN_PLANE:        usize = 0;
  pub const OPP_PLANE:        usize = 1;
  pub const EMPTY_PLANE:      usize = 2;
  pub const OWN_ATARI_PLANE:  usize = 3;
  pub const OWN_LIVE_2_PLANE: usize = 4;
  pub const OWN_LIVE_3_PLANE: usize = 5;
  pub const OPP_ATARI_PLANE:  usize = 6;
  pub const OPP_LIVE_2_PLANE: usize = 7;
  pub const KO_PLANE:         usize = 8;
  pub const BLACK_TURN_PLANE: usize = 9;
  pub const NUM_CHANNELS:     usize = 10;

  pub fn new(size: usize, order: ChannelOrder) -> FeatureSpec {
    FeatureSpec{
      size:     size,
      channels: Self::NUM_CHANNELS,
      order:    order,
    }
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.size * self.size * self.channels
  }

  /// Flat offset of `(channel, x, y)`.
  #[inline]
  pub fn offset(&self, channel: usize, x: usize, y: usize) -> usize {
    match self.order {
      ChannelOrder::ChannelsFirst => (channel * self.size + y) * self.size + x,
      ChannelOrder::ChannelsLast  => (y * self.size + x) * self.channels + channel,
    }
  }
}

/// Writes the planes for `board`, relative to the side to move, into `dst`.
pub fn extract_features(board: &Board, spec: &FeatureSpec, dst: &mut [f32]) {
  assert_eq!(spec.size, board.size());
  assert!(dst.len() >= spec.len());
  for x in dst[.. spec.len()].iter_mut() {
    *x = 0.0;
  }

  let turn = board.to_play();
  let opp = turn.opponent();
  let topo = board.topology();
  let ko_point = board.ko_point();
  let black_turn = if turn == Stone::Black { 1.0 } else { 0.0 };

  for y in 0 .. spec.size {
    for x in 0 .. spec.size {
      let point = match topo.point(x, y) {
        Some(point) => point,
        None => continue,
      };
      let stone = board.stone(point);
      let libs = board.num_liberties(point);
      if stone == turn {
        dst[spec.offset(FeatureSpec::OWN_PLANE, x, y)] = 1.0;
        let plane = match libs {
          1 => FeatureSpec::OWN_ATARI_PLANE,
          2 => FeatureSpec::OWN_LIVE_2_PLANE,
          _ => FeatureSpec::OWN_LIVE_3_PLANE,
        };
        dst[spec.offset(plane, x, y)] = 1.0;
      } else if stone == opp {
        dst[spec.offset(FeatureSpec::OPP_PLANE, x, y)] = 1.0;
        match libs {
          1 => dst[spec.offset(FeatureSpec::OPP_ATARI_PLANE, x, y)] = 1.0,
          2 => dst[spec.offset(FeatureSpec::OPP_LIVE_2_PLANE, x, y)] = 1.0,
          _ => {}
        }
      } else {
        dst[spec.offset(FeatureSpec::EMPTY_PLANE, x, y)] = 1.0;
      }
      if ko_point == Some(point) {
        dst[spec.offset(FeatureSpec::KO_PLANE, x, y)] = 1.0;
      }
      dst[spec.offset(FeatureSpec::BLACK_TURN_PLANE, x, y)] = black_turn;
    }
  }
}
