use serde::{Deserialize, Serialize};

use std::fmt;
use std::str::{from_utf8};

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KoRule {
  Simple,
  PositionalSuperko,
  SituationalSuperko,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuicideRule {
  Illegal,
  Allowed,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct Rules {
  pub ko_rule:              KoRule,
  pub suicide:              SuicideRule,
  /// When set, neither ko nor superko is checked; recapturing on the ko
  /// point increments the ko level instead.
  pub allow_ko_repetition:  bool,
}

impl Default for Rules {
  fn default() -> Rules {
    RuleSet::Japanese.rules()
  }
}

impl Rules {
  pub fn allows_suicide(&self) -> bool {
    self.suicide == SuicideRule::Allowed
  }

  pub fn is_superko(&self) -> bool {
    match self.ko_rule {
      KoRule::Simple => false,
      KoRule::PositionalSuperko | KoRule::SituationalSuperko => true,
    }
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum RuleSet {
  Japanese,
  Chinese,
  Aga,
  NewZealand,
  TrompTaylor,
}

impl RuleSet {
  pub fn rules(&self) -> Rules {
    match *self {
      RuleSet::Japanese => Rules{
        ko_rule:              KoRule::Simple,
        suicide:              SuicideRule::Illegal,
        allow_ko_repetition:  false,
      },
      RuleSet::Chinese => Rules{
        ko_rule:              KoRule::PositionalSuperko,
        suicide:              SuicideRule::Illegal,
        allow_ko_repetition:  false,
      },
      RuleSet::Aga => Rules{
        ko_rule:              KoRule::SituationalSuperko,
        suicide:              SuicideRule::Illegal,
        allow_ko_repetition:  false,
      },
      RuleSet::NewZealand => Rules{
        ko_rule:              KoRule::SituationalSuperko,
        suicide:              SuicideRule::Allowed,
        allow_ko_repetition:  false,
      },
      RuleSet::TrompTaylor => Rules{
        ko_rule:              KoRule::PositionalSuperko,
        suicide:              SuicideRule::Allowed,
        allow_ko_repetition:  false,
      },
    }
  }
}

/// Optional components folded into `Board::full_hash`. The stone placement
/// component is always present.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct HashConfig {
  pub ko_level: bool,
  pub captures: bool,
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum IllegalReason {
  Suicide,
  Ko,
  Superko,
}

#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub enum Stone {
  Black = 0,
  White = 1,
  Empty = 2,
  Border = 3,
}

impl Stone {
  pub fn from_code_str(code_str: &str) -> Option<Stone> {
    match code_str {
      "B" | "b" => Some(Stone::Black),
      "W" | "w" => Some(Stone::White),
      _   => None,
    }
  }

  #[inline]
  pub fn is_color(self) -> bool {
    match self {
      Stone::Black | Stone::White => true,
      Stone::Empty | Stone::Border => false,
    }
  }

  /// Index of a color into per-color tables. Only valid for `Black` and
  /// `White`.
  #[inline]
  pub fn offset(self) -> usize {
    match self {
      Stone::Black => 0,
      Stone::White => 1,
      Stone::Empty | Stone::Border => unreachable!(),
    }
  }

  #[inline]
  pub fn opponent(self) -> Stone {
    match self {
      Stone::Black => Stone::White,
      Stone::White => Stone::Black,
      s => s,
    }
  }

  pub fn to_char(self) -> char {
    match self {
      Stone::Black  => 'X',
      Stone::White  => 'O',
      Stone::Empty  => '.',
      Stone::Border => '#',
    }
  }
}

/// An index into the padded grid of a `Topology`. Negative values are
/// reserved sentinels and never address a grid cell.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Point(pub i16);

impl Point {
  pub const NONE: Point = Point(-1);
  pub const PASS: Point = Point(-2);

  pub fn from_idx(idx: usize) -> Point {
    Point(idx as i16)
  }

  #[inline]
  pub fn idx(self) -> usize {
    debug_assert!(self.0 >= 0);
    self.0 as usize
  }

  #[inline]
  pub fn is_pass(self) -> bool {
    self == Point::PASS
  }

  #[inline]
  pub fn is_none(self) -> bool {
    self == Point::NONE
  }

  #[inline]
  pub fn is_grid(self) -> bool {
    self.0 >= 0
  }

  #[inline]
  pub fn offset(self, delta: i16) -> Point {
    Point(self.0 + delta)
  }
}

/// Zero-based board coordinate, `x` from the left and `y` from the bottom.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Debug, Serialize, Deserialize)]
pub struct Coord {
  pub x:  u8,
  pub y:  u8,
}

impl Coord {
  pub fn new(x: u8, y: u8) -> Coord {
    Coord{x: x, y: y}
  }

  /// Parses the usual column-letter-then-row code, e.g. `D4`. The letter
  /// `I` is skipped.
  pub fn from_code(code: &[u8]) -> Option<Coord> {
    if code.len() < 2 {
      return None;
    }
    let col = code[0].to_ascii_uppercase();
    let x = match col {
      b'A' ..= b'H' => col - b'A',
      b'J' ..= b'Z' => col - b'A' - 1,
      _ => return None,
    };
    let row: u8 = match from_utf8(&code[1 ..]).ok().and_then(|s| s.parse().ok()) {
      Some(row) => row,
      None => return None,
    };
    if row < 1 {
      return None;
    }
    Some(Coord{x: x, y: row - 1})
  }
}

impl fmt::Display for Coord {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let x = if self.x < 8 { b'A' + self.x } else { b'A' + self.x + 1 };
    write!(f, "{}{}", x as char, self.y as u32 + 1)
  }
}

#[derive(Clone, Copy, Eq, PartialEq, Debug)]
pub enum Action {
  Place{point: Point},
  Pass,
  Resign,
}

impl Action {
  pub fn from_point(point: Point) -> Action {
    if point.is_pass() {
      Action::Pass
    } else {
      Action::Place{point: point}
    }
  }

  pub fn point(&self) -> Option<Point> {
    match *self {
      Action::Place{point} => Some(point),
      Action::Pass => Some(Point::PASS),
      Action::Resign => None,
    }
  }
}
