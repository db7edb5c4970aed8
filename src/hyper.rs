//! Typed engine configuration, read from TOML.
//!
//! ```toml
//! [board]
//! size = 9
//! ko_rule = "positional_superko"
//!
//! [search]
//! num_threads = 4
//! max_iterations = 1600
//! move_select = { kind = "sample", temperature = 1.0 }
//! ```

use crate::board::{HashConfig, KoRule, Rules, SuicideRule};
use crate::position::features::{ChannelOrder};
use crate::search::control::{SearchBudget};
use crate::search::evaluator::{MAX_BATCH, ValueConvention};

use serde::{Deserialize, Serialize};
use thiserror::{Error};

use std::env;
use std::fs;
use std::path::{Path};
use std::time::{Duration};

pub const CONFIG_PATH_VAR: &str = "MORIARTY_CONFIG_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config: {0}")]
  Io(#[from] std::io::Error),
  #[error("failed to parse config: {0}")]
  Parse(#[from] toml::de::Error),
  #[error("invalid config: {0}")]
  Invalid(String),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockMode {
  LockFree,
  Locked,
}

#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveSelect {
  MostVisited,
  Sample{temperature: f32},
}

/// Stop once the most visited root child has `min_visits` visits and a win
/// rate of at least `threshold`.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct EarlyAbortConfig {
  pub threshold:  f32,
  pub min_visits: u32,
}

/// Dirichlet noise mixed into the root priors.
#[derive(Clone, Copy, PartialEq, Debug, Serialize, Deserialize)]
pub struct RootNoise {
  pub alpha:    f32,
  pub fraction: f32,
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
  pub num_threads:        usize,
  pub c_puct:             f32,
  /// Mean value assumed for unvisited children.
  pub fpu_value:          f32,
  pub virtual_loss:       bool,
  pub lock_mode:          LockMode,
  pub max_nodes:          usize,
  pub prune_full_tree:    bool,
  pub prune_min_visits:   u32,
  pub prune_max_ratio:    f32,
  pub max_iterations:     Option<u64>,
  pub max_time_ms:        Option<u64>,
  pub early_abort:        Option<EarlyAbortConfig>,
  pub move_select:        MoveSelect,
  pub komi:               f32,
  pub value_convention:   ValueConvention,
  pub channel_order:      ChannelOrder,
  pub root_noise:         Option<RootNoise>,
  pub max_eval_failures:  u32,
  pub reuse_subtree:      bool,
  pub seed:               u64,
}

impl Default for SearchConfig {
  fn default() -> SearchConfig {
    SearchConfig{
      num_threads:        1,
      c_puct:             1.5,
      fpu_value:          0.0,
      virtual_loss:       true,
      lock_mode:          LockMode::LockFree,
      max_nodes:          200_000,
      prune_full_tree:    true,
      prune_min_visits:   16,
      prune_max_ratio:    0.5,
      max_iterations:     Some(800),
      max_time_ms:        None,
      early_abort:        None,
      move_select:        MoveSelect::MostVisited,
      komi:               7.5,
      value_convention:   ValueConvention::Raw,
      channel_order:      ChannelOrder::ChannelsFirst,
      root_noise:         None,
      max_eval_failures:  8,
      reuse_subtree:      true,
      seed:               0,
    }
  }
}

impl SearchConfig {
  pub fn budget(&self) -> SearchBudget {
    SearchBudget{
      max_iterations: self.max_iterations,
      max_time:       self.max_time_ms.map(Duration::from_millis),
    }
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.num_threads == 0 {
      return Err(ConfigError::Invalid("num_threads must be at least 1".to_string()));
    }
    if self.num_threads > MAX_BATCH {
      return Err(ConfigError::Invalid(format!("num_threads must be at most {}", MAX_BATCH)));
    }
    if !(self.c_puct > 0.0) {
      return Err(ConfigError::Invalid("c_puct must be positive".to_string()));
    }
    if self.max_nodes < 2 * self.num_threads + 1 {
      return Err(ConfigError::Invalid("max_nodes is too small for the thread count".to_string()));
    }
    if !(self.prune_max_ratio > 0.0 && self.prune_max_ratio < 1.0) {
      return Err(ConfigError::Invalid("prune_max_ratio must lie in (0, 1)".to_string()));
    }
    if let Some(early_abort) = self.early_abort {
      if !(early_abort.threshold > 0.5 && early_abort.threshold <= 1.0) {
        return Err(ConfigError::Invalid("early_abort.threshold must lie in (0.5, 1]".to_string()));
      }
    }
    if let MoveSelect::Sample{temperature} = self.move_select {
      if !(temperature > 0.0) {
        return Err(ConfigError::Invalid("temperature must be positive".to_string()));
      }
    }
    if let Some(noise) = self.root_noise {
      if !(noise.alpha > 0.0) || !(noise.fraction >= 0.0 && noise.fraction <= 1.0) {
        return Err(ConfigError::Invalid("root_noise needs alpha > 0 and fraction in [0, 1]".to_string()));
      }
    }
    Ok(())
  }

  /// Validates the config for a board of the given size: every thread's
  /// share of the arena must hold at least one full expansion.
  pub fn validate_for_size(&self, size: usize) -> Result<(), ConfigError> {
    self.validate()?;
    let per_thread = (self.max_nodes - 1) / self.num_threads;
    let max_children = size * size + 1;
    if per_thread < max_children {
      return Err(ConfigError::Invalid(format!(
          "max_nodes gives each of {} threads {} nodes, a {}x{} expansion needs {}",
          self.num_threads, per_thread, size, size, max_children)));
    }
    Ok(())
  }
}

#[derive(Clone, PartialEq, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
  pub size:                 usize,
  pub ko_rule:              KoRule,
  pub suicide:              SuicideRule,
  pub allow_ko_repetition:  bool,
  pub hash:                 HashConfig,
}

impl Default for BoardConfig {
  fn default() -> BoardConfig {
    let rules = Rules::default();
    BoardConfig{
      size:                 19,
      ko_rule:              rules.ko_rule,
      suicide:              rules.suicide,
      allow_ko_repetition:  rules.allow_ko_repetition,
      hash:                 HashConfig::default(),
    }
  }
}

impl BoardConfig {
  pub fn rules(&self) -> Rules {
    Rules{
      ko_rule:              self.ko_rule,
      suicide:              self.suicide,
      allow_ko_repetition:  self.allow_ko_repetition,
    }
  }
}

#[derive(Clone, PartialEq, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub board:  BoardConfig,
  pub search: SearchConfig,
}

impl EngineConfig {
  pub fn from_toml_str(s: &str) -> Result<EngineConfig, ConfigError> {
    let cfg: EngineConfig = toml::from_str(s)?;
    cfg.search.validate()?;
    Ok(cfg)
  }
}

pub fn load_engine_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
  let s = fs::read_to_string(path)?;
  EngineConfig::from_toml_str(&s)
}

/// Loads the config named by `MORIARTY_CONFIG_PATH`, or the defaults when
/// the variable is unset.
pub fn load_engine_config_from_env() -> Result<EngineConfig, ConfigError> {
  match env::var(CONFIG_PATH_VAR) {
    Ok(path) => load_engine_config(path),
    Err(_) => Ok(EngineConfig::default()),
  }
}
