use moriarty::board::{KoRule, RuleSet, SuicideRule};
use moriarty::hyper::{CONFIG_PATH_VAR, ConfigError, EngineConfig, LockMode, MoveSelect, SearchConfig, load_engine_config, load_engine_config_from_env};
use moriarty::position::features::{ChannelOrder};
use moriarty::search::evaluator::{ValueConvention};

use std::env;
use std::fs;
use std::time::{Duration};

#[test]
fn empty_document_gives_defaults() {
  let cfg = EngineConfig::from_toml_str("").unwrap();
  assert_eq!(cfg, EngineConfig::default());
  assert_eq!(cfg.board.size, 19);
  assert_eq!(cfg.board.rules(), RuleSet::Japanese.rules());
  assert_eq!(cfg.search.num_threads, 1);
  assert_eq!(cfg.search.move_select, MoveSelect::MostVisited);
  let budget = cfg.search.budget();
  assert_eq!(budget.max_iterations, Some(800));
  assert_eq!(budget.max_time, None);
}

#[test]
fn full_document() {
  let cfg = EngineConfig::from_toml_str(r#"
    [board]
    size = 9
    ko_rule = "situational_superko"
    suicide = "allowed"
    hash = { ko_level = true, captures = false }

    [search]
    num_threads = 8
    c_puct = 2.0
    lock_mode = "locked"
    max_iterations = 1600
    max_time_ms = 2500
    komi = 6.5
    value_convention = "probability"
    channel_order = "channels_last"
    move_select = { kind = "sample", temperature = 0.5 }
    early_abort = { threshold = 0.95, min_visits = 400 }
    root_noise = { alpha = 0.03, fraction = 0.25 }
    seed = 42
  "#).unwrap();
  assert_eq!(cfg.board.size, 9);
  assert_eq!(cfg.board.ko_rule, KoRule::SituationalSuperko);
  assert_eq!(cfg.board.suicide, SuicideRule::Allowed);
  assert!(cfg.board.hash.ko_level);
  assert_eq!(cfg.board.rules(), RuleSet::NewZealand.rules());
  let search = &cfg.search;
  assert_eq!(search.num_threads, 8);
  assert_eq!(search.lock_mode, LockMode::Locked);
  assert_eq!(search.value_convention, ValueConvention::Probability);
  assert_eq!(search.channel_order, ChannelOrder::ChannelsLast);
  assert_eq!(search.move_select, MoveSelect::Sample{temperature: 0.5});
  assert_eq!(search.early_abort.map(|e| e.min_visits), Some(400));
  assert_eq!(search.root_noise.map(|n| n.fraction), Some(0.25));
  assert_eq!(search.seed, 42);
  // Untouched fields keep their defaults.
  assert_eq!(search.max_nodes, SearchConfig::default().max_nodes);
  assert_eq!(search.budget().max_time, Some(Duration::from_millis(2500)));
}

#[test]
fn bad_documents() {
  assert!(matches!(EngineConfig::from_toml_str("[search]\nnum_threads = \"many\""), Err(ConfigError::Parse(_))));
  assert!(matches!(EngineConfig::from_toml_str("[board]\nko_rule = \"sometimes\""), Err(ConfigError::Parse(_))));
  assert!(matches!(EngineConfig::from_toml_str("[search]\nnum_threads = 0"), Err(ConfigError::Invalid(_))));
  assert!(matches!(EngineConfig::from_toml_str("[search]\nc_puct = -1.0"), Err(ConfigError::Invalid(_))));
  assert!(matches!(EngineConfig::from_toml_str("[search]\nprune_max_ratio = 1.0"), Err(ConfigError::Invalid(_))));
  assert!(matches!(EngineConfig::from_toml_str("[search]\nmax_nodes = 3\nnum_threads = 2"), Err(ConfigError::Invalid(_))));
  assert!(matches!(
      EngineConfig::from_toml_str("[search]\nmove_select = { kind = \"sample\", temperature = 0.0 }"),
      Err(ConfigError::Invalid(_))));
  assert!(matches!(
      EngineConfig::from_toml_str("[search]\nearly_abort = { threshold = 0.4, min_visits = 1 }"),
      Err(ConfigError::Invalid(_))));
}

#[test]
fn validation() {
  let mut cfg = SearchConfig::default();
  assert!(cfg.validate().is_ok());
  cfg.num_threads = 10_000;
  assert!(cfg.validate().is_err());
  cfg.num_threads = 4;
  cfg.max_nodes = 9;
  assert!(cfg.validate().is_ok());
  cfg.max_nodes = 8;
  assert!(cfg.validate().is_err());
}

#[test]
fn arena_share_fits_one_expansion() {
  let cfg = SearchConfig{
    num_threads:  4,
    max_nodes:    1000,
    ..SearchConfig::default()
  };
  assert!(cfg.validate().is_ok());
  assert!(cfg.validate_for_size(9).is_ok());
  assert!(matches!(cfg.validate_for_size(19), Err(ConfigError::Invalid(_))));
  let cfg = SearchConfig{
    max_nodes:  1 + 4 * 362,
    ..cfg
  };
  assert!(cfg.validate_for_size(19).is_ok());
  let cfg = SearchConfig{
    max_nodes:  4 * 362,
    ..cfg
  };
  assert!(cfg.validate_for_size(19).is_err());
}

#[test]
fn load_from_file_and_env() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("engine.toml");
  fs::write(&path, "[board]\nsize = 13\n[search]\nmax_iterations = 50\n").unwrap();
  let cfg = load_engine_config(&path).unwrap();
  assert_eq!(cfg.board.size, 13);
  assert_eq!(cfg.search.max_iterations, Some(50));

  env::set_var(CONFIG_PATH_VAR, &path);
  let from_env = load_engine_config_from_env().unwrap();
  assert_eq!(from_env, cfg);
  env::remove_var(CONFIG_PATH_VAR);
  assert_eq!(load_engine_config_from_env().unwrap(), EngineConfig::default());

  match load_engine_config(dir.path().join("missing.toml")) {
    Err(ConfigError::Io(_)) => {}
    other => panic!("expected an io error, got {:?}", other),
  }
}
