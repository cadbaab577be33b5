//! Session configuration: which engine to run and how long it may think.
//!
//! Settings live in `settings.json` in the user's configuration directory:
//!
//! ```json
//! { "engine_path": "/usr/bin/stockfish", "engine_time_ms": 1000 }
//! ```
//!
//! A missing or unreadable file is not an error; the defaults are used.

use crate::error::ConfigError;
use crate::process::EngineCommand;
use directories::{BaseDirs, ProjectDirs};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SETTINGS_FILENAME: &str = "settings.json";

/// Places a UCI engine is commonly installed, tried in order.
pub const ENGINE_CANDIDATES: &[&str] = &[
   "stockfish",
   "/usr/bin/stockfish",
   "/usr/local/bin/stockfish",
   "/usr/games/stockfish",
   "/opt/homebrew/bin/stockfish",
   "C:/Program Files/Stockfish/stockfish.exe",
   "C:/stockfish/stockfish.exe",
];

/// Per-move think time in milliseconds, kept within `MIN..=MAX`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub struct ThinkTime(u64);

impl ThinkTime {
   pub const MIN: u64 = 50;
   pub const MAX: u64 = 10_000;
   pub const DEFAULT: u64 = 1000;

   pub fn from_millis(ms: u64) -> ThinkTime {
      ThinkTime(ms.clamp(ThinkTime::MIN, ThinkTime::MAX))
   }

   pub fn millis(self) -> u64 {
      self.0
   }

   pub fn as_duration(self) -> Duration {
      Duration::from_millis(self.0)
   }
}

impl Default for ThinkTime {
   fn default() -> ThinkTime {
      ThinkTime(ThinkTime::DEFAULT)
   }
}

impl From<u64> for ThinkTime {
   fn from(ms: u64) -> ThinkTime {
      ThinkTime::from_millis(ms)
   }
}

impl From<ThinkTime> for u64 {
   fn from(t: ThinkTime) -> u64 {
      t.0
   }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
   #[serde(default)]
   pub engine_path: Option<PathBuf>,
   #[serde(default, skip_serializing_if = "Vec::is_empty")]
   pub engine_args: Vec<String>,
   #[serde(rename = "engine_time_ms", default)]
   pub think_time: ThinkTime,
}

impl SessionConfig {
   /// Reads settings, falling back to defaults when the file is absent or broken.
   pub fn load(path: &Path) -> SessionConfig {
      if !path.exists() {
         return SessionConfig::default();
      }
      match SessionConfig::read(path) {
         Ok(config) => {
            info!("loaded settings from {}", path.display());
            config
         }
         Err(e) => {
            warn!("ignoring settings at {}: {}", path.display(), e);
            SessionConfig::default()
         }
      }
   }

   pub fn read(path: &Path) -> Result<SessionConfig, ConfigError> {
      let contents = fs::read_to_string(path)?;
      Ok(serde_json::from_str(&contents)?)
   }

   pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
      if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
         fs::create_dir_all(parent)?;
      }
      fs::write(path, serde_json::to_string_pretty(self)?)?;
      Ok(())
   }

   /// The configured engine, or the first one found in the usual places.
   pub fn engine_command(&self) -> Option<EngineCommand> {
      let path = match &self.engine_path {
         Some(path) => path.clone(),
         None => auto_detect()?,
      };
      Some(EngineCommand {
         path,
         args: self.engine_args.clone(),
      })
   }
}

pub fn settings_path() -> PathBuf {
   match ProjectDirs::from("org", "chesshint", "chesshint") {
      Some(dirs) => dirs.config_dir().join(SETTINGS_FILENAME),
      None => PathBuf::from(SETTINGS_FILENAME),
   }
}

pub fn auto_detect() -> Option<PathBuf> {
   let home_candidate = BaseDirs::new().map(|dirs| dirs.home_dir().join(".local/bin/stockfish"));
   ENGINE_CANDIDATES
      .iter()
      .map(|candidate| PathBuf::from(*candidate))
      .chain(home_candidate)
      .find_map(|candidate| find_executable(&candidate))
}

/// Resolves a bare program name through `PATH`; anything with a directory part
/// only has to exist.
pub fn find_executable(candidate: &Path) -> Option<PathBuf> {
   if candidate.as_os_str().is_empty() {
      return None;
   }
   if candidate.components().count() > 1 || candidate.is_absolute() {
      return if candidate.is_file() {
         Some(candidate.to_path_buf())
      } else {
         None
      };
   }
   let search_path = env::var_os("PATH")?;
   env::split_paths(&search_path).find_map(|dir| {
      let full = dir.join(candidate);
      if full.is_file() {
         return Some(full);
      }
      let with_suffix = dir.join(format!("{}{}", candidate.display(), env::consts::EXE_SUFFIX));
      if with_suffix.is_file() {
         Some(with_suffix)
      } else {
         None
      }
   })
}

/// Checks user input for the engine path setting.
pub fn validate_engine_path(text: &str) -> Result<PathBuf, ConfigError> {
   let candidate = PathBuf::from(text.trim());
   find_executable(&candidate).ok_or(ConfigError::InvalidEnginePath(candidate))
}

#[cfg(test)]
mod tests {
   use super::*;

   fn scratch_file(name: &str) -> PathBuf {
      env::temp_dir().join(format!("chesshint-{}-{}", std::process::id(), name))
   }

   #[test]
   fn think_time_is_clamped() {
      assert_eq!(ThinkTime::from_millis(0).millis(), ThinkTime::MIN);
      assert_eq!(ThinkTime::from_millis(250).millis(), 250);
      assert_eq!(ThinkTime::from_millis(60_000).millis(), ThinkTime::MAX);
      assert_eq!(ThinkTime::default().as_duration(), Duration::from_secs(1));
   }

   #[test]
   fn settings_json_shape() {
      let config: SessionConfig =
         serde_json::from_str(r#"{"engine_path": "/usr/bin/stockfish", "engine_time_ms": 20}"#).unwrap();
      assert_eq!(config.engine_path, Some(PathBuf::from("/usr/bin/stockfish")));
      assert_eq!(config.think_time.millis(), ThinkTime::MIN);

      let empty: SessionConfig = serde_json::from_str("{}").unwrap();
      assert_eq!(empty, SessionConfig::default());
   }

   #[test]
   fn save_then_load() {
      let path = scratch_file("settings.json");
      let config = SessionConfig {
         engine_path: Some(PathBuf::from("/opt/engines/sf")),
         engine_args: vec!["--threads".into(), "2".into()],
         think_time: ThinkTime::from_millis(1500),
      };
      config.save(&path).unwrap();
      assert_eq!(SessionConfig::load(&path), config);
      fs::remove_file(&path).unwrap();
   }

   #[test]
   fn broken_or_missing_settings_fall_back() {
      let missing = scratch_file("missing.json");
      assert_eq!(SessionConfig::load(&missing), SessionConfig::default());

      let broken = scratch_file("broken.json");
      fs::write(&broken, "{ not json").unwrap();
      assert!(matches!(SessionConfig::read(&broken), Err(ConfigError::Serialization(_))));
      assert_eq!(SessionConfig::load(&broken), SessionConfig::default());
      fs::remove_file(&broken).unwrap();
   }

   #[test]
   fn engine_path_validation() {
      let exe = env::current_exe().unwrap();
      assert_eq!(validate_engine_path(exe.to_str().unwrap()).unwrap(), exe);
      assert!(matches!(
         validate_engine_path("/definitely/not/here/stockfish"),
         Err(ConfigError::InvalidEnginePath(_))
      ));
      assert!(validate_engine_path("  ").is_err());
   }

   #[test]
   fn configured_path_wins_over_detection() {
      let config = SessionConfig {
         engine_path: Some(PathBuf::from("/opt/engines/sf")),
         engine_args: vec!["-q".into()],
         ..SessionConfig::default()
      };
      let command = config.engine_command().unwrap();
      assert_eq!(command.path, PathBuf::from("/opt/engines/sf"));
      assert_eq!(command.args, vec!["-q".to_owned()]);
   }
}
