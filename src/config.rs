/// Application configuration: persisted as TOML as `config.toml` in the
/// config directory handed to the binary (current directory by default).
///
/// A default file is written on first run so there is something to edit:
///
///   log_path  = "C:\\Games\\World of Warcraft\\_classic_\\Logs"
///   encounter = 2
///   healer    = "Saintis"
///
///   [profile]
///   heal_power = 900.0
///
///   [strategy]
///   kind      = "greedy_rank"
///   spell_ids = [10917, 10916, 9474]
///
/// NOTE: log_path may be a single combat log **or** the Logs directory, in
/// which case the newest WoWCombatLog*.txt is picked at runtime.
use crate::report::Roster;
use crate::simulator::{CharacterProfile, DEFAULT_TIME_STEP};
use crate::spells::Talents;
use crate::strategy::StrategyConfig;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "config.toml";

// ---------------------------------------------------------------------------
// AppConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Combat log file, or the WoW Logs directory.
    #[serde(default)]
    pub log_path: PathBuf,

    /// Where the rolling `heal-ledger.log` is written (empty = platform default)
    #[serde(default)]
    pub log_dir: PathBuf,

    /// Where the JSON report is written (empty = next to the config file)
    #[serde(default)]
    pub report_path: PathBuf,

    /// 1-based encounter index; 0 = the whole log
    #[serde(default)]
    pub encounter: usize,

    /// Character whose heals are removed from the deficit timeline and
    /// replaced by the simulated healer (empty = keep everyone).
    #[serde(default)]
    pub healer: String,

    /// Spells to compare with one fixed-spell run each (empty = no sweep)
    #[serde(default)]
    pub sweep_spell_ids: Vec<u32>,

    /// Seed for the simulated crit rolls
    #[serde(default)]
    pub seed: u64,

    /// Simulator step in seconds
    #[serde(default = "default_time_step")]
    pub time_step: f64,

    /// +healing removed from heals before counting overheals (0 = as logged)
    #[serde(default)]
    pub overheal_spell_power: f64,

    /// Simulate with the +healing estimated from the healer's own heals
    /// instead of `profile.heal_power`.
    #[serde(default)]
    pub use_estimated_heal_power: bool,

    // Tables last so the file serializes with plain keys on top.
    #[serde(default)]
    pub profile: CharacterProfile,

    #[serde(default)]
    pub talents: Talents,

    #[serde(default)]
    pub strategy: StrategyConfig,

    #[serde(default)]
    pub raid: Roster,
}

fn default_time_step() -> f64 { DEFAULT_TIME_STEP }

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_path:                 PathBuf::new(),
            log_dir:                  PathBuf::new(),
            report_path:              PathBuf::new(),
            encounter:                0,
            healer:                   String::new(),
            profile:                  CharacterProfile::default(),
            talents:                  Talents::default(),
            strategy:                 StrategyConfig::default(),
            sweep_spell_ids:          Vec::new(),
            seed:                     0,
            time_step:                default_time_step(),
            overheal_spell_power:     0.0,
            use_estimated_heal_power: false,
            raid:                     Roster::default(),
        }
    }
}

impl AppConfig {
    /// `healer` as an optional filter.
    pub fn healer(&self) -> Option<&str> {
        if self.healer.is_empty() { None } else { Some(self.healer.as_str()) }
    }

    /// The combat log to analyse: `log_path` itself when it is a file, the
    /// newest combat log inside it when it is a directory.
    pub fn resolve_log_path(&self) -> Result<PathBuf> {
        if self.log_path.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("log_path is not set in {}", CONFIG_FILE));
        }
        if self.log_path.is_dir() {
            return find_latest_log(&self.log_path)
                .ok_or_else(|| anyhow::anyhow!("No WoWCombatLog*.txt in {:?}", self.log_path));
        }
        if self.log_path.is_file() {
            return Ok(self.log_path.clone());
        }
        Err(anyhow::anyhow!("Combat log {:?} does not exist", self.log_path))
    }
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

pub fn load_or_default(config_dir: &Path) -> Result<AppConfig> {
    let path = config_dir.join(CONFIG_FILE);
    if path.exists() {
        let raw = std::fs::read_to_string(&path)?;
        let cfg: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("Config parse error: {}", e))?;
        Ok(cfg)
    } else {
        Ok(AppConfig::default())
    }
}

pub fn save(config: &AppConfig, config_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(config_dir)?;
    let raw = toml::to_string_pretty(config)
        .map_err(|e| anyhow::anyhow!("Config serialize error: {}", e))?;
    std::fs::write(config_dir.join(CONFIG_FILE), raw)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Log directory helpers
// ---------------------------------------------------------------------------

/// Scans `logs_dir` for `WoWCombatLog*.txt` files and returns the path of the
/// one with the most recent `modified` timestamp.  Returns `None` if the
/// directory is empty or contains no matching files.
pub fn find_latest_log(logs_dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(logs_dir).ok()?;

    let mut best: Option<(PathBuf, std::time::SystemTime)> = None;

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name_str = name.to_string_lossy();

        if !name_str.starts_with("WoWCombatLog") || !name_str.ends_with(".txt") {
            continue;
        }

        let modified = match entry.metadata().and_then(|m| m.modified()) {
            Ok(t) => t,
            Err(_) => continue,
        };

        match &best {
            Some((_, best_time)) if modified <= *best_time => {}
            _ => best = Some((entry.path(), modified)),
        }
    }

    if let Some((ref p, _)) = best {
        tracing::debug!("find_latest_log: selected {:?}", p);
    }
    best.map(|(p, _)| p)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::time::{Duration, SystemTime};
    use tempfile::tempdir;

    #[test]
    fn round_trips_config() {
        let dir = tempdir().unwrap();
        let mut cfg = AppConfig::default();
        cfg.encounter       = 3;
        cfg.healer          = "Saintis".to_owned();
        cfg.sweep_spell_ids = vec![10917, 10965];
        cfg.strategy        = StrategyConfig::FixedSpell { spell_id: 10965 };
        cfg.talents         = Talents { improved_healing: 3, spiritual_healing: 5 };
        cfg.raid.tanks      = vec!["Tank".to_owned()];

        save(&cfg, dir.path()).unwrap();

        let loaded = load_or_default(dir.path()).unwrap();
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.healer(), Some("Saintis"));
    }

    #[test]
    fn returns_default_when_missing() {
        let dir = tempdir().unwrap();
        let cfg = load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.encounter, 0);
        assert_eq!(cfg.healer(), None);
        assert_eq!(cfg.profile.max_mana, 8_000.0);
        assert_eq!(cfg.time_step, 0.1);
        assert!(cfg.log_path.as_os_str().is_empty());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "healer = \"Olive\"\n\n[profile]\nheal_power = 1000.0\n",
        )
        .unwrap();

        let cfg = load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.healer, "Olive");
        assert_eq!(cfg.profile.heal_power, 1_000.0);
        assert_eq!(cfg.profile.mp5_out_of_combat, 200.0);
        assert_eq!(cfg.strategy, StrategyConfig::default());
    }

    #[test]
    fn rejects_malformed_file() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "encounter = \"first\"").unwrap();
        assert!(load_or_default(dir.path()).is_err());
    }

    #[test]
    fn find_latest_log_picks_newest() {
        let dir = tempdir().unwrap();

        let older_path = dir.path().join("WoWCombatLog_2020_01_01_100000.txt");
        let newer_path = dir.path().join("WoWCombatLog_2020_06_15_183000.txt");
        let plain      = dir.path().join("WoWCombatLog.txt");

        for (path, age_secs) in [(&older_path, 300), (&plain, 200), (&newer_path, 100)] {
            let mut file = std::fs::File::create(path).unwrap();
            file.write_all(b"log").unwrap();
            file.set_modified(SystemTime::now() - Duration::from_secs(age_secs)).unwrap();
        }

        assert_eq!(find_latest_log(dir.path()).unwrap(), newer_path);
    }

    #[test]
    fn find_latest_log_returns_none_for_empty_dir() {
        let dir = tempdir().unwrap();
        assert!(find_latest_log(dir.path()).is_none());
    }

    #[test]
    fn find_latest_log_ignores_non_combatlog_files() {
        let dir = tempdir().unwrap();
        std::fs::File::create(dir.path().join("Interface.log")).unwrap();
        std::fs::File::create(dir.path().join("addon_errors.txt")).unwrap();
        assert!(find_latest_log(dir.path()).is_none());
    }

    #[test]
    fn resolves_file_or_directory() {
        let dir = tempdir().unwrap();
        let log = dir.path().join("WoWCombatLog.txt");
        std::fs::write(&log, "x").unwrap();

        let mut cfg = AppConfig { log_path: dir.path().to_path_buf(), ..Default::default() };
        assert_eq!(cfg.resolve_log_path().unwrap(), log);

        cfg.log_path = log.clone();
        assert_eq!(cfg.resolve_log_path().unwrap(), log);

        cfg.log_path = dir.path().join("missing.txt");
        assert!(cfg.resolve_log_path().is_err());

        cfg.log_path = PathBuf::new();
        assert!(cfg.resolve_log_path().is_err());
    }
}
