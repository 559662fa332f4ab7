pub mod config;
pub mod correlator;
pub mod error;
pub mod event;
pub mod overheal;
pub mod parser;
pub mod report;
pub mod simulator;
pub mod spell_stats;
pub mod spells;
pub mod strategy;
pub mod tracker;

use anyhow::Result;
use rand::{rngs::StdRng, SeedableRng};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::overheal::OverhealFilter;
use crate::report::EncounterReport;
use crate::simulator::SimulationConfig;
use crate::spells::SpellTable;

pub const REPORT_FILE: &str = "report.json";

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Default log directory when the config leaves `log_dir` empty:
/// `%APPDATA%\heal-ledger\logs` on Windows, `$TMPDIR/heal-ledger/logs` elsewhere.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("APPDATA")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir());
    base.join("heal-ledger").join("logs")
}

/// Rolling daily file log plus a panic hook that routes panics through
/// tracing. Call once, before anything else logs.
pub fn init_logging(log_dir: &Path) {
    let _ = std::fs::create_dir_all(log_dir);

    let file_appender = tracing_appender::rolling::daily(log_dir, "heal-ledger.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    // Keep _guard alive for the process lifetime (drop = flush)
    std::mem::forget(_guard);

    let filter = tracing_subscriber::EnvFilter::from_default_env();
    let filter = match "heal_ledger_lib=info".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false) // log files should not contain ANSI colour codes
        .init();

    // -----------------------------------------------------------------------
    // Panic hook: log panics through tracing before the process dies.
    // -----------------------------------------------------------------------
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        tracing::error!("PANIC at {}: {}", location, message);
    }));

    tracing::info!("Heal Ledger starting, logs → {}", log_dir.display());
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Analyse one encounter of an already-read combat log.
///
/// Pipeline: parser -> correlator + tracker -> simulator (+ sweep) -> report
pub fn analyse<S: AsRef<str>>(lines: &[S], cfg: &AppConfig) -> Result<EncounterReport> {
    let table = SpellTable::builtin();
    let healer = cfg.healer();

    let encounter = parser::select_encounter(lines, cfg.encounter)?;
    let events = parser::parse_encounter(lines, &encounter);

    let correlation = correlator::correlate(&events, None)?;
    let timeline = tracker::track(&events, healer)?;
    let overheal = overheal::overheal_report(
        &events,
        table,
        &OverhealFilter { source: healer, spell_power: cfg.overheal_spell_power, ..Default::default() },
    );

    let mut report = EncounterReport::new(&encounter.boss, encounter.duration_secs(), healer)
        .with_casts(&correlation, table, &cfg.raid)
        .with_deficits(&timeline, &cfg.raid)
        .with_overheal(overheal);

    let mut profile = cfg.profile;
    if let Some(healer) = healer {
        let usage = spell_stats::spell_usage(
            &correlation,
            &events,
            table,
            &cfg.talents,
            healer,
            cfg.overheal_spell_power,
        );
        let spell_power = spell_stats::estimate_spell_power(&events, table, healer, &cfg.talents);
        if cfg.use_estimated_heal_power {
            match spell_power.spell_power {
                Some(estimate) => {
                    tracing::info!("Simulating {} with estimated +{:.0} healing", healer, estimate);
                    profile.heal_power = estimate.max(0.0);
                }
                None => tracing::warn!("No +healing estimate for {}, keeping {}", healer, profile.heal_power),
            }
        }
        report = report.with_spell_stats(usage, spell_power);
    }

    if timeline.is_empty() {
        tracing::warn!("No heal or damage events in {}, skipping simulation", encounter.boss);
        return Ok(report);
    }

    let sim_config = SimulationConfig {
        encounter_duration: encounter.duration_secs(),
        time_step:          cfg.time_step,
    };

    let strategy = cfg.strategy.build(table, &cfg.talents);
    let mut rng = StdRng::seed_from_u64(cfg.seed);
    let result = simulator::simulate(&timeline, &profile, strategy.as_ref(), &sim_config, &mut rng)?;
    tracing::info!(
        "{} on {}: {:.0} healing, {} casts, {:.0} end mana",
        result.strategy,
        encounter.boss,
        result.net_healing,
        result.casts,
        result.end_mana
    );
    report = report.with_simulation(&result);

    if !cfg.sweep_spell_ids.is_empty() {
        let sweep = simulator::sweep_fixed_spells(
            &timeline,
            &profile,
            table,
            &cfg.talents,
            &cfg.sweep_spell_ids,
            &sim_config,
            cfg.seed,
        )?;
        report = report.with_sweep(&sweep);
    }

    Ok(report)
}

/// Analyse the log configured in `cfg` (loaded from `config_dir`) and write the
/// JSON report. Returns the report path.
///
/// When `config_dir` has no config file yet, `cfg` is written there first so
/// there is something to edit.
pub fn run(config_dir: &Path, cfg: &AppConfig) -> Result<PathBuf> {
    let cfg_path = config_dir.join(config::CONFIG_FILE);
    if !cfg_path.exists() {
        config::save(cfg, config_dir)?;
        tracing::info!("Wrote default config to {}", cfg_path.display());
    }

    let log_path = cfg.resolve_log_path()?;
    tracing::info!("Reading combat log {}", log_path.display());
    let lines = parser::read_lines(&log_path)?;

    let report = analyse(&lines, cfg)?;

    let report_path = if cfg.report_path.as_os_str().is_empty() {
        config_dir.join(REPORT_FILE)
    } else {
        cfg.report_path.clone()
    };
    std::fs::write(&report_path, report.to_json()?)?;
    tracing::info!("Report written to {}", report_path.display());

    Ok(report_path)
}
