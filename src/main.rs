// Usage: heal-ledger [CONFIG_DIR]
//
// Reads CONFIG_DIR/config.toml (written with defaults on first run), analyses
// the configured combat log and writes the JSON report.
use std::path::PathBuf;

fn main() -> anyhow::Result<()> {
    let config_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let cfg = heal_ledger_lib::config::load_or_default(&config_dir)?;
    let log_dir = if cfg.log_dir.as_os_str().is_empty() {
        heal_ledger_lib::default_log_dir()
    } else {
        cfg.log_dir.clone()
    };
    heal_ledger_lib::init_logging(&log_dir);

    match heal_ledger_lib::run(&config_dir, &cfg) {
        Ok(report_path) => {
            println!("{}", report_path.display());
            Ok(())
        }
        Err(e) => {
            tracing::error!("{:#}", e);
            Err(e)
        }
    }
}
