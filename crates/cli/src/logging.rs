use anyhow::Result;
use harvest_core::tracing::{InstrumentationConfig, LogFormat, init_tracing};
use tracing::Level;

/// Initialize stderr logging for the CLI
///
/// `RUST_LOG`, when set, overrides `log_level`. Without `--log-json` the
/// format comes from `HARVEST_LOG_FORMAT`.
pub fn init_logging(log_level: Level, json: bool) -> Result<()> {
    let config = logging_config(InstrumentationConfig::from_env(), log_level, json);
    init_tracing(&config)?;
    Ok(())
}

fn logging_config(base: InstrumentationConfig, level: Level, json: bool) -> InstrumentationConfig {
    let config = base.with_level(filter_for(level));
    if json {
        config.with_format(LogFormat::Json)
    } else {
        config
    }
}

fn filter_for(level: Level) -> String {
    let level_str = level.as_str().to_lowercase();
    format!("harvest={level_str},harvest_http={level_str},harvest_core={level_str}")
}
