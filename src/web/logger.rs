use std::str::FromStr;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use super::config::LoggingConfig;

const LOG_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";

/// Install the global logger: stderr always, plus a file when configured.
///
/// stdout is never used so that worker mode and the server can share a binary.
pub fn setup_logging(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = LevelFilter::from_str(&config.level)
        .map_err(|e| format!("invalid log level {:?}: {e}", config.level))?;

    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();

    let mut builder =
        Config::builder().appender(Appender::builder().build("console", Box::new(console)));
    let mut root = Root::builder().appender("console");

    if let Some(path) = &config.file {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
            .build(path)?;
        builder = builder.appender(Appender::builder().build("file", Box::new(file)));
        root = root.appender("file");
    }

    let config = builder.build(root.build(level))?;
    log4rs::init_config(config)?;
    Ok(())
}

// Convenience macros
#[macro_export]
macro_rules! sys_debug {
    ($($arg:tt)*) => {
        ::log::debug!(target: "fraud_bridge", $($arg)*)
    };
}

#[macro_export]
macro_rules! sys_info {
    ($($arg:tt)*) => {
        ::log::info!(target: "fraud_bridge", $($arg)*)
    };
}

#[macro_export]
macro_rules! sys_warn {
    ($($arg:tt)*) => {
        ::log::warn!(target: "fraud_bridge", $($arg)*)
    };
}

#[macro_export]
macro_rules! sys_error {
    ($($arg:tt)*) => {
        ::log::error!(target: "fraud_bridge", $($arg)*)
    };
}
