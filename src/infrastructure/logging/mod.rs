//! Logging setup on `log` + `log4rs`.

mod consts;

pub use consts::*;

use crate::foundation::SkusError;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        rolling_file::{
            policy::compound::{roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger, CompoundPolicy},
            RollingFileAppender,
        },
    },
    config::{Appender, Logger, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use std::io::IsTerminal;
use std::path::Path;

const CONSOLE_APPENDER: &str = "stderr";
const LOG_FILE_APPENDER: &str = "log_file";
const ERR_LOG_FILE_APPENDER: &str = "err_log_file";

/// Parsed filter expression such as `"info,skus_core=debug,root=warn"`.
#[derive(Debug, PartialEq, Eq)]
pub struct LogFilters {
    /// Level for whitelisted crates; the first bare level in the expression, INFO otherwise.
    pub app_level: LevelFilter,
    /// `root=<level>` opts every third-party crate in.
    pub root_level: LevelFilter,
    pub modules: Vec<(String, LevelFilter)>,
}

impl LogFilters {
    pub fn parse(filters: &str) -> Self {
        let mut app_level = None;
        let mut root_level = None;
        let mut modules = Vec::new();
        for part in filters.split(',').map(str::trim).filter(|part| !part.is_empty()) {
            match part.split_once('=') {
                None => {
                    if app_level.is_none() {
                        app_level = part.parse().ok();
                    }
                }
                Some((module, level)) => {
                    let (module, level) = (module.trim(), level.trim());
                    let Ok(level) = level.parse::<LevelFilter>() else {
                        continue;
                    };
                    if module == "root" {
                        root_level.get_or_insert(level);
                    } else if !module.is_empty() {
                        modules.push((module.to_string(), level));
                    }
                }
            }
        }
        Self { app_level: app_level.unwrap_or(LevelFilter::Info), root_level: root_level.unwrap_or(LevelFilter::Off), modules }
    }
}

fn rolling_appender(dir: &Path, file_name: &str) -> Result<RollingFileAppender, SkusError> {
    let archive_pattern = dir.join(format!("{file_name}.{{}}.gz"));
    let archive_pattern = archive_pattern
        .to_str()
        .ok_or_else(|| SkusError::ConfigError(format!("log dir is not valid utf-8: {}", dir.display())))?;
    let roller = FixedWindowRoller::builder()
        .base(1)
        .build(archive_pattern, LOG_FILE_MAX_ROLLS)
        .map_err(|err| SkusError::ConfigError(format!("log roller: {err}")))?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(LOG_FILE_MAX_SIZE)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(LOG_LINE_PATTERN)))
        .build(dir.join(file_name), Box::new(policy))
        .map_err(|err| SkusError::ConfigError(format!("log file {file_name}: {err}")))
}

/// Installs the global logger: stderr always, plus `skus.log` and a warn-level `skus_err.log`
/// when `log_dir` is set. Repeated calls keep the first logger.
pub fn init_logger(log_dir: Option<&str>, filters: &str) -> Result<(), SkusError> {
    let filters = LogFilters::parse(filters);

    let console_pattern = if std::io::stderr().is_terminal() { LOG_LINE_PATTERN_COLORED } else { LOG_LINE_PATTERN };
    let console = ConsoleAppender::builder().target(Target::Stderr).encoder(Box::new(PatternEncoder::new(console_pattern))).build();

    let mut builder = Config::builder().appender(Appender::builder().build(CONSOLE_APPENDER, Box::new(console)));
    let mut appenders = vec![CONSOLE_APPENDER.to_string()];

    if let Some(dir) = log_dir.map(str::trim).filter(|dir| !dir.is_empty()) {
        let dir = Path::new(dir);
        builder = builder
            .appender(Appender::builder().build(LOG_FILE_APPENDER, Box::new(rolling_appender(dir, LOG_FILE_NAME)?)))
            .appender(
                Appender::builder()
                    .filter(Box::new(ThresholdFilter::new(LevelFilter::Warn)))
                    .build(ERR_LOG_FILE_APPENDER, Box::new(rolling_appender(dir, ERR_LOG_FILE_NAME)?)),
            );
        appenders.push(LOG_FILE_APPENDER.to_string());
        appenders.push(ERR_LOG_FILE_APPENDER.to_string());
    }

    for crate_name in WHITELISTED_CRATES.iter().filter(|name| !filters.modules.iter().any(|(m, _)| m == *name)) {
        builder = builder.logger(Logger::builder().appenders(appenders.clone()).additive(false).build(*crate_name, filters.app_level));
    }
    for (module, level) in &filters.modules {
        builder = builder.logger(Logger::builder().appenders(appenders.clone()).additive(false).build(module, *level));
    }

    let config = builder
        .build(Root::builder().appenders(appenders).build(filters.root_level))
        .map_err(|err| SkusError::ConfigError(format!("log config: {err}")))?;
    let _ = log4rs::init_config(config);
    Ok(())
}
