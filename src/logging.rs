//! Logging setup on top of log4rs
//!
//! The root logger writes to the console. Access log lines go to the `access`
//! target, which is routed to stdout or to a file. SIGHUP rebuilds the config
//! and swaps it into the running logger, which reopens the access log file.

use crate::config::LoggingConfig;
use log::{info, LevelFilter};
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::append::Append;
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;
use thiserror::Error;

/// Log target used by the access log middleware
pub const ACCESS_TARGET: &str = "access";

const CONSOLE_PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} {h({l})} [{X(request)(-)}] {t} - {m}{n}";
const ACCESS_PATTERN: &str = "{m}{n}";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to load log config {path}: {message}")]
    ConfigFile { path: String, message: String },

    #[error("invalid log level {0}")]
    Level(String),

    #[error("failed to open access log {path}: {source}")]
    AccessLog {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid logging configuration: {0}")]
    Build(#[from] log4rs::config::runtime::ConfigErrors),

    #[error(transparent)]
    SetLogger(#[from] log::SetLoggerError),
}

/// Owned handle to the installed logger
pub struct LogHandle {
    handle: log4rs::Handle,
    settings: LoggingConfig,
}

impl LogHandle {
    /// Rebuilds the configuration and swaps it in, reopening file appenders
    pub fn reopen(&self) -> Result<(), LoggingError> {
        let config = build_config(&self.settings)?;
        self.handle.set_config(config);
        info!("Reopen access log file");
        Ok(())
    }
}

/// Installs the global logger
pub fn init(settings: &LoggingConfig) -> Result<LogHandle, LoggingError> {
    let config = build_config(settings)?;
    let handle = log4rs::init_config(config)?;
    Ok(LogHandle {
        handle,
        settings: settings.clone(),
    })
}

/// Builds a log4rs config from the external file if present, otherwise in code
pub fn build_config(settings: &LoggingConfig) -> Result<Config, LoggingError> {
    if !settings.config_file.is_empty() && Path::new(&settings.config_file).exists() {
        return log4rs::config::load_config_file(&settings.config_file, Default::default()).map_err(|e| {
            LoggingError::ConfigFile {
                path: settings.config_file.clone(),
                message: e.to_string(),
            }
        });
    }

    let level: LevelFilter = settings
        .level
        .parse()
        .map_err(|_| LoggingError::Level(settings.level.clone()))?;

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(CONSOLE_PATTERN)))
        .build();

    let access: Box<dyn Append> = if settings.access_log == "-" {
        Box::new(
            ConsoleAppender::builder()
                .encoder(Box::new(PatternEncoder::new(ACCESS_PATTERN)))
                .build(),
        )
    } else {
        let appender = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(ACCESS_PATTERN)))
            .append(true)
            .build(&settings.access_log)
            .map_err(|source| LoggingError::AccessLog {
                path: settings.access_log.clone(),
                source,
            })?;
        Box::new(appender)
    };

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .appender(Appender::builder().build("access", access))
        .logger(
            Logger::builder()
                .appender("access")
                .additive(false)
                .build(ACCESS_TARGET, LevelFilter::Info),
        )
        .build(Root::builder().appender("console").build(level))?;
    Ok(config)
}

/// Clears the `request` MDC key on drop, unwinding included
struct RequestContextGuard;

impl Drop for RequestContextGuard {
    fn drop(&mut self) {
        log_mdc::remove("request");
    }
}

/// Runs `f` with the `request` MDC key set, clearing it afterwards
pub fn with_request_context<R>(label: impl Into<String>, f: impl FnOnce() -> R) -> R {
    log_mdc::insert("request", label.into());
    let _guard = RequestContextGuard;
    f()
}
