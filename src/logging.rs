//! Logger bootstrap for the command line tool.

use std::path::PathBuf;

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming,
    WriteMode,
};

use crate::config::LoggingConfig;

const LOG_FILE_BASENAME: &str = "threedi-schema";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;

/// Log specification for our crate; dependencies stay at warn.
pub fn log_spec(config: &LoggingConfig) -> String {
    format!("warn, threedi_schema={}", config.threedi_schema)
}

/// Starts logging to stderr, or to rotating files when a directory is
/// configured. The returned handle must be kept alive.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggerHandle, FlexiLoggerError> {
    let logger = Logger::try_with_str(log_spec(config))?;
    let logger = match &config.directory {
        Some(dir) => logger
            .log_to_file(
                FileSpec::default()
                    .directory(PathBuf::from(dir))
                    .basename(LOG_FILE_BASENAME),
            )
            .rotate(
                Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
                Naming::Numbers,
                Cleanup::KeepLogFiles(config.keep_files),
            )
            .duplicate_to_stderr(Duplicate::Warn)
            .write_mode(WriteMode::BufferAndFlush)
            .append()
            .format_for_files(flexi_logger::detailed_format),
        None => logger.log_to_stderr(),
    };
    logger.start()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_spec() {
        let config = LoggingConfig {
            threedi_schema: "debug".to_string(),
            directory: None,
            keep_files: 5,
        };
        assert_eq!(log_spec(&config), "warn, threedi_schema=debug");
    }
}
