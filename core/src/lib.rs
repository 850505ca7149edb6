use anyhow::Context;
use log::LevelFilter;
use log4rs::{
    append::{
        console::{ConsoleAppender, Target},
        file::FileAppender,
    },
    config::{Appender, Config, Root},
    encode::pattern::PatternEncoder,
};

pub mod bit_grid;
pub mod constants;
pub mod direction;
pub mod geometry;

pub use bit_grid::BitGrid;
pub use direction::{Direction, EdgeMask};
pub use geometry::{Rect, Vec2};

/// Stderr lines carry the wall clock, file lines the full date.
const STDERR_PATTERN: &str = "{d(%H:%M:%S%.3f)} {h({l:<5})} {M} - {m}{n}";
const FILE_PATTERN: &str = "{d} {l} {f}:{L} - {m}{n}";

/// Installs the log4rs backend used by the map tooling.
///
/// Records at `log_level` and above go to stderr and, when `file_path` is
/// given, are appended to that file as well.
pub fn initialize_logger(log_level: LevelFilter, file_path: Option<&str>) -> anyhow::Result<()> {
    let stderr = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(STDERR_PATTERN)))
        .build();

    let mut config_builder =
        Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root_builder = Root::builder().appender("stderr");

    if let Some(path) = file_path {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new(FILE_PATTERN)))
            .build(path)
            .with_context(|| format!("failed to open log file {path}"))?;
        config_builder =
            config_builder.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root_builder = root_builder.appender("logfile");
    }

    let config = config_builder
        .build(root_builder.build(log_level))
        .context("invalid logger configuration")?;
    log4rs::init_config(config).context("logger already initialized")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unwritable_log_file_is_reported() {
        let blocker = std::env::temp_dir().join(format!("tactics-log-{}", std::process::id()));
        std::fs::write(&blocker, b"").unwrap();
        let path = blocker.join("map.log");

        let err = initialize_logger(LevelFilter::Info, path.to_str()).unwrap_err();
        assert!(err.to_string().contains("failed to open log file"));

        std::fs::remove_file(&blocker).unwrap();
    }
}
