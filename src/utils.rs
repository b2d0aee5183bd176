//! Small ambient helpers: logger setup.

use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode};

/// Initialize terminal logging for binaries and examples. Safe to call more
/// than once; later calls are ignored.
pub fn init_logger(level: LevelFilter) {
    let _ = TermLogger::init(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}
