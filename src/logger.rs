use std::sync::atomic::{AtomicU8, Ordering};

static LEVEL: AtomicU8 = AtomicU8::new(Level::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
}

impl Level {
    /// Parse a config level string; unknown values fall back to `Info`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "debug" => Level::Debug,
            "warn" => Level::Warn,
            "error" => Level::Error,
            _ => Level::Info,
        }
    }
}

/// Simple logger for retryable-chain
pub struct Logger;

impl Logger {
    pub fn set_level(level: Level) {
        LEVEL.store(level as u8, Ordering::Relaxed);
    }

    pub fn enabled(level: Level) -> bool {
        level as u8 >= LEVEL.load(Ordering::Relaxed)
    }

    pub fn info(msg: &str) {
        if Self::enabled(Level::Info) {
            println!("[INFO] {}", msg);
        }
    }

    pub fn debug(msg: &str) {
        if Self::enabled(Level::Debug) {
            println!("[DEBUG] {}", msg);
        }
    }

    pub fn warn(msg: &str) {
        if Self::enabled(Level::Warn) {
            eprintln!("[WARN] {}", msg);
        }
    }

    pub fn error(msg: &str) {
        eprintln!("[ERROR] {}", msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Level::Debug);
        assert_eq!(Level::parse("WARN"), Level::Warn);
        assert_eq!(Level::parse("error"), Level::Error);
        assert_eq!(Level::parse("bogus"), Level::Info);
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Error > Level::Warn);
        assert!(Level::Warn > Level::Info);
        assert!(Level::Info > Level::Debug);
    }
}
