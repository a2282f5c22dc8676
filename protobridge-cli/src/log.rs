use protobridge_core::log::Logger;

/// Writes log lines to stderr, filtering out debug lines unless verbose
/// logging was requested.
pub struct StderrLogger {
    debug_enabled: bool,
}

impl StderrLogger {
    pub fn new(level: &str) -> Self {
        StderrLogger { debug_enabled: level == "debug" }
    }
}

impl Logger for StderrLogger {
    fn debugf(&self, msg: &str) {
        if self.debug_enabled {
            eprintln!("DEBUG {msg}");
        }
    }

    fn warnf(&self, msg: &str) {
        eprintln!("WARN {msg}");
    }

    fn errorf(&self, msg: &str) {
        eprintln!("ERROR {msg}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_level_suppresses_debug_lines() {
        let logger = StderrLogger::new("info");
        assert!(!logger.debug_enabled);
    }

    #[test]
    fn debug_level_enables_debug_lines() {
        let logger = StderrLogger::new("debug");
        assert!(logger.debug_enabled);
    }
}
