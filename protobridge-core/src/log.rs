//! A minimal logging facade.
//!
//! The gateway core never depends on a concrete logging backend; embedders
//! install one with [`set_logger`]. Until one is installed, log calls are
//! dropped by [`NopLogger`].

use std::sync::OnceLock;

/// A log sink. Methods take pre-formatted strings so the trait stays object-safe.
pub trait Logger: Send + Sync {
    fn debugf(&self, msg: &str);
    fn warnf(&self, msg: &str);
    fn errorf(&self, msg: &str);
}

struct NopLogger;

impl Logger for NopLogger {
    fn debugf(&self, _msg: &str) {}
    fn warnf(&self, _msg: &str) {}
    fn errorf(&self, _msg: &str) {}
}

static LOGGER: OnceLock<Box<dyn Logger>> = OnceLock::new();

/// Install the process-wide logger. Only the first call takes effect;
/// later calls are ignored, matching the one-shot wiring done at startup.
pub fn set_logger(logger: Box<dyn Logger>) {
    let _ = LOGGER.set(logger);
}

fn logger() -> &'static dyn Logger {
    LOGGER.get_or_init(|| Box::new(NopLogger)).as_ref()
}

pub fn debugf(msg: &str) {
    logger().debugf(msg);
}

pub fn warnf(msg: &str) {
    logger().warnf(msg);
}

pub fn errorf(msg: &str) {
    logger().errorf(msg);
}
