//! Human-looking input timing.
//!
//! Constant-velocity, straight-line, fixed-delay input is trivially spotted by
//! anti-bot heuristics. Everything here is pure: callers get back timed paths
//! and key sequences and are responsible for dispatching them.

pub mod cursor;
pub mod keyboard;
pub mod mouse;

pub use keyboard::{TypingAction, TypingSequence, TypingStep, keypress_delay, typing_sequence};
pub use mouse::{PathPoint, click_delay, mouse_path};

/// Uniform sample in `[min, max)`.
pub(crate) fn random_in_range(min: f64, max: f64) -> f64 {
    min + rand::random::<f64>() * (max - min)
}

pub(crate) fn random_millis(min: f64, max: f64) -> std::time::Duration {
    std::time::Duration::from_millis(random_in_range(min, max).floor().max(0.0) as u64)
}
