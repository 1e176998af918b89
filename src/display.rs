//! Display collaborator interface.
//!
//! The pipeline never draws anything itself. When a run wants frames
//! shown for human inspection it hands them to a [`FrameDisplay`], and
//! pauses between frames according to a [`WaitPolicy`].

use crate::frame::Frame;
use log::info;
use std::time::Duration;

/// How long to pause after showing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
    /// Block until the operator confirms.
    Block,
    /// Continue after a fixed delay.
    Delay(Duration),
}

impl WaitPolicy {
    /// Negative durations mean block-until-confirmed.
    pub fn from_millis(millis: i64) -> Self {
        if millis < 0 {
            WaitPolicy::Block
        } else {
            WaitPolicy::Delay(Duration::from_millis(millis as u64))
        }
    }
}

/// Something that can show frames to a human.
pub trait FrameDisplay {
    fn show_frame(&mut self, frame: &Frame, caption: &str);

    /// Let the operator pick a point on the last shown frame. Displays
    /// without interaction return `None`.
    fn select_point(&mut self) -> Option<(f32, f32)> {
        None
    }

    /// Mark a position on the last shown frame.
    fn attach_marker(&mut self, _x: f32, _y: f32) {}

    /// Pause per policy. Non-interactive displays treat `Block` as no
    /// wait at all.
    fn wait(&mut self, _policy: WaitPolicy) {}
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullDisplay;

impl FrameDisplay for NullDisplay {
    fn show_frame(&mut self, _frame: &Frame, _caption: &str) {}
}

/// Logs a caption and frame statistics instead of drawing.
#[derive(Debug, Default)]
pub struct LogDisplay;

impl FrameDisplay for LogDisplay {
    fn show_frame(&mut self, frame: &Frame, caption: &str) {
        let (min, max) = frame.min_max().unwrap_or((0.0, 0.0));
        info!(
            "{caption}: dims {:?}, mean {:.3}, min {min:.3}, max {max:.3}",
            frame.dimensions(),
            frame.mean()
        );
    }

    fn attach_marker(&mut self, x: f32, y: f32) {
        info!("marker at ({x:.1}, {y:.1})");
    }

    fn wait(&mut self, policy: WaitPolicy) {
        if let WaitPolicy::Delay(d) = policy {
            if !d.is_zero() {
                std::thread::sleep(d);
            }
        }
    }
}
