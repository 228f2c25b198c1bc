//! Send gate: debounce plus single-flight guards.
//!
//! Every edit re-arms a quiet-period deadline; the session's select loop
//! sleeps until it. The auto and manual send paths are independent lanes,
//! each with its own single-flight flag (see DESIGN.md). Flags are plain
//! booleans: the session is a single task, so check-and-set within one
//! synchronous step is sufficient.

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Quiet period after the last edit before the trigger is evaluated.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

pub struct SendGate {
    enabled: bool,
    processing: bool,
    manual_busy: bool,
    debounce: Duration,
    deadline: Option<Instant>,
}

impl Default for SendGate {
    fn default() -> Self {
        Self::new(DEFAULT_DEBOUNCE)
    }
}

impl SendGate {
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            enabled: true,
            processing: false,
            manual_busy: false,
            debounce,
            deadline: None,
        }
    }

    /// Re-arm the quiet-period deadline. A later edit always supersedes an
    /// earlier one.
    pub fn note_edit(&mut self) {
        if !self.enabled {
            return;
        }
        self.deadline = Some(Instant::now() + self.debounce);
    }

    /// Pending deadline for the session's select loop, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.disarm();
        }
    }

    #[must_use]
    pub fn is_processing(&self) -> bool {
        self.processing
    }

    /// Enter the auto-send critical section. Returns false while disabled or
    /// while another auto send is in flight; the caller drops the evaluation
    /// in that case (no queueing).
    pub fn try_begin_auto(&mut self) -> bool {
        if !self.enabled || self.processing {
            debug!(
                enabled = self.enabled,
                processing = self.processing,
                "auto send suppressed"
            );
            return false;
        }
        self.processing = true;
        true
    }

    /// Release the auto lane. Called on success and failure alike so a
    /// failed request never leaves the gate wedged.
    pub fn finish_auto(&mut self) {
        self.processing = false;
    }

    /// Enter the manual-send critical section (independent lane).
    pub fn try_begin_manual(&mut self) -> bool {
        if self.manual_busy {
            return false;
        }
        self.manual_busy = true;
        true
    }

    pub fn finish_manual(&mut self) {
        self.manual_busy = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_lane_single_flight() {
        let mut gate = SendGate::default();
        assert!(gate.try_begin_auto());
        assert!(!gate.try_begin_auto());
        gate.finish_auto();
        assert!(gate.try_begin_auto());
    }

    #[test]
    fn test_disabled_gate_refuses_auto() {
        let mut gate = SendGate::default();
        gate.set_enabled(false);
        assert!(!gate.try_begin_auto());
        gate.set_enabled(true);
        assert!(gate.try_begin_auto());
    }

    #[test]
    fn test_manual_lane_is_independent() {
        let mut gate = SendGate::default();
        assert!(gate.try_begin_auto());
        // Manual lane unaffected by auto lane
        assert!(gate.try_begin_manual());
        assert!(!gate.try_begin_manual());
        gate.finish_manual();
        assert!(gate.try_begin_manual());
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_rearms_deadline() {
        let mut gate = SendGate::default();
        gate.note_edit();
        let first = gate.deadline().unwrap();

        tokio::time::advance(Duration::from_millis(500)).await;
        gate.note_edit();
        let second = gate.deadline().unwrap();
        assert!(second > first);
    }

    #[test]
    fn test_disable_disarms_pending_deadline() {
        let mut gate = SendGate::default();
        gate.note_edit();
        assert!(gate.deadline().is_some());
        gate.set_enabled(false);
        assert!(gate.deadline().is_none());
        // Edits while disabled do not arm
        gate.note_edit();
        assert!(gate.deadline().is_none());
    }
}
