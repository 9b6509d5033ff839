//! Recorder state machine

use std::fmt;

use crate::domain::error::RecorderError;

/// Caller-visible recorder states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecorderState {
    #[default]
    Inactive,
    Recording,
    Paused,
}

impl RecorderState {
    /// Get the string representation
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Recording => "recording",
            Self::Paused => "paused",
        }
    }

    pub const fn is_active(&self) -> bool {
        !matches!(self, Self::Inactive)
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// In-flight phase of the start/stop cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Starting,
    Active,
    Stopping,
}

/// Transition bookkeeping for one capture session.
///
/// Every cycle that leaves `Idle` is tagged with a generation. Tearing the
/// session down (dispose, device failure) bumps the generation so that a
/// suspended `start()`/`stop()` or a late encoder notification can tell it
/// no longer owns the session.
///
/// State machine:
///   Idle -> Starting (begin_start)
///   Starting -> Active/Recording (commit_start)
///   Starting -> Idle (abort_start)
///   Active/Recording <-> Active/Paused (pause, resume)
///   Active -> Stopping (begin_stop)
///   Stopping -> Idle (finish_stop)
///   any -> Idle (reset)
#[derive(Debug)]
pub struct Lifecycle {
    state: RecorderState,
    phase: Phase,
    generation: u64,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RecorderState::Inactive,
            phase: Phase::Idle,
            generation: 0,
        }
    }

    /// Caller-visible state. A pending start is still inactive.
    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether `generation` still owns a live (non-idle) session
    pub fn is_current(&self, generation: u64) -> bool {
        self.phase != Phase::Idle && self.generation == generation
    }

    /// Idle -> Starting. Returns the generation of the new cycle.
    pub fn begin_start(&mut self) -> Result<u64, RecorderError> {
        if self.phase != Phase::Idle {
            return Err(RecorderError::AlreadyActive);
        }
        self.generation += 1;
        self.phase = Phase::Starting;
        Ok(self.generation)
    }

    /// Starting -> Recording
    pub fn commit_start(&mut self, generation: u64) -> Result<(), RecorderError> {
        if self.phase != Phase::Starting || self.generation != generation {
            return Err(RecorderError::Aborted);
        }
        self.phase = Phase::Active;
        self.state = RecorderState::Recording;
        Ok(())
    }

    /// Starting -> Idle after a failed start. Returns false if the cycle
    /// was already torn down.
    pub fn abort_start(&mut self, generation: u64) -> bool {
        if self.phase != Phase::Starting || self.generation != generation {
            return false;
        }
        self.phase = Phase::Idle;
        self.state = RecorderState::Inactive;
        true
    }

    /// Recording -> Paused
    pub fn pause(&mut self) -> Result<(), RecorderError> {
        match (self.phase, self.state) {
            (Phase::Stopping, _) => Err(RecorderError::AlreadyStopping),
            (Phase::Active, RecorderState::Recording) => {
                self.state = RecorderState::Paused;
                Ok(())
            }
            _ => Err(RecorderError::NotRecording),
        }
    }

    /// Paused -> Recording
    pub fn resume(&mut self) -> Result<(), RecorderError> {
        match (self.phase, self.state) {
            (Phase::Stopping, _) => Err(RecorderError::AlreadyStopping),
            (Phase::Active, RecorderState::Paused) => {
                self.state = RecorderState::Recording;
                Ok(())
            }
            _ => Err(RecorderError::NotPaused),
        }
    }

    /// Active -> Stopping. Returns the generation being stopped.
    pub fn begin_stop(&mut self) -> Result<u64, RecorderError> {
        match self.phase {
            Phase::Active => {
                self.phase = Phase::Stopping;
                Ok(self.generation)
            }
            Phase::Stopping => Err(RecorderError::AlreadyStopping),
            Phase::Idle | Phase::Starting => Err(RecorderError::NotActive),
        }
    }

    /// Stopping -> Idle
    pub fn finish_stop(&mut self, generation: u64) -> Result<(), RecorderError> {
        if self.phase != Phase::Stopping || self.generation != generation {
            return Err(RecorderError::Aborted);
        }
        self.phase = Phase::Idle;
        self.state = RecorderState::Inactive;
        Ok(())
    }

    /// Force the session back to Idle from any phase.
    ///
    /// Returns true if anything was torn down; a second reset in a row is a
    /// no-op and returns false.
    pub fn reset(&mut self) -> bool {
        if self.phase == Phase::Idle {
            return false;
        }
        self.generation += 1;
        self.phase = Phase::Idle;
        self.state = RecorderState::Inactive;
        true
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recording() -> (Lifecycle, u64) {
        let mut lc = Lifecycle::new();
        let generation = lc.begin_start().unwrap();
        lc.commit_start(generation).unwrap();
        (lc, generation)
    }

    #[test]
    fn new_lifecycle_is_inactive() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), RecorderState::Inactive);
        assert_eq!(lc.phase, Phase::Idle);
    }

    #[test]
    fn starting_is_still_inactive() {
        let mut lc = Lifecycle::new();
        lc.begin_start().unwrap();
        assert_eq!(lc.phase, Phase::Starting);
        assert_eq!(lc.state(), RecorderState::Inactive);
    }

    #[test]
    fn start_while_starting_fails() {
        let mut lc = Lifecycle::new();
        lc.begin_start().unwrap();
        assert_eq!(lc.begin_start(), Err(RecorderError::AlreadyActive));
    }

    #[test]
    fn start_while_recording_fails() {
        let (mut lc, _) = recording();
        assert_eq!(lc.begin_start(), Err(RecorderError::AlreadyActive));
        assert_eq!(lc.state(), RecorderState::Recording);
    }

    #[test]
    fn pause_resume_cycle() {
        let (mut lc, _) = recording();
        lc.pause().unwrap();
        assert_eq!(lc.state(), RecorderState::Paused);
        assert_eq!(lc.pause(), Err(RecorderError::NotRecording));
        lc.resume().unwrap();
        assert_eq!(lc.state(), RecorderState::Recording);
        assert_eq!(lc.resume(), Err(RecorderError::NotPaused));
    }

    #[test]
    fn pause_and_resume_from_inactive_fail() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.pause(), Err(RecorderError::NotRecording));
        assert_eq!(lc.resume(), Err(RecorderError::NotPaused));
        assert_eq!(lc.state(), RecorderState::Inactive);
    }

    #[test]
    fn stop_from_inactive_fails() {
        let mut lc = Lifecycle::new();
        assert_eq!(lc.begin_stop(), Err(RecorderError::NotActive));
        lc.begin_start().unwrap();
        assert_eq!(lc.begin_stop(), Err(RecorderError::NotActive));
    }

    #[test]
    fn second_stop_is_rejected() {
        let (mut lc, _) = recording();
        lc.begin_stop().unwrap();
        assert_eq!(lc.begin_stop(), Err(RecorderError::AlreadyStopping));
        assert_eq!(lc.pause(), Err(RecorderError::AlreadyStopping));
        assert_eq!(lc.resume(), Err(RecorderError::AlreadyStopping));
    }

    #[test]
    fn stop_from_paused() {
        let (mut lc, generation) = recording();
        lc.pause().unwrap();
        assert_eq!(lc.begin_stop(), Ok(generation));
        lc.finish_stop(generation).unwrap();
        assert_eq!(lc.state(), RecorderState::Inactive);
    }

    #[test]
    fn reset_invalidates_pending_start() {
        let mut lc = Lifecycle::new();
        let generation = lc.begin_start().unwrap();
        assert!(lc.reset());
        assert_eq!(lc.commit_start(generation), Err(RecorderError::Aborted));
        assert!(!lc.abort_start(generation));
        assert_eq!(lc.state(), RecorderState::Inactive);
    }

    #[test]
    fn reset_invalidates_pending_stop() {
        let (mut lc, generation) = recording();
        lc.begin_stop().unwrap();
        assert!(lc.reset());
        assert_eq!(lc.finish_stop(generation), Err(RecorderError::Aborted));
    }

    #[test]
    fn reset_is_idempotent() {
        let (mut lc, _) = recording();
        assert!(lc.reset());
        assert!(!lc.reset());
        assert_eq!(lc.state(), RecorderState::Inactive);
    }

    #[test]
    fn generations_are_distinct_per_cycle() {
        let (mut lc, first) = recording();
        lc.begin_stop().unwrap();
        lc.finish_stop(first).unwrap();
        assert!(!lc.is_current(first));

        let second = lc.begin_start().unwrap();
        assert_ne!(first, second);
        assert!(lc.is_current(second));
    }

    #[test]
    fn state_display() {
        assert_eq!(RecorderState::Inactive.to_string(), "inactive");
        assert_eq!(RecorderState::Recording.to_string(), "recording");
        assert_eq!(RecorderState::Paused.to_string(), "paused");
    }
}
