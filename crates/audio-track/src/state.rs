//! Track lifecycle state machine.
//!
//! `TrackLifecycle` is a pure, `no_std`, allocation-free state machine that
//! tracks where a track is in its life:
//!
//! ```text
//! Created ──start──► Started ──flush──► Flushing
//!    │                  │                  │
//!    └──────────────────┴──────stop────────┴──► Stopped
//! ```
//!
//! It has **no** I/O. The audio track consults it before driving hardware and
//! logs (rather than propagates) the [`StateError`] of a redundant call.

/// Current track state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TrackState {
    /// Buffering; the hardware has not been started.
    Created,
    /// The hardware is pulling frames.
    Started,
    /// Draining what is buffered; no more data is expected.
    Flushing,
    /// Hardware stopped; the track only awaits destruction.
    Stopped,
}

impl TrackState {
    /// Short name for log lines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Started => "started",
            Self::Flushing => "flushing",
            Self::Stopped => "stopped",
        }
    }
}

/// A transition that does not apply in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StateError {
    /// `start` on a track that is already running.
    AlreadyStarted,
    /// `flush` before the hardware was ever started.
    NotStarted,
    /// Any transition out of `Stopped`.
    Stopped,
}

impl core::fmt::Display for StateError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::AlreadyStarted => f.write_str("track already started"),
            Self::NotStarted => f.write_str("track not started"),
            Self::Stopped => f.write_str("track stopped"),
        }
    }
}

/// Pure state machine for track control.
pub struct TrackLifecycle {
    state: TrackState,
}

impl TrackLifecycle {
    /// A freshly created track.
    pub const fn new() -> Self {
        Self {
            state: TrackState::Created,
        }
    }

    /// Hardware start.
    ///
    /// Transitions:
    /// - `Created  → Started`  ✓
    /// - `Started / Flushing`  returns `Err(AlreadyStarted)`
    /// - `Stopped`             returns `Err(Stopped)`
    ///
    /// # Errors
    ///
    /// See the transition table.
    pub fn start(&mut self) -> Result<(), StateError> {
        match self.state {
            TrackState::Created => {
                self.state = TrackState::Started;
                Ok(())
            }
            TrackState::Started | TrackState::Flushing => Err(StateError::AlreadyStarted),
            TrackState::Stopped => Err(StateError::Stopped),
        }
    }

    /// Begin draining.
    ///
    /// Transitions:
    /// - `Started  → Flushing`  ✓
    /// - `Flushing → Flushing`  idempotent, returns `Ok(())`
    /// - `Created`              returns `Err(NotStarted)`
    /// - `Stopped`              returns `Err(Stopped)`
    ///
    /// # Errors
    ///
    /// See the transition table.
    pub fn flush(&mut self) -> Result<(), StateError> {
        match self.state {
            TrackState::Started | TrackState::Flushing => {
                self.state = TrackState::Flushing;
                Ok(())
            }
            TrackState::Created => Err(StateError::NotStarted),
            TrackState::Stopped => Err(StateError::Stopped),
        }
    }

    /// Stop. Always succeeds; stopping twice is a no-op.
    pub fn stop(&mut self) {
        self.state = TrackState::Stopped;
    }

    /// Return the current [`TrackState`].
    pub fn state(&self) -> TrackState {
        self.state
    }

    /// `true` once the hardware has been started (and not stopped).
    pub fn is_running(&self) -> bool {
        matches!(self.state, TrackState::Started | TrackState::Flushing)
    }
}

impl Default for TrackLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
