use std::fmt;

/// Lifecycle state of the underlying media player.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaState {
    /// No media has been loaded yet.
    #[default]
    NothingSpecial,
    Opening,
    Buffering,
    Playing,
    Paused,
    Stopped,
    /// The end of the stream was reached.
    Ended,
    Error,
}

impl MediaState {
    /// Whether the player is actively presenting media.
    pub fn is_active(self) -> bool {
        matches!(self, MediaState::Playing | MediaState::Buffering)
    }
}

impl fmt::Display for MediaState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MediaState::NothingSpecial => "idle",
            MediaState::Opening => "opening",
            MediaState::Buffering => "buffering",
            MediaState::Playing => "playing",
            MediaState::Paused => "paused",
            MediaState::Stopped => "stopped",
            MediaState::Ended => "ended",
            MediaState::Error => "error",
        };
        f.write_str(label)
    }
}

/// Notification carrying the state a player just entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateChangedEvent {
    state: MediaState,
}

impl StateChangedEvent {
    pub fn new(state: MediaState) -> Self {
        Self { state }
    }

    /// The state the player entered.
    pub fn state(&self) -> MediaState {
        self.state
    }
}

impl From<MediaState> for StateChangedEvent {
    fn from(state: MediaState) -> Self {
        Self::new(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_nothing_special() {
        assert_eq!(MediaState::default(), MediaState::NothingSpecial);
    }

    #[test]
    fn events_compare_by_value() {
        let a = StateChangedEvent::new(MediaState::Playing);
        let b = StateChangedEvent::from(MediaState::Playing);
        assert_eq!(a, b);
        assert_ne!(a, StateChangedEvent::new(MediaState::Paused));
        assert_eq!(a.state(), MediaState::Playing);
    }

    #[test]
    fn labels() {
        assert_eq!(MediaState::NothingSpecial.to_string(), "idle");
        assert_eq!(MediaState::Ended.to_string(), "ended");
        assert!(MediaState::Buffering.is_active());
        assert!(!MediaState::Paused.is_active());
    }
}
