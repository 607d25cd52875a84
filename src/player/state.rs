//! Player state and run outcome types.

/// Where the player is in the playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerState {
    /// Nothing played yet
    #[default]
    Idle,
    /// Playing the playlist entry at this index
    Playing(usize),
    /// Playlist exhausted or playback cancelled
    Terminated,
}

impl PlayerState {
    /// Index of the current track, if one is playing.
    pub fn index(self) -> Option<usize> {
        match self {
            PlayerState::Playing(index) => Some(index),
            _ => None,
        }
    }

    pub fn is_terminated(self) -> bool {
        self == PlayerState::Terminated
    }
}

/// What handling one backend event means for the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Continue,
    Finished,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every playlist entry played to its end
    Finished,
    /// Stopped by a signal
    Interrupted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index() {
        assert_eq!(PlayerState::Idle.index(), None);
        assert_eq!(PlayerState::Playing(3).index(), Some(3));
        assert_eq!(PlayerState::Terminated.index(), None);
        assert!(PlayerState::Terminated.is_terminated());
        assert!(!PlayerState::default().is_terminated());
    }
}
