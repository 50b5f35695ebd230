//! Error taxonomy for playlist navigation, clip loading and cache transitions.
//!
//! Lower layers (cache, pipeline) only report; the coordinator decides what
//! the session sees. Nothing here retries on its own.

use thiserror::Error;

use super::clip::TrackId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlayerError {
    /// Navigation asked for a target but the playlist has no tracks.
    #[error("playlist is empty")]
    EmptyPlaylist,

    /// Identifier is not part of the playlist.
    #[error("track not in playlist: {0}")]
    UnknownTrack(TrackId),

    /// Same identifier supplied twice at construction.
    #[error("track listed more than once: {0}")]
    DuplicateTrack(TrackId),

    /// Empty identifier supplied at construction.
    #[error("track identifier is empty")]
    InvalidTrack,

    /// FetchAndPrepare reported an error. Recoverable: the user may retry.
    #[error("failed to load {id}: {cause}")]
    LoadFailed { id: TrackId, cause: String },

    /// Entry is `Loading` but no pipeline fetch owns it, so nothing would
    /// ever complete the request.
    #[error("load already in flight for {0}")]
    AlreadyLoading(TrackId),

    /// Transport command needs a prepared clip but none is active.
    #[error("no clip is active")]
    NoActiveClip,
}

impl PlayerError {
    /// True for errors the user can recover from by issuing another command.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, PlayerError::AlreadyLoading(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = PlayerError::LoadFailed {
            id: TrackId::from("http://a/1.mp4"),
            cause: "404".into(),
        };
        assert_eq!(err.to_string(), "failed to load http://a/1.mp4: 404");
        assert!(err.is_recoverable());
        assert!(!PlayerError::AlreadyLoading(TrackId::from("x")).is_recoverable());
    }
}
