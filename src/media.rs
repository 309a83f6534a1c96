use std::fmt::Formatter;
use std::sync::Arc;
use webrtc::track::track_local::TrackLocal;

/// Local media that is ready to be attached to a session's transport handle.
///
/// Capturing the media is not a concern of this crate: producers hand over already prepared
/// tracks (ie. `TrackLocalStaticSample`) once their source is ready to play.
#[derive(Clone, Default)]
pub struct MediaSource {
    tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
}

impl MediaSource {
    pub fn new(tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>) -> Self {
        MediaSource { tracks }
    }

    pub fn with_track(mut self, track: Arc<dyn TrackLocal + Send + Sync>) -> Self {
        self.tracks.push(track);
        self
    }

    pub fn tracks(&self) -> &[Arc<dyn TrackLocal + Send + Sync>] {
        &self.tracks
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl std::fmt::Debug for MediaSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<&str> = self.tracks.iter().map(|t| t.id()).collect();
        f.debug_struct("MediaSource").field("tracks", &ids).finish()
    }
}
