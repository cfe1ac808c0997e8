//! Upstream source boundaries.
//!
//! The pipeline never talks to a video platform directly; it goes through
//! these traits. Real implementations live outside this workspace, and tests
//! substitute stubs.

use std::future::Future;

use vidlore_shared::{ChannelInfo, RawVideo, Result, TranscriptData};

/// Fetches transcripts for individual videos.
///
/// `Ok(None)` means the video simply has no usable transcript and should be
/// skipped. A [`VidloreError::SourceBlocked`] error means the upstream is
/// refusing requests entirely and the whole batch must stop; any other error
/// fails just the current video.
///
/// [`VidloreError::SourceBlocked`]: vidlore_shared::VidloreError::SourceBlocked
pub trait TranscriptSource: Send + Sync {
    fn fetch(
        &self,
        video_external_id: &str,
    ) -> impl Future<Output = Result<Option<TranscriptData>>> + Send;
}

/// Resolves channel references and enumerates their videos for registration.
pub trait ChannelSource: Send + Sync {
    /// Resolve a user-supplied reference (handle, URL, id) to channel metadata.
    fn resolve_channel(&self, reference: &str) -> impl Future<Output = Result<ChannelInfo>> + Send;

    /// List all currently visible videos on a channel.
    fn list_videos(
        &self,
        channel_external_id: &str,
    ) -> impl Future<Output = Result<Vec<RawVideo>>> + Send;
}
