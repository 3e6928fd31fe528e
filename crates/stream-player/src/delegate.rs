/// Observer for pipeline state changes.
///
/// Callbacks carry no payload; re-read state through the controller accessors.
/// They run on the worker threads, so keep them short.
pub trait PlaybackDelegate: Send + Sync {
    /// The sink was opened for a newly detected format.
    fn playback_started(&self) {}
    /// A new progress value was published.
    fn playback_progress(&self) {}
    /// The consumer loop exited and the state is back to `Idle`.
    fn playback_finished(&self) {}
    /// The downloader received more bytes.
    fn cache_progress(&self) {}
}
