use futures::future::BoxFuture;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PresenterError {
    #[error("failed to present {media}: {message}")]
    Present { media: String, message: String },
    #[error("teardown failed: {0}")]
    Teardown(String),
    #[error("audio error: {0}")]
    Audio(String),
}

/// On-screen presentation of media items (popup windows).
///
/// `clear_all` and `fade_all_then_clear` settle only once every item is gone.
pub trait MediaPresenter: Send + Sync {
    fn present<'a>(&'a self, media: &'a str, id: &'a str)
        -> BoxFuture<'a, Result<(), PresenterError>>;

    fn evict<'a>(&'a self, id: &'a str) -> BoxFuture<'a, ()>;

    fn clear_all(&self) -> BoxFuture<'_, Result<(), PresenterError>>;

    fn fade_all_then_clear(&self, duration_ms: u64) -> BoxFuture<'_, Result<(), PresenterError>>;

    fn count(&self) -> usize;
}

/// Single looping audio track.
pub trait AudioPresenter: Send + Sync {
    fn play<'a>(&'a self, track: &'a str) -> BoxFuture<'a, Result<(), PresenterError>>;

    /// Fades briefly before going silent.
    fn stop(&self) -> BoxFuture<'_, ()>;

    fn is_playing(&self) -> bool;
}
