use gstreamer as gst;

/// Errors raised by the video control and its providers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Glib(#[from] glib::Error),
    #[error("{0}")]
    Bool(#[from] glib::BoolError),
    #[error("failed to change pipeline state")]
    StateChange(#[from] gst::StateChangeError),
    #[error("failed to cast gstreamer element")]
    Cast,
    #[error("invalid or missing caps")]
    Caps,
    /// The control or provider was already disposed.
    #[error("the video control has been disposed")]
    Disposed,
    /// The UI thread stopped processing dispatched work.
    #[error("the UI dispatcher is closed")]
    DispatcherClosed,
    /// A synchronous dispatch was attempted from the UI thread itself.
    #[error("cannot block on the UI dispatcher from the UI thread")]
    OwnerThread,
}
