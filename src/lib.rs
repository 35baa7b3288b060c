//! # GPUI Video Control
//!
//! A video control for GPUI that shows the output of a media engine and
//! mirrors the engine's player state as observable properties.
//!
//! ## Features
//!
//! - GStreamer-powered playback through [`GstSourceProvider`]
//! - `time` and `volume` kept in sync with the engine in both directions
//! - A read-only `state` that follows the engine's state notifications, applied
//!   on the UI thread in the order they were raised
//! - Optional alpha channel in delivered frames
//! - Uniform scaling on a black background
//!
//! ## Example
//!
//! ```no_run
//! use gpui::{App, AppContext, Application, WindowOptions};
//! use gpui_video_control::{GstSourceProvider, SourceOptions, Url, video_control};
//! use std::sync::Arc;
//!
//! Application::new().run(|cx: &mut App| {
//!     let provider = Arc::new(GstSourceProvider::new(SourceOptions::default()).unwrap());
//!     provider.open(&Url::parse("file:///path/to/video.mp4").unwrap()).unwrap();
//!
//!     cx.open_window(WindowOptions::default(), |_, cx| {
//!         cx.new(|cx| video_control(provider, cx))
//!     })
//!     .unwrap();
//! });
//! ```

mod binding;
mod control;
pub mod dispatcher;
mod error;
mod gst_provider;
mod handlers;
mod property;
mod provider;
mod state;
mod surface;
mod view;

pub use binding::{Binding, BindingMode, bind_one_way, bind_two_way};
pub use control::VideoControl;
pub use dispatcher::{DispatchQueue, DispatcherHandle};
pub use error::Error;
pub use gst_provider::{GstSourceProvider, MAX_VOLUME, SourceOptions};
pub use handlers::{EventHandlers, HandlerId};
pub use property::{Property, ReadOnlyProperty};
pub use provider::{PixelFormat, VideoFrame, VideoSourceProvider};
pub use state::{MediaState, StateChangedEvent};
pub use surface::{VideoSurface, fit_uniform, render_image};
pub use view::{VideoControlView, video_control};

// Re-export commonly used types
pub use gstreamer as gst;
pub use url::Url;
