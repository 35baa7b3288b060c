use crate::handlers::EventHandlers;
use crate::property::Property;
use crate::state::StateChangedEvent;
use std::sync::Arc;

/// Pixel layout of a [`VideoFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Planar luma followed by interleaved chroma at half resolution. Opaque.
    Nv12,
    /// 8-bit RGBA with straight alpha.
    Rgba,
}

/// One decoded picture as delivered by a provider.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Arc<[u8]>,
}

impl VideoFrame {
    /// Wrap tightly packed pixel data (no row padding).
    pub fn new(width: u32, height: u32, format: PixelFormat, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            format,
            data: data.into(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of bytes a packed frame of this size and format occupies.
    pub fn expected_len(&self) -> usize {
        let (width, height) = (self.width as usize, self.height as usize);
        match self.format {
            PixelFormat::Nv12 => width * height + chroma_row_bytes(self.width) * height.div_ceil(2),
            PixelFormat::Rgba => width * height * 4,
        }
    }
}

/// Bytes per row of the interleaved NV12 chroma plane.
pub(crate) fn chroma_row_bytes(width: u32) -> usize {
    width.div_ceil(2) as usize * 2
}

// Frames compare by buffer identity, never pixel by pixel.
impl PartialEq for VideoFrame {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
            && self.width == other.width
            && self.height == other.height
            && self.format == other.format
    }
}

impl Eq for VideoFrame {}

/// The media engine behind a video control.
///
/// Properties may change on any thread. `state_changed` may be raised on any
/// thread, including threads owned by the engine.
pub trait VideoSourceProvider: Send + Sync {
    /// The most recent frame, `None` before the first one arrives.
    fn video_source(&self) -> Property<Option<VideoFrame>>;

    /// Playback position in milliseconds. Writing it seeks.
    fn time(&self) -> Property<i64>;

    /// Audio volume in percent.
    fn volume(&self) -> Property<i32>;

    /// Whether frames carry an alpha channel.
    fn is_alpha_channel_enabled(&self) -> bool;

    fn set_alpha_channel_enabled(&self, enabled: bool);

    fn state_changed(&self) -> &EventHandlers<StateChangedEvent>;

    /// Release the engine. Calling it more than once is a no-op.
    fn dispose(&self);
}
