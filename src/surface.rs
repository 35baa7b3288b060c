use crate::provider::{PixelFormat, VideoFrame, chroma_row_bytes};
use gpui::{
    Element, ElementId, GlobalElementId, InspectorElementId, IntoElement, LayoutId, RenderImage,
    Window,
};
use image::{ImageBuffer, Rgba};
use smallvec::SmallVec;
use std::sync::Arc;
use yuv::{YuvBiPlanarImage, YuvConversionMode, YuvRange, YuvStandardMatrix, yuv_nv12_to_bgra};

/// Convert a frame into an image gpui can paint.
///
/// gpui expects BGRA pixels. Returns `None` when the frame is truncated or the
/// conversion fails.
pub fn render_image(frame: &VideoFrame) -> Option<Arc<RenderImage>> {
    if frame.width() == 0 || frame.height() == 0 || frame.data().len() < frame.expected_len() {
        log::warn!(
            "skipping {}x{} frame with {} bytes",
            frame.width(),
            frame.height(),
            frame.data().len()
        );
        return None;
    }

    let bgra = match frame.format() {
        PixelFormat::Nv12 => nv12_to_bgra(frame)?,
        PixelFormat::Rgba => {
            let mut pixels = frame.data()[..frame.expected_len()].to_vec();
            swap_red_blue(&mut pixels);
            pixels
        }
    };

    let buffer = ImageBuffer::<Rgba<u8>, _>::from_raw(frame.width(), frame.height(), bgra)?;
    let frames: SmallVec<[image::Frame; 1]> = SmallVec::from_elem(image::Frame::new(buffer), 1);
    Some(Arc::new(RenderImage::new(frames)))
}

fn nv12_to_bgra(frame: &VideoFrame) -> Option<Vec<u8>> {
    let (width, height) = frame.size();
    let y_size = width as usize * height as usize;
    let data = frame.data();

    let image = YuvBiPlanarImage {
        y_plane: &data[..y_size],
        y_stride: width,
        uv_plane: &data[y_size..frame.expected_len()],
        uv_stride: chroma_row_bytes(width) as u32,
        width,
        height,
    };

    // HD material is BT.709, anything smaller is assumed to be SD.
    let matrix = if height >= 720 {
        YuvStandardMatrix::Bt709
    } else {
        YuvStandardMatrix::Bt601
    };

    let mut bgra = vec![0u8; y_size * 4];
    match yuv_nv12_to_bgra(
        &image,
        &mut bgra,
        width * 4,
        YuvRange::Limited,
        matrix,
        YuvConversionMode::Balanced,
    ) {
        Ok(()) => Some(bgra),
        Err(err) => {
            log::error!("failed to convert NV12 frame: {err:?}");
            None
        }
    }
}

fn swap_red_blue(pixels: &mut [u8]) {
    for pixel in pixels.chunks_exact_mut(4) {
        pixel.swap(0, 2);
    }
}

/// Scale `content` to fit inside `container` keeping its aspect ratio, centered.
///
/// Returns `(x, y, width, height)` relative to the container origin.
pub fn fit_uniform(container: (f32, f32), content: (f32, f32)) -> (f32, f32, f32, f32) {
    let (container_w, container_h) = container;
    let (content_w, content_h) = content;
    if content_w <= 0.0 || content_h <= 0.0 {
        return (0.0, 0.0, 0.0, 0.0);
    }

    let scale = (container_w / content_w).min(container_h / content_h);
    let (w, h) = (content_w * scale, content_h * scale);
    ((container_w - w) / 2.0, (container_h - h) / 2.0, w, h)
}

/// Paints a video frame on black, scaled uniformly and clipped to its bounds.
pub struct VideoSurface {
    image: Option<Arc<RenderImage>>,
    frame_size: (u32, u32),
    element_id: Option<ElementId>,
}

impl VideoSurface {
    pub fn new(image: Option<Arc<RenderImage>>, frame_size: (u32, u32)) -> Self {
        Self {
            image,
            frame_size,
            element_id: None,
        }
    }

    pub fn id(mut self, id: impl Into<ElementId>) -> Self {
        self.element_id = Some(id.into());
        self
    }
}

impl Element for VideoSurface {
    type RequestLayoutState = ();
    type PrepaintState = ();

    fn id(&self) -> Option<ElementId> {
        self.element_id.clone()
    }

    fn source_location(&self) -> Option<&'static core::panic::Location<'static>> {
        None
    }

    fn request_layout(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        window: &mut Window,
        cx: &mut gpui::App,
    ) -> (LayoutId, Self::RequestLayoutState) {
        let style = gpui::Style {
            size: gpui::Size {
                width: gpui::relative(1.).into(),
                height: gpui::relative(1.).into(),
            },
            ..Default::default()
        };

        let layout_id = window.request_layout(style, [], cx);
        (layout_id, ())
    }

    fn prepaint(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        _bounds: gpui::Bounds<gpui::Pixels>,
        _request_layout_state: &mut Self::RequestLayoutState,
        _window: &mut Window,
        _cx: &mut gpui::App,
    ) -> Self::PrepaintState {
    }

    fn paint(
        &mut self,
        _global_id: Option<&GlobalElementId>,
        _inspector_id: Option<&InspectorElementId>,
        bounds: gpui::Bounds<gpui::Pixels>,
        _request_layout_state: &mut Self::RequestLayoutState,
        _prepaint_state: &mut Self::PrepaintState,
        window: &mut Window,
        _cx: &mut gpui::App,
    ) {
        window.paint_quad(gpui::fill(bounds, gpui::black()));

        let Some(image) = self.image.clone() else {
            return;
        };

        let (x, y, w, h) = fit_uniform(
            (f32::from(bounds.size.width), f32::from(bounds.size.height)),
            (self.frame_size.0 as f32, self.frame_size.1 as f32),
        );
        let target = gpui::Bounds::new(
            gpui::point(bounds.origin.x + gpui::px(x), bounds.origin.y + gpui::px(y)),
            gpui::size(gpui::px(w), gpui::px(h)),
        );

        window.with_content_mask(Some(gpui::ContentMask { bounds }), |window| {
            if let Err(err) = window.paint_image(target, gpui::Corners::default(), image, 0, false) {
                log::error!("failed to paint video frame: {err}");
            }
        });
    }
}

impl IntoElement for VideoSurface {
    type Element = Self;

    fn into_element(self) -> Self::Element {
        self
    }
}
