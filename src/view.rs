use crate::control::VideoControl;
use crate::dispatcher;
use crate::provider::{VideoFrame, VideoSourceProvider};
use crate::state::StateChangedEvent;
use crate::surface::{VideoSurface, render_image};
use gpui::{
    Context, EventEmitter, IntoElement, ParentElement, Render, RenderImage, Styled, Task, Window,
    div,
};
use std::sync::Arc;

/// A gpui view hosting a [`VideoControl`].
///
/// Work dispatched to the control runs in a foreground task on the window's
/// thread. Every dispatched job re-renders the view, and a
/// [`StateChangedEvent`] is emitted whenever the control's state changes.
pub struct VideoControlView {
    // Dropped before `control`: tearing down the queue releases any provider
    // thread still waiting on a dispatched job, which dispose may join.
    _pump: Task<()>,
    control: VideoControl,
    image: Option<(VideoFrame, Arc<RenderImage>)>,
}

impl VideoControlView {
    /// Create a view over `provider`. Must be called on the window's thread.
    pub fn new(provider: Arc<dyn VideoSourceProvider>, cx: &mut Context<Self>) -> Self {
        let (handle, mut queue) = dispatcher::channel::<VideoControl>();
        let control = VideoControl::new(provider, handle);

        let pump = cx.spawn(async move |this, cx| {
            while let Some(job) = queue.next().await {
                let updated = this.update(cx, |view, cx| {
                    let previous = view.control.state();
                    job.run(&mut view.control);
                    let current = view.control.state();
                    if current != previous {
                        cx.emit(StateChangedEvent::new(current));
                    }
                    cx.notify();
                });
                if updated.is_err() {
                    break;
                }
            }
            log::debug!("video control dispatcher stopped");
        });

        Self {
            _pump: pump,
            control,
            image: None,
        }
    }

    pub fn control(&self) -> &VideoControl {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut VideoControl {
        &mut self.control
    }

    /// Convert the current frame once, reusing the image until the frame changes.
    fn current_image(&mut self, window: &mut Window) -> Option<(Arc<RenderImage>, (u32, u32))> {
        let Some(frame) = self.control.video_source() else {
            self.release_image(window);
            return None;
        };

        let cached = matches!(&self.image, Some((shown, _)) if *shown == frame);
        if !cached {
            let image = render_image(&frame)?;
            self.release_image(window);
            self.image = Some((frame, image));
        }

        self.image
            .as_ref()
            .map(|(frame, image)| (Arc::clone(image), frame.size()))
    }

    fn release_image(&mut self, window: &mut Window) {
        if let Some((_, image)) = self.image.take() {
            if let Err(err) = window.drop_image(image) {
                log::warn!("failed to release video frame: {err}");
            }
        }
    }
}

impl EventEmitter<StateChangedEvent> for VideoControlView {}

impl Render for VideoControlView {
    fn render(&mut self, window: &mut Window, _cx: &mut Context<Self>) -> impl IntoElement {
        let surface = match self.current_image(window) {
            Some((image, size)) => VideoSurface::new(Some(image), size),
            None => VideoSurface::new(None, (0, 0)),
        };

        div()
            .size_full()
            .bg(gpui::black())
            .child(surface.id("video-surface"))
    }
}

/// Helper function to create a video control view, e.g. inside `cx.new`.
pub fn video_control(
    provider: Arc<dyn VideoSourceProvider>,
    cx: &mut Context<VideoControlView>,
) -> VideoControlView {
    VideoControlView::new(provider, cx)
}
