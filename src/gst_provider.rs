use crate::Error;
use crate::handlers::{EventHandlers, HandlerId};
use crate::property::Property;
use crate::provider::{PixelFormat, VideoFrame, VideoSourceProvider, chroma_row_bytes};
use crate::state::{MediaState, StateChangedEvent};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use gstreamer_video::VideoFrameExt;
use parking_lot::Mutex;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

const SINK_NAME: &str = "gpui_video";

/// Loudest volume in percent. `playbin` accepts a linear volume up to 10.0.
pub const MAX_VOLUME: i32 = 1000;

/// Options used when building a [`GstSourceProvider`].
#[derive(Debug, Clone)]
pub struct SourceOptions {
    alpha_channel: bool,
    volume: i32,
    frame_timeout: Duration,
    max_buffers: u32,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            alpha_channel: false,
            volume: 100,
            frame_timeout: Duration::from_millis(16),
            max_buffers: 2,
        }
    }
}

impl SourceOptions {
    /// Deliver RGBA frames with alpha instead of opaque NV12 frames.
    pub fn alpha_channel(mut self, enabled: bool) -> Self {
        self.alpha_channel = enabled;
        self
    }

    /// Initial volume in percent, clamped to `0..=MAX_VOLUME`.
    pub fn volume(mut self, percent: i32) -> Self {
        self.volume = clamp_volume(percent);
        self
    }

    /// How long the frame worker waits for a sample before polling again.
    pub fn frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Frames the appsink keeps queued before dropping old ones.
    pub fn max_buffers(mut self, count: u32) -> Self {
        self.max_buffers = count.max(1);
        self
    }
}

thread_local! {
    static FROM_ENGINE: Cell<bool> = const { Cell::new(false) };
}

/// Run `f` while marking the current thread as publishing engine-side values,
/// so the property listeners that write back into the pipeline skip them.
fn from_engine<R>(f: impl FnOnce() -> R) -> R {
    let previous = FROM_ENGINE.with(|flag| flag.replace(true));
    let result = f();
    FROM_ENGINE.with(|flag| flag.set(previous));
    result
}

fn is_from_engine() -> bool {
    FROM_ENGINE.with(Cell::get)
}

fn clamp_volume(percent: i32) -> i32 {
    percent.clamp(0, MAX_VOLUME)
}

fn percent_to_linear(percent: i32) -> f64 {
    f64::from(clamp_volume(percent)) / 100.0
}

fn linear_to_percent(linear: f64) -> i32 {
    (linear * 100.0).round() as i32
}

fn caps_for(alpha_channel: bool) -> gst::Caps {
    gst::Caps::builder("video/x-raw")
        .field("format", if alpha_channel { "RGBA" } else { "NV12" })
        .field("pixel-aspect-ratio", gst::Fraction::new(1, 1))
        .build()
}

/// Raises [`StateChangedEvent`]s, skipping repeats of the last published state.
#[derive(Debug, Default)]
struct StatePublisher {
    last: Mutex<MediaState>,
    handlers: EventHandlers<StateChangedEvent>,
}

impl StatePublisher {
    fn last(&self) -> MediaState {
        *self.last.lock()
    }

    fn publish(&self, state: MediaState) -> bool {
        {
            let mut last = self.last.lock();
            if *last == state {
                return false;
            }
            *last = state;
        }
        log::debug!("media state changed to {state}");
        self.handlers.raise(&StateChangedEvent::new(state));
        true
    }
}

#[derive(Debug)]
struct Shared {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    alive: AtomicBool,
    disposed: AtomicBool,
    alpha_channel: AtomicBool,
    frame_timeout: Duration,
    states: StatePublisher,

    video_source: Property<Option<VideoFrame>>,
    time: Property<i64>,
    volume: Property<i32>,
}

impl Shared {
    fn seek(&self, time_ms: i64) {
        let position = gst::ClockTime::from_mseconds(time_ms.max(0) as u64);
        if let Err(err) = self
            .pipeline
            .seek_simple(gst::SeekFlags::FLUSH | gst::SeekFlags::ACCURATE, position)
        {
            log::warn!("failed to seek to {position}: {err}");
        }
    }
}

#[derive(Debug, Default)]
struct Workers {
    frame: Option<JoinHandle<()>>,
    bus: Option<JoinHandle<()>>,
    time_listener: Option<HandlerId>,
    volume_listener: Option<HandlerId>,
    volume_notify: Option<glib::SignalHandlerId>,
}

/// A [`VideoSourceProvider`] backed by a GStreamer `playbin`.
///
/// Frames are pulled from an appsink on a worker thread; bus messages are
/// turned into [`StateChangedEvent`]s on a second worker thread.
#[derive(Debug)]
pub struct GstSourceProvider {
    shared: Arc<Shared>,
    workers: Mutex<Workers>,
}

impl GstSourceProvider {
    /// Build an idle provider. Nothing plays until [`open`](Self::open).
    pub fn new(options: SourceOptions) -> Result<Self, Error> {
        gst::init()?;

        let pipeline = format!(
            "playbin video-sink=\"videoconvert ! videoscale ! appsink name={SINK_NAME} drop=true max-buffers={}\"",
            options.max_buffers
        );
        let pipeline = gst::parse::launch(pipeline.as_ref())?
            .downcast::<gst::Pipeline>()
            .map_err(|_| Error::Cast)?;

        let video_sink: gst::Element = pipeline.property("video-sink");
        let appsink = video_sink
            .downcast::<gst::Bin>()
            .map_err(|_| Error::Cast)?
            .by_name(SINK_NAME)
            .ok_or(Error::Cast)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| Error::Cast)?;
        appsink.set_caps(Some(&caps_for(options.alpha_channel)));
        pipeline.set_property("volume", percent_to_linear(options.volume));

        let bus = pipeline.bus().ok_or(Error::Cast)?;

        let shared = Arc::new(Shared {
            pipeline,
            appsink,
            alive: AtomicBool::new(true),
            disposed: AtomicBool::new(false),
            alpha_channel: AtomicBool::new(options.alpha_channel),
            frame_timeout: options.frame_timeout,
            states: StatePublisher::default(),

            video_source: Property::new(None),
            time: Property::new(0),
            volume: Property::new(clamp_volume(options.volume)),
        });

        let time_listener = {
            let shared_ref = Arc::downgrade(&shared);
            shared.time.subscribe(move |time| {
                if is_from_engine() {
                    return;
                }
                if let Some(shared) = shared_ref.upgrade() {
                    shared.seek(*time);
                }
            })
        };

        let volume_listener = {
            let shared_ref = Arc::downgrade(&shared);
            shared.volume.subscribe(move |percent| {
                if is_from_engine() {
                    return;
                }
                let Some(shared) = shared_ref.upgrade() else {
                    return;
                };
                shared
                    .pipeline
                    .set_property("volume", percent_to_linear(*percent));
                // Out-of-range requests settle on the volume actually applied.
                let applied = clamp_volume(*percent);
                if applied != *percent {
                    from_engine(|| shared.volume.set(applied));
                }
            })
        };

        let volume_notify = {
            let shared_ref: Weak<Shared> = Arc::downgrade(&shared);
            shared
                .pipeline
                .connect_notify(Some("volume"), move |pipeline, _| {
                    let Some(shared) = shared_ref.upgrade() else {
                        return;
                    };
                    let linear: f64 = pipeline.property("volume");
                    from_engine(|| shared.volume.set(linear_to_percent(linear)));
                })
        };

        let frame_thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("video-frames".into())
                .spawn(move || frame_worker(&shared))
                .map_err(|err| glib::bool_error!("failed to spawn frame worker: {err}"))?
        };

        let bus_thread = {
            let shared = Arc::clone(&shared);
            std::thread::Builder::new()
                .name("video-bus".into())
                .spawn(move || bus_worker(&shared, &bus))
                .map_err(|err| glib::bool_error!("failed to spawn bus worker: {err}"))?
        };

        Ok(Self {
            shared,
            workers: Mutex::new(Workers {
                frame: Some(frame_thread),
                bus: Some(bus_thread),
                time_listener: Some(time_listener),
                volume_listener: Some(volume_listener),
                volume_notify: Some(volume_notify),
            }),
        })
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        if self.shared.disposed.load(Ordering::Acquire) {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// Load `uri` and start playing it, replacing whatever was loaded.
    pub fn open(&self, uri: &url::Url) -> Result<(), Error> {
        self.ensure_alive()?;
        log::debug!("opening {uri}");

        self.shared.pipeline.set_state(gst::State::Null)?;
        self.shared.pipeline.set_property("uri", uri.as_str());
        self.shared.pipeline.set_state(gst::State::Playing)?;
        Ok(())
    }

    /// Resume playback, restarting the stream if it had ended.
    pub fn play(&self) -> Result<(), Error> {
        self.ensure_alive()?;
        let ended = self.shared.states.last() == MediaState::Ended;
        self.shared.pipeline.set_state(gst::State::Playing)?;
        if ended {
            self.shared.seek(0);
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<(), Error> {
        self.ensure_alive()?;
        self.shared.pipeline.set_state(gst::State::Paused)?;
        Ok(())
    }

    /// Stop playback. The media stays loaded and can be played again.
    pub fn stop(&self) -> Result<(), Error> {
        self.ensure_alive()?;
        self.shared.pipeline.set_state(gst::State::Ready)?;
        from_engine(|| self.shared.time.set(0));
        Ok(())
    }

    /// Get the underlying GStreamer pipeline.
    pub fn pipeline(&self) -> gst::Pipeline {
        self.shared.pipeline.clone()
    }
}

impl VideoSourceProvider for GstSourceProvider {
    fn video_source(&self) -> Property<Option<VideoFrame>> {
        self.shared.video_source.clone()
    }

    fn time(&self) -> Property<i64> {
        self.shared.time.clone()
    }

    fn volume(&self) -> Property<i32> {
        self.shared.volume.clone()
    }

    fn is_alpha_channel_enabled(&self) -> bool {
        self.shared.alpha_channel.load(Ordering::Acquire)
    }

    fn set_alpha_channel_enabled(&self, enabled: bool) {
        if self.shared.alpha_channel.swap(enabled, Ordering::AcqRel) == enabled {
            return;
        }
        self.shared.appsink.set_caps(Some(&caps_for(enabled)));
        // Ask upstream to renegotiate against the new caps.
        if let Some(pad) = self.shared.appsink.static_pad("sink") {
            pad.push_event(gst::event::Reconfigure::new());
        }
    }

    fn state_changed(&self) -> &EventHandlers<StateChangedEvent> {
        &self.shared.states.handlers
    }

    fn dispose(&self) {
        if self.shared.disposed.swap(true, Ordering::AcqRel) {
            return;
        }

        let mut workers = self.workers.lock();
        if let Some(id) = workers.time_listener.take() {
            self.shared.time.unsubscribe(id);
        }
        if let Some(id) = workers.volume_listener.take() {
            self.shared.volume.unsubscribe(id);
        }
        if let Some(id) = workers.volume_notify.take() {
            self.shared.pipeline.disconnect(id);
        }

        self.shared.alive.store(false, Ordering::Release);
        if let Err(err) = self.shared.pipeline.set_state(gst::State::Null) {
            log::error!("failed to stop pipeline: {err}");
        }

        if let Some(worker) = workers.frame.take() {
            if let Err(err) = worker.join() {
                match err.downcast_ref::<String>() {
                    Some(e) => log::error!("Video thread panicked: {e}"),
                    None => log::error!("Video thread panicked with unknown reason"),
                }
            }
        }

        // The bus worker may be blocked handing a state change to the thread
        // calling us; it exits on its own once it sees `alive` cleared.
        drop(workers.bus.take());
    }
}

impl Drop for GstSourceProvider {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn frame_worker(shared: &Shared) {
    while shared.alive.load(Ordering::Acquire) {
        let timeout = gst::ClockTime::from_nseconds(shared.frame_timeout.as_nanos() as u64);
        // On timeout there is simply no frame this tick.
        let sample = match shared.pipeline.current_state() {
            gst::State::Playing => shared.appsink.try_pull_sample(timeout),
            gst::State::Paused => shared.appsink.try_pull_preroll(timeout),
            _ => {
                std::thread::sleep(shared.frame_timeout);
                None
            }
        };

        if let Some(sample) = sample {
            match frame_from_sample(&sample) {
                Ok(frame) => {
                    from_engine(|| shared.video_source.set(Some(frame)));
                }
                Err(err) => log::error!("error processing frame: {err:?}"),
            }
        }

        if let Some(position) = shared.pipeline.query_position::<gst::ClockTime>() {
            let millis = position.mseconds() as i64;
            from_engine(|| shared.time.set(millis));
        }
    }
    log::trace!("frame worker stopped");
}

fn bus_worker(shared: &Shared, bus: &gst::Bus) {
    use gst::MessageType;

    while shared.alive.load(Ordering::Acquire) {
        let Some(message) = bus.timed_pop_filtered(
            gst::ClockTime::from_mseconds(100),
            &[
                MessageType::StateChanged,
                MessageType::Buffering,
                MessageType::Eos,
                MessageType::Error,
            ],
        ) else {
            continue;
        };

        if let Some(state) = state_for_message(&message, &shared.pipeline) {
            if shared.alive.load(Ordering::Acquire) {
                shared.states.publish(state);
            }
        }
    }
    log::trace!("bus worker stopped");
}

fn state_for_message(message: &gst::Message, pipeline: &gst::Pipeline) -> Option<MediaState> {
    match message.view() {
        gst::MessageView::StateChanged(change) => {
            if message.src() != Some(pipeline.upcast_ref::<gst::Object>()) {
                return None;
            }
            state_for_transition(change.old(), change.current(), change.pending())
        }
        gst::MessageView::Buffering(buffering) => {
            if buffering.percent() < 100 {
                Some(MediaState::Buffering)
            } else if pipeline.current_state() == gst::State::Playing {
                Some(MediaState::Playing)
            } else {
                None
            }
        }
        gst::MessageView::Eos(_) => Some(MediaState::Ended),
        gst::MessageView::Error(err) => {
            log::error!("GStreamer error: {} ({:?})", err.error(), err.debug());
            Some(MediaState::Error)
        }
        _ => None,
    }
}

/// Map a pipeline state transition onto the player lifecycle.
fn state_for_transition(
    old: gst::State,
    current: gst::State,
    pending: gst::State,
) -> Option<MediaState> {
    use gst::State;

    match (old, current, pending) {
        (State::Null, State::Ready, _) => Some(MediaState::Opening),
        (_, State::Paused, State::VoidPending) => Some(MediaState::Paused),
        (_, State::Playing, _) => Some(MediaState::Playing),
        (State::Paused | State::Playing, State::Ready, _) => Some(MediaState::Stopped),
        (_, State::Null, _) if old != State::Null => Some(MediaState::Stopped),
        _ => None,
    }
}

fn frame_from_sample(sample: &gst::Sample) -> Result<VideoFrame, Error> {
    let caps = sample.caps().ok_or(Error::Caps)?;
    let info = gst_video::VideoInfo::from_caps(caps).map_err(|_| Error::Caps)?;
    let buffer = sample.buffer().ok_or(Error::Caps)?;
    let frame = gst_video::VideoFrameRef::from_buffer_ref_readable(buffer, &info)?;

    let (width, height) = (info.width(), info.height());
    let strides = frame.plane_stride();
    let (format, data) = match info.format() {
        gst_video::VideoFormat::Nv12 => {
            let mut data = Vec::with_capacity(
                width as usize * height as usize
                    + chroma_row_bytes(width) * height.div_ceil(2) as usize,
            );
            pack_plane(
                frame.plane_data(0)?,
                strides[0] as usize,
                width as usize,
                height as usize,
                &mut data,
            );
            pack_plane(
                frame.plane_data(1)?,
                strides[1] as usize,
                chroma_row_bytes(width),
                height.div_ceil(2) as usize,
                &mut data,
            );
            (PixelFormat::Nv12, data)
        }
        gst_video::VideoFormat::Rgba => {
            let mut data = Vec::with_capacity(width as usize * height as usize * 4);
            pack_plane(
                frame.plane_data(0)?,
                strides[0] as usize,
                width as usize * 4,
                height as usize,
                &mut data,
            );
            (PixelFormat::Rgba, data)
        }
        _ => return Err(Error::Caps),
    };

    Ok(VideoFrame::new(width, height, format, data))
}

/// Append `rows` rows of `row_bytes` each from a plane laid out with `stride`.
fn pack_plane(plane: &[u8], stride: usize, row_bytes: usize, rows: usize, out: &mut Vec<u8>) {
    for row in plane.chunks(stride.max(1)).take(rows) {
        let len = row_bytes.min(row.len());
        out.extend_from_slice(&row[..len]);
    }
}
