use crate::Error;
use crate::binding::{Binding, bind_one_way, bind_two_way};
use crate::dispatcher::DispatcherHandle;
use crate::handlers::HandlerId;
use crate::property::{Property, ReadOnlyProperty};
use crate::provider::{VideoFrame, VideoSourceProvider};
use crate::state::{MediaState, StateChangedEvent};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Displays a provider's video and mirrors its player state.
///
/// The control lives on the UI thread that drains its dispatcher. `time` and
/// `volume` are kept in sync with the provider in both directions, the video
/// source flows from the provider only, and `state` follows the provider's
/// state notifications. State notifications raised on other threads are
/// applied on the UI thread before the raising thread continues.
pub struct VideoControl {
    provider: Arc<dyn VideoSourceProvider>,

    video_source: Property<Option<VideoFrame>>,
    time: Property<i64>,
    volume: Property<i32>,
    state: Property<MediaState>,

    bindings: Vec<Binding>,
    state_subscription: Option<HandlerId>,
    frame_subscription: Option<HandlerId>,
    disposed: bool,
}

impl std::fmt::Debug for VideoControl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoControl")
            .field("time", &self.time.get())
            .field("volume", &self.volume.get())
            .field("state", &self.state.get())
            .field("disposed", &self.disposed)
            .finish()
    }
}

impl VideoControl {
    /// Create a control over `provider`. `dispatcher` must be drained by the
    /// UI thread the control lives on.
    pub fn new(
        provider: Arc<dyn VideoSourceProvider>,
        dispatcher: DispatcherHandle<VideoControl>,
    ) -> Self {
        let video_source = Property::new(None);
        let time = Property::new(0);
        let volume = Property::new(0);
        let state = Property::new(MediaState::NothingSpecial);

        let bindings = vec![
            bind_one_way(&provider.video_source(), &video_source),
            bind_two_way(&provider.time(), &time),
            bind_two_way(&provider.volume(), &volume),
        ];

        let state_subscription = {
            let dispatcher = dispatcher.clone();
            provider
                .state_changed()
                .subscribe(move |event: &StateChangedEvent| {
                    Self::on_state_changed(&dispatcher, *event)
                })
        };

        // Wake the UI for new frames, at most one pending wake-up at a time.
        let frame_subscription = {
            let pending = Arc::new(AtomicBool::new(false));
            video_source.subscribe(move |_| {
                if pending.swap(true, Ordering::AcqRel) {
                    return;
                }
                let pending = Arc::clone(&pending);
                let posted = dispatcher.post(move |_| pending.store(false, Ordering::Release));
                if posted.is_err() {
                    log::trace!("dropping frame wake-up, dispatcher closed");
                }
            })
        };

        Self {
            provider,
            video_source,
            time,
            volume,
            state,
            bindings,
            state_subscription: Some(state_subscription),
            frame_subscription: Some(frame_subscription),
            disposed: false,
        }
    }

    fn on_state_changed(dispatcher: &DispatcherHandle<VideoControl>, event: StateChangedEvent) {
        let apply = move |control: &mut VideoControl| control.apply_state(event.state());

        // The UI thread cannot wait on itself; queue behind the work already
        // pending instead.
        let result = if dispatcher.is_owner_thread() {
            dispatcher.post(apply)
        } else {
            dispatcher.invoke(apply)
        };

        if let Err(err) = result {
            log::warn!("state change to {} was not applied: {err}", event.state());
        }
    }

    /// Set `state`. Only ever runs on the UI thread, from a dispatched job.
    pub(crate) fn apply_state(&mut self, state: MediaState) {
        if self.disposed {
            log::debug!("ignoring state change to {state} after dispose");
            return;
        }
        self.state.set(state);
    }

    fn ensure_alive(&self) -> Result<(), Error> {
        if self.disposed {
            Err(Error::Disposed)
        } else {
            Ok(())
        }
    }

    /// The provider feeding this control.
    pub fn source_provider(&self) -> &Arc<dyn VideoSourceProvider> {
        &self.provider
    }

    /// Current playback position in milliseconds.
    pub fn time(&self) -> i64 {
        self.time.get()
    }

    /// Seek to `time` milliseconds.
    pub fn set_time(&self, time: i64) -> Result<(), Error> {
        self.ensure_alive()?;
        self.time.set(time);
        Ok(())
    }

    pub fn time_property(&self) -> &Property<i64> {
        &self.time
    }

    /// Current volume in percent.
    pub fn volume(&self) -> i32 {
        self.volume.get()
    }

    /// Request a volume in percent. If the provider adjusts the value (for
    /// example by clamping it), the control takes the provider's value.
    pub fn set_volume(&self, volume: i32) -> Result<(), Error> {
        self.ensure_alive()?;
        self.volume.set(volume);
        Ok(())
    }

    pub fn volume_property(&self) -> &Property<i32> {
        &self.volume
    }

    /// The last state reported by the provider, [`MediaState::NothingSpecial`]
    /// until the first notification.
    pub fn state(&self) -> MediaState {
        self.state.get()
    }

    pub fn state_property(&self) -> ReadOnlyProperty<MediaState> {
        self.state.read_only()
    }

    /// Whether the provider delivers frames with an alpha channel.
    pub fn is_alpha_channel_enabled(&self) -> Result<bool, Error> {
        self.ensure_alive()?;
        Ok(self.provider.is_alpha_channel_enabled())
    }

    pub fn set_alpha_channel_enabled(&self, enabled: bool) -> Result<(), Error> {
        self.ensure_alive()?;
        self.provider.set_alpha_channel_enabled(enabled);
        Ok(())
    }

    /// The frame currently shown.
    pub fn video_source(&self) -> Option<VideoFrame> {
        self.video_source.get()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// Detach from the provider and release it. Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        if let Some(id) = self.state_subscription.take() {
            self.provider.state_changed().unsubscribe(id);
        }
        if let Some(id) = self.frame_subscription.take() {
            self.video_source.unsubscribe(id);
        }
        self.bindings.clear();
        self.provider.dispose();
        log::debug!("video control disposed");
    }
}

impl Drop for VideoControl {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher;
    use crate::handlers::EventHandlers;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct StubProvider {
        video_source: Property<Option<VideoFrame>>,
        time: Property<i64>,
        volume: Property<i32>,
        alpha: Mutex<bool>,
        state_changed: EventHandlers<StateChangedEvent>,
        disposals: Mutex<usize>,
    }

    impl VideoSourceProvider for StubProvider {
        fn video_source(&self) -> Property<Option<VideoFrame>> {
            self.video_source.clone()
        }
        fn time(&self) -> Property<i64> {
            self.time.clone()
        }
        fn volume(&self) -> Property<i32> {
            self.volume.clone()
        }
        fn is_alpha_channel_enabled(&self) -> bool {
            *self.alpha.lock()
        }
        fn set_alpha_channel_enabled(&self, enabled: bool) {
            *self.alpha.lock() = enabled;
        }
        fn state_changed(&self) -> &EventHandlers<StateChangedEvent> {
            &self.state_changed
        }
        fn dispose(&self) {
            *self.disposals.lock() += 1;
        }
    }

    fn control() -> (
        Arc<StubProvider>,
        VideoControl,
        dispatcher::DispatchQueue<VideoControl>,
    ) {
        let provider = Arc::new(StubProvider::default());
        let (handle, queue) = dispatcher::channel();
        let control = VideoControl::new(provider.clone(), handle);
        (provider, control, queue)
    }

    #[test]
    fn late_state_change_after_dispose_is_ignored() {
        let (_provider, mut control, _queue) = control();
        control.apply_state(MediaState::Playing);
        control.dispose();
        control.apply_state(MediaState::Stopped);
        assert_eq!(control.state(), MediaState::Playing);
    }

    #[test]
    fn notification_on_ui_thread_is_queued() {
        let (provider, mut control, mut queue) = control();
        provider
            .state_changed
            .raise(&StateChangedEvent::new(MediaState::Opening));
        assert_eq!(control.state(), MediaState::NothingSpecial);

        queue.run_pending(&mut control);
        assert_eq!(control.state(), MediaState::Opening);
    }

    #[test]
    fn dispose_is_idempotent() {
        let (provider, mut control, _queue) = control();
        control.dispose();
        control.dispose();
        drop(control);
        assert_eq!(*provider.disposals.lock(), 1);
        assert!(provider.state_changed.is_empty());
    }

    #[test]
    fn setters_fail_after_dispose() {
        let (_provider, mut control, _queue) = control();
        control.dispose();
        assert!(control.is_disposed());
        assert!(matches!(control.set_time(5), Err(Error::Disposed)));
        assert!(matches!(control.set_volume(5), Err(Error::Disposed)));
        assert!(matches!(
            control.set_alpha_channel_enabled(true),
            Err(Error::Disposed)
        ));
        assert!(matches!(
            control.is_alpha_channel_enabled(),
            Err(Error::Disposed)
        ));
    }

    #[test]
    fn frame_wake_ups_are_coalesced() {
        let (provider, mut control, mut queue) = control();
        for _ in 0..5 {
            provider
                .video_source
                .set(Some(VideoFrame::new(1, 1, crate::PixelFormat::Rgba, vec![0u8; 4])));
        }
        assert_eq!(queue.run_pending(&mut control), 1);
        assert!(control.video_source().is_some());

        provider
            .video_source
            .set(Some(VideoFrame::new(1, 1, crate::PixelFormat::Rgba, vec![0u8; 4])));
        assert_eq!(queue.run_pending(&mut control), 1);
    }

    #[test]
    fn bindings_are_released_on_dispose() {
        let (provider, mut control, _queue) = control();
        control.dispose();
        provider.time.set(1234);
        provider.volume.set(80);
        assert_eq!(control.time(), 0);
        assert_eq!(control.volume(), 0);
    }
}
