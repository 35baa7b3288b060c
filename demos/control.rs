use gpui::{
    App, Application, Context, Entity, Render, Subscription, Window, WindowOptions, div,
    prelude::*,
};
use gpui_video_control::{
    GstSourceProvider, SourceOptions, StateChangedEvent, VideoControlView, Url,
    video_control,
};
use std::path::PathBuf;
use std::sync::Arc;

struct ControlExample {
    provider: Arc<GstSourceProvider>,
    control: Entity<VideoControlView>,
    _subscriptions: Vec<Subscription>,
}

impl ControlExample {
    fn new(provider: Arc<GstSourceProvider>, cx: &mut Context<Self>) -> Self {
        let control = cx.new(|cx| video_control(provider.clone(), cx));
        let subscriptions = vec![
            cx.subscribe(&control, |_, _, event: &StateChangedEvent, cx| {
                log::info!("player is now {}", event.state());
                cx.notify();
            }),
            cx.observe(&control, |_, _, cx| cx.notify()),
        ];
        Self {
            provider,
            control,
            _subscriptions: subscriptions,
        }
    }

    fn button(
        id: &'static str,
        label: impl Into<gpui::SharedString>,
        on_click: impl Fn(&mut Self, &mut Context<Self>) + 'static,
        cx: &mut Context<Self>,
    ) -> impl IntoElement {
        div()
            .id(id)
            .px_4()
            .py_2()
            .border_1()
            .border_color(gpui::white())
            .text_color(gpui::white())
            .cursor_pointer()
            .child(label.into())
            .on_click(cx.listener(move |this, _event, _window, cx| {
                on_click(this, cx);
                cx.notify();
            }))
    }
}

impl Render for ControlExample {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let control = self.control.read(cx).control();
        let state = control.state();
        let status = format!(
            "{state} | {:.1}s | volume {}% | alpha {}",
            control.time() as f64 / 1000.0,
            control.volume(),
            control.is_alpha_channel_enabled().unwrap_or(false),
        );
        let play_label = if state.is_active() {
            "Pause"
        } else {
            "Play"
        };

        let toolbar = div()
            .flex()
            .items_center()
            .gap_2()
            .p_2()
            .child(Self::button(
                "play-pause",
                play_label,
                |this, cx| {
                    let active = this.control.read(cx).control().state().is_active();
                    let result = if active {
                        this.provider.pause()
                    } else {
                        this.provider.play()
                    };
                    if let Err(err) = result {
                        log::error!("play/pause failed: {err}");
                    }
                },
                cx,
            ))
            .child(Self::button(
                "back",
                "-5s",
                |this, cx| {
                    let control = this.control.read(cx).control();
                    let _ = control.set_time((control.time() - 5_000).max(0));
                },
                cx,
            ))
            .child(Self::button(
                "forward",
                "+5s",
                |this, cx| {
                    let control = this.control.read(cx).control();
                    let _ = control.set_time(control.time() + 5_000);
                },
                cx,
            ))
            .child(Self::button(
                "quieter",
                "vol -",
                |this, cx| {
                    let control = this.control.read(cx).control();
                    let _ = control.set_volume((control.volume() - 10).max(0));
                },
                cx,
            ))
            .child(Self::button(
                "louder",
                "vol +",
                |this, cx| {
                    let control = this.control.read(cx).control();
                    let _ = control.set_volume((control.volume() + 10).min(100));
                },
                cx,
            ))
            .child(Self::button(
                "alpha",
                "alpha",
                |this, cx| {
                    let control = this.control.read(cx).control();
                    if let Ok(enabled) = control.is_alpha_channel_enabled() {
                        let _ = control.set_alpha_channel_enabled(!enabled);
                    }
                },
                cx,
            ))
            .child(div().text_color(gpui::white()).child(status));

        div()
            .size_full()
            .flex()
            .flex_col()
            .bg(gpui::black())
            .child(div().flex_1().child(self.control.clone()))
            .child(toolbar)
    }
}

fn main() {
    env_logger::init();

    let path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("assets/test.mp4"));
    let path = path.canonicalize().expect("media file not found");
    let uri = Url::from_file_path(&path).expect("invalid file path");

    Application::new().run(move |cx: &mut App| {
        let provider = Arc::new(
            GstSourceProvider::new(SourceOptions::default().volume(50))
                .expect("failed to create GStreamer provider"),
        );
        provider.open(&uri).expect("failed to open media");

        cx.open_window(
            WindowOptions {
                focus: true,
                ..Default::default()
            },
            |_, cx| cx.new(|cx| ControlExample::new(provider, cx)),
        )
        .unwrap();
        cx.activate(true);
    });
}
