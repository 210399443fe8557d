mod api;
mod app;
mod application;
mod domain;
mod ui;
mod utils;

use iced::window;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("simple_media_downloader=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> iced::Result {
    init_logging();

    iced::application(app::DownloadApp::default, app::update, app::view)
        .title("Simple Media Downloader")
        .window(window::Settings {
            size: iced::Size::new(560.0, 520.0),
            ..Default::default()
        })
        .run()
}
