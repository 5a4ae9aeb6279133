mod api;
mod error;
mod flow;
mod settings;
mod story;
mod ui;

use anyhow::{Context, Result};

use api::ApiClient;
use flow::{FlowConfig, StoryFlow};
use settings::{FileStore, SettingsService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging. Control verbosity with RUST_LOG env var:
    //   RUST_LOG=info   storyflow http://localhost:8000   # load summaries
    //   RUST_LOG=debug  storyflow http://localhost:8000   # + every request and poll
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().collect();

    let base_url = args.get(1).context(
        "Usage: storyflow <backend-url> [theme]\n\
         \n\
         Example:\n  storyflow http://localhost:8000 \"haunted lighthouse\"\n\
         \n\
         The theme is remembered between runs.\n\
         Logging: set RUST_LOG=debug for request and poll detail",
    )?;

    let mut settings = SettingsService::load(FileStore::in_config_dir()?);
    if let Some(theme) = args.get(2) {
        settings.set_theme(theme.clone());
    }

    let api = ApiClient::new(base_url).context("failed to set up the backend client")?;
    println!("Backend : {}", api.base_url());
    println!("Theme   : {}", settings.theme());

    let flow = StoryFlow::new(api, FlowConfig::default());

    ui::run(flow, settings).await
}
