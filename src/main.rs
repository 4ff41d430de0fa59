use std::sync::Arc;

use dotenvy::dotenv;
use snafu::ResultExt;

use tanuki::config;
use tanuki::console;
use tanuki::error::{ApplicationError, ConsoleSnafu, HttpClientSnafu, LoadStoreSnafu};
use tanuki::interpreter::{Interpreter, WitClient};
use tanuki::logger;
use tanuki::platform::PlatformClient;
use tanuki::sink::ChatSink;
use tanuki::store::MemoryStore;
use tanuki::tracker::Tracker;

#[tokio::main]
async fn main() -> Result<(), ApplicationError> {
    dotenv().ok();

    let config = config::load()?;
    let _guard = logger::init(&config)?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context(HttpClientSnafu)?;

    let store = match &config.store_path {
        Some(path) => MemoryStore::load(path).await.context(LoadStoreSnafu)?,
        None => MemoryStore::new(),
    };
    let store = Arc::new(store);

    let platform = PlatformClient::new(
        http.clone(),
        config.platform_api_url.clone(),
        config.platform_token.clone(),
    );
    let classifier = WitClient::new(
        http.clone(),
        config.nlu_api_url.clone(),
        config.nlu_token.clone(),
    );
    let chat = ChatSink::new(http, config.chat_api_url.clone(), config.chat_token.clone());

    let tracker = Tracker::new(store.clone(), platform.clone(), config.tracker_options());
    tokio::spawn(tracker.run(chat.clone(), config.poll_period()));
    tracing::info!(period = config.poll_interval_secs, "tracker running");

    let interpreter = Interpreter::new(store, platform, classifier, config.confidence_threshold);
    console::run(&interpreter, &chat).await.context(ConsoleSnafu)
}
