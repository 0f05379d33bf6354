use chatrs::app::AppState;
use chatrs::responder::GeminiResponder;
use chatrs::storage::settings::load_settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings = load_settings();

    let Some(api_key) = GeminiResponder::api_key_from_env() else {
        tracing::error!("No API key found. Set GEMINI_API_KEY (or API_KEY) and try again.");
        std::process::exit(1);
    };

    let responder = match GeminiResponder::new(api_key, &settings) {
        Ok(responder) => responder,
        Err(e) => {
            tracing::error!("Failed to create Gemini client: {}", e);
            std::process::exit(1);
        }
    };

    let mut app = AppState::new(settings, responder);
    if let Err(e) = chatrs::ui::run(&mut app).await {
        tracing::error!("Input error: {}", e);
        std::process::exit(1);
    }
}
