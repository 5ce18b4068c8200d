use reservation_dialer::call_state::CallDriver;
use reservation_dialer::classifier::OpenAIClassifier;
use reservation_dialer::config::Config;
use reservation_dialer::coordinator::BatchCoordinator;
use reservation_dialer::dnc::DoNotCallRegistry;
use reservation_dialer::handlers;
use reservation_dialer::places::GooglePlaces;
use reservation_dialer::scheduler::TokioScheduler;
use reservation_dialer::store::{DocumentStore, MemoryStore, PgStore};
use reservation_dialer::telephony::HttpCallControl;
use reservation_dialer::transcription::DeepgramTranscriber;
use reservation_dialer::types::AppState;
use reservation_dialer::utils::KeyedLocks;

use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let subscriber = tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_file(true)
                .with_line_number(true),
        )
        .with(tracing_subscriber::filter::Targets::new().with_targets([
            ("hyper", tracing_subscriber::filter::LevelFilter::OFF),
            (
                "reservation_dialer",
                tracing_subscriber::filter::LevelFilter::DEBUG,
            ),
        ]));
    tracing::subscriber::set_global_default(subscriber).unwrap();

    let config = Config::from_env().expect("invalid configuration");
    let http_client = reqwest::Client::new();

    let store: Arc<dyn DocumentStore> = match &config.database_url {
        Some(url) => Arc::new(
            PgStore::connect(url)
                .await
                .expect("failed to connect to database"),
        ),
        None => {
            warn!("DATABASE_URL not set; state is kept in memory and lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let control = Arc::new(HttpCallControl::new(
        http_client.clone(),
        config.telephony.clone(),
    ));
    let transcriber = Arc::new(DeepgramTranscriber::new(
        http_client.clone(),
        config.deepgram_api_key.clone(),
    ));
    let classifier = Arc::new(OpenAIClassifier::new(
        http_client.clone(),
        config.openai_api_key.clone(),
        config.openai_model.clone(),
    ));
    let places = Arc::new(GooglePlaces::new(
        http_client,
        config.google_places_api_key.clone(),
    ));
    let dnc = DoNotCallRegistry::new(store.clone());
    let call_locks = KeyedLocks::new();

    let coordinator = Arc::new(BatchCoordinator::new(
        store.clone(),
        places,
        control.clone(),
        dnc.clone(),
        config.policy.clone(),
        call_locks.clone(),
    ));
    let driver = Arc::new(CallDriver::new(
        store,
        control,
        transcriber,
        classifier,
        dnc,
        Arc::new(TokioScheduler),
        config.policy.clone(),
        call_locks,
    ));

    let app = handlers::router(Arc::new(AppState {
        coordinator,
        driver,
    }));

    info!(addr=%config.bind_addr, "listening");
    axum::Server::bind(&config.bind_addr)
        .serve(app.into_make_service())
        .await
        .unwrap();
}
