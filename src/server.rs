//! HTTP entry point for scheduled runs.
//!
//! A scheduler publishes a message and the broker pushes it here as a
//! Pub/Sub push envelope. Message attributes pick the currencies and the
//! lookback window; any non-2xx answer makes the broker redeliver.

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::{App, HttpResponse, HttpServer, web};
use serde::Deserialize;

use crate::config::split_currencies;
use crate::destination::ExchangeRateDestination;
use crate::error::IngestError;
use crate::service::ingest_euro_rates;
use crate::transport::Transport;

pub struct AppState {
    pub destination: Arc<dyn ExchangeRateDestination>,
    pub transport: Arc<dyn Transport>,
    pub ecb_api_url: String,
    pub default_currencies: Vec<String>,
    pub default_lookback_days: u32,
}

#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    pub message: PushMessage,
    #[serde(default)]
    pub subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PushMessage {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default, rename = "messageId")]
    pub message_id: Option<String>,
}

async fn ingest(state: web::Data<AppState>, envelope: web::Json<PushEnvelope>) -> HttpResponse {
    let attributes = &envelope.message.attributes;
    log::info!(
        "Received message {:?} from {:?}",
        envelope.message.message_id,
        envelope.subscription
    );

    let lookback_days = match attributes.get("days_to_register") {
        Some(days) => match days.trim().parse::<u32>() {
            Ok(days) => days,
            Err(err) => {
                log::error!("Invalid days_to_register {:?}: {}", days, err);
                return HttpResponse::BadRequest().body(format!("invalid days_to_register: {err}"));
            }
        },
        None => state.default_lookback_days,
    };
    let currencies = attributes
        .get("currencies")
        .map(|list| split_currencies(list))
        .filter(|currencies| !currencies.is_empty())
        .unwrap_or_else(|| state.default_currencies.clone());

    let result = ingest_euro_rates(
        state.destination.as_ref(),
        state.transport.clone(),
        &state.ecb_api_url,
        &currencies,
        lookback_days,
    )
    .await;

    match result {
        Ok(()) => {
            log::info!("Process completed successfully");
            HttpResponse::NoContent().finish()
        }
        Err(err @ IngestError::Pair(_)) => {
            log::error!("Rejected message: {}", err);
            HttpResponse::BadRequest().body(err.to_string())
        }
        Err(err) => {
            log::error!("Ingestion failed: {}", err);
            HttpResponse::InternalServerError().body(err.to_string())
        }
    }
}

async fn healthz() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::post().to(ingest))
        .route("/healthz", web::get().to(healthz));
}

pub async fn serve(state: AppState, bind_address: &str) -> std::io::Result<()> {
    let state = web::Data::new(state);
    log::info!("Listening on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default())
            .configure(configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
