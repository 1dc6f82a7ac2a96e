use std::path::PathBuf;

use actix_cors::Cors;
use actix_web::{get, post, put, web, App, HttpResponse, HttpServer, Responder};

use serde::Deserialize;
use rs_chain_core::{ChainBot, ChainError, Config, InboundMessage};

/// Query parameters of `/v1/message`
#[derive(Deserialize)]
struct MessageParams {
	channel: String,
	text: String,
	addressed: Option<bool>,
}

/// Query parameters of `/v1/generate`
#[derive(Deserialize)]
struct GenerateParams {
	channel: String,
	seed: Option<String>, // one word, or two for a starting pair
}

/// Query parameters of `/v1/import`
#[derive(Deserialize)]
struct ImportParams {
	channel: String,
	path: PathBuf, // relative to the corpus directory
}

/// Maps a core error to an HTTP response.
///
/// Storage failures are the server's problem (503), everything else is
/// reported back to the user as a bad request.
fn error_response(e: ChainError) -> HttpResponse {
	if e.is_storage() {
		log::error!("{e}");
		HttpResponse::ServiceUnavailable().body(e.to_string())
	} else {
		HttpResponse::BadRequest().body(e.to_string())
	}
}

fn valid_channel(channel: &str) -> Result<&str, HttpResponse> {
	match channel.trim() {
		"" => Err(HttpResponse::BadRequest().body("Missing or empty channel")),
		channel => Ok(channel),
	}
}

/// HTTP POST endpoint `/v1/message`
///
/// Feeds one chat message to the bot. Returns the spontaneous reply as the
/// body, or 204 when the bot stays quiet.
#[post("/v1/message")]
async fn post_message(bot: web::Data<ChainBot>, query: web::Query<MessageParams>) -> impl Responder {
	let channel = match valid_channel(&query.channel) {
		Ok(c) => c,
		Err(response) => return response,
	};
	let message = InboundMessage::new(channel, query.text.as_str()).addressed(query.addressed.unwrap_or(false));

	match bot.on_message(&message) {
		Ok(Some(reply)) => HttpResponse::Ok().body(reply),
		Ok(None) => HttpResponse::NoContent().finish(),
		Err(e) => error_response(e),
	}
}

/// HTTP GET endpoint `/v1/generate`
///
/// The generate command: returns a phrase built from the channel's model.
#[get("/v1/generate")]
async fn get_generated(bot: web::Data<ChainBot>, query: web::Query<GenerateParams>) -> impl Responder {
	let channel = match valid_channel(&query.channel) {
		Ok(c) => c,
		Err(response) => return response,
	};
	let seed = query.seed.as_deref().map(str::trim).filter(|s| !s.is_empty());

	match bot.generate(channel, seed) {
		Ok(phrase) => HttpResponse::Ok().body(phrase),
		Err(e) => error_response(e),
	}
}

#[get("/v1/channels")]
async fn get_channels(bot: web::Data<ChainBot>) -> impl Responder {
	match bot.store().partitions() {
		Ok(channels) => HttpResponse::Ok().body(channels.join("\n")),
		Err(e) => error_response(e),
	}
}

/// HTTP PUT endpoint `/v1/import`
///
/// Learns a corpus file found under `<data_dir>/corpus`. Paths leaving that
/// directory are refused with 400.
#[put("/v1/import")]
async fn put_import(bot: web::Data<ChainBot>, query: web::Query<ImportParams>) -> impl Responder {
	let channel = match valid_channel(&query.channel) {
		Ok(c) => c,
		Err(response) => return response,
	};

	match bot.import(channel, &query.path) {
		Ok(lines) => HttpResponse::Ok().body(format!("Imported {lines} lines into {channel}")),
		Err(e) => error_response(e),
	}
}

/// Builds the CORS policy: browsers may only call from `allowed_origins`.
///
/// Requests without an `Origin` header (the desktop client, curl) are not
/// affected.
fn cors(allowed_origins: &[String]) -> Cors {
	allowed_origins
		.iter()
		.fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
		.allowed_methods(vec!["GET", "POST", "PUT"])
		.max_age(3600)
}

/// Main entry point for the server.
///
/// Loads the configuration (see `rs_chain_core::config`), opens the store
/// and starts an Actix-web HTTP server on 127.0.0.1:5000. Every partition is
/// flushed and closed once the server stops.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init();

	let config = Config::load().map_err(std::io::Error::other)?;
	log::info!("data directory: {}", config.data_dir.display());
	log::info!("corpus directory: {}", config.corpus_dir().display());
	let allowed_origins = config.allowed_origins.clone();

	let bot = web::Data::new(ChainBot::new(config).map_err(std::io::Error::other)?);
	let shared_bot = bot.clone();

	HttpServer::new(move || {
		App::new()
			.wrap(cors(&allowed_origins))
			.app_data(shared_bot.clone())
			.service(post_message)
			.service(get_generated)
			.service(get_channels)
			.service(put_import)
	})
		.bind(("127.0.0.1", 5000))?
		.run()
		.await?;

	bot.close().map_err(std::io::Error::other)
}
