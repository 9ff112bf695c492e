use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use log::info;
use tower_http::cors::{Any, CorsLayer};

use saferoute::EngineConfig;
use saferoute::SafetyRouter;
use saferoute::api;
use saferoute::providers::nominatim::DEFAULT_NOMINATIM_URL;
use saferoute::providers::overpass::DEFAULT_OVERPASS_URL;
use saferoute::providers::{
    EnvironmentSource, GeocoderSource, GraphSource, NominatimGeocoder, OpenMeteoProvider,
    OverpassProvider, PbfExtract,
};

#[derive(Parser, Debug)]
#[command(version, about = "Safety-scored routing service")]
struct ServeArgs {
    /// Engine policy file (TOML). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Serve roads from a local .osm.pbf extract instead of Overpass.
    #[arg(long)]
    pbf: Option<PathBuf>,

    #[arg(long, env = "OVERPASS_URL", default_value = DEFAULT_OVERPASS_URL)]
    overpass_url: String,

    /// Skip live AQI and weather; every request uses the neutral snapshot.
    #[arg(long)]
    offline_environment: bool,

    #[arg(long, env = "NOMINATIM_URL", default_value = DEFAULT_NOMINATIM_URL)]
    nominatim_url: String,

    /// Accept coordinates only; place names are never looked up.
    #[arg(long)]
    no_geocoding: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();
    let args = ServeArgs::parse();

    // 1. Engine policy
    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => EngineConfig::default(),
    };

    // 2. Road data
    let graphs = match &args.pbf {
        Some(path) => {
            let extract = tokio::task::spawn_blocking({
                let path = path.clone();
                move || PbfExtract::open(&path)
            })
            .await?
            .with_context(|| format!("reading {}", path.display()))?;
            GraphSource::Pbf(extract)
        }
        None => GraphSource::Overpass(OverpassProvider::new(
            &args.overpass_url,
            config.acquisition.fetch_timeout(),
        )?),
    };

    // 3. Air quality and weather
    let environment = if args.offline_environment {
        EnvironmentSource::Disabled
    } else {
        EnvironmentSource::OpenMeteo(OpenMeteoProvider::new(config.environment.timeout())?)
    };

    // 4. Place names
    let geocoder = if args.no_geocoding {
        GeocoderSource::Disabled
    } else {
        GeocoderSource::Nominatim(NominatimGeocoder::new(
            &args.nominatim_url,
            config.environment.timeout(),
        )?)
    };

    let engine = Arc::new(SafetyRouter::new(&config, graphs, environment)?);

    // Allows a local map page to talk to this API
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);
    let app = api::router(engine, geocoder).layer(cors);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port)
        .parse()
        .with_context(|| format!("invalid bind address {}:{}", args.bind, args.port))?;
    info!("API server running on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
