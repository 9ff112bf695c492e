//! HTTP boundary: request DTOs, handlers and the error-to-status mapping.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::engine::{RouteRequest, SafetyRouter};
use crate::error::{DataSource, RoutingError};
use crate::geometry::Coordinate;
use crate::providers::{EnvironmentProvider, Geocoder, GraphProvider};
use crate::summary::RouteResponse;

/// `[lat, lon]`, `"lat,lon"` or a place name.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PointInput {
    Pair([f64; 2]),
    Text(String),
}

impl PointInput {
    /// Coordinates are taken as given; any other text is looked up by name.
    pub async fn resolve<Q: Geocoder>(&self, geocoder: &Q) -> Result<Coordinate, ApiError> {
        let (lat, lon) = match self {
            PointInput::Pair([lat, lon]) => (*lat, *lon),
            PointInput::Text(text) if text.trim().is_empty() => {
                return Err(ApiError::BadRequest("empty location".to_string()));
            }
            PointInput::Text(text) => match parse_lat_lon(text) {
                Some(pair) => pair,
                None => return Ok(geocode(geocoder, text.trim()).await?),
            },
        };
        Ok(Coordinate::new(lat, lon)?)
    }
}

fn parse_lat_lon(text: &str) -> Option<(f64, f64)> {
    let mut parts = text.split(',').map(|p| p.trim().parse::<f64>());
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(lat)), Some(Ok(lon)), None) => Some((lat, lon)),
        _ => None,
    }
}

async fn geocode<Q: Geocoder>(geocoder: &Q, query: &str) -> Result<Coordinate, RoutingError> {
    match geocoder.geocode(query).await {
        Ok(Some(found)) => {
            info!("Resolved \"{}\" to ({:.5}, {:.5})", query, found.lat(), found.lon());
            Ok(found)
        }
        Ok(None) => Err(RoutingError::PlaceNotFound {
            query: query.to_string(),
        }),
        Err(e) => Err(RoutingError::SourceUnreachable {
            provider: DataSource::Geocoder,
            reason: e.to_string(),
        }),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RouteBody {
    pub origin: PointInput,
    pub destination: PointInput,
    #[serde(default)]
    pub radius_m: Option<f64>,
}

impl RouteBody {
    pub async fn into_request<Q: Geocoder>(self, geocoder: &Q) -> Result<RouteRequest, ApiError> {
        let (origin, destination) = tokio::try_join!(
            self.origin.resolve(geocoder),
            self.destination.resolve(geocoder)
        )?;
        Ok(RouteRequest {
            origin,
            destination,
            radius_override_m: self.radius_m,
        })
    }
}

#[derive(Debug)]
pub enum ApiError {
    Routing(RoutingError),
    BadRequest(String),
}

impl From<RoutingError> for ApiError {
    fn from(e: RoutingError) -> Self {
        ApiError::Routing(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad_request", message),
            ApiError::Routing(e) => {
                let status = match e {
                    RoutingError::InvalidCoordinate { .. } => StatusCode::BAD_REQUEST,
                    RoutingError::RegionTooLarge { .. } | RoutingError::RegionRefused { .. } => {
                        StatusCode::UNPROCESSABLE_ENTITY
                    }
                    RoutingError::GraphUnavailable
                    | RoutingError::NoPathFound
                    | RoutingError::PlaceNotFound { .. } => StatusCode::NOT_FOUND,
                    RoutingError::SourceUnreachable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                };
                (status, e.kind(), e.to_string())
            }
        };
        if status.is_server_error() {
            warn!("Request failed: {}", message);
        }
        (status, Json(ErrorBody { error, message })).into_response()
    }
}

/// Shared by every handler.
pub struct ApiState<G, E, Q> {
    engine: Arc<SafetyRouter<G, E>>,
    geocoder: Arc<Q>,
}

impl<G, E, Q> Clone for ApiState<G, E, Q> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            geocoder: Arc::clone(&self.geocoder),
        }
    }
}

pub fn router<G, E, Q>(engine: Arc<SafetyRouter<G, E>>, geocoder: Q) -> Router
where
    G: GraphProvider + 'static,
    E: EnvironmentProvider + 'static,
    Q: Geocoder + 'static,
{
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/route", post(calculate_route::<G, E, Q>))
        .with_state(ApiState {
            engine,
            geocoder: Arc::new(geocoder),
        })
}

async fn calculate_route<G, E, Q>(
    State(state): State<ApiState<G, E, Q>>,
    payload: Result<Json<RouteBody>, JsonRejection>,
) -> Result<Json<RouteResponse>, ApiError>
where
    G: GraphProvider + 'static,
    E: EnvironmentProvider + 'static,
    Q: Geocoder + 'static,
{
    let Json(body) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let request = body.into_request(state.geocoder.as_ref()).await?;
    Ok(Json(state.engine.route(request).await?))
}
