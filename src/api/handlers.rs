//! Request Handlers
//!
//! Thin adapters from HTTP to [`WageringService`]. Caller identity comes
//! from the upstream authentication gateway; origin from the first
//! `x-forwarded-for` hop when trusted, else the socket peer address.

use super::{
    errors::ApiError,
    middleware::RequestId,
    models::*,
    security::{LimitClass, RateLimiter},
};
use crate::common::types::{RoundId, UserId};
use crate::errors::WageringError;
use crate::rounds::{Actor, Round};
use crate::service::WageringService;
use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use std::net::SocketAddr;
use std::sync::Arc;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const OPERATOR_ID_HEADER: &str = "x-operator-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// Shared application state
pub struct AppState {
    pub service: Arc<WageringService>,
    pub limiter: RateLimiter,
    pub trust_forwarded_for: bool,
    pub version: String,
}

impl AppState {
    pub fn new(service: Arc<WageringService>, trust_forwarded_for: bool) -> Self {
        let limiter = RateLimiter::from_limits(service.limits());
        Self {
            service,
            limiter,
            trust_forwarded_for,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn caller(headers: &HeaderMap, request_id: &RequestId) -> Result<UserId, ApiError> {
    header_value(headers, USER_ID_HEADER)
        .map(UserId::from)
        .ok_or_else(|| {
            ApiError::unauthorized(
                request_id.0.clone(),
                format!("missing {} header", USER_ID_HEADER),
            )
        })
}

fn origin(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Option<String> {
    if state.trust_forwarded_for {
        let first_hop = header_value(headers, FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(hop) = first_hop {
            return Some(hop.to_string());
        }
    }
    peer.map(|ConnectInfo(addr)| addr.ip().to_string())
}

fn throttle(
    state: &AppState,
    caller: &UserId,
    class: LimitClass,
    request_id: &RequestId,
) -> Result<(), ApiError> {
    if state.limiter.check(caller.as_str(), class) {
        Ok(())
    } else {
        tracing::debug!(user = %caller, class = ?class, "rate limited");
        Err(ApiError::rate_limited(
            request_id.0.clone(),
            state.limiter.limit_of(class),
        ))
    }
}

fn round_id(raw: &str, request_id: &RequestId) -> Result<RoundId, ApiError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(
            request_id.0.clone(),
            "round_id cannot be empty".to_string(),
        ));
    }
    Ok(RoundId::new(trimmed))
}

fn wagering(request_id: &RequestId) -> impl Fn(WageringError) -> ApiError + '_ {
    move |e| ApiError::wagering(request_id.0.clone(), e)
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "Running".to_string(),
        version: state.version.clone(),
        games: state.service.catalog().len(),
    })
}

/// GET /metrics
pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.service.metrics().render(),
    )
}

/// POST /api/games/launch
///
/// Demo launches need no caller identity.
pub async fn launch_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LaunchRequest>,
) -> Result<Json<LaunchResponse>, ApiError> {
    if body.demo {
        let launch = state
            .service
            .launch_demo(&body.game_id)
            .map_err(wagering(&request_id))?;
        return Ok(Json(launch));
    }

    let user = caller(&headers, &request_id)?;
    let origin = origin(&state, &headers, peer);
    let launch = state
        .service
        .launch_session(&user, &body.game_id, false, origin.as_deref())
        .await
        .map_err(wagering(&request_id))?;
    Ok(Json(launch))
}

/// POST /api/games/bet
pub async fn bet_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<WagerRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = caller(&headers, &request_id)?;
    throttle(&state, &user, LimitClass::Wager, &request_id)?;
    let round_id = round_id(&body.round_id, &request_id)?;
    let origin = origin(&state, &headers, peer);

    let balance = state
        .service
        .place_bet(&user, &body.session_token, &round_id, body.amount, origin.as_deref())
        .await
        .map_err(wagering(&request_id))?;
    Ok(Json(BalanceResponse { balance }))
}

/// POST /api/games/win
pub async fn win_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<WagerRequest>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user = caller(&headers, &request_id)?;
    throttle(&state, &user, LimitClass::Wager, &request_id)?;
    let round_id = round_id(&body.round_id, &request_id)?;
    let origin = origin(&state, &headers, peer);

    let balance = state
        .service
        .report_win(&user, &body.session_token, &round_id, body.amount, origin.as_deref())
        .await
        .map_err(wagering(&request_id))?;
    Ok(Json(BalanceResponse { balance }))
}

/// POST /api/games/rollback/:round_id
///
/// Operators (provider callbacks) identify with `x-operator-id`; otherwise
/// the player in `x-user-id` must own the round and pays from the wager budget.
pub async fn rollback_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(raw_round_id): Path<String>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let actor = match header_value(&headers, OPERATOR_ID_HEADER) {
        Some(operator) => Actor::Operator(operator.to_string()),
        None => {
            let user = caller(&headers, &request_id)?;
            throttle(&state, &user, LimitClass::Wager, &request_id)?;
            Actor::Player(user)
        }
    };
    let round_id = round_id(&raw_round_id, &request_id)?;

    state
        .service
        .rollback(&actor, &round_id)
        .await
        .map_err(wagering(&request_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/games/spin
pub async fn spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<SpinRequest>,
) -> Result<Json<SpinResponse>, ApiError> {
    let token = body.session_token.clone().ok_or_else(|| {
        ApiError::bad_request(request_id.0.clone(), "session_token is required".to_string())
    })?;
    spin(&request_id, &state, peer, &headers, &token, body).await
}

/// POST /api/game-sessions/:token/spin
pub async fn session_spin_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<SpinRequest>,
) -> Result<Json<SpinResponse>, ApiError> {
    spin(&request_id, &state, peer, &headers, &token, body).await
}

async fn spin(
    request_id: &RequestId,
    state: &AppState,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: &HeaderMap,
    token: &str,
    body: SpinRequest,
) -> Result<Json<SpinResponse>, ApiError> {
    let user = caller(headers, request_id)?;
    throttle(state, &user, LimitClass::Spin, request_id)?;
    let round_id = match body.round_id.as_deref() {
        Some(raw) => Some(round_id(raw, request_id)?),
        None => None,
    };
    let origin = origin(state, headers, peer);

    let result = state
        .service
        .spin(
            &user,
            token,
            body.game_id.as_deref(),
            body.stake,
            round_id,
            origin.as_deref(),
        )
        .await
        .map_err(wagering(request_id))?;
    Ok(Json(result))
}

/// POST /api/game-sessions/:token/end
pub async fn end_session_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
) -> Result<StatusCode, ApiError> {
    let user = caller(&headers, &request_id)?;
    let origin = origin(&state, &headers, peer);
    state
        .service
        .end_session(&user, &token, origin.as_deref())
        .await
        .map_err(wagering(&request_id))?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/balance
pub async fn balance_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AccountResponse>, ApiError> {
    let user = caller(&headers, &request_id)?;
    let account = state
        .service
        .account(&user)
        .map_err(wagering(&request_id))?;
    Ok(Json(AccountResponse {
        user_id: account.user_id,
        balance: account.balance,
        status: account.status,
    }))
}

/// GET /api/rounds/:round_id
pub async fn round_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Path(raw_round_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Round>, ApiError> {
    let user = caller(&headers, &request_id)?;
    let round_id = round_id(&raw_round_id, &request_id)?;
    let round = state
        .service
        .round(&user, &round_id)
        .map_err(wagering(&request_id))?;
    Ok(Json(round))
}

/// GET /api/ledger?limit={n}
pub async fn ledger_handler(
    Extension(request_id): Extension<RequestId>,
    State(state): State<Arc<AppState>>,
    Query(query): Query<LedgerQuery>,
    headers: HeaderMap,
) -> Result<Json<LedgerResponse>, ApiError> {
    let user = caller(&headers, &request_id)?;
    let entries = state
        .service
        .ledger(&user, query.limit.min(MAX_LEDGER_LIMIT))
        .map_err(wagering(&request_id))?;
    Ok(Json(LedgerResponse {
        user_id: user,
        entries,
    }))
}
