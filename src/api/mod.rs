mod registry;

use axum::{
    Router,
    extract::{Json, Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::config::{DEFAULT_MAX_TICKS, MAX_PROJECTION_TICKS, ProjectArgs, ServeConfig};
use crate::core::{
    Debt, Projection, Simulation, SimulationParameters, SimulationSample, project, round_cents,
};

pub use registry::DebtRegistry;

#[derive(Default)]
struct HostState {
    registry: DebtRegistry,
    sessions: HashMap<u32, Simulation>,
}

/// Shared state for the HTTP host: debt records plus one live simulation
/// session per debt, created on first use.
#[derive(Clone)]
pub struct AppState {
    host: Arc<Mutex<HostState>>,
    tick_period: Duration,
}

impl AppState {
    pub fn new(tick_period: Duration) -> Self {
        Self {
            host: Arc::new(Mutex::new(HostState::default())),
            tick_period,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DebtPayload {
    debtor_name: Option<String>,
    amount: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ConfigurePayload {
    interest_rate: Option<f64>,
    repayment_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    principal: Option<f64>,
    interest_rate: Option<f64>,
    repayment_rate: Option<f64>,
    max_ticks: Option<u32>,
}

#[derive(Debug, Clone, Copy)]
pub struct ProjectionInputs {
    pub params: SimulationParameters,
    pub max_ticks: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationResponse {
    debt: Debt,
    interest_rate: f64,
    repayment_rate: f64,
    is_running: bool,
    tick_index: u32,
    remaining_balance: f64,
    total_interest_accrued: f64,
    history: Vec<SimulationSample>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    principal: f64,
    interest_rate: f64,
    repayment_rate: f64,
    max_ticks: u32,
    #[serde(flatten)]
    projection: Projection,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn validate_amount(name: &str, value: f64) -> Result<(), String> {
    if !value.is_finite() || value < 0.0 {
        return Err(format!("{name} must be a finite number >= 0"));
    }
    Ok(())
}

fn validate_debt(debtor_name: &str, amount: f64) -> Result<(), String> {
    if debtor_name.trim().is_empty() {
        return Err("debtorName must not be empty".to_string());
    }
    validate_amount("amount", amount)
}

fn validate_rates(interest_rate: f64, repayment_rate: f64) -> Result<(), String> {
    validate_amount("interestRate", interest_rate)?;
    validate_amount("repaymentRate", repayment_rate)
}

/// Checks projection arguments shared by the CLI and `/api/project`.
pub fn build_projection_inputs(args: &ProjectArgs) -> Result<ProjectionInputs, String> {
    validate_amount("principal", args.principal)?;
    validate_rates(args.interest_rate, args.repayment_rate)?;

    if args.max_ticks == 0 || args.max_ticks > MAX_PROJECTION_TICKS {
        return Err(format!("maxTicks must be between 1 and {MAX_PROJECTION_TICKS}"));
    }

    Ok(ProjectionInputs {
        params: SimulationParameters::new(args.principal, args.interest_rate, args.repayment_rate),
        max_ticks: args.max_ticks,
    })
}

fn default_project_args() -> ProjectArgs {
    ProjectArgs {
        principal: 0.0,
        interest_rate: 0.0,
        repayment_rate: 0.0,
        max_ticks: DEFAULT_MAX_TICKS,
        json: true,
    }
}

#[cfg(test)]
fn projection_inputs_from_json(json: &str) -> Result<ProjectionInputs, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    projection_inputs_from_payload(payload)
}

fn projection_inputs_from_payload(payload: ProjectPayload) -> Result<ProjectionInputs, String> {
    let mut args = default_project_args();
    if let Some(v) = payload.principal {
        args.principal = v;
    }
    if let Some(v) = payload.interest_rate {
        args.interest_rate = v;
    }
    if let Some(v) = payload.repayment_rate {
        args.repayment_rate = v;
    }
    if let Some(v) = payload.max_ticks {
        args.max_ticks = v;
    }
    build_projection_inputs(&args)
}

/// Projection with money values rounded for output.
pub fn rounded_projection(projection: Projection) -> Projection {
    Projection {
        final_balance: round_cents(projection.final_balance),
        total_interest_accrued: round_cents(projection.total_interest_accrued),
        samples: projection.samples.iter().map(SimulationSample::rounded).collect(),
        ..projection
    }
}

fn build_project_response(inputs: &ProjectionInputs) -> ProjectResponse {
    ProjectResponse {
        principal: inputs.params.principal,
        interest_rate: inputs.params.interest_rate_percent,
        repayment_rate: inputs.params.repayment_rate_per_tick,
        max_ticks: inputs.max_ticks,
        projection: rounded_projection(project(&inputs.params, inputs.max_ticks)),
    }
}

fn build_simulation_response(simulation: &Simulation) -> SimulationResponse {
    let params = simulation.parameters();
    let state = simulation.snapshot();
    SimulationResponse {
        debt: simulation.debt().clone(),
        interest_rate: params.interest_rate_percent,
        repayment_rate: params.repayment_rate_per_tick,
        is_running: state.is_running,
        tick_index: state.tick_index,
        remaining_balance: round_cents(state.remaining_balance),
        total_interest_accrued: round_cents(state.total_interest_accrued),
        history: state.history.iter().map(SimulationSample::rounded).collect(),
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/debts",
            get(list_debts_handler).post(create_debt_handler),
        )
        .route(
            "/api/debts/:id",
            get(get_debt_handler)
                .put(update_debt_handler)
                .delete(delete_debt_handler),
        )
        .route("/api/debts/:id/simulation", get(simulation_handler))
        .route(
            "/api/debts/:id/simulation/configure",
            post(configure_handler),
        )
        .route("/api/debts/:id/simulation/start", post(start_handler))
        .route("/api/debts/:id/simulation/stop", post(stop_handler))
        .route("/api/debts/:id/simulation/reset", post(reset_handler))
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .fallback(not_found_handler)
        .with_state(state)
}

pub async fn run_http_server(config: ServeConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = router(AppState::new(config.tick_period));

    let listener = TcpListener::bind(addr).await?;
    info!(
        "Debt simulation API listening on http://{addr} (tick period {:?})",
        config.tick_period
    );

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn list_debts_handler(State(state): State<AppState>) -> Response {
    let host = state.host.lock().await;
    json_response(StatusCode::OK, host.registry.list())
}

async fn create_debt_handler(
    State(state): State<AppState>,
    Json(payload): Json<DebtPayload>,
) -> Response {
    let debtor_name = payload.debtor_name.unwrap_or_default();
    let amount = payload.amount.unwrap_or(0.0);
    if let Err(msg) = validate_debt(&debtor_name, amount) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    let mut host = state.host.lock().await;
    let debt = host.registry.insert(debtor_name, amount);
    info!(debt_id = debt.id, amount, "debt created");
    json_response(StatusCode::CREATED, debt)
}

async fn get_debt_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    let host = state.host.lock().await;
    match host.registry.get(id) {
        Some(debt) => json_response(StatusCode::OK, debt),
        None => debt_not_found(id),
    }
}

async fn update_debt_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(payload): Json<DebtPayload>,
) -> Response {
    let mut host = state.host.lock().await;
    let Some(existing) = host.registry.get(id).cloned() else {
        return debt_not_found(id);
    };

    let debtor_name = payload
        .debtor_name
        .unwrap_or_else(|| existing.debtor_name.clone());
    let amount = payload.amount.unwrap_or(existing.amount);
    if let Err(msg) = validate_debt(&debtor_name, amount) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }

    let Some(debt) = host.registry.update(id, debtor_name, amount) else {
        return debt_not_found(id);
    };
    if let Some(simulation) = host.sessions.get_mut(&id) {
        if debt.amount != existing.amount {
            simulation.rebind(debt.clone());
        } else {
            simulation.rename_debtor(debt.debtor_name.clone());
        }
    }
    json_response(StatusCode::OK, debt)
}

async fn delete_debt_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    let mut host = state.host.lock().await;
    let Some(debt) = host.registry.remove(id) else {
        return debt_not_found(id);
    };
    // Dropping the session cancels any run still ticking.
    host.sessions.remove(&id);
    info!(debt_id = id, "debt deleted");
    json_response(StatusCode::OK, debt)
}

async fn simulation_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    with_session(&state, id, |_| {}).await
}

async fn configure_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(payload): Json<ConfigurePayload>,
) -> Response {
    let interest_rate = payload.interest_rate.unwrap_or(0.0);
    let repayment_rate = payload.repayment_rate.unwrap_or(0.0);
    if let Err(msg) = validate_rates(interest_rate, repayment_rate) {
        return error_response(StatusCode::BAD_REQUEST, &msg);
    }
    with_session(&state, id, |simulation| {
        simulation.configure(interest_rate, repayment_rate)
    })
    .await
}

async fn start_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    with_session(&state, id, Simulation::start).await
}

async fn stop_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    with_session(&state, id, Simulation::stop).await
}

async fn reset_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    with_session(&state, id, Simulation::reset).await
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload)
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload)
}

fn project_handler_impl(payload: ProjectPayload) -> Response {
    match projection_inputs_from_payload(payload) {
        Ok(inputs) => json_response(StatusCode::OK, build_project_response(&inputs)),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

/// Applies `action` to the debt's session, creating the session on first
/// use, and responds with the resulting progress.
async fn with_session<F>(state: &AppState, id: u32, action: F) -> Response
where
    F: FnOnce(&mut Simulation),
{
    let mut guard = state.host.lock().await;
    let host = &mut *guard;
    let Some(debt) = host.registry.get(id).cloned() else {
        return debt_not_found(id);
    };

    let simulation = match host.sessions.entry(id) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => match Simulation::new(debt, state.tick_period) {
            Ok(simulation) => entry.insert(simulation),
            Err(e) => {
                error!("Failed to create simulation for debt {id}: {e}");
                return error_response(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            }
        },
    };

    action(simulation);
    json_response(StatusCode::OK, build_simulation_response(simulation))
}

fn debt_not_found(id: u32) -> Response {
    error_response(StatusCode::NOT_FOUND, &format!("Debt {id} not found"))
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("readable body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn test_state() -> AppState {
        AppState::new(Duration::from_secs(1))
    }

    async fn create_debt(state: &AppState, name: &str, amount: f64) -> u32 {
        let response = create_debt_handler(
            State(state.clone()),
            Json(DebtPayload {
                debtor_name: Some(name.to_string()),
                amount: Some(amount),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["id"].as_u64().expect("id") as u32
    }

    async fn configure(
        state: &AppState,
        id: u32,
        interest_rate: f64,
        repayment_rate: f64,
    ) -> Response {
        configure_handler(
            State(state.clone()),
            Path(id),
            Json(ConfigurePayload {
                interest_rate: Some(interest_rate),
                repayment_rate: Some(repayment_rate),
            }),
        )
        .await
    }

    #[test]
    fn projection_inputs_from_json_parses_web_keys() {
        let inputs = projection_inputs_from_json(
            r#"{"principal": 1200, "interestRate": 1.5, "repaymentRate": 100, "maxTicks": 48}"#,
        )
        .expect("json should parse");

        assert_approx(inputs.params.principal, 1_200.0);
        assert_approx(inputs.params.interest_rate_percent, 1.5);
        assert_approx(inputs.params.repayment_rate_per_tick, 100.0);
        assert_eq!(inputs.max_ticks, 48);
    }

    #[test]
    fn projection_inputs_default_max_ticks() {
        let inputs = projection_inputs_from_json(r#"{"principal": 10}"#).expect("valid");
        assert_eq!(inputs.max_ticks, DEFAULT_MAX_TICKS);
        assert_approx(inputs.params.repayment_rate_per_tick, 0.0);
    }

    #[test]
    fn projection_inputs_reject_negative_rate() {
        let err = projection_inputs_from_json(r#"{"principal": 10, "interestRate": -1}"#)
            .expect_err("must reject negative rate");
        assert!(err.contains("interestRate"));
    }

    #[test]
    fn projection_inputs_reject_out_of_range_tick_cap() {
        let err = projection_inputs_from_json(r#"{"principal": 10, "maxTicks": 0}"#)
            .expect_err("must reject zero cap");
        assert!(err.contains("maxTicks"));

        let err = projection_inputs_from_json(r#"{"principal": 10, "maxTicks": 100001}"#)
            .expect_err("must reject huge cap");
        assert!(err.contains("maxTicks"));
    }

    #[test]
    fn project_response_rounds_money_to_cents() {
        let inputs = projection_inputs_from_json(
            r#"{"principal": 100, "interestRate": 3.333, "repaymentRate": 30}"#,
        )
        .expect("valid");
        let response = build_project_response(&inputs);

        // (100 - 30) * 1.03333 = 72.3331
        let first = response.projection.samples[0];
        assert_approx(first.remaining_balance_after_tick, 72.33);
        assert!(response.projection.paid_off);
        assert_approx(
            response.projection.final_balance,
            round_cents(response.projection.final_balance),
        );
    }

    #[test]
    fn project_response_serialization_contains_expected_fields() {
        let inputs = projection_inputs_from_json(
            r#"{"principal": 100, "interestRate": 0, "repaymentRate": 50}"#,
        )
        .expect("valid");
        let value = serde_json::to_value(build_project_response(&inputs)).expect("serializes");

        assert_eq!(value["ticks"], 2);
        assert_eq!(value["paidOff"], true);
        assert_eq!(value["maxTicks"], DEFAULT_MAX_TICKS);
        assert_eq!(value["samples"][1]["tickIndex"], 2);
        assert_eq!(value["samples"][1]["paymentApplied"], 50.0);
        assert_eq!(value["samples"][1]["remainingBalanceAfterTick"], 0.0);
    }

    #[tokio::test]
    async fn project_handler_rejects_invalid_payload() {
        let response = project_post_handler(Json(ProjectPayload {
            principal: Some(f64::NAN),
            ..ProjectPayload::default()
        }))
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert!(body["error"].as_str().unwrap_or_default().contains("principal"));
    }

    #[tokio::test]
    async fn create_debt_rejects_blank_name() {
        let response = create_debt_handler(
            State(test_state()),
            Json(DebtPayload {
                debtor_name: Some("  ".to_string()),
                amount: Some(10.0),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_debt_is_not_found() {
        let state = test_state();
        let response = start_handler(State(state.clone()), Path(42)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get_debt_handler(State(state), Path(42)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test(start_paused = true)]
    async fn live_session_runs_to_payoff() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 100.0).await;

        let response = configure(&state, id, 0.0, 50.0).await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(start_handler(State(state.clone()), Path(id)).await).await;
        assert_eq!(body["isRunning"], true);
        assert_eq!(body["tickIndex"], 0);

        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let body = body_json(simulation_handler(State(state.clone()), Path(id)).await).await;
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["tickIndex"], 2);
        assert_eq!(body["remainingBalance"], 0.0);
        assert_eq!(body["history"].as_array().map(Vec::len), Some(2));
        assert_eq!(body["debt"]["debtorName"], "Ana");
        assert_eq!(body["repaymentRate"], 50.0);
    }

    #[tokio::test(start_paused = true)]
    async fn configure_mid_run_resets_session() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 100.0).await;
        configure(&state, id, 0.0, 10.0).await;
        start_handler(State(state.clone()), Path(id)).await;
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        let body = body_json(configure(&state, id, 1.0, 20.0).await).await;
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["tickIndex"], 0);
        assert_eq!(body["remainingBalance"], 100.0);
        assert_eq!(body["history"].as_array().map(Vec::len), Some(0));
        assert_eq!(body["interestRate"], 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn configure_rejects_negative_repayment() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 100.0).await;
        let response = configure(&state, id, 0.0, -5.0).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_and_reset_through_handlers() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 10.0).await;
        start_handler(State(state.clone()), Path(id)).await;
        tokio::time::sleep(Duration::from_millis(3_500)).await;

        let body = body_json(stop_handler(State(state.clone()), Path(id)).await).await;
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["tickIndex"], 3);

        let body = body_json(reset_handler(State(state.clone()), Path(id)).await).await;
        assert_eq!(body["tickIndex"], 0);
        assert_eq!(body["remainingBalance"], 10.0);
    }

    #[tokio::test(start_paused = true)]
    async fn updating_debt_rebinds_its_session() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 100.0).await;
        configure(&state, id, 0.0, 10.0).await;
        start_handler(State(state.clone()), Path(id)).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let response = update_debt_handler(
            State(state.clone()),
            Path(id),
            Json(DebtPayload {
                debtor_name: None,
                amount: Some(60.0),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(simulation_handler(State(state.clone()), Path(id)).await).await;
        assert_eq!(body["isRunning"], false);
        assert_eq!(body["remainingBalance"], 60.0);
        assert_eq!(body["repaymentRate"], 0.0);
        assert_eq!(body["debt"]["debtorName"], "Ana");
    }

    #[tokio::test(start_paused = true)]
    async fn renaming_debt_keeps_session_running() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 100.0).await;
        configure(&state, id, 0.0, 10.0).await;
        start_handler(State(state.clone()), Path(id)).await;
        tokio::time::sleep(Duration::from_millis(1_500)).await;

        let response = update_debt_handler(
            State(state.clone()),
            Path(id),
            Json(DebtPayload {
                debtor_name: Some("Ana Maria".to_string()),
                amount: Some(100.0),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        tokio::time::sleep(Duration::from_secs(1)).await;
        let body = body_json(simulation_handler(State(state.clone()), Path(id)).await).await;
        assert_eq!(body["isRunning"], true);
        assert_eq!(body["tickIndex"], 2);
        assert_eq!(body["repaymentRate"], 10.0);
        assert_eq!(body["debt"]["debtorName"], "Ana Maria");
    }

    #[tokio::test(start_paused = true)]
    async fn deleting_debt_drops_its_session() {
        let state = test_state();
        let id = create_debt(&state, "Ana", 10.0).await;
        start_handler(State(state.clone()), Path(id)).await;

        let response = delete_debt_handler(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.host.lock().await.sessions.is_empty());

        let response = simulation_handler(State(state.clone()), Path(id)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(list_debts_handler(State(state)).await).await;
        assert_eq!(body.as_array().map(Vec::len), Some(0));
    }
}
