use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, error::ErrorKind};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::core::{
    DistributionSummary, HistogramBin, SimulationError, SimulationParameters, Trajectory,
    YearBand, histogram, run_simulation, run_simulation_parallel, summarize, year_bands,
};

const MAX_SIMULATIONS: i64 = 1_000_000;
const MAX_YEARS: i64 = 1_000;
const MAX_PATH_POINTS: i64 = 20_000_000;
const MAX_HISTOGRAM_BINS: i64 = 500;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
enum EngineMode {
    Sequential,
    Parallel,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    initial_amount: Option<f64>,
    annual_return: Option<f64>,
    volatility: Option<f64>,
    years: Option<i64>,
    num_simulations: Option<i64>,
    seed: Option<i64>,
    histogram_bins: Option<i64>,
    parallel: Option<bool>,
    include_trajectories: Option<bool>,
}

#[derive(Parser, Debug)]
#[command(
    name = "portfolio-sim",
    about = "Monte Carlo projection of a single-asset portfolio with i.i.d. normal annual returns"
)]
struct Cli {
    #[arg(long, default_value_t = 100_000.0, help = "Starting portfolio value")]
    initial_amount: f64,
    #[arg(
        long,
        default_value_t = 7.0,
        allow_negative_numbers = true,
        help = "Expected annual return in percent, e.g. 7"
    )]
    annual_return: f64,
    #[arg(
        long,
        default_value_t = 15.0,
        allow_negative_numbers = true,
        help = "Annual return volatility (standard deviation) in percent"
    )]
    volatility: f64,
    #[arg(long, default_value_t = 30, allow_negative_numbers = true)]
    years: i64,
    #[arg(long, default_value_t = 1_000, allow_negative_numbers = true)]
    simulations: i64,
    #[arg(
        long,
        default_value_t = 42,
        allow_negative_numbers = true,
        help = "32-bit seed; negative values wrap to their unsigned form"
    )]
    seed: i64,
    #[arg(long, default_value_t = 30, allow_negative_numbers = true)]
    histogram_bins: i64,
    #[arg(
        long,
        default_value_t = false,
        help = "Simulate with one independent stream per path (not bit-compatible with the default)"
    )]
    parallel: bool,
    #[arg(long, default_value_t = false)]
    include_trajectories: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ReportOptions {
    histogram_bins: usize,
    mode: EngineMode,
    include_trajectories: bool,
}

#[derive(Debug)]
struct ApiRequest {
    params: SimulationParameters,
    options: ReportOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectionReport {
    engine: EngineMode,
    parameters: SimulationParameters,
    deterministic_final_value: f64,
    summary: DistributionSummary,
    year_bands: Vec<YearBand>,
    histogram: Vec<HistogramBin>,
    #[serde(skip_serializing_if = "Option::is_none")]
    trajectories: Option<Vec<Trajectory>>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

fn build_request(cli: Cli) -> Result<ApiRequest, String> {
    if !cli.initial_amount.is_finite() || cli.initial_amount <= 0.0 {
        return Err("--initial-amount must be > 0".to_string());
    }

    if !cli.annual_return.is_finite() {
        return Err("--annual-return must be a finite number".to_string());
    }

    if !cli.volatility.is_finite() || cli.volatility < 0.0 {
        return Err("--volatility must be >= 0".to_string());
    }

    if cli.years < 0 {
        return Err("--years must be >= 0".to_string());
    }

    if cli.years > MAX_YEARS {
        return Err(format!("--years must be <= {MAX_YEARS}"));
    }

    if cli.simulations < 0 {
        return Err("--simulations must be >= 0".to_string());
    }

    if cli.simulations > MAX_SIMULATIONS {
        return Err(format!("--simulations must be <= {MAX_SIMULATIONS}"));
    }

    if cli.simulations * (cli.years + 1) > MAX_PATH_POINTS {
        return Err(format!(
            "--simulations x (--years + 1) must be <= {MAX_PATH_POINTS}"
        ));
    }

    if !(i64::from(i32::MIN)..=i64::from(u32::MAX)).contains(&cli.seed) {
        return Err("--seed must fit in 32 bits".to_string());
    }

    if !(1..=MAX_HISTOGRAM_BINS).contains(&cli.histogram_bins) {
        return Err(format!(
            "--histogram-bins must be between 1 and {MAX_HISTOGRAM_BINS}"
        ));
    }

    let params = SimulationParameters {
        initial_amount: cli.initial_amount,
        annual_return: cli.annual_return / 100.0,
        volatility: cli.volatility / 100.0,
        years: cli.years as u32,
        num_simulations: cli.simulations as u32,
        seed: cli.seed as u32,
    };
    params.validate().map_err(|e| e.to_string())?;

    Ok(ApiRequest {
        params,
        options: ReportOptions {
            histogram_bins: cli.histogram_bins as usize,
            mode: if cli.parallel {
                EngineMode::Parallel
            } else {
                EngineMode::Sequential
            },
            include_trajectories: cli.include_trajectories,
        },
    })
}

fn build_report(request: &ApiRequest) -> Result<ProjectionReport, SimulationError> {
    let params = &request.params;
    let run = match request.options.mode {
        EngineMode::Sequential => run_simulation(params)?,
        EngineMode::Parallel => run_simulation_parallel(params)?,
    };

    let summary = summarize(&run, params);
    let year_bands = year_bands(&run, params.years);
    let histogram = histogram(&run.final_values, request.options.histogram_bins);

    Ok(ProjectionReport {
        engine: request.options.mode,
        parameters: *params,
        deterministic_final_value: params.deterministic_final_value(),
        summary,
        year_bands,
        histogram,
        trajectories: request
            .options
            .include_trajectories
            .then_some(run.trajectories),
    })
}

pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            return Ok(e.to_string());
        }
        Err(e) => return Err(e.to_string()),
    };
    let request = build_request(cli)?;
    let report = build_report(&request).map_err(|e| e.to_string())?;
    serde_json::to_string_pretty(&report).map_err(|e| format!("failed to encode report: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route("/api/health", get(health_handler))
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "portfolio simulation HTTP API listening");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload).await
}

async fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            warn!(%msg, "rejected simulation request");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    // the engine call is atomic and CPU-bound; keep it off the async workers
    let outcome = tokio::task::spawn_blocking(move || build_report(&request)).await;
    match outcome {
        Ok(Ok(report)) => json_response(StatusCode::OK, report),
        Ok(Err(e)) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
        Err(e) => {
            warn!(error = %e, "simulation task failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Simulation failed")
        }
    }
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
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<SimulatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: SimulatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.initial_amount {
        cli.initial_amount = v;
    }
    if let Some(v) = payload.annual_return {
        cli.annual_return = v;
    }
    if let Some(v) = payload.volatility {
        cli.volatility = v;
    }
    if let Some(v) = payload.years {
        cli.years = v;
    }
    if let Some(v) = payload.num_simulations {
        cli.simulations = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }
    if let Some(v) = payload.histogram_bins {
        cli.histogram_bins = v;
    }
    if let Some(v) = payload.parallel {
        cli.parallel = v;
    }
    if let Some(v) = payload.include_trajectories {
        cli.include_trajectories = v;
    }

    build_request(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        initial_amount: 100_000.0,
        annual_return: 7.0,
        volatility: 15.0,
        years: 30,
        simulations: 1_000,
        seed: 42,
        histogram_bins: 30,
        parallel: false,
        include_trajectories: false,
    }
}
