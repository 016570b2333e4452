use std::{
    error::Error as StdError,
    net::{SocketAddr, TcpListener as StdTcpListener},
    sync::Arc,
    thread,
};

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::{
    body::{Body, Bytes, Incoming},
    header::CONTENT_TYPE,
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use log::{error, info, warn};
use metrics::{MetricsExporter, ScrapeInputs};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use settlement::{PaymentProof, SettlementError, SettlementService};
use slot_space::{ContentInput, PageId, Rect, SlotMetrics};
use tokio::{net::TcpListener, sync::oneshot};

use crate::app::{App, AppError};

const JSON: &str = "application/json";

/// Everything a request can touch.
pub struct ApiState {
    settlement: Arc<SettlementService>,
    slot_metrics: Arc<SlotMetrics>,
    exporter: MetricsExporter,
    max_body_bytes: usize,
}

impl ApiState {
    pub fn new(app: &App, max_body_bytes: usize) -> Result<Self, AppError> {
        Ok(Self {
            settlement: Arc::clone(&app.settlement),
            slot_metrics: Arc::clone(&app.slot_metrics),
            exporter: MetricsExporter::new()?,
            max_body_bytes,
        })
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn json(status: StatusCode, value: &impl Serialize) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self {
                status,
                content_type: JSON,
                body,
            },
            Err(err) => {
                error!("api: failed to encode response: {err}");
                Self::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        }
    }

    fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            content_type: JSON,
            body: json!({ "error": message }).to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    #[serde(default)]
    hash: Option<String>,
    #[serde(default)]
    network: Option<String>,
    #[serde(default)]
    amount: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PreviewRequest {
    page: PageId,
    rect: Rect,
    #[serde(default)]
    animated: bool,
}

#[derive(Debug, Deserialize)]
struct SettleRequest {
    page: PageId,
    rect: Rect,
    content: ContentInput,
    #[serde(default)]
    animated: bool,
    proof: PaymentProof,
}

/// Routes one request. Pure apart from the state it mutates through `state`.
pub fn dispatch(state: &ApiState, method: &Method, path: &str, body: &[u8]) -> ApiResponse {
    if body.len() > state.max_body_bytes {
        return ApiResponse::error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large");
    }
    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    match (method, segments.as_slice()) {
        (&Method::POST, ["transactions", "verify"]) => verify_transaction(state, body),
        (&Method::POST, ["allocations", "preview"]) => preview(state, body),
        (&Method::POST, ["allocations", "settle"]) => settle(state, body),
        (&Method::GET, ["pages", page, "allocations"]) => page_allocations(state, page),
        (&Method::GET, ["reconciliation"]) => {
            ApiResponse::json(StatusCode::OK, &state.settlement.reconciliation().list())
        }
        (&Method::GET, ["metrics"]) => render_metrics(state),
        (_, ["transactions", "verify"])
        | (_, ["allocations", "preview" | "settle"])
        | (_, ["pages", _, "allocations"])
        | (_, ["reconciliation"])
        | (_, ["metrics"]) => {
            ApiResponse::error(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => ApiResponse::error(StatusCode::NOT_FOUND, "Not found"),
    }
}

fn parse<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, ApiResponse> {
    serde_json::from_slice(body).map_err(|err| {
        warn!("api: rejected malformed body: {err}");
        ApiResponse::error(StatusCode::BAD_REQUEST, "Malformed request body")
    })
}

fn verify_transaction(state: &ApiState, body: &[u8]) -> ApiResponse {
    let request: VerifyRequest = match parse(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let hash = request.hash.unwrap_or_default();
    let network = request.network.unwrap_or_default();
    if hash.trim().is_empty() || network.trim().is_empty() {
        return ApiResponse::error(StatusCode::BAD_REQUEST, "Missing hash or network");
    }
    let amount = match request.amount {
        Some(Value::String(value)) => Some(value),
        Some(Value::Number(value)) => Some(value.to_string()),
        _ => None,
    };
    match state
        .settlement
        .ledger()
        .record_if_absent(&hash, &network, amount.as_deref())
    {
        Ok(_) => ApiResponse::json(
            StatusCode::OK,
            &json!({ "success": true, "message": "Transaction verified and recorded" }),
        ),
        Err(err) if err.is_duplicate() => {
            ApiResponse::error(StatusCode::BAD_REQUEST, "Duplicate transaction detected")
        }
        Err(ledger::LedgerError::InvalidInput { .. }) => {
            ApiResponse::error(StatusCode::BAD_REQUEST, "Missing hash or network")
        }
        Err(err) => {
            error!("api: failed to record transaction {hash}: {err}");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn preview(state: &ApiState, body: &[u8]) -> ApiResponse {
    let request: PreviewRequest = match parse(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    let preview = state
        .settlement
        .allocations()
        .preview(request.page, &request.rect, request.animated);
    ApiResponse::json(StatusCode::OK, &preview)
}

fn settle(state: &ApiState, body: &[u8]) -> ApiResponse {
    let request: SettleRequest = match parse(body) {
        Ok(request) => request,
        Err(response) => return response,
    };
    match state.settlement.settle(
        request.page,
        request.rect,
        &request.content,
        request.animated,
        &request.proof,
    ) {
        Ok(allocation) => ApiResponse::json(StatusCode::CREATED, &allocation),
        Err(err) => settlement_error(err),
    }
}

fn settlement_error(err: SettlementError) -> ApiResponse {
    let message = err.to_string();
    match err {
        SettlementError::Validation { field } => ApiResponse::json(
            StatusCode::BAD_REQUEST,
            &json!({ "error": message, "kind": "validation", "field": field }),
        ),
        SettlementError::InvalidSelection { issue, .. } => ApiResponse::json(
            StatusCode::BAD_REQUEST,
            &json!({ "error": message, "kind": "invalid_selection", "issue": issue.label() }),
        ),
        SettlementError::InvalidContent(content) => ApiResponse::json(
            StatusCode::BAD_REQUEST,
            &json!({ "error": message, "kind": "invalid_content", "field": content.field() }),
        ),
        SettlementError::DuplicatePayment { .. } => ApiResponse::json(
            StatusCode::BAD_REQUEST,
            &json!({ "error": "Duplicate transaction detected", "kind": "duplicate_payment" }),
        ),
        SettlementError::SlotTaken { .. } => ApiResponse::json(
            StatusCode::CONFLICT,
            &json!({ "error": message, "kind": "slot_taken", "reconciliation": false }),
        ),
        SettlementError::SlotTakenAfterPayment { ticket } => ApiResponse::json(
            StatusCode::CONFLICT,
            &json!({
                "error": message,
                "kind": "slot_taken_after_payment",
                "reconciliation": true,
                "ticket": ticket,
            }),
        ),
        SettlementError::Internal(_) => {
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

fn page_allocations(state: &ApiState, page: &str) -> ApiResponse {
    let snapshot = page
        .parse::<PageId>()
        .ok()
        .and_then(|page| state.settlement.allocations().grid().snapshot(page).ok());
    match snapshot {
        Some(allocations) => ApiResponse::json(StatusCode::OK, &allocations),
        None => ApiResponse::error(StatusCode::NOT_FOUND, "Page not found"),
    }
}

fn render_metrics(state: &ApiState) -> ApiResponse {
    let slots = state.slot_metrics.snapshot();
    let settlement = state.settlement.metrics().snapshot();
    let rendered = state.exporter.render(ScrapeInputs {
        slots: &slots,
        settlement: &settlement,
        ledger_entries: state.settlement.ledger().len(),
        reconciliation_tickets: state.settlement.reconciliation().len(),
    });
    match rendered {
        Ok(body) => ApiResponse {
            status: StatusCode::OK,
            content_type: state.exporter.content_type(),
            body,
        },
        Err(err) => {
            error!("api: metrics render failed: {err}");
            ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
        }
    }
}

/// Collects the body under the size limit, then dispatches.
pub async fn handle<B>(state: Arc<ApiState>, req: Request<B>) -> Response<Full<Bytes>>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    let (parts, body) = req.into_parts();
    let response = match Limited::new(body, state.max_body_bytes).collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let route = format!("{} {}", parts.method, parts.uri.path());
            let method = parts.method;
            let path = parts.uri.path().to_owned();
            // handlers take store locks and fsync
            let dispatched =
                tokio::task::spawn_blocking(move || dispatch(&state, &method, &path, &bytes)).await;
            match dispatched {
                Ok(response) => response,
                Err(err) => {
                    error!("api: handler for {route} did not complete: {err}");
                    ApiResponse::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
                }
            }
        }
        Err(err) if err.downcast_ref::<LengthLimitError>().is_some() => {
            ApiResponse::error(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
        }
        Err(err) => {
            warn!("api: failed to read request body: {err}");
            ApiResponse::error(StatusCode::BAD_REQUEST, "Unreadable request body")
        }
    };
    into_hyper(response)
}

fn into_hyper(response: ApiResponse) -> Response<Full<Bytes>> {
    Response::builder()
        .status(response.status)
        .header(CONTENT_TYPE, response.content_type)
        .body(Full::new(Bytes::from(response.body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::from_static(b"bad response"))))
}

/// HTTP server on its own thread and runtime, stopped through a oneshot.
pub struct ApiServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ApiServer {
    pub fn start(state: Arc<ApiState>, addr: SocketAddr) -> Result<Self, AppError> {
        let listener = StdTcpListener::bind(addr).map_err(AppError::Server)?;
        listener.set_nonblocking(true).map_err(AppError::Server)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("gridd-api")
            .build()
            .map_err(AppError::Server)?;
        info!("api listening on {addr}");
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = thread::spawn(move || {
            runtime.block_on(async move {
                match TcpListener::from_std(listener) {
                    Ok(listener) => serve(state, listener, shutdown_rx).await,
                    Err(err) => error!("api: failed to register listener: {err}"),
                }
            });
        });
        Ok(Self {
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

async fn serve(state: Arc<ApiState>, listener: TcpListener, mut shutdown: oneshot::Receiver<()>) {
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, _)) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let io = TokioIo::new(stream);
                            let service = service_fn(move |req: Request<Incoming>| {
                                let state = Arc::clone(&state);
                                async move { Ok::<_, hyper::Error>(handle(state, req).await) }
                            });
                            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                                warn!("api connection error: {err}");
                            }
                        });
                    }
                    Err(err) => warn!("api accept error: {err}"),
                }
            }
        }
    }
}
