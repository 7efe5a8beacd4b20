use crate::api::{ApiError, Backend};
use crate::config::AppConfig;
use crate::model::Status;
use crate::nav;
use crate::poller::{MachineEntry, Poller, ScanLogState};
use crate::render;
use crate::search;
use crate::status::StatusCounts;
use crate::ui;
use anyhow::Result;
use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

const DEFAULT_SCAN_MACHINE: &str = "MC-01";

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn Backend>,
    pub poller: Poller,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/cards", get(cards))
        .route("/api/machines", get(machines))
        .route("/machine/:machine_no", get(machine_page))
        .route("/api/machine/:machine_no/scan-log", get(scan_log))
        .route("/api/scan", post(scan))
        .route("/login", get(login_form).post(login_submit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = state.config.http_bind.parse()?;
    let router = router(state);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Dashboard listening on http://{addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(graceful_shutdown())
        .await?;

    Ok(())
}

async fn graceful_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down http server");
}

#[derive(Deserialize, Default)]
struct CardsQuery {
    q: Option<String>,
    status: Option<String>,
}

impl CardsQuery {
    fn keyword(&self) -> &str {
        self.q.as_deref().unwrap_or_default().trim()
    }

    /// Requested status label, or `None` for blank and `all` in any case.
    fn status_filter(&self) -> Option<&str> {
        self.status
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
    }
}

async fn filtered_grid(state: &AppState, params: &CardsQuery) -> String {
    let snapshot = state.poller.store().snapshot().await;
    let mut cards = snapshot.cards.clone();
    if let Some(wanted) = params.status_filter() {
        let wanted = Status::from_label(wanted);
        cards.retain(|card| card.status == wanted);
    }
    search::filter(&mut cards, params.keyword());
    render::render_grid(&cards)
}

async fn index(State(state): State<AppState>, Query(params): Query<CardsQuery>) -> impl IntoResponse {
    let grid_html = filtered_grid(&state, &params).await;
    let snapshot = state.poller.store().snapshot().await;
    Html(ui::render_dashboard(ui::DashboardProps {
        context: state.config.context.clone(),
        counts: snapshot.counts,
        grid_html,
        keyword: params.keyword().to_string(),
        status_filter: params.status_filter().unwrap_or_default().to_string(),
        refreshed: snapshot
            .refreshed_at
            .map(|ts| render::format_timestamp(ts, state.config.display_offset)),
        error: snapshot.last_error.clone(),
    }))
}

async fn cards(State(state): State<AppState>, Query(params): Query<CardsQuery>) -> impl IntoResponse {
    Html(filtered_grid(&state, &params).await)
}

#[derive(Serialize)]
struct MachinesResponse {
    department: String,
    view_type: String,
    generation: u64,
    refreshed_at: Option<DateTime<Utc>>,
    error: Option<String>,
    counts: StatusCounts,
    machines: Vec<MachineEntry>,
}

async fn machines(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.poller.store().snapshot().await;
    Json(MachinesResponse {
        department: state.config.context.department.clone(),
        view_type: state.config.context.view_type.clone(),
        generation: snapshot.generation,
        refreshed_at: snapshot.refreshed_at,
        error: snapshot.last_error.clone(),
        counts: snapshot.counts,
        machines: snapshot.machines.clone(),
    })
}

async fn machine_page(State(state): State<AppState>, Path(machine_no): Path<String>) -> impl IntoResponse {
    let log = state.poller.scan_log(&machine_no).await;
    Html(ui::render_machine(ui::MachineProps {
        back_url: nav::dashboard_search_path(&machine_no),
        lots_url: nav::machine_list_url(&state.config.backend_url, &machine_no, None, &state.config.context),
        log_url: nav::scan_log_route(&machine_no),
        machine_no,
        log: log.log,
        error: log.error,
    }))
}

async fn scan_log(State(state): State<AppState>, Path(machine_no): Path<String>) -> Json<ScanLogState> {
    Json(state.poller.scan_log(&machine_no).await)
}

#[derive(Deserialize)]
struct ScanForm {
    lot_no: String,
    #[serde(default, deserialize_with = "blank_as_none")]
    qty: Option<u32>,
    machine_no: Option<String>,
}

fn blank_as_none<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)?.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(de::Error::custom),
    }
}

async fn scan(
    State(state): State<AppState>,
    Form(form): Form<ScanForm>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let lot_no = form.lot_no.trim();
    if lot_no.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "lot_no is required".into()));
    }
    let machine_no = form
        .machine_no
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_SCAN_MACHINE);
    let qty = form.qty.unwrap_or(1);

    let envelope = state
        .backend
        .scan(lot_no, qty, machine_no)
        .await
        .map_err(upstream_error)?;
    if envelope.is_success() {
        tracing::info!("Scan recorded: {lot_no} x{qty} on {machine_no}");
        // Show the new count without waiting for the next tick.
        state.poller.dispatch_dashboard();
    } else {
        tracing::warn!(
            "Scan rejected for {lot_no}: {}",
            envelope.message().unwrap_or("unknown error")
        );
    }
    Ok(Json(envelope))
}

fn upstream_error(err: ApiError) -> (StatusCode, String) {
    tracing::warn!("Backend call failed: {err}");
    (StatusCode::BAD_GATEWAY, format!("failed to load: {err}"))
}

async fn login_form() -> impl IntoResponse {
    Html(ui::render_login(ui::LoginProps {
        user: String::new(),
        error: None,
        welcome: None,
    }))
}

#[derive(Deserialize)]
struct LoginForm {
    user: String,
    password: String,
}

async fn login_submit(State(state): State<AppState>, Form(form): Form<LoginForm>) -> impl IntoResponse {
    let (status, error, welcome) = match state.backend.login(&form.user, &form.password).await {
        Ok(envelope) if envelope.is_success() => {
            tracing::info!("Login succeeded for {}", form.user);
            (StatusCode::OK, None, Some(format!("Signed in as {}", form.user)))
        }
        Ok(envelope) => (
            StatusCode::UNAUTHORIZED,
            Some(envelope.message().unwrap_or("Login failed").to_string()),
            None,
        ),
        Err(err) => {
            tracing::warn!("Login call failed: {err}");
            (StatusCode::BAD_GATEWAY, Some(format!("failed to load: {err}")), None)
        }
    };
    (
        status,
        Html(ui::render_login(ui::LoginProps {
            user: form.user,
            error,
            welcome,
        })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeBackend;
    use crate::config::test_config;
    use crate::model::ScanRow;
    use crate::poller::DashboardStore;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, header};
    use tower::ServiceExt;

    fn row(machine: &str, target: u64, scanned: u64) -> ScanRow {
        ScanRow {
            lot_no: format!("LOT-{machine}"),
            machine_no: Some(machine.to_string()),
            target,
            scanned_count: scanned,
            ..ScanRow::default()
        }
    }

    async fn state_with_rows(rows: Vec<ScanRow>) -> (AppState, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::default());
        *backend.rows.lock().unwrap() = rows;
        let config = Arc::new(test_config());
        let poller = Poller::new(backend.clone(), Arc::new(DashboardStore::new()), config.clone());
        poller.refresh_dashboard(poller.begin_dashboard()).await.unwrap();
        (
            AppState {
                config,
                backend: backend.clone(),
                poller,
            },
            backend,
        )
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn cards_fragment_filters_by_keyword() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 1), row("MC-02", 10, 1)]).await;
        let resp = router(state)
            .oneshot(Request::get("/cards?q=mc-01").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert_eq!(html.matches("class=\"card-slot").count(), 2);
        assert_eq!(html.matches("card-slot filtered-out").count(), 1);
    }

    #[tokio::test]
    async fn cards_fragment_filters_by_status() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 10), row("MC-02", 10, 1)]).await;
        let resp = router(state)
            .oneshot(Request::get("/cards?status=finished").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = body_text(resp).await;
        assert!(html.contains("data-machine-no=\"MC-01\""));
        assert!(!html.contains("data-machine-no=\"MC-02\""));
    }

    #[tokio::test]
    async fn machines_json_reports_counts() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 10), row("MC-02", 10, 1)]).await;
        let resp = router(state)
            .oneshot(Request::get("/api/machines").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["counts"]["all"], 2);
        assert_eq!(body["counts"]["done"], 1);
        assert_eq!(body["counts"]["ready"], 1);
        assert_eq!(body["machines"][0]["status"], "done");
        assert_eq!(body["department"], "Overall");
    }

    #[tokio::test]
    async fn index_renders_page() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 1)]).await;
        let resp = router(state)
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = body_text(resp).await;
        assert!(html.contains("Machine View"));
        assert!(html.contains("data-machine-no=\"MC-01\""));
    }

    #[tokio::test]
    async fn scan_proxy_normalizes_and_defaults() {
        let (state, backend) = state_with_rows(vec![]).await;
        let resp = router(state)
            .oneshot(
                Request::post("/api/scan")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("lot_no=LOT-AB-0001"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["success"], true);

        let calls = backend.calls.lock().unwrap();
        let (action, params) = calls.iter().find(|(a, _)| a == "scan").unwrap();
        assert_eq!(action, "scan");
        assert!(params.contains(&("qty".to_string(), "1".to_string())));
        assert!(params.contains(&("machine_no".to_string(), "MC-01".to_string())));
    }

    #[tokio::test]
    async fn scan_business_error_passes_message() {
        let (state, _) = state_with_rows(vec![]).await;
        let resp = router(state)
            .oneshot(
                Request::post("/api/scan")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("lot_no=LOT-MISSING&qty=2&machine_no=MC-04"))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_str(&body_text(resp).await).unwrap();
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Lot LOT-MISSING not found");
    }

    #[tokio::test]
    async fn login_rejects_bad_password() {
        let (state, _) = state_with_rows(vec![]).await;
        let resp = router(state)
            .oneshot(
                Request::post("/login")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("user=staff&password=nope"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert!(body_text(resp).await.contains("Invalid credentials"));
    }

    #[tokio::test]
    async fn machine_page_shows_scan_log() {
        let (state, _) = state_with_rows(vec![]).await;
        let resp = router(state)
            .oneshot(Request::get("/machine/MC-01").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body_text(resp).await;
        assert!(html.contains("Machine MC-01"));
        assert!(html.contains("/api/machine/MC-01/scan-log"));
    }

    fn rendered_links(html: &str) -> Vec<String> {
        let mut links = Vec::new();
        for attr in ["href=\"", "data-detail-url=\"", "data-log-url=\""] {
            let mut rest = html;
            while let Some(start) = rest.find(attr) {
                rest = &rest[start + attr.len()..];
                let end = rest.find('"').unwrap();
                links.push(rest[..end].replace("&#38;", "&").replace("&amp;", "&"));
                rest = &rest[end..];
            }
        }
        links
    }

    async fn assert_links_resolve(state: &AppState, html: &str) -> usize {
        let links = rendered_links(html);
        for link in &links {
            if link.starts_with('/') {
                let resp = router(state.clone())
                    .oneshot(Request::get(link.as_str()).body(Body::empty()).unwrap())
                    .await
                    .unwrap();
                assert_ne!(resp.status(), StatusCode::NOT_FOUND, "{link}");
            } else {
                assert!(link.starts_with("http://backend.test/dashboard/"), "{link}");
            }
        }
        links.len()
    }

    #[tokio::test]
    async fn card_and_machine_page_links_resolve() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 1)]).await;
        let index = body_text(
            router(state.clone())
                .oneshot(Request::get("/").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert!(index.contains("href=\"/machine/MC-01\""));
        assert!(assert_links_resolve(&state, &index).await >= 3);

        let page = body_text(
            router(state.clone())
                .oneshot(Request::get("/machine/MC-01").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert!(page.contains("href=\"/?q=MC-01\""));
        assert!(assert_links_resolve(&state, &page).await >= 3);
    }

    #[tokio::test]
    async fn status_all_is_case_insensitive() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 10), row("MC-02", 10, 1)]).await;
        let resp = router(state)
            .oneshot(Request::get("/cards?status=All").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let html = body_text(resp).await;
        assert!(html.contains("data-machine-no=\"MC-01\""));
        assert!(html.contains("data-machine-no=\"MC-02\""));
    }

    #[tokio::test]
    async fn index_keeps_status_filter_for_refresh() {
        let (state, _) = state_with_rows(vec![row("MC-01", 10, 10)]).await;
        let resp = router(state)
            .oneshot(Request::get("/?status=finished").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(body_text(resp).await.contains("data-status=\"finished\""));
    }

    #[tokio::test]
    async fn blank_scan_qty_defaults_to_one() {
        let (state, backend) = state_with_rows(vec![]).await;
        let resp = router(state)
            .oneshot(
                Request::post("/api/scan")
                    .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(Body::from("lot_no=LOT-AB-0001&qty=&machine_no=MC-02"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let calls = backend.calls.lock().unwrap();
        let (_, params) = calls.iter().find(|(a, _)| a == "scan").unwrap();
        assert!(params.contains(&("qty".to_string(), "1".to_string())));
        assert!(params.contains(&("machine_no".to_string(), "MC-02".to_string())));
    }
}
