use crate::api::api_error::APIError;
use crate::api::server::AppState;
use crate::dashboard::ui::{ClickTarget, SortKey};
use crate::dashboard::{logs, render, Dashboard, Flash, FlashLevel, NextRuns};
use crate::error::Error;
use crate::reconcile::CertCreation;
use crate::schedule::JobKind;
use crate::settings::Settings;
use axum::extract::{Path, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use std::io::ErrorKind;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/settings", get(get_settings).put(put_settings))
        .route("/api/trigger/ddns", post(trigger_ddns))
        .route("/api/trigger/ssl_renew", post(trigger_ssl_renew))
        .route("/api/trigger/ssl_create/:domain", post(trigger_ssl_create))
        .route("/api/trigger/test_notification", post(trigger_test_notification))
        .route("/api/refresh_ip/:domain", get(refresh_ip))
        .route("/api/force_update_ip/:domain", post(force_update_ip))
        .route("/logs/:domain", get(domain_logs))
        .route("/ui/theme", post(toggle_theme))
        .route("/ui/sort/:key", get(sort))
        .route("/ui/expand/:domain", get(expand))
        .route("/ui/menu/:click", get(menu))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

fn back_to_dashboard() -> Redirect {
    Redirect::to("/")
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"status":"healthy"}))
}

async fn dashboard_data(state: AppState, drain_flashes: bool) -> Dashboard {
    let settings = state.reconciler.settings().snapshot().await;
    let app_state = state.reconciler.state().await;
    let next_runs = NextRuns {
        ddns: state.scheduler.next_run_display(JobKind::Ddns).await,
        ssl: state.scheduler.next_run_display(JobKind::SslRenewal).await,
    };
    let flashes = if drain_flashes {
        state.ui.take_flashes().await
    } else {
        vec![]
    };
    let mut dashboard = Dashboard::build(
        &settings,
        &app_state,
        state.ui.view().await,
        next_runs,
        flashes,
    );
    dashboard.demo = state.config.demo_mode();
    dashboard
}

async fn index(State(state): State<AppState>) -> Html<String> {
    let tz = state.reconciler.settings().snapshot().await.tz();
    let dashboard = match tokio::spawn(dashboard_data(state.clone(), true)).await {
        Ok(dashboard) => dashboard,
        Err(err) => {
            tracing::error!("error loading dashboard data: {err}");
            let mut flashes = state.ui.take_flashes().await;
            flashes.push(Flash {
                level: FlashLevel::Danger,
                message: format!("An error occurred while loading the dashboard: {err}"),
            });
            Dashboard::fallback(state.ui.view().await.theme, flashes)
        }
    };
    Html(render::dashboard(&dashboard, tz))
}

async fn status(State(state): State<AppState>) -> Json<Dashboard> {
    Json(dashboard_data(state, false).await)
}

async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.reconciler.settings().snapshot().await.redacted())
}

async fn put_settings(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): WithRejection<Json<Settings>, APIError>,
) -> Result<Json<Settings>, APIError> {
    let saved = state.reconciler.settings().save(payload).await?;
    state.reconciler.reload_notifier().await;
    state.log_timezone.set(saved.tz());
    tracing::info!("settings saved ({} domain(s))", saved.domains.len());
    Ok(Json(saved.redacted()))
}

async fn trigger_ddns(State(state): State<AppState>) -> Redirect {
    tracing::info!("manual global DDNS update triggered by user");
    state.reconciler.run_ddns_update().await;
    state
        .ui
        .flash(FlashLevel::Info, "Manual DDNS update check initiated.")
        .await;
    back_to_dashboard()
}

async fn trigger_ssl_renew(State(state): State<AppState>) -> Redirect {
    tracing::info!("manual global SSL renewal triggered by user");
    state.reconciler.run_ssl_check().await;
    state
        .ui
        .flash(FlashLevel::Info, "Manual SSL renewal check initiated.")
        .await;
    back_to_dashboard()
}

async fn trigger_ssl_create(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Redirect {
    tracing::info!("[{domain}] manual SSL creation triggered by user");
    let (level, message) = match state.reconciler.create_certificate(&domain).await {
        Ok(CertCreation::Created(_)) => (
            FlashLevel::Success,
            format!("Successfully created and verified certificate for {domain}."),
        ),
        Ok(CertCreation::Missing) => (
            FlashLevel::Warning,
            format!("Certbot command ran, but the new cert could not be found. Check logs for {domain}."),
        ),
        Err(Error::UnknownDomain(_)) => {
            (FlashLevel::Danger, format!("Could not find config for {domain}"))
        }
        Err(err) => (
            FlashLevel::Danger,
            format!("Failed to create certificate for {domain}: {err}"),
        ),
    };
    state.ui.flash(level, message).await;
    back_to_dashboard()
}

async fn trigger_test_notification(State(state): State<AppState>) -> Redirect {
    let outcome = state.reconciler.send_test_notification().await;
    if outcome.success {
        state
            .ui
            .flash(
                FlashLevel::Success,
                format!("Test notification sent: {}", outcome.message),
            )
            .await;
    } else {
        state
            .ui
            .flash(
                FlashLevel::Danger,
                format!("Test notification FAILED: {}", outcome.message),
            )
            .await;
    }
    back_to_dashboard()
}

async fn refresh_ip(State(state): State<AppState>, Path(domain): Path<String>) -> Redirect {
    let (level, message) = match state.reconciler.refresh_recorded_ip(&domain).await {
        Ok(record) => (
            FlashLevel::Info,
            format!(
                "Refreshed Recorded IP for {domain}. New value: {}",
                record.map_or_else(|| "N/A".to_string(), |r| r.to_string())
            ),
        ),
        Err(Error::UnknownDomain(_)) => {
            (FlashLevel::Danger, format!("Could not find config for {domain}"))
        }
        Err(err) => {
            tracing::error!("[{domain}] error refreshing recorded IP: {err}");
            (
                FlashLevel::Danger,
                format!("An error occurred refreshing IP: {err}"),
            )
        }
    };
    state.ui.flash(level, message).await;
    back_to_dashboard()
}

async fn force_update_ip(State(state): State<AppState>, Path(domain): Path<String>) -> Redirect {
    let (level, message) = match state.reconciler.force_update_ip(&domain).await {
        Ok(_) => (
            FlashLevel::Success,
            format!("Successfully forced update for {domain}."),
        ),
        Err(Error::UnknownDomain(_)) => {
            (FlashLevel::Danger, format!("Could not find config for {domain}"))
        }
        Err(Error::DdnsDisabled(_)) => (
            FlashLevel::Danger,
            format!("Cannot update IP: {domain} does not have DDNS enabled."),
        ),
        Err(Error::PublicIpUnknown) => (
            FlashLevel::Danger,
            "Cannot update IP: Public IP is unknown.".to_string(),
        ),
        Err(_) => (
            FlashLevel::Danger,
            format!("Failed to force update for {domain}. Check logs."),
        ),
    };
    state.ui.flash(level, message).await;
    back_to_dashboard()
}

async fn domain_logs(State(state): State<AppState>, Path(domain): Path<String>) -> Response {
    match logs::domain_log(&state.config.paths.logs_dir, &domain).await {
        Ok(content) => {
            let theme = state.ui.view().await.theme;
            Html(render::domain_log(&domain, &content, theme)).into_response()
        }
        Err(err) if err.kind() == ErrorKind::NotFound => {
            state
                .ui
                .flash(
                    FlashLevel::Warning,
                    "Log file not found. Has the container just started?",
                )
                .await;
            back_to_dashboard().into_response()
        }
        Err(err) => {
            tracing::error!("error reading log file for {domain}: {err}");
            state
                .ui
                .flash(
                    FlashLevel::Danger,
                    format!("An error occurred while reading the log file: {err}"),
                )
                .await;
            back_to_dashboard().into_response()
        }
    }
}

async fn preference_not_saved(state: &AppState, what: &str, err: Error) {
    tracing::warn!("could not save {what} preference: {err}");
    state
        .ui
        .flash(
            FlashLevel::Warning,
            format!("Your {what} preference could not be saved: {err}"),
        )
        .await;
}

async fn toggle_theme(State(state): State<AppState>) -> Redirect {
    if let Err(err) = state.ui.toggle_theme().await {
        preference_not_saved(&state, "theme", err).await;
    }
    back_to_dashboard()
}

async fn sort(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Redirect, APIError> {
    let key: SortKey = key.parse()?;
    if let Err(err) = state.ui.sort_by(key).await {
        preference_not_saved(&state, "sort", err).await;
    }
    Ok(back_to_dashboard())
}

async fn expand(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Redirect, APIError> {
    let settings = state.reconciler.settings().snapshot().await;
    if settings.domain(&domain).is_none() {
        return Err(Error::UnknownDomain(domain).into());
    }
    state.ui.toggle_row(&domain).await;
    Ok(back_to_dashboard())
}

async fn menu(
    State(state): State<AppState>,
    Path(click): Path<String>,
) -> Result<Redirect, APIError> {
    let click: ClickTarget = click.parse()?;
    state.ui.menu_click(click).await;
    Ok(back_to_dashboard())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::dashboard::ui::{SortDirection, SortState, Theme, Ui};
    use crate::dashboard::MemoryPreferences;
    use crate::dns::{ARecord, DemoProvider};
    use crate::logging::TimezoneHandle;
    use crate::certs::monitor::tests::{install_cert, pem_expiring};
    use crate::notify::tests::Recorder;
    use crate::notify::{DynChannel, Notifier};
    use crate::reconcile::tests::{domain, fixture, fixture_with, FakeIssuer, Fixture, PUBLIC_IP, STALE_IP};
    use crate::settings::ChannelKind;
    use crate::schedule::Scheduler;
    use crate::settings::CertManagement;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use chrono_tz::Tz;
    use serde_json::Value;
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::sync::RwLock;
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        ui: Arc<Ui>,
        dns: Arc<DemoProvider>,
        log_timezone: TimezoneHandle,
        logs: TempDir,
        _certs: TempDir,
    }

    async fn harness() -> Harness {
        harness_from(
            fixture(
                vec![domain("a.example.com", true, true)],
                vec![("a.example.com", ARecord::Address(STALE_IP))],
            )
            .await,
        )
        .await
    }

    async fn issuing_harness(issuer: impl FnOnce(FakeIssuer) -> FakeIssuer) -> Harness {
        harness_from(fixture_with(vec![domain("a.example.com", true, true)], vec![], issuer).await)
            .await
    }

    async fn harness_from(f: Fixture) -> Harness {
        let logs = TempDir::new().unwrap();
        let logs_dir = logs.path().to_string_lossy().to_string();
        let config = Config::from_lookup(|key| match key {
            "PROVIDER" => Some("demo".into()),
            "LOGS_DIR" => Some(logs_dir.clone()),
            _ => None,
        })
        .unwrap();

        let reconciler = Arc::new(f.reconciler);
        let quiet = Settings {
            ip_check_interval: "disabled".into(),
            cert_management: CertManagement {
                enabled: false,
                ..CertManagement::default()
            },
            ..Settings::default()
        };
        let scheduler = Scheduler::start(reconciler.clone(), &quiet).await.unwrap();
        let ui = Arc::new(Ui::load(Arc::new(RwLock::new(MemoryPreferences::default()))).await);
        let log_timezone = TimezoneHandle::new(Tz::UTC);
        let app = new(AppState {
            config: Arc::new(config),
            reconciler,
            scheduler: Arc::new(scheduler),
            ui: ui.clone(),
            log_timezone: log_timezone.clone(),
        });
        Harness {
            app,
            ui,
            dns: f.dns,
            log_timezone,
            logs,
            _certs: f.certs,
        }
    }

    struct Reply {
        status: StatusCode,
        location: Option<String>,
        body: String,
    }

    impl Reply {
        fn json(&self) -> Value {
            serde_json::from_str(&self.body).unwrap()
        }
    }

    async fn call(app: &Router, method: &str, uri: &str, json: Option<&str>) -> Reply {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match json {
            Some(json) => {
                request = request.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let location = response
            .headers()
            .get(header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        Reply {
            status,
            location,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    #[tokio::test]
    async fn health_check() {
        let h = harness().await;
        let reply = call(&h.app, "GET", "/health", None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(reply.json(), json!({"status": "healthy"}));
    }

    #[tokio::test]
    async fn ddns_trigger_redirects_with_a_flash() {
        let h = harness().await;
        let reply = call(&h.app, "POST", "/api/trigger/ddns", None).await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/"));
        assert_eq!(h.dns.record("a.example.com"), Some(ARecord::Address(PUBLIC_IP)));

        let page = call(&h.app, "GET", "/", None).await;
        assert_eq!(page.status, StatusCode::OK);
        assert!(page.body.contains("Manual DDNS update check initiated."));
        assert!(page.body.contains("203.0.113.7"));

        let again = call(&h.app, "GET", "/", None).await;
        assert!(!again.body.contains("Manual DDNS update check initiated."));
    }

    #[tokio::test]
    async fn status_json() {
        let h = harness().await;
        call(&h.app, "POST", "/api/trigger/ddns", None).await;
        let status = call(&h.app, "GET", "/api/status", None).await.json();
        assert_eq!(status["public_ip"], "203.0.113.7");
        assert_eq!(status["demo"], true);
        assert_eq!(status["next_ddns_run"], "Not scheduled");
        assert_eq!(status["domains"][0]["name"], "a.example.com");
        assert_eq!(status["domains"][0]["recorded_ip"], "203.0.113.7");

        // The JSON view leaves pending flashes for the page.
        assert!(call(&h.app, "GET", "/", None)
            .await
            .body
            .contains("Manual DDNS update check initiated."));
    }

    #[tokio::test]
    async fn settings_round_trip_and_errors() {
        let h = harness().await;
        let put = |body: &'static str| call(&h.app, "PUT", "/api/settings", Some(body));

        assert_eq!(put("{").await.status, StatusCode::BAD_REQUEST);
        assert_eq!(put(r#"{"domains": 5}"#).await.status, StatusCode::UNPROCESSABLE_ENTITY);
        let invalid = put(r#"{"domains": [{"name": "bad name"}]}"#).await;
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert_eq!(invalid.json()["error"], "invalid domain name: \"bad name\"");

        let saved = put(r#"{"timezone": "Asia/Tokyo", "domains": [{"name": "b.example.com", "ddns": true}]}"#)
            .await;
        assert_eq!(saved.status, StatusCode::OK);
        assert_eq!(h.log_timezone.get(), chrono_tz::Asia::Tokyo);

        let settings = call(&h.app, "GET", "/api/settings", None).await.json();
        assert_eq!(settings["timezone"], "Asia/Tokyo");
        assert_eq!(settings["domains"][0]["name"], "b.example.com");
        assert_eq!(settings["domains"][0]["auto_update"], true);
    }

    #[tokio::test]
    async fn manual_updates_explain_failures() {
        let h = harness().await;
        call(&h.app, "POST", "/api/force_update_ip/nope.example.com", None).await;
        call(&h.app, "POST", "/api/force_update_ip/a.example.com", None).await;
        let page = call(&h.app, "GET", "/", None).await.body;
        assert!(page.contains("Could not find config for nope.example.com"));
        assert!(page.contains("Cannot update IP: Public IP is unknown."));

        call(&h.app, "GET", "/api/refresh_ip/a.example.com", None).await;
        let page = call(&h.app, "GET", "/", None).await.body;
        assert!(page.contains("Refreshed Recorded IP for a.example.com. New value: 198.51.100.1"));
    }

    #[tokio::test]
    async fn ui_routes() {
        let h = harness().await;
        assert_eq!(
            call(&h.app, "GET", "/ui/sort/colour", None).await.status,
            StatusCode::BAD_REQUEST
        );
        for _ in 0..2 {
            let reply = call(&h.app, "GET", "/ui/sort/ip", None).await;
            assert_eq!(reply.status, StatusCode::SEE_OTHER);
        }
        assert_eq!(
            h.ui.view().await.sort,
            Some(SortState {
                key: SortKey::Ip,
                direction: SortDirection::Desc,
            })
        );

        assert_eq!(
            call(&h.app, "GET", "/ui/menu/sideways", None).await.status,
            StatusCode::BAD_REQUEST
        );
        call(&h.app, "GET", "/ui/menu/toggle", None).await;
        call(&h.app, "GET", "/ui/menu/inside", None).await;
        assert!(h.ui.view().await.menu_open);
        call(&h.app, "GET", "/ui/menu/outside", None).await;
        assert!(!h.ui.view().await.menu_open);

        let stray = call(&h.app, "GET", "/ui/expand/stray.example.com", None).await;
        assert_eq!(stray.status, StatusCode::NOT_FOUND);
        assert_eq!(stray.json()["error"], "domain \"stray.example.com\" is not configured");
        call(&h.app, "GET", "/ui/expand/a.example.com", None).await;
        call(&h.app, "POST", "/ui/theme", None).await;
        let view = h.ui.view().await;
        assert_eq!(view.theme, Theme::Dark);
        assert!(view.expanded.contains("a.example.com"));
        assert!(!view.expanded.contains("stray.example.com"));
        let page = call(&h.app, "GET", "/", None).await.body;
        assert!(page.contains("data-theme=\"dark\""));
        assert!(page.contains("class=\"detail-row\""));
    }

    async fn flashes_after(h: &Harness, uri: &str) -> Vec<Flash> {
        let reply = call(&h.app, "POST", uri, None).await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert_eq!(reply.location.as_deref(), Some("/"));
        h.ui.take_flashes().await
    }

    fn flash(level: FlashLevel, message: &str) -> Flash {
        Flash {
            level,
            message: message.to_string(),
        }
    }

    #[tokio::test]
    async fn ssl_renew_trigger() {
        let mut ssl_domain = domain("a.example.com", false, true);
        ssl_domain.ssl.enabled = true;
        let f = fixture(vec![ssl_domain], vec![]).await;
        install_cert(f.certs.path(), "a.example.com", &pem_expiring("a.example.com", 2030, 6, 1));
        let issuer = f.issuer.clone();
        let h = harness_from(f).await;

        assert_eq!(
            flashes_after(&h, "/api/trigger/ssl_renew").await,
            vec![flash(FlashLevel::Info, "Manual SSL renewal check initiated.")]
        );
        assert_eq!(
            *issuer.calls.lock().unwrap(),
            vec!["renew a.example.com dry_run=false".to_string()]
        );
    }

    #[tokio::test]
    async fn ssl_create_trigger_outcomes() {
        let h = issuing_harness(|issuer| issuer).await;
        assert_eq!(
            flashes_after(&h, "/api/trigger/ssl_create/a.example.com").await,
            vec![flash(
                FlashLevel::Success,
                "Successfully created and verified certificate for a.example.com."
            )]
        );
        assert_eq!(
            flashes_after(&h, "/api/trigger/ssl_create/nope.example.com").await,
            vec![flash(FlashLevel::Danger, "Could not find config for nope.example.com")]
        );

        let h = issuing_harness(|mut issuer| {
            issuer.install_on_create = false;
            issuer
        })
        .await;
        assert_eq!(
            flashes_after(&h, "/api/trigger/ssl_create/a.example.com").await,
            vec![flash(
                FlashLevel::Warning,
                "Certbot command ran, but the new cert could not be found. Check logs for a.example.com."
            )]
        );

        let h = issuing_harness(|mut issuer| {
            issuer.fail = true;
            issuer
        })
        .await;
        assert_eq!(
            flashes_after(&h, "/api/trigger/ssl_create/a.example.com").await,
            vec![flash(
                FlashLevel::Danger,
                "Failed to create certificate for a.example.com: too many certificates"
            )]
        );
    }

    #[tokio::test]
    async fn test_notification_trigger() {
        let f = fixture(vec![domain("a.example.com", true, true)], vec![]).await;
        let alerts = f.alerts.clone();
        let h = harness_from(f).await;
        assert_eq!(
            flashes_after(&h, "/api/trigger/test_notification").await,
            vec![flash(FlashLevel::Success, "Test notification sent: Notification sent.")]
        );
        assert_eq!(alerts.subjects().len(), 1);

        let f = fixture(vec![domain("a.example.com", true, true)], vec![]).await;
        let failing = Recorder::failing(ChannelKind::Slack);
        let f = Fixture {
            reconciler: f
                .reconciler
                .with_notifier(Notifier::new(vec![failing as DynChannel])),
            ..f
        };
        let h = harness_from(f).await;
        assert_eq!(
            flashes_after(&h, "/api/trigger/test_notification").await,
            vec![flash(
                FlashLevel::Danger,
                "Test notification FAILED: All notification services failed."
            )]
        );
    }

    #[tokio::test]
    async fn log_viewer() {
        let h = harness().await;
        let reply = call(&h.app, "GET", "/logs/a.example.com", None).await;
        assert_eq!(reply.status, StatusCode::SEE_OTHER);
        assert!(call(&h.app, "GET", "/", None)
            .await
            .body
            .contains("Log file not found."));

        std::fs::write(
            h.logs.path().join("domaincrab.2024-01-01.log"),
            "INFO [a.example.com] IPs match (203.0.113.7). No update needed.\nINFO [b.example.com] other\n",
        )
        .unwrap();
        let reply = call(&h.app, "GET", "/logs/a.example.com", None).await;
        assert_eq!(reply.status, StatusCode::OK);
        assert!(reply.body.contains("IPs match (203.0.113.7)"));
        assert!(!reply.body.contains("b.example.com"));
    }
}
