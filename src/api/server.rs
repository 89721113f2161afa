use crate::api::routes;
use crate::config::SharedConfig;
use crate::dashboard::Ui;
use crate::logging::TimezoneHandle;
use crate::reconcile::SharedReconciler;
use crate::schedule::Scheduler;
use std::future::Future;
use std::sync::Arc;

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub config: SharedConfig,
    pub reconciler: SharedReconciler,
    pub scheduler: Arc<Scheduler>,
    pub ui: Arc<Ui>,
    /// Updated when the settings change the timezone.
    pub log_timezone: TimezoneHandle,
}

pub fn new(state: AppState) -> impl Future<Output = hyper::Result<()>> {
    let bind_addr = state.config.bind_addr;
    axum::Server::bind(&bind_addr).serve(routes::new(state).into_make_service())
}
