//! Helpers shared by the unit tests.

use axum::Router;
use std::net::SocketAddr;

/// Serve `router` on an ephemeral loopback port for the rest of the test.
pub(crate) async fn serve(router: Router) -> SocketAddr {
    let server = axum::Server::bind(&SocketAddr::from(([127, 0, 0, 1], 0)))
        .serve(router.into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    addr
}
