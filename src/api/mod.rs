//! HTTP dashboard and API.
//!
//! # API Endpoints
//!
//! ## `/health` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"status":"healthy"}` when the service is
//!   operational.
//!
//! ## `/` (GET)
//!
//!   The HTML dashboard: public IP, last IP check, next scheduled runs and one row per configured
//!   domain. Pending flash messages are shown once and then discarded.
//!
//! ## `/api/status` (GET)
//!
//!   The dashboard data as JSON. Doesn't consume flash messages.
//!
//! ## `/api/settings` (GET, PUT)
//!
//!   `GET` returns the current settings with passwords and channel URLs replaced by
//!   `"********"`. `PUT` replaces the settings with the request body:
//!
//!   ```json
//!   { "timezone": "Europe/Berlin", "domains": [{ "name": "example.com", "ddns": true }] }
//!   ```
//!
//!   Missing fields take their defaults. Redacted values echoed back keep their stored value.
//!   Notification channels and the log timezone switch over immediately; schedule changes take
//!   effect on restart.
//!
//! ## Manual triggers
//!
//!   | method | path                                   |
//!   |--------|----------------------------------------|
//!   | POST   | `/api/trigger/ddns`                    |
//!   | POST   | `/api/trigger/ssl_renew`               |
//!   | POST   | `/api/trigger/ssl_create/:domain`      |
//!   | POST   | `/api/trigger/test_notification`       |
//!   | GET    | `/api/refresh_ip/:domain`              |
//!   | POST   | `/api/force_update_ip/:domain`         |
//!
//!   Each runs to completion, queues a flash message describing the result and answers
//!   HTTP 303 (See Other) to `/`.
//!
//! ## `/logs/:domain` (GET)
//!
//!   The last 1000 application log lines tagged `[domain]`, newest first.
//!
//! ## Dashboard state
//!
//!   `POST /ui/theme` flips the theme, `GET /ui/sort/:key` sorts by `domain`, `ip`, `updated` or
//!   `expiration`, `GET /ui/expand/:domain` toggles a detail row and `GET /ui/menu/:click`
//!   (`toggle`, `inside` or `outside`) drives the bulk-actions dropdown. All redirect to `/`.
//!
//! # Errors
//!
//!   JSON endpoints answer errors with `{"error": "..."}`: 400 for malformed requests and invalid
//!   settings, 404 for unknown domains, 409 when an update can't be attempted, 422 for well-formed
//!   JSON of the wrong shape and 500 otherwise.

mod api_error;
mod routes;
pub mod server;

pub use server::{new, AppState};
