use crate::error::Error;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

pub(crate) struct APIError(anyhow::Error);

fn rejection_status(err: &JsonRejection) -> StatusCode {
    match err {
        JsonRejection::JsonDataError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        JsonRejection::JsonSyntaxError(_) => StatusCode::BAD_REQUEST,
        JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let any_err = self.0;
        let status = match any_err.downcast_ref::<Error>() {
            Some(Error::UnknownDomain(_)) => StatusCode::NOT_FOUND,
            Some(
                Error::InvalidDomainName(_)
                | Error::DuplicateDomain(_)
                | Error::UnknownSortKey(_)
                | Error::UnknownClickTarget(_),
            ) => StatusCode::BAD_REQUEST,
            Some(Error::DdnsDisabled(_) | Error::PublicIpUnknown) => StatusCode::CONFLICT,
            Some(Error::JsonExtractorRejection(err)) => rejection_status(err),
            Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
            // Extractor rejections arrive unwrapped through `WithRejection`.
            None => any_err
                .downcast_ref::<JsonRejection>()
                .map_or(StatusCode::INTERNAL_SERVER_ERROR, rejection_status),
        };
        if status.is_server_error() {
            tracing::error!("request failed: {any_err}");
        }
        let body = Json(json!({
            "error": format!("{any_err}"),
        }));
        (status, body).into_response()
    }
}

impl<E> From<E> for APIError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
