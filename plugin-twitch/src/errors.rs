use axum::{
    http::status::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TwitchSigError {
    #[error("Missing header {0}")]
    Missing(&'static str),
    #[error("Invalid signature")]
    Invalid,
    #[error("Invalid header value")]
    InvalidHeader(#[from] axum::http::header::ToStrError),
}

#[derive(Error, Debug)]
pub enum TwitchError {
    #[error("Invalid signature {0:?}")]
    InvalidSig(#[from] TwitchSigError),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("HttpError {0}")]
    HttpError(StatusCode),
}

impl std::convert::From<StatusCode> for TwitchError {
    fn from(value: StatusCode) -> Self {
        TwitchError::HttpError(value)
    }
}

impl IntoResponse for TwitchSigError {
    fn into_response(self) -> Response {
        log::warn!("rejecting eventsub request: {self:?}");
        match self {
            e @ TwitchSigError::Missing(_) => {
                (StatusCode::BAD_REQUEST, format!("{e}")).into_response()
            }
            TwitchSigError::Invalid => {
                (StatusCode::BAD_REQUEST, "invalid signature").into_response()
            }
            e @ TwitchSigError::InvalidHeader(_) => {
                (StatusCode::BAD_REQUEST, format!("{e}")).into_response()
            }
        }
    }
}

impl IntoResponse for TwitchError {
    fn into_response(self) -> Response {
        match self {
            e @ TwitchError::InvalidSig(_) => {
                (StatusCode::BAD_REQUEST, format!("{e}")).into_response()
            }
            e @ TwitchError::InvalidPayload(_) => {
                (StatusCode::BAD_REQUEST, format!("{e}")).into_response()
            }
            TwitchError::HttpError(code) => code.into_response(),
        }
    }
}

/// Failures of the calls made to the streaming platform
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("{0} not found")]
    NotFound(String),

    /// Nothing to report, the stream is offline or twitch didn't answer
    #[error("stream information unavailable")]
    Unavailable,

    #[error("{ctx}: {source}")]
    Upstream {
        source: Box<dyn std::error::Error + Send + Sync>,
        ctx: String,
    },
}

impl DirectoryError {
    pub(crate) fn upstream<E>(source: E, ctx: impl Into<String>) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        DirectoryError::Upstream {
            source: Box::new(source),
            ctx: ctx.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Cannot connect to db at {path}")]
    Connection {
        path: String,
        source: diesel::ConnectionError,
    },

    #[error("Cannot run migrations")]
    Migration(#[from] diesel_migrations::RunMigrationsError),

    #[error("Query failed")]
    Query(#[from] diesel::result::Error),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Cannot persist subscriptions")]
    Store(#[from] StoreError),
}
