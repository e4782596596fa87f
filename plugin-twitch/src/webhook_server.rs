use crate::errors::{TwitchError, TwitchSigError};
use axum::{
    extract::FromRequestParts,
    http::{request::Parts, status::StatusCode},
    response::IntoResponse,
    routing, Router,
};
use hmac::{Hmac, Mac, NewMac};
use std::{net::SocketAddr, sync::Arc};
use tokio::sync::mpsc;
use twitch_api2::eventsub;

use crate::config::Config;
use crate::event::LivenessEvent;

type HmacSha256 = Hmac<sha2::Sha256>;

pub const EVENTSUB_ROUTE: &str = "/twitch/eventsub";

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(s.get(i..i + 2)?, 16).ok())
        .collect()
}

struct SigVerifier {
    expected_sig: Vec<u8>,
    msg_id: Vec<u8>,
    msg_ts: Vec<u8>,
}

impl SigVerifier {
    fn verify(&self, sub_secret: &str, body: &[u8]) -> Result<(), TwitchSigError> {
        let mut mac =
            HmacSha256::new_from_slice(sub_secret.as_bytes()).map_err(|_| TwitchSigError::Invalid)?;
        mac.update(&self.msg_id);
        mac.update(&self.msg_ts);
        mac.update(body);

        mac.verify(&self.expected_sig[..]).map_err(|_| {
            log::error!("Twitch signature verification failed!");
            TwitchSigError::Invalid
        })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for SigVerifier
where
    S: Send + Sync,
{
    type Rejection = TwitchSigError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let sig = match parts.headers.get("Twitch-Eventsub-Message-Signature") {
            Some(sig) => sig.to_str()?,
            None => return Err(TwitchSigError::Missing("message signature")),
        };

        let sig = sig
            .strip_prefix("sha256=")
            .and_then(decode_hex)
            .ok_or(TwitchSigError::Invalid)?;

        let msg_id = match parts.headers.get("Twitch-Eventsub-Message-Id") {
            Some(hdr) => hdr.as_bytes().to_vec(),
            None => return Err(TwitchSigError::Missing("message id")),
        };

        let msg_ts = match parts.headers.get("Twitch-Eventsub-Message-Timestamp") {
            Some(hdr) => hdr.as_bytes().to_vec(),
            None => return Err(TwitchSigError::Missing("message timestamp")),
        };

        Ok(SigVerifier {
            expected_sig: sig,
            msg_id,
            msg_ts,
        })
    }
}

#[derive(Clone)]
pub struct ServerState {
    app_secret: Arc<String>,
    send_chan: mpsc::Sender<LivenessEvent>,
}

async fn webhook_post(
    sig_verifier: SigVerifier,
    axum::extract::State(state): axum::extract::State<ServerState>,
    body: String,
) -> Result<axum::response::Response, TwitchError> {
    log::debug!("got something from twitch: {:?}", body);
    sig_verifier.verify(&state.app_secret, body.as_bytes())?;

    let payload = eventsub::Payload::parse(&body)
        .map_err(|err| TwitchError::InvalidPayload(err.to_string()))?;
    match payload {
        eventsub::Payload::VerificationRequest(verif_req) => {
            log::debug!("verification request received: {:#?}", verif_req);
            Ok(verif_req.challenge.into_response())
        }
        eventsub::Payload::StreamOnlineV1(online) => {
            log::debug!("online stream event: {:#?}", online);
            let event = LivenessEvent::from_notification(online)
                .map_err(|err| TwitchError::InvalidPayload(err.to_string()))?;
            state.send_chan.send(event).await.map_err(|err| {
                log::error!("{:?}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            Ok(().into_response())
        }
        _ => {
            log::info!("Received unsupported payload: {:#?}", payload);
            Err(StatusCode::NOT_IMPLEMENTED.into())
        }
    }
}

pub(crate) fn init_router(config: &Config, tx: mpsc::Sender<LivenessEvent>) -> Router<()> {
    let server_state = ServerState {
        app_secret: Arc::new(config.app_secret.0.clone()),
        send_chan: tx,
    };

    axum::Router::new()
        .route(EVENTSUB_ROUTE, routing::post(webhook_post))
        .with_state(server_state)
}

/// Serve the eventsub webhook until something goes wrong
pub async fn run(config: &Config, tx: mpsc::Sender<LivenessEvent>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.webhook_bind, config.webhook_port).parse()?;
    log::info!("Starting eventsub webhook server on {addr}");

    axum::Server::bind(&addr)
        .serve(init_router(config, tx).into_make_service())
        .await?;

    Err(anyhow::anyhow!("webhook server shut down"))
}
