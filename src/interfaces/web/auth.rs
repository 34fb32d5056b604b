use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{StatusCode, header, request::Parts},
};
use std::convert::Infallible;
use std::net::SocketAddr;
use tracing::{error, warn};

use super::AppState;
use crate::core::error::ErrorCode;
use crate::core::store::AuthError;
use crate::core::store::types::TokenRecord;
use crate::skills::envelope::Envelope;

pub const TOKEN_HEADER: &str = "x-openclaw-token";

/// Caller facts taken from every gateway request before any store access.
#[derive(Debug, Clone)]
pub struct RequestMeta {
    pub token: Option<String>,
    pub remote_ip: String,
    pub user_agent: String,
}

impl<S: Send + Sync> FromRequestParts<S> for RequestMeta {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);
        let remote_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let user_agent = parts
            .headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();
        Ok(Self {
            token,
            remote_ip,
            user_agent,
        })
    }
}

/// A refused credential, already shaped as the response to send.
pub struct Denial {
    pub status: StatusCode,
    pub envelope: Envelope,
}

impl Denial {
    pub fn missing() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            envelope: Envelope::fail(
                ErrorCode::MissingToken,
                "X-OPENCLAW-TOKEN header is required",
            ),
        }
    }

    fn refused(err: AuthError) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            envelope: Envelope::fail(err.code(), err.to_string()),
        }
    }

    fn store(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            envelope: Envelope::fail(
                ErrorCode::ServerError,
                format!("Token validation failed: {}", err),
            ),
        }
    }
}

/// Validates the presented token for `skill_code` and records the use.
/// A failed usage update is reported to diagnostics but does not refuse
/// an otherwise valid caller.
pub async fn authenticate(
    state: &AppState,
    meta: &RequestMeta,
    skill_code: Option<&str>,
) -> Result<TokenRecord, Denial> {
    let Some(raw) = meta.token.as_deref() else {
        return Err(Denial::missing());
    };
    let token = match state
        .store
        .validate_api_token(raw, skill_code, Some(&meta.remote_ip))
        .await
    {
        Ok(Ok(token)) => token,
        Ok(Err(refused)) => {
            warn!(ip = %meta.remote_ip, "Rejected token: {}", refused);
            return Err(Denial::refused(refused));
        }
        Err(e) => {
            error!("Token validation failed: {}", e);
            return Err(Denial::store(e));
        }
    };
    if let Err(e) = state.store.update_token_usage(token.id).await {
        state
            .diagnostics
            .note("auth", format!("usage update for {} failed: {}", token.name, e));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::types::NewToken;
    use axum::http::Request;

    async fn meta_for(req: Request<()>) -> RequestMeta {
        let (mut parts, _) = req.into_parts();
        RequestMeta::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn meta_reads_headers_and_defaults() {
        let meta = meta_for(Request::builder().body(()).unwrap()).await;
        assert!(meta.token.is_none());
        assert_eq!(meta.remote_ip, "unknown");
        assert_eq!(meta.user_agent, "unknown");

        let mut req = Request::builder()
            .header("X-OPENCLAW-TOKEN", " ocg_abc ")
            .header("user-agent", "n8n")
            .body(())
            .unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 7], 4242))));
        let meta = meta_for(req).await;
        assert_eq!(meta.token.as_deref(), Some("ocg_abc"));
        assert_eq!(meta.remote_ip, "10.0.0.7");
        assert_eq!(meta.user_agent, "n8n");
    }

    #[tokio::test]
    async fn blank_header_counts_as_missing() {
        let req = Request::builder()
            .header(TOKEN_HEADER, "   ")
            .body(())
            .unwrap();
        assert!(meta_for(req).await.token.is_none());
    }

    #[tokio::test]
    async fn authenticate_bumps_usage_once() {
        let state = AppState::for_tests().await;
        let (raw, _) = state
            .store
            .create_api_token(&NewToken {
                name: "n8n".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        let meta = RequestMeta {
            token: Some(raw),
            remote_ip: "127.0.0.1".into(),
            user_agent: "test".into(),
        };
        let token = authenticate(&state, &meta, None).await.ok().unwrap();
        assert_eq!(token.name, "n8n");
        let stored = state.store.list_api_tokens().await.unwrap();
        assert_eq!(stored[0].use_count, 1);
        assert!(stored[0].last_used_at.is_some());
    }

    #[tokio::test]
    async fn authenticate_maps_refusals_and_store_errors() {
        let state = AppState::for_tests().await;
        let meta = RequestMeta {
            token: Some("ocg_nope".into()),
            remote_ip: "127.0.0.1".into(),
            user_agent: "test".into(),
        };
        let denial = authenticate(&state, &meta, None).await.err().unwrap();
        assert_eq!(denial.status, StatusCode::UNAUTHORIZED);
        assert_eq!(denial.envelope.error, Some(ErrorCode::InvalidToken));

        state
            .store
            .get_db()
            .lock()
            .await
            .execute_batch("DROP TABLE api_tokens")
            .unwrap();
        let denial = authenticate(&state, &meta, None).await.err().unwrap();
        assert_eq!(denial.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(denial.envelope.error, Some(ErrorCode::ServerError));
    }
}
