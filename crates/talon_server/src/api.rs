use crate::state::{AppState, PeerIdentity};
use axum::extract::{FromRequestParts, Path, State};
use axum::http::{StatusCode, header, request::Parts};
use axum::response::{IntoResponse, Response};
use http::HeaderName;
use tracing::{debug, error, info, warn};

/// The one reply for everything the requester is not entitled to see.
/// Unauthorized requests and absent files are deliberately indistinguishable
/// so probing cannot reveal which resource names exist.
const NOT_FOUND: (StatusCode, &str) = (StatusCode::NOT_FOUND, "Not Found");

pub async fn not_found() -> impl IntoResponse {
    NOT_FOUND
}

/// Extractor gating every route. For mutual TLS the connection was already
/// authenticated at the handshake and carries a [`PeerIdentity`]; otherwise
/// the configured scheme inspects the request headers.
pub struct Authorized;

impl FromRequestParts<AppState> for Authorized {
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if parts.extensions.get::<PeerIdentity>().is_some() {
            return Ok(Self);
        }
        if state.scheme.authorize(&parts.headers, &state.policy) {
            Ok(Self)
        } else {
            warn!("rejecting unauthorized request, answering as not found");
            Err(NOT_FOUND)
        }
    }
}

/// GET /manifest
pub async fn get_manifest(
    State(state): State<AppState>,
    _auth: Authorized,
) -> Result<Response, (StatusCode, &'static str)> {
    info!("serving manifest");
    let json = state.files.manifest_json().map_err(|e| {
        error!("failed to serialize manifest: {e}");
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    })?;
    Ok(([(header::CONTENT_TYPE, "application/json")], json).into_response())
}

/// GET /files/{name}
///
/// Raw bytes plus a `filename` response header. The path segment arrives
/// percent-decoded from the router.
pub async fn get_file(
    State(state): State<AppState>,
    _auth: Authorized,
    Path(name): Path<String>,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(bytes) = state.files.read_file(&name) else {
        debug!("requested file {name} not found");
        return Err(NOT_FOUND);
    };
    debug!("serving file {name} ({} bytes)", bytes.len());
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (HeaderName::from_static("filename"), name),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PackServer;
    use crate::files::{CandidateFile, ServerFileManager};
    use axum::Router;
    use axum::body::Body;
    use http::Request;
    use std::sync::Arc;
    use talon_auth::password::hash_password;
    use talon_auth::policy::AccessPolicy;
    use talon_auth::scheme::{AUTHENTICATION, ConnectionScheme};
    use talon_core::config::ServerConfig;
    use talon_core::manifest::PackManifest;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router(dir: &TempDir) -> Router {
        std::fs::write(dir.path().join("modA-2.0.jar"), b"jar bytes").unwrap();
        let files = ServerFileManager::initialize(
            dir.path(),
            &[],
            &[CandidateFile::grouped(
                dir.path().join("modA-2.0.jar"),
                "modA",
                "2.0.0",
            )],
        )
        .unwrap();

        let config = ServerConfig {
            password: Some("hunter2".into()),
            ..Default::default()
        };
        let scheme = ConnectionScheme::for_server(&config, dir.path()).unwrap();
        let state = AppState {
            files,
            scheme: Arc::new(scheme),
            policy: AccessPolicy::new(),
        };
        PackServer::router(state)
    }

    fn authed(uri: &str) -> Request<Body> {
        Request::builder()
            .uri(uri)
            .header(AUTHENTICATION, format!("Basic {}", hash_password("hunter2")))
            .body(Body::empty())
            .unwrap()
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn manifest_is_served_to_authenticated_clients() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let response = router.oneshot(authed("/manifest")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_bytes(response).await;
        let manifest = PackManifest::from_json(std::str::from_utf8(&body).unwrap()).unwrap();
        assert_eq!(manifest.entries[0].file_name, "modA-2.0.jar");
    }

    #[tokio::test]
    async fn wrong_password_is_answered_as_not_found() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        // Wrong hash, missing header, and a genuinely absent file must all
        // look identical on the wire.
        let wrong = Request::builder()
            .uri("/manifest")
            .header(AUTHENTICATION, "Basic WRONG")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(wrong).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let wrong_body = body_bytes(response).await;

        let missing_header = Request::builder()
            .uri("/files/modA-2.0.jar")
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(missing_header).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = router.oneshot(authed("/files/no-such.jar")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let absent_body = body_bytes(response).await;

        assert_eq!(wrong_body, absent_body);
    }

    #[tokio::test]
    async fn files_are_served_with_a_filename_header() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let response = router.oneshot(authed("/files/modA-2.0.jar")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("filename").unwrap(),
            "modA-2.0.jar"
        );
        assert_eq!(body_bytes(response).await, b"jar bytes");
    }

    #[tokio::test]
    async fn unknown_routes_are_not_found() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let response = router.oneshot(authed("/other")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
