use crate::files::ServerFileManager;
use std::sync::Arc;
use talon_auth::policy::AccessPolicy;
use talon_auth::scheme::ConnectionScheme;

/// Shared state handed to every request handler. Cloned per connection;
/// everything inside is cheap shared handles.
#[derive(Clone)]
pub struct AppState {
    pub files: ServerFileManager,
    pub scheme: Arc<ConnectionScheme>,
    pub policy: AccessPolicy,
}

/// Identity established during the mutual-TLS handshake, injected into the
/// connection's requests after the policy check passed.
#[derive(Debug, Clone)]
pub struct PeerIdentity(pub String);
