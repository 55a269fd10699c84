//! Request identity from a trusted reverse-proxy header.
//!
//! Parley does not authenticate. A proxy in front of it does, and forwards
//! the user's email in [`EMAIL_HEADER`]. This middleware turns that into an
//! [`Identity`] in the request extensions, resolving the display name through
//! the [`DisplayNames`] collaborator.

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use parley_core::Identity;
use parley_store::DisplayNames;
use tracing::{debug, warn};

use crate::server::AppState;

/// Header carrying the authenticated email.
pub const EMAIL_HEADER: &str = "x-parley-email";

/// Optional header carrying a display name, used when none is registered.
pub const NAME_HEADER: &str = "x-parley-name";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the identity for a request, if it carries one.
///
/// Display name order: registered name, [`NAME_HEADER`], email local part.
pub async fn resolve(headers: &HeaderMap, names: &dyn DisplayNames) -> Option<Identity> {
    let email = header(headers, EMAIL_HEADER)?;
    let registered = match names.display_name(email).await {
        Ok(name) => name,
        Err(e) => {
            warn!(email, error = %e, "display name lookup failed");
            None
        }
    };
    let identity = match registered.or_else(|| header(headers, NAME_HEADER).map(str::to_owned)) {
        Some(name) => Identity::new(email, name),
        None => Identity::from_email(email),
    };
    debug!(email = %identity.email, display_name = %identity.display_name, "request identity");
    Some(identity)
}

/// Axum middleware inserting [`Identity`] into the request extensions.
///
/// Requests without the email header pass through untouched; routes that need
/// an identity refuse them.
pub async fn identity_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    if let Some(identity) = resolve(req.headers(), state.display_names.as_ref()).await {
        let _ = req.extensions_mut().insert(identity);
    }
    next.run(req).await
}
