//! Application state management.

use domain_mail::Mailer;

/// Shared application state.
///
/// Cloned for each handler; the mailer is a set of `Arc`s, so this is cheap.
/// Per-request mail state lives in request extensions, not here.
#[derive(Clone, Debug)]
pub struct AppState {
    pub mailer: Mailer,
}

impl AppState {
    pub fn new(mailer: Mailer) -> Self {
        Self { mailer }
    }
}
