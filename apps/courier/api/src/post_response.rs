//! Post-response delivery for HTTP requests.
//!
//! [`deferred_delivery`] gives every request its own [`PostResponseHooks`]
//! and [`DeliveryQueue`] (as request extensions) and wraps the response body
//! in [`FlushOnDrop`]. Hyper drops the body once it has been written to the
//! connection, and only then are the hooks spawned, so the client never
//! waits for rendering or SMTP.

use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use domain_mail::{DeliveryQueue, PostResponseHooks};
use http_body::{Body as HttpBody, Frame, SizeHint};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tracing::{debug, warn};

/// Middleware installing request-scoped delivery state.
pub async fn deferred_delivery(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let hooks = PostResponseHooks::new();
    let queue: DeliveryQueue = state.mailer.queue();
    request.extensions_mut().insert(hooks.clone());
    request.extensions_mut().insert(queue);

    let response = next.run(request).await;
    if hooks.is_empty() {
        return response;
    }

    debug!(hooks = hooks.len(), "Deferring post-response hooks until the body is sent");
    let (parts, body) = response.into_parts();
    Response::from_parts(parts, Body::new(FlushOnDrop::new(body, hooks)))
}

/// Response body that runs its hooks on a new task when dropped.
pub struct FlushOnDrop {
    inner: Body,
    hooks: Option<PostResponseHooks>,
}

impl FlushOnDrop {
    pub fn new(inner: Body, hooks: PostResponseHooks) -> Self {
        Self {
            inner,
            hooks: Some(hooks),
        }
    }
}

impl HttpBody for FlushOnDrop {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Self::Data>, Self::Error>>> {
        Pin::new(&mut self.inner).poll_frame(cx)
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for FlushOnDrop {
    fn drop(&mut self) {
        let Some(hooks) = self.hooks.take() else {
            return;
        };

        match Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    hooks.run().await;
                });
            }
            Err(_) => warn!(
                hooks = hooks.len(),
                "No async runtime while dropping response body, post-response hooks discarded"
            ),
        }
    }
}
