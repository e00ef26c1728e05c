//! Work deferred until the HTTP response has been sent.

use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// A callback producing the deferred work.
pub type PostResponseCallback = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// The host side of deferred work: whoever owns the request pipeline.
pub trait RuntimeContext: Send + Sync {
    /// Run `callback` once the current response has been transmitted.
    fn register_post_response(&self, callback: PostResponseCallback);
}

/// Request-scoped list of post-response callbacks.
///
/// Cloning yields another handle to the same list.
#[derive(Clone, Default)]
pub struct PostResponseHooks {
    callbacks: Arc<Mutex<Vec<PostResponseCallback>>>,
}

impl PostResponseHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Run every registered callback in registration order and return how
    /// many ran. Callbacks registered while running are picked up too.
    pub async fn run(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.lock());
            if batch.is_empty() {
                break;
            }
            for callback in batch {
                callback().await;
                ran += 1;
            }
        }
        trace!(callbacks = ran, "Post-response hooks finished");
        ran
    }

    fn lock(&self) -> MutexGuard<'_, Vec<PostResponseCallback>> {
        self.callbacks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RuntimeContext for PostResponseHooks {
    fn register_post_response(&self, callback: PostResponseCallback) {
        self.lock().push(callback);
    }
}

impl fmt::Debug for PostResponseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostResponseHooks")
            .field("pending", &self.len())
            .finish()
    }
}
