//! Shared tokio runtime for clients that only expose async APIs.
//!
//! The pipeline itself is synchronous; the object-store and AWS SDK
//! clients are not. They all block on this lazily-created runtime.

use once_cell::sync::Lazy;
use std::future::Future;
use tokio::runtime::Runtime;

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to initialize tokio runtime")
});

/// Run a future to completion on the shared runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}
