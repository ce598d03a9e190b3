//! Debug HTTP server for development builds.
//!
//! Compiled only with the `debug_http` feature in builds with debug
//! assertions. Serves tracker snapshots, telemetry history, a live snapshot
//! SSE feed and input/reset endpoints, all behind a shared token.

#[cfg(all(feature = "debug_http", debug_assertions))]
mod routes;
#[cfg(all(feature = "debug_http", debug_assertions))]
mod sse;

use crate::engine::EngineHandle;

/// Default bind address when `STRIDE_DEBUG_HTTP_ADDR` is unset or invalid.
pub const DEFAULT_DEBUG_ADDR: &str = "127.0.0.1:8788";

/// Token used when `STRIDE_DEBUG_TOKEN` is unset.
pub const DEFAULT_DEBUG_TOKEN: &str = "stride-debug";

#[cfg(all(feature = "debug_http", debug_assertions))]
mod server {
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::routes::{run_http_server, DebugHttpState};
    use super::{DEFAULT_DEBUG_ADDR, DEFAULT_DEBUG_TOKEN};
    use crate::engine::EngineHandle;

    static RUNNING: AtomicBool = AtomicBool::new(false);

    fn bind_addr() -> SocketAddr {
        let fallback: SocketAddr = ([127, 0, 0, 1], 8788).into();
        std::env::var("STRIDE_DEBUG_HTTP_ADDR")
            .unwrap_or_else(|_| DEFAULT_DEBUG_ADDR.to_string())
            .parse()
            .unwrap_or(fallback)
    }

    pub(super) fn spawn(handle: &'static EngineHandle) {
        if RUNNING.swap(true, Ordering::SeqCst) {
            log::warn!("[DebugHttp] Server already running");
            return;
        }

        let addr = bind_addr();
        let token =
            std::env::var("STRIDE_DEBUG_TOKEN").unwrap_or_else(|_| DEFAULT_DEBUG_TOKEN.to_string());

        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("stride-debug-http")
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                log::error!("[DebugHttp] Could not build runtime: {}", err);
                RUNNING.store(false, Ordering::SeqCst);
                return;
            }
        };

        std::thread::spawn(move || {
            log::info!("[DebugHttp] Listening on {}", addr);
            let state = DebugHttpState::new(handle, token);
            if let Err(err) = runtime.block_on(run_http_server(state, addr)) {
                log::error!("[DebugHttp] Server stopped: {:#}", err);
            }
            RUNNING.store(false, Ordering::SeqCst);
        });
    }
}

/// Start the debug server once; a no-op unless the feature is compiled in.
pub fn spawn_if_enabled(handle: &'static EngineHandle) {
    #[cfg(all(feature = "debug_http", debug_assertions))]
    server::spawn(handle);

    #[cfg(not(all(feature = "debug_http", debug_assertions)))]
    let _ = handle;
}
