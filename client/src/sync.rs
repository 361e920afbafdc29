//! Blocking facade over [`AsyncHttpClient`].
//!
//! A dedicated thread runs a current-thread tokio runtime for the lifetime of
//! the facade. Each call builds a fresh engine on that runtime and blocks on a
//! channel until its callback fires. Do not call it from inside a runtime.

use std::sync::mpsc;
use std::thread;

use h1_core::{RequestInfo, ResponseInfo};
use log::{debug, error};
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::engine::AsyncHttpClient;
use crate::error::ClientError;
use crate::hooks::ResponseHooks;

pub struct SyncHttpClient {
    config: ClientConfig,
    handle: Handle,
    stop: Option<oneshot::Sender<()>>,
    io_thread: Option<thread::JoinHandle<()>>,
}

impl SyncHttpClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (stop, stopped) = oneshot::channel::<()>();
        let io_thread = thread::Builder::new().name("h1-sync-io".to_string()).spawn(move || {
            runtime.block_on(async {
                let _ = stopped.await;
            });
            debug!("sync client event loop stopped");
        })?;

        Ok(Self {
            config,
            handle,
            stop: Some(stop),
            io_thread: Some(io_thread),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run one request to completion and return its outcome.
    pub fn make_request(&self, request: RequestInfo) -> ResponseInfo {
        self.make_request_with_hooks(request, ResponseHooks::default())
    }

    pub fn make_request_with_hooks(&self, request: RequestInfo, hooks: ResponseHooks) -> ResponseInfo {
        let (tx, rx) = mpsc::channel();
        let client = AsyncHttpClient::with_handle(self.handle.clone(), self.config.clone());
        let started = client.make_request_with_hooks(request, hooks, move |response| {
            let _ = tx.send(response);
            Ok(())
        });
        if let Err(err) = started {
            return ResponseInfo {
                error_msg: err.to_string(),
                ..ResponseInfo::default()
            };
        }

        debug!("[{}] waiting for http result", client.id());
        // The sender lives in the callback, which `client` holds until it is
        // invoked, so `recv` returns only after delivery.
        let response = rx.recv().unwrap_or_default();
        debug!("[{}] got http result", client.id());
        response
    }
}

impl Drop for SyncHttpClient {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(io_thread) = self.io_thread.take() {
            if io_thread.join().is_err() {
                error!("sync client event loop thread panicked");
            }
        }
    }
}
