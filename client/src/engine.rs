//! Single-shot asynchronous HTTP/1.1 client.
//!
//! # Design
//! One `AsyncHttpClient` runs at most one request, as one task on a tokio
//! runtime. The task races three futures: a shutdown notification raised by
//! `Drop`, the exchange itself (resolve, connect, write, read), and the
//! deadline timer. Whichever loses is dropped, which closes the socket or
//! cancels the timer.
//!
//! Completion goes through `Shared::deliver`, which swaps an atomic flag
//! before touching the callback, so exactly one path ever invokes it.
//!
//! The task owns a `BusyGuard` that clears the busy flag when the task
//! future finishes or is dropped, after the callback has returned. `Drop`
//! waits on that flag before delivering an "abandoned" result. Where waiting
//! would deadlock (inside the request task itself, or on a current-thread
//! runtime) `Drop` marks delivery as deferred instead, and the guard delivers
//! "abandoned" once the task has let go of its socket.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use h1_core::{RequestInfo, ResponseInfo};
use log::{debug, error, info, warn};
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::{CallbackPolicy, ClientConfig};
use crate::error::{BoxError, ClientError, RequestError};
use crate::exchange;
use crate::hooks::ResponseHooks;

/// What a completion callback returns.
pub type CallbackResult = Result<(), BoxError>;

type Callback = Box<dyn FnOnce(ResponseInfo) -> CallbackResult + Send + 'static>;

/// About thirty years; the deadline used when the configured timeout does not
/// fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

tokio::task_local! {
    /// Id of the client whose request task is being polled.
    static REQUEST_TASK: Uuid;
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Where a request currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Created = 0,
    Resolving = 1,
    Connecting = 2,
    Sending = 3,
    ReadingHeaders = 4,
    ReadingBody = 5,
    Completed = 6,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => EngineState::Resolving,
            2 => EngineState::Connecting,
            3 => EngineState::Sending,
            4 => EngineState::ReadingHeaders,
            5 => EngineState::ReadingBody,
            6 => EngineState::Completed,
            _ => EngineState::Created,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the client handle and its request task.
pub(crate) struct Shared {
    id: Uuid,
    state: AtomicU8,
    started: AtomicBool,
    completed: AtomicBool,
    callback: Mutex<Option<Callback>>,
    deferred: AtomicBool,
    abandoned: Mutex<Option<ResponseInfo>>,
    shutdown: Notify,
    busy: Mutex<bool>,
    quiescent: Condvar,
}

impl Shared {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(EngineState::Created as u8),
            started: AtomicBool::new(false),
            completed: AtomicBool::new(false),
            callback: Mutex::new(None),
            deferred: AtomicBool::new(false),
            abandoned: Mutex::new(None),
            shutdown: Notify::new(),
            busy: Mutex::new(false),
            quiescent: Condvar::new(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn set_state(&self, state: EngineState) {
        let previous = EngineState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        debug!("[{}] {previous:?} -> {state:?}", self.id);
    }

    fn state(&self) -> EngineState {
        EngineState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// True while polling this client's own request task, hooks and
    /// callback included.
    fn in_own_task(&self) -> bool {
        REQUEST_TASK.try_with(|id| *id == self.id).unwrap_or(false)
    }

    fn is_busy(&self) -> bool {
        *lock(&self.busy)
    }

    fn wait_quiescent(&self) {
        let mut busy = lock(&self.busy);
        while *busy {
            busy = self.quiescent.wait(busy).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Claim the terminal callback and invoke it. Only the first caller gets
    /// through; later calls are no-ops.
    fn deliver(&self, response: ResponseInfo, policy: CallbackPolicy) -> Result<(), ClientError> {
        if self.completed.swap(true, Ordering::AcqRel) {
            debug!("[{}] terminal callback already delivered", self.id);
            return Ok(());
        }
        self.set_state(EngineState::Completed);

        let Some(callback) = lock(&self.callback).take() else {
            return Ok(());
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(move || callback(response)));

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                error!("[{}] error returned from callback function: {err}", self.id);
                match policy {
                    CallbackPolicy::Suppress => Ok(()),
                    CallbackPolicy::Propagate => Err(ClientError::Callback(err)),
                }
            }
            Err(payload) => {
                error!("[{}] panic happened in callback function", self.id);
                match policy {
                    CallbackPolicy::Suppress => Ok(()),
                    CallbackPolicy::Propagate => panic::resume_unwind(payload),
                }
            }
        }
    }

    /// Deliver whatever partial response the task left behind, marked
    /// "abandoned". Errors and panics from the callback are always suppressed.
    fn deliver_abandoned(&self) {
        let mut response = lock(&self.abandoned).take().unwrap_or_default();
        if response.error_msg.is_empty() {
            response.error_msg = RequestError::Abandoned.to_string();
        }
        let _ = self.deliver(response, CallbackPolicy::Suppress);
    }
}

/// Marks the request task as running until dropped.
struct BusyGuard(Arc<Shared>);

impl BusyGuard {
    fn enter(shared: &Arc<Shared>) -> Self {
        *lock(&shared.busy) = true;
        Self(Arc::clone(shared))
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if self.0.deferred.load(Ordering::SeqCst) {
            self.0.deliver_abandoned();
        }
        *lock(&self.0.busy) = false;
        self.0.quiescent.notify_all();
    }
}

enum Outcome {
    Finished(Result<(), RequestError>),
    TimedOut,
    Abandoned,
}

/// Asynchronous HTTP/1.1 client good for exactly one request.
///
/// The callback passed to [`make_request`](Self::make_request) is invoked
/// exactly once: with the response, with a transport or protocol error, with
/// `timeout = true`, or with `error_msg == "abandoned"` when the client is
/// dropped first.
///
/// Dropping a client mid-flight normally blocks until the request task has
/// closed its socket, then runs the callback on the dropping thread. On a
/// current-thread runtime, or from inside one of this client's own hooks or
/// its callback, blocking would deadlock: `Drop` returns at once and the
/// "abandoned" callback runs on the runtime after the socket is closed.
pub struct AsyncHttpClient {
    shared: Arc<Shared>,
    config: Arc<ClientConfig>,
    handle: Handle,
    task: Mutex<Option<JoinHandle<Result<(), ClientError>>>>,
}

impl AsyncHttpClient {
    /// Client bound to the runtime of the calling thread.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let handle = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        Ok(Self::with_handle(handle, config))
    }

    pub fn with_handle(handle: Handle, config: ClientConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            config: Arc::new(config),
            handle,
            task: Mutex::new(None),
        }
    }

    /// Identifier used to tag this client's log lines.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Start the request. Returns immediately; `callback` runs on the runtime
    /// once the request ends.
    pub fn make_request<F>(&self, request: RequestInfo, callback: F) -> Result<(), ClientError>
    where
        F: FnOnce(ResponseInfo) -> CallbackResult + Send + 'static,
    {
        self.make_request_with_hooks(request, ResponseHooks::default(), callback)
    }

    pub fn make_request_with_hooks<F>(
        &self,
        request: RequestInfo,
        hooks: ResponseHooks,
        callback: F,
    ) -> Result<(), ClientError>
    where
        F: FnOnce(ResponseInfo) -> CallbackResult + Send + 'static,
    {
        if self.shared.started.swap(true, Ordering::AcqRel) {
            warn!("[{}] rejecting a second request on a single-use client", self.shared.id);
            return Err(ClientError::AlreadyStarted);
        }
        *lock(&self.shared.callback) = Some(Box::new(callback));

        let deadline = deadline_after(self.config.timeout);
        let busy = BusyGuard::enter(&self.shared);
        let shared = Arc::clone(&self.shared);
        let config = Arc::clone(&self.config);
        let task = self.handle.spawn(REQUEST_TASK.scope(self.shared.id, async move {
            let _busy = busy;
            drive(shared, config, request, hooks, deadline).await
        }));
        *lock(&self.task) = Some(task);
        Ok(())
    }

    /// Wait for the request task to end.
    ///
    /// With [`CallbackPolicy::Propagate`] this is where an error returned by
    /// the callback (`ClientError::Callback`) or a panic inside it
    /// (`ClientError::Task`) shows up.
    pub async fn finished(&self) -> Result<(), ClientError> {
        let task = lock(&self.task).take();
        match task {
            Some(task) => task.await?,
            None => Ok(()),
        }
    }
}

async fn drive(
    shared: Arc<Shared>,
    config: Arc<ClientConfig>,
    request: RequestInfo,
    mut hooks: ResponseHooks,
    deadline: Instant,
) -> Result<(), ClientError> {
    let id = shared.id;
    let mut response = ResponseInfo::default();

    let outcome = {
        let exchange = exchange::run(&shared, &config, &request, &mut hooks, &mut response);
        tokio::pin!(exchange);
        let timer = tokio::time::sleep_until(deadline);
        tokio::pin!(timer);

        tokio::select! {
            biased;
            _ = shared.shutdown.notified() => Outcome::Abandoned,
            result = &mut exchange => Outcome::Finished(result),
            _ = &mut timer => Outcome::TimedOut,
        }
    };

    match outcome {
        Outcome::Finished(Ok(())) => {
            info!(
                "[{id}] response complete, status={} content bytes={}",
                response.status_code,
                response.content.len()
            );
        }
        Outcome::Finished(Err(err)) => {
            error!("[{id}] {err}");
            response.error_msg = err.to_string();
        }
        Outcome::TimedOut => {
            error!("[{id}] timeout after {:?}", config.timeout);
            response.timeout = true;
            response.error_msg = RequestError::Timeout.to_string();
        }
        Outcome::Abandoned => {
            debug!("[{id}] client dropped mid-flight, exchange released");
            *lock(&shared.abandoned) = Some(response);
            return Ok(());
        }
    }

    shared.deliver(response, config.callback_policy)
}

impl Drop for AsyncHttpClient {
    fn drop(&mut self) {
        let shared = &self.shared;
        if !shared.started.load(Ordering::Acquire) {
            return;
        }

        let runtime = Handle::try_current().ok();
        let must_defer = if shared.in_own_task() {
            debug!("[{}] dropped from inside its own request task", shared.id);
            true
        } else if runtime
            .as_ref()
            .is_some_and(|handle| handle.runtime_flavor() == RuntimeFlavor::CurrentThread)
        {
            debug!("[{}] dropped on a current-thread runtime, deferring delivery to the task", shared.id);
            true
        } else {
            false
        };

        if must_defer {
            // Set before notifying, so the task cannot unwind without seeing it.
            shared.deferred.store(true, Ordering::SeqCst);
            shared.shutdown.notify_one();
            if !shared.is_busy() {
                shared.deliver_abandoned();
            }
            return;
        }

        shared.shutdown.notify_one();
        match runtime {
            Some(_) => tokio::task::block_in_place(|| shared.wait_quiescent()),
            None => shared.wait_quiescent(),
        }
        shared.deliver_abandoned();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_callback(count: &Arc<AtomicUsize>) -> impl FnOnce(ResponseInfo) -> CallbackResult + Send + 'static {
        let count = Arc::clone(count);
        move |_| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn install(shared: &Shared, callback: impl FnOnce(ResponseInfo) -> CallbackResult + Send + 'static) {
        *lock(&shared.callback) = Some(Box::new(callback));
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            EngineState::Created,
            EngineState::Resolving,
            EngineState::Connecting,
            EngineState::Sending,
            EngineState::ReadingHeaders,
            EngineState::ReadingBody,
            EngineState::Completed,
        ] {
            assert_eq!(EngineState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn deliver_runs_the_callback_once() {
        let shared = Shared::new();
        let count = Arc::new(AtomicUsize::new(0));
        install(&shared, counting_callback(&count));

        shared.deliver(ResponseInfo::default(), CallbackPolicy::Suppress).unwrap();
        shared.deliver(ResponseInfo::default(), CallbackPolicy::Suppress).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(shared.state(), EngineState::Completed);
    }

    #[test]
    fn suppress_swallows_callback_errors_and_panics() {
        let shared = Shared::new();
        install(&shared, |_| Err("boom".into()));
        assert!(shared.deliver(ResponseInfo::default(), CallbackPolicy::Suppress).is_ok());

        let shared = Shared::new();
        install(&shared, |_| panic!("boom"));
        assert!(shared.deliver(ResponseInfo::default(), CallbackPolicy::Suppress).is_ok());
        assert!(!shared.in_own_task());
    }

    #[test]
    fn propagate_returns_callback_errors() {
        let shared = Shared::new();
        install(&shared, |_| Err("boom".into()));
        let err = shared.deliver(ResponseInfo::default(), CallbackPolicy::Propagate).unwrap_err();
        assert!(matches!(err, ClientError::Callback(_)));
        assert_eq!(err.to_string(), "response callback failed: boom");
    }

    #[test]
    fn propagate_resumes_callback_panics() {
        let shared = Arc::new(Shared::new());
        install(&shared, |_| panic!("boom"));
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _ = shared.deliver(ResponseInfo::default(), CallbackPolicy::Propagate);
        }));
        assert!(result.is_err());
    }

    #[test]
    fn busy_guard_releases_waiters() {
        let shared = Arc::new(Shared::new());
        let guard = BusyGuard::enter(&shared);
        let waiter = {
            let shared = Arc::clone(&shared);
            std::thread::spawn(move || shared.wait_quiescent())
        };
        drop(guard);
        waiter.join().unwrap();
        assert!(!*lock(&shared.busy));
    }

    #[test]
    fn deferred_guard_delivers_abandoned_partial_response() {
        let shared = Arc::new(Shared::new());
        let (tx, rx) = std::sync::mpsc::channel();
        install(&shared, move |response| {
            let _ = tx.send(response);
            Ok(())
        });
        let guard = BusyGuard::enter(&shared);
        *lock(&shared.abandoned) = Some(ResponseInfo {
            status_code: 200,
            ..ResponseInfo::default()
        });
        shared.deferred.store(true, Ordering::SeqCst);
        drop(guard);

        let response = rx.try_recv().unwrap();
        assert_eq!(response.error_msg, "abandoned");
        assert_eq!(response.status_code, 200);
        assert!(!shared.is_busy());
    }

    #[test]
    fn guard_without_deferral_delivers_nothing() {
        let shared = Arc::new(Shared::new());
        let count = Arc::new(AtomicUsize::new(0));
        install(&shared, counting_callback(&count));
        drop(BusyGuard::enter(&shared));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn oversized_timeout_still_yields_a_deadline() {
        let deadline = deadline_after(Duration::from_secs(u64::MAX));
        assert!(deadline > Instant::now() + Duration::from_secs(86400 * 365));
        let deadline = deadline_after(Duration::from_millis(5));
        assert!(deadline <= Instant::now() + Duration::from_millis(5));
    }

    #[tokio::test]
    async fn oversized_timeout_does_not_panic_on_request() {
        let client = AsyncHttpClient::new(ClientConfig::new(Duration::from_secs(u64::MAX))).unwrap();
        let (tx, rx) = tokio::sync::oneshot::channel();
        client
            .make_request(RequestInfo::get("gopher://127.0.0.1/"), move |response| {
                let _ = tx.send(response);
                Ok(())
            })
            .unwrap();
        let response = rx.await.unwrap();
        assert!(!response.timeout);
        assert!(response.error_msg.starts_with("cannot resolve address"));
    }

    #[test]
    fn dropping_an_unused_client_invokes_nothing() {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        let client = AsyncHttpClient::with_handle(runtime.handle().clone(), ClientConfig::default());
        assert_eq!(client.state(), EngineState::Created);
        drop(client);
    }

    #[test]
    fn new_without_runtime_fails() {
        assert!(matches!(AsyncHttpClient::new(ClientConfig::default()), Err(ClientError::NoRuntime)));
    }
}
