//! Lifecycle of the shared callback listener
//!
//! The [`CallbackServerManager`] starts the loopback listener on the first
//! [`open_callback`](CallbackServerManager::open_callback), reuses it while
//! logins are pending and releases it once they have all settled. Each
//! manager is independent; [`CallbackServerManager::shared`] provides the
//! process-wide one.

use super::callback_server::{normalize_id, router};
use super::handler::CallbackHandler;
use super::registry::{PendingRegistry, Resolution};
use super::types::{AuthError, AuthResult};
use portico_common::auth_constants::CALLBACK_PATH_PREFIX;
use portico_common::CallbackConfig;
use rand::RngCore;
use std::future::Future;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::pin::Pin;
use std::sync::{Arc, OnceLock, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// How long a stopping listener may take to finish in-flight responses
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

struct RunningServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl RunningServer {
    async fn shut_down(self) {
        self.shutdown.cancel();
        let mut task = self.task;
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
            debug!("Callback server did not drain in time, aborting connections");
            task.abort();
        }
    }
}

struct ManagerInner {
    config: CallbackConfig,
    timeout: Duration,
    registry: Arc<PendingRegistry>,
    server: Mutex<Option<RunningServer>>,
}

/// Owns the shared callback listener and its pending-request registry
#[derive(Clone)]
pub struct CallbackServerManager {
    inner: Arc<ManagerInner>,
}

impl Default for CallbackServerManager {
    fn default() -> Self {
        Self::new(CallbackConfig::default())
    }
}

impl CallbackServerManager {
    pub fn new(config: CallbackConfig) -> Self {
        let timeout = config.timeout();
        Self::with_timeout(config, timeout)
    }

    /// Like [`new`](Self::new) with a deadline finer than the config's seconds
    pub fn with_timeout(config: CallbackConfig, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                config,
                timeout,
                registry: PendingRegistry::new(),
                server: Mutex::new(None),
            }),
        }
    }

    /// Build a manager from loaded configuration
    pub fn from_config(config: &portico_common::AuthConfig) -> Self {
        Self::new(config.callback.clone())
    }

    /// Process-wide manager using default configuration
    pub fn shared() -> &'static CallbackServerManager {
        static SHARED: OnceLock<CallbackServerManager> = OnceLock::new();
        SHARED.get_or_init(CallbackServerManager::default)
    }

    pub fn registry(&self) -> &Arc<PendingRegistry> {
        &self.inner.registry
    }

    pub async fn is_running(&self) -> bool {
        self.inner.server.lock().await.is_some()
    }

    /// Address of the listener, if running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.server.lock().await.as_ref().map(|s| s.addr)
    }

    /// Open a callback whose response is decided by `handler`
    pub async fn open_callback<H>(&self, handler: H) -> AuthResult<PendingCallback>
    where
        H: CallbackHandler + 'static,
    {
        self.open(Some(Arc::new(handler))).await
    }

    /// Open a callback answered with the default `200 OK`
    pub async fn open_plain_callback(&self) -> AuthResult<PendingCallback> {
        self.open(None).await
    }

    async fn open(&self, handler: Option<Arc<dyn CallbackHandler>>) -> AuthResult<PendingCallback> {
        // Held across start-up and registration so a concurrent idle stop
        // never observes a listener without its new entry.
        let mut server = self.inner.server.lock().await;

        let addr = match server.as_ref() {
            Some(running) => running.addr,
            None => {
                let running = self.start().await?;
                let addr = running.addr;
                *server = Some(running);
                addr
            }
        };

        let timeout = self.inner.timeout;
        let (id, resolution) = loop {
            let id = generate_id(self.inner.config.id_bytes);
            match self.inner.registry.register(
                &id,
                handler.clone(),
                timeout,
                stop_when_idle(Arc::downgrade(&self.inner)),
            ) {
                Ok(resolution) => break (id, resolution),
                Err(AuthError::DuplicateId(_)) => continue,
                Err(e) => return Err(e),
            }
        };

        let url = Url::parse(&format!("http://{}{}/{}", addr, CALLBACK_PATH_PREFIX, id))
            .map_err(|e| AuthError::InvalidCallbackUrl(e.to_string()))?;

        info!("Waiting for browser callback at {}", url);

        Ok(PendingCallback {
            url,
            resolution,
            canceller: CallbackCanceller {
                id,
                manager: self.clone(),
            },
        })
    }

    /// Stop the listener.
    ///
    /// Without `force` this only happens when no login is pending. With
    /// `force`, every pending login is rejected with
    /// [`AuthError::ServerStopped`]. Safe to call repeatedly or when nothing
    /// is running. Returns whether the manager is now idle.
    pub async fn stop(&self, force: bool) -> bool {
        let mut server = self.inner.server.lock().await;

        if !force && self.inner.registry.pending_count() > 0 {
            debug!(
                "Keeping callback server up for {} pending login(s)",
                self.inner.registry.pending_count()
            );
            return false;
        }

        if let Some(running) = server.take() {
            let addr = running.addr;
            running.shut_down().await;
            info!("Callback server on {} stopped", addr);
        }

        let drained = self.inner.registry.drain_all(AuthError::ServerStopped);
        if drained > 0 {
            warn!("Rejected {} pending login(s) on shutdown", drained);
        }
        true
    }

    async fn start(&self) -> AuthResult<RunningServer> {
        let config = &self.inner.config;
        let host = resolve_host(&config.host);
        let preferred = SocketAddr::new(host, config.preferred_port);
        if !host.is_loopback() {
            return Err(AuthError::bind(
                preferred,
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "callback host must be a loopback address",
                ),
            ));
        }

        let listener = match TcpListener::bind(preferred).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse && config.preferred_port != 0 => {
                debug!("Port {} is taken, using an ephemeral port", config.preferred_port);
                let fallback = SocketAddr::new(host, 0);
                TcpListener::bind(fallback)
                    .await
                    .map_err(|e| AuthError::bind(fallback, e))?
            }
            Err(e) => return Err(AuthError::bind(preferred, e)),
        };
        let addr = listener
            .local_addr()
            .map_err(|e| AuthError::bind(preferred, e))?;

        let app = router(self.inner.registry.clone(), addr);
        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await });
            if let Err(e) = serve.await {
                warn!("Callback server error: {}", e);
            }
        });

        info!("Callback server listening on http://{}", addr);
        Ok(RunningServer {
            addr,
            shutdown,
            task,
        })
    }
}

/// Deadline hook: release the listener if this was the last pending login
fn stop_when_idle(manager: Weak<ManagerInner>) -> impl FnOnce() + Send + 'static {
    move || {
        if let Some(inner) = manager.upgrade() {
            let manager = CallbackServerManager { inner };
            tokio::spawn(async move {
                manager.stop(false).await;
            });
        }
    }
}

fn resolve_host(host: &str) -> IpAddr {
    host.parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

fn generate_id(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::thread_rng().fill_bytes(&mut buf);
    normalize_id(&hex::encode(buf))
}

/// Cancels one pending login without affecting the others
#[derive(Clone)]
pub struct CallbackCanceller {
    id: String,
    manager: CallbackServerManager,
}

impl CallbackCanceller {
    /// Reject the login with [`AuthError::Cancelled`] and release the
    /// listener if nothing else is pending
    pub async fn cancel(&self) {
        if self.manager.registry().cancel(&self.id) {
            info!("Login {} cancelled", self.id);
        }
        self.manager.stop(false).await;
    }
}

/// A login waiting for its browser callback.
///
/// Await it to get the final request URL.
pub struct PendingCallback {
    url: Url,
    resolution: Resolution,
    canceller: CallbackCanceller,
}

impl PendingCallback {
    pub fn id(&self) -> &str {
        &self.canceller.id
    }

    /// URL the browser must be sent to
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn canceller(&self) -> CallbackCanceller {
        self.canceller.clone()
    }

    pub async fn cancel(&self) {
        self.canceller.cancel().await
    }
}

impl Future for PendingCallback {
    type Output = AuthResult<Url>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.resolution)
            .poll(cx)
            .map(|settled| settled.unwrap_or(Err(AuthError::ServerStopped)))
    }
}

impl std::fmt::Debug for PendingCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCallback")
            .field("id", &self.canceller.id)
            .field("url", &self.url.as_str())
            .finish()
    }
}
