//! Render context thread management.
//!
//! Each context runs in a dedicated thread with its own Tokio runtime
//! because `deno_core::JsRuntime` is not `Send`. The handle talks to it
//! with command messages; every command carries its own reply channel.
//!
//! Every command has a deadline. A command that misses it terminates the
//! isolate and leaves the handle unusable, so a script stuck in a loop
//! costs one context instead of the caller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deno_core::v8;
use prerender_ssr_core::HydrationPayload;
use tokio::sync::{mpsc, oneshot};

use super::runtime::{ContextBundle, ContextRuntime, MarkerProbe};
use crate::context::{RenderContext, Stability};
use crate::error::{Result, SsrError};
use crate::stability::wait_until_stable;

const COMMAND_CAPACITY: usize = 8;

/// Upper bound on running the bundle at boot.
const BOOT_TIMEOUT: Duration = Duration::from_secs(30);

static NEXT_THREAD: AtomicUsize = AtomicUsize::new(0);

type Reply<T> = oneshot::Sender<Result<T>>;

/// Request sent to a context thread.
pub(crate) enum Command {
    Inject {
        payload_json: String,
        script_body: String,
        reply: Reply<()>,
    },
    ClearInjected {
        reply: Reply<()>,
    },
    Navigate {
        href: String,
        route: String,
        reply: Reply<bool>,
    },
    WaitStable {
        timeout: Duration,
        poll_interval: Duration,
        marker_id: String,
        reply: Reply<Stability>,
    },
    Serialize {
        reply: Reply<String>,
    },
    Close {
        reply: Reply<()>,
    },
}

/// Handle to a render context living on its own thread.
pub struct DenoContext {
    commands: mpsc::Sender<Command>,
    isolate: v8::IsolateHandle,
    command_timeout: Duration,
    wedged: AtomicBool,
}

impl DenoContext {
    /// Spawn the context thread and boot it at `url`.
    ///
    /// Resolves once the bundle has executed; boot failures are reported as
    /// `ContextCreation`.
    pub(crate) async fn spawn(
        bundle: Arc<ContextBundle>,
        url: String,
        command_timeout: Duration,
    ) -> Result<Self> {
        let (commands, receiver) = mpsc::channel(COMMAND_CAPACITY);
        let (isolate_tx, isolate_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let name = format!(
            "prerender-ctx-{}",
            NEXT_THREAD.fetch_add(1, Ordering::Relaxed)
        );

        std::thread::Builder::new()
            .name(name)
            .spawn(move || run_context(bundle, url, receiver, isolate_tx, ready_tx))
            .map_err(|e| SsrError::ContextCreation(e.to_string()))?;

        let exited = || SsrError::ContextCreation("context thread exited during boot".to_string());
        let Ok(isolate) = isolate_rx.await else {
            // The thread failed before it had an isolate.
            return Err(match ready_rx.await {
                Ok(Err(e)) => creation_error(e),
                _ => exited(),
            });
        };

        match tokio::time::timeout(BOOT_TIMEOUT, ready_rx).await {
            Ok(Ok(Ok(()))) => Ok(Self {
                commands,
                isolate,
                command_timeout,
                wedged: AtomicBool::new(false),
            }),
            Ok(Ok(Err(e))) => Err(creation_error(e)),
            Ok(Err(_)) => Err(exited()),
            Err(_) => {
                isolate.terminate_execution();
                Err(SsrError::ContextCreation(format!(
                    "boot did not finish within {}ms",
                    BOOT_TIMEOUT.as_millis()
                )))
            }
        }
    }

    /// Send a command and wait at most `deadline` for its reply.
    ///
    /// A missed deadline terminates whatever JS the thread is running.
    async fn call<T>(
        &self,
        deadline: Duration,
        command: impl FnOnce(Reply<T>) -> Command,
    ) -> Result<T> {
        if self.wedged.load(Ordering::Acquire) {
            return Err(SsrError::ContextClosed);
        }

        let (reply, response) = oneshot::channel();
        let exchange = async {
            self.commands
                .send(command(reply))
                .await
                .map_err(|_| SsrError::ContextClosed)?;
            response.await.map_err(|_| SsrError::ContextClosed)?
        };

        match tokio::time::timeout(deadline, exchange).await {
            Ok(result) => result,
            Err(_) => {
                self.wedged.store(true, Ordering::Release);
                self.isolate.terminate_execution();
                let ms = deadline.as_millis() as u64;
                tracing::warn!(deadline_ms = ms, "Render context unresponsive, terminated");
                Err(SsrError::CommandTimeout(ms))
            }
        }
    }
}

#[async_trait]
impl RenderContext for DenoContext {
    async fn inject(&self, payload: &HydrationPayload) -> Result<()> {
        let payload_json = payload.to_json()?;
        let script_body = payload.script_body()?;
        self.call(self.command_timeout, |reply| Command::Inject {
            payload_json,
            script_body,
            reply,
        })
        .await
    }

    async fn clear_injected(&self) -> Result<()> {
        self.call(self.command_timeout, |reply| Command::ClearInjected { reply })
            .await
    }

    async fn navigate(&self, url: &str, route: &str) -> Result<bool> {
        let href = url.to_string();
        let route = route.to_string();
        self.call(self.command_timeout, |reply| Command::Navigate {
            href,
            route,
            reply,
        })
            .await
    }

    async fn wait_for_stable(
        &self,
        timeout: Duration,
        poll_interval: Duration,
        marker_id: &str,
    ) -> Result<Stability> {
        let marker_id = marker_id.to_string();
        // The wait itself is bounded on the thread; the extra margin covers
        // one poll that never returns.
        let deadline = timeout + self.command_timeout;
        self.call(deadline, |reply| Command::WaitStable {
            timeout,
            poll_interval,
            marker_id,
            reply,
        })
        .await
    }

    async fn serialize(&self) -> Result<String> {
        self.call(self.command_timeout, |reply| Command::Serialize { reply })
            .await
    }

    async fn close(&self) -> Result<()> {
        // Close is still delivered to a wedged context: the thread drops its
        // runtime once the terminated script unwinds.
        let (reply, response) = oneshot::channel();
        let exchange = async {
            self.commands
                .send(Command::Close { reply })
                .await
                .map_err(|_| SsrError::ContextClosed)?;
            response.await.map_err(|_| SsrError::ContextClosed)?
        };
        tokio::time::timeout(self.command_timeout, exchange)
            .await
            .map_err(|_| SsrError::CommandTimeout(self.command_timeout.as_millis() as u64))?
    }

    fn is_usable(&self) -> bool {
        !self.wedged.load(Ordering::Acquire)
    }
}

fn creation_error(error: SsrError) -> SsrError {
    match error {
        SsrError::ContextCreation(reason) => SsrError::ContextCreation(reason),
        other => SsrError::ContextCreation(other.to_string()),
    }
}

/// Body of a context thread.
fn run_context(
    bundle: Arc<ContextBundle>,
    url: String,
    mut commands: mpsc::Receiver<Command>,
    isolate: oneshot::Sender<v8::IsolateHandle>,
    ready: oneshot::Sender<Result<()>>,
) {
    // Create a single-threaded Tokio runtime for this context
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(SsrError::ContextCreation(e.to_string())));
            return;
        }
    };

    rt.block_on(async move {
        let mut runtime = ContextRuntime::new();
        if isolate.send(runtime.isolate_handle()).is_err() {
            return;
        }
        if let Err(e) = runtime.boot(&bundle, &url).await {
            let _ = ready.send(Err(e));
            return;
        }
        if ready.send(Ok(())).is_err() {
            // Creator gave up waiting.
            return;
        }
        tracing::debug!(url = %url, "Render context started");

        while let Some(command) = commands.recv().await {
            // Send results back, ignoring if the receiver dropped
            match command {
                Command::Inject {
                    payload_json,
                    script_body,
                    reply,
                } => {
                    let _ = reply.send(runtime.inject(&payload_json, &script_body).await);
                }
                Command::ClearInjected { reply } => {
                    let _ = reply.send(runtime.clear().await);
                }
                Command::Navigate { href, route, reply } => {
                    let _ = reply.send(runtime.navigate(&href, &route).await);
                }
                Command::WaitStable {
                    timeout,
                    poll_interval,
                    marker_id,
                    reply,
                } => {
                    let mut probe = MarkerProbe {
                        runtime: &mut runtime,
                        marker_id: &marker_id,
                    };
                    let result = wait_until_stable(&mut probe, timeout, poll_interval).await;
                    let _ = reply.send(result);
                }
                Command::Serialize { reply } => {
                    let _ = reply.send(runtime.serialize().await);
                }
                Command::Close { reply } => {
                    commands.close();
                    drop(runtime);
                    let _ = reply.send(Ok(()));
                    break;
                }
            }
        }

        tracing::debug!("Render context shutting down");
    });
}
