//! Render context pool.
//!
//! The pool owns a bounded set of render contexts. Idle contexts wait in a
//! [`BlockingQueue`]; `acquire` moves one out to exactly one caller and
//! `release` moves it back, so a context is never shared. Contexts that hit
//! `max_uses`, that fail to clear their injected data, or that were
//! terminated after missing a command deadline are closed and replaced in
//! the background.

use std::collections::HashSet;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use prerender_ssr_core::PoolConfig;
use serde::Serialize;
use uuid::Uuid;

use crate::context::{RenderContext, RenderContextFactory};
use crate::error::{Result, SsrError};
use crate::queue::BlockingQueue;

/// Delay before retrying a failed replacement.
pub const REPLACEMENT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the active health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Uninitialized,
    Warming,
    Ready,
    ShuttingDown,
}

/// A render context checked out of (or idle in) the pool.
pub struct PooledContext {
    id: Uuid,
    uses: u32,
    created_at: DateTime<Utc>,
    born: Instant,
    context: Box<dyn RenderContext>,
}

impl PooledContext {
    fn new(context: Box<dyn RenderContext>) -> Self {
        Self {
            id: Uuid::new_v4(),
            uses: 0,
            created_at: Utc::now(),
            born: Instant::now(),
            context,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Times this context has been acquired, including the current holder.
    pub fn uses(&self) -> u32 {
        self.uses
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn age(&self) -> Duration {
        self.born.elapsed()
    }
}

impl Deref for PooledContext {
    type Target = dyn RenderContext;

    fn deref(&self) -> &Self::Target {
        self.context.as_ref()
    }
}

impl std::fmt::Debug for PooledContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledContext")
            .field("id", &self.id)
            .field("uses", &self.uses)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Live contexts plus creations already reserved.
#[derive(Default)]
struct Membership {
    ids: HashSet<Uuid>,
    pending: usize,
}

struct PoolInner {
    config: PoolConfig,
    factory: Arc<dyn RenderContextFactory>,
    queue: BlockingQueue<PooledContext>,
    membership: Mutex<Membership>,
    state: Mutex<PoolState>,
    init_lock: tokio::sync::Mutex<()>,
    created_total: AtomicU64,
    recycled_total: AtomicU64,
    failed_creations: AtomicU64,
}

/// A bounded, self-healing pool of render contexts.
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct RenderPool {
    inner: Arc<PoolInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RenderPool {
    /// Create an empty pool. No contexts exist until [`RenderPool::init`].
    pub fn new(config: PoolConfig, factory: Arc<dyn RenderContextFactory>) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                config,
                factory,
                queue: BlockingQueue::new(),
                membership: Mutex::new(Membership::default()),
                state: Mutex::new(PoolState::Uninitialized),
                init_lock: tokio::sync::Mutex::new(()),
                created_total: AtomicU64::new(0),
                recycled_total: AtomicU64::new(0),
                failed_creations: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    pub fn state(&self) -> PoolState {
        *lock(&self.inner.state)
    }

    fn set_state(&self, state: PoolState) {
        *lock(&self.inner.state) = state;
    }

    fn is_shutting_down(&self) -> bool {
        self.state() == PoolState::ShuttingDown
    }

    /// Create `min_instances` contexts in parallel and make them available.
    ///
    /// Idempotent: once the pool is ready this returns immediately, and
    /// concurrent callers wait for the same warm-up. If no context at all
    /// could be created the pool returns to `Uninitialized` and a later
    /// call retries. A partial warm-up succeeds and backfills the rest.
    pub async fn init(&self) -> Result<()> {
        match self.state() {
            PoolState::Ready => return Ok(()),
            PoolState::ShuttingDown => return Err(SsrError::PoolShutdown),
            PoolState::Uninitialized | PoolState::Warming => {}
        }

        let _guard = self.inner.init_lock.lock().await;
        match self.state() {
            PoolState::Ready => return Ok(()),
            PoolState::ShuttingDown => return Err(SsrError::PoolShutdown),
            PoolState::Uninitialized | PoolState::Warming => {}
        }

        self.set_state(PoolState::Warming);
        let wanted = self.inner.config.min_instances;
        let start = Instant::now();
        tracing::info!(min_instances = wanted, "Warming up render pool");

        let results = join_all((0..wanted).map(|_| self.create_context())).await;
        let mut ready = 0;
        for result in results {
            match result {
                Ok(context) => {
                    if self.admit(context, false).await {
                        ready += 1;
                    }
                }
                Err(e) => tracing::warn!(error = %e, "Render context creation failed during warm-up"),
            }
        }

        if self.is_shutting_down() {
            return Err(SsrError::PoolShutdown);
        }
        if ready == 0 {
            self.set_state(PoolState::Uninitialized);
            tracing::error!("Render pool warm-up produced no contexts");
            return Err(SsrError::NoContexts);
        }

        self.set_state(PoolState::Ready);
        tracing::info!(
            ready,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Render pool ready"
        );
        if ready < wanted {
            self.backfill();
        }
        Ok(())
    }

    /// Take a context, waiting for one to become idle.
    ///
    /// Waiters are served in the order they called `acquire`. The returned
    /// context's use count already includes this acquisition. Call
    /// [`RenderPool::init`] first; an uninitialized pool has nothing to hand
    /// out.
    pub async fn acquire(&self) -> Result<PooledContext> {
        if self.is_shutting_down() {
            return Err(SsrError::PoolShutdown);
        }

        let mut context = self.inner.queue.dequeue().await.map_err(|e| match e {
            SsrError::QueueClosed => SsrError::PoolShutdown,
            other => other,
        })?;
        context.uses += 1;

        tracing::trace!(context_id = %context.id, uses = context.uses, "Render context acquired");
        Ok(context)
    }

    /// [`RenderPool::acquire`] bounded by `timeout`.
    ///
    /// Giving up never loses a context: one handed over at the deadline goes
    /// to the next waiter.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<PooledContext> {
        match tokio::time::timeout(timeout, self.acquire()).await {
            Ok(result) => result,
            Err(_) => Err(SsrError::AcquireTimeout(timeout.as_millis() as u64)),
        }
    }

    /// Return a context to the pool.
    ///
    /// Unusable contexts and contexts at `max_uses` are recycled.
    /// Everything else is cleared of injected data before it becomes idle
    /// again; a context that cannot be cleared is recycled instead.
    pub async fn release(&self, context: PooledContext) {
        if self.is_shutting_down() || !self.is_member(context.id) {
            self.discard(context).await;
            return;
        }

        if !context.is_usable() {
            self.recycle(context, "context unresponsive").await;
            return;
        }

        if context.uses >= self.inner.config.max_uses {
            self.recycle(context, "max uses reached").await;
            return;
        }

        if let Err(e) = context.clear_injected().await {
            tracing::warn!(context_id = %context.id, error = %e, "Failed to clear render context");
            self.recycle(context, "clear failed").await;
            return;
        }

        let (id, uses) = (context.id, context.uses);
        match self.inner.queue.try_enqueue(context) {
            Ok(()) => tracing::trace!(context_id = %id, uses, "Render context released"),
            // Shutdown closed the queue after the state check above.
            Err(context) => self.discard(context).await,
        }
    }

    /// Stop handing out contexts and close every idle one.
    ///
    /// Contexts still checked out are closed when released.
    pub async fn shutdown(&self) {
        {
            let mut state = lock(&self.inner.state);
            if *state == PoolState::ShuttingDown {
                return;
            }
            *state = PoolState::ShuttingDown;
        }

        self.inner.queue.close();
        lock(&self.inner.membership).ids.clear();

        let idle = self.inner.queue.drain_idle();
        let closed = idle.len();
        join_all(idle.into_iter().map(|context| self.discard(context))).await;

        tracing::info!(closed, "Render pool shut down");
    }

    /// Pool statistics (passive - no I/O).
    pub fn stats(&self) -> PoolStats {
        let (live, pending) = {
            let membership = lock(&self.inner.membership);
            (membership.ids.len(), membership.pending)
        };
        let idle = self.inner.queue.idle_len();

        PoolStats {
            state: self.state(),
            min_instances: self.inner.config.min_instances,
            max_uses: self.inner.config.max_uses,
            live,
            idle,
            in_use: live.saturating_sub(idle),
            pending,
            waiting: self.inner.queue.waiting_len(),
            created_total: self.inner.created_total.load(Ordering::Relaxed),
            recycled_total: self.inner.recycled_total.load(Ordering::Relaxed),
            failed_creations: self.inner.failed_creations.load(Ordering::Relaxed),
        }
    }

    /// Active health check - verifies a context can serialize a document.
    ///
    /// Acquires a context within 5s, serializes it within another 5s, and
    /// releases it. A context that answers late or with an error yields an
    /// unhealthy status; only an acquire timeout is an `Err`.
    pub async fn health_check(&self) -> Result<HealthStatus> {
        let start = Instant::now();

        if self.state() != PoolState::Ready {
            return Ok(HealthStatus {
                healthy: false,
                latency_ms: 0,
                context_id: None,
                stats: self.stats(),
                error: Some(format!("pool is {:?}", self.state())),
            });
        }

        let context = self.acquire_timeout(HEALTH_TIMEOUT).await?;
        let context_id = context.id;
        let probe = tokio::time::timeout(HEALTH_TIMEOUT, context.serialize()).await;
        self.release(context).await;

        let latency_ms = start.elapsed().as_millis() as u64;
        match probe {
            Ok(Ok(_html)) => Ok(HealthStatus {
                healthy: true,
                latency_ms,
                context_id: Some(context_id),
                stats: self.stats(),
                error: None,
            }),
            Ok(Err(e)) => Ok(HealthStatus {
                healthy: false,
                latency_ms,
                context_id: Some(context_id),
                stats: self.stats(),
                error: Some(e.to_string()),
            }),
            Err(_) => Ok(HealthStatus {
                healthy: false,
                latency_ms,
                context_id: Some(context_id),
                stats: self.stats(),
                error: Some(format!(
                    "context did not serialize within {}ms",
                    HEALTH_TIMEOUT.as_millis()
                )),
            }),
        }
    }

    fn is_member(&self, id: Uuid) -> bool {
        lock(&self.inner.membership).ids.contains(&id)
    }

    async fn create_context(&self) -> Result<PooledContext> {
        match self
            .inner
            .factory
            .create(&self.inner.config.base_url)
            .await
        {
            Ok(context) => {
                self.inner.created_total.fetch_add(1, Ordering::Relaxed);
                let context = PooledContext::new(context);
                tracing::debug!(context_id = %context.id, "Render context created");
                Ok(context)
            }
            Err(e) => {
                self.inner.failed_creations.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Register a fresh context and make it idle.
    ///
    /// `reserved` releases a backfill reservation in the same step. Returns
    /// `false` (closing the context) once the pool is shutting down.
    async fn admit(&self, context: PooledContext, reserved: bool) -> bool {
        let rejected = {
            let mut membership = lock(&self.inner.membership);
            if reserved {
                membership.pending = membership.pending.saturating_sub(1);
            }
            if self.is_shutting_down() {
                Some(context)
            } else {
                membership.ids.insert(context.id);
                self.inner.queue.try_enqueue(context).err()
            }
        };

        match rejected {
            Some(context) => {
                self.discard(context).await;
                false
            }
            None => true,
        }
    }

    /// Close a context that will never be reused.
    async fn discard(&self, context: PooledContext) {
        lock(&self.inner.membership).ids.remove(&context.id);
        if let Err(e) = context.close().await {
            tracing::warn!(context_id = %context.id, error = %e, "Failed to close render context");
        }
    }

    async fn recycle(&self, context: PooledContext, reason: &'static str) {
        self.inner.recycled_total.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            context_id = %context.id,
            uses = context.uses,
            age_ms = context.age().as_millis() as u64,
            reason,
            "Recycling render context"
        );
        self.discard(context).await;
        self.backfill();
    }

    /// Schedule creations for every missing context.
    ///
    /// Each creation retries after [`REPLACEMENT_RETRY_DELAY`] until it
    /// succeeds or the pool shuts down; the releasing caller never waits.
    fn backfill(&self) {
        if self.is_shutting_down() {
            return;
        }

        let deficit = {
            let mut membership = lock(&self.inner.membership);
            let deficit = self
                .inner
                .config
                .min_instances
                .saturating_sub(membership.ids.len() + membership.pending);
            membership.pending += deficit;
            deficit
        };

        for _ in 0..deficit {
            let pool = self.clone();
            tokio::spawn(async move { pool.create_replacement().await });
        }
    }

    async fn create_replacement(&self) {
        loop {
            if self.is_shutting_down() {
                let mut membership = lock(&self.inner.membership);
                membership.pending = membership.pending.saturating_sub(1);
                return;
            }

            match self.create_context().await {
                Ok(context) => {
                    self.admit(context, true).await;
                    return;
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = REPLACEMENT_RETRY_DELAY.as_millis() as u64,
                        "Failed to create replacement render context"
                    );
                    tokio::time::sleep(REPLACEMENT_RETRY_DELAY).await;
                }
            }
        }
    }
}

/// Pool statistics (passive data).
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    pub state: PoolState,
    pub min_instances: usize,
    pub max_uses: u32,
    /// Contexts currently owned by the pool (idle or checked out).
    pub live: usize,
    pub idle: usize,
    pub in_use: usize,
    /// Replacements being created.
    pub pending: usize,
    /// Callers suspended in `acquire`.
    pub waiting: usize,
    pub created_total: u64,
    pub recycled_total: u64,
    pub failed_creations: u64,
}

/// Health check result.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_id: Option<Uuid>,
    pub stats: PoolStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::Rng;

    use super::*;
    use crate::testing::{ContextBehavior, ScriptedFactory};
    use prerender_ssr_core::HydrationPayload;

    fn pool_with(min_instances: usize, max_uses: u32, factory: &ScriptedFactory) -> RenderPool {
        let config = PoolConfig::new(
            "dist",
            "index.html",
            min_instances,
            max_uses,
            "http://localhost/",
            "test",
        )
        .unwrap();
        RenderPool::new(config, Arc::new(factory.clone()))
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..1_000 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_init_creates_min_instances_once() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(3, 10, &factory);
        assert_eq!(pool.state(), PoolState::Uninitialized);

        pool.init().await.unwrap();
        pool.init().await.unwrap();

        assert_eq!(pool.state(), PoolState::Ready);
        assert_eq!(factory.created(), 3);
        let stats = pool.stats();
        assert_eq!(stats.live, 3);
        assert_eq!(stats.idle, 3);
    }

    #[tokio::test]
    async fn test_concurrent_init_warms_once() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(2, 10, &factory);

        let results = join_all((0..8).map(|_| pool.init())).await;
        assert!(results.iter().all(Result::is_ok));
        assert_eq!(factory.created(), 2);
    }

    #[tokio::test]
    async fn test_init_without_any_context_is_retryable() {
        let factory = ScriptedFactory::new();
        factory.fail_next(2);
        let pool = pool_with(2, 10, &factory);

        assert!(matches!(pool.init().await, Err(SsrError::NoContexts)));
        assert_eq!(pool.state(), PoolState::Uninitialized);

        pool.init().await.unwrap();
        assert_eq!(pool.state(), PoolState::Ready);
        assert_eq!(pool.stats().live, 2);
    }

    #[tokio::test]
    async fn test_partial_warm_up_backfills() {
        let factory = ScriptedFactory::new();
        factory.fail_next(1);
        let pool = pool_with(3, 10, &factory);

        pool.init().await.unwrap();
        assert!(pool.stats().live >= 2);
        wait_until(|| pool.stats().live == 3).await;
        assert_eq!(pool.stats().pending, 0);
    }

    #[tokio::test]
    async fn test_excess_acquirers_wait_in_fifo_order() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(2, 100, &factory);
        pool.init().await.unwrap();

        let first = pool.acquire().await.unwrap();
        let second = pool.acquire().await.unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut waiters = Vec::new();
        for i in 0..3 {
            let task_pool = pool.clone();
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                let context = task_pool.acquire().await.unwrap();
                order.lock().unwrap().push(i);
                context
            }));
            wait_until(|| pool.stats().waiting == i + 1).await;
        }
        assert!(order.lock().unwrap().is_empty());

        pool.release(first).await;
        pool.release(second).await;
        wait_until(|| order.lock().unwrap().len() == 2).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1]);

        let served = waiters.remove(0).await.unwrap();
        pool.release(served).await;
        wait_until(|| order.lock().unwrap().len() == 3).await;
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);

        for waiter in waiters {
            pool.release(waiter.await.unwrap()).await;
        }
    }

    #[tokio::test]
    async fn test_acquire_timeout_falls_back_without_losing_contexts() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(1, 100, &factory);
        pool.init().await.unwrap();

        let held = pool.acquire().await.unwrap();
        let result = pool.acquire_timeout(Duration::from_millis(20)).await;
        assert!(matches!(result, Err(SsrError::AcquireTimeout(20))));

        pool.release(held).await;
        let again = pool.acquire_timeout(Duration::from_millis(20)).await.unwrap();
        assert_eq!(again.uses(), 2);
        pool.release(again).await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_no_context_is_held_twice_under_random_load() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(3, 7, &factory);
        pool.init().await.unwrap();
        let held = Arc::new(Mutex::new(HashSet::new()));

        let mut tasks = Vec::new();
        for _ in 0..24 {
            let pool = pool.clone();
            let held = Arc::clone(&held);
            tasks.push(tokio::spawn(async move {
                for _ in 0..10 {
                    let context = pool.acquire().await.unwrap();
                    assert!(
                        held.lock().unwrap().insert(context.id()),
                        "context {} held twice",
                        context.id()
                    );
                    assert!(context.uses() <= 7);

                    let pause = rand::rng().random_range(0..300);
                    tokio::time::sleep(Duration::from_micros(pause)).await;

                    held.lock().unwrap().remove(&context.id());
                    pool.release(context).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        wait_until(|| pool.stats().live == 3 && pool.stats().pending == 0).await;
    }

    #[tokio::test]
    async fn test_recycled_context_is_never_returned_again() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(1, 2, &factory);
        pool.init().await.unwrap();

        let context = pool.acquire().await.unwrap();
        let recycled_id = context.id();
        pool.release(context).await;
        let context = pool.acquire().await.unwrap();
        assert_eq!(context.id(), recycled_id);
        assert_eq!(context.uses(), 2);
        pool.release(context).await;

        assert!(factory.contexts()[0].is_closed());
        let replacement = pool.acquire_timeout(Duration::from_secs(1)).await.unwrap();
        assert_ne!(replacement.id(), recycled_id);
        assert_eq!(replacement.uses(), 1);
        assert_eq!(pool.stats().recycled_total, 1);
        pool.release(replacement).await;
    }

    #[tokio::test]
    async fn test_sequential_cycles_recycle_at_max_uses() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(2, 3, &factory);
        pool.init().await.unwrap();

        let mut seen = HashSet::new();
        for _ in 0..10 {
            let context = pool.acquire_timeout(Duration::from_secs(1)).await.unwrap();
            // Count before this acquisition was below the limit
            assert!(context.uses() - 1 < 3);
            seen.insert(context.id());
            pool.release(context).await;
        }

        assert!(seen.len() >= 3);
        assert!(factory.created() >= 3);
    }

    #[tokio::test]
    async fn test_injected_data_does_not_survive_release() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(1, 10, &factory);
        pool.init().await.unwrap();

        let context = pool.acquire().await.unwrap();
        let payload = HydrationPayload::new(serde_json::json!({ "id": 1 })).unwrap();
        context.inject(&payload).await.unwrap();
        assert!(context.serialize().await.unwrap().contains(r#"{"id":1}"#));
        let first_id = context.id();
        pool.release(context).await;

        let context = pool.acquire().await.unwrap();
        assert_eq!(context.id(), first_id);
        assert!(!context.serialize().await.unwrap().contains("__PRERENDER_DATA__"));
        assert_eq!(factory.contexts()[0].injected(), None);
        pool.release(context).await;
    }

    #[tokio::test]
    async fn test_failed_clear_recycles_context() {
        let factory = ScriptedFactory::new().with_behavior(ContextBehavior {
            fail_clear: true,
            ..ContextBehavior::default()
        });
        let pool = pool_with(1, 10, &factory);
        pool.init().await.unwrap();

        let context = pool.acquire().await.unwrap();
        let stale_id = context.id();
        pool.release(context).await;

        let replacement = pool.acquire_timeout(Duration::from_secs(1)).await.unwrap();
        assert_ne!(replacement.id(), stale_id);
        assert!(factory.contexts()[0].is_closed());
    }

    #[tokio::test]
    async fn test_unusable_context_is_recycled() {
        let factory = ScriptedFactory::new().with_behavior(ContextBehavior {
            wedge_on_navigate: true,
            ..ContextBehavior::default()
        });
        let pool = pool_with(1, 10, &factory);
        pool.init().await.unwrap();

        let context = pool.acquire().await.unwrap();
        let hung_id = context.id();
        assert!(matches!(
            context.navigate("http://localhost/about", "about").await,
            Err(SsrError::CommandTimeout(_))
        ));
        assert!(!context.is_usable());
        pool.release(context).await;

        assert!(factory.contexts()[0].is_closed());
        assert_eq!(pool.stats().recycled_total, 1);
        let replacement = pool.acquire_timeout(Duration::from_secs(1)).await.unwrap();
        assert_ne!(replacement.id(), hung_id);
        pool.release(replacement).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_replacement_is_retried() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(1, 1, &factory);
        pool.init().await.unwrap();

        factory.fail_next(2);
        let context = pool.acquire().await.unwrap();
        pool.release(context).await;

        let replacement = pool.acquire_timeout(Duration::from_secs(5)).await.unwrap();
        assert_eq!(replacement.uses(), 1);
        assert_eq!(pool.stats().failed_creations, 2);
        assert_eq!(factory.created(), 2);
    }

    #[tokio::test]
    async fn test_shutdown_closes_contexts_and_rejects_acquire() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(2, 10, &factory);
        pool.init().await.unwrap();

        let held = pool.acquire().await.unwrap();
        pool.shutdown().await;

        assert_eq!(pool.state(), PoolState::ShuttingDown);
        assert!(matches!(pool.acquire().await, Err(SsrError::PoolShutdown)));
        assert!(matches!(pool.init().await, Err(SsrError::PoolShutdown)));

        pool.release(held).await;
        assert!(factory.contexts().iter().all(|c| c.is_closed()));
        assert_eq!(pool.stats().live, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shutdown_during_replacements_closes_every_context() {
        for _ in 0..20 {
            let factory = ScriptedFactory::new();
            let pool = pool_with(4, 1, &factory);
            pool.init().await.unwrap();

            let mut tasks = Vec::new();
            for _ in 0..8 {
                let pool = pool.clone();
                tasks.push(tokio::spawn(async move {
                    while let Ok(context) = pool.acquire().await {
                        tokio::task::yield_now().await;
                        pool.release(context).await;
                    }
                }));
            }

            let pause = rand::rng().random_range(0..2_000);
            tokio::time::sleep(Duration::from_micros(pause)).await;
            pool.shutdown().await;
            for task in tasks {
                task.await.unwrap();
            }

            wait_until(|| {
                pool.stats().pending == 0 && factory.contexts().iter().all(|c| c.is_closed())
            })
            .await;
            assert_eq!(pool.stats().idle, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_check_reports_slow_context_unhealthy() {
        let factory = ScriptedFactory::new().with_behavior(ContextBehavior {
            latency: HEALTH_TIMEOUT + Duration::from_secs(1),
            ..ContextBehavior::default()
        });
        let pool = pool_with(1, 10, &factory);
        pool.init().await.unwrap();

        let status = pool.health_check().await.unwrap();
        assert!(!status.healthy);
        assert!(status.error.unwrap().contains("did not serialize"));
        assert!(status.context_id.is_some());
        assert_eq!(pool.stats().idle, 1);
    }

    #[tokio::test]
    async fn test_health_check() {
        let factory = ScriptedFactory::new();
        let pool = pool_with(1, 10, &factory);

        let status = pool.health_check().await.unwrap();
        assert!(!status.healthy);

        pool.init().await.unwrap();
        let status = pool.health_check().await.unwrap();
        assert!(status.healthy);
        assert!(status.context_id.is_some());
        assert_eq!(status.stats.idle, 1);
    }
}
