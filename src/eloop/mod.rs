//! Cooperative single-consumer event loop.
//!
//! One worker task owns an [`EventLoop`] and calls [`EventLoop::run`]. Every
//! handler runs to completion on that worker before the next message is
//! taken, so the dispatch context `C` is never touched concurrently. Other
//! tasks and threads hold an [`EloopHandle`] and interact with the loop only
//! by sending messages and registering or cancelling timeouts.
//!
//! # Loop algorithm
//!
//! 1. Peek the earliest timeout and compute the time remaining.
//! 2. If it is already due, yield once instead of blocking.
//! 3. Otherwise wait for a message (bounded by the remaining time, or
//!    forever with no timeout pending) and dispatch it.
//! 4. Fire at most one due timeout, removing it before its handler runs.
//!
//! # Example
//!
//! ```
//! use wifi_connmgr::eloop::{Ctx, Dispatch, EloopHandle, EventLoop, Message};
//!
//! #[derive(Debug, Clone, Copy, PartialEq, Eq)]
//! enum Handler { Tick }
//!
//! struct Counter(u32);
//!
//! impl Dispatch for Counter {
//!     type Handler = Handler;
//!     fn on_event(&mut self, _: Handler, _: Message, _: Ctx, _: Ctx, _: &EloopHandle<Handler>) {}
//!     fn on_timeout(&mut self, _: Handler, _: Ctx, _: Ctx, eloop: &EloopHandle<Handler>) {
//!         self.0 += 1;
//!         if self.0 == 3 {
//!             eloop.terminate().ok();
//!         } else {
//!             eloop.register_timeout(10, Handler::Tick, Ctx::NONE, Ctx::NONE).ok();
//!         }
//!     }
//! }
//!
//! # tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap().block_on(async {
//! let mut eloop = EventLoop::new(4, |_| Counter(0));
//! eloop.init(Vec::new()).unwrap();
//! eloop.handle().register_timeout(10, Handler::Tick, Ctx::NONE, Ctx::NONE).unwrap();
//! eloop.run().await.unwrap();
//! assert_eq!(eloop.context().0, 3);
//! eloop.destroy();
//! # });
//! ```

mod clock;
mod message;
mod registry;

pub use clock::{Clock, Tick};
pub use message::{Ctx, CtxMatch, EventId, Message};
pub use registry::{Binding, Registry, Timeout};

use log::{debug, info, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Handlers invoked by the loop.
///
/// Handler identities are small `Copy` values (usually an enum) rather than
/// function pointers; the implementor maps them to code.
pub trait Dispatch: Send + 'static {
    type Handler: Copy + PartialEq + fmt::Debug + Send + 'static;

    /// Called for a message matching a binding of `handler`.
    fn on_event(
        &mut self,
        handler: Self::Handler,
        msg: Message,
        ctx1: Ctx,
        ctx2: Ctx,
        eloop: &EloopHandle<Self::Handler>,
    );

    /// Called when a timeout registered for `handler` fires.
    fn on_timeout(
        &mut self,
        handler: Self::Handler,
        ctx1: Ctx,
        ctx2: Ctx,
        eloop: &EloopHandle<Self::Handler>,
    );
}

/// Errors reported by the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EloopError {
    /// `init` called twice without `destroy`.
    AlreadyInitialized,
    /// `run` called before `init`.
    NotInitialized,
    /// The loop has processed a terminate request.
    Terminating,
    /// The message queue is full; try again later.
    QueueFull,
    /// The consuming side is gone.
    Closed,
}

impl fmt::Display for EloopError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "event loop already initialized"),
            Self::NotInitialized => write!(f, "event loop not initialized"),
            Self::Terminating => write!(f, "event loop is terminating"),
            Self::QueueFull => write!(f, "event loop queue full"),
            Self::Closed => write!(f, "event loop closed"),
        }
    }
}

impl std::error::Error for EloopError {}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Critical sections never leave the registry half-updated.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Send-only side of the loop, independent of the handler type.
///
/// Driver callbacks and the shell use this to post messages.
#[derive(Clone)]
pub struct EloopSender {
    tx: mpsc::Sender<Message>,
    terminated: Arc<AtomicBool>,
}

impl EloopSender {
    pub fn send_message(&self, event: EventId, reason: u16) -> Result<(), EloopError> {
        if self.terminated.load(Ordering::Acquire) {
            return Err(EloopError::Terminating);
        }
        self.tx
            .try_send(Message::new(event, reason))
            .map_err(|e| match e {
                TrySendError::Full(_) => EloopError::QueueFull,
                TrySendError::Closed(_) => EloopError::Closed,
            })
    }

    pub fn send_event(&self, event: EventId) -> Result<(), EloopError> {
        self.send_message(event, 0)
    }

    /// Ask the loop to stop once everything queued ahead has been handled.
    pub fn terminate(&self) -> Result<(), EloopError> {
        self.send_event(EventId::TERMINATE)
    }

    pub fn terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }
}

impl fmt::Debug for EloopSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EloopSender")
            .field("terminated", &self.terminated())
            .finish()
    }
}

struct Shared<H> {
    registry: Mutex<Registry<H>>,
    clock: Clock,
}

/// Thread-safe handle to a running loop.
pub struct EloopHandle<H> {
    sender: EloopSender,
    shared: Arc<Shared<H>>,
}

impl<H> Clone for EloopHandle<H> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<H: Copy + PartialEq + fmt::Debug> EloopHandle<H> {
    pub fn sender(&self) -> EloopSender {
        self.sender.clone()
    }

    pub fn now(&self) -> Tick {
        self.shared.clock.now()
    }

    pub fn send_message(&self, event: EventId, reason: u16) -> Result<(), EloopError> {
        self.sender.send_message(event, reason)
    }

    pub fn send_event(&self, event: EventId) -> Result<(), EloopError> {
        self.sender.send_event(event)
    }

    pub fn terminate(&self) -> Result<(), EloopError> {
        self.sender.terminate()
    }

    pub fn terminated(&self) -> bool {
        self.sender.terminated()
    }

    /// Bind `handler` to `event` until [`unregister_event`](Self::unregister_event).
    pub fn register_event(
        &self,
        event: EventId,
        handler: H,
        ctx1: Ctx,
        ctx2: Ctx,
    ) -> Result<(), EloopError> {
        if self.terminated() {
            return Err(EloopError::Terminating);
        }
        lock(&self.shared.registry).add_binding(Binding::with_ctx(event, handler, ctx1, ctx2));
        Ok(())
    }

    /// Remove the first dynamic binding for `event`, if any.
    pub fn unregister_event(&self, event: EventId) {
        if !lock(&self.shared.registry).remove_binding(event) {
            debug!("eloop: no binding for {} to remove", event);
        }
    }

    pub fn is_event_registered(&self, event: EventId, handler: H) -> bool {
        lock(&self.shared.registry).is_bound(event, handler)
    }

    /// Schedule `handler` to fire `delay_ms` from now.
    pub fn register_timeout(
        &self,
        delay_ms: u32,
        handler: H,
        ctx1: Ctx,
        ctx2: Ctx,
    ) -> Result<(), EloopError> {
        if self.terminated() {
            return Err(EloopError::Terminating);
        }
        let fire_at = self.now().after(delay_ms);
        lock(&self.shared.registry).insert_timeout(Timeout {
            fire_at,
            handler,
            ctx1,
            ctx2,
        });
        Ok(())
    }

    /// Cancel every timeout of `handler` whose contexts match. Returns the
    /// number of timeouts removed.
    pub fn cancel_timeout(
        &self,
        handler: H,
        ctx1: impl Into<CtxMatch>,
        ctx2: impl Into<CtxMatch>,
    ) -> usize {
        lock(&self.shared.registry).cancel(handler, ctx1.into(), ctx2.into())
    }

    pub fn is_timeout_registered(&self, handler: H, ctx1: Ctx, ctx2: Ctx) -> bool {
        lock(&self.shared.registry).contains(handler, ctx1, ctx2)
    }

    pub fn pending_timeouts(&self) -> usize {
        lock(&self.shared.registry).timeout_count()
    }

    /// Milliseconds until the earliest timeout, `None` if none is pending.
    fn next_timeout_in(&self) -> Option<u32> {
        let now = self.now();
        lock(&self.shared.registry)
            .next_deadline()
            .map(|at| at.remaining(now))
    }

    fn pop_due(&self) -> Option<Timeout<H>> {
        let now = self.now();
        lock(&self.shared.registry).pop_due(now)
    }
}

/// The event loop and the dispatch context it drives.
pub struct EventLoop<C: Dispatch> {
    ctx: C,
    handle: EloopHandle<C::Handler>,
    rx: mpsc::Receiver<Message>,
    initialized: bool,
}

impl<C: Dispatch> EventLoop<C> {
    /// Create a loop whose queue holds `queue_depth` messages. The context is
    /// built from the loop's handle so it can keep one for itself.
    pub fn new(queue_depth: usize, build: impl FnOnce(&EloopHandle<C::Handler>) -> C) -> Self {
        Self::with_clock(queue_depth, Clock::new(), build)
    }

    pub fn with_clock(
        queue_depth: usize,
        clock: Clock,
        build: impl FnOnce(&EloopHandle<C::Handler>) -> C,
    ) -> Self {
        let (tx, rx) = mpsc::channel(queue_depth.max(1));
        let handle = EloopHandle {
            sender: EloopSender {
                tx,
                terminated: Arc::new(AtomicBool::new(false)),
            },
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry::new()),
                clock,
            }),
        };
        let ctx = build(&handle);
        Self {
            ctx,
            handle,
            rx,
            initialized: false,
        }
    }

    /// Reset the registry and install the static bindings.
    pub fn init(&mut self, static_bindings: Vec<Binding<C::Handler>>) -> Result<(), EloopError> {
        if self.initialized {
            return Err(EloopError::AlreadyInitialized);
        }
        let mut registry = lock(&self.handle.shared.registry);
        registry.clear();
        registry.set_static_bindings(static_bindings);
        drop(registry);
        self.handle.sender.terminated.store(false, Ordering::Release);
        self.initialized = true;
        Ok(())
    }

    pub fn handle(&self) -> EloopHandle<C::Handler> {
        self.handle.clone()
    }

    pub fn context(&self) -> &C {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut C {
        &mut self.ctx
    }

    pub fn terminated(&self) -> bool {
        self.handle.terminated()
    }

    /// Run until a terminate message is dispatched.
    pub async fn run(&mut self) -> Result<(), EloopError> {
        if !self.initialized {
            return Err(EloopError::NotInitialized);
        }
        info!("eloop: running");
        while !self.terminated() {
            match self.handle.next_timeout_in() {
                Some(0) => tokio::task::yield_now().await,
                Some(ms) => {
                    let wait = Duration::from_millis(u64::from(ms));
                    if let Ok(msg) = tokio::time::timeout(wait, self.rx.recv()).await {
                        self.dispatch(msg.ok_or(EloopError::Closed)?);
                    }
                }
                None => {
                    let msg = self.rx.recv().await.ok_or(EloopError::Closed)?;
                    self.dispatch(msg);
                }
            }
            if self.terminated() {
                break;
            }
            self.fire_due();
        }
        info!("eloop: terminated");
        Ok(())
    }

    /// Dispatch one message to its bindings.
    pub fn dispatch(&mut self, msg: Message) {
        match msg.event {
            EventId::WAKEUP => {}
            EventId::TERMINATE => {
                debug!("eloop: terminate requested");
                self.handle.sender.terminated.store(true, Ordering::Release);
            }
            event => {
                let targets = lock(&self.handle.shared.registry).targets(event);
                if targets.is_empty() {
                    debug!("eloop: no handler for {}", event);
                }
                for b in targets {
                    self.ctx.on_event(b.handler, msg, b.ctx1, b.ctx2, &self.handle);
                }
            }
        }
    }

    /// Dispatch every message already queued without waiting. Stops early on
    /// terminate. Returns the number of messages taken off the queue.
    pub fn run_pending(&mut self) -> usize {
        let mut taken = 0;
        while !self.terminated() {
            match self.rx.try_recv() {
                Ok(msg) => {
                    taken += 1;
                    self.dispatch(msg);
                }
                Err(_) => break,
            }
        }
        taken
    }

    /// Fire the earliest timeout if it is due. Returns whether one fired.
    pub fn fire_due(&mut self) -> bool {
        match self.handle.pop_due() {
            Some(t) => {
                self.ctx.on_timeout(t.handler, t.ctx1, t.ctx2, &self.handle);
                true
            }
            None => false,
        }
    }

    /// Drop queued messages and pending timeouts and release all bindings.
    ///
    /// Must not race with [`run`](Self::run); `&mut self` enforces that.
    pub fn destroy(&mut self) {
        let mut flushed = 0;
        while self.rx.try_recv().is_ok() {
            flushed += 1;
        }
        if flushed > 0 {
            debug!("eloop: flushed {} queued messages", flushed);
        }

        let now = self.handle.now();
        let dropped = lock(&self.handle.shared.registry).clear();
        for t in &dropped {
            warn!(
                "eloop: dropping timeout {:?} ({:?}, {:?}) due in {} ms",
                t.handler,
                t.ctx1,
                t.ctx2,
                t.fire_at.remaining(now)
            );
        }
        self.initialized = false;
    }
}
