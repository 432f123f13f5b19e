//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform
//! abstraction traits defined in `vdom-core`. Hosts construct a
//! [`StdRuntime`], hand its [`Runtime`] to a [`vdom_core::Renderer`], and
//! then poll it from their event loop: process renders when
//! [`StdRuntime::take_render_request`] fires, call [`StdRuntime::present`]
//! after each presented frame, and [`StdRuntime::run_expired`] when
//! [`StdRuntime::next_timeout`] elapses.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use vdom_core::{Clock, PresentTask, RendererOptions, Runtime, RuntimeHandle, RuntimeScheduler};

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

struct PendingTask<I> {
    task: PresentTask,
    scheduled_at: I,
    timeout_ms: u64,
}

/// Scheduler that records render requests and holds present tasks until
/// the host signals a frame or their timeout expires.
pub struct StdScheduler<C: Clock = StdClock> {
    clock: C,
    render_requested: AtomicBool,
    waker: Mutex<Option<Waker>>,
    tasks: RefCell<Vec<PendingTask<C::Instant>>>,
}

impl StdScheduler<StdClock> {
    pub fn new() -> Self {
        Self::with_clock(StdClock)
    }
}

impl<C: Clock> StdScheduler<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            render_requested: AtomicBool::new(false),
            waker: Mutex::new(None),
            tasks: RefCell::new(Vec::new()),
        }
    }

    /// Returns whether a render was requested since the last call.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked whenever the runtime needs attention.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(waker));
    }

    pub fn clear_waker(&self) {
        *self.waker.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn wake(&self) {
        let waker = self
            .waker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(waker) = waker {
            waker();
        }
    }

    pub fn has_pending_tasks(&self) -> bool {
        !self.tasks.borrow().is_empty()
    }

    /// Runs every pending present task. Returns how many ran.
    pub fn on_present(&self) -> usize {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        let count = tasks.len();
        for pending in tasks {
            (pending.task)();
        }
        count
    }

    /// Runs the present tasks whose timeout has elapsed.
    pub fn run_expired(&self) -> usize {
        let expired: Vec<_> = {
            let mut tasks = self.tasks.borrow_mut();
            let (expired, waiting) = std::mem::take(&mut *tasks)
                .into_iter()
                .partition(|pending| self.clock.elapsed_millis(pending.scheduled_at) >= pending.timeout_ms);
            *tasks = waiting;
            expired
        };
        if !expired.is_empty() {
            log::debug!("running {} present tasks after timeout", expired.len());
        }
        let count = expired.len();
        for pending in expired {
            (pending.task)();
        }
        count
    }

    /// Time left until the earliest pending task expires.
    pub fn next_timeout(&self) -> Option<Duration> {
        self.tasks
            .borrow()
            .iter()
            .map(|pending| {
                let elapsed = self.clock.elapsed_millis(pending.scheduled_at);
                Duration::from_millis(pending.timeout_ms.saturating_sub(elapsed))
            })
            .min()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl Default for StdScheduler<StdClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> fmt::Debug for StdScheduler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdScheduler")
            .field(
                "render_requested",
                &self.render_requested.load(Ordering::SeqCst),
            )
            .field("pending_tasks", &self.tasks.borrow().len())
            .finish()
    }
}

impl<C: Clock> RuntimeScheduler for StdScheduler<C> {
    fn schedule_render(&self) {
        self.render_requested.store(true, Ordering::SeqCst);
        self.wake();
    }

    fn schedule_after_present(&self, task: PresentTask, timeout: Duration) {
        self.tasks.borrow_mut().push(PendingTask {
            task,
            scheduled_at: self.clock.now(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        });
        self.wake();
    }
}

/// Clock implementation backed by [`std::time`].
#[derive(Debug, Default, Clone, Copy)]
pub struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Self::Instant {
        Instant::now()
    }

    fn elapsed_millis(&self, since: Self::Instant) -> u64 {
        u64::try_from(since.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Convenience container bundling a scheduler and the runtime it drives.
pub struct StdRuntime<C: Clock + 'static = StdClock> {
    scheduler: Rc<StdScheduler<C>>,
    runtime: Runtime,
}

impl StdRuntime<StdClock> {
    pub fn new() -> Self {
        Self::with_options(RendererOptions::default())
    }

    pub fn with_options(options: RendererOptions) -> Self {
        Self::with_clock(StdClock, options)
    }
}

impl<C: Clock + 'static> StdRuntime<C> {
    pub fn with_clock(clock: C, options: RendererOptions) -> Self {
        let scheduler = Rc::new(StdScheduler::with_clock(clock));
        let runtime = Runtime::with_options(scheduler.clone(), options);
        Self { scheduler, runtime }
    }

    /// Returns a [`vdom_core::Runtime`] configured with the standard scheduler.
    pub fn runtime(&self) -> Runtime {
        self.runtime.clone()
    }

    pub fn runtime_handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn scheduler(&self) -> Rc<StdScheduler<C>> {
        Rc::clone(&self.scheduler)
    }

    /// Returns whether a render was requested since the last poll.
    pub fn take_render_request(&self) -> bool {
        self.scheduler.take_render_request()
    }

    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.scheduler.set_waker(waker);
    }

    pub fn clear_waker(&self) {
        self.scheduler.clear_waker();
    }

    /// Signals that the host presented a frame.
    pub fn present(&self) -> usize {
        self.scheduler.on_present()
    }

    pub fn run_expired(&self) -> usize {
        self.scheduler.run_expired()
    }

    pub fn next_timeout(&self) -> Option<Duration> {
        self.scheduler.next_timeout()
    }
}

impl<C: Clock + 'static> Clone for StdRuntime<C> {
    fn clone(&self) -> Self {
        Self {
            scheduler: Rc::clone(&self.scheduler),
            runtime: self.runtime.clone(),
        }
    }
}

impl<C: Clock + 'static> fmt::Debug for StdRuntime<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

impl Default for StdRuntime<StdClock> {
    fn default() -> Self {
        Self::new()
    }
}
