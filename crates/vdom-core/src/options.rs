//! Renderer configuration and observation points.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::element::Element;
use crate::instance::ComponentInstance;

/// Fallback delay before passive effects run when no presentation signal
/// arrives.
pub const DEFAULT_PASSIVE_EFFECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Upper bound on consecutive render queue passes.
pub const DEFAULT_MAX_QUEUE_PASSES: usize = 100;

/// Options used to configure a renderer's runtime.
#[derive(Debug, Clone)]
pub struct RendererOptions {
    passive_effect_timeout: Duration,
    skip_effects: bool,
    max_queue_passes: usize,
}

impl Default for RendererOptions {
    fn default() -> Self {
        Self {
            passive_effect_timeout: DEFAULT_PASSIVE_EFFECT_TIMEOUT,
            skip_effects: false,
            max_queue_passes: DEFAULT_MAX_QUEUE_PASSES,
        }
    }
}

impl RendererOptions {
    /// Sets the fallback timeout for the passive effect flush.
    pub fn with_passive_effect_timeout(mut self, timeout: Duration) -> Self {
        self.passive_effect_timeout = timeout;
        self
    }

    /// When set, effect and layout effect hooks never record callbacks.
    pub fn with_skip_effects(mut self, skip: bool) -> Self {
        self.skip_effects = skip;
        self
    }

    /// Sets how many passes the render queue may take before giving up.
    pub fn with_max_queue_passes(mut self, passes: usize) -> Self {
        self.max_queue_passes = passes.max(1);
        self
    }

    pub fn passive_effect_timeout(&self) -> Duration {
        self.passive_effect_timeout
    }

    pub fn skip_effects(&self) -> bool {
        self.skip_effects
    }

    pub fn max_queue_passes(&self) -> usize {
        self.max_queue_passes
    }
}

/// Kind reported to the hook observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    State,
    Reducer,
    Effect,
    LayoutEffect,
    Memo,
    Callback,
    Ref,
    ImperativeHandle,
    Context,
    ErrorBoundary,
}

impl HookKind {
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::State => "state",
            HookKind::Reducer => "reducer",
            HookKind::Effect => "effect",
            HookKind::LayoutEffect => "layout effect",
            HookKind::Memo => "memo",
            HookKind::Callback => "callback",
            HookKind::Ref => "ref",
            HookKind::ImperativeHandle => "imperative handle",
            HookKind::Context => "context",
            HookKind::ErrorBoundary => "error boundary",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type ElementObserver = Rc<dyn Fn(&Element)>;
type InstanceObserver = Rc<dyn Fn(&ComponentInstance)>;
type CommitObserver = Rc<dyn Fn(&Element, usize)>;
type HookObserver = Rc<dyn Fn(&ComponentInstance, usize, HookKind)>;
type DebugValueObserver = Rc<dyn Fn(&ComponentInstance, &str)>;

/// Purely observational callbacks. None of them can change the outcome of
/// a render.
#[derive(Clone, Default)]
pub struct Observers {
    pub(crate) before_diff: Option<ElementObserver>,
    pub(crate) before_render: Option<InstanceObserver>,
    pub(crate) after_diff: Option<ElementObserver>,
    pub(crate) commit: Option<CommitObserver>,
    pub(crate) unmount: Option<ElementObserver>,
    pub(crate) hook: Option<HookObserver>,
    pub(crate) debug_value: Option<DebugValueObserver>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before an element is compared with its previous record.
    pub fn with_before_diff(mut self, f: impl Fn(&Element) + 'static) -> Self {
        self.before_diff = Some(Rc::new(f));
        self
    }

    /// Called right before a component body is evaluated.
    pub fn with_before_render(mut self, f: impl Fn(&ComponentInstance) + 'static) -> Self {
        self.before_render = Some(Rc::new(f));
        self
    }

    /// Called after an element and its subtree have been diffed.
    pub fn with_after_diff(mut self, f: impl Fn(&Element) + 'static) -> Self {
        self.after_diff = Some(Rc::new(f));
        self
    }

    /// Called with the root element and queue length before commit callbacks run.
    pub fn with_commit(mut self, f: impl Fn(&Element, usize) + 'static) -> Self {
        self.commit = Some(Rc::new(f));
        self
    }

    pub fn with_unmount(mut self, f: impl Fn(&Element) + 'static) -> Self {
        self.unmount = Some(Rc::new(f));
        self
    }

    /// Called for every hook invocation with the slot index it resolved to.
    pub fn with_hook(mut self, f: impl Fn(&ComponentInstance, usize, HookKind) + 'static) -> Self {
        self.hook = Some(Rc::new(f));
        self
    }

    pub fn with_debug_value(mut self, f: impl Fn(&ComponentInstance, &str) + 'static) -> Self {
        self.debug_value = Some(Rc::new(f));
        self
    }
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("before_diff", &self.before_diff.is_some())
            .field("before_render", &self.before_render.is_some())
            .field("after_diff", &self.after_diff.is_some())
            .field("commit", &self.commit.is_some())
            .field("unmount", &self.unmount.is_some())
            .field("hook", &self.hook.is_some())
            .field("debug_value", &self.debug_value.is_some())
            .finish()
    }
}
