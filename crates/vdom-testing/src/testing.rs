//! Headless render harness.
//!
//! [`RenderTestRule`] owns a [`Renderer`] over a [`MemoryApplier`] and a
//! [`StdRuntime`] driven by a [`ManualClock`], so tests control when
//! queued renders run, when frames are presented, and how much time
//! passes between them.

use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use vdom_core::{
    Clock, Element, MemoryApplier, NodeId, RenderError, Renderer, RendererOptions, Runtime,
};
use vdom_runtime_std::StdRuntime;

/// Upper bound on render/present rounds in [`RenderTestRule::pump_until_idle`].
const MAX_PUMP_ROUNDS: usize = 1000;

/// Clock that only moves when told to.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn now_millis(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

impl Clock for ManualClock {
    type Instant = u64;

    fn now(&self) -> u64 {
        self.now_millis()
    }

    fn elapsed_millis(&self, since: u64) -> u64 {
        self.now_millis().saturating_sub(since)
    }
}

type Content = Rc<dyn Fn() -> Element>;

pub struct RenderTestRule {
    renderer: Renderer<MemoryApplier>,
    runtime: StdRuntime<ManualClock>,
    clock: ManualClock,
    root: NodeId,
    content: Option<Content>,
}

impl RenderTestRule {
    pub fn new() -> Self {
        Self::with_options(RendererOptions::default())
    }

    pub fn with_options(options: RendererOptions) -> Self {
        let clock = ManualClock::new();
        let runtime = StdRuntime::with_clock(clock.clone(), options);
        let mut applier = MemoryApplier::new();
        let root = applier.create_root("root");
        Self {
            renderer: Renderer::with_runtime(applier, runtime.runtime()),
            runtime,
            clock,
            root,
            content: None,
        }
    }

    /// Renders `content` into the root and keeps it for [`Self::rerender`].
    pub fn set_content(&mut self, content: impl Fn() -> Element + 'static) -> Result<(), RenderError> {
        self.content = Some(Rc::new(content));
        self.rerender()
    }

    /// Renders the stored content again from the top.
    pub fn rerender(&mut self) -> Result<(), RenderError> {
        let Some(content) = self.content.clone() else {
            return Ok(());
        };
        self.renderer.render(content(), self.root)
    }

    /// Processes queued renders and presents frames until neither has
    /// anything left to do.
    pub fn pump_until_idle(&mut self) -> Result<(), RenderError> {
        for _ in 0..MAX_PUMP_ROUNDS {
            let requested = self.runtime.take_render_request();
            let rendered = if requested || self.renderer.needs_render() {
                self.renderer.process_render_queue()?
            } else {
                0
            };
            let presented = self.runtime.present();
            if rendered == 0 && presented == 0 && !self.renderer.needs_render() {
                return Ok(());
            }
        }
        Err(RenderError::RenderLoop {
            passes: MAX_PUMP_ROUNDS,
        })
    }

    /// Signals a presented frame. Returns how many present tasks ran.
    pub fn present(&mut self) -> usize {
        self.runtime.present()
    }

    /// Moves the clock forward and runs every present task that timed out.
    pub fn advance_time(&mut self, by: Duration) -> usize {
        self.clock.advance(by);
        self.runtime.run_expired()
    }

    /// Fires `event` on `target`. Returns whether a handler ran.
    pub fn dispatch(&self, target: NodeId, event: &str) -> bool {
        self.renderer.applier().dispatch_event(target, event)
    }

    /// First text node whose content equals `text`, depth first.
    pub fn find_text(&self, text: &str) -> Option<NodeId> {
        self.find(self.root, &|applier, node| applier.text(node) == Some(text))
    }

    /// First element with tag `tag`, depth first.
    pub fn find_tag(&self, tag: &str) -> Option<NodeId> {
        self.find(self.root, &|applier, node| applier.tag(node) == Some(tag))
    }

    fn find(&self, from: NodeId, matches: &dyn Fn(&MemoryApplier, NodeId) -> bool) -> Option<NodeId> {
        let applier = self.renderer.applier();
        for child in applier.children(from) {
            if matches(applier, child) {
                return Some(child);
            }
            if let Some(found) = self.find(child, matches) {
                return Some(found);
            }
        }
        None
    }

    pub fn markup(&self) -> String {
        self.renderer.applier().inner_markup(self.root)
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    pub fn runtime(&self) -> Runtime {
        self.runtime.runtime()
    }

    pub fn renderer(&self) -> &Renderer<MemoryApplier> {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut Renderer<MemoryApplier> {
        &mut self.renderer
    }

    pub fn applier(&self) -> &MemoryApplier {
        self.renderer.applier()
    }

    pub fn applier_mut(&mut self) -> &mut MemoryApplier {
        self.renderer.applier_mut()
    }
}

impl Default for RenderTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders `content` and settles every follow-up render and effect.
pub fn run_test_render(content: impl Fn() -> Element + 'static) -> Result<RenderTestRule, RenderError> {
    let mut rule = RenderTestRule::new();
    rule.set_content(content)?;
    rule.pump_until_idle()?;
    Ok(rule)
}
