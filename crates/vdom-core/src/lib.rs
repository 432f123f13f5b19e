#![doc = r"Core of a virtual-DOM renderer: elements, components, hooks, the reconciler and its commit scheduler."]

extern crate self as vdom_core;

pub mod applier;
mod children;
mod commit;
pub mod component;
pub mod context;
mod diff;
pub mod element;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod options;
pub mod platform;
pub mod renderer;
pub mod runtime;
mod tree;

pub use applier::{Applier, ApplierOp, MemoryApplier, MemoryNode, MemoryNodeKind, NativeKind, NodeId};
pub use component::{
    component_fn, ClassComponent, ClassContext, ComponentType, FunctionComponent, RenderResult,
    Snapshot, StateUpdater,
};
pub use context::{create_context, ChildContext, Context, ContextId};
pub use diff::INNER_HTML;
pub use element::{
    clone_element, create_element, fragment, h, style, text, Children, Element, ElementKind, Event,
    EventHandler, Key, NodeRef, Overrides, PropValue, Props, RefValue, Style,
};
pub use error::{HookError, NodeError, RenderError};
pub use hooks::{
    use_callback, use_context, use_debug_value, use_debug_value_with, use_effect, use_effect_with,
    use_error_boundary, use_error_boundary_with, use_imperative_handle, use_layout_effect,
    use_layout_effect_with, use_memo, use_reducer, use_ref, use_state, Dispatch, IntoTeardown,
    MutableRef, ResetError, SetState, StateSetter, Teardown,
};
pub use instance::{ComponentInstance, InstanceId, RenderPhase};
pub use options::{
    HookKind, Observers, RendererOptions, DEFAULT_MAX_QUEUE_PASSES, DEFAULT_PASSIVE_EFFECT_TIMEOUT,
};
pub use platform::{Clock, PresentTask, RuntimeScheduler};
pub use renderer::Renderer;
pub use runtime::{DefaultScheduler, Runtime, RuntimeHandle};
pub use tree::RecordId;

#[cfg(test)]
mod test_support;
