use std::error::Error as StdError;
use std::rc::Rc;

use thiserror::Error;

use crate::applier::NodeId;

/// Failure reported by an [`Applier`](crate::Applier) implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NodeError {
    #[error("node {id} missing")]
    Missing { id: NodeId },
    #[error("node {id} is not an element")]
    NotAnElement { id: NodeId },
    #[error("node {child} is not a child of node {parent}")]
    NotAChild { parent: NodeId, child: NodeId },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HookError {
    /// A hook was called while no component was rendering.
    #[error("hooks can only be called while a component is rendering")]
    InvalidHookCall,
    /// The slot at `index` was allocated by a different hook on a previous render.
    #[error("hook slot {index} holds a {found} hook, expected {expected}")]
    HookKindMismatch {
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// Errors raised while rendering or committing a tree.
///
/// Component, hook and custom errors are routed to the nearest error
/// boundary. Native tree failures and scheduler guards are fatal for the
/// render pass and always reach the caller.
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error(transparent)]
    Hook(#[from] HookError),
    #[error(transparent)]
    Node(#[from] NodeError),
    #[error("{0}")]
    Component(Rc<str>),
    #[error("a render pass is already running on this runtime")]
    ReentrantRender,
    #[error("render queue did not settle after {passes} passes")]
    RenderLoop { passes: usize },
    #[error("{0}")]
    Custom(Rc<dyn StdError>),
}

impl RenderError {
    /// Builds a component error carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        RenderError::Component(Rc::from(message.into()))
    }

    /// Wraps an arbitrary error raised by user code.
    pub fn custom(error: impl StdError + 'static) -> Self {
        RenderError::Custom(Rc::new(error))
    }

    /// Fatal errors skip error boundaries.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::Node(_) | RenderError::ReentrantRender | RenderError::RenderLoop { .. }
        )
    }
}
