//! The action registry and the helpers its handlers call.

pub mod handlers;
pub mod registry;

pub use registry::{Action, ActionKind, ParamDefault, ParamSpec, tool_definitions};

/// Outcome of the decision step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Act(Action),
    NoAction,
}

impl Decision {
    /// Registry name of the chosen action, or `no_action`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Act(action) => action.name(),
            Self::NoAction => "no_action",
        }
    }
}
