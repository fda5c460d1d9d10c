//! Shared model for the remote-launch panel: roster reconciliation, per-control
//! state, the panel binding layer and the agent wire protocol.

pub mod collab;
pub mod control;
pub mod notify;
pub mod panel;
pub mod record;
pub mod roster;
pub mod runtime;
pub mod wire;

pub use collab::{
    CanvasSize, CommandTransport, ControlDirective, ControlInput, ControlRect, ControlRenderer,
    InputCapture, InputEvent, TooltipSink,
};
pub use control::{Accent, Appearance, ControlStateMachine, DisplayState};
pub use panel::{ControlView, LayoutConfig, PanelConfig, PanelContext, PanelController};
pub use record::{LaunchEntry, ProcessRecord, StartRequest, StopRequest};
pub use roster::{ClickOutcome, RosterSynchronizer, SyncError};
