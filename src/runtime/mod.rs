//! Runtime controller and the negotiation of interactive decisions.

pub mod controller;
pub mod negotiation;

pub use controller::{
    ControllerDependencies, ControllerState, ProgressObserver, RuntimeController, RuntimeEvent,
};
pub use negotiation::SessionNegotiator;
