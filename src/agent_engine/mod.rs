pub mod clock;
pub mod event_bus;
pub mod history;
pub mod interaction;
pub mod liveness;
pub mod loop_control;
pub mod session;
pub mod state;
