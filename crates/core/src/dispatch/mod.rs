pub mod scheduler;
pub mod window;

pub use scheduler::{DispatchOutcome, DispatchPhase, DispatchScheduler, DispatchState, Trigger};
pub use window::SendWindow;
