// Grid trading strategy module
pub mod backoff;
pub mod decision;
pub mod grid_trading;
pub mod state;
pub mod trend;

pub use backoff::{BackoffOutcome, BackoffPolicy, BackoffTier};
pub use decision::{evaluate, Decision, DecisionInput, OrderIntent, OrderReason};
pub use grid_trading::{GridTradingProcessor, OrderOutcome, TickOutcome};
pub use state::{EngineState, ReferenceState};
pub use trend::TurningPoint;
