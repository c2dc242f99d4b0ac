// Request orchestration: sub-batch sizing and the fallback-chain dispatcher

pub mod batch_optimizer;
pub mod dispatcher;
pub mod state;

pub use batch_optimizer::{BatchOptimizer, LoadHint};
pub use dispatcher::Dispatcher;
pub use state::DispatchState;
