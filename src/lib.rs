pub use context::{runner_info, IsolatePolicy, RunResults, RunStatus, RunnerInfo, RunnerParams};
pub use error::{TakerError, TakerExit};
pub use runner::ProcessRunner;
pub use utils::default_format;

mod child;
mod context;
mod error;
mod guard;
mod pipe;
mod proc;
mod runner;
mod trampoline;
mod utils;
