pub mod run;
pub mod status;

pub use run::{Run, RunTransition};
pub use status::RunStatus;
