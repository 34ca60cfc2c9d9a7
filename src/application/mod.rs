pub mod validation_run;

pub use validation_run::{RunOutcome, ValidationRun};
