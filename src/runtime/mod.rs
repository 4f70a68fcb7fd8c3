// ABOUTME: Container runtime access through the compose CLI.
// ABOUTME: Selects Docker or Podman and runs per-color compose projects.

mod compose;
mod detection;
mod error;
mod types;

pub use compose::{ComposeCli, ComposeOps, ComposeProject};
pub use detection::detect_local;
pub use error::{ComposeError, ComposeErrorKind};
pub use types::RuntimeType;
