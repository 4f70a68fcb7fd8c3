// ABOUTME: Deployment orchestration: color stacks, traffic switching and rollback.
// ABOUTME: The traffic switch uses the type state pattern for compile-time safe transitions.

mod deployer;
mod error;
mod lock;
mod orchestrator;
mod rollback;
mod status;
pub mod switch;

pub use deployer::{Deployer, StartOutcome};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{DeployLock, LockInfo};
pub use orchestrator::{CleanupReport, CycleKind, CycleOutcome, CycleReport, Orchestrator};
pub use rollback::{RollbackController, RollbackError, RollbackMode, RollbackReport};
pub use status::{EnvironmentState, EnvironmentStatus, StatusReport};
pub use switch::{SwitchError, SwitchFailure, SwitchReport, SwitchState, TrafficSwitcher};
