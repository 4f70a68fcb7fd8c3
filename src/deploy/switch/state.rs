// ABOUTME: Traffic switch state marker types for the type state pattern.
// ABOUTME: Zero-sized markers enforce the order Idle, Validating, Switching, Verifying, Committed.

use serde::Serialize;

/// Nothing has been checked or touched.
/// Available actions: `validate()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Idle;

/// Target verdict accepted; router not yet touched.
/// Available actions: `apply()`
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatingTarget;

/// Router config replaced on disk, proxy not yet reloaded.
/// Available actions: `reload()`, `restore()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Switching;

/// Proxy reloaded onto the target; public endpoint under verification.
/// Available actions: `commit()`, `restore()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Verifying;

/// Target recorded as live.
/// Available actions: `finish()`
#[derive(Debug, Clone, Copy, Default)]
pub struct Committed;

/// States in which the live router config has been replaced and must be
/// restored on failure.
///
/// A switch that never touched the router has nothing to restore:
///
/// ```compile_fail
/// use bascule::deploy::switch::{Applied, Idle};
///
/// fn restorable<S: Applied>() {}
/// restorable::<Idle>();
/// ```
pub trait Applied: sealed::Sealed {}

impl Applied for Switching {}
impl Applied for Verifying {}

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::Switching {}
    impl Sealed for super::Verifying {}
}

/// Runtime view of the switch state machine, for reports and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchState {
    Idle,
    ValidatingTarget,
    Switching,
    Verifying,
    Committed,
    SwitchFailed,
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SwitchState::Idle => "idle",
            SwitchState::ValidatingTarget => "validating_target",
            SwitchState::Switching => "switching",
            SwitchState::Verifying => "verifying",
            SwitchState::Committed => "committed",
            SwitchState::SwitchFailed => "switch_failed",
        };
        f.write_str(s)
    }
}
