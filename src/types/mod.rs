// ABOUTME: Validated domain types shared across the orchestrator.
// ABOUTME: Colors identify the two environment slots; project names scope them.

mod color;
mod project_name;

pub use color::{Color, ParseColorError};
pub use project_name::{ProjectName, ProjectNameError};
