mod project;
mod task;

pub use project::Project;
pub use task::{Goal, GoalKind, ProgressLog, Recurrence, Task};
