pub mod assigner;
pub mod registry;
pub mod task;

pub use assigner::{Outcome, TaskAssigner};
pub use registry::{PendingTasks, TaskCounts, TaskRegistry, TransitionFields};
pub use task::{Parameters, Task, TaskId, TaskKind, TaskSpec, TaskState};
