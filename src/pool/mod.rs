//! Thread pool capability consumed by the dispatcher.
//!
//! The dispatcher never spawns OS threads itself. It hands each worker loop to
//! a [`TaskExecutor`], which either starts it on some thread right away or
//! refuses because no thread is available.

mod thread_pool;

pub use thread_pool::{ThreadPool, ThreadPoolConfig, ThreadPoolStats};

/// A unit of work executed on a pooled thread.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Scheduling hint passed through to the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TaskPriority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
    Critical = 3,
}

impl TaskPriority {
    /// Parse a priority name (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "normal" => Some(Self::Normal),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl serde::Serialize for TaskPriority {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> serde::Deserialize<'de> for TaskPriority {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = <String as serde::Deserialize>::deserialize(deserializer)?;
        Self::parse(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown thread priority: {name}")))
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that can run a task on a thread it owns.
///
/// Implementations must be thread-safe and must never block in
/// [`try_schedule`](TaskExecutor::try_schedule). When no thread can take the
/// task right now the task is dropped and an error is returned.
pub trait TaskExecutor: Send + Sync {
    /// Start `task` on an available thread.
    fn try_schedule(&self, task: Task, priority: TaskPriority) -> Result<(), ThreadPoolError>;

    /// Maximum number of tasks this executor can run at once.
    fn capacity(&self) -> usize;
}

/// Errors for thread pool operations.
#[derive(Debug, thiserror::Error)]
pub enum ThreadPoolError {
    #[error("Thread pool is shut down")]
    PoolShutdown,

    #[error("No thread available (capacity {capacity})")]
    NoThreadAvailable { capacity: usize },

    #[error("Failed to spawn thread: {0}")]
    ThreadSpawnFailed(String),
}
