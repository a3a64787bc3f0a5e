pub mod dashboard;
pub mod due;
pub mod scheduler;
pub mod session;
pub mod task_repo;
