//! Typed platform resources.

mod file;
mod member;
mod project;
mod task;
mod user;
mod volume;

pub use file::{File, FolderLocation};
pub use member::Member;
pub use project::Project;
pub use task::{Task, TaskDraft};
pub use user::User;
pub use volume::{Volume, VolumeObject};
