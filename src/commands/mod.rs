mod files;
mod job;
mod list;
mod logs;
mod show;

pub use files::{daemon_reload, disable, enable};
pub use job::{run_job, JobArgs, JobKind};
pub use list::list;
pub use logs::logs;
pub use show::{kill, show};
