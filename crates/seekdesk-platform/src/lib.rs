//! OS adapters used by the updater: where things live on disk, how helper
//! commands are spawned, and how the desktop app process is closed and
//! relaunched.

mod commands;
mod paths;
mod process;

pub use commands::HideWindow;
pub use paths::{AppPaths, AppPathsError};
pub use process::{CloseOutcome, ProcessError, close_process, is_process_running, launch_detached};
