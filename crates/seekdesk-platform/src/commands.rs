#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;
#[cfg(windows)]
const DETACHED_PROCESS: u32 = 0x0000_0008;
#[cfg(windows)]
const CREATE_NEW_PROCESS_GROUP: u32 = 0x0000_0200;

/// Spawn flags for helper commands (`tasklist`, `pkill`, ...) and for the
/// relaunched desktop app.
pub trait HideWindow {
    /// Keep console helpers from flashing a window.
    fn hide_window(&mut self) -> &mut Self;

    /// Run the child outside the updater's console and process group so it
    /// survives the updater exiting.
    fn detached(&mut self) -> &mut Self;
}

impl HideWindow for tokio::process::Command {
    #[cfg(windows)]
    fn hide_window(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_window(&mut self) -> &mut Self {
        self
    }

    #[cfg(windows)]
    fn detached(&mut self) -> &mut Self {
        self.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
    }

    #[cfg(unix)]
    fn detached(&mut self) -> &mut Self {
        self.process_group(0)
    }

    #[cfg(not(any(windows, unix)))]
    fn detached(&mut self) -> &mut Self {
        self
    }
}

impl HideWindow for std::process::Command {
    #[cfg(windows)]
    fn hide_window(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_window(&mut self) -> &mut Self {
        self
    }

    #[cfg(windows)]
    fn detached(&mut self) -> &mut Self {
        self.creation_flags(DETACHED_PROCESS | CREATE_NEW_PROCESS_GROUP)
    }

    #[cfg(unix)]
    fn detached(&mut self) -> &mut Self {
        use std::os::unix::process::CommandExt as _;
        self.process_group(0)
    }

    #[cfg(not(any(windows, unix)))]
    fn detached(&mut self) -> &mut Self {
        self
    }
}
