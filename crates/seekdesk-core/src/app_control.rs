use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use seekdesk_platform::{CloseOutcome, ProcessError};

/// How the installer closes the desktop app before touching its files and
/// starts it again afterwards.
#[async_trait]
pub trait AppControl: Send + Sync {
    async fn close(&self) -> Result<CloseOutcome, ProcessError>;
    fn launch(&self, executable: &Path) -> Result<(), ProcessError>;
}

/// Real processes, matched by executable image name.
#[derive(Debug, Clone)]
pub struct SystemApp {
    image_name: String,
    grace: Duration,
}

impl SystemApp {
    #[must_use]
    pub fn new(image_name: impl Into<String>, grace: Duration) -> Self {
        Self {
            image_name: image_name.into(),
            grace,
        }
    }
}

#[async_trait]
impl AppControl for SystemApp {
    async fn close(&self) -> Result<CloseOutcome, ProcessError> {
        seekdesk_platform::close_process(&self.image_name, self.grace).await
    }

    fn launch(&self, executable: &Path) -> Result<(), ProcessError> {
        seekdesk_platform::launch_detached(executable)
    }
}
