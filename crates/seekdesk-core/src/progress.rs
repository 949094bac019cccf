use tokio::sync::mpsc;

use crate::installer::UpdateOutcome;

#[derive(Debug, Clone)]
pub enum UpdateProgress {
    Checking,
    Downloading { downloaded: u64, total: u64 },
    BackingUp,
    Extracting,
    Installing,
    Restoring,
    Complete(UpdateOutcome),
    Failed(String),
}

pub type ProgressSender = mpsc::Sender<UpdateProgress>;

pub(crate) async fn report(progress: Option<&ProgressSender>, event: UpdateProgress) {
    if let Some(progress) = progress {
        let _ = progress.send(event).await;
    }
}
