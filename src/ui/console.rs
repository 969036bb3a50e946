//! Line-oriented rendering of engine status

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::ViewMode;
use crate::state::{AppSnapshot, InputSnapshot};
use crate::sync::EngineStatus;

fn describe_input(label: &str, input: Option<&InputSnapshot>) -> String {
    match input {
        Some(input) => format!("{}={} ({} bytes, {})", label, input.name, input.size_bytes, input.preview),
        None => format!("{}=-", label),
    }
}

/// Render one status line for a snapshot
pub fn render_line(snapshot: &AppSnapshot) -> String {
    let mode = ViewMode::from(snapshot);
    let mut line = format!(
        "[{}] {} {}",
        mode.label(),
        describe_input("audio", snapshot.audio.as_ref()),
        describe_input("image", snapshot.image.as_ref())
    );

    match mode {
        ViewMode::Success => {
            if let Some(result) = snapshot.job.result {
                line.push_str(&format!(" result={}", result));
            }
        }
        ViewMode::Error => {
            if let Some(error) = snapshot.job.error.as_ref().or(snapshot.form_error.as_ref()) {
                line.push_str(&format!(" error=\"{}\"", error));
            }
        }
        _ => {}
    }

    line
}

/// Print status updates until the engine stops. Returns the last snapshot seen.
pub async fn watch_status(
    mut status_rx: broadcast::Receiver<EngineStatus>,
    json: bool,
) -> Option<AppSnapshot> {
    let mut last = None;

    loop {
        match status_rx.recv().await {
            Ok(EngineStatus::Updated(snapshot)) => {
                if json {
                    match serde_json::to_string(&snapshot) {
                        Ok(text) => println!("{}", text),
                        Err(e) => warn!("Failed to serialize snapshot: {}", e),
                    }
                } else {
                    println!("{}", render_line(&snapshot));
                }
                last = Some(snapshot);
            }
            Ok(EngineStatus::Rejected(reason)) => {
                if !json {
                    println!("! {}", reason);
                }
            }
            Ok(EngineStatus::Stopped) | Err(broadcast::error::RecvError::Closed) => break,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!("Status view skipped {} updates", skipped);
            }
        }
    }

    last
}
