use std::io::Write;

use tracing::{info, warn};

/// The audio/visual alert collaborator. The core only ever asks it to signal.
pub trait AlertSink: Send + Sync + 'static {
    fn signal_alert(&self);
}

/// Rings the terminal bell on stderr.
#[derive(Debug, Default)]
pub struct TerminalBell;

impl AlertSink for TerminalBell {
    fn signal_alert(&self) {
        let mut stderr = std::io::stderr();
        if let Err(e) = stderr.write_all(b"\x07").and_then(|_| stderr.flush()) {
            warn!("Alert bell failed: {e}");
            return;
        }
        info!("Alert signalled");
    }
}
