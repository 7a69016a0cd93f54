//! Desktop notifications after a bot run.

use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

pub trait Notifier {
    fn notify(&self, title: &str, message: &str) -> Result<()>;
}

/// Posts a macOS notification through `osascript`.
pub struct OsascriptNotifier;

impl Notifier for OsascriptNotifier {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        let script = notification_script(title, message);
        debug!(%title, "posting notification");
        let output = Command::new("osascript")
            .args(["-e", &script])
            .output()
            .context("spawn osascript")?;
        if !output.status.success() {
            return Err(anyhow!(
                "osascript failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

/// Notifier that drops everything (notifications turned off in config).
pub struct SilentNotifier;

impl Notifier for SilentNotifier {
    fn notify(&self, _title: &str, _message: &str) -> Result<()> {
        Ok(())
    }
}

impl<N: Notifier + ?Sized> Notifier for Box<N> {
    fn notify(&self, title: &str, message: &str) -> Result<()> {
        (**self).notify(title, message)
    }
}

fn notification_script(title: &str, message: &str) -> String {
    format!(
        "display notification \"{}\" with title \"{}\"",
        applescript_escape(message),
        applescript_escape(title)
    )
}

fn applescript_escape(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}
