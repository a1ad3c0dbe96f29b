use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("failed to launch {launcher}: {source}")]
    Launch {
        launcher: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Shows a result's URL to the user, outside of this program.
pub trait Opener {
    fn open(&self, url: &str) -> Result<(), OpenError>;
}

/// Hands URLs to the desktop's default browser. The URL is passed through unchecked.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserOpener;

impl Opener for BrowserOpener {
    fn open(&self, url: &str) -> Result<(), OpenError> {
        let (program, args) = launcher();
        // Not awaited: tokio reaps the child once it exits.
        Command::new(program)
            .args(args)
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| OpenError::Launch {
                launcher: program,
                source,
            })?;
        debug!(url, launcher = program, "opened result in browser");
        Ok(())
    }
}

fn launcher() -> (&'static str, &'static [&'static str]) {
    if cfg!(target_os = "macos") {
        ("open", &[])
    } else if cfg!(windows) {
        // `start` treats its first quoted argument as a window title.
        ("cmd", &["/C", "start", ""])
    } else {
        ("xdg-open", &[])
    }
}
