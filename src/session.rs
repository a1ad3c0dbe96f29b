//! Interactive search box: every input line is the field's new value,
//! and the dropdown is re-rendered whenever the pipeline publishes.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{info, warn};

use crate::opener::Opener;
use crate::pipeline::{PipelineError, PipelineSettings, QueryPipeline, SearchState};
use crate::render::render_dropdown;
use crate::wikipedia::SearchClient;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("terminal I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

#[derive(Debug, PartialEq, Eq)]
pub enum Command {
    Edit(String),
    /// 1-based position in the dropdown.
    Open(usize),
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let Some(rest) = line.strip_prefix(':') else {
        return Command::Edit(line.to_string());
    };
    let mut words = rest.split_whitespace();
    match (words.next(), words.next(), words.next()) {
        (Some("quit" | "q"), None, _) => Command::Quit,
        (Some("open" | "o"), Some(n), None) => match n.parse::<usize>() {
            Ok(n) if n > 0 => Command::Open(n),
            _ => Command::Unknown(line.to_string()),
        },
        _ => Command::Unknown(line.to_string()),
    }
}

enum Exit {
    EndOfInput,
    Quit,
    PipelineStopped,
}

pub async fn run<R, W, C, O>(
    input: R,
    out: &mut W,
    client: C,
    settings: PipelineSettings,
    opener: &O,
) -> Result<(), SessionError>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    C: SearchClient + Send + Sync + 'static,
    O: Opener,
{
    info!("search box active");
    let pipeline = QueryPipeline::spawn(client, settings);
    let mut updates = pipeline.subscribe();
    let mut rendered = SearchState::default();
    let mut lines = input.lines();

    let exit = loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break Exit::EndOfInput };
                match parse_command(&line) {
                    Command::Edit(term) => {
                        if pipeline.push(term).is_err() {
                            break Exit::PipelineStopped;
                        }
                    }
                    Command::Open(n) => open_nth(&pipeline.state(), n, opener, out)?,
                    Command::Quit => break Exit::Quit,
                    Command::Unknown(cmd) => {
                        writeln!(out, "unknown command: {cmd} (try :open N or :quit)")?;
                    }
                }
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break Exit::PipelineStopped;
                }
                rendered = updates.borrow_and_update().clone();
                out.write_all(render_dropdown(&rendered).as_bytes())?;
                out.flush()?;
            }
        }
    };

    match exit {
        Exit::EndOfInput => {
            pipeline.finish().await?;
            let last = updates.borrow().clone();
            if last != rendered {
                out.write_all(render_dropdown(&last).as_bytes())?;
                out.flush()?;
            }
        }
        Exit::Quit | Exit::PipelineStopped => pipeline.shutdown().await?,
    }
    info!("search box closed");
    Ok(())
}

fn open_nth<O: Opener, W: Write>(
    state: &SearchState,
    n: usize,
    opener: &O,
    out: &mut W,
) -> std::io::Result<()> {
    let Some(item) = state.results.get(n - 1) else {
        return writeln!(out, "no result #{n} ({} shown)", state.results.len());
    };
    match opener.open(&item.url) {
        Ok(()) => writeln!(out, "opened {}", item.url),
        Err(e) => {
            warn!(url = %item.url, error = %e, "could not open result");
            writeln!(out, "could not open {}: {e}", item.url)
        }
    }
}
