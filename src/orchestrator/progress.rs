use std::io::{IsTerminal, Write};
use std::time::Duration;

use crossterm::{
    cursor, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{Clear, ClearType},
};
use tokio::sync::watch;

use super::state::ProgressSnapshot;
use crate::shutdown::ShutdownReceiver;

const SPINNER: [&str; 6] = ["◜", "◠", "◝", "◞", "◡", "◟"];
const TICK: Duration = Duration::from_millis(100);

/// Redraws the progress line on stderr until shutdown, then clears it. Does
/// nothing when stderr is not a terminal.
pub(crate) fn spawn_progress(
    mut snapshot: watch::Receiver<ProgressSnapshot>,
    mut shutdown_rx: ShutdownReceiver,
    no_color: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !std::io::stderr().is_terminal() {
            return;
        }

        let mut ticker = tokio::time::interval(TICK);
        let mut frame = 0_usize;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    drop(clear_progress_line());
                    break;
                }
                _ = ticker.tick() => {
                    let current = *snapshot.borrow_and_update();
                    let spinner = SPINNER
                        .get(frame.checked_rem(SPINNER.len()).unwrap_or(0))
                        .copied()
                        .unwrap_or(" ");
                    frame = frame.wrapping_add(1);
                    if render_progress_line(spinner, current, no_color).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

pub(crate) fn progress_text(snapshot: ProgressSnapshot) -> String {
    format!(
        "Progress :: Created {}, Active {}",
        snapshot.created, snapshot.active
    )
}

fn render_progress_line(
    spinner: &str,
    snapshot: ProgressSnapshot,
    no_color: bool,
) -> Result<(), std::io::Error> {
    let mut out = std::io::stderr();
    queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    if no_color {
        queue!(out, Print(spinner))?;
    } else {
        queue!(
            out,
            SetForegroundColor(Color::Cyan),
            Print(spinner),
            ResetColor
        )?;
    }
    queue!(out, Print(" "), Print(progress_text(snapshot)))?;
    out.flush()
}

fn clear_progress_line() -> Result<(), std::io::Error> {
    let mut out = std::io::stderr();
    queue!(out, cursor::MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    out.flush()
}
