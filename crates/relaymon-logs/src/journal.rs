use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

/// Spawn `journalctl -f` for the given unit.
///
/// An error here means the process-based source cannot start at all
/// (binary missing, platform without systemd); the caller falls back.
pub(crate) fn spawn_journal(unit: &str) -> std::io::Result<Child> {
    Command::new("journalctl")
        .args(["-u", unit, "-f", "--no-pager", "-o", "cat"])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
}

/// Forward the child's stdout lines until the process exits or the token
/// fires. Returns once the child has been reaped.
pub(crate) async fn follow_journal(
    mut child: Child,
    tx: &UnboundedSender<String>,
    cancel: &CancellationToken,
) {
    let Some(stdout) = child.stdout.take() else {
        let _ = child.start_kill();
        let _ = child.wait().await;
        return;
    };
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = child.start_kill();
                break;
            }
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if tx.send(line).is_err() {
                            // Receiver gone; nothing left to feed.
                            let _ = child.start_kill();
                            break;
                        }
                    }
                    // EOF or read error: the process exited or its pipe
                    // broke. The caller decides what happens next.
                    Ok(None) | Err(_) => break,
                }
            }
        }
    }

    let _ = child.wait().await;
}
