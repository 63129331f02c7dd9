//! Output stream draining and the blocked-on-input heuristic
//!
//! One gobbler task runs per output stream per execution. It forwards every
//! chunk to the owning session in read order and watches for the program
//! going quiet, which is the only portable signal available that it may be
//! blocked reading stdin.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::engine::message::{Envelope, Outbound};

/// Poll window for one read attempt; a read that yields nothing within it is
/// treated as "no data available" and drives the idle check.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Budget for each read of the final drain after stop or process exit.
const DRAIN_WINDOW: Duration = Duration::from_millis(50);

const READ_BUF_SIZE: usize = 512;

/// Drain one output stream until end-of-file or the stop signal.
///
/// Forwarded chunks preserve read order within this stream; nothing is
/// ordered across the stdout and stderr gobblers. Every forwarded chunk
/// clears the shared input-requested flag, since output means the program is
/// not blocked on input.
///
/// The idle heuristic: while the process is alive, the flag is unset, and no
/// output has arrived for longer than the language's idle threshold, emit
/// one `input_request` and set the flag so it does not repeat. Delivered
/// input or new output re-arms it. This is necessarily approximate; the
/// threshold trades premature prompts against silently hung sessions.
pub(crate) async fn gobble<R>(
    mut reader: R,
    outbound: mpsc::Sender<Envelope>,
    input_requested: Arc<AtomicBool>,
    alive: Arc<AtomicBool>,
    idle_timeout: Duration,
    mut stop: watch::Receiver<bool>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUF_SIZE];
    let mut last_output = Instant::now();

    loop {
        tokio::select! {
            result = tokio::time::timeout(POLL_INTERVAL, reader.read(&mut buf)) => {
                match result {
                    Ok(Ok(0)) => break, // end of stream
                    Ok(Ok(n)) => {
                        last_output = Instant::now();
                        input_requested.store(false, Ordering::Release);
                        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                        if outbound.send(Envelope::new(Outbound::Output(chunk))).await.is_err() {
                            return; // session gone
                        }
                    }
                    Ok(Err(e)) => {
                        // Pipe errors usually mean the process was killed
                        debug!(error = %e, "output stream read error");
                        break;
                    }
                    Err(_) => {
                        // No data within the poll window
                        if alive.load(Ordering::Acquire)
                            && last_output.elapsed() > idle_timeout
                            && input_requested
                                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                                .is_ok()
                        {
                            debug!("idle threshold exceeded, requesting input");
                            if outbound
                                .send(Envelope::new(Outbound::input_request()))
                                .await
                                .is_err()
                            {
                                return;
                            }
                        }
                    }
                }
            }
            _ = stop.changed() => break,
        }
    }

    drain(&mut reader, &outbound).await;
}

/// One final bounded sweep so a trailing message printed immediately before
/// process exit is not dropped.
async fn drain<R>(reader: &mut R, outbound: &mpsc::Sender<Envelope>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_BUF_SIZE];
    while let Ok(Ok(n)) = tokio::time::timeout(DRAIN_WINDOW, reader.read(&mut buf)).await {
        if n == 0 {
            break;
        }
        let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
        if outbound
            .send(Envelope::new(Outbound::Output(chunk)))
            .await
            .is_err()
        {
            break;
        }
    }
}
