/*!
 * Error Types
 * Failure taxonomy for the loop's OS-facing plumbing
 */

use std::io;
use thiserror::Error;

/// Result type for loop plumbing operations.
pub type LoopResult<T> = Result<T, LoopError>;

/// Errors raised by the loop's OS-facing layers.
///
/// All of these classify as loss of loop integrity: they are logged and then
/// escalated to a panic at the driver boundary rather than surfaced to
/// application code. EINTR is retried transparently and never appears here.
#[derive(Error, Debug)]
pub enum LoopError {
    #[error("failed to create wake pipe: {0}")]
    WakePipe(#[source] io::Error),

    #[error("poll failed: {0}")]
    Poll(#[source] io::Error),

    #[error("wake pipe read failed: {0}")]
    WakeRead(#[source] io::Error),

    #[error("wake pipe write failed: {0}")]
    WakeWrite(#[source] io::Error),

    #[error("failed to install handler for signal {signal}: {source}")]
    SignalInstall {
        signal: libc::c_int,
        #[source]
        source: io::Error,
    },
}
