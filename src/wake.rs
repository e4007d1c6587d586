/*!
 * Wake Pipe
 * Cross-thread and signal-context wakeups for a blocked loop
 */

use crate::core::errors::{LoopError, LoopResult};
use crate::core::limits::WAKE_TOKEN_BATCH;
use crate::sys;
use log::error;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

/// Token written by [`WakePipe::wake`]. Signal numbers are guaranteed
/// non-zero, so zero unambiguously means "work was enqueued for you".
pub(crate) const WAKE_TOKEN: i32 = 0;

/// A unidirectional pipe whose read end sits at slot 0 of the owning
/// thread's poll set. Any thread, including OS signal context, may write
/// 32-bit tokens to the write end.
pub(crate) struct WakePipe {
    read: OwnedFd,
    write: OwnedFd,
}

/// One batch of tokens pulled off the wake pipe.
pub(crate) struct WakeDrain {
    tokens: [i32; WAKE_TOKEN_BATCH],
    count: usize,
}

impl WakeDrain {
    #[inline]
    pub fn tokens(&self) -> &[i32] {
        &self.tokens[..self.count]
    }

    /// True when the read filled the whole batch, meaning more tokens may
    /// still be queued in the pipe.
    #[inline]
    pub fn filled_batch(&self) -> bool {
        self.count == WAKE_TOKEN_BATCH
    }
}

impl WakePipe {
    pub fn new() -> LoopResult<Self> {
        let (read, write) = sys::pipe_cloexec().map_err(LoopError::WakePipe)?;
        Ok(WakePipe { read, write })
    }

    #[inline]
    pub fn read_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    #[inline]
    pub fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }

    /// Request one extra loop iteration on the owning thread.
    ///
    /// A failed write means the loop can no longer be woken and the runtime
    /// has lost integrity, so it is fatal.
    pub fn wake(&self) {
        if let Err(err) = sys::write_token(self.write.as_raw_fd(), WAKE_TOKEN) {
            let err = LoopError::WakeWrite(err);
            error!("{err}");
            panic!("{err}");
        }
    }

    /// Pull one batch of tokens off the pipe. Must only be called after the
    /// poll set reported the read end readable, so the read cannot block.
    /// EINTR is retried; any other read failure is fatal.
    pub fn drain(&self) -> WakeDrain {
        let mut tokens = [0i32; WAKE_TOKEN_BATCH];
        match sys::read_tokens(self.read.as_raw_fd(), &mut tokens) {
            Ok(count) => WakeDrain { tokens, count },
            Err(err) => {
                let err = LoopError::WakeRead(err);
                error!("{err}");
                panic!("{err}");
            }
        }
    }
}
