/*!
 * OS Primitives
 * Thin libc wrappers behind io::Result, with EINTR handled where it can occur
 */

use std::io;
use std::mem;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

/// Convert a -1-on-error libc return value into an io::Result.
fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// Create an anonymous pipe with both ends close-on-exec.
/// Returns (read end, write end).
pub(crate) fn pipe_cloexec() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    cvt(unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) })?;
    // SAFETY: pipe2 succeeded, so both descriptors are valid and unowned.
    unsafe { Ok((OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1]))) }
}

/// poll(2) over the given descriptors. Retries on EINTR with the same
/// timeout; returns the number of descriptors with non-zero revents.
pub(crate) fn poll(fds: &mut [libc::pollfd], timeout_ms: libc::c_int) -> io::Result<usize> {
    loop {
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, timeout_ms) };
        match cvt(ret) {
            Ok(n) => return Ok(n as usize),
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Write a single 32-bit token to a pipe.
///
/// A machine-word write to a pipe is atomic up to PIPE_BUF, so tokens from
/// concurrent writers never interleave. Safe to call from any thread.
pub(crate) fn write_token(fd: RawFd, token: i32) -> io::Result<()> {
    let n = unsafe {
        libc::write(
            fd,
            &token as *const i32 as *const libc::c_void,
            mem::size_of::<i32>(),
        )
    };
    if n < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Read as many whole tokens as are available, up to `buf.len()`.
/// Retries on EINTR; returns the number of tokens read (zero on EOF).
pub(crate) fn read_tokens(fd: RawFd, buf: &mut [i32]) -> io::Result<usize> {
    loop {
        let n = unsafe {
            libc::read(
                fd,
                buf.as_mut_ptr() as *mut libc::c_void,
                mem::size_of_val(buf),
            )
        };
        if n >= 0 {
            return Ok(n as usize / mem::size_of::<i32>());
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[inline]
pub(crate) fn getpid() -> libc::pid_t {
    // SAFETY: getpid is always async-signal-safe and cannot fail.
    unsafe { libc::getpid() }
}

/// Install a process-wide handler for `signal`, returning the previously
/// installed disposition.
pub(crate) fn install_signal_handler(
    signal: libc::c_int,
    handler: extern "C" fn(libc::c_int),
) -> io::Result<libc::sighandler_t> {
    let previous = unsafe { libc::signal(signal, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        Err(io::Error::last_os_error())
    } else {
        Ok(previous)
    }
}

/// Restore a previously saved signal disposition.
pub(crate) fn restore_signal_handler(signal: libc::c_int, previous: libc::sighandler_t) {
    unsafe {
        libc::signal(signal, previous);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::fd::AsRawFd;

    #[test]
    fn test_token_roundtrip() {
        let (read, write) = pipe_cloexec().unwrap();
        write_token(write.as_raw_fd(), 0).unwrap();
        write_token(write.as_raw_fd(), libc::SIGUSR1).unwrap();

        let mut buf = [0i32; 8];
        let count = read_tokens(read.as_raw_fd(), &mut buf).unwrap();
        assert_eq!(count, 2);
        assert_eq!(&buf[..2], &[0, libc::SIGUSR1]);
    }

    #[test]
    fn test_poll_reports_readable_pipe() {
        let (read, write) = pipe_cloexec().unwrap();
        let mut fds = [libc::pollfd {
            fd: read.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        }];

        assert_eq!(poll(&mut fds, 0).unwrap(), 0);

        write_token(write.as_raw_fd(), 0).unwrap();
        assert_eq!(poll(&mut fds, 1000).unwrap(), 1);
        assert_ne!(fds[0].revents & libc::POLLIN, 0);
    }
}
