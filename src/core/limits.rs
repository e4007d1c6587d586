/*!
 * Runtime Limits and Constants
 *
 * Centralized location for the loop's tunables and magic numbers.
 */

/// Maximum wake-pipe tokens drained per read (32 bytes).
/// A read that fills the whole batch without seeing an explicit wake token
/// restarts the wait step so later tokens are not starved.
pub const WAKE_TOKEN_BATCH: usize = 8;

/// Initial capacity of a thread's poll-descriptor list.
/// Slot 0 is always the wake-pipe read end; the rest track notifiers.
pub const INLINE_POLL_SLOTS: usize = 32;

/// Upper bound on a single poll timeout in milliseconds.
/// poll(2) takes an i32; longer timer deadlines are clamped and the loop
/// simply polls again.
pub const MAX_POLL_TIMEOUT_MS: u128 = i32::MAX as u128;
