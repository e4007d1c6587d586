/*!
 * Signals Module
 * Process signals translated into loop events via the wake pipe
 */

mod bridge;
mod handlers;

pub(crate) use bridge::{dispatch_signal, release_signal_target_fd};
pub use bridge::{register_signal, unregister_signal};
