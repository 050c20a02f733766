//! Ctrl+C handling: a shared flag the digest engine polls.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// 128 + SIGINT.
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Install the process-wide handler and return the flag it sets.
pub fn install_handler() -> anyhow::Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if !handler_flag.swap(true, Ordering::SeqCst) {
            eprintln!("\nInterrupted, discarding partial results...");
        }
    })?;
    Ok(flag)
}
