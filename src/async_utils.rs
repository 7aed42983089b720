//! Small asynchronous utilities shared across the pipeline.

use crate::prelude::*;

/// A handle to an active push subscription.
///
/// Subscriptions in this crate are fire-and-forget: the source invokes a
/// callback on every update, and it never stops on its own — not even after
/// a terminal status. The holder of this handle decides when delivery ends,
/// either by calling [`Subscription::unsubscribe`] or by dropping the
/// handle.
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    /// Create a subscription handle from a cancellation closure.
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Subscription {
        Subscription {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// Create a subscription handle that aborts a background delivery task.
    pub fn from_task(handle: tokio::task::JoinHandle<()>) -> Subscription {
        Subscription::new(move || handle.abort())
    }

    /// Stop further callback delivery. Does not cancel any in-flight
    /// server-side processing; the server simply finishes unobserved.
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

/// Report a subprocess failure, including any error output.
pub fn check_for_command_failure(
    command_name: &str,
    output: &std::process::Output,
) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(
        command_name = command_name,
        output = %String::from_utf8_lossy(&output.stdout),
        "Standard output from command"
    );
    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    #[test]
    fn unsubscribe_runs_cancel_once() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let sub = Subscription::new(move || flag.store(true, Ordering::SeqCst));
        sub.unsubscribe();
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn drop_also_cancels() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        drop(Subscription::new(move || flag.store(true, Ordering::SeqCst)));
        assert!(cancelled.load(Ordering::SeqCst));
    }
}
