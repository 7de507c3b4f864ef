//! Notification surface: fire-and-forget user messages.

use tracing::{error, info};

pub trait Notifier: Send + Sync {
    fn show_success(&self, message: &str);
    fn show_error(&self, message: &str);
}

/// Notifier that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn show_success(&self, message: &str) {
        info!(target: "corral::notify", %message, "success");
    }

    fn show_error(&self, message: &str) {
        error!(target: "corral::notify", %message, "error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn tracing_notifier_is_usable_as_trait_object() {
        let n: Arc<dyn Notifier> = Arc::new(TracingNotifier);
        n.show_success("Project created successfully.");
        n.show_error("Project name already exists");
    }
}
