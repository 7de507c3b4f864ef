#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use corral_api::Notifier;
use serde::Serialize;
use tracing::{error, info};

const SUCCESS_TTL: Duration = Duration::from_secs(3);
const ERROR_TTL: Duration = Duration::from_secs(5);
const MAX_TOASTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastLevel {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
    #[serde(skip)]
    pub expires_at: Instant,
}

/// Notifier that keeps transient toasts for a frontend to draw.
#[derive(Default)]
pub struct ToastBuffer {
    toasts: Mutex<VecDeque<Toast>>,
}

impl ToastBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, level: ToastLevel, message: &str, ttl: Duration) {
        let mut q = self.toasts.lock().unwrap_or_else(|e| e.into_inner());
        if q.len() == MAX_TOASTS {
            q.pop_front();
        }
        q.push_back(Toast { level, message: message.to_string(), expires_at: Instant::now() + ttl });
    }

    /// Toasts still visible at `now`; expired ones are dropped.
    pub fn active_at(&self, now: Instant) -> Vec<Toast> {
        let mut q = self.toasts.lock().unwrap_or_else(|e| e.into_inner());
        q.retain(|t| t.expires_at > now);
        q.iter().cloned().collect()
    }

    pub fn active(&self) -> Vec<Toast> {
        self.active_at(Instant::now())
    }

    /// Remove and return everything, expired or not.
    pub fn drain(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect()
    }
}

impl Notifier for ToastBuffer {
    fn show_success(&self, message: &str) {
        info!(target: "corral::notify", %message, "toast");
        self.push(ToastLevel::Success, message, SUCCESS_TTL);
    }

    fn show_error(&self, message: &str) {
        error!(target: "corral::notify", %message, "toast");
        self.push(ToastLevel::Error, message, ERROR_TTL);
    }
}
