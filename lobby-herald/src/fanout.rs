//! Direct-message fanout to subscribers on a code change.

use crate::platform::ChatPlatform;
use crate::render::Renderer;
use crate::session::{JoinCode, UserId};
use std::sync::Arc;

/// Delivery summary of one fanout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub delivered: Vec<UserId>,
    pub failed: Vec<UserId>,
}

#[derive(Clone)]
pub struct NotificationFanout {
    platform: Arc<dyn ChatPlatform>,
    renderer: Renderer,
}

impl NotificationFanout {
    pub fn new(platform: Arc<dyn ChatPlatform>, renderer: Renderer) -> Self {
        Self { platform, renderer }
    }

    /// Send one direct message per subscriber, in registry order. A failed
    /// recipient is logged and skipped.
    pub async fn notify_code_change(&self, code: &JoinCode, subscribers: &[UserId]) -> FanoutReport {
        let text = self.renderer.notification(code);
        let mut report = FanoutReport::default();

        for &user in subscribers {
            match self.platform.send_direct(user, &text).await {
                Ok(()) => report.delivered.push(user),
                Err(e) => {
                    tracing::warn!(subscriber = %user, error = %e, "Failed to notify subscriber");
                    report.failed.push(user);
                }
            }
        }

        tracing::info!(
            code = %code,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Code change fanout finished"
        );
        report
    }
}
