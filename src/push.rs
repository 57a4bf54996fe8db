//! Push notification fan-out
//!
//! Dispatched fire-and-forget after a panic alert commits and broadcasts;
//! a delivery failure is logged and never fails the raise itself.

use crate::protocol::PanicAlert;
use async_trait::async_trait;

/// Trait for push delivery backends
#[async_trait]
pub trait PushGateway: Send + Sync {
    async fn send_panic_notification(
        &self,
        group_id: &str,
        alert: &PanicAlert,
    ) -> anyhow::Result<()>;
}

/// Stand-in gateway that only records the dispatch. Actual web-push
/// delivery lives in the external notification service.
pub struct LogOnlyPush;

#[async_trait]
impl PushGateway for LogOnlyPush {
    async fn send_panic_notification(
        &self,
        group_id: &str,
        alert: &PanicAlert,
    ) -> anyhow::Result<()> {
        tracing::info!(
            group_id = %group_id,
            alert_id = %alert.id,
            user_id = %alert.user_id,
            "Panic push fan-out dispatched"
        );
        Ok(())
    }
}
