//! Notification contract and reminder text.
//! Lightweight: no queues. Build a message, hand it to a gateway, get a bool back.

use async_trait::async_trait;

/// Something that can deliver a text message to a destination address.
///
/// Failures never escape as errors; they are reported as `false`.
#[async_trait]
pub trait NotificationGateway: Send + Sync {
    /// Attempt delivery. Implementations bound their own network time.
    async fn send(&self, to: &str, message: &str) -> bool;

    /// Short name for log lines.
    fn name(&self) -> &str;
}

/// Standard feeding reminder. `overdue_hours == 0` means "on time".
pub fn format_reminder(batch_id: &str, species: &str, larval_count: u32, overdue_hours: i64) -> String {
    let mut message = format!(
        "🐛 Larval Feeding Reminder\n\nBatch: {batch_id}\nSpecies: {species}\nCount: {larval_count} larvae"
    );

    if overdue_hours > 0 {
        message.push_str(&format!(
            "\n\n⚠️ OVERDUE by {overdue_hours} hours! Please feed immediately."
        ));
    } else {
        message.push_str("\n\n🍃 Time to add fresh leaves for feeding.");
    }

    message.push_str("\n\nLarval Management System");
    message
}
