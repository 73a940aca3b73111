// src/notifications/mod.rs
pub mod telegram_notifier;

use crate::errors::NotifyError;
use crate::types::TradeEvent;
use async_trait::async_trait;

pub use telegram_notifier::TelegramNotifier;

/// Outbound alert channel. A failed send never rolls back the stage write that caused it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> Result<(), NotifyError>;
}

/// HTML body for a completed pattern.
pub fn format_completion_message(event: &TradeEvent) -> String {
    let fmt = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "n/a".to_string())
    };
    let anchor_value = event
        .invalidation_anchor_value
        .map(|v| format!("{:.2}", v))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "🟢 <b>GREEN DOT CONFIRMED</b> 🟢\n\
        \n\
        📊 <b>Ticker:</b> <code>{}</code>\n\
        ⏰ <b>Timeframe:</b> <code>{}</code>\n\
        🟩 <b>Big green dot:</b> {}\n\
        🔴 <b>Red dot:</b> {} (<code>{}</code>)\n\
        🟢 <b>Green dot:</b> {}",
        event.instrument,
        event.timeframe,
        fmt(event.entry_time),
        fmt(event.invalidation_anchor_time),
        anchor_value,
        fmt(Some(event.completion_time)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::parse_event_time;

    #[test]
    fn test_completion_message_mentions_pair_and_times() {
        let event = TradeEvent {
            instrument: "BTCUSDT".to_string(),
            timeframe: "5".to_string(),
            completion_time: parse_event_time("2024-03-01T10:15:00Z").unwrap(),
            entry_time: parse_event_time("2024-03-01T09:00:00Z"),
            invalidation_anchor_time: parse_event_time("2024-03-01T09:30:00Z"),
            invalidation_anchor_value: Some(10.0),
            recorded_at: parse_event_time("2024-03-01T10:16:00Z").unwrap(),
            notified: false,
        };

        let message = format_completion_message(&event);
        assert!(message.contains("<code>BTCUSDT</code>"));
        assert!(message.contains("<code>5</code>"));
        assert!(message.contains("2024-03-01 10:15:00 UTC"));
        assert!(message.contains("<code>10.00</code>"));
    }
}
