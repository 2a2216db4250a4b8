use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use chrono::{Local, TimeZone};

use crate::events::observer::{FallEvent, FallEventObserver};

/// Default push endpoint (LINE Messaging API).
pub const DEFAULT_PUSH_API_URL: &str = "https://api.line.me/v2/bot/message/push";

/// Operator notification over a push-message HTTP API.
///
/// Best-effort: a failed send is queued and logged, never surfaced to the
/// state machine. The endpoint is overridable for tests.
pub struct PushNotifier {
    api_url: String,
    channel_access_token: String,
    user_id: String,
    enabled: bool,
    pending: Mutex<VecDeque<FallEvent>>,
}

impl PushNotifier {
    pub fn new(channel_access_token: &str, user_id: &str, enabled: bool) -> Self {
        Self {
            api_url: DEFAULT_PUSH_API_URL.to_string(),
            channel_access_token: channel_access_token.to_string(),
            user_id: user_id.to_string(),
            enabled,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|pending| pending.len()).unwrap_or(0)
    }

    fn format_time(epoch: f64) -> String {
        match Local.timestamp_opt(epoch as i64, 0).single() {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
            None => format!("{:.0}", epoch),
        }
    }

    fn post(&self, text: &str) -> std::result::Result<(), String> {
        let body = serde_json::json!({
            "to": self.user_id,
            "messages": [{"type": "text", "text": text}],
        });
        match ureq::post(&self.api_url)
            .set(
                "Authorization",
                &format!("Bearer {}", self.channel_access_token),
            )
            .send_json(body)
        {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(format!("push API returned {}", code)),
            Err(e) => Err(format!("push transport error: {}", e)),
        }
    }

    fn send(&self, event: &FallEvent, text: &str) -> Result<()> {
        match self.post(text) {
            Ok(()) => log::info!("notification sent for {}", event.event_id),
            Err(e) => {
                log::warn!("notification failed for {}: {}", event.event_id, e);
                self.pending
                    .lock()
                    .map_err(|_| anyhow!("notifier queue lock poisoned"))?
                    .push_back(event.clone());
            }
        }
        Ok(())
    }

    /// Re-send queued notifications, stopping at the first failure.
    pub fn retry_pending(&self) -> Result<()> {
        loop {
            let event = {
                let pending = self
                    .pending
                    .lock()
                    .map_err(|_| anyhow!("notifier queue lock poisoned"))?;
                match pending.front() {
                    Some(event) => event.clone(),
                    None => return Ok(()),
                }
            };
            let text = format!(
                "Fall alert (retry)\nevent: {}\ntime: {}",
                event.event_id,
                Self::format_time(event.confirmed_at)
            );
            if self.post(&text).is_err() {
                return Ok(());
            }
            self.pending
                .lock()
                .map_err(|_| anyhow!("notifier queue lock poisoned"))?
                .pop_front();
        }
    }
}

impl FallEventObserver for PushNotifier {
    fn on_fall_confirmed(&self, event: &FallEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let text = format!(
            "Fall alert!\nevent: {}\ntime: {}\nnotification #{}",
            event.event_id,
            Self::format_time(event.confirmed_at),
            event.notification_count
        );
        self.send(event, &text)
    }

    fn on_fall_recovered(&self, event: &FallEvent) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let text = format!(
            "Recovered\nevent: {}\ntime: {}",
            event.event_id,
            Self::format_time(crate::epoch_now())
        );
        self.send(event, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> FallEvent {
        FallEvent {
            event_id: "evt_1".into(),
            confirmed_at: 1735459200.0,
            last_notified_at: 1735459200.0,
            notification_count: 1,
        }
    }

    #[test]
    fn disabled_notifier_is_silent() {
        let notifier = PushNotifier::new("token", "user", false)
            .with_api_url("http://127.0.0.1:1/unreachable");
        notifier.on_fall_confirmed(&event()).unwrap();
        notifier.on_fall_recovered(&event()).unwrap();
        assert_eq!(notifier.pending_count(), 0);
    }

    #[test]
    fn failed_sends_queue_for_retry() {
        // Nothing listens on this port, so the send fails fast.
        let notifier = PushNotifier::new("token", "user", true)
            .with_api_url("http://127.0.0.1:1/unreachable");
        notifier.on_fall_confirmed(&event()).unwrap();
        assert_eq!(notifier.pending_count(), 1);

        // Retry fails too and leaves the queue intact.
        notifier.retry_pending().unwrap();
        assert_eq!(notifier.pending_count(), 1);
    }
}
