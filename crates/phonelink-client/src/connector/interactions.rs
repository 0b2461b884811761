//! Request/response interactions
//!
//! Prompts, alerts and device number changes are sent with a fresh
//! correlation stamp. The waiter is registered in the inbox before the
//! request goes out, so a reply can never slip past it.

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::oneshot;
use tokio::time::Instant;

use phonelink_core::prelude::*;
use phonelink_core::{DataMsg, InputPrompt, InputType, Notification, Payload};

use super::Connector;
use crate::inbox::{InboxChannel, InboxEntry};
use crate::protocol::{events, Delivery};

/// Pause between device number attempts the server asked us to retry.
const RETRY_PAUSE: Duration = Duration::from_millis(100);

/// Wire value of `Notification::time` for an optional display time.
fn display_millis(display_time: Option<Duration>) -> f64 {
    display_time.map_or(-1.0, |d| d.as_secs_f64() * 1000.0)
}

impl Connector {
    // ─────────────────────────────────────────────────────────────
    // Notifications
    // ─────────────────────────────────────────────────────────────

    /// Show a notification for `display_time` (until dismissed when `None`).
    ///
    /// With `alert` the call waits for the user's confirmation and returns
    /// whether it came; otherwise it returns `true` once sent.
    pub async fn notify(
        &self,
        message: impl Into<String>,
        display_time: Option<Duration>,
        alert: bool,
    ) -> Result<bool> {
        if alert {
            return self.alert(message).await;
        }
        self.send(Payload::Notification(Notification {
            message: message.into(),
            alert: false,
            time: display_millis(display_time),
        }))?;
        Ok(true)
    }

    pub async fn print(
        &self,
        message: impl Into<String>,
        display_time: Option<Duration>,
        alert: bool,
    ) -> Result<bool> {
        self.notify(message, display_time, alert).await
    }

    /// Alert the user and wait until it is confirmed.
    ///
    /// Returns `false` when `correlation.alert_timeout_ms` elapses or the
    /// connection ends first.
    pub async fn alert(&self, message: impl Into<String>) -> Result<bool> {
        let payload = Payload::Notification(Notification {
            message: message.into(),
            alert: true,
            time: display_millis(None),
        });
        let timeout = self.settings().correlation.alert_timeout();
        let reply = self.request(InboxChannel::Alerts, payload, timeout).await?;
        Ok(reply.is_some())
    }

    // ─────────────────────────────────────────────────────────────
    // Prompts
    // ─────────────────────────────────────────────────────────────

    /// Ask the user for input.
    ///
    /// `None` when the user cancelled, `correlation.prompt_timeout_ms`
    /// elapsed or the connection ended.
    pub async fn prompt(
        &self,
        question: impl Into<String>,
        input_type: InputType,
        options: Option<Vec<String>>,
    ) -> Result<Option<String>> {
        let payload = Payload::InputPrompt(InputPrompt {
            question: question.into(),
            input_type,
            options,
        });
        let timeout = self.settings().correlation.prompt_timeout();
        let reply = self
            .request(InboxChannel::Responses, payload, timeout)
            .await?;

        Ok(match reply {
            Some(InboxEntry::Data(DataMsg {
                payload: Payload::InputResponse(response),
                ..
            })) => response.text(),
            _ => None,
        })
    }

    pub async fn input(
        &self,
        question: impl Into<String>,
        input_type: InputType,
    ) -> Result<Option<String>> {
        self.prompt(question, input_type, None).await
    }

    /// Let the user pick one of `options`.
    pub async fn select(
        &self,
        question: impl Into<String>,
        options: Vec<String>,
    ) -> Result<Option<String>> {
        self.prompt(question, InputType::Select, Some(options)).await
    }

    // ─────────────────────────────────────────────────────────────
    // Device numbers
    // ─────────────────────────────────────────────────────────────

    /// Ask the server to give a display the number `new_device_nr`.
    ///
    /// Targets the display currently numbered `current_device_nr` if given,
    /// otherwise the first display of `device_id` (our own by default).
    /// Retries while the server says so, until `max_wait` (default
    /// `correlation.device_nr_timeout_ms`) is used up.
    pub async fn set_device_nr(
        &self,
        new_device_nr: i64,
        device_id: Option<&str>,
        current_device_nr: Option<i64>,
        max_wait: Option<Duration>,
    ) -> Result<bool> {
        let budget = max_wait.unwrap_or_else(|| self.settings().correlation.device_nr_timeout());
        let deadline = Instant::now() + budget;
        let target = device_id.unwrap_or(self.device_id()).to_string();

        loop {
            let stamp = self.next_stamp();
            let mut payload = Map::new();
            payload.insert("time_stamp".into(), Value::from(stamp));
            payload.insert("new_device_nr".into(), Value::from(new_device_nr));
            payload.insert("device_id".into(), Value::String(target.clone()));
            payload.insert(
                "current_device_nr".into(),
                current_device_nr.map_or(Value::Null, Value::from),
            );

            let rx = self.inbox().register(InboxChannel::Information, stamp);
            if let Err(e) = self.emit(events::SET_NEW_DEVICE_NR, payload, &Delivery::Default) {
                self.inbox().cancel(InboxChannel::Information, stamp);
                return Err(e);
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            let reply = self
                .await_reply(InboxChannel::Information, stamp, rx, Some(remaining))
                .await;
            let Some(InboxEntry::Information(info)) = reply else {
                warn!("No answer to device number change within {:?}", budget);
                return Ok(false);
            };

            if info.is_success() {
                info!("Device number {} assigned", new_device_nr);
                return Ok(true);
            }
            if info.should_retry && Instant::now() + RETRY_PAUSE < deadline {
                debug!("Retrying device number change: {}", info.message);
                tokio::time::sleep(RETRY_PAUSE).await;
                continue;
            }
            warn!("Device number change refused: {}", info.message);
            return Ok(false);
        }
    }

    // ─────────────────────────────────────────────────────────────
    // Correlation
    // ─────────────────────────────────────────────────────────────

    /// Send `payload` with a fresh stamp and wait for the matching reply.
    async fn request(
        &self,
        channel: InboxChannel,
        payload: Payload,
        timeout: Option<Duration>,
    ) -> Result<Option<InboxEntry>> {
        let stamp = self.next_stamp();
        let rx = self.inbox().register(channel, stamp);
        if let Err(e) = self.send_stamped(payload, Some(stamp)) {
            self.inbox().cancel(channel, stamp);
            return Err(e);
        }
        Ok(self.await_reply(channel, stamp, rx, timeout).await)
    }

    /// Wait for a registered reply. Gives up on timeout or when inbound
    /// traffic ends, dropping the waiter.
    async fn await_reply(
        &self,
        channel: InboxChannel,
        stamp: f64,
        rx: oneshot::Receiver<InboxEntry>,
        timeout: Option<Duration>,
    ) -> Option<InboxEntry> {
        let wait = async {
            tokio::select! {
                reply = rx => reply.ok(),
                () = self.wait() => None,
            }
        };

        let reply = match timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(reply) => reply,
                Err(_) => {
                    debug!("No {:?} reply to {} within {:?}", channel, stamp, limit);
                    None
                }
            },
            None => wait.await,
        };

        if reply.is_none() {
            self.inbox().cancel(channel, stamp);
        }
        reply
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{settle, start_with, started};
    use super::*;
    use crate::config::Settings;
    use crate::transport::ServerEnd;
    use serde_json::json;

    async fn next_request(server: &mut ServerEnd) -> (f64, Value) {
        let frame = server.next_event(events::NEW_DATA).await.unwrap();
        (frame.payload["time_stamp"].as_f64().unwrap(), frame.payload)
    }

    async fn answer(server: &ServerEnd, stamp: f64, response: Value) {
        server
            .push_data(json!({
                "type": "input_response", "response": response,
                "time_stamp": stamp, "device_id": "FooBar"
            }))
            .await;
    }

    #[tokio::test]
    async fn test_prompt_returns_response() {
        let (connector, mut server) = started().await;
        let pending = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.prompt("Age?", InputType::Number, None).await })
        };

        let (stamp, payload) = next_request(&mut server).await;
        assert_eq!(payload["type"], json!("input_prompt"));
        assert_eq!(payload["input_type"], json!("number"));
        answer(&server, stamp, json!(42)).await;

        assert_eq!(pending.await.unwrap().unwrap().as_deref(), Some("42"));
        assert_eq!(connector.inbox().waiting(InboxChannel::Responses), 0);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_reach_their_prompt() {
        let (connector, mut server) = started().await;
        let first = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.input("first", InputType::Text).await })
        };
        let (first_stamp, _) = next_request(&mut server).await;
        let second = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.input("second", InputType::Text).await })
        };
        let (second_stamp, _) = next_request(&mut server).await;
        assert_ne!(first_stamp, second_stamp);

        answer(&server, second_stamp, json!("b")).await;
        answer(&server, first_stamp, json!("a")).await;

        assert_eq!(first.await.unwrap().unwrap().as_deref(), Some("a"));
        assert_eq!(second.await.unwrap().unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_cancelled_prompt_is_none() {
        let (connector, mut server) = started().await;
        let pending = {
            let connector = connector.clone();
            tokio::spawn(async move {
                connector
                    .select("Pick", vec!["red".into(), "blue".into()])
                    .await
            })
        };
        let (stamp, payload) = next_request(&mut server).await;
        assert_eq!(payload["input_type"], json!("select"));
        assert_eq!(payload["options"], json!(["red", "blue"]));
        answer(&server, stamp, Value::Null).await;

        assert_eq!(pending.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_datetime_goes_out_as_datetime_local() {
        let (connector, mut server) = started().await;
        let _pending = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.input("When?", InputType::DateTime).await })
        };
        let (_, payload) = next_request(&mut server).await;
        assert_eq!(payload["input_type"], json!("datetime-local"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_times_out() {
        let mut settings = Settings::default();
        settings.correlation.prompt_timeout_ms = Some(500);
        let (connector, _server) = start_with(settings);

        let answer = connector.prompt("Anyone?", InputType::Text, None).await.unwrap();
        assert_eq!(answer, None);
        assert_eq!(connector.inbox().waiting(InboxChannel::Responses), 0);
    }

    #[tokio::test]
    async fn test_prompt_ends_with_connection() {
        let (connector, mut server) = started().await;
        let pending = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.input("Still there?", InputType::Text).await })
        };
        next_request(&mut server).await;
        server.hang_up();
        assert_eq!(pending.await.unwrap().unwrap(), None);
    }

    #[tokio::test]
    async fn test_alert_waits_for_confirmation() {
        let (connector, mut server) = started().await;
        let pending = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.notify("Careful", None, true).await })
        };
        let (stamp, payload) = next_request(&mut server).await;
        assert_eq!(payload["type"], json!("notification"));
        assert_eq!(payload["alert"], json!(true));

        server
            .push_data(json!({"type": "alert_confirm", "time_stamp": stamp, "device_id": "FooBar"}))
            .await;
        assert!(pending.await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn test_notify_sends_display_time_in_millis() {
        let (connector, mut server) = started().await;
        assert!(connector
            .notify("Hi", Some(Duration::from_millis(1500)), false)
            .await
            .unwrap());
        connector.print("Bye", None, false).await.unwrap();

        let (_, hi) = next_request(&mut server).await;
        assert_eq!(hi["time"], json!(1500.0));
        assert_eq!(hi["alert"], json!(false));
        let (_, bye) = next_request(&mut server).await;
        assert_eq!(bye["time"], json!(-1.0));
    }

    async fn answer_info(server: &ServerEnd, stamp: f64, message: &str, should_retry: bool) {
        server
            .push(
                events::INFORMATION_MSG,
                json!({
                    "message": message,
                    "action": {"time_stamp": stamp},
                    "should_retry": should_retry
                }),
            )
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_device_nr_retries_until_success() {
        let (connector, mut server) = started().await;
        let pending = {
            let connector = connector.clone();
            tokio::spawn(async move { connector.set_device_nr(4, None, Some(1), None).await })
        };

        let first = server.next_event(events::SET_NEW_DEVICE_NR).await.unwrap();
        assert_eq!(first.payload["new_device_nr"], json!(4));
        assert_eq!(first.payload["device_id"], json!("FooBar"));
        assert_eq!(first.payload["current_device_nr"], json!(1));
        let stamp = first.payload["time_stamp"].as_f64().unwrap();
        answer_info(&server, stamp, "Device is busy", true).await;

        let second = server.next_event(events::SET_NEW_DEVICE_NR).await.unwrap();
        let stamp = second.payload["time_stamp"].as_f64().unwrap();
        answer_info(&server, stamp, "Success", false).await;

        assert!(pending.await.unwrap().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_device_nr_refused() {
        let (connector, mut server) = started().await;
        let pending = {
            let connector = connector.clone();
            tokio::spawn(async move {
                connector
                    .set_device_nr(2, Some("Other"), None, Some(Duration::from_secs(1)))
                    .await
            })
        };
        let frame = server.next_event(events::SET_NEW_DEVICE_NR).await.unwrap();
        assert_eq!(frame.payload["device_id"], json!("Other"));
        assert!(frame.payload["current_device_nr"].is_null());
        let stamp = frame.payload["time_stamp"].as_f64().unwrap();
        answer_info(&server, stamp, "No such device", false).await;

        assert!(!pending.await.unwrap().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_device_nr_gives_up_after_budget() {
        let (connector, _server) = started().await;
        let assigned = connector
            .set_device_nr(1, None, None, Some(Duration::from_millis(300)))
            .await
            .unwrap();
        assert!(!assigned);
        settle().await;
        assert_eq!(connector.inbox().waiting(InboxChannel::Information), 0);
    }
}
