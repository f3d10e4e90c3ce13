//! Push notification payloads as understood by the customer service worker

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::delay::{clock_glyph, format_delay};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationPayload {
    pub title: String,
    pub options: NotificationOptions,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationOptions {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub body: String,
    /// Notifications sharing a tag replace each other on the device
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NotificationAction>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub require_interaction: bool,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

impl NotificationAction {
    fn new(action: &str, title: &str) -> Self {
        Self {
            action: action.to_string(),
            title: title.to_string(),
        }
    }

    fn view() -> Self {
        Self::new("go", "View appointment")
    }

    fn cancel() -> Self {
        Self::new("cancel", "Cancel appointment")
    }
}

impl NotificationPayload {
    /// A customer's appointment is running late
    pub fn delay_detected(
        business_id: &str,
        business_name: &str,
        delay: TimeDelta,
        customer_link: &str,
    ) -> Self {
        Self {
            title: format!("{} Your appointment is running late", clock_glyph(delay)),
            options: NotificationOptions {
                body: format!(
                    "Your appointment with {} is running about {} late.",
                    business_name,
                    format_delay(delay)
                ),
                tag: delay_tag(business_id),
                actions: vec![NotificationAction::view(), NotificationAction::cancel()],
                require_interaction: true,
                data: link_data(customer_link),
            },
        }
    }

    /// A previously announced delay is gone
    pub fn delay_resolved(business_id: &str, business_name: &str, customer_link: &str) -> Self {
        Self {
            title: "✅ Your appointment is on time".to_string(),
            options: NotificationOptions {
                body: format!(
                    "Your appointment with {} is no longer running late.",
                    business_name
                ),
                tag: delay_tag(business_id),
                actions: vec![NotificationAction::view()],
                require_interaction: false,
                data: link_data(customer_link),
            },
        }
    }
}

fn delay_tag(business_id: &str) -> String {
    format!("delay-{}", business_id)
}

fn link_data(customer_link: &str) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(
        "customerLink".to_string(),
        Value::String(customer_link.to_string()),
    );
    data
}
