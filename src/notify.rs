use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::session::SessionIdentity;
use crate::utils::http::get_http_client;

fn escape_html(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn format_login_message(identity: &SessionIdentity, phone: Option<&str>) -> String {
    format!(
        "🔔 <b>New studio login</b>\n\
----------------------------\n\
👤 <b>Name:</b> {}\n\
📧 <b>Email:</b> {}\n\
📱 <b>Phone:</b> {}\n\
📅 <b>Time:</b> {}\n\
----------------------------\n\
✨ <i>Sent from AI Product Studio</i>",
        escape_html(&identity.name),
        escape_html(&identity.email),
        escape_html(phone.filter(|value| !value.trim().is_empty()).unwrap_or("not provided")),
        Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
    )
}

/// Best-effort login notification to the admin chat. Every failure path
/// is logged and absorbed here; login never blocks on, or fails
/// because of, delivery.
pub async fn send_login_notification(
    identity: &SessionIdentity,
    phone: Option<&str>,
    routing_id: Option<String>,
) {
    let token = CONFIG.telegram_bot_token.trim();
    let chat_id = routing_id.unwrap_or_else(|| CONFIG.telegram_admin_chat_id.clone());
    if token.is_empty() || chat_id.trim().is_empty() {
        debug!("Login notification skipped: bot token or admin chat id not configured");
        return;
    }

    let url = format!("https://api.telegram.org/bot{token}/sendMessage");
    let body = json!({
        "chat_id": chat_id,
        "text": format_login_message(identity, phone),
        "parse_mode": "HTML",
    });

    match get_http_client().post(&url).json(&body).send().await {
        Ok(response) if response.status().is_success() => {
            debug!("Login notification delivered");
        }
        Ok(response) => {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Login notification rejected: status={status}, body={body}");
        }
        Err(err) => {
            warn!("Login notification failed to send: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            name: "Lina <QA>".to_string(),
            email: "lina@example.com".to_string(),
            verified: true,
        }
    }

    #[test]
    fn login_message_includes_identity_fields_escaped() {
        let message = format_login_message(&identity(), Some("+4917012345"));
        assert!(message.contains("Lina &lt;QA&gt;"));
        assert!(message.contains("lina@example.com"));
        assert!(message.contains("+4917012345"));
    }

    #[test]
    fn missing_phone_is_reported_as_not_provided() {
        let message = format_login_message(&identity(), None);
        assert!(message.contains("not provided"));

        let blank = format_login_message(&identity(), Some("   "));
        assert!(blank.contains("not provided"));
    }
}
