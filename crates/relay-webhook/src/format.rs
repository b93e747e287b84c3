//! Message formatting
//!
//! Renders classified events as Telegram HTML. Untrusted text is escaped for
//! `&`, `<` and `>` only; every other character passes through unchanged.

use crate::events::{MentionData, NotificationData, Priority, WebhookEvent};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fmt;

/// Telegram `parse_mode` matching the escaping applied here
pub const PARSE_MODE: &str = "HTML";

const MENTION_ICON: &str = "\u{1F4AC}";
const CHANNEL_ICON: &str = "\u{1F4CD}";
const CLOCK_ICON: &str = "\u{1F550}";
const LINK_ICON: &str = "\u{1F517}";

const HIGH_PRIORITY_MARKER: &str = "\u{1F534}";
const NORMAL_PRIORITY_MARKER: &str = "\u{1F535}";
const LOW_PRIORITY_MARKER: &str = "\u{26AA}";

/// Transport-ready message text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormattedMessage(String);

impl FormattedMessage {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for FormattedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Format an event; `System` and `Unknown` events produce nothing
pub fn format_event(event: &WebhookEvent) -> Option<FormattedMessage> {
    match event {
        WebhookEvent::Mention(data) => Some(format_mention(data)),
        WebhookEvent::Notification(data) => Some(format_notification(data)),
        WebhookEvent::System(_) | WebhookEvent::Unknown { .. } => None,
    }
}

pub fn format_mention(data: &MentionData) -> FormattedMessage {
    let mut lines = vec![format!(
        "{} <b>New mention from {}</b>",
        MENTION_ICON,
        escape_html(&data.user)
    )];

    if let Some(channel) = present(&data.channel) {
        lines.push(format!("{} #{}", CHANNEL_ICON, escape_html(channel)));
    }
    lines.push(format!("{} {}", CLOCK_ICON, format_timestamp(&data.timestamp)));

    push_block(&mut lines, vec![escape_html(&data.message)]);

    let mut footer = Vec::new();
    if let Some(context) = present(&data.context) {
        footer.push(format!("<i>Context:</i> {}", escape_html(context)));
    }
    if let Some(url) = present(&data.url) {
        footer.push(format!(
            "{} <a href=\"{}\">Open in workspace</a>",
            LINK_ICON,
            escape_html(url)
        ));
    }
    push_block(&mut lines, footer);

    FormattedMessage(lines.join("\n"))
}

pub fn format_notification(data: &NotificationData) -> FormattedMessage {
    let title = present(&data.title).map(escape_html);
    let mut lines = vec![format!(
        "{} <b>{}</b>",
        priority_marker(data.priority),
        title.as_deref().unwrap_or("Notification")
    )];
    lines.push(format!("{} {}", CLOCK_ICON, format_timestamp(&data.timestamp)));

    push_block(&mut lines, vec![escape_html(&data.message)]);

    FormattedMessage(lines.join("\n"))
}

/// Marker shown in front of a notification title
pub fn priority_marker(priority: Option<Priority>) -> &'static str {
    match priority {
        Some(Priority::High) => HIGH_PRIORITY_MARKER,
        Some(Priority::Low) => LOW_PRIORITY_MARKER,
        Some(Priority::Normal) | None => NORMAL_PRIORITY_MARKER,
    }
}

/// Escape the three characters significant to Telegram HTML
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Render an ISO-8601 timestamp for humans, falling back to the raw text
pub fn format_timestamp(raw: &str) -> String {
    match parse_timestamp(raw) {
        Some(ts) => ts.format("%b %-d, %Y at %H:%M UTC").to_string(),
        None => escape_html(raw),
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // No offset given: read as UTC
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Append a blank-line separated block, skipping empty blocks
fn push_block(lines: &mut Vec<String>, block: Vec<String>) {
    let block: Vec<String> = block.into_iter().filter(|l| !l.trim().is_empty()).collect();
    if block.is_empty() {
        return;
    }
    lines.push(String::new());
    lines.extend(block);
}
