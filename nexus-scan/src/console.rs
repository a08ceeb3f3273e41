//! Operator console
//!
//! Line-oriented front end: one command per stdin line, bus events printed
//! as single lines.

use crate::controller::OperatorCommand;
use nexus_common::events::{CameraStatus, NexusEvent, NotificationLevel};
use nexus_common::time::format_clock;

/// Parse one console line
///
/// `t <id>` (or `ticket <id>`) submits a manual entry, even when the id
/// collides with a keyword. Known keywords map to commands; any other
/// non-blank line is a manual ticket entry. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<OperatorCommand> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (head, rest) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(head, rest)| (head, rest.trim()));
    if matches!(head.to_ascii_lowercase().as_str(), "t" | "ticket") {
        return Some(OperatorCommand::SubmitManual(rest.to_string()));
    }

    let command = match trimmed.to_ascii_lowercase().as_str() {
        "allow" => OperatorCommand::Allow,
        "deny" => OperatorCommand::Deny,
        "dismiss" => OperatorCommand::Dismiss,
        "manual" => OperatorCommand::OpenManualEntry,
        "cancel" => OperatorCommand::CloseManualEntry,
        "torch" => OperatorCommand::ToggleTorch,
        "hide" => OperatorCommand::SetPageVisible(false),
        "show" => OperatorCommand::SetPageVisible(true),
        "stats" => OperatorCommand::RefreshStats,
        "quit" | "exit" => OperatorCommand::Shutdown,
        _ => OperatorCommand::SubmitManual(trimmed.to_string()),
    };
    Some(command)
}

/// Render an event for the console
pub fn render_event(event: &NexusEvent) -> String {
    match event {
        NexusEvent::Notification { level, message, .. } => {
            let tag = match level {
                NotificationLevel::Info => "info",
                NotificationLevel::Success => "ok",
                NotificationLevel::Error => "error",
            };
            format!("[{}] {}", tag, message)
        }
        NexusEvent::CameraStatusChanged { status, .. } => match status {
            CameraStatus::Stopped => "camera: stopped".to_string(),
            CameraStatus::Active => "camera: active".to_string(),
            CameraStatus::Degraded { reason } => format!("camera: degraded ({})", reason),
            CameraStatus::Unavailable { reason } => format!("camera: unavailable ({})", reason),
        },
        NexusEvent::CandidatePresented {
            title,
            message,
            ticket_id,
            attendee_name,
            entry_decision_available,
            ..
        } => {
            let mut line = format!("== {} == {}", title, message);
            if let Some(name) = attendee_name {
                line.push_str(&format!(" | {}", name));
            }
            if let Some(id) = ticket_id {
                line.push_str(&format!(" | {}", id));
            }
            if *entry_decision_available {
                line.push_str(" | allow / deny");
            } else {
                line.push_str(" | dismiss");
            }
            line
        }
        NexusEvent::CandidateCleared { decision, timestamp, .. } => match decision {
            Some(decision) => format!("{} cleared: {}", format_clock(*timestamp), decision),
            None => format!("{} cleared", format_clock(*timestamp)),
        },
        NexusEvent::StatsUpdated {
            checked_in,
            remaining,
            capacity,
            ..
        } => format!(
            "checked in: {} | remaining: {} | capacity: {}",
            checked_in, remaining, capacity
        ),
        NexusEvent::ConnectivityChanged { online: true, .. } => "backend: online".to_string(),
        NexusEvent::ConnectivityChanged { online: false, .. } => "backend: offline".to_string(),
        NexusEvent::RecentScansUpdated { entries, .. } => {
            if entries.is_empty() {
                "recent: (none)".to_string()
            } else {
                format!("recent: {}", entries.join(" ; "))
            }
        }
    }
}
