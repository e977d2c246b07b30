//! The fixed decision table: `(kind, threat_level)` → output commands.
//!
//! - critical / high → alert to the configured notification target
//! - medium          → moderation command to the originating channel
//! - low / none      → nothing

use aegis_domain::{InputEvent, OutputCommand, ThreatLevel};

/// Decide 0..N commands for one classified event.
pub fn decide(event: &InputEvent, notification_target: &str) -> Vec<OutputCommand> {
    match event.classification.threat_level {
        ThreatLevel::Critical | ThreatLevel::High => vec![alert(event, notification_target)],
        ThreatLevel::Medium => vec![moderation(event)],
        ThreatLevel::Low | ThreatLevel::None => Vec::new(),
    }
}

fn alert(event: &InputEvent, notification_target: &str) -> OutputCommand {
    let level = event.classification.threat_level;
    let mut command = OutputCommand::new(
        event.kind,
        notification_target,
        format!(
            "[{level}] {} threat from {} (confidence {:.2}): {}",
            event.kind,
            event.source,
            event.classification.confidence,
            event.classification.indicators.join("; "),
        ),
    );
    command.priority = level as i32;
    command.metadata.insert("action".into(), "alert".into());
    command.metadata.insert("event_id".into(), event.id.clone());
    command
}

fn moderation(event: &InputEvent) -> OutputCommand {
    // Reply into the originating channel when the event carries one;
    // otherwise address the source directly.
    let target = event
        .metadata
        .get("target")
        .or_else(|| event.metadata.get("channel_id"))
        .cloned()
        .unwrap_or_else(|| event.source.clone());

    let mut command = OutputCommand::new(
        event.kind,
        target,
        format!(
            "message from {} flagged ({}); content withheld pending review",
            event.source,
            event.classification.indicators.join("; "),
        ),
    );
    command.priority = event.classification.threat_level as i32;
    command.metadata.insert("action".into(), "moderation".into());
    command.metadata.insert("event_id".into(), event.id.clone());
    command
}
