//! Conversions between wire (`pb`) and domain representations.
//!
//! Domain → wire is infallible. Wire → domain validates the enum
//! spellings and timestamps, so a misbehaving peer surfaces as a
//! `validation` error instead of a panic.

use chrono::{DateTime, Utc};

use aegis_domain::{
    ChannelKind, Classification, Error, InputEvent, OutputCommand, OutputResult, ThreatLevel,
};

use crate::pb;

fn millis(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64, field: &str) -> Result<DateTime<Utc>, Error> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| Error::Validation(format!("{field}: timestamp out of range: {ms}")))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl From<Classification> for pb::Classification {
    fn from(c: Classification) -> Self {
        pb::Classification {
            threat_level: c.threat_level.to_string(),
            confidence: c.confidence,
            scores: c.scores.into_iter().collect(),
            indicators: c.indicators,
            recommendations: c.recommendations,
        }
    }
}

impl TryFrom<pb::Classification> for Classification {
    type Error = Error;

    fn try_from(c: pb::Classification) -> Result<Self, Error> {
        Ok(Classification {
            threat_level: c.threat_level.parse::<ThreatLevel>()?,
            confidence: c.confidence,
            scores: c.scores.into_iter().collect(),
            indicators: c.indicators,
            recommendations: c.recommendations,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// InputEvent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl From<InputEvent> for pb::InputEvent {
    fn from(e: InputEvent) -> Self {
        pb::InputEvent {
            id: e.id,
            kind: e.kind.to_string(),
            source: e.source,
            content: e.content,
            metadata: e.metadata,
            timestamp_ms: millis(e.timestamp),
            priority: e.priority,
            classification: Some(e.classification.into()),
        }
    }
}

impl TryFrom<pb::InputEvent> for InputEvent {
    type Error = Error;

    fn try_from(e: pb::InputEvent) -> Result<Self, Error> {
        let classification = e
            .classification
            .ok_or_else(|| Error::Validation("event missing classification".into()))?
            .try_into()?;
        Ok(InputEvent {
            id: e.id,
            kind: e.kind.parse::<ChannelKind>()?,
            source: e.source,
            content: e.content,
            metadata: e.metadata,
            timestamp: from_millis(e.timestamp_ms, "timestamp_ms")?,
            priority: e.priority,
            classification,
        })
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// OutputCommand / OutputResult
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

impl From<OutputCommand> for pb::OutputCommand {
    fn from(c: OutputCommand) -> Self {
        pb::OutputCommand {
            id: c.id,
            kind: c.kind.to_string(),
            target: c.target,
            content: c.content,
            metadata: c.metadata,
            priority: c.priority,
            created_at_ms: millis(c.created_at),
        }
    }
}

impl TryFrom<pb::OutputCommand> for OutputCommand {
    type Error = Error;

    fn try_from(c: pb::OutputCommand) -> Result<Self, Error> {
        Ok(OutputCommand {
            id: c.id,
            kind: c.kind.parse::<ChannelKind>()?,
            target: c.target,
            content: c.content,
            metadata: c.metadata,
            priority: c.priority,
            created_at: from_millis(c.created_at_ms, "created_at_ms")?,
        })
    }
}

impl From<OutputResult> for pb::OutputResult {
    fn from(r: OutputResult) -> Self {
        pb::OutputResult {
            command_id: r.command_id,
            success: r.success,
            completed_at_ms: millis(r.completed_at),
            error: r.error.unwrap_or_default(),
        }
    }
}

impl TryFrom<pb::OutputResult> for OutputResult {
    type Error = Error;

    fn try_from(r: pb::OutputResult) -> Result<Self, Error> {
        Ok(OutputResult {
            command_id: r.command_id,
            success: r.success,
            completed_at: from_millis(r.completed_at_ms, "completed_at_ms")?,
            error: if r.error.is_empty() { None } else { Some(r.error) },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> InputEvent {
        let mut classification = Classification::benign(&["spam", "flood"]);
        classification.scores.insert("spam".into(), 0.7);
        classification.indicators.push("spam keyword: prize".into());
        let classification = classification.finalize();

        InputEvent::new(ChannelKind::Sms, "+15550001111", "WIN BIG", classification)
            .with_metadata("channel", "sms")
            .with_priority(3)
    }

    #[test]
    fn input_event_round_trips() {
        let original = event();
        let wire: pb::InputEvent = original.clone().into();
        let back: InputEvent = wire.try_into().unwrap();

        assert_eq!(back.id, original.id);
        assert_eq!(back.kind, original.kind);
        assert_eq!(back.priority, 3);
        assert_eq!(back.classification.score("spam"), 0.7);
        assert_eq!(back.metadata["channel"], "sms");
        // Millisecond precision is the wire contract.
        assert_eq!(
            back.timestamp.timestamp_millis(),
            original.timestamp.timestamp_millis()
        );
    }

    #[test]
    fn command_and_result_round_trip() {
        let command = OutputCommand::new(ChannelKind::Discord, "guild:1/chan:2", "handled");
        let wire: pb::OutputCommand = command.clone().into();
        let back: OutputCommand = wire.try_into().unwrap();
        assert_eq!(back.id, command.id);
        assert_eq!(back.kind, ChannelKind::Discord);

        let result = OutputResult::failed(&command.id, "transport: relay 503");
        let wire: pb::OutputResult = result.into();
        let back: OutputResult = wire.try_into().unwrap();
        assert!(!back.success);
        assert_eq!(back.error.as_deref(), Some("transport: relay 503"));
    }

    #[test]
    fn empty_error_string_becomes_none() {
        let wire = pb::OutputResult {
            command_id: "c".into(),
            success: true,
            completed_at_ms: 1_700_000_000_000,
            error: String::new(),
        };
        let back: OutputResult = wire.try_into().unwrap();
        assert!(back.error.is_none());
    }

    #[test]
    fn bad_kind_is_rejected() {
        let mut wire: pb::InputEvent = event().into();
        wire.kind = "pigeon".into();
        let err = InputEvent::try_from(wire).unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn missing_classification_is_rejected() {
        let mut wire: pb::InputEvent = event().into();
        wire.classification = None;
        let err = InputEvent::try_from(wire).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }
}
