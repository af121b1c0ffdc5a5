use serde_json::{Map, Value};

use crate::models::{Extraction, ParseStage, RecordKind};

pub trait StructuredRecord: Sized {
    const KIND: RecordKind;

    fn null_record() -> Self;

    /// Projects a parsed JSON object onto the typed record, normalizing each
    /// field. Must be total: unknown or malformed fields become null.
    fn from_object(object: &Map<String, Value>) -> Self;
}

/// Two-stage JSON object recovery from raw completion text.
///
/// Stage one parses the whole text and accepts it only if it is an object; any
/// other valid JSON falls through. Stage two parses the span from the first
/// `{` to the last `}`. That span over-captures when the text holds several
/// separate objects, in which case stage two fails and the caller falls back
/// to the null record.
pub fn parse_json_object(raw: &str) -> Option<(Map<String, Value>, ParseStage)> {
    let text = raw.trim().trim_matches('\u{feff}');

    if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(text) {
        return Some((object, ParseStage::Strict));
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if start >= end {
        return None;
    }

    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(object)) => Some((object, ParseStage::Recovered)),
        _ => None,
    }
}

pub fn extract_record<R: StructuredRecord>(raw: &str) -> Extraction<R> {
    match parse_json_object(raw) {
        Some((object, parse_stage)) => Extraction {
            record: R::from_object(&object),
            parse_stage,
        },
        None => Extraction {
            record: R::null_record(),
            parse_stage: ParseStage::Fallback,
        },
    }
}
