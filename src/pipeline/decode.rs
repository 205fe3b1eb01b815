//! Structured-output decoding of model responses
//!
//! Every decoder returns `Result<_, ModelParseError>`: `Ok` with an empty
//! payload means the model found nothing, `Err` means the response was
//! malformed. Callers treat the error as fatal for the whole operation.

use crate::graph::ClauseExplanation;
use serde::Deserialize;
use serde_json::Value;

/// How much of a bad response to keep in the error message.
const EXCERPT_CHARS: usize = 200;

/// The model's response did not have the expected shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{reason} (response began: {excerpt:?})")]
pub struct ModelParseError {
    pub reason: String,
    pub excerpt: String,
}

impl ModelParseError {
    fn new(reason: impl Into<String>, response: &str) -> Self {
        Self {
            reason: reason.into(),
            excerpt: response.chars().take(EXCERPT_CHARS).collect(),
        }
    }
}

/// One (category, verbatim text) assignment proposed by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExtractedPair {
    #[serde(alias = "category")]
    pub entity_name: String,
    #[serde(alias = "text")]
    pub relevant_text: String,
}

/// Extract a JSON value from model response text.
///
/// Models sometimes wrap JSON in markdown code fences or add explanation text.
/// This function tries, in order:
/// 1. Direct parse (response is pure JSON)
/// 2. Extract from ```json ... ``` or ``` ... ``` fenced block
/// 3. The outermost `[`..`]` or `{`..`}` span
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    // Try 1: Direct parse
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        if v.is_object() || v.is_array() {
            return Some(v);
        }
    }

    // Try 2: Extract from fenced code block
    let fenced = if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        after.find("```").map(|end| &after[..end])
    } else if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        after.find("```").map(|end| &after[..end])
    } else {
        None
    };

    if let Some(block) = fenced {
        if let Ok(v) = serde_json::from_str::<Value>(block.trim()) {
            return Some(v);
        }
    }

    // Try 3: outermost bracketed span
    for (open, close) in [('[', ']'), ('{', '}')] {
        if let (Some(start), Some(end)) = (trimmed.find(open), trimmed.rfind(close)) {
            if start < end {
                if let Ok(v) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                    return Some(v);
                }
            }
        }
    }

    None
}

/// Decode an extraction response into (category, text) pairs.
///
/// Accepts a bare array of pairs, an object holding that array (JSON mode
/// forces a top-level object; `entities` wins, then any array-valued key),
/// or a single pair object.
pub fn decode_extraction(response: &str) -> Result<Vec<ExtractedPair>, ModelParseError> {
    let value = extract_json(response)
        .ok_or_else(|| ModelParseError::new("no valid JSON found in extraction response", response))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(map) if map.contains_key("entity_name") || map.contains_key("category") => {
            vec![Value::Object(map)]
        }
        Value::Object(mut map) => {
            let items = match map.remove("entities") {
                Some(Value::Array(items)) => Some(items),
                _ => map.into_iter().find_map(|(_, v)| match v {
                    Value::Array(items) => Some(items),
                    _ => None,
                }),
            };
            match items {
                Some(items) => items,
                None => {
                    return Err(ModelParseError::new(
                        "extraction response object holds no array of pairs",
                        response,
                    ))
                }
            }
        }
        _ => {
            return Err(ModelParseError::new(
                "extraction response is not an array or object",
                response,
            ))
        }
    };

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| {
            serde_json::from_value::<ExtractedPair>(item)
                .map_err(|e| ModelParseError::new(format!("pair {}: {}", i, e), response))
        })
        .collect()
}

/// Decode an explanation response into `{meaning, counters}`.
pub fn decode_explanation(response: &str) -> Result<ClauseExplanation, ModelParseError> {
    let value = extract_json(response)
        .ok_or_else(|| ModelParseError::new("no valid JSON found in explanation response", response))?;
    if !value.is_object() {
        return Err(ModelParseError::new(
            "explanation response is not an object",
            response,
        ));
    }
    serde_json::from_value(value).map_err(|e| ModelParseError::new(e.to_string(), response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_array_of_pairs() {
        let pairs = decode_extraction(
            r#"[{"entity_name": "Benefits", "relevant_text": "20 days of paid vacation"}]"#,
        )
        .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].entity_name, "Benefits");
        assert_eq!(pairs[0].relevant_text, "20 days of paid vacation");
    }

    #[test]
    fn array_wrapped_in_object() {
        let pairs = decode_extraction(
            r#"{"entities": [
                {"entity_name": "Compensation", "relevant_text": "$60,000 per annum"},
                {"entity_name": "Termination", "relevant_text": "30 days notice"}
            ]}"#,
        )
        .unwrap();
        let names: Vec<&str> = pairs.iter().map(|p| p.entity_name.as_str()).collect();
        assert_eq!(names, vec!["Compensation", "Termination"]);
    }

    #[test]
    fn entities_key_wins_over_other_arrays() {
        let pairs = decode_extraction(
            r#"{"analysis": ["two clauses found"],
                "entities": [{"entity_name": "Benefits", "relevant_text": "20 days"}]}"#,
        )
        .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].entity_name, "Benefits");
    }

    #[test]
    fn fenced_response_with_prose() {
        let text = "Here you go:\n```json\n[{\"entity_name\": \"Benefits\", \"relevant_text\": \"x\"}]\n```\nDone.";
        assert_eq!(decode_extraction(text).unwrap().len(), 1);
    }

    #[test]
    fn single_pair_object() {
        let pairs = decode_extraction(r#"{"category": "Governing Law", "text": "Laws of Delaware"}"#).unwrap();
        assert_eq!(pairs[0].entity_name, "Governing Law");
        assert_eq!(pairs[0].relevant_text, "Laws of Delaware");
    }

    #[test]
    fn empty_array_is_no_data_not_an_error() {
        assert!(decode_extraction("[]").unwrap().is_empty());
        assert!(decode_extraction(r#"{"entities": []}"#).unwrap().is_empty());
    }

    #[test]
    fn malformed_responses_are_parse_errors() {
        assert!(decode_extraction("I could not find any clauses.").is_err());
        assert!(decode_extraction(r#"{"note": "nothing"}"#).is_err());
        assert!(decode_extraction(r#"[{"entity_name": "Benefits"}]"#).is_err());
        assert!(decode_extraction("42").is_err());
    }

    #[test]
    fn parse_error_keeps_short_excerpt() {
        let long = "x".repeat(1000);
        let err = decode_extraction(&long).unwrap_err();
        assert_eq!(err.excerpt.len(), EXCERPT_CHARS);
    }

    #[test]
    fn explanation_with_counters() {
        let explanation = decode_explanation(
            r#"{"meaning": "You get 20 days off.", "counters": ["Ask for 25 days"]}"#,
        )
        .unwrap();
        assert_eq!(explanation.meaning, "You get 20 days off.");
        assert_eq!(explanation.counters, vec!["Ask for 25 days"]);
    }

    #[test]
    fn explanation_counters_default_to_empty() {
        let explanation = decode_explanation(r#"{"meaning": "Standard clause."}"#).unwrap();
        assert!(explanation.counters.is_empty());
    }

    #[test]
    fn explanation_without_meaning_is_error() {
        assert!(decode_explanation(r#"{"counters": []}"#).is_err());
        assert!(decode_explanation(r#"["meaning"]"#).is_err());
    }
}
