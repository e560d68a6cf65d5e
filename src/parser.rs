//! Extraction of object detections from free-form vision model output.
//!
//! The model is asked to answer with a fenced ```json block. Its output is not
//! guaranteed to follow that, so parsing never fails: anything that cannot be
//! read as detections is handed back verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedResponse {
    Detections(Vec<Detection>),
    RawText(String),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Envelope {
    Single { object: Detection },
    Many { objects: Vec<Detection> },
}

impl ParsedResponse {
    /// Detections, or an empty slice when the model answer was not structured.
    pub fn detections(&self) -> &[Detection] {
        match self {
            Self::Detections(detections) => detections,
            Self::RawText(_) => &[],
        }
    }
}

impl fmt::Display for ParsedResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detections(detections) if detections.is_empty() => write!(f, "nothing"),
            Self::Detections(detections) => {
                let described: Vec<String> = detections
                    .iter()
                    .map(|d| {
                        format!(
                            "{} at ({:.1}, {:.1}, {:.1})",
                            d.name, d.position.x, d.position.y, d.position.z
                        )
                    })
                    .collect();
                write!(f, "{}", described.join(", "))
            }
            Self::RawText(text) => write!(f, "{}", text.trim()),
        }
    }
}

pub fn parse(raw: &str) -> ParsedResponse {
    let Some(block) = first_fenced_json(raw) else {
        warn!("No ```json block in model response, passing raw text through");
        return ParsedResponse::RawText(raw.to_string());
    };

    match serde_json::from_str::<Envelope>(&block) {
        Ok(Envelope::Single { object }) => ParsedResponse::Detections(vec![object]),
        Ok(Envelope::Many { objects }) => ParsedResponse::Detections(objects),
        Err(e) => {
            warn!("Failed to parse JSON from model response: {}", e);
            debug!("Unparseable block: {}", block);
            ParsedResponse::RawText(raw.to_string())
        }
    }
}

/// Renders detections back into the fenced form the model is asked to produce.
pub fn fence(detections: &[Detection]) -> String {
    let envelope = match detections {
        [single] => Envelope::Single { object: single.clone() },
        many => Envelope::Many { objects: many.to_vec() },
    };
    // Plain data with string keys, serialization cannot fail.
    let body = serde_json::to_string_pretty(&envelope).unwrap_or_default();
    format!("```json\n{}\n```", body)
}

/// Lines after the first opening fence, up to its closing fence.
fn first_fenced_json(raw: &str) -> Option<String> {
    let mut lines = raw.lines();
    lines.by_ref().find(|line| line.trim().eq_ignore_ascii_case("```json"))?;
    let body: Vec<&str> = lines
        .take_while(|line| !line.trim_start().starts_with("```"))
        .collect();
    Some(body.join("\n"))
}
