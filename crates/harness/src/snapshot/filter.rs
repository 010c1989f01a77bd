//! Response filters: strip what is expected to change between runs, then compare

use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// One differing location between a response and its reference
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    /// JSON path, e.g. `$.journeys[0].duration`
    pub path: String,
    /// Value in the reference, `None` when absent there
    pub reference: Option<Value>,
    /// Value in the live response, `None` when absent there
    pub response: Option<Value>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.reference, &self.response) {
            (Some(r), Some(l)) => write!(f, "{}: expected {} got {}", self.path, r, l),
            (Some(r), None) => write!(f, "{}: missing in response (expected {})", self.path, r),
            (None, Some(l)) => write!(f, "{}: unexpected in response ({})", self.path, l),
            (None, None) => write!(f, "{}: differs", self.path),
        }
    }
}

/// Per-response-kind normalization and comparison
pub trait ResponseFilter: Send + Sync {
    /// Deterministic projection of a document onto its comparable part
    fn filter(&self, document: &Value) -> Value;

    /// Every difference between two filtered documents
    fn compare(&self, response: &Value, reference: &Value) -> Vec<Mismatch> {
        let mut out = Vec::new();
        structural_diff("$", reference, response, &mut out);
        out
    }
}

/// Drops volatile keys at any depth
#[derive(Debug, Clone)]
pub struct DefaultFilter {
    strip_keys: BTreeSet<String>,
}

impl Default for DefaultFilter {
    fn default() -> Self {
        Self::with_keys(["links", "updated_at", "current_datetime", "feed_publishers"])
    }
}

impl DefaultFilter {
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            strip_keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn strip_key(mut self, key: impl Into<String>) -> Self {
        self.strip_keys.insert(key.into());
        self
    }

    fn strip(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let mut out = Map::new();
                let mut keys: Vec<&String> = map.keys().filter(|k| !self.strip_keys.contains(*k)).collect();
                keys.sort();
                for key in keys {
                    out.insert(key.clone(), self.strip(&map[key]));
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(|v| self.strip(v)).collect()),
            other => other.clone(),
        }
    }
}

impl ResponseFilter for DefaultFilter {
    fn filter(&self, document: &Value) -> Value {
        self.strip(document)
    }
}

const JOURNEY_FIELDS: &[&str] = &[
    "type",
    "duration",
    "nb_transfers",
    "departure_date_time",
    "arrival_date_time",
    "status",
];

const SECTION_FIELDS: &[&str] = &["type", "mode", "transfer_type", "duration", "departure_date_time", "arrival_date_time"];

const PLACE_FIELDS: &[&str] = &["id", "name"];

const DISPLAY_FIELDS: &[&str] = &["code", "network", "direction", "commercial_mode"];

/// Keeps the itinerary-defining fields of a journeys response
#[derive(Debug, Clone, Default)]
pub struct JourneyFilter {
    base: DefaultFilter,
}

impl JourneyFilter {
    pub fn new(base: DefaultFilter) -> Self {
        Self { base }
    }

    fn journey(&self, journey: &Value) -> Value {
        let mut out = pick(journey, JOURNEY_FIELDS);
        if let Some(sections) = journey.get("sections").and_then(Value::as_array) {
            let sections = sections.iter().map(|s| self.section(s)).collect();
            out.insert("sections".to_string(), Value::Array(sections));
        }
        Value::Object(out)
    }

    fn section(&self, section: &Value) -> Value {
        let mut out = pick(section, SECTION_FIELDS);
        for place in ["from", "to"] {
            if let Some(p) = section.get(place) {
                out.insert(place.to_string(), Value::Object(pick(p, PLACE_FIELDS)));
            }
        }
        if let Some(d) = section.get("display_informations") {
            out.insert("display_informations".to_string(), Value::Object(pick(d, DISPLAY_FIELDS)));
        }
        Value::Object(out)
    }
}

impl ResponseFilter for JourneyFilter {
    fn filter(&self, document: &Value) -> Value {
        let mut out = Map::new();
        if let Some(journeys) = document.get("journeys").and_then(Value::as_array) {
            let journeys = journeys.iter().map(|j| self.journey(j)).collect();
            out.insert("journeys".to_string(), Value::Array(journeys));
        }
        if let Some(error) = document.get("error") {
            out.insert("error".to_string(), error.clone());
        }
        self.base.filter(&Value::Object(out))
    }
}

/// Copy the listed fields that exist in `value`
fn pick(value: &Value, fields: &[&str]) -> Map<String, Value> {
    let mut out = Map::new();
    for field in fields {
        if let Some(v) = value.get(*field) {
            out.insert((*field).to_string(), v.clone());
        }
    }
    out
}

/// Walk both documents, recording every differing path
pub fn structural_diff(path: &str, reference: &Value, response: &Value, out: &mut Vec<Mismatch>) {
    match (reference, response) {
        (Value::Object(r), Value::Object(l)) => {
            let keys: BTreeSet<&String> = r.keys().chain(l.keys()).collect();
            for key in keys {
                let child = format!("{path}.{key}");
                match (r.get(key), l.get(key)) {
                    (Some(rv), Some(lv)) => structural_diff(&child, rv, lv, out),
                    (rv, lv) => out.push(Mismatch {
                        path: child,
                        reference: rv.cloned(),
                        response: lv.cloned(),
                    }),
                }
            }
        }
        (Value::Array(r), Value::Array(l)) => {
            for (i, (rv, lv)) in r.iter().zip(l.iter()).enumerate() {
                structural_diff(&format!("{path}[{i}]"), rv, lv, out);
            }
            if r.len() != l.len() {
                out.push(Mismatch {
                    path: format!("{path}.length"),
                    reference: Some(Value::from(r.len())),
                    response: Some(Value::from(l.len())),
                });
            }
        }
        (r, l) if r != l => out.push(Mismatch {
            path: path.to_string(),
            reference: Some(r.clone()),
            response: Some(l.clone()),
        }),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_filter_strips_nested_keys() {
        let doc = json!({
            "links": [{"href": "http://localhost/x"}],
            "disruptions": [{"id": "d1", "updated_at": "20240301T101010"}],
            "context": {"current_datetime": "20240301T101010", "timezone": "Europe/Paris"}
        });
        let filtered = DefaultFilter::default().filter(&doc);
        assert_eq!(
            filtered,
            json!({"context": {"timezone": "Europe/Paris"}, "disruptions": [{"id": "d1"}]})
        );
    }

    #[test]
    fn test_filter_is_idempotent() {
        let doc = json!({"journeys": [{"duration": 100, "sections": [{"type": "public_transport",
            "from": {"id": "a", "name": "A", "coord": {}}, "links": []}]}], "links": []});
        let filter = JourneyFilter::default();
        let once = filter.filter(&doc);
        assert_eq!(filter.filter(&once), once);
    }

    #[test]
    fn test_journey_filter_projection() {
        let doc = json!({
            "journeys": [{
                "duration": 100,
                "co2_emission": {"value": 12.3},
                "tags": ["fastest"],
                "sections": [{
                    "type": "public_transport",
                    "from": {"id": "stop_area:A", "name": "A", "embedded_type": "stop_area"},
                    "to": {"id": "stop_area:B", "name": "B"},
                    "display_informations": {"code": "1", "color": "FFFFFF"},
                    "geojson": {"coordinates": []}
                }]
            }],
            "links": ["http://host/x"],
            "feed_publishers": []
        });
        let filtered = JourneyFilter::default().filter(&doc);
        assert_eq!(
            filtered,
            json!({"journeys": [{
                "duration": 100,
                "sections": [{
                    "type": "public_transport",
                    "from": {"id": "stop_area:A", "name": "A"},
                    "to": {"id": "stop_area:B", "name": "B"},
                    "display_informations": {"code": "1"}
                }]
            }]})
        );
    }

    #[test]
    fn test_compare_collects_every_mismatch() {
        let reference = json!({"journeys": [{"duration": 100, "nb_transfers": 0}, {"duration": 50}], "error": null});
        let response = json!({"journeys": [{"duration": 120, "type": "best"}]});
        let mismatches = DefaultFilter::default().compare(&response, &reference);
        let paths: Vec<&str> = mismatches.iter().map(|m| m.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "$.error",
                "$.journeys[0].duration",
                "$.journeys[0].nb_transfers",
                "$.journeys[0].type",
                "$.journeys.length",
            ]
        );
        assert_eq!(mismatches[1].to_string(), "$.journeys[0].duration: expected 100 got 120");
        assert!(mismatches[3].to_string().contains("unexpected in response"));
    }

    #[test]
    fn test_equal_documents_have_no_mismatch() {
        let doc = json!({"a": [1, 2, {"b": "c"}]});
        assert!(DefaultFilter::default().compare(&doc, &doc.clone()).is_empty());
    }
}
