use crate::zones::Configuration;
use serde_json::{Value, json};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:5000";

const SAVE_PATH: &str = "/api/save-settings";
const ZONE_PATH: &str = "/api/calculate-zone";

#[derive(Debug)]
pub enum RemoteError {
    /// The server answered with an error object. `details` holds its
    /// human-readable messages, possibly none.
    Rejected { details: Vec<String> },
    /// The request never produced a usable JSON answer.
    Transport(Box<dyn std::error::Error + Send + Sync>),
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteError::Rejected { details } if details.is_empty() => {
                write!(f, "request rejected")
            }
            RemoteError::Rejected { details } => {
                write!(f, "request rejected: {}", details.join("; "))
            }
            RemoteError::Transport(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for RemoteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RemoteError::Rejected { .. } => None,
            RemoteError::Transport(e) => Some(&**e),
        }
    }
}

/// Result of the zone lookup for the displayed average heart rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZoneReading {
    Matched { zone: String, name: String },
    /// The server could not use the value; `message` says why.
    Invalid { message: String },
    Unknown,
}

impl ZoneReading {
    fn from_response(zone: String, name: String) -> Self {
        match zone.as_str() {
            "Invalid" => ZoneReading::Invalid { message: name },
            "Unknown Zone" => ZoneReading::Unknown,
            _ => ZoneReading::Matched { zone, name },
        }
    }

    pub fn display_text(&self) -> String {
        match self {
            ZoneReading::Matched { zone, name } => format!("{zone}: {name}"),
            ZoneReading::Invalid { message } => message.clone(),
            ZoneReading::Unknown => "Unknown Zone: No matching zone found".to_string(),
        }
    }
}

/// Read an average heart rate shown as text such as `"142.5 bpm"`.
pub fn parse_average_hr(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    let number = trimmed.strip_suffix("bpm").unwrap_or(trimmed).trim_end();
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Remote store for zone settings plus the zone lookup that depends on them.
pub trait SettingsBackend {
    fn save_settings(&self, config: &Configuration) -> Result<(), RemoteError>;
    fn calculate_zone(&self, average_hr: &str) -> Result<ZoneReading, RemoteError>;
}

/// JSON-over-HTTP backend.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpBackend {
    pub fn new(base_url: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            agent,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn post_json(&self, path: &str, body: Value) -> Result<Value, RemoteError> {
        let url = format!("{}{path}", self.base_url);
        log::debug!("POST {url}");
        let response = match self
            .agent
            .post(&url)
            .set("Accept", "application/json")
            .send_json(body)
        {
            Ok(r) => r,
            // error statuses still carry the JSON error object
            Err(ureq::Error::Status(code, r)) => {
                log::warn!("{url} answered with status {code}");
                r
            }
            Err(e) => return Err(RemoteError::Transport(Box::new(e))),
        };
        let text = response
            .into_string()
            .map_err(|e| RemoteError::Transport(Box::new(e)))?;
        serde_json::from_str(&text).map_err(|e| RemoteError::Transport(Box::new(e)))
    }
}

fn rejection(body: &Value) -> Option<RemoteError> {
    let error = body.get("error")?;
    let falsy = match error {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    };
    if falsy {
        return None;
    }
    let details = body
        .get("details")
        .and_then(|v| v.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|d| d.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Some(RemoteError::Rejected { details })
}

impl SettingsBackend for HttpBackend {
    fn save_settings(&self, config: &Configuration) -> Result<(), RemoteError> {
        let body =
            serde_json::to_value(config).map_err(|e| RemoteError::Transport(Box::new(e)))?;
        let answer = self.post_json(SAVE_PATH, body)?;
        match rejection(&answer) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn calculate_zone(&self, average_hr: &str) -> Result<ZoneReading, RemoteError> {
        let value = match parse_average_hr(average_hr) {
            Some(v) => json!(v),
            None => json!(average_hr),
        };
        let answer = self.post_json(ZONE_PATH, json!({ "average_hr": value }))?;
        if let Some(err) = rejection(&answer) {
            return Err(err);
        }
        let zone = answer.get("zone").and_then(|v| v.as_str());
        let name = answer.get("name").and_then(|v| v.as_str());
        match (zone, name) {
            (Some(zone), Some(name)) => Ok(ZoneReading::from_response(
                zone.to_string(),
                name.to_string(),
            )),
            _ => Err(RemoteError::Transport(
                format!("unexpected zone response: {answer}").into(),
            )),
        }
    }
}
