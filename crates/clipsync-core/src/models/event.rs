//! Event descriptor: naming data derived from a Frigate event record.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;

use crate::error::EventError;
use crate::models::folder::FolderPath;

/// Extension of every uploaded clip
pub const VIDEO_EXTENSION: &str = "mp4";

/// Immutable view of one event, with its start time resolved in UTC and in
/// the configured local zone.
///
/// Filename and folder derivation depend only on the event fields and the
/// zone, so a retried upload always targets the same destination.
#[derive(Debug, Clone, PartialEq)]
pub struct EventDescriptor {
    event_id: String,
    camera_name: String,
    start_time: f64,
    start_time_utc: DateTime<Utc>,
    start_time_local: DateTime<Tz>,
}

impl EventDescriptor {
    pub fn new(
        event_id: impl Into<String>,
        camera_name: impl Into<String>,
        start_time: f64,
        timezone: Tz,
    ) -> Result<Self, EventError> {
        let event_id = event_id.into();
        let camera_name = camera_name.into();

        if event_id.trim().is_empty() {
            return Err(EventError::InvalidField {
                field: "id",
                reason: "must not be empty".to_string(),
            });
        }
        if camera_name.trim().is_empty() {
            return Err(EventError::InvalidField {
                field: "camera",
                reason: "must not be empty".to_string(),
            });
        }

        let start_time_utc = timestamp_to_utc(start_time)?;
        let start_time_local = start_time_utc.with_timezone(&timezone);

        Ok(Self {
            event_id,
            camera_name,
            start_time,
            start_time_utc,
            start_time_local,
        })
    }

    /// Build a descriptor from a raw event mapping with at least `id`,
    /// `camera` and a numeric `start_time`.
    pub fn from_event(event: &Value, timezone: Tz) -> Result<Self, EventError> {
        let event_id = required_str(event, "id")?;
        let camera_name = required_str(event, "camera")?;
        let start_time = match event.get("start_time") {
            None | Some(Value::Null) => return Err(EventError::MissingField("start_time")),
            Some(value) => value.as_f64().ok_or_else(|| EventError::InvalidField {
                field: "start_time",
                reason: format!("expected a numeric Unix timestamp, got {}", value),
            })?,
        };

        Self::new(event_id, camera_name, start_time, timezone)
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    pub fn start_time_utc(&self) -> DateTime<Utc> {
        self.start_time_utc
    }

    pub fn start_time_local(&self) -> DateTime<Tz> {
        self.start_time_local
    }

    /// `YYYY-MM-DD-HH-MM-SS__<camera>__<event id>.mp4`, local time
    pub fn generate_filename(&self) -> String {
        format!(
            "{}__{}__{}.{}",
            self.start_time_local.format("%Y-%m-%d-%H-%M-%S"),
            self.camera_name,
            self.event_id,
            VIDEO_EXTENSION
        )
    }

    /// `<base>/<year>/<month>/<day>` with zero-padded local date components,
    /// matching the date embedded in the filename.
    pub fn generate_folder_path(&self, base: &str) -> FolderPath {
        FolderPath::new(base)
            .join(format!("{:04}", self.start_time_local.year()))
            .join(format!("{:02}", self.start_time_local.month()))
            .join(format!("{:02}", self.start_time_local.day()))
    }
}

fn required_str(event: &Value, field: &'static str) -> Result<String, EventError> {
    match event.get(field) {
        None | Some(Value::Null) => Err(EventError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(EventError::InvalidField {
            field,
            reason: format!("expected a string, got {}", other),
        }),
    }
}

fn timestamp_to_utc(start_time: f64) -> Result<DateTime<Utc>, EventError> {
    if !start_time.is_finite() {
        return Err(EventError::InvalidTimestamp(start_time));
    }

    let secs = start_time.floor();
    if secs < i64::MIN as f64 || secs > i64::MAX as f64 {
        return Err(EventError::InvalidTimestamp(start_time));
    }
    let nanos = (((start_time - secs) * 1_000_000_000.0) as u32).min(999_999_999);

    Utc.timestamp_opt(secs as i64, nanos)
        .single()
        .ok_or(EventError::InvalidTimestamp(start_time))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono_tz::{America, Europe};
    use serde_json::json;

    fn sample_event() -> Value {
        json!({
            "id": "abc123",
            "camera": "front_door",
            "start_time": 1700000000,
            "label": "person",
        })
    }

    #[test]
    fn test_filename_uses_local_time() {
        // 2023-11-14T22:13:20Z is already the next day in Istanbul (UTC+3)
        let event = EventDescriptor::from_event(&sample_event(), Europe::Istanbul).unwrap();
        assert_eq!(
            event.generate_filename(),
            "2023-11-15-01-13-20__front_door__abc123.mp4"
        );
        assert_eq!(
            event.start_time_utc().format("%Y-%m-%d %H:%M:%S").to_string(),
            "2023-11-14 22:13:20"
        );
    }

    #[test]
    fn test_folder_path_matches_filename_date() {
        let event = EventDescriptor::from_event(&sample_event(), Europe::Istanbul).unwrap();
        let folder = event.generate_folder_path("Frigate");
        assert_eq!(folder.segments(), ["Frigate", "2023", "11", "15"]);
        assert!(event
            .generate_filename()
            .starts_with(&folder.segments()[1..].join("-")));
    }

    #[test]
    fn test_other_timezone_changes_derived_names() {
        let event = EventDescriptor::from_event(&sample_event(), America::New_York).unwrap();
        assert_eq!(
            event.generate_filename(),
            "2023-11-14-17-13-20__front_door__abc123.mp4"
        );
        assert_eq!(event.generate_folder_path("base").to_string(), "base/2023/11/14");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let first = EventDescriptor::from_event(&sample_event(), Europe::Istanbul).unwrap();
        let second = EventDescriptor::from_event(&sample_event(), Europe::Istanbul).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.generate_filename(), second.generate_filename());
        assert_eq!(
            first.generate_folder_path("Frigate"),
            second.generate_folder_path("Frigate")
        );
    }

    #[test]
    fn test_fractional_start_time_truncates_in_filename() {
        let raw = json!({"id": "e1", "camera": "yard", "start_time": 1700000000.987});
        let event = EventDescriptor::from_event(&raw, Europe::Istanbul).unwrap();
        assert_eq!(event.generate_filename(), "2023-11-15-01-13-20__yard__e1.mp4");
        assert_eq!(event.start_time(), 1700000000.987);
    }

    #[test]
    fn test_missing_fields_are_rejected() {
        let raw = json!({"camera": "yard", "start_time": 1.0});
        assert_eq!(
            EventDescriptor::from_event(&raw, Europe::Istanbul).unwrap_err(),
            EventError::MissingField("id")
        );

        let raw = json!({"id": "e1", "start_time": 1.0});
        assert_eq!(
            EventDescriptor::from_event(&raw, Europe::Istanbul).unwrap_err(),
            EventError::MissingField("camera")
        );

        let raw = json!({"id": "e1", "camera": "yard", "start_time": null});
        assert_eq!(
            EventDescriptor::from_event(&raw, Europe::Istanbul).unwrap_err(),
            EventError::MissingField("start_time")
        );
    }

    #[test]
    fn test_non_numeric_start_time_is_rejected() {
        let raw = json!({"id": "e1", "camera": "yard", "start_time": "yesterday"});
        assert!(matches!(
            EventDescriptor::from_event(&raw, Europe::Istanbul),
            Err(EventError::InvalidField { field: "start_time", .. })
        ));
    }

    #[test]
    fn test_out_of_range_start_time_is_rejected() {
        assert!(matches!(
            EventDescriptor::new("e1", "yard", f64::NAN, Europe::Istanbul),
            Err(EventError::InvalidTimestamp(_))
        ));
        assert!(matches!(
            EventDescriptor::new("e1", "yard", 1e20, Europe::Istanbul),
            Err(EventError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_non_string_id_is_rejected() {
        let raw = json!({"id": 42, "camera": "yard", "start_time": 1.0});
        assert!(matches!(
            EventDescriptor::from_event(&raw, Europe::Istanbul),
            Err(EventError::InvalidField { field: "id", .. })
        ));
    }
}
