use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub mod draft;
pub mod socketio;

pub use draft::{NewSimulation, SimulationDraft, ValidationError};

/// Backend-assigned identifier. Never reused within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SimulationId(pub u64);

impl fmt::Display for SimulationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SimulationId {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        input
            .trim()
            .parse::<u64>()
            .map(SimulationId)
            .map_err(|err| format!("invalid simulation id '{input}': {err}"))
    }
}

impl From<u64> for SimulationId {
    fn from(value: u64) -> Self {
        SimulationId(value)
    }
}

impl<'de> Deserialize<'de> for SimulationId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct SimulationIdVisitor;

        impl<'de> Visitor<'de> for SimulationIdVisitor {
            type Value = SimulationId;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a simulation id as integer or numeric string")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(SimulationId(value))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!(
                        "simulation id cannot be negative: {value}"
                    )));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<SimulationId>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SimulationIdVisitor)
    }
}

/// Canonical lifecycle of a simulation job.
///
/// The REST snapshot, the create response and the event stream all spell
/// this differently (display strings, numeric codes, quoted numerals). Every
/// encoding is folded into this enum while decoding, so nothing past the
/// transport boundary ever sees a raw status value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SimulationStatus {
    #[default]
    NotStarted,
    Running,
    Finished,
    Error,
}

impl SimulationStatus {
    pub const ALL: [SimulationStatus; 4] = [
        SimulationStatus::NotStarted,
        SimulationStatus::Running,
        SimulationStatus::Finished,
        SimulationStatus::Error,
    ];

    /// Spelling used by the backend REST layer.
    pub fn as_str(&self) -> &'static str {
        match self {
            SimulationStatus::NotStarted => "Not started",
            SimulationStatus::Running => "Running",
            SimulationStatus::Finished => "Finished",
            SimulationStatus::Error => "Error",
        }
    }

    /// Numeric code used by the job table (`0..=3`).
    pub fn code(&self) -> u8 {
        match self {
            SimulationStatus::NotStarted => 0,
            SimulationStatus::Running => 1,
            SimulationStatus::Finished => 2,
            SimulationStatus::Error => 3,
        }
    }

    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            0 => Some(SimulationStatus::NotStarted),
            1 => Some(SimulationStatus::Running),
            2 => Some(SimulationStatus::Finished),
            3 => Some(SimulationStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SimulationStatus::Finished | SimulationStatus::Error)
    }
}

impl fmt::Display for SimulationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimulationStatus {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let unquoted = input
            .trim()
            .trim_matches(|ch| ch == '\'' || ch == '"')
            .trim();
        if let Ok(code) = unquoted.parse::<u64>() {
            return SimulationStatus::from_code(code)
                .ok_or_else(|| format!("Unknown status code: {code}"));
        }
        let normalized: String = unquoted
            .chars()
            .filter(|ch| !matches!(ch, ' ' | '_' | '-'))
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "notstarted" => Ok(SimulationStatus::NotStarted),
            "running" | "pending" => Ok(SimulationStatus::Running),
            "finished" | "completed" | "completada" => Ok(SimulationStatus::Finished),
            "error" | "failed" | "fallida" => Ok(SimulationStatus::Error),
            _ => Err(format!("Unknown status: {input}")),
        }
    }
}

impl Serialize for SimulationStatus {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SimulationStatus {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StatusVisitor;

        impl<'de> Visitor<'de> for StatusVisitor {
            type Value = SimulationStatus;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("a simulation status as string or numeric code")
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                SimulationStatus::from_code(value)
                    .ok_or_else(|| E::custom(format!("unknown status code: {value}")))
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("unknown status code: {value}")));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<SimulationStatus>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(StatusVisitor)
    }
}

/// Whether the frequency-domain (attenuating) solver is used.
///
/// Sent as `0/1` on create; the detail form and older rows use `"Yes"/"No"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Attenuation(pub bool);

impl Attenuation {
    pub fn enabled(&self) -> bool {
        self.0
    }

    pub fn label(&self) -> &'static str {
        if self.0 {
            "Yes"
        } else {
            "No"
        }
    }
}

impl FromStr for Attenuation {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        match input.trim().to_ascii_lowercase().as_str() {
            "yes" | "1" | "true" => Ok(Attenuation(true)),
            "no" | "0" | "false" => Ok(Attenuation(false)),
            other => Err(format!("Unknown attenuation flag: {other}")),
        }
    }
}

impl Serialize for Attenuation {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u8(u8::from(self.0))
    }
}

impl<'de> Deserialize<'de> for Attenuation {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AttenuationVisitor;

        impl<'de> Visitor<'de> for AttenuationVisitor {
            type Value = Attenuation;

            fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                formatter.write_str("an attenuation flag as 0/1, bool or Yes/No")
            }

            fn visit_bool<E>(self, value: bool) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Attenuation(value))
            }

            fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                match value {
                    0 => Ok(Attenuation(false)),
                    1 => Ok(Attenuation(true)),
                    other => Err(E::custom(format!("attenuation flag out of range: {other}"))),
                }
            }

            fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                if value < 0 {
                    return Err(E::custom(format!("attenuation flag out of range: {value}")));
                }
                self.visit_u64(value as u64)
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<Attenuation>().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AttenuationVisitor)
    }
}

/// Numeric configuration of a simulation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationParams {
    #[serde(deserialize_with = "deserialize_count")]
    pub n_transmitter: u32,
    #[serde(deserialize_with = "deserialize_count")]
    pub n_receiver: u32,
    #[serde(deserialize_with = "deserialize_real")]
    pub emitters_pitch: f64,
    #[serde(deserialize_with = "deserialize_real")]
    pub receivers_pitch: f64,
    #[serde(deserialize_with = "deserialize_real")]
    pub sensor_distance: f64,
    #[serde(deserialize_with = "deserialize_real")]
    pub sensor_edge_margin: f64,
    #[serde(deserialize_with = "deserialize_real")]
    pub typical_mesh_size: f64,
    #[serde(deserialize_with = "deserialize_real")]
    pub plate_thickness: f64,
    #[serde(deserialize_with = "deserialize_real")]
    pub porosity: f64,
    pub attenuation: Attenuation,
}

impl SimulationParams {
    /// Plate length the backend derives from the sensor layout.
    pub fn plate_length(&self) -> f64 {
        self.sensor_edge_margin * 2.0
            + f64::from(self.n_transmitter) * self.emitters_pitch
            + self.sensor_distance
            + f64::from(self.n_receiver) * self.receivers_pitch
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Simulation {
    pub id: SimulationId,
    #[serde(rename = "sim_name")]
    pub name: String,
    #[serde(flatten)]
    pub params: SimulationParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plate_length: Option<f64>,
    #[serde(rename = "p_status", default)]
    pub status: SimulationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

impl Simulation {
    /// Progress percentage; only meaningful while running.
    pub fn progress(&self) -> Option<u8> {
        if self.status == SimulationStatus::Running {
            self.progress
        } else {
            None
        }
    }

    pub fn plate_length(&self) -> f64 {
        self.plate_length
            .unwrap_or_else(|| self.params.plate_length())
    }

    /// Overwrites status unconditionally. Progress carries over between two
    /// running updates and is dropped on any other status.
    pub fn apply_status(&mut self, status: SimulationStatus, progress: Option<u8>) {
        let was_running = self.status == SimulationStatus::Running;
        self.status = status;
        self.progress = if status == SimulationStatus::Running {
            progress
                .or(if was_running { self.progress } else { None })
                .or(Some(0))
                .map(|value| value.min(100))
        } else {
            None
        };
    }
}

/// A normalized push update for one simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusEvent {
    pub id: SimulationId,
    pub status: SimulationStatus,
    pub progress: Option<u8>,
}

impl StatusEvent {
    pub fn new(id: SimulationId, status: SimulationStatus) -> Self {
        Self {
            id,
            status,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulationStats {
    pub total: usize,
    pub not_started: usize,
    pub running: usize,
    pub finished: usize,
    pub failed: usize,
}

impl SimulationStats {
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a Simulation>,
    {
        let mut stats = SimulationStats::default();
        for record in records {
            stats.total += 1;
            match record.status {
                SimulationStatus::NotStarted => stats.not_started += 1,
                SimulationStatus::Running => stats.running += 1,
                SimulationStatus::Finished => stats.finished += 1,
                SimulationStatus::Error => stats.failed += 1,
            }
        }
        stats
    }
}

/// Accepts integers, integral floats and numeric strings for a count field.
fn deserialize_count<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let val = serde_json::Value::deserialize(deserializer)?;
    let parsed = match &val {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed
        .and_then(|u| u32::try_from(u).ok())
        .ok_or_else(|| de::Error::custom(format!("expected a non-negative count, got {val}")))
}

/// Accepts numbers and numeric strings (DECIMAL columns arrive as strings).
fn deserialize_real<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let val = serde_json::Value::deserialize(deserializer)?;
    match &val {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .ok_or_else(|| de::Error::custom(format!("expected a number, got {val}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record_json(status: serde_json::Value) -> serde_json::Value {
        json!({
            "id": 7,
            "sim_name": "plate-a",
            "n_transmitter": 2,
            "n_receiver": 3,
            "emitters_pitch": 0.5,
            "receivers_pitch": 0.5,
            "sensor_distance": 10,
            "sensor_edge_margin": 1.0,
            "typical_mesh_size": 0.1,
            "plate_thickness": 4,
            "plate_length": 15.5,
            "porosity": 0.02,
            "attenuation": "Yes",
            "p_status": status
        })
    }

    #[test]
    fn status_accepts_every_channel_encoding() {
        let cases = [
            (json!("Not started"), SimulationStatus::NotStarted),
            (json!("NotStarted"), SimulationStatus::NotStarted),
            (json!("not_started"), SimulationStatus::NotStarted),
            (json!("Running"), SimulationStatus::Running),
            (json!("Pending"), SimulationStatus::Running),
            (json!("Finished"), SimulationStatus::Finished),
            (json!("Completada"), SimulationStatus::Finished),
            (json!("Fallida"), SimulationStatus::Error),
            (json!(0), SimulationStatus::NotStarted),
            (json!(1), SimulationStatus::Running),
            (json!(2), SimulationStatus::Finished),
            (json!(3), SimulationStatus::Error),
            (json!("2"), SimulationStatus::Finished),
            (json!("'2'"), SimulationStatus::Finished),
        ];
        for (raw, expected) in cases {
            let parsed: SimulationStatus = serde_json::from_value(raw.clone()).expect("parse");
            assert_eq!(parsed, expected, "raw={raw}");
        }
    }

    #[test]
    fn status_rejects_unknown_values() {
        assert!(serde_json::from_value::<SimulationStatus>(json!(9)).is_err());
        assert!(serde_json::from_value::<SimulationStatus>(json!("paused")).is_err());
        assert!(serde_json::from_value::<SimulationStatus>(json!(-1)).is_err());
    }

    #[test]
    fn status_serializes_with_rest_spelling() {
        let value = serde_json::to_value(SimulationStatus::NotStarted).expect("serialize");
        assert_eq!(value, json!("Not started"));
    }

    #[test]
    fn record_decodes_from_snapshot_row() {
        let record: Simulation = serde_json::from_value(record_json(json!("Running"))).expect("parse");
        assert_eq!(record.id, SimulationId(7));
        assert_eq!(record.name, "plate-a");
        assert_eq!(record.params.n_receiver, 3);
        assert_eq!(record.params.sensor_distance, 10.0);
        assert!(record.params.attenuation.enabled());
        assert_eq!(record.status, SimulationStatus::Running);
        assert_eq!(record.plate_length(), 15.5);
    }

    #[test]
    fn record_tolerates_string_numbers_and_id() {
        let mut raw = record_json(json!(1));
        raw["id"] = json!("12");
        raw["porosity"] = json!("0.25");
        raw["n_transmitter"] = json!("4");
        raw["attenuation"] = json!(0);
        let record: Simulation = serde_json::from_value(raw).expect("parse");
        assert_eq!(record.id, SimulationId(12));
        assert_eq!(record.params.porosity, 0.25);
        assert_eq!(record.params.n_transmitter, 4);
        assert!(!record.params.attenuation.enabled());
    }

    #[test]
    fn plate_length_follows_backend_formula() {
        let mut raw = record_json(json!("Not started"));
        raw.as_object_mut().expect("object").remove("plate_length");
        let record: Simulation = serde_json::from_value(raw).expect("parse");
        // 2*1.0 + 2*0.5 + 10 + 3*0.5
        assert_eq!(record.plate_length(), 14.5);
    }

    #[test]
    fn progress_only_reported_while_running() {
        let mut record: Simulation =
            serde_json::from_value(record_json(json!("Not started"))).expect("parse");
        record.apply_status(SimulationStatus::Running, Some(40));
        assert_eq!(record.progress(), Some(40));
        record.apply_status(SimulationStatus::Running, None);
        assert_eq!(record.progress(), Some(40));
        record.apply_status(SimulationStatus::Finished, Some(100));
        assert_eq!(record.progress(), None);
        assert_eq!(record.progress, None);
        record.apply_status(SimulationStatus::Running, Some(250));
        assert_eq!(record.progress(), Some(100));
    }

    #[test]
    fn stats_count_each_status() {
        let records: Vec<Simulation> = [json!("Not started"), json!(1), json!(2), json!(2), json!("Error")]
            .into_iter()
            .map(|status| serde_json::from_value(record_json(status)).expect("parse"))
            .collect();
        let stats = SimulationStats::from_records(&records);
        assert_eq!(
            stats,
            SimulationStats {
                total: 5,
                not_started: 1,
                running: 1,
                finished: 2,
                failed: 1,
            }
        );
    }
}
