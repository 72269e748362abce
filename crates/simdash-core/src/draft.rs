use crate::{Attenuation, SimulationParams};
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("{field} must be a number, got '{value}'")]
    NotNumeric { field: &'static str, value: String },
    #[error("{field} must be a whole number, got '{value}'")]
    NotInteger { field: &'static str, value: String },
    #[error("{field} {constraint}, got {value}")]
    OutOfRange {
        field: &'static str,
        constraint: &'static str,
        value: f64,
    },
    #[error("{field} must be Yes or No, got '{value}'")]
    InvalidChoice { field: &'static str, value: String },
}

/// Raw, untrusted input for a new simulation, one string per form field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulationDraft {
    pub name: String,
    pub n_transmitter: String,
    pub n_receiver: String,
    pub emitters_pitch: String,
    pub receivers_pitch: String,
    pub sensor_distance: String,
    pub sensor_edge_margin: String,
    pub typical_mesh_size: String,
    pub plate_thickness: String,
    pub porosity: String,
    pub attenuation: String,
}

/// A draft that passed validation. The create request only accepts this
/// type, so invalid input never reaches the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewSimulation {
    #[serde(rename = "sim_name")]
    name: String,
    #[serde(flatten)]
    params: SimulationParams,
}

impl NewSimulation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }
}

impl SimulationDraft {
    pub fn validate(&self) -> Result<NewSimulation, ValidationError> {
        let name = required("sim_name", &self.name)?.to_string();

        // All fields must be present before any of them is parsed.
        let fields = [
            ("n_transmitter", &self.n_transmitter),
            ("n_receiver", &self.n_receiver),
            ("emitters_pitch", &self.emitters_pitch),
            ("receivers_pitch", &self.receivers_pitch),
            ("sensor_distance", &self.sensor_distance),
            ("sensor_edge_margin", &self.sensor_edge_margin),
            ("typical_mesh_size", &self.typical_mesh_size),
            ("plate_thickness", &self.plate_thickness),
            ("porosity", &self.porosity),
            ("attenuation", &self.attenuation),
        ];
        for (field, value) in fields {
            required(field, value)?;
        }

        let params = SimulationParams {
            n_transmitter: count("n_transmitter", &self.n_transmitter)?,
            n_receiver: count("n_receiver", &self.n_receiver)?,
            emitters_pitch: positive("emitters_pitch", &self.emitters_pitch)?,
            receivers_pitch: positive("receivers_pitch", &self.receivers_pitch)?,
            sensor_distance: positive("sensor_distance", &self.sensor_distance)?,
            sensor_edge_margin: positive("sensor_edge_margin", &self.sensor_edge_margin)?,
            typical_mesh_size: positive("typical_mesh_size", &self.typical_mesh_size)?,
            plate_thickness: positive("plate_thickness", &self.plate_thickness)?,
            porosity: fraction("porosity", &self.porosity)?,
            attenuation: self.attenuation.parse::<Attenuation>().map_err(|_| {
                ValidationError::InvalidChoice {
                    field: "attenuation",
                    value: self.attenuation.trim().to_string(),
                }
            })?,
        };

        Ok(NewSimulation { name, params })
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField { field });
    }
    Ok(trimmed)
}

fn number(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let trimmed = raw.trim();
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValidationError::NotNumeric {
            field,
            value: trimmed.to_string(),
        })
}

fn count(field: &'static str, raw: &str) -> Result<u32, ValidationError> {
    let value = number(field, raw)?;
    if value.fract() != 0.0 {
        return Err(ValidationError::NotInteger {
            field,
            value: raw.trim().to_string(),
        });
    }
    if value < 1.0 || value > f64::from(u32::MAX) {
        return Err(ValidationError::OutOfRange {
            field,
            constraint: "must be at least 1",
            value,
        });
    }
    Ok(value as u32)
}

fn positive(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let value = number(field, raw)?;
    if value <= 0.0 {
        return Err(ValidationError::OutOfRange {
            field,
            constraint: "must be greater than 0",
            value,
        });
    }
    Ok(value)
}

fn fraction(field: &'static str, raw: &str) -> Result<f64, ValidationError> {
    let value = number(field, raw)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ValidationError::OutOfRange {
            field,
            constraint: "must be between 0 and 1",
            value,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_draft() -> SimulationDraft {
        SimulationDraft {
            name: "  plate-a  ".to_string(),
            n_transmitter: "2".to_string(),
            n_receiver: "3".to_string(),
            emitters_pitch: "0.5".to_string(),
            receivers_pitch: "0.5".to_string(),
            sensor_distance: "10".to_string(),
            sensor_edge_margin: "1".to_string(),
            typical_mesh_size: "0.1".to_string(),
            plate_thickness: "4".to_string(),
            porosity: "0.02".to_string(),
            attenuation: "Yes".to_string(),
        }
    }

    #[test]
    fn valid_draft_produces_trimmed_record() {
        let created = valid_draft().validate().expect("valid");
        assert_eq!(created.name(), "plate-a");
        assert_eq!(created.params().n_receiver, 3);
        assert!(created.params().attenuation.enabled());
    }

    #[test]
    fn zero_transmitters_is_rejected() {
        let draft = SimulationDraft {
            n_transmitter: "0".to_string(),
            ..valid_draft()
        };
        let err = draft.validate().expect_err("zero transmitters");
        assert!(matches!(
            err,
            ValidationError::OutOfRange {
                field: "n_transmitter",
                ..
            }
        ));
    }

    #[test]
    fn blank_field_wins_over_parse_error() {
        let draft = SimulationDraft {
            n_transmitter: "abc".to_string(),
            porosity: "   ".to_string(),
            ..valid_draft()
        };
        assert_eq!(
            draft.validate(),
            Err(ValidationError::MissingField { field: "porosity" })
        );
    }

    #[test]
    fn non_numeric_and_fractional_counts_are_rejected() {
        let draft = SimulationDraft {
            emitters_pitch: "wide".to_string(),
            ..valid_draft()
        };
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::NotNumeric {
                field: "emitters_pitch",
                ..
            })
        ));

        let draft = SimulationDraft {
            n_receiver: "2.5".to_string(),
            ..valid_draft()
        };
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::NotInteger {
                field: "n_receiver",
                ..
            })
        ));
    }

    #[test]
    fn porosity_must_be_a_fraction() {
        for raw in ["-0.1", "1.5", "NaN"] {
            let draft = SimulationDraft {
                porosity: raw.to_string(),
                ..valid_draft()
            };
            assert!(draft.validate().is_err(), "porosity {raw}");
        }
        let edge = SimulationDraft {
            porosity: "1".to_string(),
            ..valid_draft()
        };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn attenuation_must_be_yes_or_no() {
        let draft = SimulationDraft {
            attenuation: "maybe".to_string(),
            ..valid_draft()
        };
        assert!(matches!(
            draft.validate(),
            Err(ValidationError::InvalidChoice { .. })
        ));
    }

    #[test]
    fn create_payload_uses_backend_field_names() {
        let created = valid_draft().validate().expect("valid");
        let payload = serde_json::to_value(&created).expect("serialize");
        assert_eq!(payload["sim_name"], "plate-a");
        assert_eq!(payload["n_transmitter"], 2);
        assert_eq!(payload["attenuation"], 1);
        assert!(payload.get("p_status").is_none());
    }
}
