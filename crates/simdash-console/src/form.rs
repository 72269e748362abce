use simdash_core::{NewSimulation, SimulationDraft, ValidationError};

pub const FIELD_LABELS: [&str; 11] = [
    "name",
    "transmitters",
    "receivers",
    "emitters pitch",
    "receivers pitch",
    "sensor distance",
    "sensor edge margin",
    "typical mesh size",
    "plate thickness",
    "porosity",
    "attenuation (Yes/No)",
];

/// New-simulation form. Holds raw text only; nothing is parsed until submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateForm {
    draft: SimulationDraft,
    focus: usize,
    error: Option<String>,
}

impl Default for CreateForm {
    fn default() -> Self {
        Self::new()
    }
}

impl CreateForm {
    pub fn new() -> Self {
        Self {
            draft: SimulationDraft {
                attenuation: "Yes".to_string(),
                ..SimulationDraft::default()
            },
            focus: 0,
            error: None,
        }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn value(&self, index: usize) -> &str {
        let d = &self.draft;
        match index {
            0 => &d.name,
            1 => &d.n_transmitter,
            2 => &d.n_receiver,
            3 => &d.emitters_pitch,
            4 => &d.receivers_pitch,
            5 => &d.sensor_distance,
            6 => &d.sensor_edge_margin,
            7 => &d.typical_mesh_size,
            8 => &d.plate_thickness,
            9 => &d.porosity,
            _ => &d.attenuation,
        }
    }

    fn focused_mut(&mut self) -> &mut String {
        let d = &mut self.draft;
        match self.focus {
            0 => &mut d.name,
            1 => &mut d.n_transmitter,
            2 => &mut d.n_receiver,
            3 => &mut d.emitters_pitch,
            4 => &mut d.receivers_pitch,
            5 => &mut d.sensor_distance,
            6 => &mut d.sensor_edge_margin,
            7 => &mut d.typical_mesh_size,
            8 => &mut d.plate_thickness,
            9 => &mut d.porosity,
            _ => &mut d.attenuation,
        }
    }

    pub fn next_field(&mut self) {
        self.focus = (self.focus + 1) % FIELD_LABELS.len();
    }

    pub fn prev_field(&mut self) {
        self.focus = (self.focus + FIELD_LABELS.len() - 1) % FIELD_LABELS.len();
    }

    pub fn push(&mut self, ch: char) {
        self.focused_mut().push(ch);
    }

    pub fn pop(&mut self) {
        self.focused_mut().pop();
    }

    /// Validates the draft. A failure stays on the form.
    pub fn submit(&mut self) -> Result<NewSimulation, ValidationError> {
        let result = self.draft.validate();
        self.error = result.as_ref().err().map(ToString::to_string);
        result
    }
}
