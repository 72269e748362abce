use super::{Artifact, BulkDeleteOutcome, ExecuteAck, SimulationApi, TransportError};
use crate::config::ClientConfig;
use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use simdash_core::{NewSimulation, Simulation, SimulationId, SimulationParams};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const MAX_ERROR_BODY_CHARS: usize = 200;

/// REST client for the simulation backend.
#[derive(Clone)]
pub struct HttpSimulationApi {
    base_url: Url,
    client: Client,
}

#[derive(Serialize)]
struct RunRequest<'a> {
    #[serde(flatten)]
    params: &'a SimulationParams,
    plate_length: f64,
}

#[derive(Debug, Default, Deserialize)]
struct Envelope {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    simulation: Option<Value>,
}

impl Envelope {
    fn is_error(&self) -> bool {
        self.status
            .as_deref()
            .map(|status| status.eq_ignore_ascii_case("error"))
            .unwrap_or(false)
    }

    fn reason(&self) -> Option<String> {
        self.message.clone().or_else(|| self.error.clone())
    }
}

impl HttpSimulationApi {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| TransportError::Request(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { base_url, client })
    }

    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(config.api_url.clone(), config.request_timeout)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        format!("{base}/{suffix}")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|err| TransportError::Request(err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            code: status.as_u16(),
            message: error_message(&body),
        })
    }

    async fn send_text(&self, request: RequestBuilder) -> Result<String, TransportError> {
        self.send(request)
            .await?
            .text()
            .await
            .map_err(|err| TransportError::Request(format!("response read failed: {err}")))
    }
}

#[async_trait]
impl SimulationApi for HttpSimulationApi {
    async fn fetch_snapshot(&self) -> Result<Vec<Simulation>, TransportError> {
        let body = self
            .send_text(self.client.get(self.endpoint("simulations")))
            .await?;
        decode_snapshot(&body)
    }

    async fn create(&self, draft: &NewSimulation) -> Result<Simulation, TransportError> {
        let request = self.client.post(self.endpoint("simulations")).json(draft);
        let body = self.send_text(request).await?;
        decode_created(&body)
    }

    async fn execute(
        &self,
        id: SimulationId,
        params: &SimulationParams,
    ) -> Result<ExecuteAck, TransportError> {
        let payload = RunRequest {
            params,
            plate_length: params.plate_length(),
        };
        let request = self
            .client
            .put(self.endpoint(&format!("simulations/{id}/run")))
            .json(&payload);
        let body = self.send_text(request).await?;
        decode_execute(&body)
    }

    async fn delete(&self, id: SimulationId) -> Result<(), TransportError> {
        let body = self
            .send_text(self.client.delete(self.endpoint(&format!("simulations/{id}"))))
            .await?;
        debug!(event = "simulation_deleted", id = %id, body = %body.trim());
        Ok(())
    }

    async fn delete_all(&self) -> Result<BulkDeleteOutcome, TransportError> {
        let body = self
            .send_text(self.client.delete(self.endpoint("simulations/all")))
            .await?;
        decode_bulk_delete(&body)
    }

    async fn download(&self, id: SimulationId) -> Result<Artifact, TransportError> {
        let response = self
            .send(self.client.get(self.endpoint(&format!("Load_data/download/{id}"))))
            .await?;
        let file_name = attachment_file_name(
            response
                .headers()
                .get(header::CONTENT_DISPOSITION)
                .and_then(|value| value.to_str().ok()),
            id,
        );
        let bytes = response
            .bytes()
            .await
            .map_err(|err| TransportError::Request(format!("download read failed: {err}")))?;
        Ok(Artifact {
            id,
            file_name,
            bytes: bytes.to_vec(),
        })
    }
}

/// Rows that fail to decode are dropped with a warning; the rest of the
/// snapshot still loads.
fn decode_snapshot(body: &str) -> Result<Vec<Simulation>, TransportError> {
    let rows: Vec<Value> = serde_json::from_str(body)
        .map_err(|err| TransportError::Decode(format!("snapshot is not a JSON list: {err}")))?;
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        match serde_json::from_value::<Simulation>(row) {
            Ok(record) => records.push(record),
            Err(err) => warn!(event = "snapshot_row_decode_error", error = %err),
        }
    }
    Ok(records)
}

fn decode_created(body: &str) -> Result<Simulation, TransportError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|err| TransportError::Decode(format!("create response: {err}")))?;
    let envelope = Envelope::deserialize(&value).unwrap_or_default();
    if envelope.is_error() {
        return Err(TransportError::Rejected(
            envelope.reason().unwrap_or_else(|| "create failed".to_string()),
        ));
    }
    let record = envelope.simulation.unwrap_or(value);
    serde_json::from_value(record)
        .map_err(|err| TransportError::Decode(format!("created record: {err}")))
}

fn decode_execute(body: &str) -> Result<ExecuteAck, TransportError> {
    if body.trim().is_empty() {
        return Ok(ExecuteAck::default());
    }
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|err| TransportError::Decode(format!("run response: {err}")))?;
    if envelope.is_error() {
        return Err(TransportError::Rejected(
            envelope.reason().unwrap_or_else(|| "run failed".to_string()),
        ));
    }
    let record = envelope.simulation.and_then(|raw| {
        serde_json::from_value::<Simulation>(raw)
            .map_err(|err| warn!(event = "run_ack_decode_error", error = %err))
            .ok()
    });
    Ok(ExecuteAck { record })
}

fn decode_bulk_delete(body: &str) -> Result<BulkDeleteOutcome, TransportError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|err| TransportError::Decode(format!("bulk delete response: {err}")))?;
    let message = envelope.reason().unwrap_or_default();
    match envelope.status.as_deref() {
        Some("success") => Ok(BulkDeleteOutcome { message }),
        _ if message.is_empty() => Err(TransportError::Rejected(
            "bulk delete was not confirmed".to_string(),
        )),
        _ => Err(TransportError::Rejected(message)),
    }
}

/// Pulls a human-readable reason out of an error response body.
fn error_message(body: &str) -> String {
    if let Ok(envelope) = serde_json::from_str::<Envelope>(body) {
        if let Some(reason) = envelope.reason() {
            return reason;
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }
    trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

fn attachment_file_name(disposition: Option<&str>, id: SimulationId) -> String {
    let mut plain = None;
    let mut extended = None;
    for part in disposition.unwrap_or_default().split(';') {
        let part = part.trim();
        if let Some(value) = part.strip_prefix("filename*=") {
            let value = value.trim_matches('"');
            extended = Some(value.split("''").last().unwrap_or(value).to_string());
        } else if let Some(value) = part.strip_prefix("filename=") {
            plain = Some(value.trim_matches('"').to_string());
        }
    }
    extended
        .or(plain)
        .and_then(|name| {
            let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
            if base.is_empty() || base == "." || base == ".." {
                None
            } else {
                Some(base.to_string())
            }
        })
        .unwrap_or_else(|| Artifact::default_file_name(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use simdash_core::SimulationStatus;

    fn row(id: u64) -> Value {
        json!({
            "id": id,
            "sim_name": format!("sim-{id}"),
            "n_transmitter": 1,
            "n_receiver": 2,
            "emitters_pitch": 0.5,
            "receivers_pitch": 0.5,
            "sensor_distance": 10,
            "sensor_edge_margin": 1.0,
            "typical_mesh_size": 0.1,
            "plate_thickness": 4,
            "plate_length": 13.5,
            "porosity": 0.1,
            "attenuation": 0,
            "p_status": "Not started"
        })
    }

    #[test]
    fn snapshot_skips_undecodable_rows() {
        let body = json!([row(1), {"id": 2}, row(3)]).to_string();
        let records = decode_snapshot(&body).expect("snapshot");
        let ids: Vec<u64> = records.iter().map(|r| r.id.0).collect();
        assert_eq!(ids, vec![1, 3]);
        assert!(decode_snapshot("{\"oops\":true}").is_err());
    }

    #[test]
    fn create_accepts_envelope_or_bare_record() {
        let wrapped = json!({"status": "success", "simulation": row(5)}).to_string();
        assert_eq!(decode_created(&wrapped).expect("wrapped").id, SimulationId(5));
        let bare = row(6).to_string();
        assert_eq!(decode_created(&bare).expect("bare").id, SimulationId(6));
        let rejected = json!({"status": "error", "message": "Error in data type"}).to_string();
        assert_eq!(
            decode_created(&rejected),
            Err(TransportError::Rejected("Error in data type".to_string()))
        );
    }

    #[test]
    fn run_ack_carries_updated_record() {
        let mut running = row(7);
        running["p_status"] = json!("Running");
        running["result_step_01"] = Value::Null;
        let body = json!({"status": "success", "simulation": running}).to_string();
        let ack = decode_execute(&body).expect("ack");
        assert_eq!(
            ack.record.map(|record| record.status),
            Some(SimulationStatus::Running)
        );
        assert_eq!(decode_execute("").expect("empty"), ExecuteAck::default());
    }

    #[test]
    fn bulk_delete_requires_success_status() {
        let ok = json!({"status": "success", "message": "All simulations deleted"}).to_string();
        assert_eq!(
            decode_bulk_delete(&ok).expect("ok").message,
            "All simulations deleted"
        );
        let refused = json!({"status": "error", "message": "database locked"}).to_string();
        assert_eq!(
            decode_bulk_delete(&refused),
            Err(TransportError::Rejected("database locked".to_string()))
        );
        assert!(matches!(
            decode_bulk_delete("{}"),
            Err(TransportError::Rejected(_))
        ));
    }

    #[test]
    fn error_message_prefers_json_reason() {
        assert_eq!(
            error_message(r#"{"status":"error","message":"Error al iniciar la simulación"}"#),
            "Error al iniciar la simulación"
        );
        assert_eq!(error_message(r#"{"error":"not found"}"#), "not found");
        assert_eq!(error_message("  Internal Server Error \n"), "Internal Server Error");
        assert_eq!(error_message(""), "empty response body");
    }

    #[test]
    fn attachment_name_falls_back_to_default() {
        let id = SimulationId(3);
        assert_eq!(
            attachment_file_name(Some("attachment; filename=result_3.mat"), id),
            "result_3.mat"
        );
        assert_eq!(
            attachment_file_name(Some("attachment; filename=\"a b.mat\""), id),
            "a b.mat"
        );
        assert_eq!(
            attachment_file_name(
                Some("attachment; filename=x.mat; filename*=UTF-8''r%C3%A9sultat.mat"),
                id
            ),
            "r%C3%A9sultat.mat"
        );
        assert_eq!(
            attachment_file_name(Some("attachment; filename=../../etc/passwd"), id),
            "passwd"
        );
        assert_eq!(attachment_file_name(None, id), "simulacion_3.mat");
        assert_eq!(
            attachment_file_name(Some("attachment; filename=\"\""), id),
            "simulacion_3.mat"
        );
    }

    #[test]
    fn endpoint_joins_without_double_slash() {
        let api = HttpSimulationApi::new(
            Url::parse("http://localhost:5000/").expect("url"),
            Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(
            api.endpoint("/simulations/4/run"),
            "http://localhost:5000/simulations/4/run"
        );
    }
}
