//! Protocolo do canal de viewers.
//!
//! Frames JSON delimitados por newline sobre o socket de push:
//!
//! ```text
//! ┌────────────────────────────────────────────────┬────┐
//! │ {"x":..,"y":..,"q0":..,…,"sessionID":..}       │ \n │
//! └────────────────────────────────────────────────┴────┘
//! ```
//!
//! Os nomes dos campos são fixos (os dashboards em JS já os consomem):
//! outbound `{x, y, q0..q3, CoG, sessionID, shotID}`, inbound
//! `{q0_ref..q3_ref, sliderSensitivityStabilityValue,
//! sliderSensitivityValue, Xcalibration, Ycalibration}`.

use crate::types::{CalibrationReference, GravityPoint, Quaternion};
use serde::{Deserialize, Serialize};

/// Erros do protocolo.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Erro de serialização: {0}")]
    Serialize(String),

    #[error("Erro de deserialização: {0}")]
    Deserialize(String),
}

// ──────────────────────────────────────────────
// Frame outbound (daemon → viewers)
// ──────────────────────────────────────────────

/// Estado vivo empurrado a todos os viewers conectados.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LiveFrame {
    /// Centro de massa atual
    pub x: f64,
    pub y: f64,
    /// Quaternion atual
    pub q0: f32,
    pub q1: f32,
    pub q2: f32,
    pub q3: f32,
    /// Flag one-shot "janela acabou de armar" (0|1)
    #[serde(rename = "CoG")]
    pub cog: u8,
    #[serde(rename = "sessionID")]
    pub session_id: u32,
    #[serde(rename = "shotID")]
    pub shot_id: u32,
}

/// Codifica um [`LiveFrame`] como uma linha JSON terminada em `\n`.
pub fn encode_frame(frame: &LiveFrame) -> Result<String, ProtocolError> {
    let mut line =
        serde_json::to_string(frame).map_err(|e| ProtocolError::Serialize(e.to_string()))?;
    line.push('\n');
    Ok(line)
}

// ──────────────────────────────────────────────
// Mensagem inbound (viewer → daemon)
// ──────────────────────────────────────────────

/// Atualização de referência de calibração enviada por um viewer.
/// O último write vence, sem isolamento por viewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerUpdate {
    pub q0_ref: f32,
    pub q1_ref: f32,
    pub q2_ref: f32,
    pub q3_ref: f32,
    #[serde(rename = "sliderSensitivityStabilityValue")]
    pub slider_stability: f64,
    #[serde(rename = "sliderSensitivityValue")]
    pub slider_sensitivity: f64,
    #[serde(rename = "Xcalibration")]
    pub x_calibration: f64,
    #[serde(rename = "Ycalibration")]
    pub y_calibration: f64,
}

impl ViewerUpdate {
    /// Sobrescreve a referência compartilhada com os valores do viewer.
    pub fn apply_to(&self, reference: &mut CalibrationReference) {
        reference.quat_ref = Quaternion::new(self.q0_ref, self.q1_ref, self.q2_ref, self.q3_ref);
        reference.gravity_ref = GravityPoint::new(self.x_calibration, self.y_calibration);
        reference.sliders = [self.slider_stability, self.slider_sensitivity];
    }
}

/// Decodifica uma linha JSON recebida de um viewer.
pub fn decode_update(line: &str) -> Result<ViewerUpdate, ProtocolError> {
    serde_json::from_str(line.trim()).map_err(|e| ProtocolError::Deserialize(e.to_string()))
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
