//! Definição de tipos/structs de aquisição.
//!
//! Porta direta das classes Python (`BoardEvent`, referências do
//! WebSocketServer, modelo `Data`) para structs Rust com serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// Centro de massa
// ──────────────────────────────────────────────

/// Posição do centro de massa sobre a plataforma, em [-1, 1]².
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GravityPoint {
    pub x: f64,
    pub y: f64,
}

impl GravityPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Subtrai a referência de calibração ajustada pelo viewer.
    pub fn offset_by(&self, reference: &GravityPoint) -> GravityPoint {
        GravityPoint {
            x: self.x - reference.x,
            y: self.y - reference.y,
        }
    }
}

// ──────────────────────────────────────────────
// Quaternion
// ──────────────────────────────────────────────

/// Quaternion de orientação do sensor de punho (q0..q3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub q0: f32,
    pub q1: f32,
    pub q2: f32,
    pub q3: f32,
}

impl Quaternion {
    pub fn new(q0: f32, q1: f32, q2: f32, q3: f32) -> Self {
        Self { q0, q1, q2, q3 }
    }

    /// Subtração componente a componente da referência do viewer.
    pub fn offset_by(&self, reference: &Quaternion) -> Quaternion {
        Quaternion {
            q0: self.q0 - reference.q0,
            q1: self.q1 - reference.q1,
            q2: self.q2 - reference.q2,
            q3: self.q3 - reference.q3,
        }
    }

    pub fn as_array(&self) -> [f32; 4] {
        [self.q0, self.q1, self.q2, self.q3]
    }
}

// ──────────────────────────────────────────────
// Amostra do sensor de punho
// ──────────────────────────────────────────────

/// Uma amostra decodificada do pacote de 20 bytes do sensor.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MotionSample {
    pub quat: Quaternion,
    /// Nível instantâneo do microfone (contagens cruas).
    pub mic_level: u16,
}

// ──────────────────────────────────────────────
// Evento da plataforma de força
// ──────────────────────────────────────────────

/// Um relatório de massa decodificado da plataforma.
///
/// Valor imutável; o Board Link retém apenas o mais recente para
/// calcular as transições de botão.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoardEvent {
    /// Massas por canto (kg)
    pub top_left: f64,
    pub top_right: f64,
    pub bottom_left: f64,
    pub bottom_right: f64,
    /// Peso total derivado (kg)
    pub total_weight: f64,
    /// Centro de massa derivado; (0, 0) quando o peso total é zero
    pub center: GravityPoint,
    /// Botão está pressionado neste relatório
    pub button_pressed: bool,
    /// Botão acabou de ser solto (edge)
    pub button_released: bool,
}

impl BoardEvent {
    /// Constrói o evento derivando peso total e centro de massa.
    pub fn new(
        top_left: f64,
        top_right: f64,
        bottom_left: f64,
        bottom_right: f64,
        button_pressed: bool,
        button_released: bool,
    ) -> Self {
        let total = top_left + top_right + bottom_left + bottom_right;
        let center = if total > 0.0 {
            GravityPoint {
                x: ((top_right + bottom_right) - (top_left + bottom_left)) / total,
                y: ((top_right + top_left) - (bottom_right + bottom_left)) / total,
            }
        } else {
            GravityPoint::default()
        };

        Self {
            top_left,
            top_right,
            bottom_left,
            bottom_right,
            total_weight: total,
            center,
            button_pressed,
            button_released,
        }
    }
}

// ──────────────────────────────────────────────
// Referência de calibração (ajustável pelo viewer)
// ──────────────────────────────────────────────

/// Referência compartilhada aplicada às amostras cruas antes de
/// bufferizar ou exibir. Último write vence, sem isolamento por viewer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationReference {
    pub quat_ref: Quaternion,
    pub gravity_ref: GravityPoint,
    /// [sensibilidade de estabilidade, sensibilidade]
    pub sliders: [f64; 2],
}

impl Default for CalibrationReference {
    fn default() -> Self {
        Self {
            quat_ref: Quaternion::default(),
            gravity_ref: GravityPoint::default(),
            sliders: [10.0, 1.0],
        }
    }
}

// ──────────────────────────────────────────────
// Medição persistida
// ──────────────────────────────────────────────

/// Registro imutável entregue ao measurement store ao fim de cada janela.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedMeasurement {
    pub user: String,
    pub session_id: u32,
    pub shot_id: u32,
    /// Série completa de centro de massa (comprimento 2×L_gc)
    pub gravity_center: Vec<[f64; 2]>,
    /// Série completa de quaternions (comprimento 2×L_qua)
    pub quaternion: Vec<[f32; 4]>,
    /// Sliders congelados no instante do trigger
    pub sliders_value: [f64; 2],
    pub measured_at: DateTime<Utc>,
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
