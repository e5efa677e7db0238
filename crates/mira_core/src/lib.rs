//! # Mira Core
//!
//! Crate compartilhada que define as estruturas de dados do sistema Mira,
//! o decode byte-exato dos dois sensores (plataforma de força e sensor de
//! punho), o protocolo JSON do canal de viewers e a configuração TOML.
//!
//! ## Módulos
//! - [`types`] – Structs de aquisição (BoardEvent, MotionSample, janelas…)
//! - [`wire`] – Decode binário dos relatórios da plataforma e pacotes do sensor
//! - [`protocol`] – Frames JSON outbound/inbound do canal de viewers
//! - [`config`] – Configuração unificada via TOML

pub mod config;
pub mod protocol;
pub mod types;
pub mod wire;

// Re-exports convenientes
pub use config::AppConfig;
pub use protocol::{LiveFrame, ViewerUpdate};
pub use types::{BoardEvent, CalibrationReference, MotionSample, PersistedMeasurement};
pub use wire::CalibrationTable;
