//! Estado compartilhado entre os loops do daemon.
//!
//! Células de "último valor" com um único escritor por campo: cada link
//! escreve a própria amostra, os handlers de viewer escrevem a referência
//! de calibração e todos os demais só leem. Nada de globais soltos.

use mira_core::types::{CalibrationReference, GravityPoint, MotionSample};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

/// Estado de conexão de um link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LinkStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Células compartilhadas entre Board Link, Motion Link, Capture Pipeline
/// e Telemetry Broadcaster.
#[derive(Debug, Default)]
pub struct SharedState {
    latest_center: RwLock<GravityPoint>,
    latest_motion: RwLock<MotionSample>,
    calibration_ref: RwLock<CalibrationReference>,
    board_status: RwLock<LinkStatus>,
    motion_status: RwLock<LinkStatus>,
    /// Trigger de loudness pendente (setado pelo Motion Link,
    /// consumido pelo pipeline)
    trigger: AtomicBool,
    /// Flag one-shot "janela acabou de armar" (setada pelo pipeline,
    /// lida-e-limpada pelo broadcaster)
    event_flag: AtomicBool,
    /// Sinal único de parada, checado no topo de cada loop
    stop: AtomicBool,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Amostras ──

    pub fn set_center(&self, center: GravityPoint) {
        *write(&self.latest_center) = center;
    }

    pub fn center(&self) -> GravityPoint {
        *read(&self.latest_center)
    }

    pub fn set_motion(&self, sample: MotionSample) {
        *write(&self.latest_motion) = sample;
    }

    pub fn motion(&self) -> MotionSample {
        *read(&self.latest_motion)
    }

    // ── Referência de calibração ──

    pub fn set_calibration_ref(&self, reference: CalibrationReference) {
        *write(&self.calibration_ref) = reference;
    }

    pub fn calibration_ref(&self) -> CalibrationReference {
        *read(&self.calibration_ref)
    }

    // ── Status dos links ──

    pub fn set_board_status(&self, status: LinkStatus) {
        *write(&self.board_status) = status;
    }

    pub fn board_status(&self) -> LinkStatus {
        *read(&self.board_status)
    }

    pub fn set_motion_status(&self, status: LinkStatus) {
        *write(&self.motion_status) = status;
    }

    pub fn motion_status(&self) -> LinkStatus {
        *read(&self.motion_status)
    }

    /// Ambos os links prontos para alimentar uma janela.
    pub fn links_connected(&self) -> bool {
        self.board_status() == LinkStatus::Connected
            && self.motion_status() == LinkStatus::Connected
    }

    // ── Flags ──

    pub fn raise_trigger(&self) {
        self.trigger.store(true, Ordering::SeqCst);
    }

    /// Consome o trigger pendente (read-and-clear).
    pub fn take_trigger(&self) -> bool {
        self.trigger.swap(false, Ordering::SeqCst)
    }

    pub fn raise_event(&self) {
        self.event_flag.store(true, Ordering::SeqCst);
    }

    /// Lê-e-limpa a flag one-shot de evento capturado.
    pub fn take_event(&self) -> bool {
        self.event_flag.swap(false, Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    pub fn stopped(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Locks nunca derrubam um loop de aquisição: um lock envenenado
/// devolve o último valor escrito.
fn read<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
