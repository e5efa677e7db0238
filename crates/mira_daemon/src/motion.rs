//! Motion/Audio Link – sensor de punho (quaternion + microfone).
//!
//! Loop de leitura de pacotes fixos de 20 bytes. Pacote malformado é
//! logado e descartado; o trigger de loudness é levantado quando o nível
//! do microfone passa do limiar, com debounce de 10 s.

use crate::state::{LinkStatus, SharedState};
use crate::transport::{is_timeout, Transport};
use mira_core::wire::{self, MOTION_PACKET_LEN};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Detecção de trigger com debounce.
///
/// O timer é rearmado no instante em que o sinal dispara, não quando o
/// pipeline o consome.
#[derive(Debug)]
pub struct TriggerGate {
    threshold: u16,
    debounce: Duration,
    last_fire: Option<Instant>,
}

impl TriggerGate {
    pub fn new(threshold: u16, debounce: Duration) -> Self {
        Self {
            threshold,
            debounce,
            last_fire: None,
        }
    }

    /// Retorna `true` se este nível dispara o trigger agora.
    pub fn check(&mut self, level: u16, now: Instant) -> bool {
        if level <= self.threshold {
            return false;
        }
        let elapsed_ok = match self.last_fire {
            Some(last) => now.duration_since(last) >= self.debounce,
            None => true,
        };
        if elapsed_ok {
            self.last_fire = Some(now);
        }
        elapsed_ok
    }
}

/// Dono da conexão com o sensor de punho e do seu loop de leitura.
pub struct MotionLink<T: Transport> {
    transport: T,
    state: Arc<SharedState>,
    gate: TriggerGate,
}

impl<T: Transport> MotionLink<T> {
    pub fn new(transport: T, state: Arc<SharedState>, gate: TriggerGate) -> Self {
        Self {
            transport,
            state,
            gate,
        }
    }

    /// Loop de recepção. Sai quando o transporte falha ou a parada é
    /// pedida; o status compartilhado termina em `Disconnected`.
    pub fn run(&mut self) {
        self.state.set_motion_status(LinkStatus::Connected);
        info!("Sensor de punho conectado");

        let mut buf = [0u8; MOTION_PACKET_LEN];
        while !self.state.stopped() {
            let n = match self.transport.recv(&mut buf) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => {
                    error!("Motion link desconectado: {e}");
                    break;
                }
            };

            match wire::parse_motion_packet(&buf[..n]) {
                Ok(sample) => {
                    self.state.set_motion(sample);
                    if self.gate.check(sample.mic_level, Instant::now()) {
                        info!("Trigger de loudness ({} contagens)", sample.mic_level);
                        self.state.raise_trigger();
                    }
                }
                // Falha de decode de um pacote é não-fatal
                Err(e) => debug!("Pacote do sensor descartado: {e}"),
            }
        }

        self.state.set_motion_status(LinkStatus::Disconnected);
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
