//! Capture Pipeline – janela pré/pós-trigger dos dois canais.
//!
//! Enquanto ocioso, mantém ring buffers de pré-trigger (amostra mais
//! antiga sai, mais nova entra). Ao consumir um trigger, tira snapshot
//! dos rings, arma a janela e cresce os buffers de pós-trigger até que
//! AMBOS atinjam o alvo; os dois canais enchem em ritmos independentes.
//! A janela finalizada tem comprimento exato 2×L por canal e é entregue
//! à thread escritora via channel. No máximo uma janela armada por vez.

use crate::sequencer::ShotSequencer;
use crate::state::SharedState;
use chrono::Utc;
use crossbeam_channel::Sender;
use mira_core::types::PersistedMeasurement;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub struct CapturePipeline {
    state: Arc<SharedState>,
    sequencer: Arc<ShotSequencer>,
    tx: Sender<PersistedMeasurement>,
    user: String,

    /// L_gc e L_qua: comprimento pré-trigger (e alvo pós-trigger)
    gc_len: usize,
    qua_len: usize,

    // Rings pré-trigger, semeados com zeros para que a primeira janela
    // já saia com comprimento cheio
    pre_gc: VecDeque<[f64; 2]>,
    pre_qua: VecDeque<[f32; 4]>,

    // Estado da janela armada
    armed: bool,
    snap_gc: Vec<[f64; 2]>,
    snap_qua: Vec<[f32; 4]>,
    post_gc: Vec<[f64; 2]>,
    post_qua: Vec<[f32; 4]>,
    armed_sliders: [f64; 2],
    armed_shot: u32,
}

impl CapturePipeline {
    pub fn new(
        state: Arc<SharedState>,
        sequencer: Arc<ShotSequencer>,
        tx: Sender<PersistedMeasurement>,
        user: String,
        gc_len: usize,
        qua_len: usize,
    ) -> Self {
        Self {
            state,
            sequencer,
            tx,
            user,
            gc_len,
            qua_len,
            pre_gc: VecDeque::from(vec![[0.0, 0.0]; gc_len]),
            pre_qua: VecDeque::from(vec![[0.0, 0.0, 0.0, 0.0]; qua_len]),
            armed: false,
            snap_gc: Vec::new(),
            snap_qua: Vec::new(),
            post_gc: Vec::new(),
            post_qua: Vec::new(),
            armed_sliders: [0.0, 0.0],
            armed_shot: 0,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Uma iteração do pipeline. Ordem estrita ler-depois-decidir, para
    /// nunca armar sobre uma amostra velha.
    pub fn tick(&mut self) {
        // 1. Amostras atuais, deslocadas pela referência de calibração viva
        let reference = self.state.calibration_ref();
        let center = self.state.center().offset_by(&reference.gravity_ref);
        let gc = [center.x, center.y];
        let qua = self
            .state
            .motion()
            .quat
            .offset_by(&reference.quat_ref)
            .as_array();

        if !self.armed {
            // 2. Ocioso: desliza os rings de pré-trigger
            push_ring(&mut self.pre_gc, gc);
            push_ring(&mut self.pre_qua, qua);

            // 3. Trigger pendente ⇒ arma a janela
            if self.state.take_trigger() {
                self.arm(reference.sliders);
            }
            return;
        }

        // Link caiu no meio da captura: janela abandonada, não persistida
        if !self.state.links_connected() {
            warn!(
                "Captura do tiro {} abandonada: link desconectado",
                self.armed_shot
            );
            self.disarm();
            return;
        }

        // 4. Armado: cresce os buffers de pós-trigger até AMBOS encherem
        if self.post_gc.len() < self.gc_len {
            self.post_gc.push(gc);
        }
        if self.post_qua.len() < self.qua_len {
            self.post_qua.push(qua);
        }

        // 5. Ambos cheios ⇒ concatena, entrega e volta a ocioso
        if self.post_gc.len() == self.gc_len && self.post_qua.len() == self.qua_len {
            self.finalize();
        }
    }

    fn arm(&mut self, sliders: [f64; 2]) {
        self.snap_gc = self.pre_gc.iter().copied().collect();
        self.snap_qua = self.pre_qua.iter().copied().collect();
        self.armed_sliders = sliders;
        self.armed_shot = self.sequencer.next_shot();
        self.armed = true;
        self.state.raise_event();
        info!("Janela armada: tiro {}", self.armed_shot);
    }

    fn finalize(&mut self) {
        let mut gravity_center = std::mem::take(&mut self.snap_gc);
        gravity_center.append(&mut self.post_gc);
        let mut quaternion = std::mem::take(&mut self.snap_qua);
        quaternion.append(&mut self.post_qua);

        let measurement = PersistedMeasurement {
            user: self.user.clone(),
            session_id: self.sequencer.session_id(),
            shot_id: self.armed_shot,
            gravity_center,
            quaternion,
            sliders_value: self.armed_sliders,
            measured_at: Utc::now(),
        };

        if self.tx.try_send(measurement).is_err() {
            error!("Escritora indisponível, janela descartada");
        }

        self.disarm();
    }

    fn disarm(&mut self) {
        self.armed = false;
        self.snap_gc.clear();
        self.snap_qua.clear();
        self.post_gc.clear();
        self.post_qua.clear();
        // Trigger levantado durante a janela armada é ignorado
        self.state.take_trigger();
    }

    /// Loop do pipeline: tick + sono fixo, parada checada no topo.
    /// Uma janela armada na hora da parada é abandonada.
    pub fn run(&mut self, tick_interval: Duration) {
        while !self.state.stopped() {
            self.tick();
            std::thread::sleep(tick_interval);
        }
        if self.armed {
            warn!(
                "Parada com janela armada: tiro {} abandonado",
                self.armed_shot
            );
        }
        info!("Capture pipeline encerrado");
    }
}

fn push_ring<T>(ring: &mut VecDeque<T>, value: T) {
    ring.pop_front();
    ring.push_back(value);
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
