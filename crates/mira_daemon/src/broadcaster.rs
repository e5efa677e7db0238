//! Telemetry Broadcaster – fan-out de estado vivo para os viewers.
//!
//! Um TCP listener aceita viewers passivos; cada conexão ganha um
//! handler inbound próprio (atualizações de referência de calibração,
//! último write vence) e entra no conjunto compartilhado usado pelo
//! loop outbound, que empurra um `LiveFrame` JSON por linha em cadência
//! fixa. Falha de envio para um viewer derruba só aquele viewer.

use crate::sequencer::ShotSequencer;
use crate::state::SharedState;
use mira_core::protocol::{self, LiveFrame};
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Conjunto de viewers conectados, mutado concorrentemente
/// (add no accept, remove no disconnect ou na falha de envio).
#[derive(Default)]
pub struct ViewerHub {
    viewers: Mutex<HashMap<u64, TcpStream>>,
    next_id: AtomicU64,
}

impl ViewerHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, stream: TcpStream) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.lock().insert(id, stream);
        info!("Viewer {id} conectado ({} ativos)", self.viewer_count());
        id
    }

    fn remove(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            info!("Viewer {id} removido ({} ativos)", self.viewer_count());
        }
    }

    pub fn viewer_count(&self) -> usize {
        self.lock().len()
    }

    /// Escreve a linha em todos os viewers; quem falhar é derrubado e o
    /// broadcast segue para os demais. Conjunto vazio é no-op.
    pub fn broadcast(&self, line: &str) {
        let mut dead = Vec::new();
        {
            let mut viewers = self.lock();
            for (id, stream) in viewers.iter_mut() {
                if stream.write_all(line.as_bytes()).is_err() {
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            warn!("Falha de envio, derrubando viewer {id}");
            self.remove(id);
        }
    }

    fn close_all(&self) {
        let mut viewers = self.lock();
        for (_, stream) in viewers.drain() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<u64, TcpStream>> {
        self.viewers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Intervalo entre tentativas de accept quando não há viewer na fila.
const ACCEPT_POLL: Duration = Duration::from_millis(50);

/// Thread de accept: registra cada viewer e sobe o seu handler inbound.
/// O listener fica não-bloqueante para que a parada seja observada entre
/// accepts, como nos demais loops.
pub fn spawn_accept_loop(
    listener: TcpListener,
    hub: Arc<ViewerHub>,
    state: Arc<SharedState>,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    std::thread::Builder::new()
        .name("viewer-accept".into())
        .spawn(move || {
            while !state.stopped() {
                let stream = match listener.accept() {
                    Ok((stream, _)) => stream,
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        std::thread::sleep(ACCEPT_POLL);
                        continue;
                    }
                    Err(e) => {
                        warn!("Accept falhou: {e}");
                        continue;
                    }
                };
                // O handler inbound lê bloqueante; o stream aceito não
                // herda o modo do listener
                if let Err(e) = stream.set_nonblocking(false) {
                    warn!("Viewer recusado, modo bloqueante falhou: {e}");
                    continue;
                }
                let reader = match stream.try_clone() {
                    Ok(r) => r,
                    Err(e) => {
                        warn!("Viewer recusado, clone falhou: {e}");
                        continue;
                    }
                };
                let id = hub.register(stream);
                let hub_in = Arc::clone(&hub);
                let state_in = Arc::clone(&state);
                let spawned = std::thread::Builder::new()
                    .name(format!("viewer-in-{id}"))
                    .spawn(move || inbound_loop(reader, id, &hub_in, &state_in));
                if let Err(e) = spawned {
                    warn!("Handler inbound do viewer {id} não subiu: {e}");
                    hub.remove(id);
                }
            }
        })
}

/// Handler inbound de um viewer: cada linha JSON válida sobrescreve a
/// referência de calibração compartilhada (último write vence).
fn inbound_loop(stream: TcpStream, id: u64, hub: &ViewerHub, state: &SharedState) {
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        match protocol::decode_update(&line) {
            Ok(update) => {
                let mut reference = state.calibration_ref();
                update.apply_to(&mut reference);
                state.set_calibration_ref(reference);
                debug!("Viewer {id} atualizou a referência de calibração");
            }
            Err(e) => debug!("Mensagem inválida do viewer {id}: {e}"),
        }
    }
    // Conexão encerrada (ou quebrada): fora do conjunto, sem estado
    // de reconexão preservado
    hub.remove(id);
}

/// Loop outbound: frame de estado vivo em cadência fixa.
pub fn broadcast_loop(
    hub: &ViewerHub,
    state: &SharedState,
    sequencer: &ShotSequencer,
    frame_interval: Duration,
) {
    info!("Broadcaster ativo");
    while !state.stopped() {
        let frame = build_frame(state, sequencer);
        match protocol::encode_frame(&frame) {
            Ok(line) => hub.broadcast(&line),
            Err(e) => error!("Frame não serializável: {e}"),
        }
        std::thread::sleep(frame_interval);
    }
    hub.close_all();
    info!("Broadcaster encerrado");
}

/// Monta o frame com os valores atuais; a flag de evento é one-shot
/// (lida-e-limpada aqui).
fn build_frame(state: &SharedState, sequencer: &ShotSequencer) -> LiveFrame {
    let center = state.center();
    let quat = state.motion().quat;
    LiveFrame {
        x: center.x,
        y: center.y,
        q0: quat.q0,
        q1: quat.q1,
        q2: quat.q2,
        q3: quat.q3,
        cog: u8::from(state.take_event()),
        session_id: sequencer.session_id(),
        shot_id: sequencer.shot_id(),
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mira_core::types::{GravityPoint, MotionSample, Quaternion};
    use std::net::TcpStream;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        false
    }

    #[test]
    fn frame_reads_and_clears_the_event_flag() {
        let state = SharedState::new();
        let sequencer = ShotSequencer::new();
        state.set_center(GravityPoint::new(0.5, -0.25));
        state.set_motion(MotionSample {
            quat: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            mic_level: 0,
        });
        state.raise_event();

        let first = build_frame(&state, &sequencer);
        assert_eq!(first.cog, 1);
        assert_eq!(first.x, 0.5);
        assert_eq!(first.q0, 1.0);

        let second = build_frame(&state, &sequencer);
        assert_eq!(second.cog, 0);
    }

    #[test]
    fn empty_viewer_set_broadcast_is_a_noop() {
        let hub = ViewerHub::new();
        hub.broadcast("{}\n");
        assert_eq!(hub.viewer_count(), 0);
    }

    #[test]
    fn viewer_receives_frames_and_pushes_calibration() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let hub = Arc::new(ViewerHub::new());
        let state = Arc::new(SharedState::new());
        spawn_accept_loop(listener, Arc::clone(&hub), Arc::clone(&state)).unwrap();

        let mut client = TcpStream::connect(addr).unwrap();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        assert!(wait_until(|| hub.viewer_count() == 1));

        // Outbound: o viewer recebe uma linha JSON de frame
        let sequencer = ShotSequencer::new();
        state.set_center(GravityPoint::new(0.5, 0.3));
        let line = protocol::encode_frame(&build_frame(&state, &sequencer)).unwrap();
        hub.broadcast(&line);

        let mut reader = BufReader::new(client.try_clone().unwrap());
        let mut received = String::new();
        reader.read_line(&mut received).unwrap();
        let frame: LiveFrame = serde_json::from_str(&received).unwrap();
        assert_eq!(frame.x, 0.5);

        // Inbound: atualização de calibração sobrescreve a referência
        let update = r#"{"q0_ref":1.0,"q1_ref":0.0,"q2_ref":0.0,"q3_ref":0.0,"sliderSensitivityStabilityValue":10.0,"sliderSensitivityValue":1.0,"Xcalibration":0.2,"Ycalibration":-0.1}"#;
        client.write_all(update.as_bytes()).unwrap();
        client.write_all(b"\n").unwrap();

        assert!(wait_until(|| {
            state.calibration_ref().gravity_ref == GravityPoint::new(0.2, -0.1)
        }));
        assert_eq!(state.calibration_ref().quat_ref.q0, 1.0);
    }

    #[test]
    fn accept_loop_exits_on_stop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let hub = Arc::new(ViewerHub::new());
        let state = Arc::new(SharedState::new());
        let handle = spawn_accept_loop(listener, hub, Arc::clone(&state)).unwrap();

        state.request_stop();
        // Sem nenhum viewer conectando, o join só retorna se o loop
        // observar a parada por conta própria
        handle.join().unwrap();
    }

    #[test]
    fn closed_viewer_is_dropped_from_the_set() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let hub = Arc::new(ViewerHub::new());
        let state = Arc::new(SharedState::new());
        spawn_accept_loop(listener, Arc::clone(&hub), Arc::clone(&state)).unwrap();

        let client = TcpStream::connect(addr).unwrap();
        assert!(wait_until(|| hub.viewer_count() == 1));
        drop(client);

        // O handler inbound nota o EOF, ou o broadcast falha no envio;
        // em ambos os casos o viewer sai do conjunto
        assert!(wait_until(|| {
            hub.broadcast("{\"x\":0}\n");
            hub.viewer_count() == 0
        }));
    }
}
