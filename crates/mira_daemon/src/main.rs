//! # Mira Daemon
//!
//! Adquire dados da plataforma de força e do sensor de punho, detecta o
//! tiro pelo pico de loudness, captura a janela pré/pós-trigger dos dois
//! canais e, em paralelo, empurra telemetria viva para os viewers.
//!
//! Threads de longa duração: board link, motion link, capture pipeline,
//! broadcaster outbound, um handler inbound por viewer e a escritora do
//! measurement store. O daemon encerra quando o board link cai.

mod board;
mod broadcaster;
mod motion;
mod pipeline;
mod sequencer;
mod state;
mod store;
mod transport;

use board::BoardLink;
use broadcaster::ViewerHub;
use mira_core::config::AppConfig;
use motion::{MotionLink, TriggerGate};
use pipeline::CapturePipeline;
use sequencer::ShotSequencer;
use state::SharedState;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;
use store::{JsonlStore, MeasurementStore};
use tracing::{error, info};
use transport::TcpTransport;

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = AppConfig::default_path();
    let config = AppConfig::load(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = config.save(&config_path) {
            tracing::warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!("Config inválida: {e}");
        }
        std::process::exit(1);
    }

    // ── Store + sessão ──
    let store: Arc<dyn MeasurementStore> = Arc::new(JsonlStore::new(&config.storage.data_dir));
    let sequencer = Arc::new(ShotSequencer::new());
    let session = match sequencer.start_session(store.as_ref(), &config.storage.user) {
        Ok(session) => session,
        Err(e) => {
            error!("Não foi possível iniciar a sessão: {e}");
            std::process::exit(1);
        }
    };

    let state = Arc::new(SharedState::new());

    // ── Transportes (um handle por link) ──
    let board_transport = TcpTransport::connect(
        &config.board.addr,
        Duration::from_secs_f64(config.board.read_timeout_secs),
    )
    .expect("Falha ao conectar o transporte da plataforma");

    let motion_transport = TcpTransport::connect(
        &config.motion.addr,
        Duration::from_secs_f64(config.motion.read_timeout_secs),
    )
    .expect("Falha ao conectar o transporte do sensor de punho");

    let listener =
        TcpListener::bind(&config.viewer.bind_addr).expect("Falha ao bind do canal de viewers");

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   🎯 MIRA DAEMON – ATIVO (Rust)");
    println!("══════════════════════════════════════════════");
    println!("  Usuário:   {}", config.storage.user);
    println!("  Sessão:    {session}");
    println!("  Plataforma: {}", config.board.addr);
    println!("  Sensor:     {}", config.motion.addr);
    println!("  Viewers:    {}", config.viewer.bind_addr);
    println!(
        "  Janela:     {}×2 gc / {}×2 qua",
        config.capture.gravity_window, config.capture.quaternion_window
    );
    println!("══════════════════════════════════════════════");
    println!();

    // ── Threads ──
    let (tx, rx) = crossbeam_channel::bounded(16);

    let writer = {
        let store = Arc::clone(&store);
        std::thread::Builder::new()
            .name("store-writer".into())
            .spawn(move || store::writer_loop(&rx, &store))
            .expect("Falha ao criar thread escritora")
    };

    let board_thread = {
        let state = Arc::clone(&state);
        let poll = Duration::from_millis(config.board.poll_interval_ms);
        std::thread::Builder::new()
            .name("board-link".into())
            .spawn(move || BoardLink::new(board_transport, state, poll).run())
            .expect("Falha ao criar thread do board link")
    };

    let motion_thread = {
        let state = Arc::clone(&state);
        let gate = TriggerGate::new(
            config.motion.trigger_threshold,
            Duration::from_secs_f64(config.motion.debounce_secs),
        );
        std::thread::Builder::new()
            .name("motion-link".into())
            .spawn(move || MotionLink::new(motion_transport, state, gate).run())
            .expect("Falha ao criar thread do motion link")
    };

    let pipeline_thread = {
        let mut pipeline = CapturePipeline::new(
            Arc::clone(&state),
            Arc::clone(&sequencer),
            tx,
            config.storage.user.clone(),
            config.capture.gravity_window,
            config.capture.quaternion_window,
        );
        let tick = Duration::from_millis(config.capture.tick_interval_ms);
        std::thread::Builder::new()
            .name("capture-pipeline".into())
            .spawn(move || pipeline.run(tick))
            .expect("Falha ao criar thread do pipeline")
    };

    let hub = Arc::new(ViewerHub::new());
    broadcaster::spawn_accept_loop(listener, Arc::clone(&hub), Arc::clone(&state))
        .expect("Falha ao criar thread de accept");

    let broadcast_thread = {
        let hub = Arc::clone(&hub);
        let state = Arc::clone(&state);
        let sequencer = Arc::clone(&sequencer);
        let interval = Duration::from_millis(config.viewer.frame_interval_ms);
        std::thread::Builder::new()
            .name("broadcaster".into())
            .spawn(move || broadcaster::broadcast_loop(&hub, &state, &sequencer, interval))
            .expect("Falha ao criar thread do broadcaster")
    };

    // ── Supervisão ──
    // O board link é o batimento do daemon: quando cai, para tudo.
    let _ = board_thread.join();
    info!("Board link caiu, encerrando o daemon");
    state.request_stop();

    let _ = motion_thread.join();
    let _ = pipeline_thread.join();
    let _ = broadcast_thread.join();
    let _ = writer.join();

    info!("Mira daemon encerrado");
}
