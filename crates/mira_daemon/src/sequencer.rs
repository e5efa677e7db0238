//! Session/Shot Sequencer – identificadores monotônicos de sessão e tiro.
//!
//! A sessão é retomada do measurement store no primeiro uso do processo
//! (maior sessão gravada + 1, ou 1 se não houver nenhuma). O id de tiro
//! incrementa uma vez por janela armada e nunca é zerado dentro de uma
//! sessão; reset só acontece em `start_session`, nunca implicitamente.

use crate::store::{MeasurementStore, StoreError};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::info;

#[derive(Debug, Default)]
pub struct ShotSequencer {
    session: AtomicU32,
    shot: AtomicU32,
}

impl ShotSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inicia uma nova sessão de aquisição para `user`, continuando a
    /// numeração gravada no store.
    pub fn start_session(
        &self,
        store: &dyn MeasurementStore,
        user: &str,
    ) -> Result<u32, StoreError> {
        let previous = store.max_session_id(user)?.unwrap_or(0);
        let session = previous + 1;
        self.session.store(session, Ordering::SeqCst);
        self.shot.store(0, Ordering::SeqCst);
        info!("Sessão {session} iniciada para {user}");
        Ok(session)
    }

    /// Incrementa e retorna o id do próximo tiro.
    pub fn next_shot(&self) -> u32 {
        self.shot.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn session_id(&self) -> u32 {
        self.session.load(Ordering::SeqCst)
    }

    pub fn shot_id(&self) -> u32 {
        self.shot.load(Ordering::SeqCst)
    }
}
