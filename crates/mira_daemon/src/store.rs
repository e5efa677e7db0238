//! Measurement store – persistência append-only das janelas capturadas.
//!
//! Contrato do colaborador externo: `create` grava um registro imutável,
//! `max_session_id` devolve a maior sessão já gravada para um usuário.
//! A implementação padrão escreve JSON Lines, um arquivo por usuário.

use crossbeam_channel::Receiver;
use mira_core::types::PersistedMeasurement;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{error, info, warn};

/// Erros do measurement store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Erro de I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Erro de serialização: {0}")]
    Serde(String),
}

/// Contrato do measurement store.
pub trait MeasurementStore: Send + Sync {
    fn create(&self, measurement: &PersistedMeasurement) -> Result<(), StoreError>;
    fn max_session_id(&self, user: &str) -> Result<Option<u32>, StoreError>;
}

// ──────────────────────────────────────────────
// JSON Lines em disco
// ──────────────────────────────────────────────

/// Store durável: um `<data_dir>/<user>.jsonl`, um registro por linha.
pub struct JsonlStore {
    data_dir: PathBuf,
}

impl JsonlStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn user_file(&self, user: &str) -> PathBuf {
        self.data_dir.join(format!("{user}.jsonl"))
    }
}

impl MeasurementStore for JsonlStore {
    fn create(&self, measurement: &PersistedMeasurement) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.data_dir)?;

        let line = serde_json::to_string(measurement)
            .map_err(|e| StoreError::Serde(e.to_string()))?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.user_file(&measurement.user))?;
        writeln!(file, "{line}")?;
        Ok(())
    }

    fn max_session_id(&self, user: &str) -> Result<Option<u32>, StoreError> {
        let path = self.user_file(user);
        if !path.exists() {
            return Ok(None);
        }

        let reader = BufReader::new(std::fs::File::open(path)?);
        let mut max = None;
        for line in reader.lines() {
            let line = line?;
            match serde_json::from_str::<PersistedMeasurement>(&line) {
                Ok(m) => max = Some(max.map_or(m.session_id, |v: u32| v.max(m.session_id))),
                Err(e) => warn!("Registro ilegível ignorado: {e}"),
            }
        }
        Ok(max)
    }
}

// ──────────────────────────────────────────────
// Store em memória (testes e ensaios a seco)
// ──────────────────────────────────────────────

/// Store em memória, usado nos testes e em ensaios sem persistência.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<Vec<PersistedMeasurement>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<PersistedMeasurement> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl MeasurementStore for MemoryStore {
    fn create(&self, measurement: &PersistedMeasurement) -> Result<(), StoreError> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(measurement.clone());
        Ok(())
    }

    fn max_session_id(&self, user: &str) -> Result<Option<u32>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.user == user)
            .map(|m| m.session_id)
            .max())
    }
}

// ──────────────────────────────────────────────
// Thread escritora
// ──────────────────────────────────────────────

/// Drena o channel do pipeline e grava cada janela finalizada.
/// Falha de gravação é logada e o registro é descartado (não há retry).
pub fn writer_loop(rx: &Receiver<PersistedMeasurement>, store: &Arc<dyn MeasurementStore>) {
    for measurement in rx.iter() {
        match store.create(&measurement) {
            Ok(()) => info!(
                "Medição salva: sessão {} tiro {} ({} pts gc, {} pts qua)",
                measurement.session_id,
                measurement.shot_id,
                measurement.gravity_center.len(),
                measurement.quaternion.len(),
            ),
            Err(e) => error!("Falha ao salvar medição: {e}"),
        }
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(user: &str, session_id: u32, shot_id: u32) -> PersistedMeasurement {
        PersistedMeasurement {
            user: user.into(),
            session_id,
            shot_id,
            gravity_center: vec![[0.1, 0.2]; 4],
            quaternion: vec![[1.0, 0.0, 0.0, 0.0]; 2],
            sliders_value: [10.0, 1.0],
            measured_at: Utc::now(),
        }
    }

    #[test]
    fn jsonl_store_roundtrip_and_max_session() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());

        assert_eq!(store.max_session_id("ana").unwrap(), None);

        store.create(&sample("ana", 1, 1)).unwrap();
        store.create(&sample("ana", 3, 1)).unwrap();
        store.create(&sample("ana", 2, 5)).unwrap();

        assert_eq!(store.max_session_id("ana").unwrap(), Some(3));
        // Outro usuário tem arquivo próprio
        assert_eq!(store.max_session_id("bruno").unwrap(), None);
    }

    #[test]
    fn jsonl_store_appends_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlStore::new(dir.path());
        store.create(&sample("ana", 1, 1)).unwrap();
        store.create(&sample("ana", 1, 2)).unwrap();

        let content = std::fs::read_to_string(dir.path().join("ana.jsonl")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn memory_store_filters_by_user() {
        let store = MemoryStore::new();
        store.create(&sample("ana", 2, 1)).unwrap();
        store.create(&sample("bruno", 7, 1)).unwrap();

        assert_eq!(store.max_session_id("ana").unwrap(), Some(2));
        assert_eq!(store.max_session_id("bruno").unwrap(), Some(7));
        assert_eq!(store.records().len(), 2);
    }

    #[test]
    fn writer_loop_drains_the_channel() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let store: Arc<dyn MeasurementStore> = Arc::new(MemoryStore::new());

        tx.send(sample("ana", 1, 1)).unwrap();
        tx.send(sample("ana", 1, 2)).unwrap();
        drop(tx);

        writer_loop(&rx, &store);
        assert_eq!(store.max_session_id("ana").unwrap(), Some(1));
    }
}
