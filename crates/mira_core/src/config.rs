//! Configuração unificada via TOML.
//!
//! Um único `config.toml` ao lado do executável cobre os dois links,
//! o canal de viewers, a janela de captura e o armazenamento.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuração do link da plataforma de força.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Endereço do bridge de transporte (TCP)
    pub addr: String,
    /// Cadência do poll de massa (ms)
    pub poll_interval_ms: u64,
    /// Timeout de leitura do socket (s)
    pub read_timeout_secs: f64,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8400".into(),
            poll_interval_ms: 50,
            read_timeout_secs: 2.0,
        }
    }
}

/// Configuração do link do sensor de punho (movimento + microfone).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Endereço do bridge de transporte (TCP)
    pub addr: String,
    /// Limiar do microfone que dispara o trigger (contagens)
    pub trigger_threshold: u16,
    /// Debounce entre triggers (s)
    pub debounce_secs: f64,
    /// Timeout de leitura do socket (s)
    pub read_timeout_secs: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8401".into(),
            trigger_threshold: 1000,
            debounce_secs: 10.0,
            read_timeout_secs: 2.0,
        }
    }
}

/// Configuração do canal de viewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Endereço de escuta do fan-out
    pub bind_addr: String,
    /// Cadência do frame outbound (ms)
    pub frame_interval_ms: u64,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8765".into(),
            frame_interval_ms: 20,
        }
    }
}

/// Configuração da janela de captura.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Amostras de centro de massa antes E depois do trigger (L_gc)
    pub gravity_window: usize,
    /// Amostras de quaternion antes E depois do trigger (L_qua)
    pub quaternion_window: usize,
    /// Intervalo entre iterações do pipeline (ms)
    pub tick_interval_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            gravity_window: 500,
            quaternion_window: 150,
            tick_interval_ms: 10,
        }
    }
}

/// Configuração do measurement store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Identidade do usuário dono das medições
    pub user: String,
    /// Diretório dos arquivos de medição
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            user: "default".into(),
            data_dir: "measurements".into(),
        }
    }
}

/// Configuração raiz do daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub board: BoardConfig,
    pub motion: MotionConfig,
    pub viewer: ViewerConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<AppConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        AppConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.capture.gravity_window == 0 || self.capture.quaternion_window == 0 {
            errors.push("Janelas de captura não podem ser 0".into());
        }
        if self.capture.tick_interval_ms == 0 {
            errors.push("Intervalo do pipeline não pode ser 0".into());
        }
        if self.motion.trigger_threshold == 0 {
            errors.push("Limiar do trigger não pode ser 0".into());
        }
        if self.motion.debounce_secs < 0.0 {
            errors.push(format!(
                "Debounce inválido: {} (deve ser ≥ 0)",
                self.motion.debounce_secs
            ));
        }
        if self.storage.user.is_empty() {
            errors.push("Usuário do storage não pode ser vazio".into());
        }
        if self.board.poll_interval_ms == 0 {
            errors.push("Cadência do poll da plataforma não pode ser 0".into());
        }

        errors
    }
}
