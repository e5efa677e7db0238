//! Decode binário dos dois links de hardware.
//!
//! Formato do relatório de massa da plataforma (25 bytes):
//!
//! ```text
//! ┌──────┬──────────┬─────────────────────────────┬─────────┐
//! │ hdr  │ tipo(33) │ payload (13 bytes)          │ resto   │
//! └──────┴──────────┴─────────────────────────────┴─────────┘
//!                     [0..2)  botão (u16 BE)
//!                     [5..13) 4× código cru u16 BE (TR,BR,TL,BL)
//! ```
//!
//! Pacote do sensor de punho (20 bytes): nível de microfone u16 LE no
//! offset 0, q0..q3 como f32 LE nos offsets 4, 8, 12, 16.
//!
//! Toda função aqui é pura; os loops de I/O vivem no daemon.

use crate::types::MotionSample;
use crate::types::Quaternion;

/// Primeiro byte de todo comando outbound para a plataforma.
pub const COMMAND_PREFIX: u8 = 0x52;
/// Comando de LED.
pub const COMMAND_LED: u8 = 0x0B;
/// Comando de leitura de registrador (status/calibração/massa).
pub const COMMAND_READ_REGISTER: u8 = 0x11;
/// Comando de escrita de registrador (ativação da extensão).
pub const COMMAND_WRITE_REGISTER: u8 = 0x10;

/// Byte de tipo que marca um relatório válido.
pub const REPORT_MASS: u8 = 33;
/// Padrão de bits do botão pressionado.
pub const BUTTON_DOWN_MASK: u16 = 0x0008;

/// Tamanho dos pacotes recebidos da plataforma.
pub const BOARD_PACKET_LEN: usize = 25;
/// Tamanho fixo do pacote do sensor de punho.
pub const MOTION_PACKET_LEN: usize = 20;

/// Ponto de calibração por canto: 0 kg, 17 kg, 34 kg.
pub const CAL_POINT_KG: f64 = 17.0;

/// Erros de decode. Um pacote malformado derruba só a amostra,
/// nunca o link.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Relatório muito curto ({0} bytes)")]
    ReportTooShort(usize),

    #[error("Byte de tipo inválido: {0} (esperado {REPORT_MASS})")]
    NotAMassReport(u8),

    #[error("Pacote do sensor com {0} bytes (esperado {MOTION_PACKET_LEN})")]
    PacketLength(usize),

    #[error("Fragmento de calibração muito curto ({0} bytes)")]
    CalibrationFragment(usize),
}

// ──────────────────────────────────────────────
// Comandos outbound
// ──────────────────────────────────────────────

/// Comando de LED: `[0x52, 0x0B, 0x10|0x00]`.
pub fn set_led_command(on: bool) -> [u8; 3] {
    [COMMAND_PREFIX, COMMAND_LED, if on { 0x10 } else { 0x00 }]
}

/// Comando de leitura de registrador.
pub fn read_register_command(addr_hi: u8, addr_lo: u8, len: u8) -> [u8; 7] {
    [
        COMMAND_PREFIX,
        COMMAND_READ_REGISTER,
        0x04,
        0xA4,
        addr_hi,
        addr_lo,
        len,
    ]
}

/// Leitura da tabela de calibração (endereço 0x0024, 0x18 bytes).
pub fn calibration_read_command() -> [u8; 7] {
    read_register_command(0x00, 0x24, 0x18)
}

/// Poll de massa (endereço 0x0000, 0x08 bytes).
pub fn mass_poll_command() -> [u8; 7] {
    read_register_command(0x00, 0x00, 0x08)
}

/// Ativação da extensão da plataforma, enviada uma vez ao conectar.
pub fn activate_extension_command() -> [u8; 7] {
    [
        COMMAND_PREFIX,
        COMMAND_WRITE_REGISTER,
        0x04,
        0xA4,
        0x00,
        0x40,
        0x00,
    ]
}

// ──────────────────────────────────────────────
// Tabela de calibração
// ──────────────────────────────────────────────

/// Canto da plataforma, na ordem em que os códigos crus aparecem
/// no relatório de massa.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Corner {
    TopRight = 0,
    BottomRight = 1,
    TopLeft = 2,
    BottomLeft = 3,
}

/// Calibração de três pontos por canto, preenchida uma única vez no
/// handshake de conexão e imutável depois.
///
/// Layout: `[low TR,BR,TL,BL, mid TR,BR,TL,BL, high TR,BR,TL,BL]`.
/// O decoder de relatórios exige `&CalibrationTable`, então nunca há
/// massa computada sem handshake completo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibrationTable {
    refs: [u16; 12],
}

impl CalibrationTable {
    pub fn from_codes(refs: [u16; 12]) -> Self {
        Self { refs }
    }

    /// Monta a tabela a partir dos dois fragmentos da resposta de
    /// calibração: `frag1[7..24]` + `frag2[7..15]`, 12 valores u16 BE.
    pub fn from_fragments(frag1: &[u8], frag2: &[u8]) -> Result<Self, DecodeError> {
        if frag1.len() < 24 {
            return Err(DecodeError::CalibrationFragment(frag1.len()));
        }
        if frag2.len() < 15 {
            return Err(DecodeError::CalibrationFragment(frag2.len()));
        }

        let mut bytes = Vec::with_capacity(25);
        bytes.extend_from_slice(&frag1[7..24]);
        bytes.extend_from_slice(&frag2[7..15]);

        let mut refs = [0u16; 12];
        for (i, slot) in refs.iter_mut().enumerate() {
            *slot = u16::from_be_bytes([bytes[2 * i], bytes[2 * i + 1]]);
        }
        Ok(Self { refs })
    }

    /// Conversão linear por partes de código cru para quilogramas.
    ///
    /// Abaixo de `low` a plataforma não registra carga; cada ponto de
    /// referência seguinte adiciona 17 kg. Contínua em `mid` (17 kg
    /// exatos) e monotônica não-decrescente.
    pub fn calc_mass(&self, raw: u16, corner: Corner) -> f64 {
        let pos = corner as usize;
        let low = f64::from(self.refs[pos]);
        let mid = f64::from(self.refs[pos + 4]);
        let high = f64::from(self.refs[pos + 8]);
        let raw = f64::from(raw);

        if raw < low {
            0.0
        } else if raw <= mid {
            if mid > low {
                CAL_POINT_KG * (raw - low) / (mid - low)
            } else {
                0.0
            }
        } else if high > mid {
            CAL_POINT_KG + CAL_POINT_KG * (raw - mid) / (high - mid)
        } else {
            CAL_POINT_KG
        }
    }
}

// ──────────────────────────────────────────────
// Relatório de massa
// ──────────────────────────────────────────────

/// Relatório de massa cru, antes da calibração.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MassReport {
    /// Estado cru dos bits de botão (u16 BE do início do payload).
    pub button_state: u16,
    /// Códigos crus na ordem TR, BR, TL, BL.
    pub raw: [u16; 4],
}

impl MassReport {
    pub fn is_button_down(&self) -> bool {
        self.button_state == BUTTON_DOWN_MASK
    }

    /// Converte os quatro códigos crus em kg via tabela de calibração.
    /// Retorna na ordem TR, BR, TL, BL.
    pub fn masses(&self, table: &CalibrationTable) -> [f64; 4] {
        [
            table.calc_mass(self.raw[0], Corner::TopRight),
            table.calc_mass(self.raw[1], Corner::BottomRight),
            table.calc_mass(self.raw[2], Corner::TopLeft),
            table.calc_mass(self.raw[3], Corner::BottomLeft),
        ]
    }
}

/// Decodifica um pacote de 25 bytes da plataforma em [`MassReport`].
///
/// `data[1]` deve ser 33; payload = `data[2..15]`.
pub fn parse_mass_report(data: &[u8]) -> Result<MassReport, DecodeError> {
    if data.len() < 15 {
        return Err(DecodeError::ReportTooShort(data.len()));
    }
    if data[1] != REPORT_MASS {
        return Err(DecodeError::NotAMassReport(data[1]));
    }

    let payload = &data[2..15];
    let button_state = u16::from_be_bytes([payload[0], payload[1]]);

    let mut raw = [0u16; 4];
    for (i, slot) in raw.iter_mut().enumerate() {
        let off = 5 + 2 * i;
        *slot = u16::from_be_bytes([payload[off], payload[off + 1]]);
    }

    Ok(MassReport { button_state, raw })
}

// ──────────────────────────────────────────────
// Pacote do sensor de punho
// ──────────────────────────────────────────────

/// Decodifica o pacote fixo de 20 bytes do sensor de punho.
pub fn parse_motion_packet(data: &[u8]) -> Result<MotionSample, DecodeError> {
    if data.len() != MOTION_PACKET_LEN {
        return Err(DecodeError::PacketLength(data.len()));
    }

    let mic_level = u16::from_le_bytes([data[0], data[1]]);
    let f = |off: usize| f32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]);

    Ok(MotionSample {
        mic_level,
        quat: Quaternion::new(f(4), f(8), f(12), f(16)),
    })
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    /// Tabela do cenário ponta-a-ponta: low=100, mid=200, high=300
    /// em todos os cantos.
    fn flat_table() -> CalibrationTable {
        CalibrationTable::from_codes([100, 100, 100, 100, 200, 200, 200, 200, 300, 300, 300, 300])
    }

    #[test]
    fn commands_carry_the_0x52_prefix() {
        assert_eq!(set_led_command(true), [0x52, 0x0B, 0x10]);
        assert_eq!(set_led_command(false), [0x52, 0x0B, 0x00]);
        assert_eq!(
            calibration_read_command(),
            [0x52, 0x11, 0x04, 0xA4, 0x00, 0x24, 0x18]
        );
        assert_eq!(
            mass_poll_command(),
            [0x52, 0x11, 0x04, 0xA4, 0x00, 0x00, 0x08]
        );
        assert_eq!(activate_extension_command()[0], 0x52);
    }

    #[test]
    fn calc_mass_below_low_is_zero() {
        let t = flat_table();
        for raw in [0u16, 50, 99] {
            assert_eq!(t.calc_mass(raw, Corner::TopRight), 0.0);
        }
    }

    #[test]
    fn calc_mass_at_reference_points() {
        let t = flat_table();
        assert_eq!(t.calc_mass(100, Corner::TopRight), 0.0);
        assert_eq!(t.calc_mass(200, Corner::TopRight), 17.0);
        assert_eq!(t.calc_mass(300, Corner::TopRight), 34.0);
    }

    #[test]
    fn calc_mass_is_monotonic() {
        let t = flat_table();
        let mut previous = -1.0;
        for raw in 0u16..400 {
            let m = t.calc_mass(raw, Corner::BottomLeft);
            assert!(m >= previous, "não-monotônica em raw={raw}");
            previous = m;
        }
    }

    #[test]
    fn end_to_end_masses_from_flat_calibration() {
        // TR=150, BR=200, TL=250, BL=100 → 8.5, 17.0, 25.5, 0.0
        let t = flat_table();
        let report = MassReport {
            button_state: 0,
            raw: [150, 200, 250, 100],
        };
        let masses = report.masses(&t);
        assert_eq!(masses[0], 8.5);
        assert_eq!(masses[1], 17.0);
        assert_eq!(masses[2], 25.5);
        assert_eq!(masses[3], 0.0);
    }

    fn build_report(button: u16, tr: u16, br: u16, tl: u16, bl: u16) -> [u8; BOARD_PACKET_LEN] {
        let mut data = [0u8; BOARD_PACKET_LEN];
        data[1] = REPORT_MASS;
        data[2..4].copy_from_slice(&button.to_be_bytes());
        data[7..9].copy_from_slice(&tr.to_be_bytes());
        data[9..11].copy_from_slice(&br.to_be_bytes());
        data[11..13].copy_from_slice(&tl.to_be_bytes());
        data[13..15].copy_from_slice(&bl.to_be_bytes());
        data
    }

    #[test]
    fn parse_mass_report_extracts_corners_in_order() {
        let data = build_report(0, 150, 200, 250, 100);
        let report = parse_mass_report(&data).unwrap();
        assert_eq!(report.raw, [150, 200, 250, 100]);
        assert!(!report.is_button_down());
    }

    #[test]
    fn button_down_only_on_exact_mask() {
        let down = parse_mass_report(&build_report(BUTTON_DOWN_MASK, 0, 0, 0, 0)).unwrap();
        assert!(down.is_button_down());

        // Outros padrões de bits não contam como pressionado
        let other = parse_mass_report(&build_report(0x0108, 0, 0, 0, 0)).unwrap();
        assert!(!other.is_button_down());
    }

    #[test]
    fn rejects_wrong_report_type() {
        let mut data = build_report(0, 1, 2, 3, 4);
        data[1] = 0x30;
        assert!(matches!(
            parse_mass_report(&data),
            Err(DecodeError::NotAMassReport(0x30))
        ));
    }

    #[test]
    fn rejects_short_report() {
        assert!(matches!(
            parse_mass_report(&[0u8; 10]),
            Err(DecodeError::ReportTooShort(10))
        ));
    }

    #[test]
    fn calibration_from_fragments() {
        // 12 valores 0..11 nos offsets que o handshake usa
        let mut frag1 = [0u8; BOARD_PACKET_LEN];
        let mut frag2 = [0u8; BOARD_PACKET_LEN];
        let codes: Vec<u16> = (0..12).collect();
        let mut flat = Vec::new();
        for c in &codes {
            flat.extend_from_slice(&c.to_be_bytes());
        }
        flat.push(0); // 25º byte coletado, nunca consumido
        frag1[7..24].copy_from_slice(&flat[0..17]);
        frag2[7..15].copy_from_slice(&flat[17..25]);

        let table = CalibrationTable::from_fragments(&frag1, &frag2).unwrap();
        let expected: [u16; 12] = std::array::from_fn(|i| i as u16);
        assert_eq!(table, CalibrationTable::from_codes(expected));
    }

    #[test]
    fn calibration_rejects_short_fragment() {
        assert!(matches!(
            CalibrationTable::from_fragments(&[0u8; 10], &[0u8; 25]),
            Err(DecodeError::CalibrationFragment(10))
        ));
    }

    #[test]
    fn motion_packet_decodes_mic_and_quaternion() {
        let mut data = [0u8; MOTION_PACKET_LEN];
        data[0..2].copy_from_slice(&1200u16.to_le_bytes());
        data[4..8].copy_from_slice(&1.0f32.to_le_bytes());
        data[8..12].copy_from_slice(&(-0.5f32).to_le_bytes());
        data[12..16].copy_from_slice(&0.25f32.to_le_bytes());
        data[16..20].copy_from_slice(&0.125f32.to_le_bytes());

        let sample = parse_motion_packet(&data).unwrap();
        assert_eq!(sample.mic_level, 1200);
        assert_eq!(sample.quat, Quaternion::new(1.0, -0.5, 0.25, 0.125));
    }

    #[test]
    fn motion_packet_rejects_wrong_length() {
        assert!(matches!(
            parse_motion_packet(&[0u8; 19]),
            Err(DecodeError::PacketLength(19))
        ));
    }
}
