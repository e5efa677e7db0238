//! Board Link – ciclo de vida da plataforma de força.
//!
//! `Disconnected → Connecting → Connected → Disconnected`. Ao conectar,
//! envia a ativação da extensão e acende o LED; antes do loop de poll
//! roda o handshake de calibração (bloqueante, retry infinito). O loop
//! então alterna poll de massa / decode de relatório a cada ~50 ms.

use crate::state::{LinkStatus, SharedState};
use crate::transport::{is_timeout, Transport};
use mira_core::types::BoardEvent;
use mira_core::wire::{
    self, CalibrationTable, BOARD_PACKET_LEN, REPORT_MASS,
};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Transição de botão detectada num relatório.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEdge {
    None,
    Pressed,
    Released,
}

/// Dono da conexão com a plataforma e do seu loop de leitura.
pub struct BoardLink<T: Transport> {
    transport: T,
    state: Arc<SharedState>,
    poll_interval: Duration,
    button_down: bool,
}

impl<T: Transport> BoardLink<T> {
    pub fn new(transport: T, state: Arc<SharedState>, poll_interval: Duration) -> Self {
        Self {
            transport,
            state,
            poll_interval,
            button_down: false,
        }
    }

    /// Roda o ciclo de vida completo do link. Retorna quando o transporte
    /// falha ou o sinal de parada é levantado; em ambos os casos o status
    /// compartilhado termina em `Disconnected`.
    pub fn run(&mut self) {
        self.state.set_board_status(LinkStatus::Connecting);

        let result = self.session();

        self.state.set_board_status(LinkStatus::Disconnected);
        match result {
            Ok(()) => info!("Board link encerrado"),
            Err(e) => error!("Board link desconectado: {e}"),
        }
    }

    fn session(&mut self) -> io::Result<()> {
        // Ativação da extensão + LED, uma vez por conexão
        self.transport.send(&wire::activate_extension_command())?;
        self.transport.send(&wire::set_led_command(true))?;
        self.state.set_board_status(LinkStatus::Connected);
        info!("Plataforma conectada, iniciando handshake de calibração");

        let Some(table) = self.calibrate()? else {
            return Ok(()); // Parada pedida durante o handshake
        };
        info!("Tabela de calibração recebida");

        self.poll_loop(&table)
    }

    /// Handshake de calibração: envia o comando de leitura e espera os
    /// dois fragmentos. Resposta malformada ⇒ reenvia o mesmo comando,
    /// indefinidamente. Bloqueia o loop de leitura até completar.
    fn calibrate(&mut self) -> io::Result<Option<CalibrationTable>> {
        let mut frag1 = [0u8; BOARD_PACKET_LEN];
        let mut frag2 = [0u8; BOARD_PACKET_LEN];

        while !self.state.stopped() {
            self.transport.send(&wire::calibration_read_command())?;

            let n = match self.transport.recv(&mut frag1) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e),
            };
            if n < 2 || frag1[1] != REPORT_MASS {
                debug!("Resposta de calibração inesperada, reenviando comando");
                continue;
            }

            let n2 = match self.transport.recv(&mut frag2) {
                Ok(n2) => n2,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e),
            };

            match CalibrationTable::from_fragments(&frag1[..n], &frag2[..n2]) {
                Ok(table) => return Ok(Some(table)),
                Err(e) => {
                    warn!("Fragmentos de calibração inválidos: {e}");
                }
            }
        }

        Ok(None)
    }

    /// Loop de recepção pós-calibração: poll de massa a cada ciclo.
    fn poll_loop(&mut self, table: &CalibrationTable) -> io::Result<()> {
        let mut buf = [0u8; BOARD_PACKET_LEN];

        while !self.state.stopped() {
            self.transport.send(&wire::mass_poll_command())?;
            std::thread::sleep(self.poll_interval);

            let n = match self.transport.recv(&mut buf) {
                Ok(n) => n,
                Err(e) if is_timeout(&e) => continue,
                Err(e) => return Err(e),
            };

            match self.handle_report(table, &buf[..n]) {
                Ok((event, edge)) => {
                    self.state.set_center(event.center);
                    match edge {
                        ButtonEdge::Pressed => info!("Botão da plataforma pressionado"),
                        ButtonEdge::Released => info!("Botão da plataforma solto"),
                        ButtonEdge::None => {}
                    }
                }
                // Amostra malformada é descartada, o loop segue
                Err(e) => debug!("Relatório descartado: {e}"),
            }
        }

        Ok(())
    }

    /// Decodifica um relatório e computa a transição de botão contra o
    /// estado retido do relatório anterior.
    fn handle_report(
        &mut self,
        table: &CalibrationTable,
        data: &[u8],
    ) -> Result<(BoardEvent, ButtonEdge), wire::DecodeError> {
        let report = wire::parse_mass_report(data)?;
        let down = report.is_button_down();

        let edge = if down && !self.button_down {
            ButtonEdge::Pressed
        } else if !down && self.button_down {
            ButtonEdge::Released
        } else {
            ButtonEdge::None
        };
        self.button_down = down;

        let [tr, br, tl, bl] = report.masses(table);
        let event = BoardEvent::new(tl, tr, bl, br, down, edge == ButtonEdge::Released);
        Ok((event, edge))
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use mira_core::wire::BUTTON_DOWN_MASK;
    use std::collections::VecDeque;

    /// Transporte roteirizado: devolve as respostas na ordem e registra
    /// tudo que foi enviado.
    struct ScriptedTransport {
        replies: VecDeque<Vec<u8>>,
        sent: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(replies: Vec<Vec<u8>>) -> Self {
            Self {
                replies: replies.into(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for ScriptedTransport {
        fn send(&mut self, data: &[u8]) -> io::Result<usize> {
            self.sent.push(data.to_vec());
            Ok(data.len())
        }

        fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.replies.pop_front() {
                Some(reply) => {
                    buf[..reply.len()].copy_from_slice(&reply);
                    Ok(reply.len())
                }
                None => Err(io::Error::new(io::ErrorKind::ConnectionAborted, "fim")),
            }
        }
    }

    fn calibration_fragments() -> (Vec<u8>, Vec<u8>) {
        // low=100, mid=200, high=300 em todos os cantos
        let codes: [u16; 12] = [100, 100, 100, 100, 200, 200, 200, 200, 300, 300, 300, 300];
        let mut flat = Vec::new();
        for c in codes {
            flat.extend_from_slice(&c.to_be_bytes());
        }
        flat.push(0);

        let mut frag1 = vec![0u8; BOARD_PACKET_LEN];
        let mut frag2 = vec![0u8; BOARD_PACKET_LEN];
        frag1[1] = REPORT_MASS;
        frag1[7..24].copy_from_slice(&flat[0..17]);
        frag2[7..15].copy_from_slice(&flat[17..25]);
        (frag1, frag2)
    }

    fn mass_report(button: u16, tr: u16, br: u16, tl: u16, bl: u16) -> Vec<u8> {
        let mut data = vec![0u8; BOARD_PACKET_LEN];
        data[1] = REPORT_MASS;
        data[2..4].copy_from_slice(&button.to_be_bytes());
        data[7..9].copy_from_slice(&tr.to_be_bytes());
        data[9..11].copy_from_slice(&br.to_be_bytes());
        data[11..13].copy_from_slice(&tl.to_be_bytes());
        data[13..15].copy_from_slice(&bl.to_be_bytes());
        data
    }

    fn link_with_table() -> (BoardLink<ScriptedTransport>, CalibrationTable) {
        let state = Arc::new(SharedState::new());
        let link = BoardLink::new(ScriptedTransport::new(vec![]), state, Duration::ZERO);
        let table = CalibrationTable::from_codes([
            100, 100, 100, 100, 200, 200, 200, 200, 300, 300, 300, 300,
        ]);
        (link, table)
    }

    #[test]
    fn full_session_calibrates_and_publishes_center() {
        let (frag1, frag2) = calibration_fragments();
        let transport = ScriptedTransport::new(vec![
            frag1,
            frag2,
            // Todo o peso à direita: TR=300, BR=300, TL/BL abaixo do low
            mass_report(0, 300, 300, 50, 50),
        ]);

        let state = Arc::new(SharedState::new());
        let mut link = BoardLink::new(transport, Arc::clone(&state), Duration::ZERO);
        link.run();

        let center = state.center();
        assert_eq!(center.x, 1.0);
        assert_eq!(state.board_status(), LinkStatus::Disconnected);

        // Primeiro envio = ativação da extensão, segundo = LED
        assert_eq!(link.transport.sent[0], wire::activate_extension_command());
        assert_eq!(link.transport.sent[1], wire::set_led_command(true));
        assert_eq!(link.transport.sent[2], wire::calibration_read_command());
    }

    #[test]
    fn calibration_retries_on_wrong_report_type() {
        let (frag1, frag2) = calibration_fragments();
        let mut bogus = vec![0u8; BOARD_PACKET_LEN];
        bogus[1] = 0x30; // tipo errado ⇒ reenvia o comando

        let transport = ScriptedTransport::new(vec![bogus, frag1, frag2]);
        let state = Arc::new(SharedState::new());
        let mut link = BoardLink::new(transport, Arc::clone(&state), Duration::ZERO);
        link.run();

        let cal_sends = link
            .transport
            .sent
            .iter()
            .filter(|s| s.as_slice() == wire::calibration_read_command())
            .count();
        assert_eq!(cal_sends, 2);
    }

    #[test]
    fn sustained_press_fires_exactly_one_edge_pair() {
        let (mut link, table) = link_with_table();

        let mut pressed = 0;
        let mut released = 0;
        // 5 relatórios com o botão sustentado, depois 3 soltos
        for _ in 0..5 {
            let (_, edge) = link
                .handle_report(&table, &mass_report(BUTTON_DOWN_MASK, 0, 0, 0, 0))
                .unwrap();
            match edge {
                ButtonEdge::Pressed => pressed += 1,
                ButtonEdge::Released => released += 1,
                ButtonEdge::None => {}
            }
        }
        for _ in 0..3 {
            let (_, edge) = link.handle_report(&table, &mass_report(0, 0, 0, 0, 0)).unwrap();
            match edge {
                ButtonEdge::Pressed => pressed += 1,
                ButtonEdge::Released => released += 1,
                ButtonEdge::None => {}
            }
        }

        assert_eq!(pressed, 1);
        assert_eq!(released, 1);
    }

    #[test]
    fn decoded_masses_match_the_calibration_scenario() {
        let (mut link, table) = link_with_table();
        let (event, _) = link
            .handle_report(&table, &mass_report(0, 150, 200, 250, 100))
            .unwrap();

        assert_eq!(event.top_right, 8.5);
        assert_eq!(event.bottom_right, 17.0);
        assert_eq!(event.top_left, 25.5);
        assert_eq!(event.bottom_left, 0.0);
        assert_eq!(event.total_weight, 51.0);
    }
}
