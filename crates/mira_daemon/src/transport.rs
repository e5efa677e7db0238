//! Transporte de bytes crus para um link de hardware.
//!
//! Cada link é dono de exatamente um handle de transporte; o handle é
//! liberado em todo caminho de saída (drop do socket). O endpoint TCP é
//! um bridge serial/Bluetooth local configurado no `config.toml`.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;
use tracing::info;

/// Transporte bloqueante com timeout de leitura limitado, para que o
/// sinal de parada nunca fique preso atrás de um `recv`.
///
/// Cada `recv` deve entregar exatamente um pacote do sensor: o bridge
/// local preserva as fronteiras dos relatórios HID/serial, como os
/// sockets RFCOMM/L2CAP originais. Sobre um stream TCP cru, sem o
/// bridge, um pacote poderia partir ou coalescer entre leituras e os
/// decoders descartariam amostras até realinhar.
pub trait Transport: Send {
    fn send(&mut self, data: &[u8]) -> io::Result<usize>;
    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Timeout de leitura não é falha de link.
pub fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

/// Transporte sobre TCP (bridge local para o rádio do sensor).
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(addr: &str, read_timeout: Duration) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        stream.set_read_timeout(Some(read_timeout))?;
        info!("Transporte conectado a {addr}");
        Ok(Self { stream })
    }
}

impl Transport for TcpTransport {
    fn send(&mut self, data: &[u8]) -> io::Result<usize> {
        self.stream.write_all(data)?;
        Ok(data.len())
    }

    fn recv(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.stream.read(buf)?;
        if n == 0 {
            // Peer fechou: trata como erro de link, não como dado vazio
            return Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "transporte fechado pelo peer",
            ));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_kinds_are_not_link_failures() {
        assert!(is_timeout(&io::Error::new(io::ErrorKind::TimedOut, "t")));
        assert!(is_timeout(&io::Error::new(io::ErrorKind::WouldBlock, "w")));
        assert!(!is_timeout(&io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "c"
        )));
    }
}
