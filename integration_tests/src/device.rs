//! Serial link to a bridge board's UART.

#![allow(dead_code)]

use std::io::{Read, Write};
use std::time::{Duration, Instant};

use anyhow::Result;
use serialport::SerialPort;

/// List USB serial adapters that could be wired to a board's UART.
pub fn find_serial_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|p| p.port_name)
        .filter(|name| name.contains("ttyUSB") || name.contains("ttyACM"))
        .collect())
}

/// Resolve two port arguments; "auto" takes the first free adapters in order.
pub fn resolve_two_ports(port_a: &str, port_b: &str) -> Result<(String, String)> {
    let mut found = find_serial_ports()?.into_iter().filter(|p| p != port_a && p != port_b);

    let mut pick = |arg: &str| -> Result<String> {
        if arg == "auto" {
            found
                .next()
                .ok_or_else(|| anyhow::anyhow!("Not enough serial adapters found - ensure both boards are wired"))
        } else {
            Ok(arg.to_string())
        }
    };

    let a = pick(port_a)?;
    let b = pick(port_b)?;
    if a == b {
        anyhow::bail!("Both sides resolved to the same port {}", a);
    }
    Ok((a, b))
}

/// Resolve a single port argument.
pub fn resolve_port(port_arg: &str) -> Result<String> {
    if port_arg == "auto" {
        match find_serial_ports()?.into_iter().next() {
            Some(port) => Ok(port),
            None => anyhow::bail!("No serial adapter found - ensure the board is wired"),
        }
    } else {
        Ok(port_arg.to_string())
    }
}

/// Raw byte link to one side of the bridge.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    timeout: Duration,
}

impl SerialLink {
    pub fn new(port_name: &str, baud_rate: u32) -> Result<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::from_millis(50))
            .open()?;

        Ok(Self {
            port,
            timeout: Duration::from_secs(2),
        })
    }

    /// Set how long reads wait for the expected bytes.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Discard anything already buffered on the port.
    pub fn drain_buffer(&mut self) -> Result<()> {
        self.port.clear(serialport::ClearBuffer::All)?;

        let mut buf = [0u8; 256];
        loop {
            match self.port.read(&mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    /// Read until `len` bytes arrived or the timeout elapsed.
    ///
    /// Returns whatever arrived; the caller compares it with what it sent.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(len);
        let mut buf = [0u8; 64];
        let start = Instant::now();

        while data.len() < len && start.elapsed() < self.timeout {
            let want = (len - data.len()).min(buf.len());
            match self.port.read(&mut buf[..want]) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(data)
    }

    /// Collect everything arriving within `window`.
    pub fn read_for(&mut self, window: Duration) -> Result<Vec<u8>> {
        let mut data = Vec::new();
        let mut buf = [0u8; 64];
        let start = Instant::now();

        while start.elapsed() < window {
            match self.port.read(&mut buf) {
                Ok(n) => data.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::TimedOut => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(data)
    }

    pub fn port_name(&self) -> String {
        self.port.name().unwrap_or_default()
    }
}
