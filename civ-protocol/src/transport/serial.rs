use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use serialport::SerialPortType;

use crate::error::{CivError, Result};

use super::Transport;

/// USB product string to match for the IC-705.
const IC705_PRODUCT: &str = "IC-705";

/// Default serial port settings.
pub const BAUD_RATE: u32 = 115_200;
const DATA_BITS: serialport::DataBits = serialport::DataBits::Eight;
const STOP_BITS: serialport::StopBits = serialport::StopBits::One;
const PARITY: serialport::Parity = serialport::Parity::None;
const FLOW_CONTROL: serialport::FlowControl = serialport::FlowControl::None;

/// Largest chunk the reader hands to the ingest queue in one go.
const READ_CHUNK: usize = 256;

/// The write half of a CI-V serial connection.
pub struct SerialTransport {
    port: Box<dyn serialport::SerialPort>,
}

impl SerialTransport {
    pub fn new(port: Box<dyn serialport::SerialPort>) -> Self {
        Self { port }
    }
}

impl Transport for SerialTransport {
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.port, buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.port)
    }
}

/// Find the serial port for an IC-705.
///
/// Scans all available serial ports and looks for a USB port whose
/// product string contains "IC-705".
pub fn find_ic705_port() -> Result<String> {
    let ports = serialport::available_ports().map_err(CivError::Serial)?;

    for port in &ports {
        debug!("found port: {} ({:?})", port.port_name, port.port_type);
        if let SerialPortType::UsbPort(usb_info) = &port.port_type
            && let Some(product) = &usb_info.product
            && product.contains(IC705_PRODUCT)
        {
            info!("found IC-705 on {}", port.port_name);
            return Ok(port.port_name.clone());
        }
    }

    if ports.is_empty() {
        warn!("no serial ports found");
    } else {
        warn!("IC-705 not found among {} port(s):", ports.len());
        for port in &ports {
            warn!("  {} ({:?})", port.port_name, port.port_type);
        }
    }

    Err(CivError::PortNotFound)
}

/// Open a serial port with CI-V settings (8N1, no handshake).
///
/// Returns the write half as a [`SerialTransport`] and a cloned handle for
/// the reader thread.
pub fn open_port(
    port_name: &str,
    baud_rate: u32,
    read_timeout: Duration,
) -> Result<(SerialTransport, Box<dyn serialport::SerialPort>)> {
    let port = serialport::new(port_name, baud_rate)
        .data_bits(DATA_BITS)
        .stop_bits(STOP_BITS)
        .parity(PARITY)
        .flow_control(FLOW_CONTROL)
        .timeout(read_timeout)
        .open()
        .map_err(CivError::Serial)?;
    let reader = port.try_clone().map_err(CivError::Serial)?;

    info!("opened {} at {} baud", port_name, baud_rate);
    Ok((SerialTransport::new(port), reader))
}

/// Why a reader thread ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderExit {
    /// [`ReaderHandle::stop`] was called.
    Stopped,
    /// `on_chunk` reported its queue closed.
    QueueClosed,
    /// The port returned an I/O error, e.g. the radio was unplugged.
    Failed,
}

/// A running serial reader thread.
pub struct ReaderHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ReaderHandle {
    /// Ask the reader to exit and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take()
            && thread.join().is_err()
        {
            error!(target: "CiV", "serial reader thread panicked");
        }
    }
}

impl Drop for ReaderHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawn the thread that drains `port` into `on_chunk`.
///
/// `on_chunk` must not block; it returns `false` once its queue has closed,
/// which ends the thread. Read timeouts are expected and ignored; any other
/// I/O error is logged and ends the thread. `on_exit` runs on the reader
/// thread before `on_chunk` is dropped.
pub fn spawn_reader<R, F, E>(mut port: R, mut on_chunk: F, on_exit: E) -> ReaderHandle
where
    R: io::Read + Send + 'static,
    F: FnMut(Vec<u8>) -> bool + Send + 'static,
    E: FnOnce(ReaderExit) + Send + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);

    let thread = thread::spawn(move || {
        let exit = read_until_exit(&mut port, &flag, &mut on_chunk);
        debug!("serial reader exiting: {exit:?}");
        on_exit(exit);
    });

    ReaderHandle {
        stop,
        thread: Some(thread),
    }
}

fn read_until_exit<R, F>(port: &mut R, stop: &AtomicBool, on_chunk: &mut F) -> ReaderExit
where
    R: io::Read,
    F: FnMut(Vec<u8>) -> bool,
{
    let mut buf = [0u8; READ_CHUNK];
    while !stop.load(Ordering::Relaxed) {
        match io::Read::read(port, &mut buf) {
            Ok(0) => {}
            Ok(n) => {
                trace!("read {} bytes: {:02X?}", n, &buf[..n]);
                if !on_chunk(buf[..n].to_vec()) {
                    return ReaderExit::QueueClosed;
                }
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                error!(target: "CiV", "CiV data receive error: {e}");
                return ReaderExit::Failed;
            }
        }
    }
    ReaderExit::Stopped
}
