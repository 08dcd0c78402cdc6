use std::io;
use std::sync::Arc;

use civ_protocol::command::cmd;
use civ_protocol::transport::serial::{self, ReaderExit, ReaderHandle};
use civ_protocol::{CommandEncoder, DatagramDecoder};
use log::{debug, error, info, warn};
use tokio::sync::mpsc::{self, error::TryRecvError, error::TrySendError};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{CivConfig, PollPolicy};
use crate::duplex::{self, RepeaterMonitor};
use crate::error::{Error, Result};
use crate::properties::{Property, PropertyStore};
use crate::repeater::RepeaterDirectory;

/// Producer side of the ingest queue. Never blocks.
#[derive(Debug, Clone)]
pub struct IngestSender {
    tx: mpsc::Sender<Vec<u8>>,
}

impl IngestSender {
    /// Queue a chunk. A full queue drops it; returns `false` once the poll
    /// task is gone.
    pub fn push(&self, chunk: Vec<u8>) -> bool {
        match self.tx.try_send(chunk) {
            Ok(()) => true,
            Err(TrySendError::Full(chunk)) => {
                warn!(target: "CiV", "ingest queue full, dropped {} bytes", chunk.len());
                true
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// A bounded queue between the serial reader and the poll task.
pub fn ingest_queue(capacity: usize) -> Result<(IngestSender, mpsc::Receiver<Vec<u8>>)> {
    if capacity == 0 {
        return Err(Error::ZeroQueueCapacity);
    }
    let (tx, rx) = mpsc::channel(capacity);
    Ok((IngestSender { tx }, rx))
}

/// Feed queued chunks to `decoder` until every sender is gone.
///
/// Waits `policy.busy` after a chunk and `policy.idle` after finding the
/// queue empty. Returns the number of chunks processed.
pub async fn poll_loop(
    mut rx: mpsc::Receiver<Vec<u8>>,
    mut decoder: DatagramDecoder,
    policy: PollPolicy,
) -> usize {
    let mut chunks = 0;
    loop {
        let processed = match rx.try_recv() {
            Ok(chunk) => {
                decoder.parse(&chunk);
                chunks += 1;
                true
            }
            Err(TryRecvError::Empty) => false,
            Err(TryRecvError::Disconnected) => {
                debug!("ingest queue closed after {chunks} chunks");
                return chunks;
            }
        };
        tokio::time::sleep(policy.delay(processed)).await;
    }
}

/// Send the start-up queries: frequency, mode, tone, tone enable and power.
pub fn query_radio(encoder: &CommandEncoder) {
    encoder.send_command(cmd::READ_FREQ);
    encoder.send_command(cmd::READ_MODE);
    duplex::query_repeater_state(encoder);
}

/// Decoder with a [`RepeaterMonitor`] already listening.
pub fn monitor_decoder(
    directory: Arc<RepeaterDirectory>,
    encoder: CommandEncoder,
    props: Arc<dyn PropertyStore>,
) -> DatagramDecoder {
    let mut decoder = DatagramDecoder::new();
    decoder.add_listener(Box::new(RepeaterMonitor::new(directory, encoder, props)));
    decoder
}

/// How the poll task finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PollOutcome {
    chunks: usize,
    exit: ReaderExit,
}

/// An open serial connection with its reader thread and poll task.
pub struct Session {
    encoder: CommandEncoder,
    directory: Arc<RepeaterDirectory>,
    props: Arc<dyn PropertyStore>,
    reader: Option<ReaderHandle>,
    poll: Option<JoinHandle<PollOutcome>>,
    outcome: Option<PollOutcome>,
}

impl Session {
    /// Open the port and start reading. Must be called inside a tokio runtime.
    pub fn open(
        config: &CivConfig,
        directory: Arc<RepeaterDirectory>,
        props: Arc<dyn PropertyStore>,
    ) -> Result<Self> {
        config.validate()?;
        let port_name = match &config.port {
            Some(name) => name.clone(),
            None => serial::find_ic705_port()?,
        };
        let (transport, reader_port) =
            serial::open_port(&port_name, config.baud_rate, config.read_timeout)?;
        let encoder =
            CommandEncoder::with_addresses(transport, config.radio_addr, config.controller_addr);

        let session = Self::start(config, encoder, reader_port, directory, props)?;
        info!("session open on {port_name}");
        Ok(session)
    }

    /// Start the reader on `port` and the poll task behind it.
    ///
    /// Publishes the link as on. If the reader fails, the poll task drains
    /// what was read and then publishes the failure.
    pub fn start<R>(
        config: &CivConfig,
        encoder: CommandEncoder,
        port: R,
        directory: Arc<RepeaterDirectory>,
        props: Arc<dyn PropertyStore>,
    ) -> Result<Self>
    where
        R: io::Read + Send + 'static,
    {
        let (tx, rx) = ingest_queue(config.queue_capacity)?;
        let (exit_tx, mut exit_rx) = oneshot::channel();
        props.update(Property::Timer, "On".to_string());
        props.update(Property::RadioLink, "On".to_string());

        let decoder = monitor_decoder(Arc::clone(&directory), encoder.clone(), Arc::clone(&props));
        let policy = config.poll;
        let status = Arc::clone(&props);
        let poll = tokio::spawn(async move {
            let chunks = poll_loop(rx, decoder, policy).await;
            // The reader reports before its queue closes; no report means it panicked.
            let exit = exit_rx.try_recv().unwrap_or(ReaderExit::Failed);
            if exit == ReaderExit::Failed {
                status.update(Property::Timer, "Read Error".to_string());
                status.update(Property::RadioLink, "Off".to_string());
            }
            PollOutcome { chunks, exit }
        });

        let reader = serial::spawn_reader(
            port,
            move |chunk| tx.push(chunk),
            move |exit| {
                let _ = exit_tx.send(exit);
            },
        );

        Ok(Self {
            encoder,
            directory,
            props,
            reader: Some(reader),
            poll: Some(poll),
            outcome: None,
        })
    }

    pub fn encoder(&self) -> &CommandEncoder {
        &self.encoder
    }

    pub fn query_radio(&self) {
        query_radio(&self.encoder);
    }

    pub fn frequency_jump(&self, hz: u64) {
        duplex::do_frequency_jump(&self.directory, &self.encoder, hz);
    }

    /// Wait until the reader has ended and everything it read is decoded.
    ///
    /// Safe to cancel; a later call or [`Session::close`] picks up the wait.
    pub async fn reader_exited(&mut self) -> ReaderExit {
        if let Some(poll) = self.poll.as_mut() {
            let outcome = poll.await.unwrap_or_else(|e| {
                error!("poll task failed: {e}");
                PollOutcome {
                    chunks: 0,
                    exit: ReaderExit::Failed,
                }
            });
            self.poll = None;
            self.outcome = Some(outcome);
        }
        self.outcome.map_or(ReaderExit::Failed, |o| o.exit)
    }

    /// Stop the reader, let the poll task drain, then publish the link as off.
    pub async fn close(mut self) {
        if let Some(reader) = self.reader.take()
            && tokio::task::spawn_blocking(move || reader.stop()).await.is_err()
        {
            error!(target: "CiV", "serial reader shutdown failed");
        }
        let exit = self.reader_exited().await;
        let chunks = self.outcome.map_or(0, |o| o.chunks);
        info!("session closed ({exit:?}), {chunks} chunks decoded");

        self.props.update(Property::Timer, "Off".to_string());
        self.props.update(Property::RadioLink, "Off".to_string());
    }
}
