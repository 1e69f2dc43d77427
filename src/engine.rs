//! # Frame Engine
//!
//! Request/response driver for the controller's length-less binary protocol.
//!
//! Replies carry no length field, so the engine offers two ways to find the
//! end of a reply:
//!
//! - **Length-known** ([`FrameEngine::request_exact`]): the caller knows the
//!   reply size for the command it sent and reads exactly that many bytes,
//!   with a deadline measured from the start of the read and a bounded number
//!   of attempts.
//! - **Idle-framed** ([`FrameEngine::send_command`]): the reply ends once the
//!   device has been silent for the idle gap. The gap restarts on every chunk
//!   received.
//!
//! Both paths flush stale input before writing, so a reply left half-read by
//! an earlier failed exchange cannot be mistaken for the next one.
//!
//! Exchanges are strictly half-duplex: one command in flight per stream.
//! Every method takes the stream as `&mut`, so the borrow checker enforces
//! that for a single caller; several devices sharing one stream must be
//! serialized by their owner.

use std::future::poll_fn;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::time::{sleep_until, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::{ExchangeTiming, LinkConfig};
use crate::constants::{COMMAND_FRAME_LEN, CRC_LEN, MAX_RESPONSE_LEN, MIN_RESPONSE_LEN};
use crate::error::{LinkError, LinkResult};
use crate::frame::{check_address, check_crc, crc16, format_hex, validate_response};

/// Link statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Command frames written
    pub requests_sent: u64,
    /// Replies that passed validation
    pub responses_received: u64,
    /// Failed exchanges
    pub errors: u64,
    /// Individual deadline expiries, including retried ones
    pub timeouts: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Stale bytes discarded before a command or between read attempts
    pub bytes_flushed: u64,
}

/// Generic request/response driver over any byte stream.
#[derive(Debug, Clone)]
pub struct FrameEngine {
    device_address: u8,
    timing: ExchangeTiming,
    last_response: [u8; MAX_RESPONSE_LEN],
    last_response_len: usize,
    stats: LinkStats,
    packet_logging: bool,
}

impl FrameEngine {
    /// Create an engine for the device at `device_address`.
    pub fn new(device_address: u8, timing: ExchangeTiming) -> Self {
        Self {
            device_address,
            timing,
            last_response: [0; MAX_RESPONSE_LEN],
            last_response_len: 0,
            stats: LinkStats::default(),
            packet_logging: false,
        }
    }

    /// Create an engine from a link configuration.
    pub fn from_config(config: &LinkConfig) -> Self {
        let mut engine = Self::new(config.device_address, config.timing);
        engine.packet_logging = config.packet_logging;
        engine
    }

    /// Device address this engine talks to
    pub fn device_address(&self) -> u8 {
        self.device_address
    }

    /// Exchange timings
    pub fn timing(&self) -> &ExchangeTiming {
        &self.timing
    }

    /// Enable or disable packet logging
    pub fn set_packet_logging(&mut self, enabled: bool) {
        self.packet_logging = enabled;
    }

    /// Link statistics
    pub fn stats(&self) -> &LinkStats {
        &self.stats
    }

    /// Last reply accepted by [`send_command`](Self::send_command)
    pub fn last_response(&self) -> &[u8] {
        &self.last_response[..self.last_response_len]
    }

    /// Length of the last accepted reply
    pub fn last_response_len(&self) -> usize {
        self.last_response_len
    }

    fn log_packet(&self, direction: &str, data: &[u8]) {
        if self.packet_logging {
            info!(
                "[JNGE] {} addr:{:02X} {}",
                direction,
                self.device_address,
                format_hex(data)
            );
        }
    }

    /// Count a failed exchange and pass the result through.
    pub(crate) fn note<T>(&mut self, operation: &str, result: LinkResult<T>) -> LinkResult<T> {
        if let Err(ref e) = result {
            self.stats.errors += 1;
            warn!("{} failed: {}", operation, e);
        }
        result
    }

    /// Discard every byte already waiting on the stream without blocking.
    ///
    /// Returns the number of bytes discarded. A closed stream is an error.
    pub async fn flush_input<S>(&mut self, stream: &mut S) -> LinkResult<usize>
    where
        S: AsyncRead + Unpin,
    {
        let mut scratch = [0u8; 64];
        let mut discarded = 0;

        loop {
            let mut buf = ReadBuf::new(&mut scratch);
            let polled =
                poll_fn(|cx| Poll::Ready(Pin::new(&mut *stream).poll_read(cx, &mut buf))).await;

            match polled {
                Poll::Pending => break,
                Poll::Ready(Ok(())) if buf.filled().is_empty() => {
                    return Err(LinkError::ConnectionClosed)
                }
                Poll::Ready(Ok(())) => discarded += buf.filled().len(),
                Poll::Ready(Err(e)) => return Err(e.into()),
            }
        }

        if discarded > 0 {
            debug!("Flushed {} stale bytes", discarded);
            self.stats.bytes_flushed += discarded as u64;
        }
        Ok(discarded)
    }

    /// Write a complete frame within the write timeout.
    pub async fn write_frame<S>(&mut self, stream: &mut S, frame: &[u8]) -> LinkResult<()>
    where
        S: AsyncWrite + Unpin,
    {
        let limit = self.timing.write_timeout;
        let write = async {
            stream.write_all(frame).await?;
            stream.flush().await
        };

        match timeout(limit, write).await {
            Ok(Ok(())) => {
                self.stats.requests_sent += 1;
                self.stats.bytes_sent += frame.len() as u64;
                self.log_packet("send", frame);
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                self.stats.timeouts += 1;
                Err(LinkError::timeout("write frame", limit.as_millis() as u64))
            }
        }
    }

    /// Fill `dst` completely, or fail once `limit` has elapsed since the call.
    ///
    /// The deadline does not restart when bytes arrive. On failure the
    /// contents of `dst` are undefined.
    pub async fn read_exact_with_deadline<S>(
        &mut self,
        stream: &mut S,
        dst: &mut [u8],
        limit: Duration,
    ) -> LinkResult<()>
    where
        S: AsyncRead + Unpin,
    {
        match timeout(limit, stream.read_exact(dst)).await {
            Ok(Ok(_)) => {
                self.stats.bytes_received += dst.len() as u64;
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                self.stats.timeouts += 1;
                Err(LinkError::timeout(
                    format!("read of {} bytes", dst.len()),
                    limit.as_millis() as u64,
                ))
            }
        }
    }

    /// [`read_exact_with_deadline`](Self::read_exact_with_deadline), up to
    /// `tries` times.
    ///
    /// Between attempts pending input is flushed and the engine pauses for the
    /// retry pause, so a stream left mid-frame starts clean. A closed stream
    /// is not retried.
    pub async fn read_exact_with_retry<S>(
        &mut self,
        stream: &mut S,
        dst: &mut [u8],
        limit: Duration,
        tries: usize,
    ) -> LinkResult<()>
    where
        S: AsyncRead + Unpin,
    {
        let tries = tries.max(1);
        let mut attempt = 1;

        loop {
            match self.read_exact_with_deadline(stream, dst, limit).await {
                Ok(()) => return Ok(()),
                Err(e) if e.needs_reconnect() || attempt >= tries => return Err(e),
                Err(e) => {
                    debug!("Read attempt {}/{} failed: {}", attempt, tries, e);
                    self.flush_input(stream).await?;
                    tokio::time::sleep(self.timing.retry_pause).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Read one length-less reply into `dst`.
    ///
    /// Waits up to `first_byte_timeout` for data; returns `Ok(0)` if none
    /// arrives. Once data flows, keeps reading until `dst` is full or nothing
    /// has arrived for `idle_gap`, and returns the number of bytes captured.
    pub async fn read_until_idle<S>(
        &mut self,
        stream: &mut S,
        dst: &mut [u8],
        first_byte_timeout: Duration,
        idle_gap: Duration,
    ) -> LinkResult<usize>
    where
        S: AsyncRead + Unpin,
    {
        if dst.is_empty() {
            return Ok(0);
        }

        let mut got = match timeout(first_byte_timeout, stream.read(dst)).await {
            Ok(Ok(0)) => return Err(LinkError::ConnectionClosed),
            Ok(Ok(n)) => n,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                self.stats.timeouts += 1;
                debug!("No reply within {:?}", first_byte_timeout);
                return Ok(0);
            }
        };

        let mut idle_deadline = Instant::now() + idle_gap;
        while got < dst.len() {
            // Silence for a full gap ends the frame, even if data lands on the boundary
            tokio::select! {
                biased;
                _ = sleep_until(idle_deadline) => break,
                read = stream.read(&mut dst[got..]) => match read {
                    Ok(0) => break,
                    Ok(n) => {
                        got += n;
                        idle_deadline = Instant::now() + idle_gap;
                    }
                    Err(e) => return Err(e.into()),
                },
            }
        }

        self.stats.bytes_received += got as u64;
        Ok(got)
    }

    /// Full idle-framed command cycle.
    ///
    /// Patches `address` into byte 0 and `value` into bytes 4..6, recomputes
    /// the CRC, flushes stale input, writes the frame and reads the reply
    /// until the device goes quiet. The reply must be at least 5 bytes, carry
    /// a valid CRC and echo `address`. On success it is kept as the last
    /// response and returned; on failure the last response is left as is.
    ///
    /// Frames shorter than 8 bytes are rejected before any I/O.
    pub async fn send_command<S>(
        &mut self,
        stream: &mut S,
        frame: &mut [u8],
        address: u8,
        value: u16,
    ) -> LinkResult<&[u8]>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self.send_command_inner(stream, frame, address, value).await;
        let len = self.note("send command", result)?;
        Ok(&self.last_response[..len])
    }

    async fn send_command_inner<S>(
        &mut self,
        stream: &mut S,
        frame: &mut [u8],
        address: u8,
        value: u16,
    ) -> LinkResult<usize>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if frame.len() < COMMAND_FRAME_LEN {
            return Err(LinkError::InvalidRequestFrame { len: frame.len() });
        }

        frame[0] = address;
        frame[4..6].copy_from_slice(&value.to_be_bytes());
        let body_len = frame.len() - CRC_LEN;
        let crc = crc16(&frame[..body_len]);
        frame[body_len..].copy_from_slice(&crc.to_le_bytes());

        self.flush_input(stream).await?;
        self.write_frame(stream, frame).await?;

        let mut reply = [0u8; MAX_RESPONSE_LEN];
        let ExchangeTiming {
            first_byte_timeout,
            idle_gap,
            ..
        } = self.timing;
        let got = self
            .read_until_idle(stream, &mut reply, first_byte_timeout, idle_gap)
            .await?;
        let reply = &reply[..got];
        self.log_packet("receive", reply);

        if got == 0 {
            return Err(LinkError::timeout(
                "command reply",
                first_byte_timeout.as_millis() as u64,
            ));
        }
        if got < MIN_RESPONSE_LEN {
            return Err(LinkError::ShortFrame {
                len: got,
                min: MIN_RESPONSE_LEN,
            });
        }
        if got > MAX_RESPONSE_LEN {
            return Err(LinkError::OversizeFrame {
                len: got,
                capacity: MAX_RESPONSE_LEN,
            });
        }
        validate_response(reply, address)?;

        self.last_response[..got].copy_from_slice(reply);
        self.last_response_len = got;
        self.stats.responses_received += 1;
        Ok(got)
    }

    /// Length-known command cycle.
    ///
    /// Flushes stale input, writes `command` as is, then fills `reply` exactly
    /// with [`read_exact_with_retry`](Self::read_exact_with_retry). The reply
    /// must echo the command's device address and end with a valid CRC.
    /// On failure the contents of `reply` are undefined.
    pub async fn request_exact<S>(
        &mut self,
        stream: &mut S,
        command: &[u8],
        reply: &mut [u8],
        limit: Duration,
        tries: usize,
    ) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let result = self
            .request_exact_inner(stream, command, reply, limit, tries)
            .await;
        self.note("exact request", result)
    }

    async fn request_exact_inner<S>(
        &mut self,
        stream: &mut S,
        command: &[u8],
        reply: &mut [u8],
        limit: Duration,
        tries: usize,
    ) -> LinkResult<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        if command.len() < COMMAND_FRAME_LEN {
            return Err(LinkError::InvalidRequestFrame { len: command.len() });
        }
        let address = command[0];

        self.flush_input(stream).await?;
        self.write_frame(stream, command).await?;
        self.read_exact_with_retry(stream, reply, limit, tries).await?;
        self.log_packet("receive", reply);

        check_address(reply, address)?;
        check_crc(reply)?;

        self.stats.responses_received += 1;
        Ok(())
    }
}
