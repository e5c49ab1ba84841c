use std::io::{Read, Write};

use crate::error::{FilterError, Result};

/// Largest payload a single packet may carry: the 65520-byte frame limit
/// minus the 4-byte length prefix.
pub const MAX_PAYLOAD: usize = 65516;

const PREFIX_LEN: usize = 4;

/// Length-prefixed packet codec owning both halves of the stdio channel.
///
/// Wire format in both directions: a 4-character lower-case hex length
/// prefix counting itself plus the payload, then the payload bytes. The
/// literal `0000` is a flush marker carrying no payload.
pub struct PacketChannel<R, W> {
    input: R,
    output: W,
}

impl<R: Read, W: Write> PacketChannel<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    /// Read one packet payload. Returns empty bytes on a flush marker, on
    /// a zero-payload packet, and on end of stream at a packet boundary.
    /// A stream that ends inside a packet is a protocol error.
    pub fn read_pkt(&mut self) -> Result<Vec<u8>> {
        let mut prefix = [0u8; PREFIX_LEN];
        let mut got = 0;
        while got < PREFIX_LEN {
            let n = self.input.read(&mut prefix[got..])?;
            if n == 0 {
                if got == 0 {
                    return Ok(Vec::new());
                }
                return Err(FilterError::Protocol(
                    "stream ended inside a packet length prefix".into(),
                ));
            }
            got += n;
        }
        let text = std::str::from_utf8(&prefix)
            .map_err(|_| FilterError::Protocol("non-ascii packet length prefix".into()))?;
        let length = usize::from_str_radix(text, 16)
            .map_err(|_| FilterError::Protocol(format!("bad packet length prefix {text:?}")))?;
        if length == 0 {
            return Ok(Vec::new());
        }
        if length < PREFIX_LEN {
            return Err(FilterError::Protocol(format!(
                "packet length {length} below prefix size"
            )));
        }
        let mut payload = vec![0u8; length - PREFIX_LEN];
        self.input.read_exact(&mut payload)?;
        Ok(payload)
    }

    /// Read one packet and decode it as trimmed UTF-8 text.
    pub fn read_pkt_str(&mut self) -> Result<String> {
        let payload = self.read_pkt()?;
        let text = String::from_utf8(payload)
            .map_err(|_| FilterError::Protocol("packet payload is not UTF-8".into()))?;
        Ok(text.trim().to_string())
    }

    pub fn write_pkt(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_PAYLOAD {
            return Err(FilterError::Protocol(format!(
                "packet payload of {} bytes exceeds {MAX_PAYLOAD}",
                payload.len()
            )));
        }
        let prefix = format!("{:04x}", payload.len() + PREFIX_LEN);
        self.output.write_all(prefix.as_bytes())?;
        self.output.write_all(payload)?;
        self.output.flush()?;
        Ok(())
    }

    pub fn write_pkt_str(&mut self, text: &str) -> Result<()> {
        self.write_pkt(text.as_bytes())
    }

    /// Emit an arbitrarily large buffer as consecutive max-sized packets.
    pub fn write_split(&mut self, data: &[u8]) -> Result<()> {
        for part in data.chunks(MAX_PAYLOAD) {
            self.write_pkt(part)?;
        }
        Ok(())
    }

    /// Emit the literal `0000` flush marker.
    pub fn flush_pkt(&mut self) -> Result<()> {
        self.output.write_all(b"0000")?;
        self.output.flush()?;
        Ok(())
    }
}
