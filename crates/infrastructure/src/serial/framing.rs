/// Longest unterminated tail kept between reads.
pub const MAX_FRAME: usize = 256;

const ETX: u8 = 0x03;

fn is_terminator(byte: u8) -> bool {
    matches!(byte, b'\r' | b'\n' | ETX)
}

/// Reassembles scale frames that arrive split across reads.
///
/// Bytes up to the last CR/LF/ETX are complete and handed out; the tail
/// waits for the next read. A tail that outgrows `MAX_FRAME` is handed out
/// as is, so a scale that never terminates its frames still gets decoded.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    carry: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk. Returns the complete frames it finished, if any.
    pub fn push(&mut self, chunk: &[u8]) -> Option<Vec<u8>> {
        self.carry.extend_from_slice(chunk);

        if let Some(end) = self.carry.iter().rposition(|b| is_terminator(*b)) {
            let tail = self.carry.split_off(end + 1);
            return Some(std::mem::replace(&mut self.carry, tail));
        }
        if self.carry.len() > MAX_FRAME {
            tracing::debug!(len = self.carry.len(), "Unterminated scale data, flushing");
            return Some(std::mem::take(&mut self.carry));
        }
        None
    }

    pub fn pending(&self) -> &[u8] {
        &self.carry
    }

    pub fn clear(&mut self) {
        self.carry.clear();
    }
}
