/// Turns raw body buffers into text fragments, one fragment per buffer.
///
/// A multi-byte sequence cut by a buffer boundary is held back until the next
/// buffer completes it. Invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub(crate) struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub(crate) fn push(&mut self, buffer: &[u8]) -> Option<String> {
        self.pending.extend_from_slice(buffer);
        let split = incomplete_tail_start(&self.pending);
        let tail = self.pending.split_off(split);
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = tail;

        (!text.is_empty()).then_some(text)
    }

    /// Flushes whatever is left once the body ends.
    pub(crate) fn finish(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            return None;
        }

        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(text)
    }
}

fn incomplete_tail_start(bytes: &[u8]) -> usize {
    let mut offset = 0;
    loop {
        match std::str::from_utf8(&bytes[offset..]) {
            Ok(_) => return bytes.len(),
            Err(error) => match error.error_len() {
                Some(invalid) => offset += error.valid_up_to() + invalid,
                None => return offset + error.valid_up_to(),
            },
        }
    }
}
