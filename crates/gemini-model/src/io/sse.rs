use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading the `data` of server-sent events from a chunk stream.
///
/// Only the subset of the event stream format the provider emits is
/// understood: `data` fields (joined with line feeds when repeated) and
/// comment lines. Other fields are skipped. Both `\n` and `\r\n` line
/// endings are accepted.
pub struct Sse {
    // Bytes of an incomplete UTF-8 sequence at the end of the last chunk.
    undecoded: Vec<u8>,
    buf: String,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            undecoded: Vec::new(),
            buf: String::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // Events already buffered are delivered before reading more.
            if let Some(data) = self.try_parse_event() {
                return Ok(Some(data));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // The body ended in the middle of a character.
                if !self.undecoded.is_empty() {
                    return Err(Error::InvalidPayload);
                }
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.undecoded.extend_from_slice(bytes);
        let valid_up_to = match str::from_utf8(&self.undecoded) {
            Ok(s) => {
                self.buf.push_str(s);
                self.undecoded.clear();
                return Ok(());
            }
            // `error_len() == None` means the input ends in the middle of
            // a character, the rest should arrive with the next chunk.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let rest = self.undecoded.split_off(valid_up_to);
        // SAFETY: `from_utf8` has validated the bytes before `valid_up_to`.
        self.buf
            .push_str(unsafe { str::from_utf8_unchecked(&self.undecoded) });
        self.undecoded = rest;
        Ok(())
    }

    fn try_parse_event(&mut self) -> Option<String> {
        loop {
            if self.buf.contains('\r') {
                self.buf = self.buf.replace("\r\n", "\n");
            }
            let end = self.buf.find("\n\n")?;

            let mut data: Option<String> = None;
            for line in self.buf[..end].lines() {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (field, value) = match line.split_once(':') {
                    Some((field, value)) => {
                        (field, value.strip_prefix(' ').unwrap_or(value))
                    }
                    None => (line, ""),
                };
                if field != "data" {
                    continue;
                }
                match &mut data {
                    Some(data) => {
                        data.push('\n');
                        data.push_str(value);
                    }
                    None => data = Some(value.to_owned()),
                }
            }
            self.buf.drain(..end + 2);

            // Blocks made only of comments or other fields carry nothing
            // for us, keep looking.
            if data.is_some() {
                return data;
            }
        }
    }
}
