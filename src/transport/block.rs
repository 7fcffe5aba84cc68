//! IEEE 488.2 definite-length arbitrary blocks.
//!
//! Wire form: `#<n><len><payload>`, where `n` is a single digit giving the number of
//! decimal digits in `len`. Instruments may follow the payload with the message terminator.
//! The indefinite form `#0<payload>` runs to the end of the transfer (END on a bus,
//! EOF on a socket); one trailing newline is dropped.

use crate::error::{BenchError, BenchResult};
use std::io::Read;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};

/// Largest payload accepted from an instrument. Screen captures are well below this.
pub const MAX_BLOCK_LEN: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockHeader {
    /// Bytes occupied by leading whitespace and `#<n><len>`.
    header_len: usize,
    /// Payload length, `None` for the indefinite form.
    payload_len: Option<usize>,
}

/// Parse the block header at the start of `bytes`. `Ok(None)` means more bytes are needed.
fn parse_header(bytes: &[u8]) -> BenchResult<Option<BlockHeader>> {
    let skip = bytes
        .iter()
        .take_while(|b| b.is_ascii_whitespace())
        .count();
    let rest = &bytes[skip..];

    match rest.first() {
        None => return Ok(None),
        Some(b'#') => {}
        Some(_) => return Err(malformed(rest)),
    }
    let digits = match rest.get(1) {
        None => return Ok(None),
        Some(d) if d.is_ascii_digit() => usize::from(d - b'0'),
        Some(_) => return Err(malformed(rest)),
    };
    if digits == 0 {
        return Ok(Some(BlockHeader {
            header_len: skip + 2,
            payload_len: None,
        }));
    }

    let Some(length_field) = rest.get(2..2 + digits) else {
        return Ok(None);
    };
    let length = parse_length(length_field)?;
    Ok(Some(BlockHeader {
        header_len: skip + 2 + digits,
        payload_len: Some(length),
    }))
}

/// Borrow the payload of a complete block held in memory.
pub fn decode_block(bytes: &[u8]) -> BenchResult<&[u8]> {
    let header = parse_header(bytes)?.ok_or_else(|| malformed(bytes))?;
    let body = &bytes[header.header_len..];
    match header.payload_len {
        Some(len) => body.get(..len).ok_or_else(|| {
            BenchError::format(
                &format!("block of {} bytes, {} present", len, body.len()),
                "complete binary block",
            )
        }),
        None => Ok(body.strip_suffix(b"\n").unwrap_or(body)),
    }
}

/// Wrap `payload` as a definite-length block, terminated with a newline.
pub fn encode_block(payload: &[u8]) -> Vec<u8> {
    let length = payload.len().to_string();
    let mut out = Vec::with_capacity(payload.len() + length.len() + 3);
    out.push(b'#');
    out.extend_from_slice(length.len().to_string().as_bytes());
    out.extend_from_slice(length.as_bytes());
    out.extend_from_slice(payload);
    out.push(b'\n');
    out
}

/// Strip a block header from an ASCII response such as a waveform data dump.
pub fn strip_text_header(text: &str) -> &str {
    match parse_header(text.as_bytes()) {
        Ok(Some(header)) => text.get(header.header_len..).unwrap_or(text).trim(),
        _ => text.trim(),
    }
}

/// Read one block from a blocking, message-based reader (bus sessions).
///
/// Reading stops once a definite-length payload is complete, so a missing terminator
/// never costs a timeout. An indefinite block ends with the transfer, signalled by a
/// short read or EOF.
pub fn read_block<R: Read + ?Sized>(reader: &mut R) -> BenchResult<Vec<u8>> {
    let mut raw = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk)?;
        if n > 0 {
            raw.extend_from_slice(&chunk[..n]);
        }
        let end_of_transfer = n < chunk.len();
        match parse_header(&raw)? {
            Some(BlockHeader {
                header_len,
                payload_len: Some(len),
            }) if raw.len() >= header_len + len => break,
            Some(BlockHeader {
                payload_len: None, ..
            }) if end_of_transfer => break,
            _ if n == 0 => break,
            _ => {}
        }
    }
    decode_block(&raw).map(<[u8]>::to_vec)
}

/// Read one block from a buffered async reader (sockets), each step under `deadline`.
pub async fn read_block_async<S>(
    reader: &mut BufReader<S>,
    deadline: Duration,
) -> BenchResult<Vec<u8>>
where
    S: AsyncRead + Unpin,
{
    let mut prefix = Vec::new();
    loop {
        let byte = super::with_deadline(deadline, "binary block header", reader.read_u8()).await?;
        if byte.is_ascii_whitespace() && prefix.is_empty() {
            continue;
        }
        prefix.push(byte);
        if prefix.len() == 2 {
            break;
        }
    }
    if prefix[0] != b'#' || !prefix[1].is_ascii_digit() {
        return Err(malformed(&prefix));
    }
    let digits = usize::from(prefix[1] - b'0');

    if digits == 0 {
        let mut payload = Vec::new();
        super::with_deadline(
            deadline,
            "binary block payload",
            reader.read_to_end(&mut payload),
        )
        .await?;
        if payload.last() == Some(&b'\n') {
            payload.pop();
        }
        return Ok(payload);
    }

    let mut length_field = vec![0u8; digits];
    super::with_deadline(
        deadline,
        "binary block length",
        reader.read_exact(&mut length_field),
    )
    .await?;
    let length = parse_length(&length_field)?;

    let mut payload = vec![0u8; length];
    super::with_deadline(deadline, "binary block payload", reader.read_exact(&mut payload))
        .await?;

    // Terminator, only when it already arrived with the payload.
    if reader.buffer().first() == Some(&b'\n') {
        reader.consume(1);
    }
    Ok(payload)
}

fn parse_length(field: &[u8]) -> BenchResult<usize> {
    let text = std::str::from_utf8(field).map_err(|_| malformed(field))?;
    let length = text.parse::<usize>().map_err(|_| malformed(field))?;
    if length > MAX_BLOCK_LEN {
        return Err(BenchError::format(text, "binary block length within limits"));
    }
    Ok(length)
}

fn malformed(bytes: &[u8]) -> BenchError {
    let preview: String = String::from_utf8_lossy(&bytes[..bytes.len().min(16)]).into_owned();
    BenchError::format(&preview, "binary block header")
}
