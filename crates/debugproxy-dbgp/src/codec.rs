use crate::{DbgpError, Result, MAX_FRAME_BYTES, MAX_LENGTH_DIGITS, NUL};

/// Wrap `payload` into a DBGp frame.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let prefix = payload.len().to_string();
    let mut out = Vec::with_capacity(prefix.len() + payload.len() + 2);
    out.extend_from_slice(prefix.as_bytes());
    out.push(NUL);
    out.extend_from_slice(payload);
    out.push(NUL);
    out
}

/// Total size of the frame starting at `buf[0]`, once the length prefix is known.
///
/// Returns `Ok(None)` while the prefix's NUL has not arrived yet. The returned
/// size counts the prefix digits, the payload and both NUL delimiters.
pub fn frame_len(buf: &[u8]) -> Result<Option<usize>> {
    let Some(nul) = buf.iter().position(|&b| b == NUL) else {
        if buf.len() > MAX_LENGTH_DIGITS {
            return Err(malformed(&buf[..MAX_LENGTH_DIGITS + 1]));
        }
        return Ok(None);
    };

    let prefix = &buf[..nul];
    if prefix.is_empty()
        || prefix.len() > MAX_LENGTH_DIGITS
        || !prefix.iter().all(u8::is_ascii_digit)
    {
        return Err(malformed(prefix));
    }

    // All ASCII digits, so this is valid UTF-8; only overflow can fail.
    let payload_len: usize = std::str::from_utf8(prefix)
        .ok()
        .and_then(|digits| digits.parse().ok())
        .ok_or_else(|| malformed(prefix))?;

    let total = payload_len
        .checked_add(prefix.len() + 2)
        .filter(|total| *total <= MAX_FRAME_BYTES)
        .ok_or(DbgpError::FrameTooLarge {
            len: payload_len,
            max: MAX_FRAME_BYTES,
        })?;
    Ok(Some(total))
}

/// Payload of a complete frame.
pub fn decode_frame(frame: &[u8]) -> Result<&[u8]> {
    let expected = frame_len(frame)?.ok_or_else(|| malformed(frame))?;
    if frame.len() < expected {
        return Err(DbgpError::Incomplete {
            expected,
            have: frame.len(),
        });
    }
    if frame[expected - 1] != NUL {
        return Err(DbgpError::MissingTerminator { len: expected });
    }

    let start = frame
        .iter()
        .position(|&b| b == NUL)
        .map(|nul| nul + 1)
        .unwrap_or_default();
    Ok(&frame[start..expected - 1])
}

/// Human readable rendering of protocol bytes for logs (NUL shown as `\0`).
pub fn render_message(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).replace('\0', "\\0")
}

fn malformed(prefix: &[u8]) -> DbgpError {
    DbgpError::MalformedLength {
        prefix: String::from_utf8_lossy(prefix).into_owned(),
    }
}
