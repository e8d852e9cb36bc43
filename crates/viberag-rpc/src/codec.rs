//! Buffered line extractor: accumulate bytes until `\n`, yield the line,
//! keep the tail for the next read (spec §4.12 "Framing").

use tokio::io::{AsyncRead, AsyncReadExt};

/// Largest line accepted before a connection is dropped with `PARSE_ERROR`.
pub const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

pub enum LineOutcome {
    Line(String),
    Eof,
    TooLong,
}

/// Reads one newline-delimited line from `reader`, buffering `pending`
/// across calls so a line split across multiple socket reads is still
/// reassembled correctly. Trailing fragments left in `pending` when the
/// peer disconnects are discarded by the caller, per spec.
pub async fn read_line<R: AsyncRead + Unpin>(
    reader: &mut R,
    pending: &mut Vec<u8>,
) -> std::io::Result<LineOutcome> {
    loop {
        if let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = pending.drain(..=pos).collect();
            line.pop(); // drop the '\n'
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            return Ok(LineOutcome::Line(String::from_utf8_lossy(&line).into_owned()));
        }

        if pending.len() > MAX_LINE_BYTES {
            pending.clear();
            return Ok(LineOutcome::TooLong);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            if pending.is_empty() {
                return Ok(LineOutcome::Eof);
            }
            // A trailing fragment with no newline on disconnect: discard it.
            pending.clear();
            return Ok(LineOutcome::Eof);
        }
        pending.extend_from_slice(&chunk[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn reads_one_line_at_a_time() {
        let mut cursor = Cursor::new(b"hello\nworld\n".to_vec());
        let mut pending = Vec::new();

        let first = read_line(&mut cursor, &mut pending).await.unwrap();
        assert!(matches!(first, LineOutcome::Line(ref s) if s == "hello"));

        let second = read_line(&mut cursor, &mut pending).await.unwrap();
        assert!(matches!(second, LineOutcome::Line(ref s) if s == "world"));

        let third = read_line(&mut cursor, &mut pending).await.unwrap();
        assert!(matches!(third, LineOutcome::Eof));
    }

    #[tokio::test]
    async fn strips_trailing_carriage_return() {
        let mut cursor = Cursor::new(b"hello\r\n".to_vec());
        let mut pending = Vec::new();
        let line = read_line(&mut cursor, &mut pending).await.unwrap();
        assert!(matches!(line, LineOutcome::Line(ref s) if s == "hello"));
    }

    #[tokio::test]
    async fn oversize_line_is_rejected() {
        let mut data = vec![b'a'; MAX_LINE_BYTES + 10];
        data.push(b'\n');
        let mut cursor = Cursor::new(data);
        let mut pending = Vec::new();
        let outcome = read_line(&mut cursor, &mut pending).await.unwrap();
        assert!(matches!(outcome, LineOutcome::TooLong));
    }

    #[tokio::test]
    async fn trailing_fragment_on_disconnect_is_discarded() {
        let mut cursor = Cursor::new(b"no newline here".to_vec());
        let mut pending = Vec::new();
        let outcome = read_line(&mut cursor, &mut pending).await.unwrap();
        assert!(matches!(outcome, LineOutcome::Eof));
        assert!(pending.is_empty());
    }
}
