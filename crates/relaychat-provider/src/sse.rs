/// Reassembles newline-terminated lines from arbitrarily split byte chunks.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte character split
/// across two chunks is decoded whole. A trailing `\r` is stripped.
#[derive(Debug, Default)]
pub struct LineSplitter {
    buffer: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(newline_idx) = self.buffer.iter().position(|b| *b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=newline_idx).collect();
            line.pop();
            lines.push(decode_line(line));
        }
        lines
    }

    /// Flushes a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        Some(decode_line(std::mem::take(&mut self.buffer)))
    }
}

fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    match String::from_utf8(line) {
        Ok(text) => text,
        Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_line_waits_for_newline() {
        let mut splitter = LineSplitter::new();
        assert!(splitter
            .push(b"data: {\"choices\":[{\"delta\":{\"content\":\"hel")
            .is_empty());

        let lines = splitter.push(b"lo\"}}]}\r\ndata: [DONE]\n");
        assert_eq!(
            lines,
            vec![
                "data: {\"choices\":[{\"delta\":{\"content\":\"hello\"}}]}".to_string(),
                "data: [DONE]".to_string(),
            ]
        );
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let text = "data: héllo\n".as_bytes();
        let split_at = text.iter().position(|b| *b == 0xC3).unwrap() + 1;

        let mut splitter = LineSplitter::new();
        assert!(splitter.push(&text[..split_at]).is_empty());
        assert_eq!(splitter.push(&text[split_at..]), vec!["data: héllo".to_string()]);
    }

    #[test]
    fn finish_flushes_unterminated_tail() {
        let mut splitter = LineSplitter::new();
        assert_eq!(splitter.push(b"first\nsecond\r"), vec!["first".to_string()]);
        assert_eq!(splitter.finish().as_deref(), Some("second"));
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn blank_lines_are_kept() {
        let mut splitter = LineSplitter::new();
        assert_eq!(
            splitter.push(b"a\n\nb\n"),
            vec!["a".to_string(), String::new(), "b".to_string()]
        );
    }
}
