//! Agent output decoding and iteration detection

/// True for lines that mark agent progress: a code fence or a level-2
/// markdown heading
pub fn is_iteration_marker(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with("```") || trimmed.starts_with("## ")
}

/// Decodes raw byte chunks as UTF-8, holding back a trailing partial
/// character until the next chunk completes it
///
/// Invalid sequences become U+FFFD.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut out = String::with_capacity(self.pending.len());
        let mut start = 0;

        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_end = start + e.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        out
    }

    /// Flush whatever is held back at end of stream
    pub fn finish(&mut self) -> String {
        let rest = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        rest
    }
}

/// Splits decoded text into lines, carrying a partial last line over to the
/// next push
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: String,
}

impl LineSplitter {
    /// Return every line completed by `text`, without line terminators
    pub fn push(&mut self, text: &str) -> Vec<String> {
        self.partial.push_str(text);
        let Some(last_newline) = self.partial.rfind('\n') else {
            return Vec::new();
        };

        let rest = self.partial.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.partial, rest);
        complete
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Return the unterminated final line, if any
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iteration_markers() {
        assert!(is_iteration_marker("```rust"));
        assert!(is_iteration_marker("   ```"));
        assert!(is_iteration_marker("## Step: wrote tests"));
        assert!(is_iteration_marker("\t## Heading  "));

        assert!(!is_iteration_marker("# Title"));
        assert!(!is_iteration_marker("### Deeper"));
        assert!(!is_iteration_marker("##NoSpace"));
        assert!(!is_iteration_marker("text with ``` inside"));
        assert!(!is_iteration_marker(""));
    }

    #[test]
    fn test_decoder_passes_ascii() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(b"hello"), "hello");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_decoder_joins_split_character() {
        let smile = "😀".as_bytes();
        let mut decoder = ChunkDecoder::default();

        assert_eq!(decoder.decode(&[b'a', smile[0], smile[1]]), "a");
        assert_eq!(decoder.decode(&[smile[2], smile[3], b'b']), "😀b");
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(&[b'a', 0xff, b'b']), "a\u{fffd}b");
    }

    #[test]
    fn test_decoder_flushes_truncated_tail() {
        let mut decoder = ChunkDecoder::default();
        assert_eq!(decoder.decode(&"é".as_bytes()[..1]), "");
        assert_eq!(decoder.finish(), "\u{fffd}");
    }

    #[test]
    fn test_splitter_complete_lines() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.push("```\n## Step\n"), vec!["```", "## Step"]);
        assert_eq!(splitter.finish(), None);
    }

    #[test]
    fn test_splitter_carries_partial_line() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.push("## St"), Vec::<String>::new());
        assert_eq!(splitter.push("ep\nnext"), vec!["## Step"]);
        assert_eq!(splitter.finish(), Some("next".to_string()));
    }

    #[test]
    fn test_splitter_handles_crlf_and_blank_lines() {
        let mut splitter = LineSplitter::default();
        assert_eq!(splitter.push("a\r\n\r\nb\n"), vec!["a", "", "b"]);
    }
}
