//! Per-session output window and repaint detection.
//!
//! Raw PTY bytes are decoded, stripped of escape sequences and appended to a
//! capped buffer that trigger patterns run against. When a chunk moves the
//! cursor up, jumps to an absolute position or erases the display, it is an
//! interactive program repainting text that is already on screen; the buffer
//! is then *replaced* by the chunk so the repainted text cannot match twice.

use std::sync::LazyLock;

use regex::Regex;

/// Cursor-up (`CSI n A`), cursor position (`CSI r;c H` / `CSI r;c f`) and
/// erase-display (`CSI n J`).
static REDRAW_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9]*A|\x1b\[[0-9]*(?:;[0-9]*)?[Hf]|\x1b\[[0-9]*J")
        .expect("redraw detection regex is a compile-time constant and must be valid")
});

/// True when a decoded, unstripped chunk looks like a screen repaint.
pub fn is_redraw(raw: &str) -> bool {
    REDRAW_PATTERN.is_match(raw)
}

/// Strip ANSI escape sequences and control characters from decoded PTY output.
///
/// Handles CSI sequences (`ESC [`), string sequences (`ESC ]`, `ESC P`,
/// `ESC _`, `ESC ^`) terminated by BEL or ST, charset designation and other
/// two-character escapes. `\r\n` becomes `\n`; every other C0 control except
/// `\n` and `\t` is dropped.
pub fn strip_control_sequences(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\x1b' => {
                let Some(&next) = chars.peek() else {
                    continue;
                };
                match next {
                    '[' => {
                        // CSI - parameters and intermediates, then one final byte
                        chars.next();
                        while let Some(c) = chars.next() {
                            if ('\x40'..='\x7e').contains(&c) {
                                break;
                            }
                        }
                    }
                    ']' | 'P' | '_' | '^' => {
                        // String sequence - skip until BEL or ST
                        chars.next();
                        while let Some(c) = chars.next() {
                            if c == '\x07' {
                                break;
                            }
                            if c == '\x1b' && chars.next_if_eq(&'\\').is_some() {
                                break;
                            }
                        }
                    }
                    '(' | ')' | '*' | '+' => {
                        // Character set designation - skip one more char
                        chars.next();
                        chars.next();
                    }
                    _ => {
                        chars.next();
                    }
                }
            }
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    continue;
                }
            }
            '\n' | '\t' => result.push(c),
            c if c.is_control() => {}
            c => result.push(c),
        }
    }

    result
}

/// Incremental UTF-8 decoder that carries a split multi-byte character over
/// to the next chunk instead of turning it into replacement characters.
#[derive(Debug, Default)]
pub struct Utf8StreamDecoder {
    pending: Vec<u8>,
}

impl Utf8StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, holding back an incomplete trailing sequence.
    /// Invalid bytes become U+FFFD.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);
        let cut = incomplete_tail_start(&data);
        self.pending = data.split_off(cut);
        String::from_utf8_lossy(&data).into_owned()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Start of a trailing multi-byte sequence that is still missing bytes, or
/// `data.len()` when the data ends on a character boundary.
fn incomplete_tail_start(data: &[u8]) -> usize {
    let len = data.len();
    for back in 1..=len.min(3) {
        let b = data[len - back];
        if b & 0b1100_0000 == 0b1000_0000 {
            continue;
        }
        let needed = match b {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if needed > back { len - back } else { len };
    }
    len
}

/// Longest unterminated escape sequence held back for the next chunk. A
/// longer one is released and stripped as it stands.
const MAX_PENDING_ESCAPE: usize = 4096;

/// Byte offset of a trailing escape sequence that has not been terminated
/// yet, following the same grammar as [`strip_control_sequences`].
fn incomplete_escape_start(text: &str) -> Option<usize> {
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        if c != '\x1b' {
            continue;
        }
        let Some((_, next)) = chars.next() else {
            return Some(start);
        };
        let complete = match next {
            '[' => chars.any(|(_, c)| ('\x40'..='\x7e').contains(&c)),
            ']' | 'P' | '_' | '^' => loop {
                match chars.next() {
                    None => break false,
                    Some((_, '\x07')) => break true,
                    Some((_, '\x1b')) => match chars.peek() {
                        None => break false,
                        Some(&(_, '\\')) => {
                            chars.next();
                            break true;
                        }
                        Some(_) => {}
                    },
                    Some(_) => {}
                }
            },
            '(' | ')' | '*' | '+' => chars.next().is_some(),
            _ => true,
        };
        if !complete {
            return Some(start);
        }
    }

    None
}

/// Sliding window of one session's recent, stripped output.
#[derive(Debug)]
pub struct SessionBuffer {
    text: String,
    capacity: usize,
    decoder: Utf8StreamDecoder,
    /// Escape sequence split by the last read, prepended to the next one.
    pending_escape: String,
}

impl SessionBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            capacity,
            decoder: Utf8StreamDecoder::new(),
            pending_escape: String::new(),
        }
    }

    /// Feed a raw chunk. Returns `true` when the chunk was treated as a
    /// repaint and replaced the window.
    pub fn ingest(&mut self, raw: &[u8]) -> bool {
        let mut decoded = std::mem::take(&mut self.pending_escape);
        decoded.push_str(&self.decoder.decode(raw));
        if let Some(start) = incomplete_escape_start(&decoded)
            && decoded.len() - start <= MAX_PENDING_ESCAPE
        {
            self.pending_escape = decoded.split_off(start);
        }

        let redraw = is_redraw(&decoded);
        let stripped = strip_control_sequences(&decoded);

        if redraw {
            self.text = stripped;
        } else {
            self.text.push_str(&stripped);
        }
        self.truncate_front();
        redraw
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Drop everything up to byte offset `end` (the end of a match).
    pub fn consume_through(&mut self, end: usize) {
        let end = end.min(self.text.len());
        self.text.drain(..end);
    }

    fn truncate_front(&mut self) {
        if self.text.len() <= self.capacity {
            return;
        }
        let mut start = self.text.len() - self.capacity;
        while !self.text.is_char_boundary(start) {
            start += 1;
        }
        self.text.drain(..start);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_removes_sgr_and_osc() {
        let raw = "\x1b[1;31mred\x1b[0m \x1b]0;title\x07plain \x1b]2;t\x1b\\done";
        assert_eq!(strip_control_sequences(raw), "red plain done");
    }

    #[test]
    fn test_strip_normalizes_line_endings_and_controls() {
        assert_eq!(strip_control_sequences("a\r\nb\rc\x07\x08\td"), "a\nbc\td");
    }

    #[test]
    fn test_strip_charset_designation() {
        assert_eq!(strip_control_sequences("\x1b(Bok"), "ok");
    }

    #[test]
    fn test_strip_private_mode_sequences() {
        assert_eq!(strip_control_sequences("\x1b[?1049hfull\x1b[?25l"), "full");
    }

    #[test]
    fn test_redraw_detection() {
        assert!(is_redraw("\x1b[2Aagain"));
        assert!(is_redraw("\x1b[A"));
        assert!(is_redraw("\x1b[10;1Hrow"));
        assert!(is_redraw("\x1b[Hhome"));
        assert!(is_redraw("\x1b[3;4f"));
        assert!(is_redraw("\x1b[2J"));
        assert!(is_redraw("\x1b[J"));
        assert!(!is_redraw("\x1b[31mcolored\x1b[0m\n"));
        assert!(!is_redraw("\x1b[2Kline"));
        assert!(!is_redraw("plain output"));
    }

    #[test]
    fn test_decoder_carries_split_character() {
        let mut decoder = Utf8StreamDecoder::new();
        let bytes = "héllo ✓".as_bytes();
        let split = bytes.len() - 1;
        let first = decoder.decode(&bytes[..split]);
        assert!(decoder.has_pending());
        let second = decoder.decode(&bytes[split..]);
        assert_eq!(format!("{first}{second}"), "héllo ✓");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decoder_replaces_invalid_bytes() {
        let mut decoder = Utf8StreamDecoder::new();
        assert_eq!(decoder.decode(b"a\xffb"), "a\u{fffd}b");
    }

    #[test]
    fn test_buffer_appends_normal_output() {
        let mut buffer = SessionBuffer::new(4096);
        assert!(!buffer.ingest(b"one "));
        assert!(!buffer.ingest(b"\x1b[32mtwo\x1b[0m"));
        assert_eq!(buffer.text(), "one two");
    }

    #[test]
    fn test_buffer_replaced_on_redraw() {
        let mut buffer = SessionBuffer::new(4096);
        buffer.ingest(b"Continue? (y/n)\n");
        assert!(buffer.ingest(b"\x1b[1A\x1b[2KContinue? (y/n)"));
        assert_eq!(buffer.text(), "Continue? (y/n)");
    }

    #[test]
    fn test_buffer_never_exceeds_capacity() {
        let mut buffer = SessionBuffer::new(16);
        for i in 0..50 {
            buffer.ingest(format!("line {i} ✓✓\n").as_bytes());
            assert!(buffer.len() <= 16);
        }
        assert!(buffer.text().ends_with("line 49 ✓✓\n"));
    }

    #[test]
    fn test_buffer_capacity_applies_to_redraw_chunks() {
        let mut buffer = SessionBuffer::new(8);
        buffer.ingest(b"\x1b[2J0123456789abcdef");
        assert_eq!(buffer.text(), "89abcdef");
    }

    #[test]
    fn test_incomplete_escape_detection() {
        assert_eq!(incomplete_escape_start("plain"), None);
        assert_eq!(incomplete_escape_start("ab\x1b"), Some(2));
        assert_eq!(incomplete_escape_start("ab\x1b[3"), Some(2));
        assert_eq!(incomplete_escape_start("\x1b[31mok\x1b[0"), Some(7));
        assert_eq!(incomplete_escape_start("x\x1b]0;title"), Some(1));
        assert_eq!(incomplete_escape_start("x\x1b]0;title\x1b"), Some(1));
        assert_eq!(incomplete_escape_start("x\x1b]0;t\x1b\\y"), None);
        assert_eq!(incomplete_escape_start("\x1b("), Some(0));
        assert_eq!(incomplete_escape_start("\x1b[2J\x1b(B"), None);
    }

    #[test]
    fn test_buffer_joins_split_sgr() {
        let mut buffer = SessionBuffer::new(4096);
        buffer.ingest(b"prompt$ \x1b[3");
        assert_eq!(buffer.text(), "prompt$ ");
        buffer.ingest(b"1mred\x1b[0m");
        assert_eq!(buffer.text(), "prompt$ red");
    }

    #[test]
    fn test_buffer_detects_split_erase_display() {
        let mut buffer = SessionBuffer::new(4096);
        assert!(!buffer.ingest(b"old stuff\n\x1b"));
        assert!(buffer.ingest(b"[2Jfresh"));
        assert_eq!(buffer.text(), "fresh");
    }

    #[test]
    fn test_buffer_joins_split_osc_terminator() {
        let mut buffer = SessionBuffer::new(4096);
        buffer.ingest(b"a\x1b]0;window title\x1b");
        buffer.ingest(b"\\b");
        assert_eq!(buffer.text(), "ab");
    }

    #[test]
    fn test_buffer_releases_oversized_unterminated_escape() {
        let mut buffer = SessionBuffer::new(64);
        let mut chunk = b"ok\x1b]".to_vec();
        chunk.extend(std::iter::repeat_n(b'x', MAX_PENDING_ESCAPE + 1));
        buffer.ingest(&chunk);
        assert_eq!(buffer.text(), "ok");
        buffer.ingest(b"next");
        assert_eq!(buffer.text(), "oknext");
    }

    #[test]
    fn test_consume_through_drops_prefix() {
        let mut buffer = SessionBuffer::new(64);
        buffer.ingest(b"build failed; retrying");
        buffer.consume_through(12);
        assert_eq!(buffer.text(), "; retrying");
        buffer.consume_through(1000);
        assert!(buffer.is_empty());
    }
}
