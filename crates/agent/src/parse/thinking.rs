use super::{held_back_len, Segment, SegmentKind};

const OPEN: &str = "<think>";
const CLOSE: &str = "</think>";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Mode {
    /// Nothing but whitespace seen so far.
    #[default]
    Init,
    Thinking,
    Content,
}

/// Splits a leading `<think>...</think>` section off a text stream.
///
/// Thinking is only recognised at the very start of the output (after
/// whitespace) and at most once. Whitespace in front of the opening marker is
/// dropped together with it; otherwise every byte comes back out, either as
/// `Thinking` or `Content`.
#[derive(Debug, Default)]
pub struct ThinkingExtractor {
    mode: Mode,
    buffer: String,
}

impl ThinkingExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        self.buffer.push_str(chunk);

        loop {
            match self.mode {
                Mode::Init => {
                    let trimmed = self.buffer.trim_start();
                    if trimmed.is_empty() {
                        break;
                    }
                    if let Some(rest) = trimmed.strip_prefix(OPEN) {
                        self.buffer = rest.to_string();
                        self.mode = Mode::Thinking;
                        continue;
                    }
                    if OPEN.starts_with(trimmed) {
                        // could still become the opening marker
                        break;
                    }
                    self.mode = Mode::Content;
                }
                Mode::Thinking => {
                    if let Some(end) = self.buffer.find(CLOSE) {
                        emit(&mut out, SegmentKind::Thinking, &self.buffer[..end]);
                        self.buffer.drain(..end + CLOSE.len());
                        self.mode = Mode::Content;
                        continue;
                    }
                    let keep = held_back_len(&self.buffer, &[CLOSE]);
                    let cut = self.buffer.len() - keep;
                    emit(&mut out, SegmentKind::Thinking, &self.buffer[..cut]);
                    self.buffer.drain(..cut);
                    break;
                }
                Mode::Content => {
                    emit(&mut out, SegmentKind::Content, &self.buffer);
                    self.buffer.clear();
                    break;
                }
            }
        }
        out
    }

    /// Flush whatever is buffered at end of stream.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        let kind = match self.mode {
            Mode::Thinking => SegmentKind::Thinking,
            Mode::Init | Mode::Content => SegmentKind::Content,
        };
        emit(&mut out, kind, &self.buffer);
        self.buffer.clear();
        out
    }
}

fn emit(out: &mut Vec<Segment>, kind: SegmentKind, text: &str) {
    if !text.is_empty() {
        out.push(Segment::new(kind, text));
    }
}
