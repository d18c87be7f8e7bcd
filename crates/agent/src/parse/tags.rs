use super::{held_back_len, Segment, SegmentKind};

const SECTIONS: [(SegmentKind, &str, &str); 3] = [
    (SegmentKind::Plan, "<plan>", "</plan>"),
    (SegmentKind::Status, "<status>", "</status>"),
    (SegmentKind::Final, "<final>", "</final>"),
];

const OPENERS: [&str; 3] = ["<plan>", "<status>", "<final>"];

fn closer(kind: SegmentKind) -> &'static str {
    SECTIONS
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, _, close)| *close)
        .unwrap_or("")
}

/// Extracts `<plan>`, `<status>` and `<final>` sections from content.
///
/// Only `Content` segments are scanned; anything else passes through
/// untouched. Text that might be the start of a marker is held back until
/// the next push (or `finish`) decides it.
#[derive(Debug)]
pub struct TagExtractor {
    mode: SegmentKind,
    buffer: String,
}

impl Default for TagExtractor {
    fn default() -> Self {
        Self {
            mode: SegmentKind::Content,
            buffer: String::new(),
        }
    }
}

impl TagExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, segment: Segment) -> Vec<Segment> {
        if segment.kind != SegmentKind::Content {
            return vec![segment];
        }

        let mut out = Vec::new();
        self.buffer.push_str(&segment.text);

        while !self.buffer.is_empty() {
            if self.mode == SegmentKind::Content {
                let next = SECTIONS
                    .iter()
                    .filter_map(|(kind, open, _)| self.buffer.find(*open).map(|i| (i, *kind, open.len())))
                    .min_by_key(|(i, _, _)| *i);

                let Some((index, kind, open_len)) = next else {
                    self.emit_safe(&mut out, &OPENERS);
                    break;
                };

                emit(&mut out, SegmentKind::Content, &self.buffer[..index]);
                self.buffer.drain(..index + open_len);
                self.mode = kind;
                continue;
            }

            let close = closer(self.mode);
            let Some(index) = self.buffer.find(close) else {
                self.emit_safe(&mut out, &[close]);
                break;
            };

            emit(&mut out, self.mode, &self.buffer[..index]);
            self.buffer.drain(..index + close.len());
            self.mode = SegmentKind::Content;
        }
        out
    }

    /// Flush whatever is buffered under the current mode.
    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        emit(&mut out, self.mode, &self.buffer);
        self.buffer.clear();
        out
    }

    /// Emit everything except a trailing possible marker prefix.
    fn emit_safe(&mut self, out: &mut Vec<Segment>, markers: &[&str]) {
        let keep = held_back_len(&self.buffer, markers);
        let cut = self.buffer.len() - keep;
        emit(out, self.mode, &self.buffer[..cut]);
        self.buffer.drain(..cut);
    }
}

fn emit(out: &mut Vec<Segment>, kind: SegmentKind, text: &str) {
    if !text.is_empty() {
        out.push(Segment::new(kind, text));
    }
}
