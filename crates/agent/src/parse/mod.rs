//! Incremental parsing of raw model output.
//!
//! Two transducers run in sequence over streamed text: [`ThinkingExtractor`]
//! splits off a leading `<think>` section, then [`TagExtractor`] pulls
//! `<plan>`, `<status>` and `<final>` sections out of the remaining content.
//! Both are plain `push`/`finish` state machines with no I/O, so markers split
//! across arbitrary chunk boundaries are handled the same as whole markers.

mod tags;
mod thinking;

pub use tags::TagExtractor;
pub use thinking::ThinkingExtractor;

/// What a piece of parsed output is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentKind {
    Thinking,
    Content,
    Plan,
    Status,
    Final,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub text: String,
}

impl Segment {
    pub fn new(kind: SegmentKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

/// Length of the longest suffix of `buffer` that is a strict prefix of any
/// of `markers`. Those bytes must be held back until more input arrives.
pub(crate) fn held_back_len(buffer: &str, markers: &[&str]) -> usize {
    markers
        .iter()
        .map(|marker| {
            (1..marker.len())
                .rev()
                .find(|&len| buffer.ends_with(&marker[..len]))
                .unwrap_or(0)
        })
        .max()
        .unwrap_or(0)
}

/// The thinking and tag extractors chained together.
#[derive(Debug, Default)]
pub struct TagStreamParser {
    thinking: ThinkingExtractor,
    tags: TagExtractor,
}

impl TagStreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &str) -> Vec<Segment> {
        let mut out = Vec::new();
        for segment in self.thinking.push(chunk) {
            out.extend(self.tags.push(segment));
        }
        out
    }

    pub fn finish(&mut self) -> Vec<Segment> {
        let mut out = Vec::new();
        for segment in self.thinking.finish() {
            out.extend(self.tags.push(segment));
        }
        out.extend(self.tags.finish());
        out
    }

    /// Parse a complete reply in one go.
    pub fn parse_all(text: &str) -> Vec<Segment> {
        let mut parser = Self::new();
        let mut out = parser.push(text);
        out.extend(parser.finish());
        out
    }
}

/// Collapse adjacent segments of the same kind.
pub fn coalesce(segments: Vec<Segment>) -> Vec<Segment> {
    let mut out: Vec<Segment> = Vec::with_capacity(segments.len());
    for segment in segments {
        match out.last_mut() {
            Some(last) if last.kind == segment.kind => last.text.push_str(&segment.text),
            _ => out.push(segment),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(chunks: &[&str]) -> Vec<Segment> {
        let mut parser = TagStreamParser::new();
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(parser.push(chunk));
        }
        out.extend(parser.finish());
        coalesce(out)
    }

    #[test]
    fn held_back_len_finds_longest_marker_prefix() {
        assert_eq!(held_back_len("abc<pl", &["<plan>", "<status>"]), 3);
        assert_eq!(held_back_len("abc<", &["<plan>", "<status>"]), 1);
        assert_eq!(held_back_len("abc", &["<plan>"]), 0);
        // a whole marker is not a strict prefix
        assert_eq!(held_back_len("<plan>", &["<plan>"]), 0);
    }

    #[test]
    fn full_pipeline() {
        let out = feed(&["<think>hmm</think>\n<status>done</status><final>4</final>"]);
        assert_eq!(
            out,
            vec![
                Segment::new(SegmentKind::Thinking, "hmm"),
                Segment::new(SegmentKind::Content, "\n"),
                Segment::new(SegmentKind::Status, "done"),
                Segment::new(SegmentKind::Final, "4"),
            ]
        );
    }

    #[test]
    fn pipeline_is_split_invariant() {
        let input = "  <think>plan it <plan> carefully</think>ok <plan>{\"tasks\":[]}</plan> bye";
        let whole = feed(&[input]);
        for a in 1..input.len() {
            for b in a..input.len() {
                let out = feed(&[&input[..a], &input[a..b], &input[b..]]);
                assert_eq!(out, whole, "split at {a}/{b}");
            }
        }
    }

    #[test]
    fn marker_boundary_safety() {
        assert_eq!(feed(&["<pl", "an>x</plan>"]), feed(&["<plan>x</plan>"]));
    }

    #[test]
    fn tags_inside_thinking_are_not_structured() {
        let out = feed(&["<think><plan>no</plan></think><plan>yes</plan>"]);
        assert_eq!(out[0], Segment::new(SegmentKind::Thinking, "<plan>no</plan>"));
        assert_eq!(out[1], Segment::new(SegmentKind::Plan, "yes"));
    }

    #[test]
    fn parse_all_matches_streaming() {
        let text = "<status>changed</status><plan>{}</plan>";
        assert_eq!(coalesce(TagStreamParser::parse_all(text)), feed(&["<sta", "tus>changed</status><plan>{}</pl", "an>"]));
    }

    #[test]
    fn coalesce_merges_neighbours_only() {
        let merged = coalesce(vec![
            Segment::new(SegmentKind::Content, "a"),
            Segment::new(SegmentKind::Content, "b"),
            Segment::new(SegmentKind::Plan, "c"),
            Segment::new(SegmentKind::Content, "d"),
        ]);
        assert_eq!(merged.len(), 3);
        assert_eq!(merged[0].text, "ab");
    }
}
