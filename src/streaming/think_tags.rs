//! Inline `<think>` tag scanning
//!
//! Some models put their reasoning into ordinary content between `<think>` and
//! `</think>`. Markers may be split across chunks, so a possible partial marker
//! at the end of a chunk is held back until the next one arrives.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Routed piece of content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TagSegment {
    Text(String),
    Thinking(String),
    /// A closing marker was seen.
    ThinkEnd,
}

#[derive(Debug, Default)]
pub struct ThinkTagScanner {
    inside: bool,
    carry: String,
}

impl ThinkTagScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently between an opening and a closing marker.
    pub fn is_inside(&self) -> bool {
        self.inside
    }

    pub fn feed(&mut self, chunk: &str) -> Vec<TagSegment> {
        let mut input = std::mem::take(&mut self.carry);
        input.push_str(chunk);

        let mut segments = Vec::new();
        let mut rest = input.as_str();
        loop {
            let marker = if self.inside { THINK_CLOSE } else { THINK_OPEN };
            if let Some(pos) = rest.find(marker) {
                self.push_segment(&rest[..pos], &mut segments);
                if self.inside {
                    segments.push(TagSegment::ThinkEnd);
                }
                self.inside = !self.inside;
                rest = &rest[pos + marker.len()..];
                continue;
            }

            let held = partial_marker_len(rest, marker);
            let (emit, carry) = rest.split_at(rest.len() - held);
            self.push_segment(emit, &mut segments);
            self.carry = carry.to_string();
            break;
        }
        segments
    }

    /// Release a held-back partial marker once no more content will arrive.
    pub fn finish(&mut self) -> Vec<TagSegment> {
        let carry = std::mem::take(&mut self.carry);
        let mut segments = Vec::new();
        self.push_segment(&carry, &mut segments);
        segments
    }

    fn push_segment(&self, text: &str, segments: &mut Vec<TagSegment>) {
        if text.is_empty() {
            return;
        }
        segments.push(if self.inside {
            TagSegment::Thinking(text.to_string())
        } else {
            TagSegment::Text(text.to_string())
        });
    }
}

/// Length of the longest suffix of `text` that is a proper prefix of `marker`.
fn partial_marker_len(text: &str, marker: &str) -> usize {
    (1..marker.len())
        .rev()
        .find(|&len| {
            len <= text.len()
                && text.is_char_boundary(text.len() - len)
                && marker.starts_with(&text[text.len() - len..])
        })
        .unwrap_or(0)
}
