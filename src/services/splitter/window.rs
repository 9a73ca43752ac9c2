//! Sliding-window packing of contiguous text spans into bounded chunks.
//!
//! Every span handed to the window is a byte range of the document. Ranges are
//! contiguous and separators stay attached to the span they terminate, so the
//! chunks produced here always tile the document exactly once the overlap
//! prefix of each chunk is dropped.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::{ChunkingConfig, Granularity};

static RE_PARAGRAPH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n[ \t]*\n\s*").unwrap());
static RE_SENTENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[.!?]+["')\]]*\s+|\n\s*"#).unwrap());
static RE_WORD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// Structural level of a span, coarsest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    /// A page or heading section.
    Section,
    Paragraph,
    Sentence,
    Word,
}

impl Level {
    fn finer(self) -> Option<Level> {
        match self {
            Level::Section => Some(Level::Paragraph),
            Level::Paragraph => Some(Level::Sentence),
            Level::Sentence => Some(Level::Word),
            Level::Word => None,
        }
    }

    fn separator(self) -> Option<&'static Regex> {
        match self {
            Level::Section => None,
            Level::Paragraph => Some(&RE_PARAGRAPH),
            Level::Sentence => Some(&RE_SENTENCE),
            Level::Word => Some(&RE_WORD),
        }
    }
}

impl From<Granularity> for Level {
    fn from(granularity: Granularity) -> Self {
        match granularity {
            Granularity::Paragraph => Level::Paragraph,
            Granularity::Sentence => Level::Sentence,
            Granularity::Word => Level::Word,
        }
    }
}

/// One chunk boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub range: Range<usize>,
    /// Leading bytes repeated from the previous span.
    pub overlap: usize,
    /// A single atomic unit longer than the chunk size.
    pub oversized: bool,
}

#[derive(Debug, Clone)]
struct Unit {
    range: Range<usize>,
    chars: usize,
    oversized: bool,
}

pub struct Window<'a> {
    text: &'a str,
    max_chars: usize,
    overlap_chars: usize,
    min_level: Level,
}

impl<'a> Window<'a> {
    pub fn new(text: &'a str, config: &ChunkingConfig) -> Self {
        Self {
            text,
            max_chars: config.chunk_size.max(1),
            overlap_chars: config.chunk_overlap.min(config.chunk_size.saturating_sub(1)),
            min_level: config.min_granularity.into(),
        }
    }

    /// Pack the natural `units` of one segment, all at `level`, into spans.
    /// Spans never cross the segment and overlap never reaches back into a
    /// previous segment.
    pub fn split(&self, units: &[Range<usize>], level: Level) -> Vec<Span> {
        let mut refined = Vec::new();
        for range in merge_blank(self.text, units.to_vec()) {
            self.refine(range, level, &mut refined);
        }
        self.pack(refined)
    }

    fn refine(&self, range: Range<usize>, level: Level, out: &mut Vec<Unit>) {
        let chars = self.text[range.clone()].chars().count();
        if chars <= self.max_chars {
            out.push(Unit {
                range,
                chars,
                oversized: false,
            });
            return;
        }

        let mut level = level;
        loop {
            let finer = match level.finer() {
                Some(finer) if level < self.min_level => finer,
                _ => {
                    out.push(Unit {
                        range,
                        chars,
                        oversized: true,
                    });
                    return;
                }
            };

            let parts = match finer.separator() {
                Some(re) => merge_blank(self.text, split_after(self.text, range.clone(), re)),
                None => vec![range.clone()],
            };

            if parts.len() > 1 {
                for part in parts {
                    self.refine(part, finer, out);
                }
                return;
            }
            level = finer;
        }
    }

    fn pack(&self, units: Vec<Unit>) -> Vec<Span> {
        let mut spans = Vec::new();
        // (range, chars, overlap bytes)
        let mut current: Option<(Range<usize>, usize, usize)> = None;
        let mut previous: Option<Range<usize>> = None;

        for unit in units {
            if unit.oversized {
                if let Some((range, _, overlap)) = current.take() {
                    spans.push(Span {
                        range,
                        overlap,
                        oversized: false,
                    });
                }
                spans.push(Span {
                    range: unit.range,
                    overlap: 0,
                    oversized: true,
                });
                previous = None;
                continue;
            }

            let fits = current
                .as_ref()
                .is_some_and(|(_, chars, _)| chars + unit.chars <= self.max_chars);

            if fits {
                if let Some((range, chars, _)) = current.as_mut() {
                    range.end = unit.range.end;
                    *chars += unit.chars;
                }
                continue;
            }

            if let Some((range, _, overlap)) = current.take() {
                spans.push(Span {
                    range: range.clone(),
                    overlap,
                    oversized: false,
                });
                previous = Some(range);
            }

            let (start, carried) = previous
                .as_ref()
                .and_then(|prev| self.overlap_start(prev, unit.chars))
                .unwrap_or((unit.range.start, 0));

            current = Some((
                start..unit.range.end,
                carried + unit.chars,
                unit.range.start - start,
            ));
        }

        if let Some((range, _, overlap)) = current {
            spans.push(Span {
                range,
                overlap,
                oversized: false,
            });
        }
        spans
    }

    /// Earliest boundary inside `prev` whose suffix fits both the overlap and
    /// what is left of the chunk after `next_chars`. Returns the byte offset
    /// and the suffix length in characters.
    fn overlap_start(&self, prev: &Range<usize>, next_chars: usize) -> Option<(usize, usize)> {
        let budget = self
            .overlap_chars
            .min(self.max_chars.saturating_sub(next_chars));
        if budget == 0 {
            return None;
        }
        let re = self.min_level.separator()?;

        let mut best = None;
        let mut chars = 0;
        for part in split_after(self.text, prev.clone(), re).iter().skip(1).rev() {
            chars += self.text[part.clone()].chars().count();
            if chars > budget {
                break;
            }
            best = Some((part.start, chars));
        }
        best
    }
}

/// Split `range` after every separator match, keeping separators attached to
/// the preceding part.
pub fn split_after(text: &str, range: Range<usize>, re: &Regex) -> Vec<Range<usize>> {
    let mut parts = Vec::new();
    let mut start = range.start;

    for m in re.find_iter(&text[range.clone()]) {
        let end = range.start + m.end();
        if end > start && end < range.end {
            parts.push(start..end);
            start = end;
        }
    }
    if start < range.end {
        parts.push(start..range.end);
    }
    parts
}

/// Paragraph ranges covering `range`.
pub fn paragraphs(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    split_after(text, range, &RE_PARAGRAPH)
}

/// Fold whitespace-only ranges into a neighbour. Leading blanks join the
/// first non-blank range, all others join the range before them. Returns an
/// empty list when every range is blank.
pub fn merge_blank(text: &str, ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    let mut pending: Option<usize> = None;

    for range in ranges {
        if range.is_empty() {
            continue;
        }
        if text[range.clone()].trim().is_empty() {
            match merged.last_mut() {
                Some(last) => last.end = range.end,
                None => {
                    pending.get_or_insert(range.start);
                }
            }
        } else {
            let start = pending.take().unwrap_or(range.start);
            merged.push(start..range.end);
        }
    }
    merged
}
