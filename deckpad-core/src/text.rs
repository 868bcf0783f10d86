//! Run-preserving text edits.
//!
//! A paragraph's text is the concatenation of its runs. Edits address that
//! concatenation by character index and are applied by splitting and splicing
//! runs, so text outside the edited range keeps the run (and therefore the
//! formatting) it started in.

use std::ops::Range;

use crate::model::{Paragraph, TextBody, TextRun};

fn chars_match(a: char, b: char, match_case: bool) -> bool {
    if match_case || a == b {
        return a == b;
    }
    a.to_lowercase().eq(b.to_lowercase())
}

/// Non-overlapping matches of `needle` in `haystack`, scanned left to right.
pub fn find_matches(haystack: &[char], needle: &[char], match_case: bool) -> Vec<Range<usize>> {
    let mut matches = Vec::new();
    if needle.is_empty() || needle.len() > haystack.len() {
        return matches;
    }
    let mut start = 0;
    while start + needle.len() <= haystack.len() {
        let hit = haystack[start..start + needle.len()]
            .iter()
            .zip(needle)
            .all(|(&a, &b)| chars_match(a, b, match_case));
        if hit {
            matches.push(start..start + needle.len());
            start += needle.len();
        } else {
            start += 1;
        }
    }
    matches
}

impl Paragraph {
    fn char_len(&self) -> usize {
        self.runs.iter().map(|run| run.text.chars().count()).sum()
    }

    /// Run that receives the replacement text of an edit starting at `start`.
    ///
    /// For a non-empty range this is the run holding the first removed
    /// character. Pure insertions extend the run that ends at the insertion
    /// point, or the first run when inserting at the very beginning.
    fn anchor_run(&self, start: usize, insertion: bool) -> Option<usize> {
        let mut offset = 0;
        let mut last_non_empty = None;
        for (idx, run) in self.runs.iter().enumerate() {
            let len = run.text.chars().count();
            if len == 0 {
                continue;
            }
            let end = offset + len;
            let hit = if insertion {
                (start == 0 && offset == 0) || (offset < start && start <= end)
            } else {
                offset <= start && start < end
            };
            if hit {
                return Some(idx);
            }
            last_non_empty = Some(idx);
            offset = end;
        }
        last_non_empty.or(if self.runs.is_empty() { None } else { Some(0) })
    }

    /// Replaces the characters in `range` with `replacement`.
    ///
    /// Runs entirely outside the range are untouched. A run straddling a range
    /// boundary keeps its outside portion with its own format. Runs emptied by
    /// the edit are dropped, and the replacement joins the first run the range
    /// touches so it inherits that run's format.
    pub fn splice(&mut self, range: Range<usize>, replacement: &str) {
        let total = self.char_len();
        let start = range.start.min(total);
        let end = range.end.clamp(start, total);

        let Some(anchor) = self.anchor_run(start, start == end) else {
            if !replacement.is_empty() {
                self.runs
                    .push(TextRun::new(replacement, self.end_format.clone()));
            }
            return;
        };

        let mut offset = 0;
        let runs = std::mem::take(&mut self.runs);
        for (idx, run) in runs.into_iter().enumerate() {
            let chars: Vec<char> = run.text.chars().collect();
            let run_start = offset;
            let run_end = offset + chars.len();
            offset = run_end;

            let head_end = start.clamp(run_start, run_end) - run_start;
            let tail_start = end.clamp(run_start, run_end) - run_start;

            let mut text: String = chars[..head_end].iter().collect();
            if idx == anchor {
                text.push_str(replacement);
            }
            text.extend(&chars[tail_start..]);

            if text.is_empty() && !chars.is_empty() {
                continue;
            }
            self.runs.push(TextRun::new(text, run.format));
        }
    }

    /// Replaces every match of `needle`, returning how many were replaced.
    pub fn replace_all(&mut self, needle: &str, replacement: &str, match_case: bool) -> usize {
        let haystack: Vec<char> = self.text().chars().collect();
        let needle: Vec<char> = needle.chars().collect();
        let matches = find_matches(&haystack, &needle, match_case);
        // back to front so earlier ranges stay valid
        for range in matches.iter().rev() {
            self.splice(range.clone(), replacement);
        }
        matches.len()
    }

    /// Rewrites the paragraph to `text`, splicing only the span that differs.
    pub fn set_text(&mut self, text: &str) {
        let old: Vec<char> = self.text().chars().collect();
        let new: Vec<char> = text.chars().collect();
        let prefix = old
            .iter()
            .zip(&new)
            .take_while(|(a, b)| a == b)
            .count();
        let max_suffix = old.len().min(new.len()) - prefix;
        let suffix = old
            .iter()
            .rev()
            .zip(new.iter().rev())
            .take(max_suffix)
            .take_while(|(a, b)| a == b)
            .count();
        if prefix == old.len() && prefix == new.len() {
            return;
        }
        let replacement: String = new[prefix..new.len() - suffix].iter().collect();
        self.splice(prefix..old.len() - suffix, &replacement);
    }
}

impl TextBody {
    pub fn replace_all(&mut self, needle: &str, replacement: &str, match_case: bool) -> usize {
        self.paragraphs
            .iter_mut()
            .map(|paragraph| paragraph.replace_all(needle, replacement, match_case))
            .sum()
    }

    /// Sets the body text, one paragraph per `\n`-separated line.
    ///
    /// Existing paragraphs are edited in place. New paragraphs copy the
    /// properties of the last existing one and surplus paragraphs are removed.
    pub fn set_text(&mut self, text: &str) {
        let lines: Vec<&str> = text.split('\n').collect();
        for (idx, line) in lines.iter().enumerate() {
            if let Some(paragraph) = self.paragraphs.get_mut(idx) {
                paragraph.set_text(line);
                continue;
            }
            let template = self.paragraphs.last().cloned().unwrap_or_default();
            let format = template
                .runs
                .last()
                .map(|run| run.format.clone())
                .unwrap_or_else(|| template.end_format.clone());
            let runs = if line.is_empty() {
                Vec::new()
            } else {
                vec![TextRun::new(*line, format)]
            };
            self.paragraphs.push(Paragraph { runs, ..template });
        }
        self.paragraphs.truncate(lines.len());
    }
}
