/// Bounded, human-readable debug text built from sections
#[derive(Clone, Debug)]
pub struct DebugReport {
    text: String,
    max_chars: usize,
}

const TRUNCATED: &str = "\n... (truncated)\n";

impl DebugReport {
    pub fn new(max_chars: usize) -> Self {
        Self {
            text: String::new(),
            max_chars,
        }
    }

    /// Append a section, separated from the previous one by a blank line
    pub fn section(mut self, section: &str) -> Self {
        if !self.text.is_empty() && !section.is_empty() {
            if !self.text.ends_with('\n') {
                self.text.push('\n');
            }
            self.text.push('\n');
        }
        self.text.push_str(section);
        self
    }

    /// Final text, cut on a char boundary to at most `max_chars` chars
    pub fn finish(self) -> String {
        if self.text.chars().count() <= self.max_chars {
            return self.text;
        }

        let keep = self.max_chars.saturating_sub(TRUNCATED.chars().count());
        let cut = self
            .text
            .char_indices()
            .nth(keep)
            .map(|(idx, _)| idx)
            .unwrap_or(self.text.len());
        let mut out = self.text[..cut].to_string();
        out.push_str(TRUNCATED);
        out.chars().take(self.max_chars).collect()
    }
}
