//! Markdown clean-up applied after the walk.
//!
//! Only prose is rewritten. Lines between code fences pass through
//! untouched, blank lines and backslashes included.

use regex::Regex;
use std::sync::OnceLock;

const FENCE: &str = "```";

/// Byline leftovers dropped near the top of an article
const BOILERPLATE_LINES: &[&str] = &["·", "Published in", "--", "1", "Listen", "Share"];
/// Only this many leading lines are checked against the boilerplate list
const BOILERPLATE_WINDOW: usize = 40;

struct Patterns {
    bracket_then_newlines: Regex,
    newlines_then_target: Regex,
    empty_link_text: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            bracket_then_newlines: Regex::new(r"\[\n+")?,
            newlines_then_target: Regex::new(r"\n+\]\(")?,
            empty_link_text: Regex::new(r"\[\]\(")?,
        })
    }
}

fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| match Patterns::compile() {
            Ok(patterns) => Some(patterns),
            Err(e) => {
                tracing::error!(error = %e, "Failed to compile markdown clean-up patterns");
                None
            }
        })
        .as_ref()
}

/// Leading whitespace of a fence line, `None` for any other line
///
/// A fence line holds nothing but three or more backticks after its
/// indentation. List items indent their code blocks, so the indentation is
/// part of the fence.
pub(crate) fn fence_indent(line: &str) -> Option<&str> {
    let body = line.trim_start();
    let marker = body.trim_end();
    if marker.len() >= FENCE.len() && marker.chars().all(|c| c == '`') {
        Some(&line[..line.len() - body.len()])
    } else {
        None
    }
}

/// Normalize rendered Markdown
///
/// Repairs link text split across lines, drops byline leftovers near the
/// top, rewrites every fence as ``` at its own indentation with a blank line
/// outside each block, and collapses runs of blank lines in prose.
pub(crate) fn clean(raw: &str) -> String {
    let mut out = Output::default();
    let mut prose: Vec<&str> = Vec::new();
    let mut open: Option<&str> = None;
    let mut previous_was_fence = false;

    for (idx, line) in raw.split('\n').enumerate() {
        let fence = fence_indent(line);

        if let Some(indent) = fence {
            if previous_was_fence {
                continue;
            }
            previous_was_fence = true;
            match open.take() {
                Some(opening) => out.close_fence(opening),
                None => {
                    out.prose_block(&prose.join("\n"));
                    prose.clear();
                    out.open_fence(indent);
                    open = Some(indent);
                }
            }
            continue;
        }
        previous_was_fence = false;

        if open.is_some() {
            out.code(line);
        } else if idx >= BOILERPLATE_WINDOW || !BOILERPLATE_LINES.contains(&line.trim()) {
            prose.push(line);
        }
    }

    if let Some(opening) = open {
        out.close_fence(opening);
    }
    out.prose_block(&prose.join("\n"));
    out.finish()
}

/// Undo link text that the walk split over several lines
fn repair_links(text: &str) -> String {
    let Some(p) = patterns() else {
        return text.to_string();
    };
    let text = p.bracket_then_newlines.replace_all(text, "[");
    let text = p.newlines_then_target.replace_all(&text, "](");
    p.empty_link_text.replace_all(&text, "[ ](").into_owned()
}

#[derive(Default)]
struct Output {
    lines: Vec<String>,
    last_blank: bool,
}

impl Output {
    fn prose_block(&mut self, block: &str) {
        if block.is_empty() {
            return;
        }
        for line in repair_links(block).split('\n') {
            self.prose_line(line);
        }
    }

    /// Blank prose lines are stored empty and never lead or repeat
    fn prose_line(&mut self, line: &str) {
        let blank = line.trim().is_empty();
        if blank && (self.lines.is_empty() || self.last_blank) {
            return;
        }
        self.lines.push(if blank { String::new() } else { line.to_string() });
        self.last_blank = blank;
    }

    fn code(&mut self, line: &str) {
        self.lines.push(line.to_string());
        self.last_blank = false;
    }

    fn open_fence(&mut self, indent: &str) {
        if !self.lines.is_empty() && !self.last_blank {
            self.lines.push(String::new());
        }
        self.code(&format!("{}{}", indent, FENCE));
    }

    fn close_fence(&mut self, indent: &str) {
        self.code(&format!("{}{}", indent, FENCE));
        self.prose_line("");
    }

    fn finish(mut self) -> String {
        while self.lines.last().is_some_and(|l| l.is_empty()) {
            self.lines.pop();
        }
        self.lines.join("\n")
    }
}
