//! Placeholder protection for code, math, and tables.
//!
//! Regions that a transformation must never touch are swapped for opaque
//! tokens before the transformation and swapped back afterwards. Tokens are
//! wrapped in a run of `⟦`/`⟧` one longer than any run already present in
//! the input, so a token can never collide with document text.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag};
use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

const OPEN: char = '⟦';
const CLOSE: char = '⟧';

/// Which region kinds to protect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShieldOptions {
    /// Fenced code blocks and inline code spans
    pub code: bool,
    /// `$$..$$`, `$..$`, `\[..\]`, `\(..\)`
    pub math: bool,
    /// Pipe tables
    pub tables: bool,
}

impl Default for ShieldOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl ShieldOptions {
    pub fn all() -> Self {
        Self {
            code: true,
            math: true,
            tables: true,
        }
    }

    pub fn none() -> Self {
        Self {
            code: false,
            math: false,
            tables: false,
        }
    }
}

/// Kind of protected region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldKind {
    Code,
    Math,
    Table,
    /// Arbitrary regex matches protected by a caller
    Literal,
}

impl ShieldKind {
    fn tag(self) -> &'static str {
        match self {
            ShieldKind::Code => "CODE",
            ShieldKind::Math => "MATH",
            ShieldKind::Table => "TABLE",
            ShieldKind::Literal => "LIT",
        }
    }
}

#[derive(Debug, Clone)]
struct ShieldEntry {
    kind: ShieldKind,
    token: String,
    original: String,
}

/// Extracted regions and the tokens that replaced them.
#[derive(Debug, Clone)]
pub struct ContentShield {
    open: String,
    close: String,
    entries: Vec<ShieldEntry>,
}

static RE_DISPLAY_MATH_DOLLAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\$[\s\S]+?\$\$").unwrap());

static RE_DISPLAY_MATH_BRACKET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\[[\s\S]+?\\\]").unwrap());

static RE_INLINE_MATH_PAREN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\\\(.+?\\\)").unwrap());

/// `$x$`: no space just inside the delimiters, so `$5 and $10` is not math
static RE_INLINE_MATH_DOLLAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$[^\s$](?:[^$\n]*[^\s$])?\$").unwrap());

impl ContentShield {
    /// Protects code, math, and tables.
    pub fn extract(input: &str) -> (String, Self) {
        Self::extract_with(input, ShieldOptions::all())
    }

    /// Protects the selected region kinds. Extraction order is code, math,
    /// then tables; restoration runs in reverse.
    pub fn extract_with(input: &str, options: ShieldOptions) -> (String, Self) {
        let mut shield = Self::for_input(input);
        let mut text = input.to_string();

        if options.code {
            let ranges = code_ranges(&text);
            text = shield.replace_ranges(&text, ranges, ShieldKind::Code);
        }

        if options.math {
            for re in [
                &*RE_DISPLAY_MATH_DOLLAR,
                &*RE_DISPLAY_MATH_BRACKET,
                &*RE_INLINE_MATH_PAREN,
            ] {
                text = shield.protect_matches(&text, re, ShieldKind::Math);
            }
            let ranges = inline_dollar_ranges(&text);
            text = shield.replace_ranges(&text, ranges, ShieldKind::Math);
        }

        if options.tables {
            let ranges = table_ranges(&text);
            text = shield.replace_ranges(&text, ranges, ShieldKind::Table);
        }

        (text, shield)
    }

    /// An empty shield whose delimiters are safe for `input`.
    pub fn for_input(input: &str) -> Self {
        let longest = longest_run(input, OPEN).max(longest_run(input, CLOSE));
        Self {
            open: OPEN.to_string().repeat(longest + 1),
            close: CLOSE.to_string().repeat(longest + 1),
            entries: Vec::new(),
        }
    }

    /// Replaces every match of `re` in `text` with a token.
    pub fn protect_matches(&mut self, text: &str, re: &Regex, kind: ShieldKind) -> String {
        self.protect_matches_where(text, re, kind, |_, _| true)
    }

    /// Replaces the matches of `re` for which `keep` returns true.
    pub fn protect_matches_where<F>(
        &mut self,
        text: &str,
        re: &Regex,
        kind: ShieldKind,
        keep: F,
    ) -> String
    where
        F: Fn(&str, Range<usize>) -> bool,
    {
        let ranges: Vec<Range<usize>> = re
            .find_iter(text)
            .map(|m| m.range())
            .filter(|range| keep(text, range.clone()))
            .collect();
        self.replace_ranges(text, ranges, kind)
    }

    /// Splits `text` into plain segments and tokens, in order.
    ///
    /// Each part is paired with `true` when it is a token.
    pub fn split_tokens<'a>(&self, text: &'a str) -> Vec<(&'a str, bool)> {
        let mut parts = Vec::new();
        let mut rest = text;
        while let Some(start) = rest.find(&self.open) {
            let after = start + self.open.len();
            let Some(len) = rest[after..].find(&self.close) else {
                break;
            };
            let end = after + len + self.close.len();
            if start > 0 {
                parts.push((&rest[..start], false));
            }
            parts.push((&rest[start..end], true));
            rest = &rest[end..];
        }
        if !rest.is_empty() {
            parts.push((rest, false));
        }
        parts
    }

    /// Restores all tokens, newest first, so nested tokens resolve.
    pub fn restore(&self, text: &str) -> String {
        let mut result = text.to_string();
        for entry in self.entries.iter().rev() {
            result = result.replace(&entry.token, &entry.original);
        }
        result
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Number of protected regions of a kind.
    pub fn count(&self, kind: ShieldKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Tokens that occur in `text`.
    pub fn tokens_in<'a>(&'a self, text: &str) -> Vec<&'a str> {
        self.entries
            .iter()
            .filter(|e| text.contains(&e.token))
            .map(|e| e.token.as_str())
            .collect()
    }

    /// Returns true if every token present in `before` is still present in `after`.
    pub fn preserved(&self, before: &str, after: &str) -> bool {
        self.tokens_in(before)
            .into_iter()
            .all(|token| after.contains(token))
    }

    fn replace_ranges(&mut self, text: &str, ranges: Vec<Range<usize>>, kind: ShieldKind) -> String {
        if ranges.is_empty() {
            return text.to_string();
        }

        let mut result = String::with_capacity(text.len());
        let mut cursor = 0;
        for range in ranges {
            if range.start < cursor || range.is_empty() {
                continue;
            }
            result.push_str(&text[cursor..range.start]);
            let token = format!(
                "{}{}{}{}",
                self.open,
                kind.tag(),
                alpha_index(self.entries.len()),
                self.close
            );
            result.push_str(&token);
            self.entries.push(ShieldEntry {
                kind,
                token,
                original: text[range.clone()].to_string(),
            });
            cursor = range.end;
        }
        result.push_str(&text[cursor..]);
        result
    }
}

/// Bijective base-26 letters, so tokens never contain digits.
fn alpha_index(mut n: usize) -> String {
    let mut letters = Vec::new();
    loop {
        letters.push((b'a' + (n % 26) as u8) as char);
        if n < 26 {
            break;
        }
        n = n / 26 - 1;
    }
    letters.iter().rev().collect()
}

fn longest_run(text: &str, target: char) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in text.chars() {
        if c == target {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

/// Trims trailing newlines so a token never swallows a line break.
fn trim_range(text: &str, mut range: Range<usize>) -> Range<usize> {
    let bytes = text.as_bytes();
    while range.end > range.start && matches!(bytes[range.end - 1], b'\n' | b'\r') {
        range.end -= 1;
    }
    range
}

fn code_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    for (event, range) in Parser::new_ext(text, Options::empty()).into_offset_iter() {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(_))) | Event::Code(_) => {
                ranges.push(trim_range(text, range));
            }
            _ => {}
        }
    }
    normalize_ranges(ranges)
}

fn table_ranges(text: &str) -> Vec<Range<usize>> {
    let mut ranges = Vec::new();
    for (event, range) in Parser::new_ext(text, Options::ENABLE_TABLES).into_offset_iter() {
        if let Event::Start(Tag::Table(_)) = event {
            ranges.push(trim_range(text, range));
        }
    }
    normalize_ranges(ranges)
}

fn inline_dollar_ranges(text: &str) -> Vec<Range<usize>> {
    RE_INLINE_MATH_DOLLAR
        .find_iter(text)
        .filter(|m| {
            // `$5 and 6$7` is currency, not math
            !text[m.end()..]
                .chars()
                .next()
                .is_some_and(|c| c.is_ascii_digit())
        })
        .map(|m| m.range())
        .collect()
}

/// Sorts ranges and drops any nested inside an earlier one.
fn normalize_ranges(mut ranges: Vec<Range<usize>>) -> Vec<Range<usize>> {
    ranges.sort_by_key(|r| (r.start, std::cmp::Reverse(r.end)));
    let mut result: Vec<Range<usize>> = Vec::with_capacity(ranges.len());
    for range in ranges {
        if result.last().is_some_and(|last| range.start < last.end) {
            continue;
        }
        result.push(range);
    }
    result
}
