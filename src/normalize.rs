//! # Text Normalizer
//!
//! Character and encoding repair for OCR-derived Markdown.
//!
//! ## Stages (fixed order)
//!
//! 1. **Mojibake repair** - UTF-8 text that was decoded as Windows-1252
//! 2. **Ligature expansion** - `ﬁ` → `fi`, `ﬄ` → `ffl`
//! 3. **Invisible characters** - NFC normalization, zero-width and control characters
//! 4. **OCR misreads** - context-gated digit/letter confusion
//! 5. **Dashes** - decorative dividers and page markers removed, em-dashes spaced
//! 6. **Quotes** - typographic quotation marks to ASCII
//!
//! Citation and footnote stripping follows when requested, see [`crate::references`].
//!
//! The module also carries the line-level cleaners used by the finishing
//! steps: [`remove_page_artifacts`] and [`final_cleanup`].

use crate::shield::{ContentShield, ShieldOptions};
use encoding_rs::WINDOWS_1252;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

/// Normalizer configuration options
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    /// Stage 1: repair UTF-8/Windows-1252 mojibake
    pub repair_mojibake: bool,
    /// Stage 2: expand typographic ligatures
    pub expand_ligatures: bool,
    /// Stage 3: strip invisible and control characters
    pub strip_invisible: bool,
    /// Remove PUA (Private Use Area) characters during stage 3
    pub remove_pua: bool,
    /// Stage 4: correct digit/letter OCR confusion
    pub correct_ocr: bool,
    /// Stage 5: normalize dashes and dividers
    pub normalize_dashes: bool,
    /// Stage 6: straighten quotation marks
    pub normalize_quotes: bool,
    /// Strip citations and footnote markers after the character stages
    pub strip_references: bool,
    /// Keep fenced/inline code untouched
    pub preserve_code: bool,
    /// Keep math-like expressions untouched
    pub preserve_math: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            repair_mojibake: true,
            expand_ligatures: true,
            strip_invisible: true,
            remove_pua: true,
            correct_ocr: true,
            normalize_dashes: true,
            normalize_quotes: true,
            strip_references: false,
            preserve_code: true,
            preserve_math: true,
        }
    }
}

impl NormalizeOptions {
    /// Creates options for minimal normalization (encoding repair only)
    pub fn minimal() -> Self {
        Self {
            correct_ocr: false,
            normalize_dashes: false,
            normalize_quotes: false,
            ..Self::default()
        }
    }

    /// Creates options that also strip citations and footnote markers
    pub fn aggressive() -> Self {
        Self {
            strip_references: true,
            ..Self::default()
        }
    }
}

// ============================================================================
// Stage 1: Mojibake Repair
// ============================================================================

/// Runs drawn from the Windows-1252 upper half; mojibake never contains ASCII.
static RE_NON_ASCII_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"[\u{80}-\u{FF}\u{152}\u{153}\u{160}\u{161}\u{178}\u{17D}\u{17E}\u{192}\u{2C6}\u{2DC}\u{2013}\u{2014}\u{2018}-\u{201A}\u{201C}-\u{201E}\u{2020}-\u{2022}\u{2026}\u{2030}\u{2039}\u{203A}\u{20AC}\u{2122}]{2,}",
    )
    .unwrap()
});

/// Repairs text that was UTF-8 encoded but decoded as Windows-1252.
///
/// `â€™` becomes `’`, `Ã©` becomes `é`. Each candidate run is re-encoded
/// to Windows-1252 and accepted only if the bytes form valid UTF-8, so
/// legitimate accented text is left alone.
pub fn repair_mojibake(input: &str) -> String {
    RE_NON_ASCII_RUN
        .replace_all(input, |caps: &regex::Captures| {
            let run = &caps[0];
            repair_run(run).unwrap_or_else(|| run.to_string())
        })
        .into_owned()
}

fn repair_run(run: &str) -> Option<String> {
    // UTF-8 lead bytes 0xC2..=0xF4 decode to 'Â'..='ô' in Windows-1252
    if !run.chars().any(|c| ('\u{00C2}'..='\u{00F4}').contains(&c)) {
        return None;
    }

    let (bytes, _, unmappable) = WINDOWS_1252.encode(run);
    if unmappable {
        return None;
    }

    let repaired = std::str::from_utf8(&bytes).ok()?;
    if repaired.chars().count() < run.chars().count() {
        Some(repaired.to_string())
    } else {
        None
    }
}

// ============================================================================
// Stage 2: Ligature Expansion
// ============================================================================

/// Ligature expansion table
const LIGATURES: &[(char, &str)] = &[
    ('\u{FB00}', "ff"),
    ('\u{FB01}', "fi"),
    ('\u{FB02}', "fl"),
    ('\u{FB03}', "ffi"),
    ('\u{FB04}', "ffl"),
    ('\u{FB05}', "st"), // long s + t
    ('\u{FB06}', "st"),
    ('\u{A732}', "AA"),
    ('\u{A733}', "aa"),
];

/// Expands typographic ligatures into their letter sequences.
pub fn expand_ligatures(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        match LIGATURES.iter().find(|(lig, _)| *lig == c) {
            Some((_, expansion)) => result.push_str(expansion),
            None => result.push(c),
        }
    }
    result
}

// ============================================================================
// Stage 3: Invisible Characters
// ============================================================================

/// NFC-normalizes and strips invisible, control, and optionally PUA characters.
///
/// Non-breaking and typographic spaces become plain spaces. CRLF becomes LF.
pub fn strip_invisible(input: &str, remove_pua: bool) -> String {
    let mut result = String::with_capacity(input.len());

    for c in input.nfc() {
        if is_invisible_char(c) {
            continue;
        }

        if remove_pua && is_pua_char(c) {
            continue;
        }

        if is_space_variant(c) {
            result.push(' ');
            continue;
        }

        result.push(c);
    }

    result
}

/// Check if character is invisible or a control character that should be removed
fn is_invisible_char(c: char) -> bool {
    matches!(
        c,
        '\0'
        | '\r'
        | '\x0B'     // Vertical Tab
        | '\x0C'     // Form Feed
        | '\u{00AD}' // Soft hyphen
        | '\u{180E}' // Mongolian vowel separator
        | '\u{200B}' // Zero width space
        | '\u{200C}' // Zero width non-joiner
        | '\u{200D}' // Zero width joiner
        | '\u{2060}' // Word joiner
        | '\u{FEFF}' // BOM
        | '\u{FFFD}' // Replacement character
    )
}

/// Check if character is in Private Use Area
fn is_pua_char(c: char) -> bool {
    let code = c as u32;
    (0xE000..=0xF8FF).contains(&code)
        || (0xF0000..=0xFFFFD).contains(&code)
        || (0x100000..=0x10FFFD).contains(&code)
}

fn is_space_variant(c: char) -> bool {
    matches!(
        c,
        '\u{00A0}' | '\u{2002}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}'
    )
}

// ============================================================================
// Stage 4: OCR Misread Correction
// ============================================================================

static RE_ALNUM_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9]{2,}\b").unwrap());

/// Whole-word misreads of common English words.
static OCR_WORDS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"\btbe\b", "the"),
        (r"\btlie\b", "the"),
        (r"\bTbe\b", "The"),
        (r"\bTlie\b", "The"),
        (r"\btbat\b", "that"),
        (r"\btliat\b", "that"),
        (r"\btbis\b", "this"),
        (r"\btbey\b", "they"),
        (r"\btbeir\b", "their"),
        (r"\btbere\b", "there"),
        (r"\bwbich\b", "which"),
        (r"\bwliich\b", "which"),
        (r"\bwben\b", "when"),
        (r"\bwbere\b", "where"),
        (r"\bwliere\b", "where"),
    ]
    .into_iter()
    .map(|(pattern, word)| (Regex::new(pattern).unwrap(), word))
    .collect()
});

/// Corrects digit/letter confusion, gated on the surrounding characters.
///
/// - In a lowercase word, `0` becomes `o` and `1` becomes `l` when both
///   neighbors are lowercase letters (`w0rd` → `word`, `wor1d` → `world`).
/// - In a number, `O`/`o` become `0` and `l`/`I` become `1` when digits
///   outnumber letters (`19O5` → `1905`).
///
/// Mixed tokens such as `H2O`, `mp3`, or `B2B` are left alone.
pub fn correct_ocr_misreads(input: &str) -> String {
    let mut result = RE_ALNUM_TOKEN
        .replace_all(input, |caps: &regex::Captures| fix_token(&caps[0]))
        .into_owned();

    for (pattern, word) in OCR_WORDS.iter() {
        if pattern.is_match(&result) {
            result = pattern.replace_all(&result, *word).into_owned();
        }
    }

    result
}

fn fix_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    let digits = chars.iter().filter(|c| c.is_ascii_digit()).count();
    let letters = chars.len() - digits;

    if digits == 0 || letters == 0 {
        return token.to_string();
    }

    // Letter context: lowercase word with isolated 0/1 inside
    if letters > digits && chars.len() >= 4 {
        let fixable = chars.iter().enumerate().all(|(i, c)| {
            if c.is_ascii_lowercase() {
                return true;
            }
            matches!(c, '0' | '1')
                && i > 0
                && i + 1 < chars.len()
                && chars[i - 1].is_ascii_lowercase()
                && chars[i + 1].is_ascii_lowercase()
        });
        if fixable {
            return chars
                .iter()
                .map(|c| match c {
                    '0' => 'o',
                    '1' => 'l',
                    other => *other,
                })
                .collect();
        }
        return token.to_string();
    }

    // Digit context: number with letter lookalikes inside
    if digits > letters && digits >= 2 {
        let fixable = chars
            .iter()
            .all(|c| c.is_ascii_digit() || matches!(c, 'O' | 'o' | 'l' | 'I'));
        if fixable {
            return chars
                .iter()
                .map(|c| match c {
                    'O' | 'o' => '0',
                    'l' | 'I' => '1',
                    other => *other,
                })
                .collect();
        }
    }

    token.to_string()
}

// ============================================================================
// Stage 5: Dash Normalization
// ============================================================================

/// Markdown thematic break: three or more `-`, `*`, or `_`, optionally spaced
static RE_HORIZONTAL_RULE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ {0,3}(?:(?:-\s*){3,}|(?:\*\s*){3,}|(?:_\s*){3,})$").unwrap());

/// Lines made only of decorative dash/box characters
static RE_DECORATIVE_DIVIDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[—–―‒─━═~\-\s]{3,}$").unwrap());

/// Page-number markers such as `— 12 —` or `–12–`
static RE_DASHED_PAGE_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[—–―\-]\s*\d{1,4}\s*[—–―\-]\s*$").unwrap());

/// Em-dash variants, including doubled hyphens between words
static RE_EM_DASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]*(?:[—―]+|-{2,})[ \t]*").unwrap());

/// Spaced en dash used as a sentence dash
static RE_SPACED_EN_DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+–[ \t]+").unwrap());

/// Normalizes dashes line by line.
///
/// Markdown horizontal rules, table rows, and HTML comments pass through
/// untouched. Decorative dividers and dashed page markers become blank
/// lines, so line count never grows. Sentence dashes are written as ` — `.
pub fn normalize_dashes(input: &str) -> String {
    let mut lines = Vec::new();

    for line in input.split('\n') {
        let trimmed = line.trim();

        if trimmed.is_empty()
            || RE_HORIZONTAL_RULE.is_match(line)
            || trimmed.starts_with('|')
            || trimmed.contains("<!--")
            || trimmed.contains("-->")
        {
            lines.push(line.to_string());
            continue;
        }

        if RE_DASHED_PAGE_MARKER.is_match(line) {
            lines.push(String::new());
            continue;
        }

        if RE_DECORATIVE_DIVIDER.is_match(line) && trimmed.chars().any(is_fancy_dash) {
            lines.push(String::new());
            continue;
        }

        lines.push(space_em_dashes(line));
    }

    lines.join("\n")
}

fn is_fancy_dash(c: char) -> bool {
    matches!(c, '—' | '–' | '―' | '‒' | '─' | '━' | '═' | '~')
}

fn space_em_dashes(line: &str) -> String {
    let line = RE_SPACED_EN_DASH.replace_all(line, " — ");
    let indent_len = line.len() - line.trim_start().len();
    let (indent, body) = line.split_at(indent_len);

    let body = RE_EM_DASH.replace_all(body, |caps: &regex::Captures| {
        let m = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        if m.0 == 0 {
            // Dialogue dash at line start
            "— ".to_string()
        } else if m.1 == body.len() {
            // Interrupted speech at line end
            " —".to_string()
        } else {
            " — ".to_string()
        }
    });

    format!("{}{}", indent, body)
}

// ============================================================================
// Stage 6: Quote Normalization
// ============================================================================

/// Quotation mark mapping table
const QUOTE_MAPPINGS: &[(char, char)] = &[
    ('\u{201C}', '"'),  // “
    ('\u{201D}', '"'),  // ”
    ('\u{201E}', '"'),  // „
    ('\u{201F}', '"'),  // ‟
    ('\u{00AB}', '"'),  // «
    ('\u{00BB}', '"'),  // »
    ('\u{2033}', '"'),  // ″
    ('\u{2018}', '\''), // ‘
    ('\u{2019}', '\''), // ’
    ('\u{201A}', '\''), // ‚
    ('\u{201B}', '\''), // ‛
    ('\u{2032}', '\''), // ′
];

/// Replaces typographic quotation marks with ASCII quotes.
pub fn normalize_quotes(input: &str) -> String {
    input
        .chars()
        .map(|c| {
            QUOTE_MAPPINGS
                .iter()
                .find(|(from, _)| *from == c)
                .map(|(_, to)| *to)
                .unwrap_or(c)
        })
        .collect()
}

// ============================================================================
// Page Artifacts (finishing step)
// ============================================================================

static RE_PAGE_HYPHEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*[-\[\(]\s*\d+\s*[-\]\)]\s*$").unwrap());

static RE_PAGE_RATIO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:Page\s*)?\d+\s*(?:/|of)\s*\d+\s*$").unwrap());

static RE_PAGE_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(?:page|p\.)\s*\d{1,4}\s*$").unwrap());

static RE_BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*\d{1,4}\s*$").unwrap());

static RE_EMPTY_BRACKETS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\(\[\{<]\s*[\)\]\}>]$").unwrap());

/// Page-number regexes, reported in detected patterns.
pub fn page_number_patterns() -> Vec<String> {
    [
        &*RE_PAGE_HYPHEN,
        &*RE_PAGE_RATIO,
        &*RE_PAGE_LABEL,
        &*RE_DASHED_PAGE_MARKER,
    ]
    .iter()
    .map(|re| re.as_str().to_string())
    .collect()
}

/// Check if line matches page number patterns
pub fn is_page_number(line: &str) -> bool {
    RE_PAGE_HYPHEN.is_match(line)
        || RE_PAGE_RATIO.is_match(line)
        || RE_PAGE_LABEL.is_match(line)
        || RE_DASHED_PAGE_MARKER.is_match(line)
}

/// Removes standalone page numbers and running headers/footers.
///
/// Removed lines become empty lines; [`final_cleanup`] collapses them.
/// A bare number only counts as a page number when blank lines surround it,
/// so numbered list items and table cells survive.
pub fn remove_page_artifacts(input: &str, threshold: f64, max_length: usize) -> String {
    let lines: Vec<&str> = input.lines().collect();
    let frequent = analyze_line_frequencies(&lines, threshold, max_length);
    let mut in_fence = false;

    let mut result = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }
        if in_fence || trimmed.is_empty() {
            result.push(line.to_string());
            continue;
        }

        if is_page_number(trimmed)
            || RE_EMPTY_BRACKETS.is_match(trimmed)
            || (RE_BARE_NUMBER.is_match(trimmed) && is_isolated(&lines, i))
            || frequent.contains_key(trimmed)
        {
            result.push(String::new());
            continue;
        }

        result.push(line.to_string());
    }

    result.join("\n")
}

fn is_isolated(lines: &[&str], i: usize) -> bool {
    let before = i == 0 || lines[i - 1].trim().is_empty();
    let after = i + 1 >= lines.len() || lines[i + 1].trim().is_empty();
    before && after
}

/// Detects running headers/footers as short lines repeated across pages.
pub fn detect_running_lines(input: &str, threshold: f64, max_length: usize) -> Vec<String> {
    let lines: Vec<&str> = input.lines().collect();
    let mut found: Vec<String> = analyze_line_frequencies(&lines, threshold, max_length)
        .into_keys()
        .map(str::to_string)
        .collect();
    found.sort();
    found
}

/// Analyze line frequencies to detect headers/footers
fn analyze_line_frequencies<'a>(
    lines: &[&'a str],
    threshold: f64,
    max_length: usize,
) -> HashMap<&'a str, usize> {
    let mut freq: HashMap<&str, usize> = HashMap::new();

    for line in lines {
        let trimmed = line.trim();
        if !trimmed.is_empty()
            && trimmed.len() <= max_length
            && !trimmed.starts_with('#')
            && !trimmed.starts_with('|')
            && !RE_HORIZONTAL_RULE.is_match(trimmed)
        {
            *freq.entry(trimmed).or_insert(0) += 1;
        }
    }

    // Estimate page count (rough: ~40 lines per page)
    let estimated_pages = (lines.len() as f64 / 40.0).ceil() as usize;
    let threshold = (estimated_pages as f64 * threshold) as usize;

    freq.retain(|_, count| *count >= threshold.max(3));

    freq
}

// ============================================================================
// Final Cleanup (finishing step)
// ============================================================================

static RE_MULTIPLE_NEWLINES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static RE_MULTIPLE_SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Final whitespace normalization.
///
/// - Reduce consecutive newlines (3+ -> 2)
/// - Collapse runs of spaces outside code
/// - Strip trailing whitespace
/// - Remove orphan punctuation-only lines
pub fn final_cleanup(input: &str) -> String {
    let mut cleaned_lines: Vec<String> = Vec::new();
    let mut in_fence = false;

    for line in input.lines() {
        let trimmed = line.trim();

        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            cleaned_lines.push(line.trim_end().to_string());
            continue;
        }
        if in_fence || line.starts_with("    ") || line.starts_with('\t') {
            cleaned_lines.push(line.trim_end().to_string());
            continue;
        }

        if is_orphan_line(trimmed) {
            continue;
        }

        let indent_len = line.len() - line.trim_start().len();
        let indent = &line[..indent_len];
        let body = RE_MULTIPLE_SPACES.replace_all(trimmed, " ");
        cleaned_lines.push(format!("{}{}", indent, body));
    }

    let joined = cleaned_lines.join("\n");
    let collapsed = RE_MULTIPLE_NEWLINES.replace_all(&joined, "\n\n");
    collapsed.trim_matches('\n').to_string()
}

/// Check if line is an orphan (meaningless fragment)
fn is_orphan_line(line: &str) -> bool {
    if line.is_empty() {
        return false;
    }

    // Preserve horizontal rules, frontmatter delimiters, and emphasis markers
    if RE_HORIZONTAL_RULE.is_match(line) || line == "..." || line == "***" {
        return false;
    }

    // Markdown structure that happens to be punctuation
    if line.starts_with('#') || line.starts_with('|') || line.starts_with('>') {
        return false;
    }
    if line.starts_with("<!--") || line.starts_with("```") || line.starts_with('$') {
        return false;
    }

    line.chars()
        .all(|c| c.is_ascii_punctuation() || c.is_whitespace() || matches!(c, '。' | '、' | '•' | '·'))
}

// ============================================================================
// Main Pipeline
// ============================================================================

/// Run the character-level normalization stages on markdown content
///
/// Code and math are shielded according to the options, so `--flag` in a
/// code block or `x--y` in a formula is never rewritten.
///
/// # Example
///
/// ```
/// use unocr::normalize::{normalize, NormalizeOptions};
///
/// let dirty = "The ﬁrst word\u{200B}—and “quotes”.";
/// let clean = normalize(dirty, &NormalizeOptions::default());
/// assert_eq!(clean, "The first word — and \"quotes\".");
/// ```
pub fn normalize(input: &str, options: &NormalizeOptions) -> String {
    let shield_options = ShieldOptions {
        code: options.preserve_code,
        math: options.preserve_math,
        tables: false,
    };
    let (mut result, shield) = ContentShield::extract_with(input, shield_options);

    // Stage 1: Mojibake repair
    if options.repair_mojibake {
        result = repair_mojibake(&result);
    }

    // Stage 2: Ligature expansion
    if options.expand_ligatures {
        result = expand_ligatures(&result);
    }

    // Stage 3: Invisible characters
    if options.strip_invisible {
        result = strip_invisible(&result, options.remove_pua);
    }

    // Stage 4: OCR misreads
    if options.correct_ocr {
        result = correct_ocr_misreads(&result);
    }

    // Stage 5: Dashes
    if options.normalize_dashes {
        result = normalize_dashes(&result);
    }

    // Stage 6: Quotes
    if options.normalize_quotes {
        result = normalize_quotes(&result);
    }

    let mut result = shield.restore(&result);

    if options.strip_references {
        result = crate::references::strip_references(&result);
    }

    result
}

/// Run normalization with default options
pub fn normalize_default(input: &str) -> String {
    normalize(input, &NormalizeOptions::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mojibake_repair() {
        assert_eq!(repair_mojibake("It\u{e2}\u{20ac}\u{2122}s"), "It\u{2019}s");
        assert_eq!(repair_mojibake("caf\u{c3}\u{a9} au lait"), "café au lait");
    }

    #[test]
    fn test_mojibake_preserves_legitimate_accents() {
        let input = "Ça va? Très bien, déjà vu. ÉTÉ";
        assert_eq!(repair_mojibake(input), input);
    }

    #[test]
    fn test_ligature_expansion() {
        assert_eq!(expand_ligatures("\u{FB01}nal \u{FB04}uent"), "final fluent");
    }

    #[test]
    fn test_invisible_char_removal() {
        let input = "zero\u{200B}width\u{00AD}soft\u{FEFF}bom\r\nnext\u{00A0}line";
        assert_eq!(strip_invisible(input, true), "zerowidthsoftbom\nnext line");
    }

    #[test]
    fn test_pua_removal() {
        assert_eq!(strip_invisible("a\u{E000}b", true), "ab");
        assert_eq!(strip_invisible("a\u{E000}b", false), "a\u{E000}b");
    }

    #[test]
    fn test_ocr_letter_context() {
        assert_eq!(correct_ocr_misreads("the w0rd and wor1d"), "the word and world");
    }

    #[test]
    fn test_ocr_digit_context() {
        assert_eq!(correct_ocr_misreads("in 19O5 and l984"), "in 1905 and 1984");
    }

    #[test]
    fn test_ocr_leaves_mixed_tokens() {
        let input = "H2O and mp3 and B2B and COVID19 and 3rd";
        assert_eq!(correct_ocr_misreads(input), input);
    }

    #[test]
    fn test_ocr_common_words() {
        assert_eq!(correct_ocr_misreads("Tbe cat saw tbe dog"), "The cat saw the dog");
    }

    #[test]
    fn test_dash_dividers_removed_rules_kept() {
        let input = "Text\n\n——————\n\n---\n\n* * *\n\nMore";
        let result = normalize_dashes(input);
        assert!(!result.contains('—'));
        assert!(result.contains("\n---\n"));
        assert!(result.contains("* * *"));
        assert_eq!(result.lines().count(), input.lines().count());
    }

    #[test]
    fn test_dashed_page_marker_removed() {
        let result = normalize_dashes("end of page\n— 12 —\nnext page");
        assert_eq!(result, "end of page\n\nnext page");
    }

    #[test]
    fn test_em_dash_spacing() {
        assert_eq!(normalize_dashes("word—word"), "word — word");
        assert_eq!(normalize_dashes("word -- word"), "word — word");
        assert_eq!(normalize_dashes("a ——  b"), "a — b");
        assert_eq!(normalize_dashes("—Yes, he said."), "— Yes, he said.");
    }

    #[test]
    fn test_en_dash_ranges_kept() {
        assert_eq!(normalize_dashes("pages 10–20"), "pages 10–20");
    }

    #[test]
    fn test_dash_skips_tables_and_comments() {
        let input = "| a | b |\n|---|---|\n<!-- note -->";
        assert_eq!(normalize_dashes(input), input);
    }

    #[test]
    fn test_quote_normalization() {
        assert_eq!(normalize_quotes("“Hi,” she said, ‘ok’"), "\"Hi,\" she said, 'ok'");
    }

    #[test]
    fn test_page_artifacts() {
        let input = "Body text\n\n- 15 -\n\nPage 3 of 20\n\n42\n\n1. item";
        let result = remove_page_artifacts(input, 0.5, 100);
        assert!(!result.contains("- 15 -"));
        assert!(!result.contains("Page 3 of 20"));
        assert!(!result.contains("42"));
        assert!(result.contains("1. item"));
        assert_eq!(result.lines().count(), input.lines().count());
    }

    #[test]
    fn test_running_headers_removed() {
        let mut input = String::new();
        for i in 0..6 {
            input.push_str("THE HISTORY OF ROME\n\n");
            input.push_str(&format!("Paragraph number {} of the body.\n\n", i));
        }
        let result = remove_page_artifacts(&input, 0.5, 100);
        assert!(!result.contains("THE HISTORY OF ROME"));
        assert!(result.contains("Paragraph number 5"));
        assert_eq!(
            detect_running_lines(&input, 0.5, 100),
            vec!["THE HISTORY OF ROME".to_string()]
        );
    }

    #[test]
    fn test_page_artifacts_skip_code() {
        let input = "```\n42\n```";
        assert_eq!(remove_page_artifacts(input, 0.5, 100), input);
    }

    #[test]
    fn test_final_cleanup() {
        let input = "First   line  \n\n\n\n.\n,\nSecond line\n\n---\n\n# Head";
        let result = final_cleanup(input);
        assert_eq!(result, "First line\n\nSecond line\n\n---\n\n# Head");
    }

    #[test]
    fn test_final_cleanup_preserves_code_spacing() {
        let input = "```\nlet  x =  1;\n```";
        assert_eq!(final_cleanup(input), input);
    }

    #[test]
    fn test_normalize_preserves_code() {
        let input = "Run `cmd --flag` now—quickly.\n\n```\na--b “x”\n```";
        let result = normalize_default(input);
        assert!(result.contains("`cmd --flag`"));
        assert!(result.contains("a--b “x”"));
        assert!(result.contains("now — quickly."));
    }

    #[test]
    fn test_full_normalization() {
        let input = "Tbe \u{FB01}rst caf\u{c3}\u{a9}\u{200B} “quote”—end";
        assert_eq!(normalize_default(input), "The first café \"quote\" — end");
    }
}
