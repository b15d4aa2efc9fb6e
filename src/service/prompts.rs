//! Prompt builders for the analysis service.
//!
//! Detection prompts show the model numbered lines so that the line numbers
//! it returns refer to the content it was given. Only the part of the
//! document where a region can plausibly sit is sent.

use crate::model::RegionKind;

/// System prompt for all detection requests.
pub const DETECTION_SYSTEM: &str = "You analyze the structure of books and manuals converted from scanned pages by OCR. Answer with a single JSON object and nothing else. Never invent line numbers: only use numbers shown in the excerpt.";

/// System prompt for rewriting requests (reflow, paragraph length).
pub const REWRITE_SYSTEM: &str = "You repair the layout of OCR text. Return only the rewritten text. Never add, remove, summarize, or reorder words. Copy any token enclosed in ⟦ ⟧ exactly.";

/// System prompt for the final quality review.
pub const REVIEW_SYSTEM: &str = "You review cleaned book text intended for language-model training. Answer with a single JSON object and nothing else.";

/// Most lines sent in one detection excerpt.
pub const MAX_EXCERPT_LINES: usize = 1500;

/// Characters of each sample in reconnaissance and review prompts.
const SAMPLE_CHARS: usize = 3000;

/// Renders lines with absolute 1-based numbers, starting at `first_line`.
pub fn number_lines(lines: &[&str], first_line: usize) -> String {
    let mut out = String::new();
    for (i, line) in lines.iter().enumerate() {
        out.push_str(&format!("{:>5}| {}\n", first_line + i, line));
    }
    out
}

/// Numbered excerpt covering where `kind` can occur.
pub fn region_excerpt(content: &str, kind: RegionKind) -> String {
    let lines: Vec<&str> = content.split('\n').collect();
    let total = lines.len();
    match kind {
        RegionKind::FrontMatter | RegionKind::TableOfContents | RegionKind::AuxiliaryLists => {
            let count = (total * 2 / 5).max(60).min(MAX_EXCERPT_LINES).min(total);
            number_lines(&lines[..count], 1)
        }
        RegionKind::Index | RegionKind::BackMatter | RegionKind::Notes => {
            let count = (total / 2).max(60).min(MAX_EXCERPT_LINES).min(total);
            let start = total - count;
            number_lines(&lines[start..], start + 1)
        }
    }
}

fn region_instructions(kind: RegionKind) -> &'static str {
    match kind {
        RegionKind::FrontMatter => "Find the FRONT MATTER: title page, copyright page, dedication, epigraph, preface, foreword, and similar material before the main text begins. start_line is 1. end_line is the last line before the first chapter or the main body.",
        RegionKind::TableOfContents => "Find the TABLE OF CONTENTS: a 'Contents' heading followed by a listing of chapters or sections, usually with page numbers. Return its first and last line.",
        RegionKind::AuxiliaryLists => "Find lists of figures, tables, illustrations, maps, or abbreviations near the start of the book.",
        RegionKind::Index => "Find the INDEX: an 'Index' heading followed by alphabetized 'term, page numbers' entries, near the end of the book. end_line may be null if it runs to the end.",
        RegionKind::BackMatter => "Find where the BACK MATTER starts: notes, appendices, glossary, bibliography, references, index, acknowledgments, or about-the-author sections after the main text ends. start_line must be the section heading line. end_line may be null if it runs to the end.",
        RegionKind::Notes => "Find a NOTES or ENDNOTES section: a 'Notes' heading followed by numbered note entries.",
    }
}

/// Prompt for a single-region boundary.
pub fn boundary_prompt(content: &str, kind: RegionKind) -> String {
    format!(
        "{instructions}\n\nIf the region is not present, return null line numbers and confidence 0.\n\nRespond as JSON:\n{{\"start_line\": <number or null>, \"end_line\": <number or null>, \"confidence\": <0.0-1.0>, \"notes\": \"<short reason>\"}}\n\nExcerpt ({region}):\n{excerpt}",
        instructions = region_instructions(kind),
        region = kind.service_name(),
        excerpt = region_excerpt(content, kind),
    )
}

/// Prompt for auxiliary lists.
pub fn auxiliary_lists_prompt(content: &str) -> String {
    format!(
        "{instructions}\n\nRespond as JSON:\n{{\"lists\": [{{\"kind\": \"figures|tables|illustrations|maps|abbreviations|other\", \"start_line\": <number>, \"end_line\": <number>, \"confidence\": <0.0-1.0>, \"title\": \"<heading text>\"}}]}}\nReturn an empty list if there are none.\n\nExcerpt:\n{excerpt}",
        instructions = region_instructions(RegionKind::AuxiliaryLists),
        excerpt = region_excerpt(content, RegionKind::AuxiliaryLists),
    )
}

/// Prompt for the in-text citation style.
pub fn citations_prompt(content: &str) -> String {
    format!(
        "Identify the in-text citation style used in this text, if any: author_year like (Smith, 2001), numeric like [12], or superscript like word¹². Give regular expressions that match the citations, and up to three samples copied verbatim.\n\nRespond as JSON:\n{{\"detected\": <bool>, \"style\": \"author_year|numeric|superscript|unknown\" or null, \"patterns\": [\"<regex>\"], \"samples\": [\"<text>\"], \"confidence\": <0.0-1.0>}}\n\nText:\n{}",
        sample_text(content, MAX_EXCERPT_LINES)
    )
}

/// Prompt for footnote markers and notes sections.
pub fn footnotes_prompt(content: &str) -> String {
    format!(
        "Identify footnote or endnote markers in the running text (caret like [^1], superscript like word¹ or <sup>1</sup>, bracketed like word[1], or symbols like * † ‡) and any NOTES sections that collect the note texts.\n\nRespond as JSON:\n{{\"detected\": <bool>, \"marker_style\": \"caret|superscript|bracketed|symbol|unknown\" or null, \"marker_pattern\": \"<regex>\" or null, \"sections\": [{{\"start_line\": <number>, \"end_line\": <number>, \"confidence\": <0.0-1.0>, \"notes\": \"\"}}], \"confidence\": <0.0-1.0>}}\n\nExcerpt:\n{}",
        region_excerpt(content, RegionKind::Notes)
    )
}

/// Prompt for chapter headings. Only short lines are sent, with their numbers.
pub fn chapters_prompt(content: &str) -> String {
    let mut candidates = String::new();
    let mut sent = 0;
    for (i, line) in content.split('\n').enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.chars().count() > 80 {
            continue;
        }
        candidates.push_str(&format!("{:>5}| {}\n", i + 1, trimmed));
        sent += 1;
        if sent >= MAX_EXCERPT_LINES {
            break;
        }
    }
    format!(
        "These are the short lines of a book with their line numbers. Identify the lines that start chapters, and separately any lines that start parts or books grouping several chapters.\n\nRespond as JSON:\n{{\"detected\": <bool>, \"chapters\": [{{\"number\": \"<as written>\" or null, \"title\": \"<title>\", \"start_line\": <number>}}], \"parts\": [...same shape...], \"confidence\": <0.0-1.0>}}\n\nLines:\n{}",
        candidates
    )
}

/// Prompt for bibliographic metadata.
pub fn metadata_prompt(front_matter: &str, sample: Option<&str>) -> String {
    let mut prompt = format!(
        "Extract bibliographic metadata from the opening pages of this book, and classify the content.\n\nRespond as JSON:\n{{\"metadata\": {{\"title\": null, \"subtitle\": null, \"author\": null, \"publisher\": null, \"year\": null, \"isbn\": null, \"language\": null}}, \"content_type_flags\": {{\"fiction\": false, \"academic\": false, \"technical\": false, \"has_code\": false, \"has_math\": false, \"has_tables\": false, \"poetry\": false}}}}\nUse null for anything not stated.\n\nOpening pages:\n{}",
        truncate_chars(front_matter, SAMPLE_CHARS * 2)
    );
    if let Some(sample) = sample {
        prompt.push_str("\n\nSample of the main text:\n");
        prompt.push_str(truncate_chars(sample, SAMPLE_CHARS));
    }
    prompt
}

/// Prompt for the presence-only reconnaissance pass.
pub fn reconnaissance_prompt(content: &str) -> String {
    format!(
        "Survey this book. Report which structural parts are present; do not give positions.\n\nRespond as JSON:\n{{\"front_matter\": <bool>, \"table_of_contents\": <bool>, \"auxiliary_lists\": <bool>, \"index\": <bool>, \"back_matter\": <bool>, \"footnotes\": <bool>, \"citations\": <bool>, \"content_type\": \"fiction|non_fiction|academic|technical|poetry\" or null}}\n\n{}",
        samples(content)
    )
}

/// Prompt for joining hard-wrapped lines inside paragraphs.
pub fn reflow_prompt(chunk: &str, context: &str) -> String {
    let mut prompt = String::from(
        "Rejoin lines that were broken by the page layout so that each paragraph is one line, paragraphs separated by a blank line. Rejoin words hyphenated across line breaks. Keep headings, lists, tables, and block quotes as they are.",
    );
    push_context(&mut prompt, context);
    prompt.push_str("\n\nText:\n");
    prompt.push_str(chunk);
    prompt
}

/// Prompt for splitting overlong paragraphs.
pub fn optimize_prompt(chunk: &str, context: &str, max_words: usize) -> String {
    let mut prompt = format!(
        "Split every paragraph longer than {} words into shorter paragraphs at natural topic or sentence boundaries. Do not change any words. Leave shorter paragraphs untouched.",
        max_words
    );
    push_context(&mut prompt, context);
    prompt.push_str("\n\nText:\n");
    prompt.push_str(chunk);
    prompt
}

fn push_context(prompt: &mut String, context: &str) {
    if !context.trim().is_empty() {
        prompt.push_str("\n\nThe previous part ended with the following words. They are context only; do not repeat them:\n");
        prompt.push_str(context);
    }
}

/// Prompt for the final quality review.
pub fn review_prompt(content: &str) -> String {
    format!(
        "Review these excerpts of a cleaned book. Look for leftover page numbers, running headers, front or back matter, broken paragraphs, encoding damage, or missing text.\n\nRespond as JSON:\n{{\"confidence\": <0.0-1.0>, \"issues\": [\"<issue>\"], \"summary\": \"<one sentence>\"}}\n\n{}",
        samples(content)
    )
}

/// Start, middle, and end samples of the content.
pub fn samples(content: &str) -> String {
    let chars: Vec<char> = content.chars().collect();
    if chars.len() <= SAMPLE_CHARS * 3 {
        return format!("Full text:\n{}", content);
    }
    let middle = chars.len() / 2 - SAMPLE_CHARS / 2;
    let take = |start: usize| chars[start..start + SAMPLE_CHARS].iter().collect::<String>();
    format!(
        "Beginning:\n{}\n\nMiddle:\n{}\n\nEnd:\n{}",
        take(0),
        take(middle),
        take(chars.len() - SAMPLE_CHARS)
    )
}

fn sample_text(content: &str, max_lines: usize) -> String {
    content
        .split('\n')
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_lines_uses_absolute_numbers() {
        let numbered = number_lines(&["a", "b"], 41);
        assert_eq!(numbered, "   41| a\n   42| b\n");
    }

    #[test]
    fn test_tail_excerpt_for_back_matter() {
        let content: Vec<String> = (1..=200).map(|i| format!("line {}", i)).collect();
        let excerpt = region_excerpt(&content.join("\n"), RegionKind::BackMatter);
        assert!(excerpt.starts_with("  101| line 101"));
        assert!(excerpt.ends_with("  200| line 200\n"));
    }

    #[test]
    fn test_head_excerpt_for_short_document() {
        let excerpt = region_excerpt("a\nb\nc", RegionKind::FrontMatter);
        assert_eq!(excerpt.lines().count(), 3);
    }

    #[test]
    fn test_chapters_prompt_skips_long_lines() {
        let long = "x".repeat(200);
        let prompt = chapters_prompt(&format!("Chapter 1\n{}\nChapter 2", long));
        assert!(prompt.contains("    1| Chapter 1"));
        assert!(prompt.contains("    3| Chapter 2"));
        assert!(!prompt.contains(&long));
    }

    #[test]
    fn test_samples_of_long_text() {
        let text = "word ".repeat(5000);
        let sampled = samples(&text);
        assert!(sampled.starts_with("Beginning:"));
        assert!(sampled.contains("Middle:"));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }
}
