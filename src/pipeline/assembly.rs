//! Final assembly: chapter markers, end marker, metadata header.

use crate::config::{ChapterMarkerStyle, EndMarkerStyle};
use crate::model::{ChapterDetection, ChapterInfo, DocumentMetadata};

const MAX_CHAPTER_LINE_CHARS: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Division {
    Part,
    Chapter,
}

impl Division {
    fn keyword(self) -> &'static str {
        match self {
            Division::Part => "PART",
            Division::Chapter => "CHAPTER",
        }
    }

    fn word(self) -> &'static str {
        match self {
            Division::Part => "Part",
            Division::Chapter => "Chapter",
        }
    }

    fn heading_prefix(self) -> &'static str {
        match self {
            Division::Part => "#",
            Division::Chapter => "##",
        }
    }
}

/// Returns true for a line this module would have written.
pub fn is_marker_line(line: &str) -> bool {
    let trimmed = line.trim();
    ["<!-- CHAPTER", "<!-- PART", "[CHAPTER", "[PART"]
        .iter()
        .any(|p| trimmed.starts_with(p))
}

/// Drops chapters whose line is out of range, blank, or too long to be a heading.
///
/// Service answers are not trusted blindly; the result is sorted and deduplicated.
pub fn validate_chapters(detection: &ChapterDetection, lines: &[&str]) -> ChapterDetection {
    let valid = |c: &ChapterInfo| {
        c.start_line >= 1
            && lines.get(c.start_line - 1).is_some_and(|l| {
                let t = l.trim();
                !t.is_empty() && t.chars().count() <= MAX_CHAPTER_LINE_CHARS
            })
    };
    let clean = |list: &[ChapterInfo]| {
        let mut kept: Vec<ChapterInfo> = list.iter().filter(|c| valid(c)).cloned().collect();
        kept.sort_by_key(|c| c.start_line);
        kept.dedup_by_key(|c| c.start_line);
        kept
    };
    let chapters = clean(&detection.chapters);
    let parts = clean(&detection.parts);
    ChapterDetection {
        detected: !chapters.is_empty(),
        chapters,
        parts,
        confidence: detection.confidence,
    }
}

fn display_title(info: &ChapterInfo, division: Division) -> Option<&str> {
    let title = info.title.trim();
    let label = info
        .number
        .as_deref()
        .map(|n| format!("{} {}", division.word(), n));
    if title.is_empty() || label.as_deref() == Some(title) {
        None
    } else {
        Some(title)
    }
}

fn marker(style: ChapterMarkerStyle, division: Division, info: &ChapterInfo, ordinal: usize) -> String {
    let number = info.number.clone().unwrap_or_else(|| ordinal.to_string());
    let title = display_title(info, division);
    match style {
        ChapterMarkerStyle::HtmlComment => match title {
            Some(t) => format!("<!-- {} {}: {} -->", division.keyword(), ordinal, t),
            None => format!("<!-- {} {} -->", division.keyword(), ordinal),
        },
        ChapterMarkerStyle::Token => match title {
            Some(t) => format!("[{} {}: {}]", division.keyword(), ordinal, t),
            None => format!("[{} {}]", division.keyword(), ordinal),
        },
        ChapterMarkerStyle::Heading => match title {
            Some(t) if info.number.is_some() => {
                format!("{} {} {}: {}", division.heading_prefix(), division.word(), number, t)
            }
            Some(t) => format!("{} {}", division.heading_prefix(), t),
            None => format!("{} {} {}", division.heading_prefix(), division.word(), number),
        },
    }
}

/// Inserts a marker at every chapter and part start.
///
/// Comment and token markers go on their own line before the heading;
/// heading markers replace the heading line. Returns the new content and
/// the number of markers written.
pub fn insert_chapter_markers(
    content: &str,
    detection: &ChapterDetection,
    style: ChapterMarkerStyle,
) -> (String, usize) {
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();

    let mut entries: Vec<(usize, String)> = Vec::new();
    for (list, division) in [(&detection.parts, Division::Part), (&detection.chapters, Division::Chapter)] {
        for (i, info) in list.iter().enumerate() {
            if info.start_line == 0 || info.start_line > lines.len() {
                continue;
            }
            entries.push((info.start_line - 1, marker(style, division, info, i + 1)));
        }
    }
    // Bottom-up so earlier indices stay valid.
    entries.sort_by(|a, b| b.0.cmp(&a.0));
    entries.dedup_by_key(|e| e.0);

    let mut written = 0;
    for (index, text) in entries {
        match style {
            ChapterMarkerStyle::Heading => {
                if lines[index].trim() != text {
                    lines[index] = text;
                    written += 1;
                }
            }
            ChapterMarkerStyle::HtmlComment | ChapterMarkerStyle::Token => {
                let already = index > 0 && is_marker_line(&lines[index - 1]);
                if !already {
                    lines.insert(index, text);
                    written += 1;
                }
            }
        }
    }

    (lines.join("\n"), written)
}

pub fn end_marker(style: EndMarkerStyle) -> Option<&'static str> {
    match style {
        EndMarkerStyle::None => None,
        EndMarkerStyle::HtmlComment => Some("<!-- END OF DOCUMENT -->"),
        EndMarkerStyle::Token => Some("[END]"),
        EndMarkerStyle::Rule => Some("---"),
    }
}

/// Appends the end marker unless the content already ends with it.
pub fn append_end_marker(content: &str, style: EndMarkerStyle) -> String {
    let body = content.trim_end();
    match end_marker(style) {
        Some(marker) if !body.ends_with(marker) => format!("{}\n\n{}\n", body, marker),
        _ => format!("{}\n", body),
    }
}

/// YAML front matter block for the extracted metadata.
pub fn render_frontmatter(metadata: &DocumentMetadata) -> String {
    let mut output = String::from("---\n");
    let fields = [
        ("title", &metadata.title),
        ("subtitle", &metadata.subtitle),
        ("author", &metadata.author),
        ("publisher", &metadata.publisher),
        ("year", &metadata.year),
        ("isbn", &metadata.isbn),
        ("language", &metadata.language),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            output.push_str(&format!("{}: \"{}\"\n", key, escape_yaml(value)));
        }
    }
    output.push_str("---\n\n");
    output
}

/// Prepends front matter unless the content already starts with a block.
pub fn prepend_frontmatter(content: &str, metadata: &DocumentMetadata) -> String {
    if metadata.is_empty() || content.starts_with("---\n") {
        return content.to_string();
    }
    format!("{}{}", render_frontmatter(metadata), content)
}

fn escape_yaml(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(number: Option<&str>, title: &str, start_line: usize) -> ChapterInfo {
        ChapterInfo {
            number: number.map(str::to_string),
            title: title.to_string(),
            start_line,
        }
    }

    fn detection(chapters: Vec<ChapterInfo>) -> ChapterDetection {
        ChapterDetection {
            detected: true,
            chapters,
            parts: Vec::new(),
            confidence: 0.8,
        }
    }

    #[test]
    fn test_comment_markers_before_headings() {
        let content = "Chapter 1\n\ntext\n\nChapter 2: The Storm\n\nmore";
        let d = detection(vec![
            chapter(Some("1"), "Chapter 1", 1),
            chapter(Some("2"), "The Storm", 5),
        ]);
        let (out, written) = insert_chapter_markers(content, &d, ChapterMarkerStyle::HtmlComment);
        assert_eq!(written, 2);
        assert_eq!(
            out,
            "<!-- CHAPTER 1 -->\nChapter 1\n\ntext\n\n<!-- CHAPTER 2: The Storm -->\nChapter 2: The Storm\n\nmore"
        );

        // Running again writes nothing new.
        let again = validate_chapters(
            &detection(vec![chapter(Some("1"), "Chapter 1", 2), chapter(Some("2"), "The Storm", 7)]),
            &out.split('\n').collect::<Vec<_>>(),
        );
        let (same, written) = insert_chapter_markers(&out, &again, ChapterMarkerStyle::HtmlComment);
        assert_eq!(written, 0);
        assert_eq!(same, out);
    }

    #[test]
    fn test_heading_markers_replace_line() {
        let content = "CHAPTER IV\n\nbody";
        let d = detection(vec![chapter(Some("IV"), "Chapter IV", 1)]);
        let (out, _) = insert_chapter_markers(content, &d, ChapterMarkerStyle::Heading);
        assert_eq!(out, "## Chapter IV\n\nbody");
    }

    #[test]
    fn test_token_markers_for_parts() {
        let content = "Part One\n\nChapter 1\n\ntext";
        let d = ChapterDetection {
            detected: true,
            chapters: vec![chapter(Some("1"), "Chapter 1", 3)],
            parts: vec![chapter(Some("One"), "Part One", 1)],
            confidence: 0.8,
        };
        let (out, written) = insert_chapter_markers(content, &d, ChapterMarkerStyle::Token);
        assert_eq!(written, 2);
        assert!(out.starts_with("[PART 1]\nPart One\n\n[CHAPTER 1]\nChapter 1"));
    }

    #[test]
    fn test_validate_drops_bad_positions() {
        let lines = vec!["Chapter 1", "", "A sentence."];
        let d = detection(vec![
            chapter(Some("1"), "One", 1),
            chapter(Some("2"), "Two", 2),
            chapter(Some("3"), "Three", 99),
            chapter(Some("1"), "One again", 1),
        ]);
        let valid = validate_chapters(&d, &lines);
        assert_eq!(valid.chapters.len(), 1);
        assert!(valid.detected);
    }

    #[test]
    fn test_end_marker_is_idempotent() {
        let once = append_end_marker("text\n\n", EndMarkerStyle::HtmlComment);
        assert_eq!(once, "text\n\n<!-- END OF DOCUMENT -->\n");
        assert_eq!(append_end_marker(&once, EndMarkerStyle::HtmlComment), once);
        assert_eq!(append_end_marker("text", EndMarkerStyle::None), "text\n");
    }

    #[test]
    fn test_frontmatter_escapes_values() {
        let metadata = DocumentMetadata {
            title: Some("The \"Quoted\" Book".into()),
            author: Some("A. Writer".into()),
            ..DocumentMetadata::default()
        };
        let yaml = render_frontmatter(&metadata);
        assert_eq!(yaml, "---\ntitle: \"The \\\"Quoted\\\" Book\"\nauthor: \"A. Writer\"\n---\n\n");
        assert_eq!(prepend_frontmatter(&format!("{}body", yaml), &metadata), format!("{}body", yaml));
        assert_eq!(prepend_frontmatter("body", &DocumentMetadata::default()), "body");
    }
}
