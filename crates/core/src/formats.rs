use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

/// Recursion cap for JSON flattening; deeper content is replaced with a
/// placeholder rather than followed.
const MAX_JSON_DEPTH: usize = 6;

const NESTED_PLACEHOLDER: &str = "[nested content]";

/// Renders a parsed JSON value as readable prose: scalars stringify,
/// arrays join with `. `, objects render as `key: value` pairs.
pub fn flatten_json(value: &Value) -> String {
    flatten_value(value, 0)
}

fn flatten_value(value: &Value, depth: usize) -> String {
    if depth > MAX_JSON_DEPTH {
        return NESTED_PLACEHOLDER.to_string();
    }

    match value {
        Value::Null => String::new(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| flatten_value(item, depth + 1))
            .filter(|rendered| !rendered.is_empty())
            .collect::<Vec<_>>()
            .join(". "),
        Value::Object(fields) => fields
            .iter()
            .map(|(key, item)| {
                let rendered = flatten_value(item, depth + 1);
                if rendered.is_empty() {
                    key.clone()
                } else {
                    format!("{key}: {rendered}")
                }
            })
            .collect::<Vec<_>>()
            .join(". "),
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutlineHeader {
    pub level: usize,
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    Bullet,
    Numbered,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OutlineListItem {
    pub kind: ListKind,
    pub text: String,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct CodeBlockSpan {
    pub start_line: usize,
    pub end_line: usize,
}

/// Structural sketch of a markdown file. Captured into extraction
/// metadata only; the downstream text never includes it.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MarkdownOutline {
    pub headers: Vec<OutlineHeader>,
    pub list_items: Vec<OutlineListItem>,
    pub table_rows: usize,
    pub code_blocks: Vec<CodeBlockSpan>,
}

struct MarkdownPatterns {
    header: Regex,
    bullet_item: Regex,
    numbered_item: Regex,
    image: Regex,
    link: Regex,
    emphasis: Regex,
    inline_code: Regex,
    blockquote: Regex,
    horizontal_rule: Regex,
}

fn markdown_patterns() -> Option<&'static MarkdownPatterns> {
    static CELL: OnceLock<Option<MarkdownPatterns>> = OnceLock::new();
    CELL.get_or_init(|| {
        let compile = || -> Result<MarkdownPatterns, regex::Error> {
            Ok(MarkdownPatterns {
                header: Regex::new(r"^(#{1,6})\s+(.*)$")?,
                bullet_item: Regex::new(r"^\s*[-*+]\s+(.*)$")?,
                numbered_item: Regex::new(r"^\s*\d+[.)]\s+(.*)$")?,
                image: Regex::new(r"!\[([^\]]*)\]\([^)]*\)")?,
                link: Regex::new(r"\[([^\]]+)\]\([^)]*\)")?,
                emphasis: Regex::new(r"(\*{1,3}|_{1,3})([^*_]+)(\*{1,3}|_{1,3})")?,
                inline_code: Regex::new(r"`([^`]*)`")?,
                blockquote: Regex::new(r"^\s*>\s?")?,
                horizontal_rule: Regex::new(r"^\s*(?:(?:-\s*){3,}|(?:\*\s*){3,}|(?:_\s*){3,})$")?,
            })
        };
        compile().ok()
    })
    .as_ref()
}

/// Strips markdown markers while preserving readable text (link and
/// image alt text survive) and collects a structural outline.
pub fn strip_markdown(text: &str) -> (String, MarkdownOutline) {
    let patterns = match markdown_patterns() {
        Some(patterns) => patterns,
        None => return (text.to_string(), MarkdownOutline::default()),
    };

    let mut outline = MarkdownOutline::default();
    let mut stripped_lines = Vec::new();
    let mut fence_start: Option<usize> = None;

    for (line_number, line) in text.lines().enumerate() {
        if line.trim_start().starts_with("```") {
            match fence_start.take() {
                Some(start_line) => outline.code_blocks.push(CodeBlockSpan {
                    start_line,
                    end_line: line_number,
                }),
                None => fence_start = Some(line_number),
            }
            continue;
        }
        if fence_start.is_some() {
            continue;
        }

        if patterns.horizontal_rule.is_match(line) {
            continue;
        }

        if let Some(captures) = patterns.header.captures(line) {
            outline.headers.push(OutlineHeader {
                level: captures[1].len(),
                text: captures[2].trim().to_string(),
                line: line_number,
            });
        } else if let Some(captures) = patterns.bullet_item.captures(line) {
            outline.list_items.push(OutlineListItem {
                kind: ListKind::Bullet,
                text: captures[1].trim().to_string(),
                line: line_number,
            });
        } else if let Some(captures) = patterns.numbered_item.captures(line) {
            outline.list_items.push(OutlineListItem {
                kind: ListKind::Numbered,
                text: captures[1].trim().to_string(),
                line: line_number,
            });
        } else if line.trim_start().starts_with('|') && line.trim_end().ends_with('|') {
            outline.table_rows += 1;
        }

        let mut cleaned_line = line.to_string();
        if let Some(captures) = patterns.header.captures(&cleaned_line) {
            cleaned_line = captures[2].to_string();
        }
        cleaned_line = patterns.blockquote.replace(&cleaned_line, "").to_string();
        cleaned_line = patterns.image.replace_all(&cleaned_line, "$1").to_string();
        cleaned_line = patterns.link.replace_all(&cleaned_line, "$1").to_string();
        cleaned_line = patterns.inline_code.replace_all(&cleaned_line, "$1").to_string();
        cleaned_line = patterns.emphasis.replace_all(&cleaned_line, "$2").to_string();

        stripped_lines.push(cleaned_line);
    }

    // An unterminated fence swallows the rest of the file; record it so
    // the outline still reflects what was skipped.
    if let Some(start_line) = fence_start {
        outline.code_blocks.push(CodeBlockSpan {
            start_line,
            end_line: text.lines().count().saturating_sub(1),
        });
    }

    (stripped_lines.join("\n"), outline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_flatten_directly() {
        assert_eq!(flatten_json(&json!("hello")), "hello");
        assert_eq!(flatten_json(&json!(42)), "42");
        assert_eq!(flatten_json(&json!(true)), "true");
    }

    #[test]
    fn objects_flatten_to_key_value_sentences() {
        let value = json!({"title": "Annual Report", "year": 2023});
        assert_eq!(flatten_json(&value), "title: Annual Report. year: 2023");
    }

    #[test]
    fn arrays_join_with_sentence_breaks() {
        let value = json!(["first item", "second item"]);
        assert_eq!(flatten_json(&value), "first item. second item");
    }

    #[test]
    fn deep_nesting_is_replaced_with_placeholder() {
        let mut value = json!("leaf");
        for _ in 0..12 {
            value = json!({ "inner": value });
        }
        let flattened = flatten_json(&value);
        assert!(flattened.contains(NESTED_PLACEHOLDER));
        assert!(!flattened.contains("leaf"));
    }

    #[test]
    fn markdown_markers_are_stripped_but_text_survives() {
        let input = "# Title\n\nSome **bold** text with a [link](https://example.com) and `code`.\n\n> quoted line\n\n---\n";
        let (stripped, outline) = strip_markdown(input);

        assert!(stripped.contains("Title"));
        assert!(stripped.contains("bold"));
        assert!(stripped.contains("link"));
        assert!(stripped.contains("code"));
        assert!(stripped.contains("quoted line"));
        assert!(!stripped.contains('#'));
        assert!(!stripped.contains("**"));
        assert!(!stripped.contains("https://example.com"));
        assert!(!stripped.contains("---"));

        assert_eq!(outline.headers.len(), 1);
        assert_eq!(outline.headers[0].level, 1);
        assert_eq!(outline.headers[0].text, "Title");
    }

    #[test]
    fn code_fences_are_skipped_and_recorded() {
        let input = "intro\n```\nlet hidden = 1;\n```\noutro";
        let (stripped, outline) = strip_markdown(input);

        assert!(!stripped.contains("hidden"));
        assert!(stripped.contains("intro"));
        assert!(stripped.contains("outro"));
        assert_eq!(outline.code_blocks.len(), 1);
        assert_eq!(outline.code_blocks[0].start_line, 1);
        assert_eq!(outline.code_blocks[0].end_line, 3);
    }

    #[test]
    fn lists_and_tables_are_outlined() {
        let input = "- alpha\n- beta\n1. gamma\n| a | b |\n| - | - |";
        let (_, outline) = strip_markdown(input);

        assert_eq!(outline.list_items.len(), 3);
        assert_eq!(outline.list_items[0].kind, ListKind::Bullet);
        assert_eq!(outline.list_items[2].kind, ListKind::Numbered);
        assert_eq!(outline.table_rows, 2);
    }

    #[test]
    fn image_alt_text_is_preserved() {
        let (stripped, _) = strip_markdown("See ![diagram of the pipeline](img/pipe.png) above.");
        assert!(stripped.contains("diagram of the pipeline"));
        assert!(!stripped.contains("img/pipe.png"));
    }
}
