use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Toggles for the optional cleaning phases. Whitespace normalization,
/// OCR-corruption detection and duplicate-line removal always run.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanOptions {
    pub remove_page_numbers: bool,
    pub ensure_sentence_endings: bool,
    pub remove_urls: bool,
    pub remove_emails: bool,
    pub remove_special_chars: bool,
    pub fix_ocr: bool,
}

struct Patterns {
    space_runs: Regex,
    blank_lines: Regex,
    standalone_page_number: Regex,
    page_n_of_m: Regex,
    copyright_line: Regex,
    lone_date: Regex,
    url: Regex,
    email: Regex,
    special_chars: Regex,
    letter_digit_letter: Regex,
    garbled_words: Regex,
    leading_junk: Regex,
    sentence_boundary: Regex,
    camel_boundary: Regex,
    digit_then_letter: Regex,
    letter_then_digit: Regex,
    suffix_boundary: Regex,
    punct_cluster: Regex,
    zero_between_letters: Regex,
    o_between_digits: Regex,
    one_between_letters: Regex,
    l_between_digits: Regex,
    five_between_letters: Regex,
    s_between_digits: Regex,
    at_between_letters: Regex,
    misread_word: Regex,
    spaced_email: Regex,
    spaced_phone: Regex,
    spaced_iso_date: Regex,
    spaced_hyphen: Regex,
    spaced_apostrophe: Regex,
}

impl Patterns {
    fn compile() -> Result<Self, regex::Error> {
        Ok(Self {
            space_runs: Regex::new(r" {2,}")?,
            blank_lines: Regex::new(r"\n{3,}")?,
            standalone_page_number: Regex::new(r"^\s*\d{1,4}\s*$")?,
            page_n_of_m: Regex::new(r"(?i)^\s*page\s+\d+(\s+of\s+\d+)?\s*$")?,
            copyright_line: Regex::new(r"(?i)^\s*(©|\(c\)|copyright\b).*$")?,
            lone_date: Regex::new(
                r"(?i)^\s*(\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|[a-z]+\s+\d{1,2},\s*\d{4})\s*$",
            )?,
            url: Regex::new(r"(https?://|www\.)\S+")?,
            email: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")?,
            special_chars: Regex::new(r#"[^A-Za-z0-9\s.,;:!?'"()\[\]{}\-–—/&%$#@+*=<>_]"#)?,
            letter_digit_letter: Regex::new(r"[a-zA-Z][051][a-zA-Z]")?,
            garbled_words: Regex::new(r"(?i)\b(tbe|wbich|witb|bave|aud|tban|fiom|rnore)\b")?,
            leading_junk: Regex::new(r"^[^A-Za-z0-9]+")?,
            sentence_boundary: Regex::new(r"([.!?])([A-Z])")?,
            camel_boundary: Regex::new(r"([a-z])([A-Z])")?,
            digit_then_letter: Regex::new(r"([0-9])([A-Za-z])")?,
            letter_then_digit: Regex::new(r"([A-Za-z])([0-9])")?,
            suffix_boundary: Regex::new(r"(ing|ed|ly|tion|ment|ness|ity|al)([b-df-hj-np-tv-z])")?,
            punct_cluster: Regex::new(r"\.{2,}|!{2,}|\?{2,}|,{2,}|;{2,}|:{2,}|-{2,}")?,
            zero_between_letters: Regex::new(r"([A-Za-z])0([A-Za-z])")?,
            o_between_digits: Regex::new(r"([0-9])[Oo]([0-9])")?,
            one_between_letters: Regex::new(r"([a-z])1([a-z])")?,
            l_between_digits: Regex::new(r"([0-9])[lI]([0-9])")?,
            five_between_letters: Regex::new(r"([a-z])5([a-z])")?,
            s_between_digits: Regex::new(r"([0-9])[sS]([0-9])")?,
            at_between_letters: Regex::new(r"([A-Za-z])@([A-Za-z])")?,
            misread_word: Regex::new(
                r"(?i)\b(tbe|wbich|witb|bave|aud|tban|fiom|rnore|sorne|tirne|cornpany|docurnent)\b",
            )?,
            spaced_email: Regex::new(
                r"([A-Za-z0-9._%+-]+)\s*@\s*([A-Za-z0-9-]+)\s*\.\s*([A-Za-z]{2,})",
            )?,
            spaced_phone: Regex::new(
                r"\b(\d) (\d) (\d) (\d) (\d) (\d) (\d) (\d) (\d) (\d)\b",
            )?,
            spaced_iso_date: Regex::new(r"(\d{4})\s*-\s*(\d{1,2})\s*-\s*(\d{1,2})")?,
            spaced_hyphen: Regex::new(r"([A-Za-z]) +- +([a-z])")?,
            spaced_apostrophe: Regex::new(r"([A-Za-z]) *' *([a-z])\b")?,
        })
    }
}

fn patterns() -> Option<&'static Patterns> {
    static CELL: OnceLock<Option<Patterns>> = OnceLock::new();
    CELL.get_or_init(|| Patterns::compile().ok()).as_ref()
}

/// Normalizes extracted text through a fixed phase order. Pure and
/// fail-open: when the pattern set cannot be built the input is returned
/// unchanged, since noisy text downstream beats losing content.
pub fn clean(text: &str, options: &CleanOptions) -> String {
    let patterns = match patterns() {
        Some(patterns) => patterns,
        None => return text.to_string(),
    };

    let mut cleaned = strip_control_characters(text);
    cleaned = normalize_whitespace(&cleaned, patterns);

    if options.remove_page_numbers {
        cleaned = strip_boilerplate_lines(&cleaned, patterns);
    }

    if options.fix_ocr || detect_ocr_issues(&cleaned) {
        cleaned = repair_ocr_text(&cleaned, patterns);
    }

    if options.remove_urls {
        cleaned = patterns.url.replace_all(&cleaned, " ").to_string();
    }
    if options.remove_emails {
        cleaned = patterns.email.replace_all(&cleaned, " ").to_string();
    }
    if options.remove_special_chars {
        cleaned = patterns.special_chars.replace_all(&cleaned, "").to_string();
    }

    if options.ensure_sentence_endings {
        cleaned = ensure_terminal_punctuation(&cleaned);
    }

    cleaned = remove_duplicate_lines(&cleaned);

    cleaned = patterns.space_runs.replace_all(&cleaned, " ").to_string();
    cleaned = patterns.blank_lines.replace_all(&cleaned, "\n\n").to_string();
    cleaned.trim().to_string()
}

/// Examines the first 500 characters for signs of OCR corruption: an
/// excess of whitespace over content, or known corruption shapes.
pub fn detect_ocr_issues(text: &str) -> bool {
    let patterns = match patterns() {
        Some(patterns) => patterns,
        None => return false,
    };

    let window: String = text.chars().take(500).collect();
    let whitespace = window.chars().filter(|ch| ch.is_whitespace()).count();
    let content = window.chars().filter(|ch| !ch.is_whitespace()).count();

    if content > 0 && whitespace as f64 > content as f64 * 0.4 {
        return true;
    }

    patterns.letter_digit_letter.is_match(&window) || patterns.garbled_words.is_match(&window)
}

fn strip_control_characters(text: &str) -> String {
    text.chars()
        .filter(|ch| {
            !matches!(ch, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{7F}')
                && !matches!(ch, '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{FEFF}')
        })
        .collect()
}

fn normalize_whitespace(text: &str, patterns: &Patterns) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n").replace('\t', " ");
    let collapsed = patterns.space_runs.replace_all(&unified, " ");
    patterns.blank_lines.replace_all(&collapsed, "\n\n").to_string()
}

fn strip_boilerplate_lines(text: &str, patterns: &Patterns) -> String {
    text.lines()
        .filter(|line| {
            !patterns.standalone_page_number.is_match(line)
                && !patterns.page_n_of_m.is_match(line)
                && !patterns.copyright_line.is_match(line)
                && !patterns.lone_date.is_match(line)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn ensure_terminal_punctuation(text: &str) -> String {
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        return text.to_string();
    }

    match trimmed.chars().last() {
        Some('.') | Some('!') | Some('?') | Some('…') => trimmed.to_string(),
        _ => format!("{trimmed}."),
    }
}

/// Duplicate lines are dropped case-insensitively on their
/// whitespace-normalized form. Lines under 10 characters are kept even
/// when repeated; short repeats are usually legitimate content.
fn remove_duplicate_lines(text: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut kept = Vec::new();

    for line in text.lines() {
        let key = line.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
        if key.len() < 10 || seen.insert(key) {
            kept.push(line);
        }
    }

    kept.join("\n")
}

fn repair_ocr_text(text: &str, patterns: &Patterns) -> String {
    let mut repaired = patterns.leading_junk.replace(text, "").to_string();

    let whitespace = repaired.chars().filter(|ch| ch.is_whitespace()).count();
    let content = repaired.chars().filter(|ch| !ch.is_whitespace()).count();
    if content > 0 && whitespace as f64 > content as f64 * 0.6 {
        repaired = rebuild_word_boundaries(&repaired, patterns);
    }

    repaired = patterns
        .punct_cluster
        .replace_all(&repaired, |captures: &Captures| captures[0][..1].to_string())
        .to_string();
    repaired = substitute_glyphs(&repaired, patterns);
    repaired = substitute_misread_words(&repaired, patterns);
    repaired = repair_inline_spacing(&repaired, patterns);

    repaired
}

/// Collapses "e v e r y c h a r a c t e r s e p a r a t e d" text by
/// removing all whitespace and reinserting boundaries heuristically.
fn rebuild_word_boundaries(text: &str, patterns: &Patterns) -> String {
    let mut joined: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();

    joined = patterns.sentence_boundary.replace_all(&joined, "$1 $2").to_string();
    joined = patterns.camel_boundary.replace_all(&joined, "$1 $2").to_string();
    joined = patterns.digit_then_letter.replace_all(&joined, "$1 $2").to_string();
    joined = patterns.letter_then_digit.replace_all(&joined, "$1 $2").to_string();
    joined = patterns.suffix_boundary.replace_all(&joined, "$1 $2").to_string();

    joined
}

fn substitute_glyphs(text: &str, patterns: &Patterns) -> String {
    let mut fixed = text.replace('|', "I").replace('ﬁ', "fi").replace('ﬂ', "fl");
    fixed = fixed.replace('ﬀ', "ff").replace('ﬃ', "ffi").replace('ﬄ', "ffl");

    fixed = patterns.zero_between_letters.replace_all(&fixed, "${1}o${2}").to_string();
    fixed = patterns.o_between_digits.replace_all(&fixed, "${1}0${2}").to_string();
    fixed = patterns.one_between_letters.replace_all(&fixed, "${1}l${2}").to_string();
    fixed = patterns.l_between_digits.replace_all(&fixed, "${1}1${2}").to_string();
    fixed = patterns.five_between_letters.replace_all(&fixed, "${1}s${2}").to_string();
    fixed = patterns.s_between_digits.replace_all(&fixed, "${1}5${2}").to_string();
    fixed = patterns.at_between_letters.replace_all(&fixed, "${1}a${2}").to_string();

    fixed
}

fn substitute_misread_words(text: &str, patterns: &Patterns) -> String {
    patterns
        .misread_word
        .replace_all(text, |captures: &Captures| {
            let matched = &captures[1];
            let replacement = match matched.to_ascii_lowercase().as_str() {
                "tbe" => "the",
                "wbich" => "which",
                "witb" => "with",
                "bave" => "have",
                "aud" => "and",
                "tban" => "than",
                "fiom" => "from",
                "rnore" => "more",
                "sorne" => "some",
                "tirne" => "time",
                "cornpany" => "company",
                "docurnent" => "document",
                other => return other.to_string(),
            };

            if matched.chars().next().is_some_and(|ch| ch.is_uppercase()) {
                let mut chars = replacement.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => replacement.to_string(),
                }
            } else {
                replacement.to_string()
            }
        })
        .to_string()
}

fn repair_inline_spacing(text: &str, patterns: &Patterns) -> String {
    let mut fixed = patterns.spaced_email.replace_all(text, "$1@$2.$3").to_string();
    fixed = patterns
        .spaced_phone
        .replace_all(&fixed, "+91$1$2$3$4$5$6$7$8$9$10")
        .to_string();
    fixed = patterns.spaced_iso_date.replace_all(&fixed, "$1-$2-$3").to_string();
    fixed = patterns.spaced_hyphen.replace_all(&fixed, "$1-$2").to_string();
    fixed = patterns.spaced_apostrophe.replace_all(&fixed, "$1'$2").to_string();
    fixed
}
