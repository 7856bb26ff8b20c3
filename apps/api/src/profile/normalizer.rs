//! Text normalizer — canonicalizes extracted resume text and pulls contact fields
//! out with regular expressions.
//!
//! Never fails on malformed input: garbage in yields fewer populated fields.
//! The normalized text is `None` only when nothing is left after trimming.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::candidate::ContactInfo;
use crate::profile::document::SourceFormat;

const BULLET_GLYPHS: &[char] = &['•', '▪', '◦', '●', '‣', '■', '□', '➢', '►', '·', '*', '–'];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResume {
    pub text: Option<String>,
    pub contact: ContactInfo,
}

pub fn normalize(raw: &str, format: SourceFormat) -> NormalizedResume {
    let text = normalize_text(raw, format);
    let contact = text
        .as_deref()
        .map(extract_contact_info)
        .unwrap_or_default();
    NormalizedResume { text, contact }
}

pub fn normalize_text(raw: &str, format: SourceFormat) -> Option<String> {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    // PDF extraction splits hyphenated words across lines: "devel-\nopment".
    let unified = if format == SourceFormat::Pdf {
        hyphen_break_re().replace_all(&unified, "$1$2").into_owned()
    } else {
        unified
    };

    let cleaned: String = unified.chars().filter_map(clean_char).collect();

    let mut lines: Vec<String> = Vec::new();
    for line in cleaned.lines() {
        let line = normalize_line(line);
        if line.is_empty() && lines.last().map_or(true, |l| l.is_empty()) {
            continue;
        }
        lines.push(line);
    }
    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    let text = lines.join("\n");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn clean_char(c: char) -> Option<char> {
    match c {
        '\n' => Some('\n'),
        '\t' => Some(' '),
        '\u{00A0}' | '\u{2000}'..='\u{200A}' | '\u{202F}' | '\u{205F}' | '\u{3000}' => Some(' '),
        '\u{200B}'..='\u{200D}' | '\u{FEFF}' => None,
        c if c.is_control() => None,
        c => Some(c),
    }
}

fn normalize_line(line: &str) -> String {
    let trimmed = line.trim();
    let (is_bullet, body) = match trimmed.chars().next() {
        Some(first) if BULLET_GLYPHS.contains(&first) => {
            (true, trimmed[first.len_utf8()..].trim_start())
        }
        _ => (false, trimmed),
    };

    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    if is_bullet && !collapsed.is_empty() {
        format!("- {collapsed}")
    } else {
        collapsed
    }
}

/// Extracts the first syntactically plausible match for each contact field.
pub fn extract_contact_info(text: &str) -> ContactInfo {
    ContactInfo {
        email: email_re().find(text).map(|m| m.as_str().to_string()),
        phone: phone_re()
            .find_iter(text)
            .map(|m| m.as_str().trim())
            .find(|candidate| {
                let digits = candidate.chars().filter(char::is_ascii_digit).count();
                (10..=15).contains(&digits)
            })
            .map(String::from),
        linkedin: linkedin_re()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
        github: github_re()
            .captures(text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string()),
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}\b").expect("valid email regex")
    })
}

fn phone_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:\+?\d{1,3}[\s.-]?)?(?:\(\d{2,4}\)|\d{2,4})[\s.-]?\d{3,4}[\s.-]?\d{3,4}")
            .expect("valid phone regex")
    })
}

fn linkedin_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)linkedin\.com/in/([A-Za-z0-9_-]+)").expect("valid linkedin regex")
    })
}

fn github_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)github\.com/([A-Za-z0-9][A-Za-z0-9-]{0,38})").expect("valid github regex")
    })
}

fn hyphen_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\p{L})-[ \t]*\n[ \t]*(\p{Ll})").expect("valid hyphen regex"))
}
