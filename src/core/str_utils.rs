use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};

pub const DEFAULT_BOT_SUFFIX: &str =
    "\n\n*This is an automated message generated by [Sweep AI](https://sweep.dev).*";

pub const FASTER_MODEL_MESSAGE: &str = "\
You ran out of the free tier GPT-4 tickets! Here are your options:
- You can get a free trial of Sweep Pro to get unlimited Sweep issues [here](https://buy.stripe.com/00g5npeT71H2gzCfZ8).
- You can run Sweep with your own Anthropic and OpenAI API keys [here](https://docs.sweep.dev/cli).
- You can book a chat with us set up Sweep Enterprise [here](https://calendly.com/d/2n5-3qf-9xy/user-interview).
";

#[allow(dead_code)]
const COLLAPSIBLE_TEMPLATE: &str = "\n<details {opened}>\n<summary>{summary}</summary>\n\n{body}\n</details>\n";

const CHECKBOX_TEMPLATE: &str = "- [{check}] {filename}\n{instructions}\n";

// GitHub rejects comment bodies over 65536 characters.
const GITHUB_BODY_LIMIT: usize = 65_000;

#[allow(dead_code)]
static STRIP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[Ss]weep\s?(\([Ss]low\))?(\([Mm]ap\))?(\([Ff]ast\))?\s?:").unwrap()
});
#[allow(dead_code)]
static SLOW_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Ss]weep\s?\([Ss]low\)").unwrap());
#[allow(dead_code)]
static MAP_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Ss]weep\s?\([Mm]ap\)").unwrap());
#[allow(dead_code)]
static SUBISSUES_FLAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Ss]weep\s?\([Ss]ubissues?\)").unwrap());
#[allow(dead_code)]
static SANDBOX_FLAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[Ss]weep\s?\([Ss]andbox?\)").unwrap());
#[allow(dead_code)]
static FAST_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Ss]weep\s?\([Ff]ast\)").unwrap());
#[allow(dead_code)]
static LINT_FLAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[Ss]weep\s?\([Ll]int\)").unwrap());

#[allow(dead_code)]
static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1b\[.*?[@-~]").unwrap());
#[allow(dead_code)]
static NEWLINE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{2,}").unwrap());
#[allow(dead_code)]
static CARRIAGE_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r{2,}").unwrap());
#[allow(dead_code)]
static NON_BRANCH_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9_]").unwrap());

/// Resolves the signature appended to every bot comment. An explicit value wins,
/// then the `BOT_SUFFIX` environment variable, then the default.
pub fn resolve_bot_suffix(configured: Option<&str>) -> String {
    let raw = configured
        .map(str::to_string)
        .or_else(|| std::env::var("BOT_SUFFIX").ok())
        .unwrap_or_else(|| DEFAULT_BOT_SUFFIX.to_string());
    raw.replace("\\n", "\n")
}

#[allow(dead_code)]
pub fn ordinal(n: i64) -> String {
    let magnitude = n.unsigned_abs();
    let suffix = if (11..=13).contains(&(magnitude % 100)) {
        "th"
    } else {
        match magnitude % 10 {
            1 => "st",
            2 => "nd",
            3 => "rd",
            _ => "th",
        }
    };
    format!("{}{}", n, suffix)
}

#[allow(dead_code)]
pub fn format_sandbox_success(success: bool) -> &'static str {
    if success {
        "✓"
    } else {
        "❌ (`Sandbox Failed`)"
    }
}

#[allow(dead_code)]
pub fn create_collapsible(summary: &str, body: &str, opened: bool) -> String {
    COLLAPSIBLE_TEMPLATE
        .replace("{opened}", if opened { "open" } else { "" })
        .replace("{summary}", summary)
        .replace("{body}", body)
}

pub fn create_checkbox(title: &str, body: &str, checked: bool) -> String {
    CHECKBOX_TEMPLATE
        .replace("{check}", if checked { "X" } else { " " })
        .replace("{filename}", title)
        .replace("{instructions}", body)
}

pub fn inline_code(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!("<code>{}</code>", text)
}

#[allow(dead_code)]
pub fn code_block(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!("<pre>{}</pre>", text)
}

pub fn blockquote(text: &str) -> String {
    let text = text.replace("\n•", "<br/>•");
    if text.is_empty() {
        return String::new();
    }
    format!("<blockquote>{}\n</blockquote>", text)
}

#[allow(dead_code)]
pub fn bold(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    format!("<b>{}</b>", text)
}

/// Result of removing a leading `sweep(...):` command prefix from a comment.
#[allow(dead_code)]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StrippedCommand {
    pub text: String,
    pub slow: bool,
    pub map: bool,
    pub subissues: bool,
    pub sandbox: bool,
    pub fast: bool,
    pub lint: bool,
}

#[allow(dead_code)]
pub fn strip_sweep(text: &str) -> StrippedCommand {
    StrippedCommand {
        text: STRIP_PREFIX.replace(text, "").trim_start().to_string(),
        slow: SLOW_FLAG.is_match(text),
        map: MAP_FLAG.is_match(text),
        subissues: SUBISSUES_FLAG.is_match(text),
        sandbox: SANDBOX_FLAG.is_match(text),
        fast: FAST_FLAG.is_match(text),
        lint: LINT_FLAG.is_match(text),
    }
}

#[allow(dead_code)]
pub fn clean_logs(logs: &str) -> String {
    let escaped = logs.replace("```", "\\`\\`\\`");
    let cleaned = ANSI_ESCAPE.replace_all(&escaped, "");
    let cleaned = NEWLINE_RUNS.replace_all(&cleaned, "\n");
    let cleaned = CARRIAGE_RUNS.replace_all(&cleaned, "\n");
    let cleaned = cleaned.trim_matches('\n');
    if cleaned.is_empty() {
        "(nothing was outputted)".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Splits after every line boundary (`\n`, `\r\n`, a lone `\r`, and the
/// Unicode separators), keeping each terminator on its line.
fn split_lines_keepends(text: &str) -> Vec<&str> {
    let mut lines = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();
    while let Some((index, c)) = chars.next() {
        let end = match c {
            '\r' => match chars.peek() {
                Some(&(next, '\n')) => {
                    chars.next();
                    next + 1
                }
                _ => index + 1,
            },
            '\n' | '\x0b' | '\x0c' | '\x1c' | '\x1d' | '\x1e' | '\u{85}' | '\u{2028}'
            | '\u{2029}' => index + c.len_utf8(),
            _ => continue,
        };
        lines.push(&text[start..end]);
        start = end;
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

/// Lines `[start, end)` of `text`, clamped. Each kept line keeps its own
/// terminator and is joined with another `\n`.
#[allow(dead_code)]
pub fn extract_lines(text: &str, start: i64, end: i64) -> String {
    let lines = split_lines_keepends(text);
    let start = start.max(0) as usize;
    let end = end.clamp(0, lines.len() as i64) as usize;
    if start >= end {
        return String::new();
    }
    lines[start..end].join("\n")
}

pub fn add_line_numbers(text: &str, start: usize) -> String {
    split_lines_keepends(text)
        .into_iter()
        .enumerate()
        .map(|(i, line)| format!("{} | {}", start + i, line))
        .collect()
}

#[allow(dead_code)]
pub fn to_branch_name(s: &str, max_length: usize) -> String {
    let lowered = s.trim().to_lowercase().replace(' ', "_");
    let branch_name = NON_BRANCH_CHARS.replace_all(&lowered, "");
    branch_name.chars().take(max_length).collect()
}

#[allow(dead_code)]
pub fn get_hash() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    let digest = Sha256::digest(now.to_string().as_bytes());
    let hex = format!("{:x}", digest);
    hex[..10].to_string()
}

/// Byte offsets of every occurrence of `substring`, overlapping ones included.
#[allow(dead_code)]
pub fn get_all_indices_of_substring(content: &str, substring: &str) -> Vec<usize> {
    let mut indices = Vec::new();
    let mut start = 0;
    while let Some(rest) = content.get(start..) {
        let Some(offset) = rest.find(substring) else {
            break;
        };
        let index = start + offset;
        indices.push(index);
        start = index
            + content[index..]
                .chars()
                .next()
                .map(char::len_utf8)
                .unwrap_or(1);
    }
    indices
}

fn xml_field_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Serializes every field of `object` into `<field>\nvalue\n</field>` blocks,
/// in declaration order. Values are not escaped.
pub fn object_to_xml<T: Serialize>(object: &T, object_name: &str) -> Result<String> {
    let value = serde_json::to_value(object)?;
    let Value::Object(fields) = value else {
        anyhow::bail!("{} does not serialize to a struct", object_name);
    };
    let fields_strings = fields
        .iter()
        .map(|(name, value)| format!("<{}>\n{}\n</{}>", name, xml_field_value(value), name))
        .collect::<Vec<_>>()
        .join("\n");
    Ok(format!(
        "<{}>\n{}\n</{}>",
        object_name, fields_strings, object_name
    ))
}

pub fn objects_to_xml<T: Serialize>(
    objects: &[T],
    object_name: &str,
    outer_field_name: Option<&str>,
) -> Result<String> {
    let mut objects_string = String::new();
    for object in objects {
        objects_string.push_str(&object_to_xml(object, object_name)?);
        objects_string.push('\n');
    }
    let outer = match outer_field_name {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{}s", object_name),
    };
    Ok(format!("<{}>\n{}</{}>", outer, objects_string, outer))
}

pub fn extract_xml_tag(string: &str, tag: &str, include_closing_tag: bool) -> Option<String> {
    let tag = regex::escape(tag);
    let pattern = if include_closing_tag {
        format!(r"(?s)<{tag}>(.*?)</{tag}>")
    } else {
        format!(r"(?s)<{tag}>(.*?)(\z|</{tag}>)")
    };
    let re = Regex::new(&pattern).ok()?;
    let captures = re.captures(string)?;
    captures
        .get(1)
        .map(|m| m.as_str().trim_matches('\n').to_string())
}

/// Keeps a comment body under GitHub's size limit.
pub fn sanitize_for_github(text: &str) -> String {
    if text.chars().count() <= GITHUB_BODY_LIMIT {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(GITHUB_BODY_LIMIT).collect();
    truncated.push_str("\n\n... (truncated)");
    truncated
}
