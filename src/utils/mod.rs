use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

use crate::domain::TaskId;

const TASK_ID_PREFIX: &str = "task_";

static EXTENDED_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\*\s*=\s*[^']*'[^']*'([^;\s]+)"#).ok());
static PLAIN_FILENAME: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r#"(?i)filename\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).ok());

/// Mint a new task id: fixed prefix plus 128 random bits.
pub fn generate_task_id() -> TaskId {
    TaskId::new(format!("{}{}", TASK_ID_PREFIX, Uuid::new_v4().simple()))
}

/// Sanitize filename to remove invalid characters
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            _ => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Extract the filename from a `Content-Disposition` header value.
/// The RFC 5987 `filename*` form wins over the plain `filename` parameter.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    if let Some(caps) = EXTENDED_FILENAME.as_ref()?.captures(header) {
        let escaped = caps[1].replace('+', "%2B");
        if let Some((name, _)) = url::form_urlencoded::parse(escaped.as_bytes()).next() {
            if !name.is_empty() {
                return Some(sanitize_filename(&name));
            }
        }
    }

    let caps = PLAIN_FILENAME.as_ref()?.captures(header)?;
    let name = caps.get(1).or_else(|| caps.get(2))?.as_str();
    let name = sanitize_filename(name);
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}
