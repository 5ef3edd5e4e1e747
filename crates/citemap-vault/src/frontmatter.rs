use std::collections::BTreeMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use citemap_core::MatchError;

use crate::VaultError;

/// Header fields of a note, in the order-independent form matching needs.
pub type FrontMatter = BTreeMap<String, String>;

const FENCE: &str = "---";

static HEADER_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\w+): (.*)").unwrap());

/// Read the `---`-fenced header at the top of a note file.
pub fn read_front_matter(path: &Path) -> Result<FrontMatter, VaultError> {
    let content = std::fs::read_to_string(path).map_err(|source| VaultError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_front_matter(path, &content)?)
}

/// Parse a note header from `content`. `file` is only used for error context.
///
/// The opening fence is line 0. Every line up to the closing fence must be a
/// `name: value` pair; running out of lines first reports an empty line at
/// the position where the fence was expected. A repeated name keeps the
/// last value.
pub fn parse_front_matter(file: &Path, content: &str) -> Result<FrontMatter, MatchError> {
    let mut lines = content.lines().map(|l| l.strip_suffix('\r').unwrap_or(l));

    let first = lines.next().unwrap_or_default();
    if first != FENCE {
        return Err(structural(file, first, FENCE, 0));
    }

    let mut fields = FrontMatter::new();
    let mut line_number = 0;
    loop {
        line_number += 1;
        let line = lines.next().unwrap_or_default();
        if line == FENCE {
            return Ok(fields);
        }
        let Some(caps) = HEADER_LINE_RE.captures(line) else {
            return Err(structural(file, line, HEADER_LINE_RE.as_str(), line_number));
        };
        fields.insert(caps[1].to_string(), caps[2].to_string());
    }
}

fn structural(file: &Path, line: &str, expected: &str, line_number: usize) -> MatchError {
    MatchError::Structural {
        file: file.to_path_buf(),
        line: line.to_string(),
        expected: expected.to_string(),
        line_number,
    }
}
