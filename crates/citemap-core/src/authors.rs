use crate::MatchError;
use crate::accents::normalize;
use crate::record::{AuthorFormat, BibRecord};

/// Word separating names in a BibTeX author list.
const SEPARATOR: &str = "and";

/// Split a BibTeX author list into individual author entries.
///
/// The list is split on whitespace-delimited `and` tokens that occur outside
/// brace groups. A group opens on a token starting with `{` and stays open
/// until its braces balance again, so `{Barnes and Noble}` is a single entry.
/// Tokens of an entry are re-joined with single spaces.
///
/// Fails with [`MatchError::UnclosedGroup`] if the input ends inside a group.
pub fn parse_author_list(raw: &str) -> Result<Vec<String>, MatchError> {
    let mut authors = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut depth = 0usize;

    for token in raw.split_whitespace() {
        if depth == 0 && token == SEPARATOR {
            flush(&mut authors, &mut current);
            continue;
        }
        depth = brace_depth_after(token, depth);
        current.push(token);
    }

    if depth > 0 {
        return Err(MatchError::UnclosedGroup {
            input: raw.to_string(),
        });
    }
    flush(&mut authors, &mut current);
    Ok(authors)
}

fn flush(authors: &mut Vec<String>, current: &mut Vec<&str>) {
    if !current.is_empty() {
        authors.push(current.join(" "));
        current.clear();
    }
}

/// Brace nesting depth after scanning `token`, starting from `depth`.
/// Stray closing braces never take the depth below zero.
fn brace_depth_after(token: &str, mut depth: usize) -> usize {
    for ch in token.chars() {
        match ch {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// Whether `s` is one brace group spanning the whole string, e.g. `{Big Org}`
/// but not `{Doe}, {Jane}`.
fn is_brace_literal(s: &str) -> bool {
    if !s.starts_with('{') || !s.ends_with('}') {
        return false;
    }
    let mut depth = 0usize;
    for (i, ch) in s.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return i == s.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Convert one author entry into `First Last` display form.
///
/// - A whole-entry brace group (`{World Health Organization}`) is a literal
///   name and is never reordered.
/// - `Last, First` is split on the first comma and reordered.
/// - Anything else is taken to be in `First Last` order already.
///
/// Braces are stripped from the result in every case.
pub fn canonicalize(author: &str) -> String {
    let trimmed = author.trim();

    let ordered = if is_brace_literal(trimmed) {
        trimmed.to_string()
    } else if let Some((last, first)) = trimmed.split_once(',') {
        format!("{} {}", first.trim(), last.trim())
    } else {
        trimmed.to_string()
    };

    ordered.replace(['{', '}'], "").trim().to_string()
}

/// Canonical author names of a record, after accent normalization.
///
/// Returns an empty list when the record has no author field.
pub fn record_authors(record: &BibRecord) -> Result<Vec<String>, MatchError> {
    let Some(raw) = record.value("author") else {
        return Ok(vec![]);
    };
    let raw = normalize(raw);

    let names = match record.author_format {
        AuthorFormat::BibTeX => parse_author_list(&raw)?
            .iter()
            .map(|a| canonicalize(a))
            .collect(),
        AuthorFormat::Joined => raw
            .split(',')
            .map(|a| a.replace(['{', '}'], "").trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
    };
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // parse_author_list
    // =========================================================================

    #[test]
    fn test_parse_simple_list() {
        assert_eq!(
            parse_author_list("Jane Doe and John Smith").unwrap(),
            vec!["Jane Doe", "John Smith"]
        );
    }

    #[test]
    fn test_parse_protected_group_keeps_and() {
        assert_eq!(
            parse_author_list("{Org and Co} and Jane Doe").unwrap(),
            vec!["{Org and Co}", "Jane Doe"]
        );
    }

    #[test]
    fn test_parse_group_closing_with_punctuation() {
        assert_eq!(
            parse_author_list("{Smith and Sons}, Inc. and Doe, Jane").unwrap(),
            vec!["{Smith and Sons}, Inc.", "Doe, Jane"]
        );
        assert_eq!(
            parse_author_list("{Acme and Partners}. and Jane Doe").unwrap(),
            vec!["{Acme and Partners}.", "Jane Doe"]
        );
    }

    #[test]
    fn test_parse_nested_group() {
        assert_eq!(
            parse_author_list("{{Big} and {Small} Labs} and Doe, J.").unwrap(),
            vec!["{{Big} and {Small} Labs}", "Doe, J."]
        );
    }

    #[test]
    fn test_parse_inline_braces_do_not_open_group() {
        assert_eq!(
            parse_author_list("M{\\\"u}ller, Hans and Jane Doe").unwrap(),
            vec!["M{\\\"u}ller, Hans", "Jane Doe"]
        );
    }

    #[test]
    fn test_parse_collapses_whitespace() {
        assert_eq!(
            parse_author_list("  Jane\n   Doe   and\tJohn  Smith ").unwrap(),
            vec!["Jane Doe", "John Smith"]
        );
    }

    #[test]
    fn test_parse_and_inside_word_not_separator() {
        assert_eq!(
            parse_author_list("Alexander Sandberg").unwrap(),
            vec!["Alexander Sandberg"]
        );
    }

    #[test]
    fn test_parse_empty_segments_dropped() {
        assert_eq!(
            parse_author_list("and Jane Doe and and John Smith and").unwrap(),
            vec!["Jane Doe", "John Smith"]
        );
        assert!(parse_author_list("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_unclosed_group_fails() {
        let err = parse_author_list("{Unclosed and Jane Doe").unwrap_err();
        assert_eq!(
            err,
            MatchError::UnclosedGroup {
                input: "{Unclosed and Jane Doe".to_string()
            }
        );
    }

    // =========================================================================
    // canonicalize
    // =========================================================================

    #[test]
    fn test_canonicalize_last_first() {
        assert_eq!(canonicalize("Doe, Jane"), "Jane Doe");
        assert_eq!(canonicalize("Jane Doe"), "Jane Doe");
        assert_eq!(canonicalize("Doe, Jane"), canonicalize("Jane Doe"));
    }

    #[test]
    fn test_canonicalize_literal() {
        assert_eq!(canonicalize("{Big Org}"), "Big Org");
        assert_eq!(canonicalize("{Smith, Barney and Co}"), "Smith, Barney and Co");
    }

    #[test]
    fn test_canonicalize_splits_on_first_comma() {
        assert_eq!(canonicalize("Doe, Jr., Jane"), "Jr., Jane Doe");
    }

    #[test]
    fn test_canonicalize_strips_partial_braces() {
        assert_eq!(canonicalize("{van der} Berg, Anna"), "Anna van der Berg");
        assert_eq!(canonicalize("{Doe}, {Jane}"), "Jane Doe");
    }

    #[test]
    fn test_canonicalize_missing_first() {
        assert_eq!(canonicalize("Doe,"), "Doe");
        assert_eq!(canonicalize("  "), "");
    }

    // =========================================================================
    // record_authors
    // =========================================================================

    #[test]
    fn test_record_authors_bibtex() {
        let r = BibRecord::new("k").with_field("author", "Doe, Jane and {Big Org} and M\\\"uller, Hans");
        assert_eq!(
            record_authors(&r).unwrap(),
            vec!["Jane Doe", "Big Org", "Hans Müller"]
        );
    }

    #[test]
    fn test_record_authors_joined() {
        let r = BibRecord::new("k")
            .with_field("author", "Jane Doe,Hans M\\\"uller")
            .with_author_format(AuthorFormat::Joined);
        assert_eq!(record_authors(&r).unwrap(), vec!["Jane Doe", "Hans Müller"]);
    }

    #[test]
    fn test_record_authors_missing_field() {
        assert!(record_authors(&BibRecord::new("k")).unwrap().is_empty());
    }

    #[test]
    fn test_record_authors_unclosed() {
        let r = BibRecord::new("k").with_field("author", "{Broken and Co");
        assert!(matches!(
            record_authors(&r),
            Err(MatchError::UnclosedGroup { .. })
        ));
    }
}
