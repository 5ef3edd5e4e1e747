use crate::record::BibRecord;

/// Which identity rule decided a comparison, and whether the pair passed.
///
/// Rules are tried in order of decreasing confidence and the first one that
/// applies decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Both records carry a DOI.
    Doi(bool),
    /// Both records carry an ISSN.
    Issn(bool),
    /// Both records carry a year; month is compared too when both have one.
    Year(bool),
    /// Only the old record carries a DOI.
    DoiOnOneSide,
    /// No identifying field to compare; the pair cannot be ruled out.
    Unknown,
}

impl GateDecision {
    pub fn passes(self) -> bool {
        match self {
            GateDecision::Doi(ok) | GateDecision::Issn(ok) | GateDecision::Year(ok) => ok,
            GateDecision::DoiOnOneSide => false,
            GateDecision::Unknown => true,
        }
    }

    /// Short label used in logs and reports.
    pub fn as_str(self) -> &'static str {
        match self {
            GateDecision::Doi(_) => "doi",
            GateDecision::Issn(_) => "issn",
            GateDecision::Year(_) => "year",
            GateDecision::DoiOnOneSide => "doi_one_side",
            GateDecision::Unknown => "unknown",
        }
    }
}

/// Decide whether `old` and `new` could be the same work, using only exact
/// identifier fields. `old` is the vault-side record.
///
/// Identifier strings are compared exactly (case-sensitive) after trimming.
pub fn gate(old: &BibRecord, new: &BibRecord) -> GateDecision {
    if let (Some(a), Some(b)) = (old.value("doi"), new.value("doi")) {
        return GateDecision::Doi(a == b);
    }
    if let (Some(a), Some(b)) = (old.value("issn"), new.value("issn")) {
        return GateDecision::Issn(a == b);
    }
    if let (Some(a), Some(b)) = (old.value("year"), new.value("year")) {
        let same = match (old.value("month"), new.value("month")) {
            (Some(ma), Some(mb)) => a == b && ma == mb,
            _ => a == b,
        };
        return GateDecision::Year(same);
    }
    if old.has("doi") && !new.has("doi") {
        return GateDecision::DoiOnOneSide;
    }
    GateDecision::Unknown
}

/// Strip resolver prefixes so `https://doi.org/10.1/x` and `doi:10.1/x`
/// are stored as `10.1/x`. Loaders apply this before records reach the gate.
pub fn strip_doi_prefix(doi: &str) -> &str {
    const PREFIXES: [&str; 5] = [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ];
    let doi = doi.trim();
    PREFIXES
        .iter()
        .find_map(|p| doi.strip_prefix(p))
        .unwrap_or(doi)
        .trim()
}

/// `true` if the pair survives the identifier gate.
pub fn comparable(old: &BibRecord, new: &BibRecord) -> bool {
    gate(old, new).passes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(fields: &[(&str, &str)]) -> BibRecord {
        fields
            .iter()
            .fold(BibRecord::new("k"), |r, (k, v)| r.with_field(k, *v))
    }

    #[test]
    fn test_same_doi_ignores_year() {
        let a = rec(&[("doi", "10.1/abc"), ("year", "2001")]);
        let b = rec(&[("doi", "10.1/abc"), ("year", "2003")]);
        assert_eq!(gate(&a, &b), GateDecision::Doi(true));
        assert!(comparable(&a, &b));
    }

    #[test]
    fn test_different_doi_rejects_identical_text() {
        let fields = [("year", "2001"), ("author", "Jane Doe"), ("title", "A Study")];
        let a = rec(&fields).with_field("doi", "10.1/abc");
        let b = rec(&fields).with_field("doi", "10.1/xyz");
        assert_eq!(gate(&a, &b), GateDecision::Doi(false));
        assert!(!comparable(&a, &b));
    }

    #[test]
    fn test_doi_case_sensitive() {
        let a = rec(&[("doi", "10.1/ABC")]);
        let b = rec(&[("doi", "10.1/abc")]);
        assert!(!comparable(&a, &b));
    }

    #[test]
    fn test_issn_when_no_shared_doi() {
        let a = rec(&[("issn", "1234-5678"), ("year", "2001")]);
        let b = rec(&[("issn", "1234-5678"), ("year", "1999")]);
        assert_eq!(gate(&a, &b), GateDecision::Issn(true));
        let c = rec(&[("issn", "8765-4321"), ("year", "2001")]);
        assert_eq!(gate(&a, &c), GateDecision::Issn(false));
    }

    #[test]
    fn test_year_and_month() {
        let a = rec(&[("year", "2001"), ("month", "jan")]);
        let b = rec(&[("year", "2001"), ("month", "feb")]);
        assert_eq!(gate(&a, &b), GateDecision::Year(false));

        let c = rec(&[("year", "2001")]);
        assert_eq!(gate(&a, &c), GateDecision::Year(true));

        let d = rec(&[("year", "2002")]);
        assert_eq!(gate(&a, &d), GateDecision::Year(false));
    }

    #[test]
    fn test_doi_on_old_side_only() {
        let a = rec(&[("doi", "10.1/abc")]);
        let b = rec(&[("title", "x")]);
        assert_eq!(gate(&a, &b), GateDecision::DoiOnOneSide);
        assert!(!comparable(&a, &b));
        // Asymmetric: a DOI only on the new side does not reject.
        assert_eq!(gate(&b, &a), GateDecision::Unknown);
        assert!(comparable(&b, &a));
    }

    #[test]
    fn test_year_rule_precedes_doi_presence() {
        let a = rec(&[("doi", "10.1/abc"), ("year", "2001")]);
        let b = rec(&[("year", "2001")]);
        assert_eq!(gate(&a, &b), GateDecision::Year(true));
    }

    #[test]
    fn test_no_identifiers_passes() {
        let a = rec(&[("title", "x")]);
        let b = rec(&[("title", "y")]);
        assert_eq!(gate(&a, &b), GateDecision::Unknown);
        assert!(comparable(&a, &b));
    }

    #[test]
    fn test_strip_doi_prefix() {
        assert_eq!(strip_doi_prefix("https://doi.org/10.1/x"), "10.1/x");
        assert_eq!(strip_doi_prefix("doi:10.1/x "), "10.1/x");
        assert_eq!(strip_doi_prefix("10.1/x"), "10.1/x");
    }

    #[test]
    fn test_blank_identifier_ignored() {
        let a = rec(&[("doi", ""), ("year", "2001")]);
        let b = rec(&[("doi", "10.1/abc"), ("year", "2001")]);
        assert_eq!(gate(&a, &b), GateDecision::Year(true));
    }
}
