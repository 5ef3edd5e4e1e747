//! End-to-end properties of the matcher, exercised through the public API
//! only: normalization, author handling, the identifier gate and selection.

use citemap_core::{
    AuthorFormat, BibRecord, MatchConfig, MatchError, Metric, RecordSet, canonicalize,
    comparable, match_records, normalize, parse_author_list, ratio, select,
};

fn old_note(key: &str) -> BibRecord {
    BibRecord::new(key)
        .with_field("year", "2001")
        .with_field("author", "Jane Doe")
        .with_field("title", "A Study")
        .with_author_format(AuthorFormat::Joined)
}

fn configs() -> [MatchConfig; 2] {
    [
        MatchConfig::default(),
        MatchConfig {
            metric: Metric::Ratio,
            ..MatchConfig::default()
        },
    ]
}

#[test]
fn normalize_is_idempotent_on_bib_text() {
    let inputs = [
        "Erd{\\H o}s, Paul and R{\\'e}nyi, Alfr{\\'e}d",
        "{\\\"U}ber die {G}rundlagen",
        "Stra{\\ss}e and \\c{C}elik",
        "J\\nobreak\\ Doe",
        "{Org and Co}",
    ];
    for input in inputs {
        let once = normalize(input);
        assert_eq!(normalize(&once), once);
    }
}

#[test]
fn brace_group_keeps_separator_word() {
    assert_eq!(
        parse_author_list("{Org and Co} and Jane Doe").unwrap(),
        vec!["{Org and Co}".to_string(), "Jane Doe".to_string()]
    );
}

#[test]
fn unclosed_group_is_an_error() {
    assert!(matches!(
        parse_author_list("{Unclosed and Jane Doe"),
        Err(MatchError::UnclosedGroup { .. })
    ));
}

#[test]
fn canonical_names() {
    assert_eq!(canonicalize("Doe, Jane"), "Jane Doe");
    assert_eq!(canonicalize("Jane Doe"), "Jane Doe");
    assert_eq!(canonicalize("{Big Org}"), "Big Org");
}

#[test]
fn ratio_is_symmetric_and_reflexive() {
    let words = ["janedoe", "jdoe", "astudyofthings", "x", ""];
    for a in words {
        for b in words {
            assert_eq!(ratio(a, b), ratio(b, a));
        }
        if !a.is_empty() {
            assert_eq!(ratio(a, a), 1.0);
        }
    }
}

#[test]
fn gate_is_a_hard_filter() {
    let same_doi_other_year = BibRecord::new("n")
        .with_field("doi", "10.1000/x")
        .with_field("year", "1999");
    let old = old_note("o").with_field("doi", "10.1000/x");
    assert!(comparable(&old, &same_doi_other_year));

    let identical_text_other_doi = BibRecord::new("n")
        .with_field("doi", "10.1000/y")
        .with_field("year", "2001")
        .with_field("author", "Jane Doe")
        .with_field("title", "A Study");
    assert!(!comparable(&old, &identical_text_other_doi));
}

#[test]
fn doi_match_selected_over_similar_text() {
    let old = RecordSet::from_records([old_note("doe01").with_field("doi", "10.5555/123")]).unwrap();
    let new = RecordSet::from_records([
        BibRecord::new("Doe2001Study")
            .with_field("year", "2001")
            .with_field("author", "Doe, Jane")
            .with_field("title", "A Study")
            .with_field("doi", "10.5555/999"),
        BibRecord::new("Doe2001Renamed")
            .with_field("year", "2001")
            .with_field("author", "Doe, Jane")
            .with_field("title", "Something Else Entirely")
            .with_field("doi", "10.5555/123"),
    ])
    .unwrap();

    for config in configs() {
        let mapping = select(&old, &new, &config);
        assert_eq!(mapping["doe01"], "Doe2001Renamed");
    }
}

#[test]
fn records_without_candidates_are_absent() {
    let old = RecordSet::from_records([
        old_note("matched"),
        old_note("orphan").with_field("year", "1850"),
    ])
    .unwrap();
    let new = RecordSet::from_records([BibRecord::new("Doe2001")
        .with_field("year", "2001")
        .with_field("author", "Doe, Jane")
        .with_field("title", "A Study")])
    .unwrap();

    for config in configs() {
        let outcome = match_records(&old, &new, &config);
        assert_eq!(outcome.mapping.len(), 1);
        assert!(!outcome.mapping.contains_key("orphan"));
        assert!(outcome.pairs.iter().all(|p| p.score.n_compared() > 0));
    }
}
