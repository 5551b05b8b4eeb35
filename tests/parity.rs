use std::collections::BTreeMap;

use envfile::parse_str;

fn parse_fixture(fixture: &str) -> BTreeMap<String, String> {
    parse_str(fixture).expect("fixture should parse").into_map()
}

#[test]
fn parses_basic_fixture() {
    let map = parse_fixture(include_str!("fixtures/basic.env"));

    assert_eq!(map.len(), 8);
    assert_eq!(map.get("BASIC").expect("BASIC"), "basic");
    assert_eq!(map.get("EMPTY").expect("EMPTY"), "");
    assert_eq!(map.get("INLINE_COMMENT").expect("INLINE_COMMENT"), "value");
    assert_eq!(map.get("QUOTED").expect("QUOTED"), "hello world");
    assert_eq!(map.get("SINGLE_QUOTED").expect("SINGLE_QUOTED"), "single $quoted");
    assert_eq!(map.get("EQUALS").expect("EQUALS"), "a=b=c");
    assert_eq!(map.get("INDENTED").expect("INDENTED"), "indented");
    assert_eq!(map.get("SPACED_KEY").expect("SPACED_KEY"), "spaced");
}

#[test]
fn parses_export_fixture() {
    let map = parse_fixture(include_str!("fixtures/export.env"));

    assert_eq!(map.get("EXPORTED").expect("EXPORTED"), "1");
    assert_eq!(map.get("WITH_SPACES").expect("WITH_SPACES"), "a b c");
    assert_eq!(map.get("EXTRA_SPACE").expect("EXTRA_SPACE"), "ok");
}

#[test]
fn parses_multiline_fixture() {
    let map = parse_fixture(include_str!("fixtures/multiline.env"));

    assert_eq!(
        map.get("MULTI_DOUBLE_QUOTED").expect("MULTI_DOUBLE_QUOTED"),
        "THIS\nIS\nA\nMULTILINE\nSTRING"
    );
    assert_eq!(
        map.get("MULTI_SINGLE_QUOTED").expect("MULTI_SINGLE_QUOTED"),
        "THIS\nIS\nA\nMULTILINE\nSTRING"
    );
    assert_eq!(
        map.get("MULTI_PEM_DOUBLE_QUOTED")
            .expect("MULTI_PEM_DOUBLE_QUOTED"),
        "-----BEGIN PUBLIC KEY-----\nLINE1\nLINE2\n-----END PUBLIC KEY-----"
    );
    assert_eq!(
        map.get("ESCAPED_NEWLINES").expect("ESCAPED_NEWLINES"),
        "first\nsecond"
    );
    assert_eq!(map.get("AFTER").expect("AFTER"), "after_line");
}

#[test]
fn written_fixtures_reload_to_the_same_mapping() {
    for fixture in [
        include_str!("fixtures/basic.env"),
        include_str!("fixtures/export.env"),
        include_str!("fixtures/multiline.env"),
        include_str!("fixtures/service.env"),
    ] {
        let set = parse_str(fixture).expect("fixture should parse");
        let reparsed = parse_str(&set.to_env_string()).expect("written output should parse");
        assert_eq!(reparsed.into_map(), set.into_map());
    }
}
