use std::{fs, path::Path};

use fnly::core::{
    CollisionPolicy, Dialect, RouteMatcher, RouteTable, ScanOptions, TieBreak,
    route_table::RouteError, translate,
};
use tempfile::TempDir;

fn tree(files: &[&str]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for relative in files {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "export const GET = () => ({});").unwrap();
    }
    dir
}

fn patterns(table: &RouteTable) -> Vec<&str> {
    table.iter().map(|entry| entry.pattern()).collect()
}

#[test]
fn test_translate_dialects() {
    assert_eq!(translate("sub/index.ts", Dialect::Colon), "/sub");
    assert_eq!(translate("sub/[id].ts", Dialect::Colon), "/sub/:id");
    assert_eq!(translate("sub/[id].ts", Dialect::Brace), "/sub/{id}");
    assert_eq!(translate("hello.ts", Dialect::Colon), "/hello");
    assert_eq!(translate("index.ts", Dialect::Colon), "/");
    assert_eq!(translate("index.ts", Dialect::Brace), "/");
}

#[test]
fn test_scan_and_match_example_tree() {
    let dir = tree(&[
        "hello.ts",
        "sub/index.ts",
        "sub/[id].ts",
        "_shared/db.ts",
        "sub/_helpers.ts",
        "notes.md",
    ]);

    let table = RouteTable::scan(dir.path(), &ScanOptions::default()).unwrap();
    assert_eq!(patterns(&table), vec!["/hello", "/sub", "/sub/:id"]);

    let matcher = RouteMatcher::default();

    let found = matcher.find("/sub/42", &table).unwrap();
    assert_eq!(found.entry.pattern(), "/sub/:id");
    assert_eq!(found.params.get("id").map(String::as_str), Some("42"));
    assert_eq!(found.entry.source_file(), dir.path().join("sub/[id].ts"));

    let found = matcher.find("/sub/", &table).unwrap();
    assert_eq!(found.entry.pattern(), "/sub");
    assert!(found.params.is_empty());

    assert!(matcher.find("/sub/42/extra", &table).is_none());
    assert!(matcher.find("/nope", &table).is_none());
    assert!(matcher.find("/", &table).is_none());
}

#[test]
fn test_tie_break_policies() {
    // "[a]" sorts before "static", so the parametrized route is inserted first
    let dir = tree(&["items/[a]/detail.ts", "items/static/[b].ts"]);
    let table = RouteTable::scan(dir.path(), &ScanOptions::default()).unwrap();
    assert_eq!(
        patterns(&table),
        vec!["/items/:a/detail", "/items/static/:b"]
    );

    let first = RouteMatcher::new(TieBreak::InsertionOrder)
        .find("/items/static/detail", &table)
        .unwrap();
    assert_eq!(first.entry.pattern(), "/items/:a/detail");
    assert_eq!(first.params.get("a").map(String::as_str), Some("static"));

    let specific = RouteMatcher::new(TieBreak::Specificity)
        .find("/items/static/detail", &table)
        .unwrap();
    assert_eq!(specific.entry.pattern(), "/items/static/:b");
    assert_eq!(specific.params.get("b").map(String::as_str), Some("detail"));
}

#[test]
fn test_collision_policies() {
    let dir = tree(&["users.ts", "users/index.ts"]);

    let table = RouteTable::scan(dir.path(), &ScanOptions::default()).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(
        table.get("/users").unwrap().source_file(),
        dir.path().join("users.ts")
    );

    let options = ScanOptions {
        collision: CollisionPolicy::Reject,
        ..ScanOptions::default()
    };
    let err = RouteTable::scan(dir.path(), &options).unwrap_err();
    assert!(matches!(err, RouteError::Collision { .. }));
}

#[test]
fn test_duplicate_parameter_files_are_skipped() {
    let dir = tree(&["[id]/[id].ts", "ok/[id].ts"]);
    let table = RouteTable::scan(dir.path(), &ScanOptions::default()).unwrap();
    assert_eq!(patterns(&table), vec!["/ok/:id"]);
}

#[test]
fn test_missing_root() {
    let err = RouteTable::scan(Path::new("/definitely/not/here"), &ScanOptions::default())
        .unwrap_err();
    assert!(matches!(err, RouteError::MissingRoot(_)));
}
