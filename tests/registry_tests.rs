mod common;

use std::rc::Rc;

use common::fixtures_dir;
use splice::ast::{ImportName, Span};
use splice::macros::{
    FileSystemLocator, LocateError, MacroKind, MacroRegistry, ModuleLocator,
};
use splice::ErrorType;

#[test]
fn file_system_locator_resolves_modules_and_packages() {
    let locator = FileSystemLocator::new(fixtures_dir());

    let module = locator.locate("demo.macros").unwrap();
    assert!(module.path.ends_with("macros.spl"));
    assert!(module.text.contains("def do_while"));

    let package = locator.locate("demo").unwrap();
    assert!(package.path.ends_with("__init__.spl"));

    assert!(matches!(locator.locate("demo.absent"), Err(LocateError::NotFound(_))));
    assert!(matches!(locator.locate("demo..macros"), Err(LocateError::InvalidName(_))));
    assert!(matches!(locator.locate("9lives"), Err(LocateError::InvalidName(_))));
}

#[test]
fn every_root_is_searched() {
    let locator = FileSystemLocator::new(fixtures_dir().join("demo")).with_root(fixtures_dir());
    let found = locator.locate("macros").unwrap();
    assert!(found.path.ends_with("macros.spl"));
    assert!(locator.locate("demo.macros").is_ok());
}

#[test]
fn discovery_lists_every_source_unit() {
    let modules = FileSystemLocator::new(fixtures_dir())
        .discover_modules()
        .unwrap();
    assert_eq!(
        modules,
        ["demo", "demo.macros", "demo.usage", "errors.arity", "errors.runtime"]
    );
}

#[test]
fn registry_extracts_macros_from_disk() {
    let registry = MacroRegistry::new(Rc::new(FileSystemLocator::new(fixtures_dir())));
    let names = [
        ImportName::new("do_while", Some("repeat".into())),
        ImportName::new("add", None),
    ];
    let table = registry.resolve("demo.macros", &names, Span::default()).unwrap();

    assert_eq!(table.len(), 2);
    let repeat = &table["repeat"];
    assert_eq!(repeat.name(), "do_while");
    assert_eq!(repeat.kind(), MacroKind::Block);
    assert!(repeat.has_body_slot());
    assert_eq!(table["add"].arity(), 3);
    assert_eq!(table["add"].kind(), MacroKind::Expression);
}

#[test]
fn plain_functions_are_not_macros() {
    let registry = MacroRegistry::new(Rc::new(FileSystemLocator::new(fixtures_dir())));
    let all = registry.table("demo.macros", Span::default()).unwrap();
    assert!(!all.contains_key("helper"));
    assert!(all.contains_key("twice"));

    let err = registry
        .resolve("demo.macros", &[ImportName::new("helper", None)], Span::default())
        .unwrap_err();
    assert_eq!(err.error_type(), ErrorType::MacroResolution);
}

#[test]
fn unmemoized_registry_sees_edits() {
    let dir = std::env::temp_dir().join(format!("splice-registry-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("live.spl");
    std::fs::write(&file, "@macro\ndef one() { 1; }").unwrap();

    let registry = MacroRegistry::new(Rc::new(FileSystemLocator::new(&dir)));
    let memo = MacroRegistry::memoized(Rc::new(FileSystemLocator::new(&dir)));
    assert!(registry.table("live", Span::default()).unwrap().contains_key("one"));
    assert!(memo.table("live", Span::default()).unwrap().contains_key("one"));

    std::fs::write(&file, "@macro\ndef two() { 2; }").unwrap();
    assert!(registry.table("live", Span::default()).unwrap().contains_key("two"));
    assert!(memo.table("live", Span::default()).unwrap().contains_key("one"));

    std::fs::remove_dir_all(&dir).unwrap();
}
