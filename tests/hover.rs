//! Hover and definition answered by the engine, without the protocol layer.

mod helper;

use rstest::rstest;
use tokio_util::sync::CancellationToken;

use go_lsp::syntax::Position;
use go_lsp::workspace::EngineError;

use helper::{Fixture, fake_goroot, locate};

const BASIC_A: &str = "package p; func A() { A() }";
const BASIC_B: &str = "package p; func B() { A() }";
const DETAILED: &str = "package p; type T struct { F string }";
const XTEST_A: &str = "package p; var A int";
const XTEST_IN_PACKAGE: &str = "package p; var X = A";
const XTEST_EXTERNAL: &str = r#"package p_test; import "test/pkg"; var X = p.A"#;
const SUBDIR_B: &str = r#"package d2; import "test/pkg"; func B() { p.A(); B() }"#;
const MULTI_P: &str = "package p; func A(x int) { A(x) }";
const MULTI_Q: &str = "package q; func A() { A() }";
const UNICODE: &str = "package p; var s = \"h\u{e9}llo \u{1F600}\"; var Z = s";

async fn hover_text(fixture: &Fixture, file: &str, at: Position) -> Option<String> {
    let workspace = fixture.workspace();
    workspace
        .hover(
            &workspace.snapshot(),
            &fixture.path(file),
            at,
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .map(|result| result.flatten())
}

#[rstest]
#[case::package_clause(&[("a.go", BASIC_A), ("b.go", BASIC_B)], "a.go", Position::new(0, 8), "package p")]
#[case::func_declaration(&[("a.go", BASIC_A), ("b.go", BASIC_B)], "a.go", Position::new(0, 16), "func A()")]
#[case::func_call(&[("a.go", BASIC_A), ("b.go", BASIC_B)], "a.go", Position::new(0, 22), "func A()")]
#[case::other_file_declaration(&[("a.go", BASIC_A), ("b.go", BASIC_B)], "b.go", Position::new(0, 16), "func B()")]
#[case::call_across_files(&[("a.go", BASIC_A), ("b.go", BASIC_B)], "b.go", Position::new(0, 22), "func A()")]
#[case::struct_field(&[("a.go", DETAILED)], "a.go", Position::new(0, 27), "struct field F string")]
#[case::struct_type(&[("a.go", DETAILED)], "a.go", Position::new(0, 16), "type T struct; struct {\n    F string\n}")]
#[case::production_var(&[("a.go", XTEST_A), ("a_test.go", XTEST_IN_PACKAGE), ("x_test.go", XTEST_EXTERNAL)], "a.go", Position::new(0, 15), "var A int")]
#[case::in_package_test_var(&[("a.go", XTEST_A), ("a_test.go", XTEST_IN_PACKAGE), ("x_test.go", XTEST_EXTERNAL)], "a_test.go", Position::new(0, 15), "var X int")]
#[case::in_package_test_use(&[("a.go", XTEST_A), ("a_test.go", XTEST_IN_PACKAGE), ("x_test.go", XTEST_EXTERNAL)], "a_test.go", Position::new(0, 19), "var A int")]
#[case::external_test_var(&[("a.go", XTEST_A), ("a_test.go", XTEST_IN_PACKAGE), ("x_test.go", XTEST_EXTERNAL)], "x_test.go", Position::new(0, 39), "var X int")]
#[case::external_test_import(&[("a.go", XTEST_A), ("a_test.go", XTEST_IN_PACKAGE), ("x_test.go", XTEST_EXTERNAL)], "x_test.go", Position::new(0, 45), "var A int")]
#[case::test_uses_sibling_file(&[("b.go", "package p; var B int"), ("a_test.go", "package p; var X = B")], "a_test.go", locate("package p; var X = B", "= |B"), "var B int")]
#[case::root_from_subdirectory(&[("a.go", BASIC_A), ("d2/b.go", SUBDIR_B)], "d2/b.go", locate(SUBDIR_B, "func |B"), "func B()")]
#[case::imported_from_subdirectory(&[("a.go", BASIC_A), ("d2/b.go", SUBDIR_B)], "d2/b.go", locate(SUBDIR_B, "p.|A"), "func A()")]
#[case::recursive_call_in_subdirectory(&[("a.go", BASIC_A), ("d2/b.go", SUBDIR_B)], "d2/b.go", locate(SUBDIR_B, "; |B()"), "func B()")]
#[case::import_name(&[("a.go", BASIC_A), ("d2/b.go", SUBDIR_B)], "d2/b.go", locate(SUBDIR_B, "|p.A"), "package p")]
#[case::first_package_in_dir(&[("a.go", MULTI_P), ("b.go", MULTI_Q)], "a.go", locate(MULTI_P, "{ |A"), "func A(x int)")]
#[case::second_package_in_dir(&[("a.go", MULTI_P), ("b.go", MULTI_Q)], "b.go", locate(MULTI_Q, "{ |A"), "func A()")]
#[case::utf16_columns(&[("a.go", UNICODE)], "a.go", locate(UNICODE, "= |s"), "var s string")]
#[tokio::test]
async fn hover_describes_the_bound_symbol(
    #[case] files: &[(&str, &str)],
    #[case] file: &str,
    #[case] at: Position,
    #[case] expected: &str,
) {
    let fixture = Fixture::new(files);
    assert_eq!(hover_text(&fixture, file, at).await.as_deref(), Some(expected));
}

#[tokio::test]
async fn hover_on_stdlib_function_includes_doc() {
    let goroot = fake_goroot();
    let main = r#"package p; import "fmt"; func A() { fmt.Println() }"#;
    let fixture = Fixture::new(&[("a.go", main)]);
    let workspace = fixture.workspace_with_goroot(goroot.path());

    let result = workspace
        .hover(
            &workspace.snapshot(),
            &fixture.path("a.go"),
            Position::new(0, 40),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(
        result.flatten(),
        "func Println(a ...interface{}) (n int, err error); Println formats using the default formats for its operands and writes to standard output. Spaces are always added between operands and a newline is appended. It returns the number of bytes written and any write error encountered. \n\n"
    );
    assert_eq!(
        result.range.start,
        locate(main, ".|Println"),
    );
}

#[tokio::test]
async fn hover_off_identifiers_is_empty() {
    let fixture = Fixture::new(&[("a.go", BASIC_A)]);
    assert_eq!(hover_text(&fixture, "a.go", Position::new(0, 19)).await, None);
}

#[tokio::test]
async fn positions_outside_the_file_are_rejected() {
    let fixture = Fixture::new(&[("a.go", BASIC_A)]);
    let workspace = fixture.workspace();

    let result = workspace
        .hover(
            &workspace.snapshot(),
            &fixture.path("a.go"),
            Position::new(7, 0),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(EngineError::Position(_))));

    let result = workspace
        .hover(
            &workspace.snapshot(),
            &fixture.path("a.go"),
            Position::new(0, 500),
            &CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(EngineError::Position(_))));
}

#[tokio::test]
async fn definition_points_at_the_declaring_identifier() {
    let fixture = Fixture::new(&[("a.go", BASIC_A), ("d2/b.go", SUBDIR_B)]);
    let workspace = fixture.workspace();

    let location = workspace
        .definition(
            &workspace.snapshot(),
            &fixture.path("d2/b.go"),
            locate(SUBDIR_B, "p.|A"),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(location.path, fixture.path("a.go"));
    assert_eq!(location.range.start, Position::new(0, 16));
    assert_eq!(location.range.end, Position::new(0, 17));
}
