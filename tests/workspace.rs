//! Overlay coherence, shared loads and package boundaries.

mod helper;

use std::sync::Arc;

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use go_lsp::syntax::Position;
use go_lsp::workspace::EngineError;

use helper::{Fixture, locate};

async fn hover_at(
    workspace: &go_lsp::workspace::Workspace,
    fixture: &Fixture,
    file: &str,
    at: Position,
) -> Option<String> {
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

#[tokio::test]
async fn overlay_edits_win_over_disk_until_closed() {
    let fixture = Fixture::new(&[("a.go", "package p; var A int")]);
    let workspace = fixture.workspace();
    let at = Position::new(0, 15);

    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", at).await.as_deref(),
        Some("var A int")
    );

    workspace.did_open(fixture.path("a.go"), "package p; var A string".to_string(), 1);
    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", at).await.as_deref(),
        Some("var A string")
    );

    workspace.did_change(fixture.path("a.go"), "package p; var A bool".to_string(), 2);
    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", at).await.as_deref(),
        Some("var A bool")
    );

    workspace.did_close(&fixture.path("a.go"));
    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", at).await.as_deref(),
        Some("var A int")
    );
}

#[tokio::test]
async fn queries_answer_from_the_snapshot_they_were_given() {
    let fixture = Fixture::new(&[("a.go", "package p; var A int")]);
    let workspace = fixture.workspace();
    let before = workspace.snapshot();

    workspace.did_open(fixture.path("a.go"), "package p; var A string".to_string(), 1);

    let old = workspace
        .hover(
            &before,
            &fixture.path("a.go"),
            Position::new(0, 15),
            &CancellationToken::new(),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(old.flatten(), "var A int");
}

#[tokio::test]
async fn edits_to_a_dependency_reach_its_importers() {
    let importer = r#"package d2; import "test/pkg"; var B = p.A"#;
    let fixture = Fixture::new(&[("a.go", "package p; var A int"), ("d2/b.go", importer)]);
    let workspace = fixture.workspace();
    let at = locate(importer, "var |B");

    assert_eq!(
        hover_at(&workspace, &fixture, "d2/b.go", at).await.as_deref(),
        Some("var B int")
    );

    workspace.did_open(fixture.path("a.go"), "package p; var A float64".to_string(), 1);
    assert_eq!(
        hover_at(&workspace, &fixture, "d2/b.go", at).await.as_deref(),
        Some("var B float64")
    );
}

#[tokio::test]
async fn edits_leave_unrelated_packages_cached() {
    let fixture = Fixture::new(&[
        ("a.go", "package p; var A int"),
        ("u/u.go", "package u; var U int"),
    ]);
    let workspace = fixture.workspace();
    let a = Position::new(0, 15);
    let u = Position::new(0, 15);

    assert_eq!(
        hover_at(&workspace, &fixture, "u/u.go", u).await.as_deref(),
        Some("var U int")
    );
    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", a).await.as_deref(),
        Some("var A int")
    );
    let builds = workspace.loader().build_count();

    workspace.did_open(fixture.path("a.go"), "package p; var A string".to_string(), 1);
    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", a).await.as_deref(),
        Some("var A string")
    );
    assert_eq!(
        hover_at(&workspace, &fixture, "u/u.go", u).await.as_deref(),
        Some("var U int")
    );
    assert_eq!(workspace.loader().build_count(), builds + 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_queries_share_one_package_build() {
    let fixture = Fixture::new(&[("a.go", "package p; func A() { A() }")]);
    let workspace = Arc::new(fixture.workspace());
    let overlay = workspace.snapshot();
    let path = fixture.path("a.go");

    let queries = (0..8).map(|_| {
        let workspace = Arc::clone(&workspace);
        let overlay = overlay.clone();
        let path = path.clone();
        tokio::spawn(async move {
            workspace
                .hover(&overlay, &path, Position::new(0, 22), &CancellationToken::new())
                .await
        })
    });

    for result in join_all(queries).await {
        let hover = result.unwrap().unwrap().unwrap();
        assert_eq!(hover.flatten(), "func A()");
    }
    assert_eq!(workspace.loader().build_count(), 1);
    assert_eq!(workspace.loader().in_flight_count(), 0);
}

#[tokio::test]
async fn cancelled_queries_fail_without_poisoning_the_cache() {
    let fixture = Fixture::new(&[("a.go", "package p; var A int")]);
    let workspace = fixture.workspace();
    let cancelled = CancellationToken::new();
    cancelled.cancel();

    let result = workspace
        .hover(
            &workspace.snapshot(),
            &fixture.path("a.go"),
            Position::new(0, 15),
            &cancelled,
        )
        .await;
    assert_eq!(result, Err(EngineError::Cancelled));

    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", Position::new(0, 15))
            .await
            .as_deref(),
        Some("var A int")
    );
}

#[tokio::test]
async fn test_files_stay_out_of_the_production_package() {
    let fixture = Fixture::new(&[
        ("a.go", "package p; var Y = X"),
        ("a_test.go", "package p; var X = 1"),
    ]);
    let workspace = fixture.workspace();
    let cancel = CancellationToken::new();

    let diagnostics = workspace
        .diagnostics(&workspace.snapshot(), &fixture.path("a.go"), &cancel)
        .await
        .unwrap();
    let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["undefined: X"]);

    let test_diagnostics = workspace
        .diagnostics(&workspace.snapshot(), &fixture.path("a_test.go"), &cancel)
        .await
        .unwrap();
    assert!(test_diagnostics.is_empty(), "{:?}", test_diagnostics);
}

#[tokio::test]
async fn importers_never_see_test_declarations() {
    let importer = r#"package d2; import "test/pkg"; var B = p.T"#;
    let fixture = Fixture::new(&[
        ("a.go", "package p; var A int"),
        ("a_test.go", "package p; var T int"),
        ("d2/b.go", importer),
    ]);
    let workspace = fixture.workspace();

    let diagnostics = workspace
        .diagnostics(
            &workspace.snapshot(),
            &fixture.path("d2/b.go"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["undefined: p.T"]);
}

#[tokio::test]
async fn sibling_packages_in_one_directory_are_isolated() {
    let fixture = Fixture::new(&[
        ("a.go", "package p; var A int"),
        ("b.go", "package q; var B = A"),
    ]);
    let workspace = fixture.workspace();

    let diagnostics = workspace
        .diagnostics(
            &workspace.snapshot(),
            &fixture.path("b.go"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    let messages: Vec<&str> = diagnostics.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["undefined: A"]);
}

#[tokio::test]
async fn syntax_errors_are_reported_and_the_rest_still_resolves() {
    let text = "package p\n\nvar A int\n\nfunc B( {\n";
    let fixture = Fixture::new(&[("a.go", "package p")]);
    let workspace = fixture.workspace();
    workspace.did_open(fixture.path("a.go"), text.to_string(), 1);

    let diagnostics = workspace
        .diagnostics(
            &workspace.snapshot(),
            &fixture.path("a.go"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert!(!diagnostics.is_empty());

    assert_eq!(
        hover_at(&workspace, &fixture, "a.go", locate(text, "var |A"))
            .await
            .as_deref(),
        Some("var A int")
    );
}
