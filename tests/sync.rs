//! End-to-end synchronization tests over temp projects.
//!
//! Source repositories are local git repositories, so `git ls-remote`
//! resolves real revisions without touching the network.

mod common;

use std::collections::HashMap;
use std::path::Path;

use common::TestProject;
use depsync::cli::Cli;
use depsync::flake::FlakeFile;
use depsync::manifest::Manifest;
use depsync::sync::{self, EntryStatus, PlanOptions};

const STALE: &str = "aaa111aaa111aaa111aaa111aaa111aaa111aaa1";

fn manifest_two(url_a: &Path, sha_a: &str, url_b: &Path, sha_b: &str) -> String {
    format!(
        "{{:paths [\"src\"]\n \
         :deps {{io.github.acme/lib-a {{:git/url \"{}\" :git/sha \"{sha_a}\"}}\n \
                io.github.acme/lib-b {{:git/url \"{}\" :git/sha \"{sha_b}\"}}}}}}\n",
        url_a.display(),
        url_b.display()
    )
}

fn flake_two() -> String {
    "{\n  description = \"test project\";\n\n  inputs = {\n    nixpkgs.url = \"github:NixOS/nixpkgs/nixos-24.05\";\n    lib-a.url = \"github:acme/lib-a\";\n    lib-b.url = \"github:acme/lib-b\";\n  };\n\n  outputs = { self, nixpkgs, ... }: { };\n}\n"
        .to_string()
}

fn cli_for(project: &TestProject) -> Cli {
    Cli {
        deps: Vec::new(),
        deps_file: project.deps_file(),
        flake_file: project.flake_file(),
        overrides: Vec::new(),
        update_locks: false,
        dry_run: false,
        quiet: true,
        verbose: false,
    }
}

async fn plan_for(project: &TestProject, options: &PlanOptions) -> sync::SyncPlan {
    let manifest = Manifest::load(&project.deps_file()).unwrap();
    let flake = FlakeFile::load(&project.flake_file()).unwrap();
    sync::plan(&manifest, &flake, options).await
}

#[tokio::test]
async fn scenario_a_only_stale_entries_update() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("lib-a");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&repo_a, STALE, &repo_b, &head_b));
    project.write_flake(&flake_two());

    let plan = plan_for(&project, &PlanOptions::default()).await;

    assert_eq!(plan.changes.manifest.len(), 1);
    assert_eq!(plan.changes.manifest[0].name, "io.github.acme/lib-a");
    assert_eq!(plan.changes.manifest[0].old_rev, STALE);
    assert_eq!(plan.changes.manifest[0].new_rev, head_a);

    let lib_b = plan.reports.iter().find(|r| r.name == "io.github.acme/lib-b").unwrap();
    assert!(matches!(lib_b.status, EntryStatus::UpToDate));
}

#[tokio::test]
async fn scenario_b_override_shortcuts_resolution() {
    let project = TestProject::new();
    // the URL points at a repository that does not exist, so any attempt
    // to resolve it would fail; the override must win without resolving
    let missing = project.path().join("sources").join("missing");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&missing, STALE, &repo_b, &head_b));
    project.write_flake(&flake_two());

    let mut overrides = HashMap::new();
    overrides.insert("sources/missing".to_string(), "ddd444ddd444ddd444ddd444ddd444ddd444ddd4".to_string());
    let plan = plan_for(&project, &PlanOptions { overrides, only: Vec::new() }).await;

    assert_eq!(plan.changes.manifest.len(), 1);
    let change = &plan.changes.manifest[0];
    assert_eq!(change.new_rev, "ddd444ddd444ddd444ddd444ddd444ddd444ddd4");
    assert!(change.via_override);
    assert!(matches!(
        plan.reports[0].status,
        EntryStatus::Updated { via_override: true, .. }
    ));
}

#[tokio::test]
async fn scenario_c_dry_run_writes_nothing() {
    let project = TestProject::new();
    let (repo_a, _head_a) = project.create_source_repo("lib-a");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&repo_a, STALE, &repo_b, &head_b));
    project.write_flake(&flake_two());

    let manifest_before = project.read_manifest();
    let flake_before = project.read_flake();

    let mut cli = cli_for(&project);
    cli.dry_run = true;
    cli.execute().await.unwrap();

    assert_eq!(project.read_manifest(), manifest_before);
    assert_eq!(project.read_flake(), flake_before);
}

#[tokio::test]
async fn scenario_d_flake_line_is_rewritten_in_place() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("lib-a");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&repo_a, STALE, &repo_b, &head_b));
    project.write_flake(&flake_two());

    let flake_before = project.read_flake();
    cli_for(&project).execute().await.unwrap();
    let flake_after = project.read_flake();

    let before: Vec<&str> = flake_before.lines().collect();
    let after: Vec<&str> = flake_after.lines().collect();
    assert_eq!(before.len(), after.len());

    let expected = format!("github:acme/lib-a/{head_a}");
    for (before_line, after_line) in before.iter().zip(&after) {
        if before_line.contains("\"github:acme/lib-a\"") {
            assert!(after_line.contains(&expected), "line not pinned: {after_line}");
        } else {
            assert_eq!(before_line, after_line);
        }
    }
}

#[tokio::test]
async fn manifest_rescan_round_trips_applied_changes() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("lib-a");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&repo_a, STALE, &repo_b, &head_b));
    project.write_flake(&flake_two());

    let paths_before: Vec<_> = Manifest::load(&project.deps_file())
        .unwrap()
        .scan()
        .into_iter()
        .map(|e| (e.name.clone(), e.path))
        .collect();

    cli_for(&project).execute().await.unwrap();

    let entries = Manifest::load(&project.deps_file()).unwrap().scan();
    let lib_a = entries.iter().find(|e| e.name == "io.github.acme/lib-a").unwrap();
    assert_eq!(lib_a.rev, head_a);
    let lib_b = entries.iter().find(|e| e.name == "io.github.acme/lib-b").unwrap();
    assert_eq!(lib_b.rev, head_b);

    let paths_after: Vec<_> =
        entries.into_iter().map(|e| (e.name.clone(), e.path)).collect();
    assert_eq!(paths_before, paths_after);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
    let project = TestProject::new();
    let (repo_a, _head_a) = project.create_source_repo("lib-a");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&repo_a, STALE, &repo_b, &head_b));
    project.write_flake(&flake_two());

    cli_for(&project).execute().await.unwrap();
    let manifest_after_first = project.read_manifest();
    let flake_after_first = project.read_flake();

    let plan = plan_for(&project, &PlanOptions::default()).await;
    assert!(plan.changes.is_empty());

    cli_for(&project).execute().await.unwrap();
    assert_eq!(project.read_manifest(), manifest_after_first);
    assert_eq!(project.read_flake(), flake_after_first);
}

#[tokio::test]
async fn coordinate_filter_skips_resolution_of_other_entries() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("lib-a");
    // lib-b's repository does not exist; if it were resolved the report
    // would show a failure instead of the filter
    let missing = project.path().join("sources").join("missing");
    project.write_manifest(&manifest_two(&repo_a, STALE, &missing, STALE));
    project.write_flake(&flake_two());

    let options = PlanOptions {
        overrides: HashMap::new(),
        only: vec!["io.github.acme/lib-a".to_string()],
    };
    let plan = plan_for(&project, &options).await;

    assert_eq!(plan.changes.manifest.len(), 1);
    assert_eq!(plan.changes.manifest[0].new_rev, head_a);
    let lib_b = plan.reports.iter().find(|r| r.name == "io.github.acme/lib-b").unwrap();
    assert!(matches!(lib_b.status, EntryStatus::Filtered));
}

#[tokio::test]
async fn unresolvable_entry_is_skipped_not_fatal() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("lib-a");
    let missing = project.path().join("sources").join("missing");
    project.write_manifest(&manifest_two(&missing, STALE, &repo_a, STALE));
    project.write_flake(&flake_two());

    let plan = plan_for(&project, &PlanOptions::default()).await;

    // the broken entry is reported, the healthy one still updates
    assert!(matches!(plan.reports[0].status, EntryStatus::Failed(_)));
    assert_eq!(plan.changes.manifest.len(), 1);
    assert_eq!(plan.changes.manifest[0].name, "io.github.acme/lib-b");
    assert_eq!(plan.changes.manifest[0].new_rev, head_a);
}

#[tokio::test]
async fn alias_entries_update_at_their_own_location() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("devtool");
    let manifest_text = format!(
        "{{:deps {{}}\n \
         :aliases {{:dev {{:extra-deps {{acme/devtool {{:git/url \"{}\" :git/sha \"{STALE}\"}}}}}}}}}}\n",
        repo_a.display()
    );
    project.write_manifest(&manifest_text);
    project.write_flake(&flake_two());

    cli_for(&project).execute().await.unwrap();

    let entries = Manifest::load(&project.deps_file()).unwrap().scan();
    let devtool = entries.iter().find(|e| e.name == "acme/devtool").unwrap();
    assert_eq!(devtool.rev, head_a);
    assert_eq!(devtool.path, vec![":aliases", ":dev", ":extra-deps", "acme/devtool"]);
}

#[tokio::test]
async fn missing_input_files_are_fatal() {
    let project = TestProject::new();
    project.write_flake(&flake_two());
    let err = cli_for(&project).execute().await.unwrap_err();
    assert!(format!("{err:#}").contains("deps.edn"));

    let project = TestProject::new();
    project.write_manifest("{:deps {}}");
    let err = cli_for(&project).execute().await.unwrap_err();
    assert!(format!("{err:#}").contains("flake.nix"));
}

#[tokio::test]
async fn upstream_advance_is_picked_up() {
    let project = TestProject::new();
    let (repo_a, head_a) = project.create_source_repo("lib-a");
    let (repo_b, head_b) = project.create_source_repo("lib-b");
    project.write_manifest(&manifest_two(&repo_a, &head_a, &repo_b, &head_b));
    project.write_flake(&flake_two());

    // everything current: nothing to do
    let plan = plan_for(&project, &PlanOptions::default()).await;
    assert!(plan.changes.is_empty());

    // upstream moves, the next run picks it up
    let new_head = project.commit(&repo_a, "upstream change");
    let plan = plan_for(&project, &PlanOptions::default()).await;
    assert_eq!(plan.changes.manifest.len(), 1);
    assert_eq!(plan.changes.manifest[0].new_rev, new_head);
}
