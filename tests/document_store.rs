//! End-to-end tests driving the store the way the server front-end does:
//! open/close/refresh/save against real files on disk.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use url::Url;
use zls_store::{uri, Config, DocumentStore};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn write(dir: &TempDir, name: &str, contents: &str) -> Url {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    uri::from_file_path(path).unwrap()
}

fn open_from_disk(store: &mut DocumentStore, uri: &Url) {
    let text = fs::read_to_string(uri.to_file_path().unwrap()).unwrap();
    store.open_document(uri.clone(), text).unwrap();
}

#[test]
fn transitive_imports_are_materialized() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.zig", r#"const b = @import("b.zig");"#);
    let b = write(&dir, "b.zig", r#"const c = @import("c.zig");"#);
    let c = write(&dir, "c.zig", "const x = 3;");

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);

    assert_eq!(store.len(), 3);
    assert!(store.get_document(&a).unwrap().open);
    assert!(!store.get_document(&b).unwrap().open);
    assert!(!store.get_document(&c).unwrap().open);

    store.close_document(&a);
    assert!(store.is_empty());
}

#[test]
fn shared_dependencies_survive_until_the_last_importer_closes() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.zig", r#"const shared = @import("shared.zig");"#);
    let b = write(&dir, "b.zig", r#"const shared = @import("shared.zig");"#);
    let shared = write(&dir, "shared.zig", "const x = 1;");

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);
    open_from_disk(&mut store, &b);
    assert_eq!(store.len(), 3);

    store.close_document(&a);
    assert!(store.get_document(&b).is_some());
    assert!(store.get_document(&shared).is_some());
    assert_eq!(store.len(), 2);

    store.close_document(&b);
    assert!(store.is_empty());
}

#[test]
fn import_cycles_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.zig", r#"const b = @import("b.zig");"#);
    let _b = write(&dir, "b.zig", r#"const a = @import("a.zig");"#);

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);
    assert_eq!(store.len(), 2);

    store.close_document(&a);
    assert!(store.is_empty());
}

#[test]
fn collect_dependencies_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.zig", r#"const b = @import("b.zig");"#);
    let _b = write(&dir, "b.zig", "const x = 2;");

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);

    let document = store.get_document(&a).unwrap();
    let mut first = Vec::new();
    store.collect_dependencies(document, &mut first);
    let mut second = Vec::new();
    store.collect_dependencies(document, &mut second);
    assert_eq!(first, second);
    assert_eq!(first.len(), 1);
}

#[test]
fn completions_aggregate_across_direct_imports() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(
        &dir,
        "a.zig",
        r#"
const b = @import("b.zig");
const LocalError = error{FromA};
const Mode = enum { fast, small };
"#,
    );
    let _b = write(
        &dir,
        "b.zig",
        r#"
const SharedError = error{FromA, FromB};
const Kind = enum { fast, exotic };
"#,
    );

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);

    let document = store.get_document(&a).unwrap();
    let mut errors = store
        .error_completion_items(document)
        .into_iter()
        .map(|item| item.label)
        .collect::<Vec<_>>();
    errors.sort();
    // duplicates collapse across documents
    assert_eq!(errors, vec!["FromA", "FromB"]);

    let mut enums = store
        .enum_completion_items(document)
        .into_iter()
        .map(|item| item.label)
        .collect::<Vec<_>>();
    enums.sort();
    assert_eq!(enums, vec!["exotic", "fast", "small"]);
}

#[test]
fn refreshing_keeps_the_graph_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.zig", r#"const b = @import("b.zig");"#);
    let b = write(&dir, "b.zig", "const x = 2;");

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);
    assert_eq!(store.len(), 2);

    // drop the import; `b` stays until the next collection
    store.refresh_document(&a, "const x = 1;".to_string());
    assert!(store.get_document(&a).unwrap().import_uris.is_empty());

    store.close_document(&a);
    assert!(store.get_document(&b).is_none());
    assert!(store.is_empty());
}

#[test]
fn closing_every_open_document_empties_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let a = write(&dir, "a.zig", r#"const b = @import("b.zig");"#);
    let b = write(&dir, "b.zig", r#"const c = @import("c.zig");"#);
    let _c = write(&dir, "c.zig", "const x = 3;");

    let mut store = DocumentStore::new(Config::default());
    open_from_disk(&mut store, &a);
    open_from_disk(&mut store, &b);

    for document in store.documents() {
        assert_eq!(store.get_document(&document.uri).unwrap().uri, document.uri);
    }

    store.close_document(&a);
    store.close_document(&b);
    assert!(store.is_empty());
    assert_eq!(store.cimport_cache_len(), 0);
}

#[cfg(unix)]
mod with_build_runner {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    /// Installs a stand-in for the `zig` executable that answers every `run`
    /// invocation with the given build configuration JSON.
    fn stub_zig(dir: &Path, json: &str) -> std::path::PathBuf {
        let path = dir.join("zig");
        fs::write(&path, format!("#!/bin/sh\necho '{json}'\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn runner_config(dir: &Path, zig: std::path::PathBuf) -> Config {
        Config {
            zig_exe_path: Some(zig),
            build_runner_path: Some(dir.join("build_runner.zig")),
            global_cache_path: Some(dir.join("cache")),
            ..Default::default()
        }
    }

    #[test]
    fn documents_associate_with_the_build_file_exporting_them() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let build = write(&dir, "p/build.zig", "// build script");
        let main = write(&dir, "p/src/main.zig", "const x = 1;");
        let zig = stub_zig(
            dir.path(),
            r#"{"packages":[{"name":"p","path":"src/main.zig"}],"include_dirs":[]}"#,
        );

        let mut store = DocumentStore::new(runner_config(dir.path(), zig));
        open_from_disk(&mut store, &main);

        let document = store.get_document(&main).unwrap();
        assert_eq!(document.associated_build_file.as_ref(), Some(&build));
        assert!(!document.is_build_file);

        let build_file = store.build_file(&build).unwrap();
        assert_eq!(build_file.config.packages.len(), 1);
        assert_eq!(
            build_file.config.packages[0].path,
            dir.path().join("p/src/main.zig")
        );
    }

    #[test]
    fn membership_beats_proximity() {
        let dir = tempfile::tempdir().unwrap();
        let outer_build = write(&dir, "p/build.zig", "// build script");
        let _inner_build = write(&dir, "p/nested/build.zig", "// build script");
        let main = write(&dir, "p/nested/main.zig", "const x = 1;");
        // both build files report the same relative package table, but only
        // rooted at the outer build directory does it reach the document
        let zig = stub_zig(
            dir.path(),
            r#"{"packages":[{"name":"p","path":"nested/main.zig"}],"include_dirs":[]}"#,
        );

        let mut store = DocumentStore::new(runner_config(dir.path(), zig));
        open_from_disk(&mut store, &main);

        let document = store.get_document(&main).unwrap();
        assert_eq!(document.associated_build_file.as_ref(), Some(&outer_build));
    }

    #[test]
    fn documents_fall_back_to_the_nearest_build_file() {
        let dir = tempfile::tempdir().unwrap();
        let _outer_build = write(&dir, "p/build.zig", "// build script");
        let inner_build = write(&dir, "p/nested/build.zig", "// build script");
        let main = write(&dir, "p/nested/src/main.zig", "const x = 1;");
        let zig = stub_zig(dir.path(), r#"{"packages":[],"include_dirs":[]}"#);

        let mut store = DocumentStore::new(runner_config(dir.path(), zig));
        open_from_disk(&mut store, &main);

        let document = store.get_document(&main).unwrap();
        assert_eq!(document.associated_build_file.as_ref(), Some(&inner_build));
    }

    #[test]
    fn build_files_are_recognized_and_reloaded_on_save() {
        let dir = tempfile::tempdir().unwrap();
        let build = write(&dir, "p/build.zig", "// build script");
        let _main = write(&dir, "p/src/main.zig", "const x = 1;");
        let zig = stub_zig(
            dir.path(),
            r#"{"packages":[{"name":"p","path":"src/main.zig"}],"include_dirs":[]}"#,
        );

        let mut store = DocumentStore::new(runner_config(dir.path(), zig.clone()));
        open_from_disk(&mut store, &build);

        let document = store.get_document(&build).unwrap();
        assert!(document.is_build_file);
        assert!(document.associated_build_file.is_none());
        assert_eq!(store.build_file(&build).unwrap().config.packages.len(), 1);

        // a failing reload keeps the previous configuration
        fs::write(&zig, "#!/bin/sh\nexit 1\n").unwrap();
        store.apply_save(&build);
        assert_eq!(store.build_file(&build).unwrap().config.packages.len(), 1);
    }

    #[test]
    fn std_documents_skip_build_file_discovery() {
        let dir = tempfile::tempdir().unwrap();
        let _build = write(&dir, "p/build.zig", "// build script");
        let builtin = write(&dir, "p/std/builtin.zig", "const x = 1;");
        let zig = stub_zig(dir.path(), r#"{"packages":[],"include_dirs":[]}"#);

        let mut store = DocumentStore::new(runner_config(dir.path(), zig));
        open_from_disk(&mut store, &builtin);

        let document = store.get_document(&builtin).unwrap();
        assert!(document.associated_build_file.is_none());
    }
}
