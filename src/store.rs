//! The document store.
//!
//! The store owns the in-memory universe of source documents: everything the
//! editor has open plus every file those documents transitively depend on.
//! Dependencies come from three places:
//!
//!    - `@import("foo.zig")` path imports, resolved relative to the importing
//!      document
//!    - named packages (`@import("pkg")`) and special names (`"std"`,
//!      `"builtin"`), resolved through the configuration and the document's
//!      associated build file
//!    - `@cImport` blocks, translated to Zig through the compiler and cached
//!      by the content hash of the rendered C source
//!
//! Documents reference each other by URI only, never by pointer, so import
//! cycles are harmless: all traversal is URI -> map lookup. Opening a document
//! eagerly materializes its dependency closure; closing one runs a
//! mark-and-sweep collection over the reachability closure of the remaining
//! open documents, followed by an independent sweep of the cimport cache.
//!
//! The store assumes exclusive mutation by a single driver. The only blocking
//! operations are sub-process invocations (build runner, `translate-c`) and
//! source file reads.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    ops::Range,
    path::PathBuf,
};
use url::Url;

use crate::{
    analysis::{CompletionItem, DocumentScope, ZigData},
    build_file::{self, BuildFile},
    config::Config,
    error::{Result, StoreError},
    translate::{self, CimportResult},
    uri, utils,
};

/// One `@cImport` block of a document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cimport {
    /// Byte span of the `@cImport` expression, identifying the node.
    pub node: Range<usize>,
    /// Content hash of `source`; the key into the store's cimport cache.
    pub hash: String,
    /// The rendered C translation unit.
    pub source: String,
}

/// Store-owned record for one source document.
#[derive(Clone, Debug)]
pub struct Document {
    /// Identity of the document; unique across the store.
    pub uri: Url,
    /// The current source text. Immutable once installed; a refresh replaces
    /// it wholesale.
    pub text: String,
    /// Parsed index of the text.
    pub data: ZigData,
    /// Derived completion sets.
    pub scope: DocumentScope,
    /// Whether the editor currently has this document open.
    pub open: bool,
    /// One resolved URI per import directive; unresolved imports are dropped.
    pub import_uris: Vec<Url>,
    /// One entry per supported `@cImport` block, in source order.
    pub cimports: Vec<Cimport>,
    /// The build file governing this document, if discovery found one.
    pub associated_build_file: Option<Url>,
    /// Whether this document is itself a build file.
    pub is_build_file: bool,
}

/// The in-memory document universe of the language server.
///
/// See the [module docs](self) for an overview.
#[derive(Debug, Default)]
pub struct DocumentStore {
    config: Config,
    /// All live documents, keyed by their URI.
    handles: BTreeMap<Url, Document>,
    /// All known build files, keyed by their URI. Build files persist for the
    /// store's lifetime.
    build_files: BTreeMap<Url, BuildFile>,
    /// Memoized `@cImport` translation outcomes, keyed by content hash of the
    /// rendered C source and shared across all documents.
    cimports: HashMap<String, CimportResult>,
}

impl DocumentStore {
    /// Creates an empty store reading the given configuration.
    ///
    /// The configuration is immutable for the store's lifetime.
    pub fn new(config: Config) -> Self {
        Self { config, ..Default::default() }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of live documents.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Iterates over all live documents in URI order.
    pub fn documents(&self) -> impl Iterator<Item = &Document> {
        self.handles.values()
    }

    /// Returns the build file record for `uri`, if one was loaded.
    pub fn build_file(&self, uri: &Url) -> Option<&BuildFile> {
        self.build_files.get(uri)
    }

    /// Number of entries in the cimport cache.
    pub fn cimport_cache_len(&self) -> usize {
        self.cimports.len()
    }

    /// Returns the cached translation outcome for a cimport hash.
    pub fn cimport_result(&self, hash: &str) -> Option<&CimportResult> {
        self.cimports.get(hash)
    }

    /// Returns the document for `uri`, if any. Logs a warning on a miss.
    pub fn get_document(&self, uri: &Url) -> Option<&Document> {
        let document = self.handles.get(uri);
        if document.is_none() {
            warn!("requested unknown document {uri}");
        }
        document
    }

    /// Installs a freshly opened document and materializes its dependency
    /// closure before returning.
    ///
    /// If the document is already present (typically as a dependency of
    /// another open document) it is only flagged open; a warning is logged if
    /// it was open already.
    #[instrument(skip_all, fields(uri = %uri))]
    pub fn open_document(&mut self, uri: Url, text: String) -> Result<&Document> {
        if !self.handles.contains_key(&uri) {
            trace!("opening new document");
            let document = self.create_document(uri.clone(), text, true)?;
            self.handles.insert(uri.clone(), document);
            self.ensure_dependencies_processed(&uri);
        } else if let Some(document) = self.handles.get_mut(&uri) {
            if document.open {
                warn!("document already open");
            }
            document.open = true;
        }
        self.handles
            .get(&uri)
            .ok_or_else(|| StoreError::msg(format!("failed to install document {uri}")))
    }

    /// Marks the document closed and collects everything that is no longer
    /// reachable from an open document.
    #[instrument(skip_all, fields(uri = %uri))]
    pub fn close_document(&mut self, uri: &Url) {
        match self.handles.get_mut(uri) {
            Some(document) => {
                if !document.open {
                    warn!("document was not open");
                }
                document.open = false;
            }
            None => {
                warn!("close for unknown document");
                return;
            }
        }
        self.garbage_collection();
    }

    /// Installs new text for an existing document.
    ///
    /// The index, scope, resolved imports and cimports are recomputed and new
    /// cimports are translated. Import dependencies added by the new text are
    /// not fetched here; they materialize on the next open that transitively
    /// demands them.
    #[instrument(skip_all, fields(uri = %uri))]
    pub fn refresh_document(&mut self, uri: &Url, text: String) {
        let Some(document) = self.handles.get(uri) else {
            warn!("refresh for unknown document");
            return;
        };
        let build_file =
            document.associated_build_file.as_ref().and_then(|u| self.build_files.get(u));

        let data = ZigData::parse(&text);
        let scope = DocumentScope::build(&text);
        let import_uris = data
            .imports
            .iter()
            .filter_map(|import| resolve_import(&self.config, build_file, uri, import.data()))
            .collect();
        let cimports = collect_cimports(&data);

        let Some(document) = self.handles.get_mut(uri) else { return };
        document.text = text;
        document.data = data;
        document.scope = scope;
        document.import_uris = import_uris;
        document.cimports = cimports;

        self.ensure_cimports_processed(uri);
    }

    /// Handles a save notification for the document.
    ///
    /// Saving a build file re-executes the build runner and replaces the
    /// stored configuration; on failure the previous one is kept.
    #[instrument(skip_all, fields(uri = %uri))]
    pub fn apply_save(&mut self, uri: &Url) {
        let Some(document) = self.handles.get(uri) else {
            warn!("save for unknown document");
            return;
        };
        if !document.is_build_file {
            return;
        }
        let Some(build_file) = self.build_files.get(uri) else {
            debug!("no build file record to reload");
            return;
        };
        let options = build_file.build_options().to_vec();
        let path = match uri::to_file_path(uri) {
            Ok(path) => path,
            Err(err) => {
                debug!("cannot locate build file: {err}");
                return;
            }
        };
        match build_file::load_build_config(&self.config, &path, &options) {
            Ok(config) => {
                if let Some(build_file) = self.build_files.get_mut(uri) {
                    build_file.config = config;
                }
            }
            Err(err) => error!("failed to reload build file {uri}: {err}"),
        }
    }

    /// Resolves a raw import string in the context of the given document.
    pub fn uri_from_import_str(&self, document: &Document, import: &str) -> Option<Url> {
        let build_file =
            document.associated_build_file.as_ref().and_then(|u| self.build_files.get(u));
        resolve_import(&self.config, build_file, &document.uri, import)
    }

    /// Appends every dependency URI of the document to `dependencies`: its
    /// resolved imports, the translation target of every successfully
    /// translated cimport, and the package roots of its associated build file.
    ///
    /// The pushed URIs are owned copies.
    pub fn collect_dependencies(&self, document: &Document, dependencies: &mut Vec<Url>) {
        dependencies.extend(document.import_uris.iter().cloned());

        for cimport in &document.cimports {
            if let Some(CimportResult::Success(translated)) = self.cimports.get(&cimport.hash) {
                dependencies.push(translated.clone());
            }
        }

        if let Some(build_file) =
            document.associated_build_file.as_ref().and_then(|u| self.build_files.get(u))
        {
            for package in &build_file.config.packages {
                if let Ok(package_uri) = uri::from_file_path(&package.path) {
                    dependencies.push(package_uri);
                }
            }
        }
    }

    /// Returns the translated Zig document for the `@cImport` node at the
    /// given byte span, if its translation succeeded.
    pub fn resolve_c_import(&self, document: &Document, node: &Range<usize>) -> Option<Url> {
        let cimport = document.cimports.iter().find(|c| &c.node == node)?;
        self.cimports.get(&cimport.hash)?.success_uri().cloned()
    }

    /// Error-tag completions of the document, every directly-imported
    /// document, and every successfully translated cimport target, with
    /// duplicate labels collapsed.
    pub fn error_completion_items(&self, document: &Document) -> Vec<CompletionItem> {
        self.aggregate_completions(document, |scope| &scope.error_completions)
    }

    /// Enum-tag completions, aggregated like [`Self::error_completion_items`].
    pub fn enum_completion_items(&self, document: &Document) -> Vec<CompletionItem> {
        self.aggregate_completions(document, |scope| &scope.enum_completions)
    }

    fn aggregate_completions<F>(&self, document: &Document, select: F) -> Vec<CompletionItem>
    where
        F: Fn(&DocumentScope) -> &Vec<CompletionItem>,
    {
        let mut seen = HashSet::new();
        let mut items = Vec::new();
        let mut extend = |scope: &DocumentScope| {
            for item in select(scope) {
                if seen.insert(item.label.clone()) {
                    items.push(item.clone());
                }
            }
        };

        extend(&document.scope);
        for import_uri in &document.import_uris {
            if let Some(dependency) = self.handles.get(import_uri) {
                extend(&dependency.scope);
            }
        }
        for cimport in &document.cimports {
            if let Some(CimportResult::Success(translated)) = self.cimports.get(&cimport.hash) {
                if let Some(dependency) = self.handles.get(translated) {
                    extend(&dependency.scope);
                }
            }
        }
        items
    }

    /// Constructs a document record for `uri`, taking ownership of the text.
    ///
    /// Collection runs in order of commitment: index, scope, import
    /// resolution, cimport rendering, and finally build file association.
    /// Import resolution runs before association, so package-named imports of
    /// a brand-new document only resolve once its build file is known and the
    /// import is looked at again.
    fn create_document(&mut self, uri: Url, text: String, open: bool) -> Result<Document> {
        trace!(%uri, open, "creating document");
        let data = ZigData::parse(&text);
        let scope = DocumentScope::build(&text);

        let import_uris = data
            .imports
            .iter()
            .filter_map(|import| resolve_import(&self.config, None, &uri, import.data()))
            .collect();
        let cimports = collect_cimports(&data);

        let mut associated_build_file = None;
        let mut is_build_file = false;
        if self.config.zig_exe_path.is_some() && !uri::in_std(&uri) {
            if is_build_file_uri(&uri) {
                if !self.build_files.contains_key(&uri) {
                    let record = BuildFile::create(&self.config, uri.clone());
                    self.build_files.insert(uri.clone(), record);
                }
                is_build_file = true;
            } else {
                associated_build_file = self.associate_build_file(&uri);
                if let Some(build_uri) = &associated_build_file {
                    debug!("associated {uri} with build file {build_uri}");
                }
            }
        }

        Ok(Document {
            uri,
            text,
            data,
            scope,
            open,
            import_uris,
            cimports,
            associated_build_file,
            is_build_file,
        })
    }

    /// Reads the document's source from disk and constructs it.
    ///
    /// Read failures are swallowed: dependency materialization is best-effort
    /// and a dependency that cannot be loaded is simply skipped.
    fn create_document_from_uri(&mut self, uri: Url, open: bool) -> Option<Document> {
        let path = match uri::to_file_path(&uri) {
            Ok(path) => path,
            Err(err) => {
                debug!("skipping dependency: {err}");
                return None;
            }
        };
        let text = match utils::read_source_file(&path) {
            Ok(text) => text,
            Err(err) => {
                debug!("skipping unreadable dependency: {err}");
                return None;
            }
        };
        match self.create_document(uri, text, open) {
            Ok(document) => Some(document),
            Err(err) => {
                debug!("skipping dependency: {err}");
                None
            }
        }
    }

    /// Picks the build file governing the document at `uri`.
    ///
    /// Walks the ancestor directories nearest-first, loading a build file
    /// record for every `build.zig` encountered. The first build file whose
    /// package graph reaches the document wins; if none does, the nearest
    /// ancestor build file is used.
    fn associate_build_file(&mut self, uri: &Url) -> Option<Url> {
        let path = uri::to_file_path(uri).ok()?;
        let mut nearest = None;
        for build_path in build_file::build_file_ancestors(&path) {
            let Ok(build_uri) = uri::from_file_path(&build_path) else { continue };
            if !self.build_files.contains_key(&build_uri) {
                let record = BuildFile::create(&self.config, build_uri.clone());
                self.build_files.insert(build_uri.clone(), record);
            }
            if nearest.is_none() {
                nearest = Some(build_uri.clone());
            }
            if self.build_file_contains_uri(&build_uri, uri) {
                return Some(build_uri);
            }
        }
        nearest
    }

    /// Whether the build file's package graph reaches `target`.
    ///
    /// Probes each package root for equality and then walks the imports of
    /// already-materialized documents from those roots; nothing is loaded from
    /// disk to answer the probe.
    fn build_file_contains_uri(&self, build_uri: &Url, target: &Url) -> bool {
        let Some(build_file) = self.build_files.get(build_uri) else { return false };
        let mut visited = HashSet::new();
        let mut worklist: Vec<Url> = build_file
            .config
            .packages
            .iter()
            .filter_map(|package| uri::from_file_path(&package.path).ok())
            .collect();
        while let Some(current) = worklist.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            if &current == target {
                return true;
            }
            if let Some(document) = self.handles.get(&current) {
                worklist.extend(document.import_uris.iter().cloned());
            }
        }
        false
    }

    /// Transitively materializes every missing dependency reachable from the
    /// document at `uri`, then translates its cimports.
    ///
    /// A dependency that fails to load is skipped; the worklist is bounded by
    /// the handle map, so import cycles terminate.
    fn ensure_dependencies_processed(&mut self, uri: &Url) {
        let mut worklist = match self.handles.get(uri) {
            Some(document) => self.dependencies_of(document),
            None => return,
        };
        while let Some(dependency) = worklist.pop() {
            if self.handles.contains_key(&dependency) {
                continue;
            }
            let Some(document) = self.create_document_from_uri(dependency.clone(), false) else {
                continue;
            };
            self.handles.insert(document.uri.clone(), document);
            self.ensure_cimports_processed(&dependency);
            if let Some(document) = self.handles.get(&dependency) {
                worklist.extend(self.dependencies_of(document));
            }
        }
        self.ensure_cimports_processed(uri);
    }

    /// Translates every not-yet-cached cimport of the document and
    /// materializes successful translation targets.
    ///
    /// A rejected translation is cached as a failure and stops processing of
    /// the document's remaining cimports; a translation that could not be
    /// attempted is skipped without caching.
    fn ensure_cimports_processed(&mut self, uri: &Url) {
        let Some(document) = self.handles.get(uri) else { return };
        let pending: Vec<(String, String)> = document
            .cimports
            .iter()
            .filter(|c| !self.cimports.contains_key(&c.hash))
            .map(|c| (c.hash.clone(), c.source.clone()))
            .collect();
        if pending.is_empty() {
            return;
        }
        let include_dirs: Vec<PathBuf> = document
            .associated_build_file
            .as_ref()
            .and_then(|u| self.build_files.get(u))
            .map(|build_file| build_file.config.include_dirs.clone())
            .unwrap_or_default();

        for (hash, source) in pending {
            if self.cimports.contains_key(&hash) {
                continue;
            }
            match translate::translate(&self.config, &include_dirs, &source, &hash) {
                Some(CimportResult::Success(translated)) => {
                    self.cimports.insert(hash, CimportResult::Success(translated.clone()));
                    if !self.handles.contains_key(&translated) {
                        if let Some(document) = self.create_document_from_uri(translated, false) {
                            self.handles.insert(document.uri.clone(), document);
                        }
                    }
                }
                Some(CimportResult::Failure) => {
                    self.cimports.insert(hash, CimportResult::Failure);
                    break;
                }
                None => {}
            }
        }
    }

    fn dependencies_of(&self, document: &Document) -> Vec<Url> {
        let mut dependencies = Vec::new();
        self.collect_dependencies(document, &mut dependencies);
        dependencies
    }

    /// Removes every document unreachable from an open document.
    ///
    /// Mark-and-sweep over the import/cimport/associated-package digraph; the
    /// visited set makes cycles terminate. Afterwards the cimport cache is
    /// swept against the surviving documents.
    fn garbage_collection(&mut self) {
        let mut reachable = HashSet::new();
        let mut worklist = Vec::new();
        for (uri, document) in &self.handles {
            if document.open {
                reachable.insert(uri.clone());
                worklist.extend(self.dependencies_of(document));
            }
        }
        while let Some(current) = worklist.pop() {
            if !reachable.insert(current.clone()) {
                continue;
            }
            if let Some(document) = self.handles.get(&current) {
                worklist.extend(self.dependencies_of(document));
            }
        }

        let before = self.handles.len();
        self.handles.retain(|uri, _| reachable.contains(uri));
        let collected = before - self.handles.len();
        if collected > 0 {
            debug!("collected {collected} unreachable documents");
        }

        self.garbage_collection_cimports();
    }

    /// Drops every cimport cache entry whose hash no longer occurs in a live
    /// document.
    fn garbage_collection_cimports(&mut self) {
        let live: HashSet<&str> = self
            .handles
            .values()
            .flat_map(|document| document.cimports.iter().map(|c| c.hash.as_str()))
            .collect();
        let before = self.cimports.len();
        self.cimports.retain(|hash, _| live.contains(hash.as_str()));
        let collected = before - self.cimports.len();
        if collected > 0 {
            debug!("collected {collected} cimport cache entries");
        }
    }
}

fn is_build_file_uri(uri: &Url) -> bool {
    uri.path().rsplit('/').next() == Some(build_file::BUILD_FILE_NAME)
}

fn collect_cimports(data: &ZigData) -> Vec<Cimport> {
    data.cimports
        .iter()
        .map(|cimport| Cimport {
            node: cimport.span(),
            hash: utils::content_hash(cimport.data()),
            source: cimport.data().clone(),
        })
        .collect()
}

/// Resolution policy for a raw import string:
///
/// | import | resolution |
/// |---|---|
/// | `"std"` | `<zig_lib_path>/std/std.zig`, if configured |
/// | `"builtin"` | the associated build file's builtin override, else the configured fallback |
/// | name without `.zig` | package lookup in the associated build file |
/// | path ending in `.zig` | relative to the importing document |
///
/// Only targets that exist on disk resolve; everything else is dropped, which
/// keeps the resolved import lists free of references that could never be
/// materialized.
fn resolve_import(
    config: &Config,
    build_file: Option<&BuildFile>,
    base: &Url,
    import: &str,
) -> Option<Url> {
    let candidate = if import == "std" {
        let lib = config.zig_lib_path.as_deref()?;
        uri::from_file_path(lib.join("std").join("std.zig")).ok()?
    } else if import == "builtin" {
        match build_file.and_then(|build_file| build_file.builtin_uri.clone()) {
            Some(builtin) => builtin,
            None => uri::from_file_path(config.builtin_path.as_deref()?).ok()?,
        }
    } else if !import.ends_with(".zig") {
        let build_file = build_file?;
        let package = build_file.config.packages.iter().find(|package| package.name == import)?;
        uri::from_file_path(&package.path).ok()?
    } else {
        uri::resolve_relative(base, import)?
    };

    let path = uri::to_file_path(&candidate).ok()?;
    if path.metadata().is_err() {
        trace!("dropping unresolved import {import:?} of {base}");
        return None;
    }
    Some(candidate)
}
