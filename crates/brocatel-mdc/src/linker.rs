//! Multi-file linking.
//!
//! Starting from the entry file, linked files are fetched and compiled wave by
//! wave. The compiled tables are merged into one bundle with a manifest, and
//! every story link is checked against the label trees of the loaded files.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::future::Future;
use std::path::PathBuf;

use brocatel_md::{Diagnostic, Position};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::compiler::{CompiledFile, Compiler};
use crate::error::{CompileError, FetchError};
use crate::gettext::compile_gettext;
use crate::links::{LabelTreeValidator, LinkCheck, LinkValidator, normalize_stem};
use crate::source_map::{MarkdownSourceError, SourceMap, lua_error_to_source};
use crate::table::{quote, table_key};

/// Bundle format version understood by the runtime.
pub const BUNDLE_VERSION: u32 = 1;

/// Loads story sources by stem.
pub trait SourceFetcher: Send + Sync {
    /// Returns the Markdown content of `<stem>.md`.
    fn fetch(&self, stem: &str) -> impl Future<Output = Result<String, FetchError>> + Send;
}

/// Reads `<dir>/<stem>.md` from disk.
#[derive(Clone, Debug)]
pub struct FsFetcher {
    dir: PathBuf,
}

impl FsFetcher {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl SourceFetcher for FsFetcher {
    async fn fetch(&self, stem: &str) -> Result<String, FetchError> {
        let path = self.dir.join(format!("{stem}.md"));
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(stem.to_owned()))
            }
            Err(source) => Err(FetchError::Io { path, source }),
        }
    }
}

/// Serves sources from memory.
#[derive(Clone, Debug, Default)]
pub struct MemoryFetcher {
    files: HashMap<String, String>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_file(mut self, stem: impl Into<String>, content: impl Into<String>) -> Self {
        self.files.insert(stem.into(), content.into());
        self
    }
}

impl SourceFetcher for MemoryFetcher {
    async fn fetch(&self, stem: &str) -> Result<String, FetchError> {
        self.files
            .get(stem)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(stem.to_owned()))
    }
}

/// A pending fetch and the link that asked for it.
struct Request {
    stem: String,
    referrer: Option<(String, Option<Position>)>,
}

/// Files reached from the entry, before validation.
struct Loaded {
    files: BTreeMap<String, Option<CompiledFile>>,
    globals: Vec<String>,
    diagnostics: Vec<Diagnostic>,
}

/// A linked story.
#[derive(Clone, Debug)]
pub struct Bundle {
    pub entry: String,
    /// The complete Lua chunk.
    pub code: String,
    /// SHA-256 of the bundle rendered with an empty checksum.
    pub checksum: String,
    /// Every file reached from the entry; `None` when it could not be loaded.
    pub files: BTreeMap<String, Option<CompiledFile>>,
    /// Diagnostics of all files, then fetch and link problems.
    pub diagnostics: Vec<Diagnostic>,
    pub source_map: SourceMap,
}

impl Bundle {
    /// Whether linking produced no diagnostics at all.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Renders the translation template for every loaded file.
    #[must_use]
    pub fn gettext(&self, date: DateTime<Utc>) -> String {
        let files: Vec<(String, &CompiledFile)> = self
            .files
            .values()
            .flatten()
            .map(|file| (file.file_name(), file))
            .collect();
        compile_gettext(
            files
                .iter()
                .map(|(name, file)| (name.as_str(), file.texts.as_slice())),
            date,
        )
    }

    /// Maps a runtime error raised by this bundle back to Markdown.
    #[must_use]
    pub fn locate_error(&self, message: &str) -> Option<MarkdownSourceError> {
        lua_error_to_source(message, &self.source_map)
    }
}

/// Compiles and links a story.
///
/// # Example
///
/// ```
/// use brocatel_mdc::{Compiler, Linker, MemoryFetcher};
///
/// let fetcher = MemoryFetcher::new().with_file("main", "Hello World!");
/// let linker = Linker::new(Compiler::default(), fetcher);
/// let bundle = futures::executor::block_on(linker.compile_all("main")).unwrap();
/// assert!(bundle.is_clean());
/// assert!(bundle.code.starts_with("local _={}\n"));
/// ```
pub struct Linker<F> {
    compiler: Compiler,
    fetcher: F,
}

impl<F: SourceFetcher> Linker<F> {
    #[must_use]
    pub fn new(compiler: Compiler, fetcher: F) -> Self {
        Self { compiler, fetcher }
    }

    /// Compiles `entry` and every file it links to, directly or not, and
    /// validates links with [`LabelTreeValidator`].
    ///
    /// # Errors
    ///
    /// Returns [`CompileError`] when a file cannot be compiled at all.
    pub async fn compile_all(&self, entry: &str) -> Result<Bundle, CompileError> {
        let Loaded {
            files,
            globals,
            mut diagnostics,
        } = self.load(entry).await?;

        let mut validator = LabelTreeValidator::new();
        for file in files.values().flatten() {
            validator.insert(file.stem.clone(), file.labels.clone());
        }
        diagnostics.extend(validate_links(&files, &validator));

        let ifid = files
            .get(entry)
            .and_then(Option::as_ref)
            .map(|file| file.ifid.clone())
            .unwrap_or_default();
        let (code, checksum, source_map) = render_bundle(entry, &files, &globals, &ifid);
        info!(
            entry,
            files = files.len(),
            diagnostics = diagnostics.len(),
            "story linked"
        );
        Ok(Bundle {
            entry: entry.to_owned(),
            code,
            checksum,
            files,
            diagnostics,
            source_map,
        })
    }

    async fn load(&self, entry: &str) -> Result<Loaded, CompileError> {
        let mut files = BTreeMap::new();
        let mut globals = Vec::new();
        let mut diagnostics = Vec::new();
        let mut seen = HashSet::from([entry.to_owned()]);
        let mut wave = vec![Request {
            stem: entry.to_owned(),
            referrer: None,
        }];

        while !wave.is_empty() {
            debug!(files = wave.len(), "fetching");
            let results = join_all(wave.iter().map(|r| self.fetcher.fetch(&r.stem))).await;
            let mut next = Vec::new();
            for (request, result) in wave.into_iter().zip(results) {
                let content = match result {
                    Ok(content) => content,
                    Err(error) => {
                        warn!(file = %request.stem, %error, "cannot load file");
                        let message = format!("cannot load file: {}", request.stem);
                        diagnostics.push(match request.referrer {
                            Some((file, position)) => {
                                Diagnostic::new(message, position).with_file(file)
                            }
                            None => Diagnostic::new(message, None)
                                .with_file(format!("{}.md", request.stem)),
                        });
                        files.insert(request.stem, None);
                        continue;
                    }
                };
                debug!(file = %request.stem, bytes = content.len(), "compiling");
                let compiled = self.compiler.compile(&request.stem, &content)?;
                for (dependency, position) in &compiled.dependencies {
                    let stem = normalize_stem(dependency);
                    if seen.insert(stem.clone()) {
                        next.push(Request {
                            stem,
                            referrer: Some((compiled.file_name(), *position)),
                        });
                    }
                }
                globals.extend(compiled.globals.iter().cloned());
                diagnostics.extend(compiled.diagnostics.iter().cloned());
                files.insert(request.stem, Some(compiled));
            }
            wave = next;
        }
        Ok(Loaded {
            files,
            globals,
            diagnostics,
        })
    }
}

/// Reports every link `validator` finds broken.
pub fn validate_links(
    files: &BTreeMap<String, Option<CompiledFile>>,
    validator: &dyn LinkValidator,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for file in files.values().flatten() {
        for link in &file.links {
            if validator.check(&file.stem, link) == LinkCheck::Broken {
                debug!(file = %file.stem, target = %link.target(), "broken link");
                diagnostics.push(
                    Diagnostic::new(format!("link not found: {}", link.target()), link.position)
                        .with_file(file.file_name()),
                );
            }
        }
    }
    diagnostics
}

/// Current 1-based line and 0-based column at the end of `s`.
fn cursor(s: &str) -> (usize, usize) {
    let line = s.matches('\n').count() + 1;
    let column = s.rsplit('\n').next().map_or(0, |last| last.chars().count());
    (line, column)
}

fn render(
    entry: &str,
    files: &BTreeMap<String, Option<CompiledFile>>,
    globals: &[String],
    ifid: &[String],
    checksum: &str,
    mut source_map: Option<&mut SourceMap>,
) -> String {
    let mut out = String::from("local _={}\n");
    for global in globals {
        out.push_str(global.trim_end());
        out.push('\n');
    }
    out.push_str("return {\n");
    for (stem, file) in files {
        let _ = write!(out, "{}=", table_key(stem));
        match file {
            Some(file) => {
                if let Some(map) = source_map.as_deref_mut() {
                    let (line, column) = cursor(&out);
                    map.add_source(&file.file_name(), &file.mappings, line, column);
                }
                out.push_str(&file.code);
            }
            None => out.push_str("nil"),
        }
        out.push_str(",\n");
    }
    out.push_str("[\"\"]={");
    if !ifid.is_empty() {
        let ids: Vec<String> = ifid.iter().map(|id| quote(&format!("UUID://{id}//"))).collect();
        let _ = write!(out, "IFID={{{}}},", ids.join(","));
    }
    let _ = write!(
        out,
        "checksum={},entry={},version={BUNDLE_VERSION}}}\n}}\n",
        quote(checksum),
        quote(entry)
    );
    out
}

/// Renders the bundle chunk, returning it with its checksum and source map.
///
/// The checksum is the SHA-256 of the chunk rendered with an empty checksum.
#[must_use]
pub fn render_bundle(
    entry: &str,
    files: &BTreeMap<String, Option<CompiledFile>>,
    globals: &[String],
    ifid: &[String],
) -> (String, String, SourceMap) {
    let unsigned = render(entry, files, globals, ifid, "", None);
    let mut hasher = Sha256::new();
    hasher.update(unsigned.as_bytes());
    let checksum = hex::encode(hasher.finalize());

    let mut source_map = SourceMap::new(format!("{entry}.lua"));
    let code = render(entry, files, globals, ifid, &checksum, Some(&mut source_map));
    (code, checksum, source_map)
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;

    use super::*;

    fn link(fetcher: MemoryFetcher, entry: &str) -> Bundle {
        block_on(Linker::new(Compiler::default(), fetcher).compile_all(entry)).unwrap()
    }

    fn messages(bundle: &Bundle) -> Vec<(String, String, usize)> {
        bundle
            .diagnostics
            .iter()
            .map(|d| {
                (
                    d.message.clone(),
                    d.file.clone().unwrap_or_default(),
                    d.position.map_or(0, |p| p.start.line),
                )
            })
            .collect()
    }

    #[test]
    fn test_single_file_bundle() {
        let bundle = link(MemoryFetcher::new().with_file("main", "Hello World!"), "main");
        assert!(bundle.is_clean());
        assert_eq!(
            bundle.code,
            format!(
                "local _={{}}\nreturn {{\nmain={{_,\n\"Hello World!\"}},\n\
                 [\"\"]={{checksum=\"{}\",entry=\"main\",version=1}}\n}}\n",
                bundle.checksum
            )
        );
        assert_eq!(bundle.checksum.len(), 64);
    }

    #[test]
    fn test_checksum_is_stable() {
        let fetcher = MemoryFetcher::new()
            .with_file("main", "# A\n\n[b](other.md#b)")
            .with_file("other", "# B\n\n[a](main.md#a)");
        let first = link(fetcher.clone(), "main");
        let second = link(fetcher, "main");
        assert_eq!(first.code, second.code);
        assert_eq!(first.checksum, second.checksum);

        let unsigned = first.code.replace(&first.checksum, "");
        let mut hasher = Sha256::new();
        hasher.update(unsigned.as_bytes());
        assert_eq!(hex::encode(hasher.finalize()), first.checksum);
    }

    #[test]
    fn test_cross_file_links() {
        let fetcher = MemoryFetcher::new()
            .with_file("main", "# A\n\n[b](other.md#b)")
            .with_file("other", "# B\n\n[a](main.md#a)");
        let bundle = link(fetcher.clone(), "main");
        assert!(bundle.is_clean(), "{:?}", bundle.diagnostics);
        let stems: Vec<&str> = bundle.files.keys().map(String::as_str).collect();
        assert_eq!(stems, vec!["main", "other"]);
        assert!(bundle.code.contains("\nother={"));

        let fetcher = fetcher.with_file("other", "# C\n\n[a](main.md#a)");
        let bundle = link(fetcher, "main");
        assert_eq!(
            messages(&bundle),
            vec![("link not found: b".to_owned(), "main.md".to_owned(), 3)]
        );
    }

    #[test]
    fn test_missing_file() {
        let bundle = link(MemoryFetcher::new().with_file("main", "[x](gone.md#x)"), "main");
        assert_eq!(
            messages(&bundle),
            vec![("cannot load file: gone".to_owned(), "main.md".to_owned(), 1)]
        );
        assert_eq!(bundle.files.get("gone").map(Option::is_none), Some(true));
        assert!(bundle.code.contains("\ngone=nil,\n"));

        let bundle = link(MemoryFetcher::new(), "main");
        assert_eq!(
            messages(&bundle),
            vec![("cannot load file: main".to_owned(), "main.md".to_owned(), 0)]
        );
    }

    #[test]
    fn test_shared_dependency_is_fetched_once() {
        let fetcher = MemoryFetcher::new()
            .with_file("main", "[a](a.md#x)\n\n[b](b.md#x)")
            .with_file("a", "# X\n\n[c](c.md#x)")
            .with_file("b", "# X\n\n[c](c.md#x)")
            .with_file("c", "# X");
        let bundle = link(fetcher, "main");
        assert!(bundle.is_clean(), "{:?}", bundle.diagnostics);
        assert_eq!(bundle.files.len(), 4);
        assert_eq!(bundle.code.matches("\nc={").count(), 1);
    }

    #[test]
    fn test_link_spellings_share_one_file() {
        let fetcher = MemoryFetcher::new()
            .with_file("main", "[a](./other.md#x)\n\n[b](other.md#x)\n\n[c](#x \"other.md\")")
            .with_file("other", "# X");
        let bundle = link(fetcher, "main");
        assert!(bundle.is_clean(), "{:?}", bundle.diagnostics);
        let stems: Vec<&str> = bundle.files.keys().map(String::as_str).collect();
        assert_eq!(stems, vec!["main", "other"]);
    }

    #[test]
    fn test_globals_and_ifid() {
        let main = "---\nIFID: 9e2c5a3e-2d4f-4c1a-8b7e-0a1b2c3d4e5f\n---\n\n```lua global\nCOUNT = 0\n```\n\ntext";
        let bundle = link(MemoryFetcher::new().with_file("main", main), "main");
        assert!(bundle.is_clean(), "{:?}", bundle.diagnostics);
        assert!(bundle.code.starts_with("local _={}\nCOUNT = 0\nreturn {\n"));
        assert!(bundle.code.contains(
            "[\"\"]={IFID={\"UUID://9E2C5A3E-2D4F-4C1A-8B7E-0A1B2C3D4E5F//\"},checksum="
        ));
    }

    #[test]
    fn test_locate_error() {
        let bundle = link(MemoryFetcher::new().with_file("main", "a\n\nb\n\n`x()` c"), "main");
        let line = bundle.code.lines().position(|l| l == "x()").unwrap() + 1;
        let error = bundle
            .locate_error(&format!("[string \"main\"]:{line}: attempt to call a nil value"))
            .unwrap();
        assert_eq!(error.source, "main.md");
        assert_eq!(error.start.line, 5);
        assert_eq!(error.message, "attempt to call a nil value");
    }

    #[test]
    fn test_gettext() {
        let bundle = link(MemoryFetcher::new().with_file("main", "hello"), "main");
        let date = DateTime::<Utc>::from_timestamp(0, 0).unwrap();
        let pot = bundle.gettext(date);
        assert!(pot.contains("#: main.md:1\n#, python-brace-format\nmsgid \"hello\"\nmsgstr \"\"\n"));
        assert!(pot.contains("POT-Creation-Date: 1970-01-01 00:00+0000"));
    }

    #[test]
    fn test_cursor() {
        assert_eq!(cursor("ab"), (1, 2));
        assert_eq!(cursor("a\nbc"), (2, 2));
        assert_eq!(cursor("a\n"), (2, 0));
    }

    #[tokio::test]
    async fn test_fs_fetcher() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.md"), "# Start\n\n[go](next.md#end)").unwrap();
        std::fs::write(dir.path().join("next.md"), "# End").unwrap();
        let fetcher = FsFetcher::new(dir.path());
        assert!(matches!(
            fetcher.fetch("missing").await,
            Err(FetchError::NotFound(stem)) if stem == "missing"
        ));
        let bundle = Linker::new(Compiler::default(), fetcher)
            .compile_all("main")
            .await
            .unwrap();
        assert!(bundle.is_clean(), "{:?}", bundle.diagnostics);
        assert_eq!(bundle.files.len(), 2);
    }
}
