//! Site writer: walks the notes tree, renders every entry into the output
//! directory and writes the aggregate pages (home, search data, tags,
//! permalinks).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::slice;
use std::time::{Instant, SystemTime};

use anyhow::{Context, Result, bail};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::Classification;
use crate::frontmatter::read_body;
use crate::html::{self, tag_slug};
use crate::paths::{canonical_key, display_path};
use crate::record::Record;
use crate::render::MarkdownRenderer;
use crate::store::{DIRECTORY_PAGE_FILENAME, PropertyStore};
use crate::views::{TagEntry, build_views};
use crate::walk::{SkippedEntry, WalkReport, walk_notes};

pub const SEARCH_DATA_FILENAME: &str = "search.json";
pub const TAGS_DIRNAME: &str = "tags";
pub const PERMALINK_DIRNAME: &str = "permalink";
pub const LICENSE_FILENAME: &str = "LICENSE";
/// Owner recorded for the home, search, tag and permalink outputs.
pub const GENERATED_PAGES_OWNER: &str = "<generated site pages>";

#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Re-render even when an output is newer than its source.
    pub force: bool,
    pub workers: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            force: false,
            workers: 1,
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct BuildReport {
    pub walk: WalkReport,
    pub pages_written: usize,
    pub files_copied: usize,
    pub unchanged: usize,
    pub failed: Vec<SkippedEntry>,
    pub tags: usize,
    pub permalinks: usize,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Written,
    Copied,
    Unchanged,
}

/// Per-build inputs shared by every render worker.
struct RenderContext<'a> {
    renderer: &'a dyn MarkdownRenderer,
    license: Option<&'a str>,
    input_root: &'a Path,
    index_filename: &'a str,
    force: bool,
}

impl RenderContext<'_> {
    fn render(&self, record: &Record) -> Result<Outcome> {
        let source = &record.source_path;
        match record.classification {
            Classification::Directory => {
                let content = self.render_index_document(source)?;
                let target = record.output.raw.join(DIRECTORY_PAGE_FILENAME);
                write_page(&target, &html::directory_page(record, &content))?;
                Ok(Outcome::Written)
            }
            Classification::Markdown => {
                let target = html_target(record)?;
                if self.is_current(target, &self.page_inputs(source)) {
                    return Ok(Outcome::Unchanged);
                }
                let body = read_body(source)?;
                let content = self.renderer.render(&body)?;
                write_page(target, &html::article_page(record, &content, self.license))?;
                Ok(Outcome::Written)
            }
            Classification::Plaintext => {
                let target = html_target(record)?;
                if self.is_current(target, &self.page_inputs(source)) {
                    return Ok(Outcome::Unchanged);
                }
                let bytes =
                    fs::read(source).with_context(|| format!("failed to read {}", source.display()))?;
                copy_file(source, &record.output.raw)?;
                let text = String::from_utf8_lossy(&bytes);
                write_page(target, &html::text_page(record, &text, self.license))?;
                Ok(Outcome::Written)
            }
            Classification::Opaque => {
                if self.is_current(&record.output.raw, slice::from_ref(source)) {
                    return Ok(Outcome::Unchanged);
                }
                copy_file(source, &record.output.raw)?;
                Ok(Outcome::Copied)
            }
        }
    }

    /// Files shown on an entry's page: the entry, each ancestor's index
    /// document up to the notes root, and the LICENSE in the footer.
    fn page_inputs(&self, source: &Path) -> Vec<PathBuf> {
        let mut inputs = vec![
            source.to_path_buf(),
            self.input_root.join(LICENSE_FILENAME),
        ];
        for dir in source.ancestors().skip(1) {
            if !dir.starts_with(self.input_root) {
                break;
            }
            inputs.push(dir.join(self.index_filename));
        }
        inputs
    }

    /// True when `output` exists and no existing input is newer.
    fn is_current(&self, output: &Path, inputs: &[PathBuf]) -> bool {
        if self.force {
            return false;
        }
        let Some(built) = modified(output) else {
            return false;
        };
        inputs
            .iter()
            .filter_map(|input| modified(input))
            .all(|changed| changed <= built)
    }

    /// Rendered body of a directory's index document, or empty when it has
    /// none.
    fn render_index_document(&self, dir: &Path) -> Result<String> {
        let index_document = dir.join(self.index_filename);
        if !index_document.is_file() {
            return Ok(String::new());
        }
        let body = read_body(&index_document)?;
        if body.trim().is_empty() {
            return Ok(String::new());
        }
        Ok(self.renderer.render(&body)?)
    }
}

fn html_target(record: &Record) -> Result<&Path> {
    record.output.html.as_deref().with_context(|| {
        format!(
            "no html output mapped for {}",
            display_path(&record.source_path)
        )
    })
}

/// Build the whole site under `output_dir`. The store's layout must mirror the
/// notes tree into a directory that neither contains nor sits inside the notes
/// tree.
pub fn build_site(
    store: &mut PropertyStore,
    output_dir: &Path,
    renderer: &dyn MarkdownRenderer,
    options: &BuildOptions,
) -> Result<BuildReport> {
    let started = Instant::now();
    let output_dir = canonical_key(output_dir);
    let output_dir = output_dir.as_path();
    ensure_separate_trees(store, output_dir)?;
    reserve_generated_pages(store, output_dir)?;
    let walk = walk_notes(store)?;
    let input_root = store.layout().input_root.clone();
    let index_filename = store.index_filename().to_string();
    let license = read_license(&input_root)?;

    let mut report = BuildReport::default();
    let mut jobs = Vec::with_capacity(walk.visited());
    for dir in &walk.directories {
        match store.get_with_index_entries(dir) {
            Ok(record) => {
                fs::create_dir_all(&record.output.raw).with_context(|| {
                    format!("failed to create {}", record.output.raw.display())
                })?;
                jobs.push(record);
            }
            Err(error) => skip(&mut report.failed, dir, &error),
        }
    }
    for file in &walk.files {
        match store.get(file) {
            Ok(record) => jobs.push(record),
            Err(error) => skip(&mut report.failed, file, &error),
        }
    }
    info!(jobs = jobs.len(), workers = options.workers, "rendering entries");

    let context = RenderContext {
        renderer,
        license: license.as_deref(),
        input_root: &input_root,
        index_filename: &index_filename,
        force: options.force,
    };
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(options.workers.max(1))
        .thread_name(|i| format!("notesweb-render-{i}"))
        .build()
        .context("failed to build render thread pool")?;
    let outcomes: Vec<(&Record, Result<Outcome>)> = pool.install(|| {
        jobs.par_iter()
            .map(|record| (record, context.render(record)))
            .collect()
    });

    for (record, outcome) in outcomes {
        match outcome {
            Ok(Outcome::Written) => report.pages_written += 1,
            Ok(Outcome::Copied) => report.files_copied += 1,
            Ok(Outcome::Unchanged) => {
                debug!(path = %record.source_path.display(), "output up to date");
                report.unchanged += 1;
            }
            Err(error) => skip(&mut report.failed, &record.source_path, &format!("{error:#}")),
        }
    }

    let views = build_views(store).context("failed to collect site views")?;
    let root = store
        .get(&input_root)
        .context("failed to resolve notes root")?;
    let home_content = context
        .render_index_document(&input_root)
        .context("failed to render home page")?;
    let home = html::home_page(
        &root.title,
        &home_content,
        store.layout().base_url(),
        &views.search_index,
    )?;
    write_page(&output_dir.join(DIRECTORY_PAGE_FILENAME), &home)?;

    write_search_data(output_dir, &views.search_index)?;
    report.tags = write_tag_browser(&output_dir.join(TAGS_DIRNAME), &views.tag_groups)?;
    let permalink = html::permalink_page(&views.permalinks)?;
    write_page(
        &output_dir
            .join(PERMALINK_DIRNAME)
            .join(DIRECTORY_PAGE_FILENAME),
        &permalink,
    )?;
    report.permalinks = views.permalinks.len();

    report.walk = walk;
    report.elapsed_ms = started.elapsed().as_millis();
    info!(
        written = report.pages_written,
        copied = report.files_copied,
        unchanged = report.unchanged,
        failed = report.failed.len(),
        elapsed_ms = report.elapsed_ms,
        "site generated"
    );
    Ok(report)
}

fn ensure_separate_trees(store: &PropertyStore, output_dir: &Path) -> Result<()> {
    let layout = store.layout();
    let (notes, mirror) = (&layout.input_root, &layout.output_root);
    if mirror.starts_with(notes) || notes.starts_with(mirror) {
        bail!(
            "site root {} overlaps the notes directory {}",
            display_path(mirror),
            display_path(notes)
        );
    }
    if output_dir.starts_with(notes) {
        bail!(
            "output directory {} must not be inside the notes directory {}",
            display_path(output_dir),
            display_path(notes)
        );
    }
    Ok(())
}

/// Claim the site-level outputs before the walk. The home page is owned by the
/// notes root, since with a `/` base URL the root listing lands on it.
fn reserve_generated_pages(store: &mut PropertyStore, output_dir: &Path) -> Result<()> {
    let owner = Path::new(GENERATED_PAGES_OWNER);
    let input_root = store.layout().input_root.clone();
    store.reserve_output(&output_dir.join(DIRECTORY_PAGE_FILENAME), &input_root)?;
    store.reserve_output(&output_dir.join(SEARCH_DATA_FILENAME), owner)?;
    store.reserve_output(
        &output_dir
            .join(PERMALINK_DIRNAME)
            .join(DIRECTORY_PAGE_FILENAME),
        owner,
    )?;
    store.reserve_tree(&output_dir.join(TAGS_DIRNAME), owner)?;
    Ok(())
}

fn skip(failed: &mut Vec<SkippedEntry>, path: &Path, error: &dyn std::fmt::Display) {
    warn!(path = %path.display(), %error, "skipping entry");
    failed.push(SkippedEntry {
        path: display_path(path),
        reason: error.to_string(),
    });
}

fn read_license(input_root: &Path) -> Result<Option<String>> {
    let path = input_root.join(LICENSE_FILENAME);
    if !path.is_file() {
        return Ok(None);
    }
    let text =
        fs::read_to_string(&path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(text))
}

pub fn write_search_data<T: Serialize>(output_dir: &Path, search_index: &T) -> Result<PathBuf> {
    let path = output_dir.join(SEARCH_DATA_FILENAME);
    let json = serde_json::to_string_pretty(search_index).context("failed to encode search data")?;
    write_page(&path, &json)?;
    Ok(path)
}

/// One page per tag plus an index of tags. The directory is regenerated from
/// scratch so removed tags disappear. Returns the number of tag pages.
fn write_tag_browser(
    tags_dir: &Path,
    tag_groups: &BTreeMap<String, Vec<TagEntry>>,
) -> Result<usize> {
    if tags_dir.exists() {
        fs::remove_dir_all(tags_dir)
            .with_context(|| format!("failed to clear {}", tags_dir.display()))?;
    }

    // Distinct tags can share a slug; their entries share one page.
    let mut pages: BTreeMap<String, (String, Vec<TagEntry>)> = BTreeMap::new();
    for (tag, entries) in tag_groups {
        let page = pages
            .entry(tag_slug(tag))
            .or_insert_with(|| (tag.clone(), Vec::new()));
        page.1.extend(entries.iter().cloned());
    }

    let mut names = BTreeMap::new();
    for (slug, (name, entries)) in &pages {
        write_page(
            &tags_dir.join(slug).join(DIRECTORY_PAGE_FILENAME),
            &html::tag_page(name, entries),
        )?;
        names.insert(slug.clone(), name.clone());
    }
    write_page(
        &tags_dir.join(DIRECTORY_PAGE_FILENAME),
        &html::tags_index_page(&names),
    )?;
    Ok(pages.len())
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

fn write_page(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    }
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

fn copy_file(source: &Path, target: &Path) -> Result<()> {
    if let (Ok(from), Ok(to)) = (fs::canonicalize(source), fs::canonicalize(target))
        && from == to
    {
        bail!("refusing to copy {} onto itself", source.display());
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    }
    fs::copy(source, target).with_context(|| {
        format!(
            "failed to copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tempfile::{TempDir, tempdir};

    use super::*;
    use crate::classify::Classifier;
    use crate::classify::testing::ExtensionSniffer;
    use crate::output_paths::SiteLayout;
    use crate::render::RenderError;
    use crate::render::testing::EchoRenderer;

    struct Site {
        _temp: TempDir,
        notes: PathBuf,
        output: PathBuf,
    }

    impl Site {
        fn store(&self) -> PropertyStore {
            PropertyStore::new(SiteLayout::new(
                &self.notes,
                &self.output.join("notes"),
                "/notes",
            ))
            .with_classifier(Classifier::new(Box::new(ExtensionSniffer)))
        }

        fn read(&self, relative: &str) -> String {
            fs::read_to_string(self.output.join(relative)).expect("read output")
        }
    }

    fn fixture() -> Site {
        let temp = tempdir().expect("tempdir");
        let notes = temp.path().join("notes");
        let maths = notes.join("maths");
        fs::create_dir_all(&maths).expect("maths");
        fs::create_dir_all(notes.join(".git")).expect("git");
        fs::write(
            notes.join("readme.md"),
            "---\ntitle: Home\ntags: [root]\n---\nWelcome home\n",
        )
        .expect("root readme");
        fs::write(notes.join("LICENSE"), "CC0 everything").expect("license");
        fs::write(
            maths.join("readme.md"),
            "---\ntags: [stem]\nsearch_bar: false\n---\nMaths intro\n",
        )
        .expect("maths readme");
        fs::write(
            maths.join("calc.md"),
            "---\ntitle: Calculus\nuuid: calc-1\nauthor: Ada\n---\n# Limits\n",
        )
        .expect("calc");
        fs::write(notes.join("data.txt"), "1 < 2\n").expect("data");
        fs::write(notes.join("image.png"), [0x89u8, 0x50, 0x4e, 0x47]).expect("image");
        let output = temp.path().join("web");
        Site {
            _temp: temp,
            notes,
            output,
        }
    }

    #[test]
    fn build_writes_every_page() {
        let site = fixture();
        let renderer = EchoRenderer::default();
        let report = build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("build");

        assert!(report.failed.is_empty());
        assert_eq!(report.walk.directories.len(), 2);
        assert_eq!(report.walk.files.len(), 4);
        assert_eq!(report.files_copied, 2);
        assert_eq!(report.pages_written, 4);
        assert_eq!(report.tags, 2);
        assert_eq!(report.permalinks, 1);

        let home = site.read("index.html");
        assert!(home.contains("<title>Home</title>"));
        assert!(home.contains("<div class=\"rendered\">Welcome home</div>"));
        assert!(home.contains("/notes/maths/calc.html"));

        let root_listing = site.read("notes/index.html");
        assert!(root_listing.contains("<a href=\"/notes/maths\">maths/</a>"));
        assert!(!root_listing.contains("readme.md"));
        assert!(!root_listing.contains(".git"));

        let maths = site.read("notes/maths/index.html");
        assert!(maths.contains("Maths intro"));
        assert!(!maths.contains("id=\"search\""));

        let calc = site.read("notes/maths/calc.html");
        assert!(calc.contains("<div class=\"rendered\"># Limits</div>"));
        assert!(calc.contains("/tags/stem/"));
        assert!(calc.contains("/tags/root/"));
        assert!(calc.contains("CC0 everything"));
        assert!(calc.contains("Ada"));

        assert_eq!(site.read("notes/data.txt"), "1 < 2\n");
        assert!(site.read("notes/data.txt.html").contains("1 &lt; 2"));
        assert_eq!(
            fs::read(site.output.join("notes/image.png")).expect("image"),
            vec![0x89u8, 0x50, 0x4e, 0x47]
        );
        assert!(!site.output.join("notes/readme.html").exists());
        assert!(!site.output.join("notes/maths/readme.html").exists());

        let search: serde_json::Value =
            serde_json::from_str(&site.read("search.json")).expect("search json");
        let paths: Vec<&str> = search
            .as_array()
            .expect("array")
            .iter()
            .filter_map(|entry| entry["path"].as_str())
            .collect();
        assert!(paths.contains(&"/notes/maths/calc.html"));
        assert!(paths.contains(&"/notes/data.txt.html"));

        assert!(site.read("tags/stem/index.html").contains("Calculus"));
        assert!(site.read("tags/index.html").contains("href=\"stem/\""));
        assert!(site.read("permalink/index.html").contains("\"calc-1\":\"/notes/maths/calc.html\""));
    }

    #[test]
    fn rebuild_skips_unchanged_outputs_unless_forced() {
        let site = fixture();
        let renderer = EchoRenderer::default();
        build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("first build");
        let first_calls = renderer.calls();

        let report = build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("second build");
        assert_eq!(report.unchanged, 4);
        // Directory pages and the home page are always regenerated.
        assert_eq!(renderer.calls() - first_calls, 3);

        let before_forced = renderer.calls();
        let report = build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions {
                force: true,
                workers: 2,
            },
        )
        .expect("forced build");
        assert_eq!(report.unchanged, 0);
        assert_eq!(renderer.calls() - before_forced, first_calls);
    }

    struct PickyRenderer;

    impl MarkdownRenderer for PickyRenderer {
        fn render(&self, markdown: &str) -> Result<String, RenderError> {
            if markdown.contains("FAIL") {
                return Err(RenderError::Decode {
                    message: "refused".to_string(),
                });
            }
            Ok(markdown.to_string())
        }
    }

    #[test]
    fn render_failures_skip_only_the_failing_entry() {
        let site = fixture();
        fs::write(site.notes.join("broken.md"), "FAIL here").expect("broken");
        fs::write(site.notes.join("bad-front.md"), "---\ntags: [\n---\n").expect("bad");

        let report = build_site(
            &mut site.store(),
            &site.output,
            &PickyRenderer,
            &BuildOptions::default(),
        )
        .expect("build");
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].path.ends_with("broken.md"));
        assert!(report.failed[0].reason.contains("refused"));
        assert_eq!(report.walk.skipped.len(), 1);
        assert!(site.output.join("notes/maths/calc.html").exists());
        assert!(!site.output.join("notes/broken.html").exists());
    }

    fn touch_later(path: &Path, seconds: u64) {
        let file = fs::File::options().write(true).open(path).expect("open");
        file.set_modified(SystemTime::now() + Duration::from_secs(seconds))
            .expect("set mtime");
    }

    #[test]
    fn ancestor_and_license_edits_refresh_descendant_pages() {
        let site = fixture();
        let renderer = EchoRenderer::default();
        build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("first build");

        let readme = site.notes.join("maths/readme.md");
        fs::write(&readme, "---\ntags: [fresh]\n---\nMaths intro\n").expect("retag");
        touch_later(&readme, 10);
        let report = build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("second build");
        assert_eq!(report.unchanged, 3);
        let calc = site.read("notes/maths/calc.html");
        assert!(calc.contains("/tags/fresh/"));
        assert!(!calc.contains("/tags/stem/"));

        let license = site.notes.join("LICENSE");
        fs::write(&license, "CC BY 4.0").expect("relicense");
        touch_later(&license, 20);
        build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("third build");
        assert!(site.read("notes/data.txt.html").contains("CC BY 4.0"));
        assert!(site.read("notes/maths/calc.html").contains("CC BY 4.0"));
    }

    #[test]
    fn mirror_over_the_notes_tree_is_refused() {
        let site = fixture();
        let workspace = site.notes.parent().expect("parent").to_path_buf();
        let mut store = PropertyStore::new(SiteLayout::new(
            &site.notes,
            &workspace.join(".").join("notes"),
            "/notes",
        ))
        .with_classifier(Classifier::new(Box::new(ExtensionSniffer)));

        let error = build_site(
            &mut store,
            &workspace,
            &EchoRenderer::default(),
            &BuildOptions::default(),
        )
        .expect_err("overlap");
        assert!(error.to_string().contains("overlaps the notes directory"));
        assert_eq!(
            fs::read_to_string(site.notes.join("data.txt")).expect("data"),
            "1 < 2\n"
        );
    }

    #[test]
    fn copy_onto_itself_is_refused() {
        let site = fixture();
        let data = site.notes.join("data.txt");
        let error = copy_file(&data, &site.notes.join(".").join("data.txt")).expect_err("same file");
        assert!(error.to_string().contains("onto itself"));
        assert_eq!(fs::read_to_string(&data).expect("data"), "1 < 2\n");
    }

    fn root_store(site: &Site) -> PropertyStore {
        PropertyStore::new(SiteLayout::new(&site.notes, &site.output, "/"))
            .with_classifier(Classifier::new(Box::new(ExtensionSniffer)))
    }

    #[test]
    fn notes_cannot_shadow_generated_pages() {
        let site = fixture();
        let mine = site.notes.join("tags");
        fs::create_dir_all(&mine).expect("tags dir");
        fs::write(mine.join("mine.md"), "# mine").expect("mine");

        let error = build_site(
            &mut root_store(&site),
            &site.output,
            &EchoRenderer::default(),
            &BuildOptions::default(),
        )
        .expect_err("tags collision");
        assert!(format!("{error:#}").contains("output path collision"));
        assert!(!site.output.join("index.html").exists());

        fs::remove_dir_all(&mine).expect("remove tags dir");
        fs::write(site.notes.join("search.json"), "[]").expect("search");
        let error = build_site(
            &mut root_store(&site),
            &site.output,
            &EchoRenderer::default(),
            &BuildOptions::default(),
        )
        .expect_err("search collision");
        assert!(format!("{error:#}").contains(GENERATED_PAGES_OWNER));
    }

    #[test]
    fn root_base_url_serves_home_at_the_notes_root() {
        let site = fixture();
        let report = build_site(
            &mut root_store(&site),
            &site.output,
            &EchoRenderer::default(),
            &BuildOptions::default(),
        )
        .expect("build");
        assert!(report.failed.is_empty());
        assert!(site.read("index.html").contains("<title>Home</title>"));
        assert!(site.read("maths/calc.html").contains("/tags/stem/"));
        assert!(site.output.join("tags/stem/index.html").exists());
    }

    #[test]
    fn tag_browser_drops_stale_tags() {
        let site = fixture();
        let renderer = EchoRenderer::default();
        fs::create_dir_all(site.output.join("tags/obsolete")).expect("stale");
        build_site(
            &mut site.store(),
            &site.output,
            &renderer,
            &BuildOptions::default(),
        )
        .expect("build");
        assert!(!site.output.join("tags/obsolete").exists());
        assert!(site.output.join("tags/root/index.html").exists());
    }
}
