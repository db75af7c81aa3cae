use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::config::CONFIG_FILENAME;
use crate::paths::{absolutize, display_path};

pub const DEFAULT_NOTES_DIRNAME: &str = "notes";
pub const DEFAULT_OUTPUT_DIRNAME: &str = "web";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PathOverrides {
    pub notes_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub cwd: PathBuf,
}

impl ResolutionContext {
    pub fn from_process() -> Result<Self> {
        let cwd = env::current_dir().context("failed to read current directory")?;
        Ok(Self { cwd })
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedPaths {
    pub notes_dir: PathBuf,
    pub output_dir: PathBuf,
    pub config_path: PathBuf,
    pub notes_source: ValueSource,
    pub output_source: ValueSource,
    pub config_source: ValueSource,
}

impl ResolvedPaths {
    /// Directory the notes tree is mirrored into: the path part of `base_url`
    /// under the output directory, so `/notes` maps to `<output>/notes`.
    pub fn site_root(&self, base_url: &str) -> PathBuf {
        let url_path = match base_url.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("", |at| &rest[at..]),
            None => base_url,
        };
        url_path
            .split('/')
            .filter(|segment| !matches!(*segment, "" | "." | ".."))
            .fold(self.output_dir.clone(), |dir, segment| dir.join(segment))
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "notes_dir={} ({})\noutput_dir={} ({})\nconfig_path={} ({})",
            display_path(&self.notes_dir),
            self.notes_source.as_str(),
            display_path(&self.output_dir),
            self.output_source.as_str(),
            display_path(&self.config_path),
            self.config_source.as_str(),
        )
    }

    /// The notes directory must exist and the output directory must not be a file.
    pub fn ensure_ready_for_build(&self) -> Result<()> {
        if !self.notes_dir.is_dir() {
            bail!(
                "notes directory not found: {}\nPass it as an argument or set NOTESWEB_NOTES_DIR",
                display_path(&self.notes_dir)
            );
        }
        if self.output_dir.is_file() {
            bail!(
                "output directory ({}) cannot be a file",
                display_path(&self.output_dir)
            );
        }
        Ok(())
    }
}

pub fn resolve_paths(
    context: &ResolutionContext,
    overrides: &PathOverrides,
) -> Result<ResolvedPaths> {
    resolve_paths_with_lookup(context, overrides, |key| env::var(key).ok())
}

fn resolve_paths_with_lookup<F>(
    context: &ResolutionContext,
    overrides: &PathOverrides,
    lookup_env: F,
) -> Result<ResolvedPaths>
where
    F: Fn(&str) -> Option<String>,
{
    let pick = |flag: Option<&Path>, key: &str, default: &str| -> (PathBuf, ValueSource) {
        if let Some(path) = flag {
            return (absolutize(path, &context.cwd), ValueSource::Flag);
        }
        if let Some(value) = lookup_env(key)
            && !value.trim().is_empty()
        {
            return (
                absolutize(Path::new(value.trim()), &context.cwd),
                ValueSource::Env,
            );
        }
        (context.cwd.join(default), ValueSource::Default)
    };

    let (notes_dir, notes_source) = pick(
        overrides.notes_dir.as_deref(),
        "NOTESWEB_NOTES_DIR",
        DEFAULT_NOTES_DIRNAME,
    );
    let (output_dir, output_source) = pick(
        overrides.output_dir.as_deref(),
        "NOTESWEB_OUTPUT_DIR",
        DEFAULT_OUTPUT_DIRNAME,
    );
    let (config_path, config_source) =
        pick(overrides.config.as_deref(), "NOTESWEB_CONFIG", CONFIG_FILENAME);

    if notes_dir == output_dir || output_dir.starts_with(&notes_dir) {
        bail!(
            "output directory {} must not be inside the notes directory {}",
            display_path(&output_dir),
            display_path(&notes_dir)
        );
    }

    Ok(ResolvedPaths {
        notes_dir,
        output_dir,
        config_path,
        notes_source,
        output_source,
        config_source,
    })
}

/// Write `content` to `path`, creating parents. Returns false without writing
/// when the file exists and `force` is not set.
pub fn write_text_file(path: &Path, content: &str, force: bool) -> Result<bool> {
    if path.exists() && !force {
        return Ok(false);
    }

    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .with_context(|| format!("failed to create parent directory {}", parent.display()))?;
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    fn context(cwd: &Path) -> ResolutionContext {
        ResolutionContext {
            cwd: cwd.to_path_buf(),
        }
    }

    #[test]
    fn resolve_paths_prefers_flag_over_env() {
        let temp = tempdir().expect("tempdir");
        let from_flag = temp.path().join("flag-notes");
        let overrides = PathOverrides {
            notes_dir: Some(from_flag.clone()),
            ..PathOverrides::default()
        };
        let env = HashMap::from([(
            "NOTESWEB_NOTES_DIR".to_string(),
            temp.path().join("env-notes").to_string_lossy().to_string(),
        )]);

        let resolved = resolve_paths_with_lookup(&context(temp.path()), &overrides, |key| {
            env.get(key).cloned()
        })
        .expect("resolve paths");
        assert_eq!(resolved.notes_dir, from_flag);
        assert_eq!(resolved.notes_source, ValueSource::Flag);
        assert_eq!(resolved.output_source, ValueSource::Default);
    }

    #[test]
    fn resolve_paths_uses_env_then_defaults() {
        let temp = tempdir().expect("tempdir");
        let env = HashMap::from([
            ("NOTESWEB_OUTPUT_DIR".to_string(), "public".to_string()),
            ("NOTESWEB_CONFIG".to_string(), "   ".to_string()),
        ]);
        let resolved = resolve_paths_with_lookup(
            &context(temp.path()),
            &PathOverrides::default(),
            |key| env.get(key).cloned(),
        )
        .expect("resolve paths");
        assert_eq!(resolved.output_dir, temp.path().join("public"));
        assert_eq!(resolved.output_source, ValueSource::Env);
        assert_eq!(resolved.notes_dir, temp.path().join("notes"));
        assert_eq!(resolved.config_path, temp.path().join("notesweb.toml"));
        assert_eq!(resolved.config_source, ValueSource::Default);
        let public = temp.path().join("public");
        assert_eq!(resolved.site_root("/notes"), public.join("notes"));
        assert_eq!(resolved.site_root("https://example.org/a/b"), public.join("a").join("b"));
        assert_eq!(resolved.site_root(""), public);
        assert!(resolved.diagnostics().contains("output_dir="));
        assert!(resolved.diagnostics().contains("(env)"));
    }

    #[test]
    fn resolve_paths_rejects_output_inside_notes() {
        let temp = tempdir().expect("tempdir");
        let overrides = PathOverrides {
            notes_dir: Some(PathBuf::from("notes")),
            output_dir: Some(PathBuf::from("notes/site")),
            ..PathOverrides::default()
        };
        let error = resolve_paths_with_lookup(&context(temp.path()), &overrides, |_| None)
            .expect_err("must fail");
        assert!(error.to_string().contains("must not be inside"));
    }

    #[test]
    fn build_readiness_checks_notes_and_output() {
        let temp = tempdir().expect("tempdir");
        let resolved =
            resolve_paths_with_lookup(&context(temp.path()), &PathOverrides::default(), |_| None)
                .expect("resolve");
        let error = resolved.ensure_ready_for_build().expect_err("no notes");
        assert!(error.to_string().contains("notes directory not found"));

        fs::create_dir_all(&resolved.notes_dir).expect("notes");
        fs::write(&resolved.output_dir, "not a dir").expect("file");
        let error = resolved.ensure_ready_for_build().expect_err("output file");
        assert!(error.to_string().contains("cannot be a file"));

        fs::remove_file(&resolved.output_dir).expect("remove");
        resolved.ensure_ready_for_build().expect("ready");
    }

    #[test]
    fn write_text_file_respects_force() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("out.txt");
        assert!(write_text_file(&path, "one", false).expect("first write"));
        assert!(!write_text_file(&path, "two", false).expect("second write"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "one");
        assert!(write_text_file(&path, "three", true).expect("forced write"));
        assert_eq!(fs::read_to_string(&path).expect("read"), "three");
    }
}
