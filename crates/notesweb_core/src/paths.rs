use std::env;
use std::path::{Component, Path, PathBuf};

pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

pub fn display_path(path: &Path) -> String {
    normalize_separators(&path.to_string_lossy())
}

/// Lexically normalize `path`: drop `.` segments and resolve `..` against the
/// preceding segment. Symlinks are not followed.
pub fn normalize_pathbuf(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => out.push(prefix.as_os_str()),
            Component::RootDir => out.push(Path::new(std::path::MAIN_SEPARATOR_STR)),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

pub fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Absolute, normalized form of `path` relative to the process working
/// directory. This is the memoization key for every entry.
pub fn canonical_key(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_pathbuf(path);
    }
    match env::current_dir() {
        Ok(cwd) => normalize_pathbuf(&cwd.join(path)),
        Err(_) => normalize_pathbuf(path),
    }
}

/// True for names that a site walk never publishes (`.git`, editor swap dirs).
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}
