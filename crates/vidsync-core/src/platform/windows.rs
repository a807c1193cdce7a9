use std::path::{Component, Path, PathBuf, Prefix};

/// `fs::canonicalize` yields `\\?\C:\...` on Windows; rewrite it to `C:\...` so the
/// same folder always produces the same key string.
pub fn strip_verbatim_prefix(path: &Path) -> PathBuf {
    let mut components = path.components();
    match components.next() {
        Some(Component::Prefix(prefix)) => match prefix.kind() {
            Prefix::VerbatimDisk(letter) => {
                let mut result = PathBuf::from(format!("{}:\\", letter as char));
                for component in components {
                    if let Component::Normal(part) = component {
                        result.push(part);
                    }
                }
                result
            }
            _ => path.to_path_buf(),
        },
        _ => path.to_path_buf(),
    }
}
