//! Lexical path checks.

use std::path::{Component, Path, PathBuf};

/// Resolve `.` and `..` components without touching the filesystem.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() {
                    result.push(component);
                }
            }
            _ => result.push(component),
        }
    }
    result
}

/// Whether `path` lies under `dir` once both are normalized.
///
/// `/root/pkgs/../../etc` is not under `/root/pkgs`.
pub fn is_path_under(path: &Path, dir: &Path) -> bool {
    normalize_path(path).starts_with(normalize_path(dir))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("/root/pkgs/./a/../b")),
            PathBuf::from("/root/pkgs/b")
        );
        assert_eq!(normalize_path(Path::new("../x")), PathBuf::from("../x"));
    }

    #[test]
    fn test_is_path_under() {
        let root = Path::new("/root/pkgs");
        assert!(is_path_under(Path::new("/root/pkgs/Foo"), root));
        assert!(is_path_under(Path::new("/root/pkgs/a/../Foo"), root));
        assert!(!is_path_under(Path::new("/root/pkgs/../etc"), root));
        assert!(!is_path_under(Path::new("/root/pkgsevil"), root));
    }
}
