use std::iter::repeat;
use std::path::{Path, PathBuf};

/// First of `subpaths`, joined onto `root`, that satisfies `search`.
pub fn find_first_subpath<P: AsRef<Path>, F: Fn(&Path) -> bool>(
    root: impl AsRef<Path>,
    subpaths: &[P],
    search: F,
) -> Option<PathBuf> {
    subpaths
        .iter()
        .zip(repeat(root.as_ref()))
        .map(|(b, a)| a.join(b))
        .find(|it: &PathBuf| search(it))
}

/// Reads the first of `names` that exists in `dir`.
pub fn read_first(dir: &Path, names: &[&str]) -> Option<Vec<u8>> {
    find_first_subpath(dir, names, Path::exists).and_then(|it| std::fs::read(it).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_match_in_order() {
        let found = find_first_subpath("/cfg", &["a.yml", "b.yml"], |p| p.ends_with("b.yml"));
        assert_eq!(found, Some(PathBuf::from("/cfg/b.yml")));
        assert_eq!(find_first_subpath("/cfg", &["a.yml"], |_| false), None);
    }
}
