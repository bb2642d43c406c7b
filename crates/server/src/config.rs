use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ember::Tree;

const DEFAULT_TREE: &str = include_str!("default_tree.json");

/// Loads the tree definition from `path`, or the built-in device tree.
pub fn load_tree(path: Option<&Path>) -> Result<Tree> {
    let Some(path) = path else {
        return Tree::from_definition(DEFAULT_TREE).context("Built-in tree definition is invalid");
    };
    let json = fs::read_to_string(path)
        .with_context(|| format!("Failed to read tree definition {}", path.display()))?;
    Tree::from_definition(&json)
        .with_context(|| format!("Invalid tree definition {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tree_loads() {
        let tree = load_tree(None).unwrap();
        assert!(tree.element_by_path_str("0.1.0").is_some());
        assert!(tree.element_by_path_str("0.2").is_some());
        assert!(tree.element_by_path_str("0.4").is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = load_tree(Some(Path::new("/nonexistent/tree.json"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
