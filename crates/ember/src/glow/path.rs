use std::fmt;
use std::str::FromStr;

/// Dotted numeric address of an element, e.g. `1.3.0`.
///
/// The empty path addresses the tree root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TreePath(Vec<u32>);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid path component {component:?} in {path:?}")]
pub struct PathParseError {
    pub path: String,
    pub component: String,
}

impl TreePath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(components: Vec<u32>) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[u32] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<u32> {
        self.0.last().copied()
    }

    pub fn child(&self, number: u32) -> Self {
        let mut components = self.0.clone();
        components.push(number);
        Self(components)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, init) = self.0.split_last()?;
        Some(Self(init.to_vec()))
    }

    pub fn push(&mut self, number: u32) {
        self.0.push(number);
    }
}

impl From<Vec<u32>> for TreePath {
    fn from(components: Vec<u32>) -> Self {
        Self(components)
    }
}

impl From<&[u32]> for TreePath {
    fn from(components: &[u32]) -> Self {
        Self(components.to_vec())
    }
}

impl fmt::Display for TreePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{}", component)?;
        }
        Ok(())
    }
}

impl FromStr for TreePath {
    type Err = PathParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::root());
        }
        trimmed
            .split('.')
            .map(|component| {
                component.parse::<u32>().map_err(|_| PathParseError {
                    path: s.to_string(),
                    component: component.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path: TreePath = "1.3.0".parse().unwrap();
        assert_eq!(path.components(), &[1, 3, 0]);
        assert_eq!(path.to_string(), "1.3.0");
        assert!("".parse::<TreePath>().unwrap().is_root());
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = "1.x.2".parse::<TreePath>().unwrap_err();
        assert_eq!(err.component, "x");
        assert!("1..2".parse::<TreePath>().is_err());
    }

    #[test]
    fn test_child_and_parent() {
        let path = TreePath::new(vec![0, 2]);
        assert_eq!(path.child(5).to_string(), "0.2.5");
        assert_eq!(path.parent(), Some(TreePath::new(vec![0])));
        assert_eq!(TreePath::root().parent(), None);
    }
}
