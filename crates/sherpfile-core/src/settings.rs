//! Process-wide behaviour switches, passed explicitly

/// Behaviour toggles threaded through loaders and the traversal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Settings {
    /// Only render documents whose file name ends with `.j2`
    pub experimental: bool,

    /// Sub-helmfiles inherit selectors only with `selectorsInherited: true`
    pub explicit_selector_inheritance: bool,
}

impl Settings {
    /// Whether a document at `path` goes through the template pipeline
    pub fn renders(&self, path: &std::path::Path) -> bool {
        !self.experimental || path.extension().is_some_and(|ext| ext == "j2")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_renders() {
        let legacy = Settings::default();
        assert!(legacy.renders(Path::new("helmfile.yaml")));

        let experimental = Settings {
            experimental: true,
            ..Default::default()
        };
        assert!(!experimental.renders(Path::new("helmfile.yaml")));
        assert!(experimental.renders(Path::new("helmfile.yaml.j2")));
    }
}
