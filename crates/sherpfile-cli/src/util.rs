//! Shared utility functions for CLI commands

/// Split an `--args` string into helm arguments
///
/// Whitespace separates arguments; single or double quotes group words.
#[must_use]
pub fn split_args(args: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut pending = false;

    for c in args.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                pending = true;
            }
            (None, c) if c.is_whitespace() => {
                if pending || !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            (None, c) => current.push(c),
        }
    }
    if pending || !current.is_empty() {
        parts.push(current);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_args_plain() {
        assert_eq!(split_args("--atomic  --force"), vec!["--atomic", "--force"]);
        assert!(split_args("   ").is_empty());
    }

    #[test]
    fn test_split_args_quoted() {
        assert_eq!(
            split_args(r#"--description "two words" --set 'a=b c'"#),
            vec!["--description", "two words", "--set", "a=b c"]
        );
        assert_eq!(split_args(r#"--x """#), vec!["--x", ""]);
    }
}
