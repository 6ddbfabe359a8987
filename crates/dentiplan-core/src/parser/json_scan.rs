//! Locating JSON objects inside free text.

/// Greedy span from the first `{` to the last `}`, inclusive.
pub fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// End (exclusive) of the object opening at `start`, balancing braces outside string literals.
pub fn balanced_object_end(text: &str, start: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    if bytes.get(start) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Balanced objects in `text` whose body mentions one of `needles`, in order of opening brace.
pub fn objects_containing<'a>(
    text: &'a str,
    needles: &'a [&'a str],
) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    text.match_indices('{').filter_map(move |(start, _)| {
        let end = balanced_object_end(text, start)?;
        let body = &text[start..end];
        needles
            .iter()
            .any(|needle| body.contains(needle))
            .then_some((start, body))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outermost_object() {
        assert_eq!(outermost_object("x {\"a\": {\"b\": 1}} y"), Some("{\"a\": {\"b\": 1}}"));
        assert_eq!(outermost_object("} nothing {"), None);
        assert_eq!(outermost_object("plain"), None);
    }

    #[test]
    fn test_balanced_end_ignores_braces_in_strings() {
        let text = r#"{"t": "a } b { c", "n": {"x": 1}} trailing }"#;
        let end = balanced_object_end(text, 0).unwrap();
        assert_eq!(&text[..end], r#"{"t": "a } b { c", "n": {"x": 1}}"#);
    }

    #[test]
    fn test_balanced_end_handles_escaped_quotes() {
        let text = r#"{"t": "say \"}\" now"} rest"#;
        let end = balanced_object_end(text, 0).unwrap();
        assert_eq!(&text[end..], " rest");
    }

    #[test]
    fn test_unbalanced_returns_none() {
        assert_eq!(balanced_object_end("{\"a\": 1", 0), None);
        assert_eq!(balanced_object_end("x", 0), None);
    }

    #[test]
    fn test_objects_containing() {
        let text = r#"voir {"a": 1} puis {"sequence": [{"x": 1}]} fin"#;
        let found: Vec<(usize, &str)> = objects_containing(text, &["\"sequence\""]).collect();
        assert_eq!(found.len(), 1);
        assert!(found[0].1.starts_with("{\"sequence\""));
        assert_eq!(&text[..found[0].0], "voir {\"a\": 1} puis ");
    }
}
