/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Helpers for the relative, slash-separated paths carried by send-stream `PATH`
//! attributes (leading slash already stripped by the attribute decoder).

use std::sync::OnceLock;

use regex::Regex;

/// Splits a relative path into its parent directory and final component.
///
/// `split("a/b/c") == ("a/b", "c")`, `split("c") == ("", "c")`.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

pub fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^o\d+-\d+-\d+$").unwrap())
}

/// True if `name` is, on its own, a temporary placeholder name (`oNNN-NN-NN`).
pub fn is_placeholder_name(name: &str) -> bool {
    placeholder_regex().is_match(name)
}

/// True if any component of `path` is a placeholder name.
pub fn has_placeholder_component(path: &str) -> bool {
    segments(path).any(is_placeholder_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_nested_path() {
        assert_eq!(split("a/b/c"), ("a/b", "c"));
    }

    #[test]
    fn splits_top_level_path() {
        assert_eq!(split("c"), ("", "c"));
    }

    #[test]
    fn recognizes_placeholder_names() {
        assert!(is_placeholder_name("o257-7-0"));
        assert!(!is_placeholder_name("o257-7"));
        assert!(!is_placeholder_name("bar"));
    }

    #[test]
    fn finds_placeholder_component_anywhere_in_path() {
        assert!(has_placeholder_component("o1-2-3/subdir/file"));
        assert!(!has_placeholder_component("bar/baz"));
    }
}
