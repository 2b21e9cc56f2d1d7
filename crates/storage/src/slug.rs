// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Slugify stack names for use as directory names.

/// Maximum slug length; long names truncate (trimming trailing hyphens).
const MAX_SLUG_LEN: usize = 48;

/// Slugify a stack name into a filesystem-safe directory component.
///
/// Lowercases, replaces any run of non-alphanumeric characters with a
/// single hyphen, trims leading/trailing hyphens, and truncates to
/// [`MAX_SLUG_LEN`]. Empty input (or input with no alphanumerics)
/// becomes `"stack"`.
pub fn slugify(input: &str) -> String {
    let lower = input.to_lowercase();

    let mut slug = String::with_capacity(lower.len());
    let mut last_was_hyphen = false;
    for ch in lower.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_hyphen = false;
        } else if !last_was_hyphen && !slug.is_empty() {
            slug.push('-');
            last_was_hyphen = true;
        }
    }

    let mut result = slug.trim_end_matches('-').to_string();

    if result.len() > MAX_SLUG_LEN {
        result.truncate(MAX_SLUG_LEN);
        let trimmed = result.trim_end_matches('-');
        if trimmed.len() != result.len() {
            result = trimmed.to_string();
        }
    }

    if result.is_empty() {
        result = "stack".to_string();
    }

    result
}

#[cfg(test)]
#[path = "slug_tests.rs"]
mod tests;
