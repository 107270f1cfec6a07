//! Shared helpers for location names and condition text.

/// Normalize a user-entered or provider-supplied location name into the
/// case-insensitive identity used by the cache and the recent-history list.
pub(crate) fn normalize_location_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Capitalize the first letter of every space-separated word
/// ("light snow" → "Light Snow"). Spacing is preserved as given.
pub(crate) fn capitalize_words(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
