//! Naming helpers for response keys: type names to snake_case, relation names to plural/singular.

const UNCOUNTABLE: &[&str] = &[
    "equipment", "information", "rice", "money", "species", "series", "fish", "sheep", "jeans", "police",
];

const IRREGULAR: &[(&str, &str)] = &[
    ("person", "people"),
    ("man", "men"),
    ("child", "children"),
    ("sex", "sexes"),
    ("move", "moves"),
];

/// Convert a single identifier from CamelCase to snake_case.
/// e.g. "User" -> "user", "PetInfo" -> "pet_info"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// English plural of a lowercase word. Words already ending in a single `s` are kept.
/// e.g. "user" -> "users", "category" -> "categories", "pets" -> "pets"
pub fn pluralize(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((_, plural)) = IRREGULAR.iter().find(|(s, p)| *s == word || *p == word) {
        return (*plural).to_string();
    }
    if ["ss", "x", "ch", "sh"].iter().any(|suffix| word.ends_with(suffix)) {
        return format!("{}es", word);
    }
    if word.ends_with('s') {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().map(|c| !is_vowel(c)).unwrap_or(false) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", word)
}

/// English singular of a lowercase word.
/// e.g. "users" -> "user", "categories" -> "category", "boxes" -> "box"
pub fn singularize(word: &str) -> String {
    if word.is_empty() || UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some((singular, _)) = IRREGULAR.iter().find(|(s, p)| *p == word || *s == word) {
        return (*singular).to_string();
    }
    if let Some(stem) = word.strip_suffix("ies") {
        return format!("{}y", stem);
    }
    for suffix in ["sses", "xes", "ches", "shes"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }
    if word.ends_with('s') && !word.ends_with("ss") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

fn is_vowel(c: char) -> bool {
    matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')
}
