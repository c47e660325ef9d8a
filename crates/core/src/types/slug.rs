//! Store slugs.
//!
//! A slug is derived from the store name and then made unique by appending
//! `-1`, `-2`, ... The database enforces uniqueness; these helpers only pick
//! the candidate.

use std::collections::HashSet;

/// Slug used when a name has no usable characters.
pub const FALLBACK_SLUG: &str = "store";

/// Length of the `stores.slug` column, in characters.
pub const MAX_SLUG_LEN: usize = 100;

/// Longest base slug; the rest of the column is left for a `-N` suffix.
pub const MAX_BASE_SLUG_LEN: usize = 90;

/// Derive a base slug from a display name.
///
/// Lowercases, turns spaces into `-` and drops anything that is neither
/// alphanumeric nor `-`. Runs of dashes collapse, the result is cut to
/// [`MAX_BASE_SLUG_LEN`] characters and leading/trailing dashes are trimmed.
///
/// ```
/// use suuq_core::slugify;
///
/// assert_eq!(slugify("Hodan's Fresh Fruit"), "hodans-fresh-fruit");
/// assert_eq!(slugify("!!!"), "store");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut len = 0;
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        if len == MAX_BASE_SLUG_LEN {
            break;
        }
        let c = if c == ' ' { '-' } else { c };
        if c == '-' {
            if !slug.is_empty() && !slug.ends_with('-') {
                slug.push('-');
                len += 1;
            }
        } else if c.is_alphanumeric() {
            slug.push(c);
            len += 1;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        FALLBACK_SLUG.to_owned()
    } else {
        slug
    }
}

/// Pick the first free candidate among `base`, `base-1`, `base-2`, ...
#[must_use]
pub fn pick_available_slug(base: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(base) {
        return base.to_owned();
    }
    (1_u32..)
        .map(|n| format!("{base}-{n}"))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| base.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_basic() {
        assert_eq!(slugify("My Store"), "my-store");
        assert_eq!(slugify("  Spaces   Everywhere "), "spaces-everywhere");
        assert_eq!(slugify("Caf\u{e9} Mogadishu"), "caf\u{e9}-mogadishu");
        assert_eq!(slugify("a - b"), "a-b");
    }

    #[test]
    fn test_slugify_empty_falls_back() {
        assert_eq!(slugify(""), FALLBACK_SLUG);
        assert_eq!(slugify("@#$"), FALLBACK_SLUG);
    }

    #[test]
    fn test_slugify_leaves_room_for_suffix() {
        let slug = slugify(&"a".repeat(100));
        assert_eq!(slug.chars().count(), MAX_BASE_SLUG_LEN);

        let taken: HashSet<String> = [slug.clone()].into_iter().collect();
        let next = pick_available_slug(&slug, &taken);
        assert_eq!(next, format!("{slug}-1"));
        assert!(next.chars().count() <= MAX_SLUG_LEN);
    }

    #[test]
    fn test_slugify_truncation_trims_dash() {
        let name = format!("{} tail", "b".repeat(89));
        let slug = slugify(&name);
        assert_eq!(slug, "b".repeat(89));

        let wide = "\u{e9}".repeat(120);
        assert_eq!(slugify(&wide).chars().count(), MAX_BASE_SLUG_LEN);
    }

    #[test]
    fn test_pick_available_slug_free() {
        let taken = HashSet::new();
        assert_eq!(pick_available_slug("shop", &taken), "shop");
    }

    #[test]
    fn test_pick_available_slug_suffixes() {
        let taken: HashSet<String> = ["shop", "shop-1", "shop-3"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(pick_available_slug("shop", &taken), "shop-2");
    }
}
