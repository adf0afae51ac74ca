//! URL slugs for products.

/// Turn a display name into a URL slug.
///
/// ASCII letters and digits are kept (lower-cased); every other run of
/// characters becomes a single dash. Leading and trailing dashes are dropped.
///
/// ```
/// use marketstall_core::slugify;
///
/// assert_eq!(slugify("Classic Tee (Navy)"), "classic-tee-navy");
/// ```
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;

    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }

    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapses_separators() {
        assert_eq!(slugify("  Linen -- Shirt  "), "linen-shirt");
    }

    #[test]
    fn test_drops_non_ascii() {
        assert_eq!(slugify("Café Crème 2"), "caf-cr-me-2");
    }

    #[test]
    fn test_only_symbols_gives_empty() {
        assert_eq!(slugify("!!!"), "");
    }
}
