use chrono::NaiveDateTime;
use rand::Rng;
use rand::distr::Alphanumeric;

/// Uppercase alphanumeric code of `len` characters.
pub fn random_code(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect()
}

/// `INV-YYYYMMDD-<millis>-<6 chars>`
pub fn invoice_number(now: NaiveDateTime) -> String {
    format!(
        "INV-{}-{}-{}",
        now.format("%Y%m%d"),
        now.and_utc().timestamp_millis(),
        random_code(6)
    )
}

/// `<prefix>-<millis>-<6 chars>`, e.g. `PAY-...` for purchase payments and
/// `LP-...` for listing payments.
pub fn reference_code(prefix: &str, now: NaiveDateTime) -> String {
    format!(
        "{}-{}-{}",
        prefix,
        now.and_utc().timestamp_millis(),
        random_code(6)
    )
}

/// Lowercase, ASCII alphanumerics separated by single dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c.is_whitespace() || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

/// Picks the first of `base`, `base-1`, `base-2`, ... rejected by `taken`.
pub fn unique_slug<F>(base: &str, mut taken: F) -> String
where
    F: FnMut(&str) -> bool,
{
    if !taken(base) {
        return base.to_string();
    }
    let mut counter = 1;
    loop {
        let candidate = format!("{}-{}", base, counter);
        if !taken(&candidate) {
            return candidate;
        }
        counter += 1;
    }
}

/// Treats blank strings as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap()
    }

    #[test]
    fn invoice_number_layout() {
        let inv = invoice_number(at(2025, 3, 7));
        let parts: Vec<&str> = inv.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "INV");
        assert_eq!(parts[1], "20250307");
        assert!(parts[2].parse::<i64>().is_ok());
        assert_eq!(parts[3].len(), 6);
        assert!(parts[3].chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[test]
    fn reference_code_uses_prefix() {
        assert!(reference_code("LP", at(2025, 1, 1)).starts_with("LP-"));
        assert_ne!(random_code(12), random_code(12));
    }

    #[test]
    fn slugify_collapses_separators() {
        assert_eq!(slugify("Paket Premium  Plus!"), "paket-premium-plus");
        assert_eq!(slugify("--Tips & Trik--"), "tips-trik");
        assert_eq!(slugify("Toyota_Avanza 2020"), "toyota-avanza-2020");
        assert_eq!(slugify("***"), "");
    }

    #[test]
    fn unique_slug_appends_counter() {
        let existing = ["basic", "basic-1"];
        assert_eq!(unique_slug("basic", |s| existing.contains(&s)), "basic-2");
        assert_eq!(unique_slug("gold", |s| existing.contains(&s)), "gold");
    }

    #[test]
    fn non_blank_trims() {
        assert_eq!(non_blank(Some("  x ".into())), Some("x".into()));
        assert_eq!(non_blank(Some("   ".into())), None);
        assert_eq!(non_blank(None), None);
    }
}
