//! Slug normalization for Unit and App Space names.

/// Canonicalize an arbitrary name into `[a-z0-9-]+` with no leading,
/// trailing or repeated hyphens. Total and idempotent.
pub fn sanitize(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_hyphen = true; // suppresses a leading hyphen
    for c in input.chars().flat_map(|c| c.to_lowercase()) {
        let mapped = if c.is_ascii_lowercase() || c.is_ascii_digit() { c } else { '-' };
        if mapped == '-' {
            if !last_hyphen {
                out.push('-');
            }
            last_hyphen = true;
        } else {
            out.push(mapped);
            last_hyphen = false;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Return `candidate` or the first `candidate-N` (N >= 2) not present in `taken`.
pub fn unique_slug<'a, I>(candidate: &str, taken: I) -> String
where
    I: IntoIterator<Item = &'a str> + Clone,
{
    let clash = |s: &str| taken.clone().into_iter().any(|t| t == s);
    if !clash(candidate) {
        return candidate.to_string();
    }
    let mut n = 2usize;
    loop {
        let next = format!("{}-{}", candidate, n);
        if !clash(&next) {
            return next;
        }
        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_lowercases_and_collapses() {
        assert_eq!(sanitize("My App__Prod"), "my-app-prod");
        assert_eq!(sanitize("--a..b--"), "a-b");
        assert_eq!(sanitize("payments/api-v2"), "payments-api-v2");
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("***"), "");
    }

    #[test]
    fn sanitize_is_idempotent() {
        for s in ["Hello World", "a--b", "-x-", "ÄÖÜ-tier", "ns/name:tag", "ok-already", "İstanbul"] {
            let once = sanitize(s);
            assert_eq!(sanitize(&once), once, "input {:?}", s);
        }
    }

    #[test]
    fn sanitize_output_charset() {
        let s = sanitize("We!rd_Ch@rs 123 ünï");
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'));
        assert!(!s.starts_with('-') && !s.ends_with('-') && !s.contains("--"));
    }

    #[test]
    fn unique_slug_appends_counter() {
        let taken = ["api", "api-2"];
        assert_eq!(unique_slug("web", taken.iter().copied()), "web");
        assert_eq!(unique_slug("api", taken.iter().copied()), "api-3");
    }
}
