//! Lazily compiled regex statics.

/// Declare a private accessor returning a `&'static regex::Regex` compiled
/// on first use.
///
/// Patterns are literals checked by the module's tests, so a bad pattern
/// panics with its own text rather than surfacing as a runtime error.
/// `regex::Regex` must be in scope at the call site.
///
/// ```ignore
/// use regex::Regex;
/// use crate::regex_util::static_regex;
///
/// static_regex!(fn hunk_header, r"^@@ -(\d+)");
/// assert!(hunk_header().is_match("@@ -1 +1 @@"));
/// ```
macro_rules! static_regex {
    (fn $fname:ident, $pattern:expr) => {
        fn $fname() -> &'static Regex {
            static COMPILED: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
            COMPILED.get_or_init(|| {
                Regex::new($pattern).expect(concat!("invalid static regex: ", $pattern))
            })
        }
    };
}
pub(crate) use static_regex;
