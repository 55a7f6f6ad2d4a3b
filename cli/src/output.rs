//! Console output helpers. Hooks set `EG_QUIET=1` to suppress the
//! human-readable chatter; it never changes behavior, only printing.

pub fn quiet() -> bool {
    std::env::var("EG_QUIET").is_ok_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

#[macro_export]
macro_rules! say {
    ($($arg:tt)*) => {
        if !$crate::output::quiet() {
            println!($($arg)*);
        }
    };
}
