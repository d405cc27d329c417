use std::cell::RefCell;
use std::fmt::Write as _;

/// Bytes available in the per-thread formatting buffer before a message is
/// truncated with a `[...]` suffix.
pub const SCRATCH_CAPACITY: usize = 4096;

const OVERFLOW_SUFFIX: &str = "[...]";

thread_local! {
    static SCRATCH: RefCell<String> = RefCell::new(String::with_capacity(SCRATCH_CAPACITY));
    static BUSY: RefCell<bool> = const { RefCell::new(false) };
}

/// Renders `args` into the calling thread's fixed scratch buffer, truncating
/// with an `[...]` suffix instead of growing unbounded, and hands the
/// rendered text to `emit`. Re-entrant calls (a subscriber callback that
/// itself logs) are suppressed and return `false` without invoking `emit`.
pub fn with_rendered<R>(args: std::fmt::Arguments<'_>, emit: impl FnOnce(&str) -> R) -> Option<R> {
    let already_busy = BUSY.with(|busy| busy.replace(true));
    if already_busy {
        return None;
    }

    let result = SCRATCH.with(|cell| {
        let mut buf = cell.borrow_mut();
        buf.clear();
        if buf.write_fmt(args).is_err() || buf.len() > SCRATCH_CAPACITY {
            truncate_with_suffix(&mut buf);
        }
        emit(&buf)
    });

    BUSY.with(|busy| *busy.borrow_mut() = false);
    Some(result)
}

fn truncate_with_suffix(buf: &mut String) {
    let keep = SCRATCH_CAPACITY.saturating_sub(OVERFLOW_SUFFIX.len());
    let mut boundary = keep.min(buf.len());
    while boundary > 0 && !buf.is_char_boundary(boundary) {
        boundary -= 1;
    }
    buf.truncate(boundary);
    buf.push_str(OVERFLOW_SUFFIX);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_passes_through_unchanged() {
        let out = with_rendered(format_args!("hello {}", 42), |s| s.to_string());
        assert_eq!(out.as_deref(), Some("hello 42"));
    }

    #[test]
    fn oversize_message_is_truncated_with_suffix() {
        let long = "x".repeat(SCRATCH_CAPACITY * 2);
        let out = with_rendered(format_args!("{long}"), |s| s.to_string()).unwrap();
        assert!(out.len() <= SCRATCH_CAPACITY);
        assert!(out.ends_with("[...]"));
    }

    #[test]
    fn reentrant_call_is_suppressed() {
        let outer = with_rendered(format_args!("outer"), |_| {
            with_rendered(format_args!("inner"), |s| s.to_string())
        });
        assert_eq!(outer, Some(None));
    }
}
