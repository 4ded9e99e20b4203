/// Writes `values` into `out` through `f`, inserting `separator` between the
/// fragments that actually produced output.
pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}

/// Longest prefix of `text` at most `max` bytes long, cut on a char
/// boundary.
pub fn clip(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Clips long statements in log lines.
#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            $crate::clip($query, 497).trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}

#[cfg(test)]
mod tests {
    use super::clip;

    #[test]
    fn clip_respects_char_boundaries() {
        let text = "é".repeat(300);
        assert_eq!(text.len(), 600);
        // Byte 497 falls inside a two-byte character, the cut backs off.
        let clipped = clip(&text, 497);
        assert_eq!(clipped.len(), 496);
        assert!(text.starts_with(clipped));
        assert_eq!(clip("short", 497), "short");
    }

    #[test]
    fn long_statements_are_clipped_in_log_lines() {
        let sql = format!("SELECT '{}';", "é".repeat(300));
        let line = format!("{}", crate::truncate_long!(&sql));
        assert!(line.ends_with("..."));
        assert!(line.len() <= 500);

        let short = "SELECT 1;";
        assert_eq!(format!("{}", crate::truncate_long!(short)), short);
    }
}
