use colored::Colorize;

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue(), msg);
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green(), msg);
}

/// Print a warning message
pub fn warn(msg: &str) {
    println!("{} {}", "⚠".yellow(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red(), msg);
}

/// Print a header/title
pub fn header(title: &str) {
    println!();
    println!("{}", title.bold());
    println!("{}", "─".repeat(title.chars().count()).dimmed());
}

/// Print a key-value pair
pub fn kv(key: &str, value: &str) {
    println!("  {}: {}", key.dimmed(), value);
}

// ============================================================================
// Formatting
// ============================================================================

/// "1 operation", "3 operations"
pub fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Truncate a string for display, keeping the end
///
/// Type URLs share long prefixes, so the tail is the part worth keeping.
pub fn truncate_start(text: &str, max_len: usize) -> String {
    let len = text.chars().count();
    if len <= max_len {
        text.to_string()
    } else if max_len <= 3 {
        "...".to_string()
    } else {
        let tail: String = text.chars().skip(len - (max_len - 3)).collect();
        format!("...{tail}")
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plural() {
        assert_eq!(plural(0, "change"), "0 changes");
        assert_eq!(plural(1, "change"), "1 change");
        assert_eq!(plural(2, "operation"), "2 operations");
    }

    #[test]
    fn test_truncate_start_short() {
        assert_eq!(truncate_start("person", 20), "person");
        assert_eq!(truncate_start("exact", 5), "exact");
    }

    #[test]
    fn test_truncate_start_long() {
        assert_eq!(
            truncate_start("https://example.com/@acme/types/entity-type/person/v/1", 20),
            "...y-type/person/v/1"
        );
    }

    #[test]
    fn test_truncate_start_edge_cases() {
        assert_eq!(truncate_start("test", 3), "...");
        assert_eq!(truncate_start("test", 2), "...");
        assert_eq!(truncate_start("", 10), "");
    }
}
