//! String formatting for terminal output.

use postsmgr_core::models::Post;

/// Truncate a string to a maximum length, adding ellipsis if needed
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated)
    }
}

/// Collapse newlines and runs of whitespace so a value fits on one row
pub fn single_line(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Format an optional string, returning a default if None
pub fn format_optional(value: &Option<String>, default: &str) -> String {
    value.as_deref().unwrap_or(default).to_string()
}

/// Format a date string to a more readable format
pub fn format_date(date: &str) -> String {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(date) {
        dt.format("%b %d, %Y").to_string()
    } else if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S") {
        dt.format("%b %d, %Y").to_string()
    } else if date.len() >= 10 {
        date.chars().take(10).collect()
    } else {
        date.to_string()
    }
}

/// Header count line, e.g. "2 posts"
pub fn posts_count(count: usize) -> String {
    match count {
        0 => "No posts yet".to_string(),
        1 => "1 post".to_string(),
        n => format!("{} posts", n),
    }
}

/// One table row per post
pub fn post_row(post: &Post, width: usize) -> String {
    let title = truncate_string(&single_line(&post.title), 30);
    let description = truncate_string(&single_line(&post.description), width);
    let image = if post.image.is_some() { "*" } else { " " };
    format!("{:>5} {} {:<30}  {}", post.id, image, title, description)
}
