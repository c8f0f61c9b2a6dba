use chrono::NaiveDateTime;

/// Truncate a string to a maximum number of characters, adding ellipsis if needed
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len <= 3 {
        s.chars().take(max_len).collect()
    } else {
        let truncated: String = s.chars().take(max_len - 3).collect();
        format!("{}...", truncated.trim_end())
    }
}

/// Remove HTML tags from rich post content, collapsing whitespace.
pub fn strip_html(content: &str) -> String {
    let mut text = String::with_capacity(content.len());
    let mut in_tag = false;
    for c in content.chars() {
        match c {
            '<' => {
                in_tag = true;
                text.push(' ');
            }
            '>' if in_tag => in_tag = false,
            _ if !in_tag => text.push(c),
            _ => {}
        }
    }
    let text = text
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain-text preview of post content for list views.
pub fn excerpt(content: &str, max_len: usize) -> String {
    truncate(&strip_html(content), max_len)
}

/// Format a backend timestamp like "Mar 04, 2025"
pub fn format_date(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format("%b %d, %Y").to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Case-insensitive substring match, used for local filtering.
pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}
