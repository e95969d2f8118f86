//! HTML escaping for dashboard rendering.

/// Escape text for use in element content and quoted attributes.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("data engineering"), "data engineering");
        assert_eq!(html_escape("<b>Rust & SQL</b>"), "&lt;b&gt;Rust &amp; SQL&lt;/b&gt;");
        assert_eq!(html_escape(r#"it's "live""#), "it&#39;s &quot;live&quot;");
    }
}
