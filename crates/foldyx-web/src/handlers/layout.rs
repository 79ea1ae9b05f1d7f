//! Page shell shared by every HTML handler.

/// Navigation HTML template shared across all pages
pub const NAV_HTML: &str = include_str!("../../templates/nav.html");

/// Banner above the page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Banner {
    Info(String),
    Error(String),
}

impl Banner {
    pub fn render(&self) -> String {
        let (class, text) = match self {
            Banner::Info(text)  => ("banner banner-info", text),
            Banner::Error(text) => ("banner banner-error", text),
        };
        format!(r#"<div class="{}" role="status">{}</div>"#, class, escape_html(text))
    }
}

pub fn render_banner(banner: Option<&Banner>) -> String {
    banner.map(Banner::render).unwrap_or_default()
}

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&'  => out.push_str("&amp;"),
            '<'  => out.push_str("&lt;"),
            '>'  => out.push_str("&gt;"),
            '"'  => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _    => out.push(c),
        }
    }
    out
}

/// Wrap `body` in the document shell.
pub fn page(title: &str, body: &str) -> String {
    format!(r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{} | Foldyx</title>
    <link rel="stylesheet" href="/static/css/main.css">
</head>
<body>
<div class="app-container">
{}
<main class="main-content">
{}
</main>
</div>
<script src="/static/js/main.js"></script>
</body>
</html>"#, escape_html(title), NAV_HTML, body)
}
