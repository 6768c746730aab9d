//! Denial page shown to blocked clients.

use uuid::Uuid;

use crate::gate::Classification;

/// Renders the HTML body of a block response.
pub trait BlockRenderer: Send + Sync {
    fn render(&self, classification: &Classification, incident_id: Uuid) -> String;
}

/// Plain denial page. The classification reason is only shown when
/// `expose_reason` is set; otherwise clients see a generic message.
#[derive(Debug, Clone)]
pub struct DefaultBlockPage {
    pub title: String,
    pub message: String,
    pub expose_reason: bool,
}

impl Default for DefaultBlockPage {
    fn default() -> Self {
        Self {
            title: "Access Denied".to_string(),
            message: "This content is only available through the official app.".to_string(),
            expose_reason: false,
        }
    }
}

impl BlockRenderer for DefaultBlockPage {
    fn render(&self, classification: &Classification, incident_id: Uuid) -> String {
        let reason = if self.expose_reason {
            format!(
                "<p class=\"reason\"><strong>Reason:</strong> {}</p>\n",
                escape_html(classification.reason.as_str())
            )
        } else {
            String::new()
        };

        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<title>{title}</title>
<style>
body {{ font-family: sans-serif; display: flex; justify-content: center; align-items: center; min-height: 100vh; margin: 0; background: #f4f4f5; }}
main {{ max-width: 28rem; padding: 2rem; background: #fff; border-radius: 8px; text-align: center; }}
.reason {{ color: #b91c1c; }}
small {{ color: #71717a; }}
</style>
</head>
<body>
<main>
<h1>{title}</h1>
<p>{message}</p>
{reason}<p><small>Incident ID: {incident_id}</small></p>
</main>
</body>
</html>
"#,
            title = escape_html(&self.title),
            message = escape_html(&self.message),
        )
    }
}

/// Escape text for inclusion in HTML element content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}
