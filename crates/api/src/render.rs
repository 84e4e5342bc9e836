//! Presentation seam for guarded pages.
//!
//! Real page markup lives outside this service; the default renderer emits a
//! bare document so the gated routes are usable on their own.

use axum::response::Html;

use cmsgate_auth::CurrentUser;

pub trait PageRenderer: Send + Sync {
    fn render(&self, page: &str, user: &CurrentUser, flash: Option<&str>) -> Html<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PlainPageRenderer;

impl PageRenderer for PlainPageRenderer {
    fn render(&self, page: &str, user: &CurrentUser, flash: Option<&str>) -> Html<String> {
        let display_name = match (&user.first_name, &user.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => user.username.clone(),
        };

        let mut body = format!(
            "<h1>{}</h1>\n<p class=\"user\" data-role=\"{}\">Signed in as {}</p>\n",
            escape(page),
            escape(user.role.as_str()),
            escape(&display_name),
        );
        if let Some(msg) = flash {
            body.push_str(&format!("<p class=\"flash\">{}</p>\n", escape(msg)));
        }

        Html(format!(
            "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title></head>\n<body>\n{body}</body></html>\n",
            escape(page)
        ))
    }
}

fn escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use cmsgate_auth::Role;
    use cmsgate_core::UserId;

    fn user() -> CurrentUser {
        CurrentUser {
            id: UserId::new(1),
            username: "<script>".to_string(),
            email: "x@bpo.com".to_string(),
            role: Role::new("admin"),
            first_name: None,
            last_name: None,
            department: None,
            position: None,
        }
    }

    #[test]
    fn user_supplied_text_is_escaped() {
        let Html(page) = PlainPageRenderer.render("Dashboard", &user(), Some("a & b"));
        assert!(page.contains("&lt;script&gt;"));
        assert!(!page.contains("<script>"));
        assert!(page.contains("a &amp; b"));
    }

    #[test]
    fn prefers_full_name() {
        let mut u = user();
        u.first_name = Some("Maya".to_string());
        u.last_name = Some("Lin".to_string());
        let Html(page) = PlainPageRenderer.render("Dashboard", &u, None);
        assert!(page.contains("Signed in as Maya Lin"));
        assert!(!page.contains("class=\"flash\""));
    }
}
