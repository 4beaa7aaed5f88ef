//! Sequence step personalization

use cadence_storage::models::{CampaignSender, Contact};
use regex::Regex;
use std::sync::OnceLock;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*[^}]+\s*\}\}").expect("static regex"))
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<\s*/?\s*(p|br|div|span|a|b|i|strong|em|ul|ol|li|table|h[1-6])\b[^>]*>").expect("static regex"))
}

fn any_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

/// Values available to step templates
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub company: String,
    pub sender_name: String,
}

impl TemplateContext {
    pub fn new(contact: &Contact, sender: &CampaignSender) -> Self {
        Self {
            first_name: contact.first_name.clone().unwrap_or_default(),
            last_name: contact.last_name.clone().unwrap_or_default(),
            email: contact.email.clone(),
            company: contact.company.clone().unwrap_or_default(),
            sender_name: sender.name.clone().unwrap_or_default(),
        }
    }

    fn full_name(&self) -> String {
        [self.first_name.trim(), self.last_name.trim()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Rendered email parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Replace known placeholders and drop unknown ones
pub fn render(template: &str, ctx: &TemplateContext) -> String {
    let result = template
        .replace("{{first_name}}", &ctx.first_name)
        .replace("{{last_name}}", &ctx.last_name)
        .replace("{{name}}", &ctx.full_name())
        .replace("{{email}}", &ctx.email)
        .replace("{{company}}", &ctx.company)
        .replace("{{sender_name}}", &ctx.sender_name);

    placeholder_re().replace_all(&result, "").to_string()
}

/// Render a step's subject and content into subject, HTML and text bodies
pub fn render_step(subject: &str, content: &str, ctx: &TemplateContext) -> RenderedEmail {
    let subject = render(subject, ctx).trim().to_string();
    let body = render(content, ctx);

    let (html, text) = if looks_like_html(&body) {
        let text = any_tag_re().replace_all(&body.replace("<br>", "\n"), "").to_string();
        (body, text)
    } else {
        (text_to_html(&body), body)
    };

    RenderedEmail { subject, html, text }
}

fn looks_like_html(content: &str) -> bool {
    html_tag_re().is_match(content)
}

/// Plain text to minimal HTML: escape markup and turn line breaks into `<br>`
pub fn text_to_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace("\r\n", "\n")
        .replace('\n', "<br>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx() -> TemplateContext {
        TemplateContext {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "ada@example.com".into(),
            company: "Analytical Engines".into(),
            sender_name: "Charles".into(),
        }
    }

    #[test]
    fn test_render_known_placeholders() {
        assert_eq!(
            render("Hi {{first_name}} from {{company}}, {{sender_name}} here", &ctx()),
            "Hi Ada from Analytical Engines, Charles here"
        );
        assert_eq!(render("{{name}} <{{email}}>", &ctx()), "Ada Lovelace <ada@example.com>");
    }

    #[test]
    fn test_render_removes_unknown() {
        assert_eq!(render("Hello {{first_name}}, {{unknown_var}} test", &ctx()), "Hello Ada,  test");
    }

    #[test]
    fn test_missing_values_render_empty() {
        let partial = TemplateContext {
            first_name: "Ada".into(),
            ..TemplateContext::default()
        };
        assert_eq!(render("{{name}} at {{company}}", &partial), "Ada at ");
    }

    #[test]
    fn test_plain_text_becomes_html() {
        let email = render_step("Quick question, {{first_name}}", "Hi {{first_name}},\n\nA & B?", &ctx());
        assert_eq!(email.subject, "Quick question, Ada");
        assert_eq!(email.html, "Hi Ada,<br><br>A &amp; B?");
        assert_eq!(email.text, "Hi Ada,\n\nA & B?");
    }

    #[test]
    fn test_html_content_kept() {
        let email = render_step("Hi", "<p>Hello {{first_name}}</p>", &ctx());
        assert_eq!(email.html, "<p>Hello Ada</p>");
        assert_eq!(email.text, "Hello Ada");
    }
}
