//! HTML rendering of the digest and the operational notices.
//!
//! Templates are compiled into a single `MiniJinja` environment built once
//! at mailer construction.

use mailbrief_core::{DigestOutput, Mode, PipelineError};

use crate::error::MailerError;

/// Fuel limit for template evaluation.
const FUEL_LIMIT: u64 = 100_000;

const DIGEST_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; max-width: 680px; margin: 0 auto; color: #1a1a1a;">
  <h1 style="border-bottom: 2px solid #4f46e5; padding-bottom: 8px;">Your {{ mode_title }} AI Digest</h1>
  {% if headline %}<p style="font-size: 1.1em; font-weight: 600;">{{ headline }}</p>{% endif %}
  {% if short_message %}<p>{{ short_message }}</p>{% endif %}
  {% if key_themes %}
  <h2>Key themes</h2>
  <ul>{% for theme in key_themes %}<li>{{ theme }}</li>{% endfor %}</ul>
  {% endif %}
  {% for item in summaries %}
  <div style="margin: 24px 0; padding: 16px; border: 1px solid #e5e7eb; border-radius: 8px;">
    <h2 style="margin-top: 0;">{{ item.title }}</h2>
    <p style="color: #6b7280; font-size: 0.9em;">From: {{ item.sender }} &middot; {{ item.date }}</p>
    <p>{{ item.summary }}</p>
    {% if item.key_insights %}
    <p style="margin-bottom: 4px;"><strong>Key insights</strong></p>
    <ul>{% for insight in item.key_insights %}<li>{{ insight }}</li>{% endfor %}</ul>
    {% endif %}
    {% if item.why_it_matters %}
    <p><strong>Why it matters:</strong> {{ item.why_it_matters }}</p>
    {% endif %}
    {% if item.action_items %}
    <p style="margin-bottom: 4px;"><strong>Action items</strong></p>
    <ul>{% for action in item.action_items %}<li>{{ action }}</li>{% endfor %}</ul>
    {% endif %}
    {% if item.critique %}
    <p style="color: #6b7280;"><em>{{ item.critique }}</em></p>
    {% endif %}
  </div>
  {% endfor %}
  <p style="color: #9ca3af; font-size: 0.85em; border-top: 1px solid #e5e7eb; padding-top: 8px;">
    {{ stats.ai_emails }} AI emails out of {{ stats.total_emails }} scanned &middot;
    {{ stats.processed_emails }} processed &middot;
    estimated cost ${{ cost_display }} &middot; {{ timestamp }}
  </p>
</body>
</html>
"#;

const ERROR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; max-width: 680px; margin: 0 auto; color: #1a1a1a;">
  <h1 style="color: #dc2626;">AI Digest error</h1>
  <p><strong>Context:</strong> {{ context }}</p>
  <p>{{ message }}</p>
  <pre style="background: #f3f4f6; padding: 12px; border-radius: 6px; overflow-x: auto;">{{ details }}</pre>
</body>
</html>
"#;

const REAUTH_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<body style="font-family: -apple-system, 'Segoe UI', Roboto, sans-serif; max-width: 680px; margin: 0 auto; color: #1a1a1a;">
  <h1 style="color: #d97706;">Mailbox access needs re-authorization</h1>
  <p>The digest could not read your mailbox because its access token was
  rejected. This usually means the authorization was revoked or expired.</p>
  <p><a href="{{ reauth_url }}" style="display: inline-block; background: #4f46e5; color: #ffffff; padding: 10px 18px; border-radius: 6px; text-decoration: none;">Re-authorize mailbox access</a></p>
  <p style="color: #6b7280; font-size: 0.9em;">Runs will resume automatically once access is restored.</p>
</body>
</html>
"#;

/// Subject line for a digest email.
#[must_use]
pub fn digest_subject(mode: Mode) -> String {
    format!("Your {} AI Digest", mode.title())
}

/// Subject line for an error notification.
#[must_use]
pub fn error_subject(context: &str) -> String {
    format!("[ALERT] AI Digest Error: {context}")
}

/// Compiled template environment for all outbound HTML.
#[derive(Debug)]
pub struct Renderer {
    env: minijinja::Environment<'static>,
}

impl Renderer {
    pub fn new() -> Result<Self, MailerError> {
        let mut env = minijinja::Environment::new();
        env.set_fuel(Some(FUEL_LIMIT));
        env.add_template("digest.html", DIGEST_TEMPLATE)
            .map_err(|e| MailerError::Render(format!("digest template: {e}")))?;
        env.add_template("error.html", ERROR_TEMPLATE)
            .map_err(|e| MailerError::Render(format!("error template: {e}")))?;
        env.add_template("reauth.html", REAUTH_TEMPLATE)
            .map_err(|e| MailerError::Render(format!("reauth template: {e}")))?;
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, MailerError> {
        let template = self
            .env
            .get_template(name)
            .map_err(|e| MailerError::Render(format!("missing template '{name}': {e}")))?;
        template
            .render(ctx)
            .map_err(|e| MailerError::Render(format!("rendering '{name}': {e}")))
    }

    /// Render the digest HTML body.
    pub fn render_digest(&self, digest: &DigestOutput) -> Result<String, MailerError> {
        let ctx = minijinja::context! {
            mode_title => digest.mode.title(),
            headline => digest.headline,
            short_message => digest.short_message,
            key_themes => digest.key_themes,
            summaries => digest.summaries,
            stats => digest.stats,
            cost_display => format!("{:.2}", digest.stats.total_cost),
            timestamp => digest.timestamp,
        };
        self.render("digest.html", ctx)
    }

    /// Render an error-notification body carrying the error message and its
    /// JSON detail.
    pub fn render_error_notice(
        &self,
        context: &str,
        error: &PipelineError,
    ) -> Result<String, MailerError> {
        let details = serde_json::to_string_pretty(error)
            .unwrap_or_else(|_| "<unserializable error>".to_owned());
        let ctx = minijinja::context! {
            context => context,
            message => error.message,
            details => details,
        };
        self.render("error.html", ctx)
    }

    /// Render the re-authorization notice.
    pub fn render_reauth_notice(&self, reauth_url: &str) -> Result<String, MailerError> {
        self.render("reauth.html", minijinja::context! { reauth_url => reauth_url })
    }
}
