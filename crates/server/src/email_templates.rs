//! Email template rendering with HTML (Askama) and SCSS styling
use crate::config::SessionConfig;
use crate::entity::weekly_response::ResponseStatus;
use crate::schedule::format_session_date;
use askama::Template;
use once_cell::sync::Lazy;
use time::Date;

/// Compiled CSS from SCSS. Empty when compilation fails; messages then go out unstyled.
static COMPILED_CSS: Lazy<String> = Lazy::new(|| {
    let scss = include_str!("../styles/email.scss");
    match grass::from_string(scss.to_string(), &grass::Options::default()) {
        Ok(css) => css,
        Err(e) => {
            tracing::error!(
                name = "email.scss.compile_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to compile email SCSS"
            );
            String::new()
        }
    }
});

/// Inline CSS into HTML
#[tracing::instrument(skip(html))]
fn inline_css(html: &str) -> String {
    let options = css_inline::InlineOptions {
        load_remote_stylesheets: false,
        ..css_inline::InlineOptions::default()
    };

    let inliner = css_inline::CSSInliner::new(options);

    let html_with_style = html.replace(
        "</head>",
        &format!("<style>{}</style></head>", COMPILED_CSS.as_str()),
    );

    match inliner.inline(&html_with_style) {
        Ok(inlined) => inlined,
        Err(e) => {
            tracing::error!(
                name = "email.inline_css.failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = ?e,
                message = "Failed to inline CSS"
            );
            html.to_string()
        }
    }
}

/// `{base_url}/respond/{token}?response={status}`
pub fn response_link(base_url: &str, token: &str, status: ResponseStatus) -> String {
    format!(
        "{}/respond/{}?response={}",
        base_url.trim_end_matches('/'),
        token,
        status.as_str()
    )
}

/// One-click answer links for a response token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseLinks {
    pub yes: String,
    pub maybe: String,
    pub no: String,
}

impl ResponseLinks {
    pub fn new(base_url: &str, token: &str) -> Self {
        Self {
            yes: response_link(base_url, token, ResponseStatus::Yes),
            maybe: response_link(base_url, token, ResponseStatus::Maybe),
            no: response_link(base_url, token, ResponseStatus::No),
        }
    }

    fn render_text(&self) -> String {
        format!(
            "I'm coming: {}\nMaybe: {}\nCan't make it: {}",
            self.yes, self.maybe, self.no
        )
    }
}

/// Where and when the session takes place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    pub team_name: String,
    pub week_label: String,
    pub time: String,
    pub location: String,
}

impl SessionDetails {
    pub fn new(config: &SessionConfig, week: Date) -> Self {
        Self {
            team_name: config.team_name.clone(),
            week_label: format_session_date(week),
            time: config.time.clone(),
            location: config.location.clone(),
        }
    }
}

#[derive(Template)]
#[template(path = "weekly_invitation.html")]
pub struct WeeklyInvitationTemplate {
    pub player_name: String,
    pub session: SessionDetails,
    pub links: ResponseLinks,
}

impl WeeklyInvitationTemplate {
    pub fn subject(&self) -> String {
        format!("Ready for {} this Wednesday?", self.session.team_name)
    }

    #[tracing::instrument(skip(self))]
    pub fn render_html(&self) -> Result<String, askama::Error> {
        let html = self.render()?;
        Ok(inline_css(&html))
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        format!(
            r#"Hi {}!

Next session: {} at {}
Location: {}

Will you be there? Pick one:
{}

You can change your answer at any time by opening another link.

See you on the pitch!
{}"#,
            self.player_name,
            self.session.week_label,
            self.session.time,
            self.session.location,
            self.links.render_text(),
            self.session.team_name
        )
    }
}

/// Resends working response links after a broken invitation went out.
#[derive(Template)]
#[template(path = "correction.html")]
pub struct CorrectionTemplate {
    pub player_name: String,
    pub session: SessionDetails,
    pub links: ResponseLinks,
}

impl CorrectionTemplate {
    pub fn subject(&self) -> String {
        "Quick fix: your response links now work".to_string()
    }

    #[tracing::instrument(skip(self))]
    pub fn render_html(&self) -> Result<String, askama::Error> {
        let html = self.render()?;
        Ok(inline_css(&html))
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        format!(
            r#"Hi {}!

There was a problem with the response buttons in our previous email. This has now been fixed.

Training session: {} at {}
{}

Please let us know if you're coming:
{}

See you on the pitch!
{}"#,
            self.player_name,
            self.session.week_label,
            self.session.time,
            self.session.location,
            self.links.render_text(),
            self.session.team_name
        )
    }
}

/// Free-form admin broadcast, optionally with response links for the next session.
#[derive(Template)]
#[template(path = "custom.html")]
pub struct CustomTemplate {
    pub player_name: String,
    pub session: SessionDetails,
    pub message: String,
    pub paragraphs: Vec<String>,
    pub response_links: Option<ResponseLinks>,
}

impl CustomTemplate {
    pub fn new(
        player_name: String,
        session: SessionDetails,
        message: &str,
        response_links: Option<ResponseLinks>,
    ) -> Self {
        let message = message.trim().replace("\r\n", "\n");
        let paragraphs = message
            .split("\n\n")
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
        Self {
            player_name,
            session,
            message,
            paragraphs,
            response_links,
        }
    }

    #[tracing::instrument(skip(self))]
    pub fn render_html(&self) -> Result<String, askama::Error> {
        let html = self.render()?;
        Ok(inline_css(&html))
    }

    #[tracing::instrument(skip(self))]
    pub fn render_text(&self) -> String {
        let links = match &self.response_links {
            Some(links) => format!(
                "\n\nNext session: {} at {}\nLocation: {}\n\nWill you be there?\n{}",
                self.session.week_label,
                self.session.time,
                self.session.location,
                links.render_text()
            ),
            None => String::new(),
        };
        format!(
            "Hi {}!\n\n{}{}\n\nSee you on the pitch!\n{}",
            self.player_name, self.message, links, self.session.team_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn session() -> SessionDetails {
        SessionDetails::new(&SessionConfig::default(), date!(2025 - 06 - 04))
    }

    #[test]
    fn response_links_point_at_frontend() {
        let links = ResponseLinks::new("https://tikitaka.example.org/", "abc");
        assert_eq!(links.yes, "https://tikitaka.example.org/respond/abc?response=yes");
        assert_eq!(links.maybe, "https://tikitaka.example.org/respond/abc?response=maybe");
        assert_eq!(links.no, "https://tikitaka.example.org/respond/abc?response=no");
    }

    #[test]
    fn weekly_invitation_renders_links_and_inlines_css() {
        let template = WeeklyInvitationTemplate {
            player_name: "Kasper".into(),
            session: session(),
            links: ResponseLinks::new("https://tikitaka.example.org", "tok-1"),
        };
        let html = template.render_html().unwrap();
        assert!(html.contains("Hi Kasper!"));
        assert!(html.contains("Wednesday, June 4, 2025"));
        assert!(html.contains("https://tikitaka.example.org/respond/tok-1?response=maybe"));
        assert!(html.contains("style="), "css should be inlined");

        let text = template.render_text();
        assert!(
            text.contains("Can't make it: https://tikitaka.example.org/respond/tok-1?response=no")
        );
        assert_eq!(template.subject(), "Ready for Tiki Taka this Wednesday?");
    }

    #[test]
    fn correction_mentions_fix() {
        let template = CorrectionTemplate {
            player_name: "Mads".into(),
            session: session(),
            links: ResponseLinks::new("https://tikitaka.example.org", "tok-2"),
        };
        assert!(template.render_html().unwrap().contains("has now been fixed"));
        assert!(template.render_text().contains("17:30"));
    }

    #[test]
    fn custom_message_is_escaped_and_split() {
        let template = CustomTemplate::new(
            "Sofie".into(),
            session(),
            "Pitch moved <b>indoors</b>.\n\nBring shoes.",
            None,
        );
        assert_eq!(template.paragraphs.len(), 2);
        let html = template.render_html().unwrap();
        assert!(!html.contains("<b>indoors</b>"));
        assert!(!html.contains("response="));
        assert!(template.render_text().contains("Bring shoes."));
    }

    #[test]
    fn custom_message_can_carry_links() {
        let template = CustomTemplate::new(
            "Sofie".into(),
            session(),
            "See you!",
            Some(ResponseLinks::new("https://tikitaka.example.org", "tok-3")),
        );
        assert!(template.render_html().unwrap().contains("tok-3?response=yes"));
        assert!(template.render_text().contains("Next session: Wednesday, June 4, 2025"));
    }
}
