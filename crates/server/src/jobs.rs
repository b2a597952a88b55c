//! Per-recipient message builders for the admin dispatch runs.

use crate::config::AppConfig;
use crate::dispatch::{JobBuilder, Recipient, SendJob};
use crate::email::OutgoingEmail;
use crate::email_templates::{
    CorrectionTemplate, CustomTemplate, ResponseLinks, SessionDetails, WeeklyInvitationTemplate,
};
use crate::error::DispatchError;
use crate::store::{ensure_response_token, existing_token};
use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use time::Date;

fn outgoing(
    config: &AppConfig,
    to: &str,
    subject: String,
    html: String,
    text: String,
) -> OutgoingEmail {
    OutgoingEmail {
        from: config.email.from.clone(),
        to: to.to_string(),
        subject,
        html,
        text,
    }
}

/// Weekly invitation. Creates the response row for the week on first use.
pub struct InviteJobs {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub week: Date,
}

#[async_trait]
impl JobBuilder for InviteJobs {
    async fn build(&self, recipient: &Recipient) -> Result<SendJob, DispatchError> {
        let token = ensure_response_token(&self.db, &recipient.id, self.week).await?;
        let email = render_invitation(
            &self.config,
            self.week,
            &recipient.display_name,
            &recipient.email,
            &token,
        )?;
        Ok(SendJob {
            recipient: recipient.clone(),
            email,
            response_token: Some(token),
        })
    }
}

/// Renders a weekly invitation for one player.
pub fn render_invitation(
    config: &AppConfig,
    week: Date,
    player_name: &str,
    to: &str,
    token: &str,
) -> Result<OutgoingEmail, DispatchError> {
    let template = WeeklyInvitationTemplate {
        player_name: player_name.to_string(),
        session: SessionDetails::new(&config.session, week),
        links: ResponseLinks::new(config.base_url(), token),
    };
    Ok(outgoing(
        config,
        to,
        template.subject(),
        template.render_html()?,
        template.render_text(),
    ))
}

/// Correction mail with working links. Only players who already have a row for the
/// week are eligible; it never creates one.
pub struct CorrectionJobs {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub week: Date,
}

#[async_trait]
impl JobBuilder for CorrectionJobs {
    async fn build(&self, recipient: &Recipient) -> Result<SendJob, DispatchError> {
        let token = existing_token(&self.db, &recipient.id, self.week)
            .await?
            .ok_or_else(|| {
                DispatchError::NotFound(format!("No response for {} this week", recipient.email))
            })?;
        let template = CorrectionTemplate {
            player_name: recipient.display_name.clone(),
            session: SessionDetails::new(&self.config.session, self.week),
            links: ResponseLinks::new(self.config.base_url(), &token),
        };
        let email = outgoing(
            &self.config,
            &recipient.email,
            template.subject(),
            template.render_html()?,
            template.render_text(),
        );
        Ok(SendJob {
            recipient: recipient.clone(),
            email,
            response_token: Some(token),
        })
    }
}

/// Admin-written broadcast.
pub struct CustomJobs {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub week: Date,
    pub subject: String,
    pub message: String,
    pub include_response_link: bool,
}

#[async_trait]
impl JobBuilder for CustomJobs {
    async fn build(&self, recipient: &Recipient) -> Result<SendJob, DispatchError> {
        let token = if self.include_response_link {
            Some(ensure_response_token(&self.db, &recipient.id, self.week).await?)
        } else {
            None
        };
        let template = CustomTemplate::new(
            recipient.display_name.clone(),
            SessionDetails::new(&self.config.session, self.week),
            &self.message,
            token
                .as_deref()
                .map(|t| ResponseLinks::new(self.config.base_url(), t)),
        );
        let email = outgoing(
            &self.config,
            &recipient.email,
            self.subject.clone(),
            template.render_html()?,
            template.render_text(),
        );
        Ok(SendJob {
            recipient: recipient.clone(),
            email,
            response_token: token,
        })
    }
}
