use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use time::Duration;
use tracing::{debug, info};

use crate::config::MailConfig;

/// Delivers OTP codes to users.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()>;
}

pub fn from_config(cfg: &MailConfig, code_ttl: Duration) -> anyhow::Result<Arc<dyn Mailer>> {
    match &cfg.api_url {
        Some(url) => Ok(Arc::new(HttpMailer::new(url, cfg, code_ttl)?)),
        None => {
            info!("MAIL_API_URL not set; OTP codes will be logged instead of mailed");
            Ok(Arc::new(LogMailer))
        }
    }
}

#[derive(Debug, Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
    html: String,
}

/// Posts messages to a transactional mail HTTP API.
pub struct HttpMailer {
    client: Client,
    url: String,
    api_key: Option<String>,
    from: String,
    code_ttl: Duration,
}

impl HttpMailer {
    pub fn new(url: &str, cfg: &MailConfig, code_ttl: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("Failed to create mail HTTP client")?;

        Ok(Self {
            client,
            url: url.to_string(),
            api_key: cfg.api_key.clone(),
            from: cfg.from.clone(),
            code_ttl,
        })
    }
}

/// "5 minutes", "1 minute", "90 seconds".
fn describe_ttl(ttl: Duration) -> String {
    let secs = ttl.whole_seconds();
    match (secs % 60, secs / 60) {
        (0, 1) => "1 minute".into(),
        (0, mins) => format!("{mins} minutes"),
        _ if secs == 1 => "1 second".into(),
        _ => format!("{secs} seconds"),
    }
}

fn otp_text(code: &str, validity: &str) -> String {
    format!(
        "Welcome to your college's anonymous community!\n\n\
         Your verification code is {code}. It expires in {validity}.\n\n\
         If you didn't request this code, you can safely ignore this email."
    )
}

fn otp_html(code: &str, validity: &str) -> String {
    format!(
        "<div style=\"font-family:system-ui,sans-serif;max-width:500px;margin:0 auto\">\
         <h2 style=\"text-align:center\">Yappers</h2>\
         <p style=\"text-align:center\">Use the code below to verify your email:</p>\
         <p style=\"text-align:center;font-size:36px;font-weight:bold;letter-spacing:8px\">{code}</p>\
         <p style=\"text-align:center\">This code expires in <b>{validity}</b>.</p>\
         </div>"
    )
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()> {
        let validity = describe_ttl(self.code_ttl);
        let mail = OutgoingMail {
            from: &self.from,
            to: email,
            subject: "Verify your Yappers account",
            text: otp_text(code, &validity),
            html: otp_html(code, &validity),
        };

        let mut req = self.client.post(&self.url).json(&mail);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await.context("send mail request")?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            anyhow::bail!("mail api returned {status}: {body}");
        }
        debug!(email = %email, "otp mail sent");
        Ok(())
    }
}

/// Development mailer that writes the code to the log.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_otp(&self, email: &str, code: &str) -> anyhow::Result<()> {
        info!(email = %email, code = %code, "[dev] otp issued");
        Ok(())
    }
}
