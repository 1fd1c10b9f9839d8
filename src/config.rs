use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtpConfig {
    pub ttl_seconds: i64,
}

/// Outbound mail settings. Without `api_url` OTP codes are only logged.
#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub otp: OtpConfig,
    pub mail: MailConfig,
}

fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "yappers".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "yappers-users".into()),
            ttl_minutes: env_i64("JWT_TTL_MINUTES", 60 * 24 * 7),
        };
        let otp = OtpConfig {
            ttl_seconds: env_i64("OTP_TTL_SECONDS", 5 * 60),
        };
        let mail = MailConfig {
            api_url: std::env::var("MAIL_API_URL").ok().filter(|v| !v.is_empty()),
            api_key: std::env::var("MAIL_API_KEY").ok().filter(|v| !v.is_empty()),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "Yappers <no-reply@yappers.app>".into()),
            timeout_secs: env_i64("MAIL_TIMEOUT_SECONDS", 10).max(1) as u64,
        };
        Ok(Self {
            database_url,
            jwt,
            otp,
            mail,
        })
    }
}
