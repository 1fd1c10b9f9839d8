//! Registration, login and OTP flows.
//!
//! Registration: `register` parks the pending account in an OTP challenge,
//! `verify_registration` creates the verified user. Login recovery:
//! `request_login_otp` then `verify_login_otp`, no account changes. Both
//! flows can be resent while a challenge is pending. Mail failures never
//! fail a request; the code stays valid and can be resent.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, warn};

use crate::{
    auth::{
        claims::SessionIdentity,
        dto::{AuthResponse, EmailRequest, LoginRequest, PublicUser, RegisterRequest, VerifyOtpRequest},
        otp::{Challenge, ChallengeLookup, CodeCheck, OtpKind, OtpPayload},
        password::{hash_password, verify_password},
        repo::CreateUser,
        repo_types::{NewUser, School, User},
        school::{extract_domain, school_name},
    },
    error::AppError,
    state::AppState,
};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

fn no_pending(kind: OtpKind) -> AppError {
    match kind {
        OtpKind::Registration => {
            AppError::not_found("No pending registration found. Please register again.")
        }
        OtpKind::LoginRecovery => {
            AppError::not_found("No pending login code found. Please request a new one.")
        }
    }
}

async fn dispatch_code(state: &AppState, email: &str, code: &str) {
    if let Err(e) = state.mailer.send_otp(email, code).await {
        warn!(error = %e, email = %email, "otp mail dispatch failed; code remains valid");
    }
}

fn accepted(check: CodeCheck, email: &str, kind: OtpKind) -> Result<Challenge, AppError> {
    match check {
        CodeCheck::Accepted(c) => Ok(c),
        CodeCheck::Missing => Err(no_pending(kind)),
        CodeCheck::Expired => {
            warn!(email = %email, ?kind, "otp expired");
            Err(AppError::Expired("OTP expired. Please request a new code.".into()))
        }
        CodeCheck::Mismatch => {
            warn!(email = %email, ?kind, "otp mismatch");
            Err(AppError::InvalidCode("Invalid OTP".into()))
        }
    }
}

/// Live challenge whose code matches, or the reason there is none. The
/// challenge is left in place.
async fn matching_challenge(
    state: &AppState,
    email: &str,
    kind: OtpKind,
    code: &str,
) -> Result<Challenge, AppError> {
    let check = match state.otp.get(email, kind).await? {
        ChallengeLookup::Missing => CodeCheck::Missing,
        ChallengeLookup::Expired => CodeCheck::Expired,
        ChallengeLookup::Live(c) if c.code == code => CodeCheck::Accepted(c),
        ChallengeLookup::Live(_) => CodeCheck::Mismatch,
    };
    accepted(check, email, kind)
}

fn issue_session(state: &AppState, user: User, school: Option<&School>) -> Result<AuthResponse, AppError> {
    let identity = SessionIdentity {
        id: user.id,
        email: user.email.clone(),
        school_id: user.school_id,
    };
    let token = state.jwt.sign(&identity)?;
    Ok(AuthResponse {
        token,
        user: PublicUser::new(user, school),
    })
}

pub async fn register(state: &AppState, req: RegisterRequest) -> Result<(), AppError> {
    let email = normalize_email(&req.email);
    let display_name = req.display_name.trim().to_string();
    if email.is_empty() || req.password.is_empty() || display_name.is_empty() {
        return Err(AppError::validation("All fields are required"));
    }
    if !is_valid_email(&email) {
        warn!(email = %email, "invalid email");
        return Err(AppError::validation("Invalid email"));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(email = %email, "email already registered");
        return Err(AppError::Conflict("Email already registered".into()));
    }

    let payload = OtpPayload::Registration {
        password: req.password,
        display_name,
    };
    let code = state.otp.put(&email, payload).await?;
    dispatch_code(state, &email, &code).await;

    info!(email = %email, "registration otp issued");
    Ok(())
}

pub async fn verify_registration(
    state: &AppState,
    req: VerifyOtpRequest,
) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&req.email);
    let code = req.otp.trim();
    if email.is_empty() || code.is_empty() {
        return Err(AppError::validation("Email and OTP are required"));
    }

    let challenge = matching_challenge(state, &email, OtpKind::Registration, code).await?;
    let OtpPayload::Registration {
        password,
        display_name,
    } = challenge.payload
    else {
        return Err(anyhow::anyhow!("registration challenge without registration payload").into());
    };

    let domain = extract_domain(&email)?;
    let school = state
        .users
        .find_or_create_school(&domain, &school_name(&domain))
        .await?;

    let password_hash = hash_password(password).await?;
    let created = state
        .users
        .create(NewUser {
            email: email.clone(),
            password_hash,
            display_name,
            school_id: school.id,
        })
        .await?;
    state.otp.consume(&email, OtpKind::Registration).await?;

    let user = match created {
        CreateUser::Created(u) => u,
        CreateUser::EmailTaken => {
            warn!(email = %email, "verification raced an existing account");
            return Err(AppError::Conflict("Email already registered".into()));
        }
    };

    info!(user_id = %user.id, email = %user.email, school_id = %school.id, "user registered");
    issue_session(state, user, Some(&school))
}

pub async fn resend_registration(state: &AppState, req: EmailRequest) -> Result<(), AppError> {
    resend(state, req, OtpKind::Registration).await
}

pub async fn resend_login_otp(state: &AppState, req: EmailRequest) -> Result<(), AppError> {
    resend(state, req, OtpKind::LoginRecovery).await
}

async fn resend(state: &AppState, req: EmailRequest, kind: OtpKind) -> Result<(), AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }

    let code = state
        .otp
        .refresh(&email, kind)
        .await?
        .ok_or_else(|| no_pending(kind))?;
    dispatch_code(state, &email, &code).await;

    info!(email = %email, ?kind, "otp resent");
    Ok(())
}

pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("Email and password are required"));
    }

    let Some(user) = state.users.find_by_email(&email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    };

    if !verify_password(req.password, user.password_hash.clone()).await? {
        warn!(email = %email, user_id = %user.id, "login invalid password");
        return Err(AppError::unauthorized(INVALID_CREDENTIALS));
    }

    let school = state.users.find_school(user.school_id).await?;
    info!(user_id = %user.id, email = %user.email, "user logged in");
    issue_session(state, user, school.as_ref())
}

pub async fn request_login_otp(state: &AppState, req: EmailRequest) -> Result<(), AppError> {
    let email = normalize_email(&req.email);
    if email.is_empty() {
        return Err(AppError::validation("Email is required"));
    }

    // Unlike password login, recovery reveals whether the account exists.
    if state.users.find_by_email(&email).await?.is_none() {
        return Err(AppError::not_found("No account found with this email"));
    }

    let code = state.otp.put(&email, OtpPayload::LoginRecovery).await?;
    dispatch_code(state, &email, &code).await;

    info!(email = %email, "login otp issued");
    Ok(())
}

pub async fn verify_login_otp(
    state: &AppState,
    req: VerifyOtpRequest,
) -> Result<AuthResponse, AppError> {
    let email = normalize_email(&req.email);
    let code = req.otp.trim();
    if email.is_empty() || code.is_empty() {
        return Err(AppError::validation("Email and OTP are required"));
    }

    let check = state
        .otp
        .take_matching(&email, OtpKind::LoginRecovery, code)
        .await?;
    accepted(check, &email, OtpKind::LoginRecovery)?;

    let user = state
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    let school = state.users.find_school(user.school_id).await?;

    info!(user_id = %user.id, email = %user.email, "user logged in with otp");
    issue_session(state, user, school.as_ref())
}

pub async fn profile(state: &AppState, who: &SessionIdentity) -> Result<PublicUser, AppError> {
    let user = state
        .users
        .find_by_id(who.id)
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;
    let school = state.users.find_school(user.school_id).await?;
    Ok(PublicUser::new(user, school.as_ref()))
}
