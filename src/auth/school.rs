use crate::error::AppError;

/// Domain part of an email address, lowercased. The address must contain
/// exactly one `@`.
pub fn extract_domain(email: &str) -> Result<String, AppError> {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(_), Some(domain), None) if !domain.is_empty() => Ok(domain.to_lowercase()),
        _ => Err(AppError::validation("Invalid email format")),
    }
}

/// Display name for a school derived from its email domain.
///
/// `cs.columbia.edu` gives `Columbia`, `ox.ac.uk` gives `Ox`, and domains
/// without an `edu`/`ac` label fall back to their first label.
pub fn school_name(domain: &str) -> String {
    let labels: Vec<&str> = domain.split('.').collect();
    let academic = labels.iter().position(|l| *l == "edu" || *l == "ac");
    let label = match academic {
        Some(i) if i > 0 => labels[i - 1],
        _ => labels[0],
    };
    capitalize(label)
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
