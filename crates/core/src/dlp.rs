use tracing::info;

use crate::model::{DlpLevel, UserContext};
use crate::pii::redact;

/// Outbound gate applied once per response, after the cache.
///
/// Privileged callers get the text unchanged and the bypass is logged;
/// everyone else gets the redacted text.
pub fn enforce_dlp(answer_text: &str, user: &UserContext) -> String {
    match user.dlp_level {
        DlpLevel::Privileged => {
            info!(
                user_id = %user.user_id,
                subject = user.subject().unwrap_or("-"),
                "dlp_bypass"
            );
            answer_text.to_string()
        }
        DlpLevel::Standard => redact(answer_text),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str =
        "Mi DNI es 24567579 y mi tarjeta es 4915 6002 9720 0043, persona@example.org";

    fn user(level: DlpLevel) -> UserContext {
        UserContext {
            user_id: "user-1".to_string(),
            allowed_subjects: vec!["CLI-1".to_string()],
            dlp_level: level,
        }
    }

    #[test]
    fn standard_callers_get_placeholders() {
        let out = enforce_dlp(SAMPLE, &user(DlpLevel::Standard));
        for literal in ["24567579", "4915 6002 9720 0043", "persona@example.org"] {
            assert!(!out.contains(literal), "{literal} leaked in {out}");
        }
        assert!(out.contains("[IDENTITY_NUMBER]"));
        assert!(out.contains("[CARD_NUMBER]"));
        assert!(out.contains("[EMAIL]"));
    }

    #[test]
    fn privileged_callers_see_literals() {
        let out = enforce_dlp(SAMPLE, &user(DlpLevel::Privileged));
        assert_eq!(out, SAMPLE);
    }
}
