//! Per-session anti-forgery tokens.

use std::sync::Arc;

use crate::session::{SessionError, SessionId, SessionStore};

/// Issues and verifies the CSRF token stored in each session.
#[derive(Debug, Clone)]
pub struct CsrfGuard {
    sessions: Arc<SessionStore>,
}

impl CsrfGuard {
    pub fn new(sessions: Arc<SessionStore>) -> Self {
        Self { sessions }
    }

    /// The session's token, generating one if it has none yet.
    ///
    /// Idempotent: repeated calls return the same token until it is
    /// regenerated or the session ends.
    pub fn issue_token(&self, session: &SessionId) -> Result<String, SessionError> {
        let tokens = self.sessions.tokens();
        self.sessions.with_session(session, |s| {
            s.csrf_token.get_or_insert_with(|| tokens.token()).clone()
        })
    }

    /// Replace the session's token unconditionally.
    pub fn regenerate_token(&self, session: &SessionId) -> Result<String, SessionError> {
        let token = self.sessions.tokens().token();
        self.sessions.with_session(session, |s| {
            s.csrf_token = Some(token.clone());
        })?;
        Ok(token)
    }

    /// Constant-time check of `supplied` against the stored token.
    ///
    /// Never errors: unknown session, missing token, or any mismatch is `false`.
    pub fn verify(&self, session: &SessionId, supplied: &str) -> bool {
        self.sessions
            .with_session(session, |s| match s.csrf_token.as_deref() {
                Some(expected) => constant_time_eq(expected.as_bytes(), supplied.as_bytes()),
                None => false,
            })
            .unwrap_or(false)
    }
}

/// Constant-time byte comparison to prevent timing attacks.
///
/// Length is not secret (tokens have a fixed length), so a length mismatch
/// returns early.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::token::OsTokenSource;
    use proptest::prelude::*;

    fn guard() -> (Arc<SessionStore>, CsrfGuard) {
        let sessions = Arc::new(SessionStore::new(Arc::new(SystemClock), Arc::new(OsTokenSource)));
        (sessions.clone(), CsrfGuard::new(sessions))
    }

    #[test]
    fn issue_is_idempotent_and_verifies() {
        let (sessions, csrf) = guard();
        let id = sessions.create_anonymous().unwrap();

        let token = csrf.issue_token(&id).unwrap();
        assert_eq!(token.len(), 64);
        assert_eq!(csrf.issue_token(&id).unwrap(), token);
        assert!(csrf.verify(&id, &token));
    }

    #[test]
    fn empty_and_mismatched_tokens_fail() {
        let (sessions, csrf) = guard();
        let id = sessions.create_anonymous().unwrap();
        let token = csrf.issue_token(&id).unwrap();

        assert!(!csrf.verify(&id, ""));
        assert!(!csrf.verify(&id, &token[..63]));
        let mut flipped = token.clone().into_bytes();
        flipped[0] = if flipped[0] == b'a' { b'b' } else { b'a' };
        assert!(!csrf.verify(&id, &String::from_utf8(flipped).unwrap()));
    }

    #[test]
    fn sessions_never_share_tokens() {
        let (sessions, csrf) = guard();
        let a = sessions.create_anonymous().unwrap();
        let b = sessions.create_anonymous().unwrap();

        let ta = csrf.issue_token(&a).unwrap();
        let tb = csrf.issue_token(&b).unwrap();
        assert_ne!(ta, tb);
        assert!(!csrf.verify(&a, &tb));
        assert!(!csrf.verify(&b, &ta));
    }

    #[test]
    fn regeneration_invalidates_old_token() {
        let (sessions, csrf) = guard();
        let id = sessions.create_anonymous().unwrap();
        let old = csrf.issue_token(&id).unwrap();
        let new = csrf.regenerate_token(&id).unwrap();

        assert_ne!(old, new);
        assert!(!csrf.verify(&id, &old));
        assert!(csrf.verify(&id, &new));
    }

    #[test]
    fn destroyed_session_verifies_nothing() {
        let (sessions, csrf) = guard();
        let id = sessions.create_anonymous().unwrap();
        let token = csrf.issue_token(&id).unwrap();
        sessions.destroy(&id).unwrap();

        assert!(!csrf.verify(&id, &token));
        assert_eq!(csrf.issue_token(&id), Err(SessionError::UnknownSession));
    }

    proptest! {
        #[test]
        fn arbitrary_guesses_never_verify(guess in ".{0,80}") {
            let (sessions, csrf) = guard();
            let id = sessions.create_anonymous().unwrap();
            let token = csrf.issue_token(&id).unwrap();
            prop_assume!(guess != token);
            prop_assert!(!csrf.verify(&id, &guess));
        }

        #[test]
        fn constant_time_eq_matches_slice_eq(a in proptest::collection::vec(any::<u8>(), 0..16),
                                             b in proptest::collection::vec(any::<u8>(), 0..16)) {
            prop_assert_eq!(constant_time_eq(&a, &b), a == b);
        }
    }
}
