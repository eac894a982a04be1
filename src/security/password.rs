use crate::error::{AppError, AppResult};

/// bcrypt at the library default cost. The verify step sits on the login
/// critical path; the cost constant is the knob if that budget moves.
pub const HASH_COST: u32 = bcrypt::DEFAULT_COST;

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, HASH_COST)
        .map_err(|e| AppError::Internal(format!("password hashing failed: {e}")))
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    bcrypt::verify(password, hash)
        .map_err(|e| AppError::Internal(format!("password verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("Test123!").unwrap();
        assert!(verify_password("Test123!", &hash).unwrap());
        assert!(!verify_password("Test123?", &hash).unwrap());
    }
}
