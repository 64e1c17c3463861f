use tracing::info;

/// Delivers sign-up verification codes. Template rendering and transport
/// live outside this service.
pub trait VerificationMailer: Send + Sync {
    fn send_verification(&self, email: &str, username: &str, code: &str) -> anyhow::Result<()>;
}

/// Writes the code to the log instead of sending mail. Suitable for local
/// development only.
pub struct LogMailer;

impl VerificationMailer for LogMailer {
    fn send_verification(&self, email: &str, username: &str, code: &str) -> anyhow::Result<()> {
        info!(%email, %username, %code, "Verification email issued");
        Ok(())
    }
}
