use async_trait::async_trait;
use tracing::info;

/// Email delivery is a sink: callers hand over an address and a verification
/// link and do not care how it gets there.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_verification(&self, to: &str, verify_url: &str) -> anyhow::Result<()>;
}

/// Local dev sender that logs the link instead of sending real email.
#[derive(Clone, Debug, Default)]
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_verification(&self, to: &str, verify_url: &str) -> anyhow::Result<()> {
        info!(to = %to, url = %verify_url, "verification email send stub");
        Ok(())
    }
}

/// Build the verification link included in outbound emails.
pub fn build_verify_url(base_url: &str, token: &str) -> String {
    let base = base_url.trim_end_matches('/');
    format!("{base}/verify-email?token={token}")
}
