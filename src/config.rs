use serde::Deserialize;
use time::Duration;

/// Access/refresh lifetimes. Access must stay strictly below refresh so a
/// live access identifier always has a redeemable refresh token behind it.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub access_ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

impl TokenConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::minutes(self.refresh_ttl_minutes)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    /// Base URL the verification link points at.
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub token: TokenConfig,
    pub email: EmailConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let token = TokenConfig {
            access_ttl_minutes: std::env::var("ACCESS_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24),
        };
        if token.access_ttl_minutes <= 0 || token.refresh_ttl_minutes <= 0 {
            anyhow::bail!("token TTLs must be positive");
        }
        if token.access_ttl_minutes >= token.refresh_ttl_minutes {
            anyhow::bail!("ACCESS_TTL_MINUTES must be less than REFRESH_TTL_MINUTES");
        }
        let email = EmailConfig {
            base_url: std::env::var("BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080".into()),
        };
        Ok(Self {
            database_url,
            token,
            email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_accessors_convert_minutes() {
        let token = TokenConfig {
            access_ttl_minutes: 60,
            refresh_ttl_minutes: 60 * 24,
        };
        assert_eq!(token.access_ttl(), Duration::hours(1));
        assert_eq!(token.refresh_ttl(), Duration::hours(24));
    }
}
