//! Server configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `SUUQ_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)
//! - `SUUQ_BASE_URL` - Public URL of the site, used for payment return URLs and links
//! - `SUUQ_SESSION_SECRET` - Session secret (min 32 chars, high entropy)
//!
//! ## Optional
//! - `SUUQ_HOST` - Bind address (default: 127.0.0.1)
//! - `SUUQ_PORT` - Listen port (default: 5000)
//! - `CHECKOUT_PRICE_POLICY` - `live` or `captured` (default: live)
//! - `DEFAULT_CURRENCY` - ISO 4217 code for new orders (default: USD)
//! - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET`, `STRIPE_API_BASE`
//! - `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_MODE` (sandbox | live)
//! - `EVC_PLUS_API_KEY`, `EVC_PLUS_API_URL`
//! - `GOLIS_SAAD_API_KEY`, `GOLIS_SAAD_API_URL`
//! - `EDAHAB_API_KEY`, `EDAHAB_API_URL`
//! - `SMTP_HOST`, `SMTP_PORT` (default: 587), `SMTP_USERNAME`, `SMTP_PASSWORD`, `EMAIL_FROM`
//! - `SENTRY_DSN`, `SENTRY_ENVIRONMENT`, `SENTRY_SAMPLE_RATE`, `SENTRY_TRACES_SAMPLE_RATE`
//!
//! Each payment provider is enabled only when its credentials are present.
//! Routes for a disabled provider answer 503.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use suuq_core::CurrencyCode;
use thiserror::Error;

const MIN_SESSION_SECRET_LENGTH: usize = 32;
const MIN_ENTROPY_BITS_PER_CHAR: f64 = 3.3;

const STRIPE_DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// Blocklist of common placeholder patterns (case-insensitive)
const PLACEHOLDER_PATTERNS: &[&str] = &[
    "your-",
    "changeme",
    "replace",
    "placeholder",
    "example",
    "password",
    "xxx",
    "todo",
    "fixme",
    "insert",
    "enter-",
    "put-your",
    "add-your",
];

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
    #[error("Insecure secret in {0}: {1}")]
    InsecureSecret(String, String),
}

/// Which unit price checkout charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PricePolicy {
    /// The product's price at checkout time.
    #[default]
    Live,
    /// The price seen when the item was added to the cart.
    Captured,
}

impl FromStr for PricePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "live" => Ok(Self::Live),
            "captured" => Ok(Self::Captured),
            other => Err(format!("expected `live` or `captured`, got `{other}`")),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// `PostgreSQL` database connection URL (contains password)
    pub database_url: SecretString,
    /// IP address to bind the server to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Public base URL, without trailing slash
    pub base_url: String,
    /// Session secret
    pub session_secret: SecretString,
    /// Checkout behaviour
    pub checkout: CheckoutConfig,
    /// Payment provider credentials
    pub payments: PaymentsConfig,
    /// SMTP settings; `None` disables notifications
    pub email: Option<EmailConfig>,
    /// Sentry DSN for error tracking
    pub sentry_dsn: Option<String>,
    /// Sentry environment name
    pub sentry_environment: Option<String>,
    /// Sentry error sample rate
    pub sentry_sample_rate: f32,
    /// Sentry traces sample rate
    pub sentry_traces_sample_rate: f32,
}

/// Checkout settings.
#[derive(Debug, Clone, Default)]
pub struct CheckoutConfig {
    pub price_policy: PricePolicy,
    pub default_currency: CurrencyCode,
}

/// Credentials for every payment provider. Absent providers are disabled.
#[derive(Debug, Clone, Default)]
pub struct PaymentsConfig {
    pub stripe: Option<StripeConfig>,
    pub paypal: Option<PaypalConfig>,
    pub evc_plus: Option<MobileMoneyConfig>,
    pub golis_saad: Option<MobileMoneyConfig>,
    pub edahab: Option<MobileMoneyConfig>,
}

/// Stripe API configuration.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    /// Secret API key (`sk_...`)
    pub secret_key: SecretString,
    /// Webhook endpoint signing secret (`whsec_...`); webhooks answer 503 without it
    pub webhook_secret: Option<SecretString>,
    /// API base URL, overridable for testing against a mock
    pub api_base: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// `PayPal` environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PaypalMode {
    #[default]
    Sandbox,
    Live,
}

impl PaypalMode {
    /// REST API base URL for this environment.
    #[must_use]
    pub const fn api_base(self) -> &'static str {
        match self {
            Self::Sandbox => "https://api-m.sandbox.paypal.com",
            Self::Live => "https://api-m.paypal.com",
        }
    }
}

impl FromStr for PaypalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" => Ok(Self::Sandbox),
            "live" => Ok(Self::Live),
            other => Err(format!("expected `sandbox` or `live`, got `{other}`")),
        }
    }
}

/// `PayPal` REST API configuration.
///
/// Implements `Debug` manually to redact the client secret.
#[derive(Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub mode: PaypalMode,
    /// Overrides the mode's API host, for testing against a mock
    pub api_base: Option<String>,
}

impl PaypalConfig {
    /// REST API base URL, without trailing slash.
    #[must_use]
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or(self.mode.api_base())
            .trim_end_matches('/')
    }
}

impl std::fmt::Debug for PaypalConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaypalConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("mode", &self.mode)
            .field("api_base", &self.api_base)
            .finish()
    }
}

/// Mobile-money provider endpoint and key.
///
/// Implements `Debug` manually to redact the API key.
#[derive(Clone)]
pub struct MobileMoneyConfig {
    pub api_key: SecretString,
    pub api_url: String,
}

impl std::fmt::Debug for MobileMoneyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MobileMoneyConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_url", &self.api_url)
            .finish()
    }
}

/// Email (SMTP) configuration.
///
/// Implements `Debug` manually to redact the password.
#[derive(Clone)]
pub struct EmailConfig {
    /// SMTP server hostname
    pub smtp_host: String,
    /// SMTP server port
    pub smtp_port: u16,
    /// SMTP authentication username
    pub smtp_username: String,
    /// SMTP authentication password
    pub smtp_password: SecretString,
    /// Email sender address (From header)
    pub from_address: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_username", &self.smtp_username)
            .field("smtp_password", &"[REDACTED]")
            .field("from_address", &self.from_address)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// Calls `dotenvy::dotenv()` to load from `.env` file if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing, invalid, or
    /// if secrets fail validation (placeholder detection, entropy check).
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database_url = get_database_url("SUUQ_DATABASE_URL")?;
        let host = parse_env("SUUQ_HOST", "127.0.0.1")?;
        let port = parse_env("SUUQ_PORT", "5000")?;
        let base_url = parse_base_url(&get_required_env("SUUQ_BASE_URL")?)?;
        let session_secret = get_validated_secret("SUUQ_SESSION_SECRET")?;
        validate_session_secret(&session_secret, "SUUQ_SESSION_SECRET")?;

        let checkout = CheckoutConfig::from_env()?;
        let payments = PaymentsConfig::from_env()?;
        let email = EmailConfig::from_env()?;
        let sentry_dsn = get_optional_env("SENTRY_DSN");
        let sentry_environment = get_optional_env("SENTRY_ENVIRONMENT");
        let sentry_sample_rate = get_optional_env("SENTRY_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(1.0);
        let sentry_traces_sample_rate = get_optional_env("SENTRY_TRACES_SAMPLE_RATE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(0.1);

        Ok(Self {
            database_url,
            host,
            port,
            base_url,
            session_secret,
            checkout,
            payments,
            email,
            sentry_dsn,
            sentry_environment,
            sentry_sample_rate,
            sentry_traces_sample_rate,
        })
    }

    /// Minimal configuration with every integration disabled.
    ///
    /// Used by the CLI and by tests that build an application without
    /// touching the process environment.
    #[must_use]
    pub fn local(database_url: &str) -> Self {
        Self {
            database_url: SecretString::from(database_url.to_owned()),
            host: IpAddr::from([127, 0, 0, 1]),
            port: 5000,
            base_url: "http://localhost:5000".to_string(),
            session_secret: SecretString::from("local-session-secret-0123456789abcdef"),
            checkout: CheckoutConfig::default(),
            payments: PaymentsConfig::default(),
            email: None,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        }
    }

    /// Returns the socket address for binding the server.
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    /// Whether cookies should carry the `Secure` attribute.
    #[must_use]
    pub fn is_https(&self) -> bool {
        self.base_url.starts_with("https://")
    }
}

impl CheckoutConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            price_policy: parse_env("CHECKOUT_PRICE_POLICY", "live")?,
            default_currency: parse_env("DEFAULT_CURRENCY", "USD")?,
        })
    }
}

impl PaymentsConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            stripe: StripeConfig::from_env(),
            paypal: PaypalConfig::from_env()?,
            evc_plus: MobileMoneyConfig::from_env("EVC_PLUS"),
            golis_saad: MobileMoneyConfig::from_env("GOLIS_SAAD"),
            edahab: MobileMoneyConfig::from_env("EDAHAB"),
        })
    }
}

impl StripeConfig {
    /// Returns `None` if `STRIPE_SECRET_KEY` is not set (card payments disabled).
    fn from_env() -> Option<Self> {
        let secret_key = get_optional_env("STRIPE_SECRET_KEY")?;
        if let Err(e) = validate_secret_strength(&secret_key, "STRIPE_SECRET_KEY") {
            tracing::warn!("STRIPE_SECRET_KEY validation warning: {e}");
        }
        let webhook_secret = get_optional_env("STRIPE_WEBHOOK_SECRET");
        if webhook_secret.is_none() {
            tracing::warn!("STRIPE_WEBHOOK_SECRET not set, Stripe webhooks will be rejected");
        }

        Some(Self {
            secret_key: SecretString::from(secret_key),
            webhook_secret: webhook_secret.map(SecretString::from),
            api_base: get_env_or_default("STRIPE_API_BASE", STRIPE_DEFAULT_API_BASE)
                .trim_end_matches('/')
                .to_string(),
        })
    }
}

impl PaypalConfig {
    /// Returns `None` unless both client id and secret are set.
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(client_id), Some(client_secret)) = (
            get_optional_env("PAYPAL_CLIENT_ID"),
            get_optional_env("PAYPAL_CLIENT_SECRET"),
        ) else {
            return Ok(None);
        };
        if let Err(e) = validate_secret_strength(&client_secret, "PAYPAL_CLIENT_SECRET") {
            tracing::warn!("PAYPAL_CLIENT_SECRET validation warning: {e}");
        }

        Ok(Some(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            mode: parse_env("PAYPAL_MODE", "sandbox")?,
            api_base: get_optional_env("PAYPAL_API_BASE"),
        }))
    }
}

impl MobileMoneyConfig {
    /// Reads `{prefix}_API_KEY` and `{prefix}_API_URL`.
    ///
    /// Returns `None` unless both are set.
    fn from_env(prefix: &str) -> Option<Self> {
        let api_key = get_optional_env(&format!("{prefix}_API_KEY"))?;
        let api_url = get_optional_env(&format!("{prefix}_API_URL"))?;
        Some(Self {
            api_key: SecretString::from(api_key),
            api_url,
        })
    }
}

impl EmailConfig {
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (notifications disabled).
    fn from_env() -> Result<Option<Self>, ConfigError> {
        let Some(smtp_host) = get_optional_env("SMTP_HOST") else {
            return Ok(None);
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port: parse_env("SMTP_PORT", "587")?,
            smtp_username: get_required_env("SMTP_USERNAME")?,
            smtp_password: get_validated_secret("SMTP_PASSWORD")?,
            from_address: get_required_env("EMAIL_FROM")?,
        }))
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// Get a required environment variable.
fn get_required_env(key: &str) -> Result<String, ConfigError> {
    std::env::var(key).map_err(|_| ConfigError::MissingEnvVar(key.to_string()))
}

/// Validate the public base URL and drop any trailing slash.
fn parse_base_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: &str| {
        ConfigError::InvalidEnvVar("SUUQ_BASE_URL".to_string(), reason.to_string())
    };

    let url = url::Url::parse(raw.trim()).map_err(|e| invalid(&e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid("scheme must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host"));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(invalid("must not carry a query or fragment"));
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}

/// Get database URL with fallback to generic `DATABASE_URL`.
fn get_database_url(primary_key: &str) -> Result<SecretString, ConfigError> {
    if let Ok(value) = std::env::var(primary_key) {
        return Ok(SecretString::from(value));
    }
    if let Ok(value) = std::env::var("DATABASE_URL") {
        return Ok(SecretString::from(value));
    }
    Err(ConfigError::MissingEnvVar(primary_key.to_string()))
}

/// Get an optional environment variable. Empty values count as unset.
fn get_optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Get an environment variable with a default value.
fn get_env_or_default(key: &str, default: &str) -> String {
    get_optional_env(key).unwrap_or_else(|| default.to_string())
}

/// Parse an environment variable (or its default) with `FromStr`.
fn parse_env<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    get_env_or_default(key, default)
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidEnvVar(key.to_string(), e.to_string()))
}

/// Validate that a session secret meets minimum length requirements.
fn validate_session_secret(secret: &SecretString, var_name: &str) -> Result<(), ConfigError> {
    let value = secret.expose_secret();
    if value.len() < MIN_SESSION_SECRET_LENGTH {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "must be at least {} characters (got {})",
                MIN_SESSION_SECRET_LENGTH,
                value.len()
            ),
        ));
    }
    Ok(())
}

/// Calculate Shannon entropy in bits per character.
fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }

    let mut freq: HashMap<char, usize> = HashMap::new();
    for c in s.chars() {
        *freq.entry(c).or_insert(0) += 1;
    }

    #[allow(clippy::cast_precision_loss)] // String length will never exceed f64 precision
    let len = s.chars().count() as f64;
    freq.values()
        .map(|&count| {
            #[allow(clippy::cast_precision_loss)]
            let p = count as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Validate that a secret is not a placeholder and has sufficient entropy.
fn validate_secret_strength(secret: &str, var_name: &str) -> Result<(), ConfigError> {
    let lower = secret.to_lowercase();

    for pattern in PLACEHOLDER_PATTERNS {
        if lower.contains(pattern) {
            return Err(ConfigError::InsecureSecret(
                var_name.to_string(),
                format!("appears to be a placeholder (contains '{pattern}')"),
            ));
        }
    }

    let entropy = shannon_entropy(secret);
    if entropy < MIN_ENTROPY_BITS_PER_CHAR {
        return Err(ConfigError::InsecureSecret(
            var_name.to_string(),
            format!(
                "entropy too low ({entropy:.2} bits/char, need >= {MIN_ENTROPY_BITS_PER_CHAR:.1}). Use a randomly generated secret."
            ),
        ));
    }

    Ok(())
}

/// Load and validate a secret from environment.
fn get_validated_secret(key: &str) -> Result<SecretString, ConfigError> {
    let value = get_required_env(key)?;
    validate_secret_strength(&value, key)?;
    Ok(SecretString::from(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_shannon_entropy_bounds() {
        assert!((shannon_entropy("") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("aaaaaaa") - 0.0).abs() < f64::EPSILON);
        assert!((shannon_entropy("ab") - 1.0).abs() < 0.01);
        assert!(shannon_entropy("aB3$xY9!mK2@nL5#") > 3.3);
    }

    #[test]
    fn test_validate_secret_strength_placeholder() {
        let err = validate_secret_strength("your-api-key-here", "TEST_VAR").unwrap_err();
        assert!(matches!(err, ConfigError::InsecureSecret(_, _)));
        assert!(validate_secret_strength("changeme123", "TEST_VAR").is_err());
    }

    #[test]
    fn test_validate_secret_strength_low_entropy() {
        let result = validate_secret_strength("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "TEST_VAR");
        assert!(matches!(result, Err(ConfigError::InsecureSecret(_, _))));
    }

    #[test]
    fn test_validate_secret_strength_valid() {
        let result = validate_secret_strength("aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6", "TEST_VAR");
        assert!(result.is_ok());
    }

    #[test]
    fn test_validate_session_secret_length() {
        let short = SecretString::from("short");
        assert!(validate_session_secret(&short, "TEST_SESSION").is_err());

        let ok = SecretString::from("a".repeat(32));
        assert!(validate_session_secret(&ok, "TEST_SESSION").is_ok());
    }

    #[test]
    fn test_parse_base_url() {
        assert_eq!(parse_base_url("https://suuq.so/").unwrap(), "https://suuq.so");
        assert_eq!(
            parse_base_url(" http://localhost:5000 ").unwrap(),
            "http://localhost:5000"
        );
        assert!(parse_base_url("suuq.so").is_err());
        assert!(parse_base_url("ftp://suuq.so").is_err());
        assert!(parse_base_url("https://suuq.so/?ref=1").is_err());
    }

    #[test]
    fn test_price_policy_parse() {
        assert_eq!("live".parse::<PricePolicy>().unwrap(), PricePolicy::Live);
        assert_eq!(" Captured ".parse::<PricePolicy>().unwrap(), PricePolicy::Captured);
        assert!("cheapest".parse::<PricePolicy>().is_err());
        assert_eq!(PricePolicy::default(), PricePolicy::Live);
    }

    #[test]
    fn test_paypal_mode_api_base() {
        assert_eq!(
            "sandbox".parse::<PaypalMode>().unwrap().api_base(),
            "https://api-m.sandbox.paypal.com"
        );
        assert_eq!(PaypalMode::Live.api_base(), "https://api-m.paypal.com");

        let mut config = PaypalConfig {
            client_id: "id".to_string(),
            client_secret: SecretString::from("secret"),
            mode: PaypalMode::Live,
            api_base: None,
        };
        assert_eq!(config.api_base(), "https://api-m.paypal.com");
        config.api_base = Some("http://127.0.0.1:9000/".to_string());
        assert_eq!(config.api_base(), "http://127.0.0.1:9000");
    }

    #[test]
    fn test_local_config() {
        let config = ServerConfig::local("postgres://localhost/suuq");
        assert_eq!(config.socket_addr().port(), 5000);
        assert!(!config.is_https());
        assert!(config.payments.stripe.is_none());
        assert!(config.email.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let stripe = StripeConfig {
            secret_key: SecretString::from("sk_test_super_secret_value"),
            webhook_secret: Some(SecretString::from("whsec_super_secret_value")),
            api_base: STRIPE_DEFAULT_API_BASE.to_string(),
        };
        let paypal = PaypalConfig {
            client_id: "client_id_value".to_string(),
            client_secret: SecretString::from("paypal_super_secret_value"),
            mode: PaypalMode::Sandbox,
            api_base: None,
        };
        let email = EmailConfig {
            smtp_host: "smtp.mailhost.so".to_string(),
            smtp_port: 587,
            smtp_username: "mailer".to_string(),
            smtp_password: SecretString::from("smtp_super_secret_value"),
            from_address: "orders@suuq.so".to_string(),
        };

        let debug_output = format!("{stripe:?} {paypal:?} {email:?}");
        assert!(debug_output.contains("client_id_value"));
        assert!(debug_output.contains("smtp.mailhost.so"));
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret"));
    }
}
