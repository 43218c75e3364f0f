//! Service configuration shared by handlers and middleware.

use secrecy::{ExposeSecret, SecretString};
use url::Url;

const DEFAULT_PANEL_ID: &str = "app";
const DEFAULT_EMAIL_CHANGE_TTL_MINUTES: i64 = 60;
const DEFAULT_SUDO_TTL_SECONDS: i64 = 2 * 60 * 60;
const DEFAULT_PRUNE_INTERVAL_SECONDS: u64 = 15 * 60;
const DEFAULT_PENDING_EMAIL_TABLE: &str = "pending_email_changes";
const DEFAULT_WEBAUTHN_TABLE: &str = "webauthn_keys";

#[derive(Clone, Debug)]
pub struct AppConfig {
    frontend_base_url: String,
    panel_id: String,
    url_signing_secret: SecretString,
    email_change_ttl_minutes: i64,
    sudo_enabled: bool,
    sudo_ttl_seconds: i64,
    prune_interval_seconds: u64,
    pending_email_table: String,
    webauthn_table: String,
    webauthn_rp_id: String,
    webauthn_rp_origin: String,
}

impl AppConfig {
    #[must_use]
    pub fn new(frontend_base_url: String, url_signing_secret: SecretString) -> Self {
        let rp_id = Url::parse(&frontend_base_url)
            .ok()
            .and_then(|u: Url| u.host_str().map(ToString::to_string))
            .unwrap_or_else(|| "localhost".to_string());

        // Ensure origin does not have a trailing slash
        let rp_origin = frontend_base_url.trim_end_matches('/').to_string();

        Self {
            frontend_base_url,
            panel_id: DEFAULT_PANEL_ID.to_string(),
            url_signing_secret,
            email_change_ttl_minutes: DEFAULT_EMAIL_CHANGE_TTL_MINUTES,
            sudo_enabled: true,
            sudo_ttl_seconds: DEFAULT_SUDO_TTL_SECONDS,
            prune_interval_seconds: DEFAULT_PRUNE_INTERVAL_SECONDS,
            pending_email_table: DEFAULT_PENDING_EMAIL_TABLE.to_string(),
            webauthn_table: DEFAULT_WEBAUTHN_TABLE.to_string(),
            webauthn_rp_id: rp_id,
            webauthn_rp_origin: rp_origin,
        }
    }

    #[must_use]
    pub fn with_panel_id(mut self, panel_id: String) -> Self {
        self.panel_id = panel_id;
        self
    }

    #[must_use]
    pub fn with_email_change_ttl_minutes(mut self, minutes: i64) -> Self {
        self.email_change_ttl_minutes = minutes;
        self
    }

    #[must_use]
    pub fn with_sudo_enabled(mut self, enabled: bool) -> Self {
        self.sudo_enabled = enabled;
        self
    }

    #[must_use]
    pub fn with_sudo_ttl_seconds(mut self, seconds: i64) -> Self {
        self.sudo_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_prune_interval_seconds(mut self, seconds: u64) -> Self {
        self.prune_interval_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_pending_email_table(mut self, table: String) -> Self {
        self.pending_email_table = table;
        self
    }

    #[must_use]
    pub fn with_webauthn_table(mut self, table: String) -> Self {
        self.webauthn_table = table;
        self
    }

    #[must_use]
    pub fn with_webauthn_rp_id(mut self, rp_id: String) -> Self {
        self.webauthn_rp_id = rp_id;
        self
    }

    #[must_use]
    pub fn with_webauthn_rp_origin(mut self, rp_origin: String) -> Self {
        self.webauthn_rp_origin = rp_origin;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    #[must_use]
    pub fn panel_id(&self) -> &str {
        &self.panel_id
    }

    pub(crate) fn url_signing_key(&self) -> &[u8] {
        self.url_signing_secret.expose_secret().as_bytes()
    }

    #[must_use]
    pub fn email_change_ttl_minutes(&self) -> i64 {
        self.email_change_ttl_minutes
    }

    #[must_use]
    pub fn sudo_enabled(&self) -> bool {
        self.sudo_enabled
    }

    #[must_use]
    pub fn sudo_ttl_seconds(&self) -> i64 {
        self.sudo_ttl_seconds
    }

    #[must_use]
    pub fn prune_interval_seconds(&self) -> u64 {
        self.prune_interval_seconds
    }

    #[must_use]
    pub fn pending_email_table(&self) -> &str {
        &self.pending_email_table
    }

    #[must_use]
    pub fn webauthn_table(&self) -> &str {
        &self.webauthn_table
    }

    #[must_use]
    pub fn webauthn_rp_id(&self) -> &str {
        &self.webauthn_rp_id
    }

    #[must_use]
    pub fn webauthn_rp_origin(&self) -> &str {
        &self.webauthn_rp_origin
    }

    /// Panel-scoped re-authentication URL used by the sudo guard's redirect.
    ///
    /// A `tenant` route parameter, when present, is carried over so the
    /// challenge page lands in the same tenant context.
    #[must_use]
    pub fn sudo_challenge_url(&self, tenant: Option<&str>) -> String {
        let base = self.frontend_base_url.trim_end_matches('/');
        let panel = &self.panel_id;
        match tenant {
            Some(tenant) => format!("{base}/{panel}/sudo-challenge?tenant={tenant}"),
            None => format!("{base}/{panel}/sudo-challenge"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppConfig;
    use secrecy::SecretString;

    fn config() -> AppConfig {
        AppConfig::new(
            "https://custodia.dev".to_string(),
            SecretString::from("signing-secret".to_string()),
        )
    }

    #[test]
    fn defaults_and_overrides() {
        let config = config();

        assert_eq!(config.frontend_base_url(), "https://custodia.dev");
        assert_eq!(config.panel_id(), super::DEFAULT_PANEL_ID);
        assert_eq!(
            config.email_change_ttl_minutes(),
            super::DEFAULT_EMAIL_CHANGE_TTL_MINUTES
        );
        assert!(config.sudo_enabled());
        assert_eq!(config.sudo_ttl_seconds(), super::DEFAULT_SUDO_TTL_SECONDS);
        assert_eq!(config.pending_email_table(), "pending_email_changes");
        assert_eq!(config.webauthn_table(), "webauthn_keys");
        assert_eq!(config.webauthn_rp_id(), "custodia.dev");
        assert_eq!(config.webauthn_rp_origin(), "https://custodia.dev");

        let config = config
            .with_panel_id("admin".to_string())
            .with_email_change_ttl_minutes(5)
            .with_sudo_enabled(false)
            .with_sudo_ttl_seconds(60)
            .with_prune_interval_seconds(30)
            .with_pending_email_table("pending".to_string())
            .with_webauthn_table("keys".to_string());

        assert_eq!(config.panel_id(), "admin");
        assert_eq!(config.email_change_ttl_minutes(), 5);
        assert!(!config.sudo_enabled());
        assert_eq!(config.sudo_ttl_seconds(), 60);
        assert_eq!(config.prune_interval_seconds(), 30);
        assert_eq!(config.pending_email_table(), "pending");
        assert_eq!(config.webauthn_table(), "keys");
    }

    #[test]
    fn sudo_challenge_url_is_panel_scoped() {
        let config = config();
        assert_eq!(
            config.sudo_challenge_url(None),
            "https://custodia.dev/app/sudo-challenge"
        );
    }

    #[test]
    fn sudo_challenge_url_carries_tenant() {
        let config = config().with_panel_id("admin".to_string());
        assert_eq!(
            config.sudo_challenge_url(Some("acme")),
            "https://custodia.dev/admin/sudo-challenge?tenant=acme"
        );
    }
}
