use std::env;

use chrono::Duration;
use hng_payment_engine::db_types::{GatewayId, PaymentMethod};
use hpg_common::{parse_boolean_flag, Secret};
use log::*;
use rand::{distributions::Alphanumeric, thread_rng, Rng};

use crate::helpers::CidrRange;

const DEFAULT_HPG_HOST: &str = "127.0.0.1";
const DEFAULT_HPG_PORT: u16 = 8380;
const DEFAULT_RECONCILE_INTERVAL_SECS: i64 = 600;
const DEFAULT_STALENESS_MINUTES: i64 = 30;
const DEFAULT_MARKER_RETENTION_DAYS: i64 = 30;
const DEFAULT_WEBHOOK_RATE_LIMIT: u32 = 120;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// If true, the X-Forwarded-For header will be used to determine the client's IP address, rather than the
    /// connection's remote address.
    pub use_x_forwarded_for: bool,
    /// If true, the Forwarded header will be used to determine the client's IP address.
    pub use_forwarded: bool,
    /// When true, local webhook processing is disabled entirely and deliveries are answered with 410; the
    /// orchestration service is expected to process them instead.
    pub delegate_webhooks: bool,
    /// How often the reconciliation worker sweeps stale pending charges.
    pub reconcile_interval: std::time::Duration,
    /// Pending ledger entries older than this are re-checked against the provider.
    pub staleness_threshold: Duration,
    /// How long processed webhook event ids are retained before being pruned.
    pub marker_retention: Duration,
    /// Webhook deliveries allowed per gateway per minute.
    pub webhook_rate_limit: u32,
    /// The secret used to sign checkout session tokens.
    pub session_secret: Secret<String>,
    pub orchestrator: OrchestratorConfig,
    pub gateways: GatewayConfigs,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HPG_HOST.to_string(),
            port: DEFAULT_HPG_PORT,
            database_url: String::default(),
            use_x_forwarded_for: false,
            use_forwarded: false,
            delegate_webhooks: false,
            reconcile_interval: std::time::Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS as u64),
            staleness_threshold: Duration::minutes(DEFAULT_STALENESS_MINUTES),
            marker_retention: Duration::days(DEFAULT_MARKER_RETENTION_DAYS),
            webhook_rate_limit: DEFAULT_WEBHOOK_RATE_LIMIT,
            session_secret: Secret::new(String::default()),
            orchestrator: OrchestratorConfig::default(),
            gateways: GatewayConfigs::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("HPG_HOST").ok().unwrap_or_else(|| DEFAULT_HPG_HOST.into());
        let port = env::var("HPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for HPG_PORT. {e} Using the default, {DEFAULT_HPG_PORT}, instead."
                    );
                    DEFAULT_HPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_HPG_PORT);
        let database_url = env::var("HPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ HPG_DATABASE_URL is not set. Please set it to the URL for the settlement database.");
            String::default()
        });
        let use_x_forwarded_for = parse_boolean_flag(env::var("HPG_USE_X_FORWARDED_FOR").ok(), false);
        let use_forwarded = parse_boolean_flag(env::var("HPG_USE_FORWARDED").ok(), false);
        let delegate_webhooks = parse_boolean_flag(env::var("HPG_DELEGATE_WEBHOOKS").ok(), false);
        let reconcile_interval = duration_from_env("HPG_RECONCILE_INTERVAL", DEFAULT_RECONCILE_INTERVAL_SECS, "s");
        let staleness_threshold =
            Duration::minutes(int_from_env("HPG_RECONCILE_STALENESS_MINS", DEFAULT_STALENESS_MINUTES));
        let marker_retention = Duration::days(int_from_env("HPG_MARKER_RETENTION_DAYS", DEFAULT_MARKER_RETENTION_DAYS));
        let webhook_rate_limit =
            int_from_env("HPG_WEBHOOK_RATE_LIMIT", i64::from(DEFAULT_WEBHOOK_RATE_LIMIT)).max(1) as u32;
        let session_secret = match env::var("HPG_SESSION_SECRET") {
            Ok(s) if !s.trim().is_empty() => Secret::new(s),
            _ => {
                warn!(
                    "🚨️ HPG_SESSION_SECRET is not set. Using a random value for this session; every checkout session \
                     token will be invalidated when the server restarts."
                );
                let random: String = thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
                Secret::new(random)
            },
        };
        Self {
            host,
            port,
            database_url,
            use_x_forwarded_for,
            use_forwarded,
            delegate_webhooks,
            reconcile_interval: std::time::Duration::from_secs(reconcile_interval as u64),
            staleness_threshold,
            marker_retention,
            webhook_rate_limit,
            session_secret,
            orchestrator: OrchestratorConfig::from_env_or_default(),
            gateways: GatewayConfigs::from_env_or_default(),
        }
    }
}

fn int_from_env(var: &str, default: i64) -> i64 {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default value of {default}."))
        .and_then(|s| {
            s.parse::<i64>().map_err(|e| warn!("🪛️ Invalid configuration value for {var}: {s}. {e} Using {default}."))
        })
        .ok()
        .filter(|v| *v > 0)
        .unwrap_or(default)
}

fn duration_from_env(var: &str, default_secs: i64, unit: &str) -> i64 {
    let secs = int_from_env(var, default_secs);
    debug!("🪛️ {var} = {secs}{unit}");
    secs
}

//-----------------------------------------------  OrchestratorConfig  -------------------------------------------------

/// Credentials for the remote fee/payment orchestration service. When the base url is unset, every fee is computed
/// locally and flagged as a fallback.
#[derive(Clone, Debug, Default)]
pub struct OrchestratorConfig {
    pub base_url: String,
    pub api_key: Secret<String>,
    /// The HMAC secret used to verify the `signed` block of orchestrator responses.
    pub signing_secret: Secret<String>,
    pub merchant_id: String,
}

impl OrchestratorConfig {
    pub fn from_env_or_default() -> Self {
        let base_url = env::var("HPG_ORCHESTRATOR_URL").ok().unwrap_or_else(|| {
            info!("🪛️ HPG_ORCHESTRATOR_URL is not set. Fees will be computed locally and flagged as fallback.");
            String::default()
        });
        let api_key = Secret::new(env::var("HPG_ORCHESTRATOR_API_KEY").ok().unwrap_or_default());
        let signing_secret = match env::var("HPG_ORCHESTRATOR_SIGNING_SECRET") {
            Ok(s) => Secret::new(s),
            Err(_) => {
                if !base_url.is_empty() {
                    error!(
                        "🪛️ HPG_ORCHESTRATOR_SIGNING_SECRET is not set, so orchestrator responses cannot be \
                         verified. The orchestrator will not be used."
                    );
                }
                Secret::new(String::default())
            },
        };
        let merchant_id = env::var("HPG_MERCHANT_ID").ok().unwrap_or_else(|| {
            if !base_url.is_empty() {
                warn!("🪛️ HPG_MERCHANT_ID is not set.");
            }
            String::default()
        });
        Self { base_url, api_key, signing_secret, merchant_id }
    }

    /// Whether the client has enough configuration to make verified calls.
    pub fn is_configured(&self) -> bool {
        !self.base_url.is_empty() && !self.signing_secret.reveal().is_empty()
    }
}

//-------------------------------------------------  GatewayConfig  ----------------------------------------------------

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub gateway: GatewayId,
    pub enabled: bool,
    /// The per-gateway secret for webhook body signatures. Empty means unsigned deliveries are rejected outright.
    pub webhook_secret: Secret<String>,
    /// Base url of the gateway's REST API (used by the PIX provider adapter).
    pub api_url: String,
    pub api_key: Secret<String>,
    /// IP/CIDR whitelist for webhook deliveries. `None` means the check was explicitly disabled; an empty list
    /// rejects everything.
    pub whitelist: Option<Vec<CidrRange>>,
}

impl GatewayConfig {
    fn from_env_or_default(gateway: GatewayId) -> Self {
        let prefix = format!("HPG_{}", gateway.as_str().to_uppercase());
        let enabled = parse_boolean_flag(env::var(format!("{prefix}_ENABLED")).ok(), false);
        let webhook_secret = match env::var(format!("{prefix}_WEBHOOK_SECRET")) {
            Ok(s) => Secret::new(s),
            Err(_) => {
                if enabled {
                    error!(
                        "🪛️ {prefix}_WEBHOOK_SECRET is not set. Webhook deliveries from {gateway} will be rejected \
                         until it is."
                    );
                }
                Secret::new(String::default())
            },
        };
        let api_url = env::var(format!("{prefix}_API_URL")).ok().unwrap_or_default();
        let api_key = Secret::new(env::var(format!("{prefix}_API_KEY")).ok().unwrap_or_default());
        let whitelist = parse_whitelist(&prefix, gateway);
        Self { gateway, enabled, webhook_secret, api_url, api_key, whitelist }
    }
}

/// Parse `{prefix}_IP_WHITELIST`. The whitelist is mandatory for an enabled gateway; to explicitly disable the
/// check, set the variable to "false", "none", or "0".
fn parse_whitelist(prefix: &str, gateway: GatewayId) -> Option<Vec<CidrRange>> {
    let var = format!("{prefix}_IP_WHITELIST");
    let value = match env::var(&var) {
        Ok(v) => v,
        Err(_) => return Some(Vec::new()),
    };
    if ["none", "false", "0"].contains(&value.to_lowercase().as_str()) {
        info!(
            "🪛️ The {gateway} IP whitelist is disabled. If this is not what you want, set {var} to a \
             comma-separated list of IP addresses or CIDR ranges."
        );
        return None;
    }
    let ranges = value
        .split(',')
        .filter_map(|s| {
            s.parse::<CidrRange>().map_err(|e| warn!("🪛️ Ignoring invalid entry ({s}) in {var}: {e}")).ok()
        })
        .collect::<Vec<CidrRange>>();
    if ranges.is_empty() {
        warn!(
            "🚨️ The {gateway} IP whitelist was configured, but is empty. The server will run, but won't authorise \
             any webhook deliveries from {gateway}."
        );
    }
    Some(ranges)
}

#[derive(Clone, Debug)]
pub struct GatewayConfigs {
    pub asaas: GatewayConfig,
    pub mercado_pago: GatewayConfig,
    pub pag_seguro: GatewayConfig,
    pub pic_pay: GatewayConfig,
}

impl Default for GatewayConfigs {
    fn default() -> Self {
        let blank = |gateway| GatewayConfig {
            gateway,
            enabled: false,
            webhook_secret: Secret::new(String::default()),
            api_url: String::default(),
            api_key: Secret::new(String::default()),
            whitelist: Some(Vec::new()),
        };
        Self {
            asaas: blank(GatewayId::Asaas),
            mercado_pago: blank(GatewayId::MercadoPago),
            pag_seguro: blank(GatewayId::PagSeguro),
            pic_pay: blank(GatewayId::PicPay),
        }
    }
}

impl GatewayConfigs {
    pub fn from_env_or_default() -> Self {
        let configs = Self {
            asaas: GatewayConfig::from_env_or_default(GatewayId::Asaas),
            mercado_pago: GatewayConfig::from_env_or_default(GatewayId::MercadoPago),
            pag_seguro: GatewayConfig::from_env_or_default(GatewayId::PagSeguro),
            pic_pay: GatewayConfig::from_env_or_default(GatewayId::PicPay),
        };
        let enabled =
            GatewayId::ALL.iter().filter(|g| configs.get(**g).enabled).map(|g| g.as_str()).collect::<Vec<_>>();
        if enabled.is_empty() {
            warn!("🪛️ No payment gateway is enabled. Checkout will refuse every payment method.");
        } else {
            info!("🪛️ Enabled gateways: {}", enabled.join(", "));
        }
        configs
    }

    pub fn get(&self, gateway: GatewayId) -> &GatewayConfig {
        match gateway {
            GatewayId::Asaas => &self.asaas,
            GatewayId::MercadoPago => &self.mercado_pago,
            GatewayId::PagSeguro => &self.pag_seguro,
            GatewayId::PicPay => &self.pic_pay,
        }
    }

    /// Resolve the gateway for a payment method: the preference order is fixed per method, and the first enabled
    /// gateway wins. `None` means no gateway can take this method and checkout must fail with `invalid_payment`.
    pub fn gateway_for(&self, method: PaymentMethod) -> Option<GatewayId> {
        GatewayId::preference_for(method).iter().copied().find(|g| self.get(*g).enabled)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn gateway_preference_picks_first_enabled() {
        let mut gateways = GatewayConfigs::default();
        assert_eq!(gateways.gateway_for(PaymentMethod::Pix), None);
        gateways.pag_seguro.enabled = true;
        assert_eq!(gateways.gateway_for(PaymentMethod::Pix), Some(GatewayId::PagSeguro));
        // Asaas outranks PagSeguro for PIX.
        gateways.asaas.enabled = true;
        assert_eq!(gateways.gateway_for(PaymentMethod::Pix), Some(GatewayId::Asaas));
        // ...but not for credit cards.
        assert_eq!(gateways.gateway_for(PaymentMethod::CreditCard), Some(GatewayId::PagSeguro));
    }

    #[test]
    fn orchestrator_requires_url_and_secret() {
        let mut config = OrchestratorConfig::default();
        assert!(!config.is_configured());
        config.base_url = "https://orchestrator.example.com".into();
        assert!(!config.is_configured());
        config.signing_secret = Secret::new("s3kr1t".into());
        assert!(config.is_configured());
    }
}
