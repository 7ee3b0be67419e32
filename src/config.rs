use std::env;

/// Application configuration parsed from environment variables
///
/// Required variables fail startup with a message naming the variable;
/// everything else has a development-friendly default.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub queue_type: String,
    pub nats_url: String,
    pub host: String,
    pub port: u16,

    pub enable_stripe: bool,
    pub enable_razorpay: bool,
    pub enable_mock: bool,

    pub stripe_secret_key: Option<String>,
    pub razorpay_key_id: Option<String>,
    pub razorpay_key_secret: Option<String>,

    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,

    pub webhook_timeout_ms: u64,
    pub webhook_max_retries: i32,

    pub mock_success_rate: f64,
    pub mock_average_latency_ms: u64,
    pub mock_enable_chaos: bool,
    pub mock_chaos_rate: f64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, String> {
    var_or(name, default)
        .parse()
        .map_err(|_| format!("{} must be a valid {}", name, std::any::type_name::<T>()))
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let queue_type = var_or("QUEUE_TYPE", "inmemory");
        if !matches!(queue_type.as_str(), "inmemory" | "nats") {
            return Err(format!(
                "Invalid QUEUE_TYPE: {}. Must be 'inmemory' or 'nats'",
                queue_type
            ));
        }

        let enable_stripe: bool = parse_var("ENABLE_STRIPE", "false")?;
        let enable_razorpay: bool = parse_var("ENABLE_RAZORPAY", "false")?;
        let enable_mock: bool = parse_var("ENABLE_MOCK", "true")?;

        if !enable_stripe && !enable_razorpay && !enable_mock {
            return Err("At least one gateway must be enabled".to_string());
        }

        let stripe_secret_key = env::var("STRIPE_SECRET_KEY").ok();
        if enable_stripe && stripe_secret_key.is_none() {
            return Err("STRIPE_SECRET_KEY must be set when ENABLE_STRIPE=true".to_string());
        }

        let razorpay_key_id = env::var("RAZORPAY_KEY_ID").ok();
        let razorpay_key_secret = env::var("RAZORPAY_KEY_SECRET").ok();
        if enable_razorpay && (razorpay_key_id.is_none() || razorpay_key_secret.is_none()) {
            return Err(
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be set when ENABLE_RAZORPAY=true"
                    .to_string(),
            );
        }

        Ok(Config {
            database_url,
            queue_type,
            nats_url: var_or("NATS_URL", "nats://localhost:4222"),
            host: var_or("HOST", "0.0.0.0"),
            port: parse_var("PORT", "8080")?,

            enable_stripe,
            enable_razorpay,
            enable_mock,

            stripe_secret_key,
            razorpay_key_id,
            razorpay_key_secret,

            rate_limit_max: parse_var("RATE_LIMIT_MAX", "100")?,
            rate_limit_window_ms: parse_var("RATE_LIMIT_WINDOW_MS", "60000")?,

            webhook_timeout_ms: parse_var("WEBHOOK_TIMEOUT_MS", "30000")?,
            webhook_max_retries: parse_var("WEBHOOK_MAX_RETRIES", "10")?,

            mock_success_rate: parse_var("MOCK_GATEWAY_SUCCESS_RATE", "1.0")?,
            mock_average_latency_ms: parse_var("MOCK_GATEWAY_AVERAGE_LATENCY_MS", "50")?,
            mock_enable_chaos: parse_var("MOCK_GATEWAY_ENABLE_CHAOS", "false")?,
            mock_chaos_rate: parse_var("MOCK_GATEWAY_CHAOS_RATE", "0.0")?,
        })
    }
}
