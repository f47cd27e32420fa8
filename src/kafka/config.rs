use book_config::KafkaConfig;
use rdkafka::config::ClientConfig;
use tracing::info;

/// SASL mechanism used when credentials come without one (Confluent Cloud API keys)
const DEFAULT_SASL_MECHANISM: &str = "PLAIN";

/// `security.protocol` for a given TLS and credentials combination
fn security_protocol(ssl_enabled: bool, with_credentials: bool) -> &'static str {
    match (ssl_enabled, with_credentials) {
        (false, false) => "plaintext",
        (true, false) => "ssl",
        (false, true) => "sasl_plaintext",
        (true, true) => "sasl_ssl",
    }
}

/// Base client settings for book producers and consumers.
///
/// Credentials switch SASL on; a missing mechanism falls back to PLAIN.
pub fn create_client_config(config: &KafkaConfig) -> ClientConfig {
    let with_credentials = config.has_credentials();
    let protocol = security_protocol(config.ssl_enabled, with_credentials);

    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.brokers)
        .set("client.id", &config.client_id)
        .set("security.protocol", protocol);

    if let (true, Some(username), Some(password)) =
        (with_credentials, &config.sasl_username, &config.sasl_password)
    {
        let mechanism = config
            .sasl_mechanism
            .as_deref()
            .unwrap_or(DEFAULT_SASL_MECHANISM);
        client_config
            .set("sasl.mechanism", mechanism)
            .set("sasl.username", username)
            .set("sasl.password", password);
    }

    info!(
        brokers = %config.brokers,
        security_protocol = protocol,
        "Kafka client configured"
    );
    client_config
}
