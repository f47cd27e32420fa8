// ============================================================================
// Kafka Configuration
// ============================================================================

use crate::constants::*;

/// Kafka configuration shared by the admission producer and the book consumer
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated list of Kafka brokers (e.g., "kafka1:9092,kafka2:9092")
    pub brokers: String,
    /// Client identifier reported to the brokers
    pub client_id: String,
    /// Topic carrying admitted book envelopes
    pub topic: String,
    /// Consumer group ID for book consumers
    pub consumer_group: String,
    /// SSL/TLS enabled
    pub ssl_enabled: bool,
    /// SASL mechanism (e.g., "PLAIN", "SCRAM-SHA-256")
    pub sasl_mechanism: Option<String>,
    /// SASL username (API key on Confluent Cloud)
    pub sasl_username: Option<String>,
    /// SASL password (API secret on Confluent Cloud)
    pub sasl_password: Option<String>,
    /// Topic that receives malformed payloads before they are skipped
    pub dlq_topic: Option<String>,
    // producer-specific settings
    pub producer_acks: String, // "all" | "1" | "0"
    pub producer_linger_ms: u32,
    pub producer_enable_idempotence: bool,
}

impl KafkaConfig {
    pub(crate) fn from_env() -> Self {
        let sasl_username = std::env::var("KAFKA_SASL_USERNAME").ok().filter(|v| !v.is_empty());
        let sasl_password = std::env::var("KAFKA_SASL_PASSWORD").ok().filter(|v| !v.is_empty());
        let sasl_mechanism = std::env::var("KAFKA_SASL_MECHANISM").ok().filter(|v| !v.is_empty());

        Self {
            brokers: std::env::var("KAFKA_BROKERS")
                .unwrap_or_else(|_| DEFAULT_KAFKA_BROKERS.to_string()),
            client_id: std::env::var("KAFKA_CLIENT_ID")
                .unwrap_or_else(|_| DEFAULT_KAFKA_CLIENT_ID.to_string()),
            topic: std::env::var("KAFKA_TOPIC_BOOK_PENDING")
                .unwrap_or_else(|_| DEFAULT_KAFKA_TOPIC_BOOK_PENDING.to_string()),
            consumer_group: std::env::var("KAFKA_CONSUMER_GROUP_ID")
                .unwrap_or_else(|_| DEFAULT_KAFKA_CONSUMER_GROUP_ID.to_string()),
            ssl_enabled: std::env::var("KAFKA_SSL_ENABLED")
                .unwrap_or_else(|_| "false".to_string())
                .parse()
                .unwrap_or(false),
            sasl_mechanism,
            sasl_username,
            sasl_password,
            dlq_topic: std::env::var("KAFKA_DLQ_TOPIC").ok().filter(|v| !v.is_empty()),
            producer_acks: std::env::var("KAFKA_PRODUCER_ACKS")
                .unwrap_or_else(|_| "all".to_string()),
            producer_linger_ms: std::env::var("KAFKA_PRODUCER_LINGER_MS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            producer_enable_idempotence: std::env::var("KAFKA_PRODUCER_ENABLE_IDEMPOTENCE")
                .unwrap_or_else(|_| "true".to_string())
                .parse()
                .unwrap_or(true),
        }
    }

    /// Whether both SASL username and password are configured
    pub fn has_credentials(&self) -> bool {
        self.sasl_username.is_some() && self.sasl_password.is_some()
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: DEFAULT_KAFKA_BROKERS.to_string(),
            client_id: DEFAULT_KAFKA_CLIENT_ID.to_string(),
            topic: DEFAULT_KAFKA_TOPIC_BOOK_PENDING.to_string(),
            consumer_group: DEFAULT_KAFKA_CONSUMER_GROUP_ID.to_string(),
            ssl_enabled: false,
            sasl_mechanism: None,
            sasl_username: None,
            sasl_password: None,
            dlq_topic: None,
            producer_acks: "all".to_string(),
            producer_linger_ms: 10,
            producer_enable_idempotence: true,
        }
    }
}
