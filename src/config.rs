//! Command-line and environment configuration.
//!
//! Every option can come from an environment variable; a matching flag
//! overrides it. The binary loads `.env` before parsing.

use clap::Parser;

use crate::bridge::decode::InvalidUtf8Policy;
use crate::error::BridgeError;

pub const DEFAULT_NATS_URL: &str = "nats://nats:4222";
pub const DEFAULT_SUBJECT: &str = "metrics.system.snapshot";
pub const DEFAULT_DURABLE: &str = "nifi-consumer";
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Parser, Debug, Clone)]
#[command(name = "nats-to-stdout")]
#[command(version, about = "Print NATS JetStream messages to stdout, one line per message", long_about = None)]
pub struct Cli {
    /// Broker URL
    #[arg(long, env = "NATS_URL", default_value = DEFAULT_NATS_URL)]
    pub nats_url: String,

    /// Subject to consume
    #[arg(long, env = "SUBJECT", default_value = DEFAULT_SUBJECT)]
    pub subject: String,

    /// Messages to forward before exiting (0 = run until interrupted)
    #[arg(long, env = "BATCH_SIZE", default_value_t = 1)]
    pub batch_size: u64,

    /// Durable consumer name
    #[arg(long, env = "DURABLE_NAME", default_value = DEFAULT_DURABLE)]
    pub durable: String,

    /// Stream holding the subject (looked up by subject when omitted)
    #[arg(long, env = "NATS_STREAM")]
    pub stream: Option<String>,

    /// Create the stream if it does not exist yet
    #[arg(long, requires = "stream")]
    pub create_stream: bool,

    /// Capacity of the queue between the subscription and stdout
    #[arg(long, env = "QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    /// What to do with payloads that are not valid UTF-8
    #[arg(long, env = "ON_INVALID_UTF8", value_enum, default_value_t = InvalidUtf8Policy::Fail)]
    pub on_invalid_utf8: InvalidUtf8Policy,
}

/// When the runner stops on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchLimit {
    Unbounded,
    Count(u64),
}

impl BatchLimit {
    /// A batch size of zero means no limit.
    pub fn from_batch_size(batch_size: u64) -> Self {
        match batch_size {
            0 => BatchLimit::Unbounded,
            n => BatchLimit::Count(n),
        }
    }

    pub fn is_reached(&self, forwarded: u64) -> bool {
        match self {
            BatchLimit::Unbounded => false,
            BatchLimit::Count(n) => forwarded >= *n,
        }
    }
}

/// Validated bridge configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BridgeConfig {
    pub nats_url: String,
    pub subject: String,
    pub limit: BatchLimit,
    pub durable: String,
    pub stream: Option<String>,
    pub create_stream: bool,
    pub queue_capacity: usize,
    pub on_invalid_utf8: InvalidUtf8Policy,
}

impl BridgeConfig {
    pub fn from_cli(cli: Cli) -> Result<Self, BridgeError> {
        if cli.nats_url.trim().is_empty() {
            return Err(BridgeError::Config("NATS URL must not be empty".to_string()));
        }

        validate_subject(&cli.subject)?;
        validate_durable(&cli.durable)?;

        if cli.queue_capacity == 0 {
            return Err(BridgeError::Config("Queue capacity must be at least 1".to_string()));
        }

        let stream = match cli.stream {
            Some(name) if name.trim().is_empty() => None,
            other => other,
        };

        if cli.create_stream && stream.is_none() {
            return Err(BridgeError::Config(
                "--create-stream needs a stream name".to_string(),
            ));
        }

        Ok(Self {
            nats_url: cli.nats_url,
            subject: cli.subject,
            limit: BatchLimit::from_batch_size(cli.batch_size),
            durable: cli.durable,
            stream,
            create_stream: cli.create_stream,
            queue_capacity: cli.queue_capacity,
            on_invalid_utf8: cli.on_invalid_utf8,
        })
    }
}

fn validate_subject(subject: &str) -> Result<(), BridgeError> {
    if subject.is_empty() {
        return Err(BridgeError::Config("Subject must not be empty".to_string()));
    }
    if subject.chars().any(char::is_whitespace) {
        return Err(BridgeError::Config(format!(
            "Subject '{}' must not contain whitespace",
            subject
        )));
    }
    if subject.split('.').any(str::is_empty) {
        return Err(BridgeError::Config(format!(
            "Subject '{}' has an empty token",
            subject
        )));
    }
    Ok(())
}

// Durable names end up in JetStream API subjects, so wildcards and dots are out.
fn validate_durable(durable: &str) -> Result<(), BridgeError> {
    if durable.is_empty() {
        return Err(BridgeError::Config("Durable name must not be empty".to_string()));
    }
    if durable
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '.' | '*' | '>' | '/' | '\\'))
    {
        return Err(BridgeError::Config(format!(
            "Durable name '{}' contains a forbidden character",
            durable
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["nats-to-stdout"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).expect("arguments should parse")
    }

    fn full_args() -> Vec<&'static str> {
        vec![
            "--nats-url", "nats://localhost:4222",
            "--subject", "test.subject",
            "--batch-size", "2",
            "--durable", "nifi-consumer",
            "--queue-capacity", "8",
            "--on-invalid-utf8", "fail",
        ]
    }

    #[test]
    fn test_flags_build_config() {
        let config = BridgeConfig::from_cli(parse(&full_args())).unwrap();

        assert_eq!(config.nats_url, "nats://localhost:4222");
        assert_eq!(config.subject, "test.subject");
        assert_eq!(config.limit, BatchLimit::Count(2));
        assert_eq!(config.durable, "nifi-consumer");
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.on_invalid_utf8, InvalidUtf8Policy::Fail);
        assert!(!config.create_stream);
    }

    #[test]
    fn test_zero_batch_size_is_unbounded() {
        let mut args = full_args();
        args[5] = "0";
        let config = BridgeConfig::from_cli(parse(&args)).unwrap();
        assert_eq!(config.limit, BatchLimit::Unbounded);
    }

    #[test]
    fn test_negative_batch_size_rejected() {
        let result = Cli::try_parse_from(["nats-to-stdout", "--batch-size", "-1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_lossy_policy_parses() {
        let mut args = full_args();
        args[11] = "lossy";
        let config = BridgeConfig::from_cli(parse(&args)).unwrap();
        assert_eq!(config.on_invalid_utf8, InvalidUtf8Policy::Lossy);
    }

    #[test]
    fn test_create_stream_requires_stream_flag() {
        let result = Cli::try_parse_from(["nats-to-stdout", "--create-stream"]);
        assert!(result.is_err());

        let mut args = full_args();
        args.extend(["--stream", "METRICS", "--create-stream"]);
        let config = BridgeConfig::from_cli(parse(&args)).unwrap();
        assert_eq!(config.stream.as_deref(), Some("METRICS"));
        assert!(config.create_stream);
    }

    #[test]
    fn test_blank_stream_treated_as_absent() {
        let mut args = full_args();
        args.extend(["--stream", " "]);
        let config = BridgeConfig::from_cli(parse(&args)).unwrap();
        assert_eq!(config.stream, None);
    }

    #[test]
    fn test_invalid_subject_rejected() {
        for subject in ["metrics..snapshot", "metrics system", ".metrics"] {
            let mut args = full_args();
            args[3] = subject;
            let err = BridgeConfig::from_cli(parse(&args)).unwrap_err();
            assert!(matches!(err, BridgeError::Config(_)), "subject {:?}", subject);
        }
    }

    #[test]
    fn test_wildcard_subject_allowed() {
        let mut args = full_args();
        args[3] = "metrics.system.*";
        assert!(BridgeConfig::from_cli(parse(&args)).is_ok());
    }

    #[test]
    fn test_invalid_durable_rejected() {
        let mut args = full_args();
        args[7] = "nifi.consumer";
        assert!(BridgeConfig::from_cli(parse(&args)).is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let mut args = full_args();
        args[9] = "0";
        assert!(BridgeConfig::from_cli(parse(&args)).is_err());
    }

    // Single test so nothing else in this module observes the env changes.
    #[test]
    fn test_env_fallbacks_and_defaults() {
        const VARS: [&str; 7] = [
            "NATS_URL",
            "SUBJECT",
            "BATCH_SIZE",
            "DURABLE_NAME",
            "NATS_STREAM",
            "QUEUE_CAPACITY",
            "ON_INVALID_UTF8",
        ];
        for var in VARS {
            std::env::remove_var(var);
        }

        let config = BridgeConfig::from_cli(parse(&[])).unwrap();
        assert_eq!(config.nats_url, "nats://nats:4222");
        assert_eq!(config.subject, "metrics.system.snapshot");
        assert_eq!(config.limit, BatchLimit::Count(1));
        assert_eq!(config.durable, "nifi-consumer");
        assert_eq!(config.stream, None);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.on_invalid_utf8, InvalidUtf8Policy::Fail);

        std::env::set_var("NATS_URL", "nats://broker:4222");
        std::env::set_var("SUBJECT", "test.subject");
        std::env::set_var("BATCH_SIZE", "2");

        let from_env = BridgeConfig::from_cli(parse(&[])).unwrap();
        assert_eq!(from_env.nats_url, "nats://broker:4222");
        assert_eq!(from_env.subject, "test.subject");
        assert_eq!(from_env.limit, BatchLimit::Count(2));

        let overridden = BridgeConfig::from_cli(parse(&[
            "--batch-size",
            "5",
            "--subject",
            "other.subject",
        ]))
        .unwrap();
        assert_eq!(overridden.nats_url, "nats://broker:4222");
        assert_eq!(overridden.subject, "other.subject");
        assert_eq!(overridden.limit, BatchLimit::Count(5));

        std::env::set_var("BATCH_SIZE", "0");
        let unbounded = BridgeConfig::from_cli(parse(&[])).unwrap();
        assert_eq!(unbounded.limit, BatchLimit::Unbounded);

        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_batch_limit_reached() {
        assert!(!BatchLimit::Unbounded.is_reached(u64::MAX));
        assert!(!BatchLimit::Count(2).is_reached(1));
        assert!(BatchLimit::Count(2).is_reached(2));
    }
}
