//! LaterPay request signing CLI.
//!
//! Builds canonical messages, signs requests, and verifies signatures with a
//! merchant's shared secret. Results go to stdout, logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! LATERPAY_SHARED_SECRET=secret laterpay-sign sign --url https://endpoint.com/api --method GET foo=bar
//! laterpay-sign --secret secret signed-url --url http://example.net/here foo=bar
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `LATERPAY_SHARED_SECRET` | *(unset)* | Shared secret (overridden by `--secret`) |
//! | `LATERPAY_SIGNATURE_PARAM` | `hmac` | Signature query parameter name |
//! | `LATERPAY_ADD_TIMESTAMP` | `true` | Add `ts` to signed URLs |
//! | `LATERPAY_DEFAULT_METHOD` | `POST` | Method used when `--method` is omitted |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use laterpay_signing::url::split_url;
use laterpay_signing::{
    Method, QueryOptions, RawParams, Secret, SigningConfig, build_message, sign, sign_get_url,
    sign_get_url_at, signed_url, signed_url_at, verify, verify_signed_url,
};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "laterpay-sign")]
#[command(about = "Sign and verify LaterPay requests")]
#[command(version)]
struct Cli {
    /// Shared secret used as the HMAC key
    #[arg(long, global = true, env = "LATERPAY_SHARED_SECRET", hide_env_values = true)]
    secret: Option<String>,

    /// Log level filter (defaults to LOG_LEVEL or "info")
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the canonical message for a request
    Message(RequestArgs),

    /// Print the signature for a request
    Sign(RequestArgs),

    /// Check a signature; exits with status 1 if it does not match
    Verify {
        /// Signature to check (hex, any case)
        #[arg(long)]
        signature: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Print a signed URL built from the parameters (signed for GET unless --method is given)
    #[command(name = "signed-url")]
    SignedUrl {
        #[command(flatten)]
        request: RequestArgs,

        #[command(flatten)]
        query: QueryArgs,

        /// Do not add a `ts` timestamp parameter
        #[arg(long)]
        no_timestamp: bool,
    },

    /// Sign a URL that already carries its query string
    #[command(name = "sign-url")]
    SignUrl {
        /// URL with a query string
        #[arg(long)]
        url: String,

        #[command(flatten)]
        query: QueryArgs,
    },

    /// Verify a URL carrying its signature as a query parameter
    #[command(name = "verify-url")]
    VerifyUrl {
        /// Signed URL
        #[arg(long)]
        url: String,

        /// HTTP method the URL was signed for
        #[arg(long, default_value = "GET")]
        method: String,

        /// Signature query parameter name
        #[arg(long)]
        signature_param: Option<String>,
    },
}

/// The request being signed.
#[derive(Debug, Args)]
struct RequestArgs {
    /// Request URL; query and fragment are ignored
    #[arg(long)]
    url: String,

    /// HTTP method (defaults to LATERPAY_DEFAULT_METHOD or POST)
    #[arg(long)]
    method: Option<String>,

    /// Parameters as a JSON object or list of pairs
    #[arg(long, conflicts_with = "params")]
    json: Option<String>,

    /// Parameters as KEY=VALUE; repeat a key for multiple values
    #[arg(value_parser = parse_key_value)]
    params: Vec<(String, String)>,
}

/// Options for the signed URL commands.
#[derive(Debug, Args)]
struct QueryArgs {
    /// Signature query parameter name
    #[arg(long)]
    signature_param: Option<String>,

    /// Unix timestamp to use for `ts` instead of the current time
    #[arg(long)]
    timestamp: Option<i64>,
}

/// What a command prints and whether it succeeded.
#[derive(Debug, PartialEq, Eq)]
struct Output {
    text: String,
    success: bool,
}

impl Output {
    fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            success: true,
        }
    }
}

/// Parse a `KEY=VALUE` argument.
fn parse_key_value(arg: &str) -> Result<(String, String), String> {
    arg.split_once('=')
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{arg}`"))
}

impl RequestArgs {
    fn params(&self) -> Result<RawParams> {
        match &self.json {
            Some(json) => {
                let value: serde_json::Value =
                    serde_json::from_str(json).context("invalid --json parameters")?;
                Ok(RawParams::from_json(&value)?)
            }
            None => Ok(RawParams::multi_map(self.params.iter().cloned())),
        }
    }

    fn method<'a>(&'a self, config: &SigningConfig) -> &'a str {
        self.method
            .as_deref()
            .unwrap_or_else(|| config.default_method.as_str())
    }
}

impl QueryArgs {
    fn signature_param<'a>(&'a self, config: &'a SigningConfig) -> &'a str {
        self.signature_param
            .as_deref()
            .unwrap_or(&config.signature_param_name)
    }

    fn timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        self.timestamp
            .map(|ts| {
                DateTime::from_timestamp(ts, 0)
                    .with_context(|| format!("timestamp out of range: {ts}"))
            })
            .transpose()
    }
}

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the given log level.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Ok(())
}

/// Resolve the shared secret from the command line or the configuration.
fn resolve_secret(cli: &Cli, config: &SigningConfig) -> Result<Secret> {
    let secret = cli
        .secret
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(Secret::from)
        .or_else(|| config.shared_secret.clone());

    match secret {
        Some(secret) => Ok(secret),
        None => bail!("no shared secret: pass --secret or set LATERPAY_SHARED_SECRET"),
    }
}

/// Run one command.
fn execute(cli: &Cli, config: &SigningConfig) -> Result<Output> {
    match &cli.command {
        Commands::Message(request) => {
            let base_url = split_url(&request.url).base_url();
            let message = build_message(
                &request.params()?.normalize(),
                &base_url,
                request.method(config),
            )?;
            Ok(Output::ok(message))
        }
        Commands::Sign(request) => {
            let secret = resolve_secret(cli, config)?;
            let signature = sign(
                &secret,
                &request.params()?,
                &request.url,
                request.method(config),
            )?;
            debug!(url = %request.url, "signed request");
            Ok(Output::ok(signature))
        }
        Commands::Verify { signature, request } => {
            let secret = resolve_secret(cli, config)?;
            let valid = verify(
                signature,
                &secret,
                &request.params()?,
                &request.url,
                request.method(config),
            )?;
            Ok(Output {
                text: String::from(if valid { "valid" } else { "invalid" }),
                success: valid,
            })
        }
        Commands::SignedUrl {
            request,
            query,
            no_timestamp,
        } => {
            let secret = resolve_secret(cli, config)?;
            let method: Method = match request.method.as_deref() {
                Some(method) => method.parse().context("invalid --method")?,
                None => Method::Get,
            };
            let options = QueryOptions::builder()
                .method(method)
                .add_timestamp(config.add_timestamp && !no_timestamp)
                .signature_param_name(query.signature_param(config))
                .build();
            let params = request.params()?;

            let url = match query.timestamp()? {
                Some(now) => signed_url_at(&secret, &params, &request.url, &options, now),
                None => signed_url(&secret, &params, &request.url, &options),
            };
            Ok(Output::ok(url))
        }
        Commands::SignUrl { url, query } => {
            let secret = resolve_secret(cli, config)?;
            let name = query.signature_param(config);

            let signed = match query.timestamp()? {
                Some(now) => sign_get_url_at(&secret, url, name, now),
                None => sign_get_url(&secret, url, name),
            };
            match signed {
                Some(signed) => Ok(Output::ok(signed)),
                None => bail!("URL has no query string to sign: {url}"),
            }
        }
        Commands::VerifyUrl {
            url,
            method,
            signature_param,
        } => {
            let secret = resolve_secret(cli, config)?;
            let name = signature_param
                .as_deref()
                .unwrap_or(&config.signature_param_name);
            let valid = verify_signed_url(&secret, url, method, name)?;
            Ok(Output {
                text: String::from(if valid { "valid" } else { "invalid" }),
                success: valid,
            })
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = SigningConfig::from_env()?;

    init_tracing(cli.log_level.as_deref().unwrap_or(&config.log_level))?;

    info!(
        signature_param = %config.signature_param_name,
        default_method = %config.default_method,
        add_timestamp = config.add_timestamp,
        version = env!("CARGO_PKG_VERSION"),
        "starting laterpay-sign",
    );

    let output = execute(&cli, &config)?;
    println!("{}", output.text);

    Ok(if output.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
