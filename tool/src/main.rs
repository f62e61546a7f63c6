use anyhow::Context as _;
use clap::Parser;
use ingress_tls::{
    config_defs::DEFAULT_NAMESPACE,
    mutate,
    typings::{AdmissionReviewRequest, AdmissionReviewResponse},
    Configuration, Mutator, SecretRef,
};
use rocket::{figment::Figment, serde::json::Json};
use std::{net::IpAddr, path::PathBuf};
use tracing_subscriber::EnvFilter;

/// Launch Mutating Webhook.
#[derive(Parser, Debug)]
struct Args {
    /// TLS secret, of the format namespace/secret_name
    tls_secret: SecretRef,
    /// Hostname to apply secret
    host: String,
    /// Namespace of compute jobs
    #[clap(default_value = DEFAULT_NAMESPACE)]
    namespace: String,
    #[clap(long, default_value = "0.0.0.0")]
    address: IpAddr,
    #[clap(long, default_value = "5000")]
    port: u16,
    #[clap(long, default_value = "/ssl/cert.pem")]
    tls_cert: PathBuf,
    #[clap(long, default_value = "/ssl/key.pem")]
    tls_key: PathBuf,
    /// Serve plain HTTP (local testing only)
    #[clap(long)]
    insecure: bool,
    /// What to answer when a request cannot be reviewed
    #[clap(long, value_enum, default_value = "ignore")]
    failure_policy: FailurePolicy,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum FailurePolicy {
    /// Admit the object unchanged
    Ignore,
    /// Deny the admission
    Fail,
}

struct Webhook {
    mutator: Mutator,
    failure_policy: FailurePolicy,
}

impl Webhook {
    fn new(config: &Configuration, failure_policy: FailurePolicy) -> Self {
        Webhook {
            mutator: Mutator::new(config),
            failure_policy,
        }
    }

    fn handle(&self, review: AdmissionReviewRequest) -> anyhow::Result<AdmissionReviewResponse> {
        review.validate().context("invalid admission review")?;
        let request = &review.request;
        tracing::info!(
            uid = request.uid.as_str(),
            kind = request.kind.kind.as_str(),
            namespace = request.namespace(),
            tier = mutate::hardware_tier(&request.object).unwrap_or("<none>"),
            "Processing admission request"
        );
        let response = match review.review(&self.mutator) {
            Ok(response) => response,
            Err(err) => match self.failure_policy {
                FailurePolicy::Ignore => {
                    tracing::warn!(
                        uid = request.uid.as_str(),
                        "Review failed, admitting unchanged: {}",
                        err
                    );
                    review.allow_unchanged()
                }
                FailurePolicy::Fail => {
                    tracing::error!(uid = request.uid.as_str(), "Review failed, denying: {}", err);
                    review.reject(err.code(), &err.to_string())
                }
            },
        };
        if let Some(patch) = &response.response.patch {
            tracing::info!(
                uid = request.uid.as_str(),
                patch = patch.patch.as_str(),
                "Sending response"
            );
        }
        Ok(response)
    }
}

#[rocket::get("/healthz")]
fn health() -> &'static str {
    "OK"
}

struct AnyhowResponder(anyhow::Error);

impl From<anyhow::Error> for AnyhowResponder {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl<'r, 'o: 'r> rocket::response::Responder<'r, 'o> for AnyhowResponder {
    fn respond_to(self, _request: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        tracing::error!("{:#}", self.0);
        Err(rocket::http::Status::BadRequest)
    }
}

type Resp<T> = Result<Json<T>, AnyhowResponder>;

fn respond(
    review: Json<AdmissionReviewRequest>,
    state: &Webhook,
) -> Resp<AdmissionReviewResponse> {
    Ok(Json(state.handle(review.into_inner())?))
}

#[rocket::post("/", data = "<review>")]
async fn webhook(
    review: Json<AdmissionReviewRequest>,
    state: &rocket::State<Webhook>,
) -> Resp<AdmissionReviewResponse> {
    respond(review, state)
}

/// Same as `/`, for configurations that name the path explicitly.
#[rocket::post("/admission", data = "<review>")]
async fn admission(
    review: Json<AdmissionReviewRequest>,
    state: &rocket::State<Webhook>,
) -> Resp<AdmissionReviewResponse> {
    respond(review, state)
}

fn rocket(webhook: Webhook, figment: Figment) -> rocket::Rocket<rocket::Build> {
    rocket::custom(figment)
        .manage(webhook)
        .mount("/", rocket::routes![health, webhook, admission])
}

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = Configuration::new(&args.host, args.tls_secret.clone(), &args.namespace);
    tracing::info!(
        host = config.tls_host.as_str(),
        secret = %config.tls_secret,
        namespace = config.target_namespace.as_str(),
        failure_policy = ?args.failure_policy,
        "Applying webhook"
    );

    let mut figment = rocket::Config::figment()
        .merge(("address", args.address))
        .merge(("port", args.port))
        .merge(("log_level", "off"));
    if args.insecure {
        tracing::warn!("TLS disabled, serving plain HTTP");
    } else {
        for path in &[&args.tls_cert, &args.tls_key] {
            anyhow::ensure!(path.exists(), "{} does not exist", path.display());
        }
        figment = figment
            .merge(("tls.certs", &args.tls_cert))
            .merge(("tls.key", &args.tls_key));
    }

    rocket(Webhook::new(&config, args.failure_policy), figment)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("webhook server failed: {}", e))?;
    Ok(())
}
