use crate::app::database_service::DatabaseService;
use crate::app::moderation::ModerationPipeline;
use crate::crypto::signing::UrlSigner;
use crate::crypto::token::TokenService;
use crate::domain::model::{ModerationAction, PaymentProvider, Plan, ProductStatus, TargetType};
use crate::domain::moderation::ModerationPolicy;
use crate::domain::Role;
use crate::infra::moderation::{ContentClassifier, DisabledClassifier, OpenAiModerationClient};
use crate::infra::payments::{BinancePayClient, PaymentGateways, StripeClient};
use crate::infra::storage::FileStorage;
use crate::infra::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;
use utoipa::{IntoParams, ToSchema};

#[derive(Clone)]
pub struct AppState {
    pub db_service: DatabaseService,
    pub config: Arc<Config>,
    pub tokens: Arc<TokenService>,
    pub storage: FileStorage,
    pub signer: Arc<UrlSigner>,
    pub payments: PaymentGateways,
    pub moderation: ModerationPipeline,
}

impl AppState {
    /// Wires provider clients from the configuration. Providers without
    /// credentials stay disabled.
    pub fn new(config: Config, db_service: DatabaseService) -> anyhow::Result<Self> {
        let stripe = match config.stripe.secret_key.as_deref() {
            Some(key) => {
                let client = StripeClient::new(key)?;
                Some(match config.stripe.api_base.as_deref() {
                    Some(base) => client.with_api_base(base),
                    None => client,
                })
            }
            None => None,
        };
        let binance = match config.binance.clone() {
            Some(cfg) => Some(BinancePayClient::new(cfg)?),
            None => None,
        };
        let classifier: Arc<dyn ContentClassifier> = match config.moderation.openai_api_key.as_deref() {
            Some(key) => Arc::new(OpenAiModerationClient::new(&config.moderation.openai_url, key)?),
            None => Arc::new(DisabledClassifier),
        };
        info!(
            stripe = stripe.is_some(),
            binance = binance.is_some(),
            classifier = classifier.name(),
            "providers configured"
        );

        let policy = ModerationPolicy {
            flag_threshold: config.moderation.flag_threshold,
            reject_threshold: config.moderation.reject_threshold,
        };
        Ok(Self {
            db_service,
            tokens: Arc::new(TokenService::new(&config.jwt_secret, config.jwt_ttl_secs)),
            storage: FileStorage::new(config.storage_dir.clone()),
            signer: Arc::new(UrlSigner::new(
                &config.storage_signing_secret,
                &config.public_base_url,
            )),
            payments: PaymentGateways { stripe, binance },
            moderation: ModerationPipeline::new(classifier, policy),
            config: Arc::new(config),
        })
    }

    pub fn pool(&self) -> &PgPool {
        self.db_service.pool()
    }
}

#[derive(Serialize, Debug, ToSchema)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn ok(data: JsonValue) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProductListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Case-insensitive match on title and description.
    pub q: Option<String>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateProductRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: i64,
    pub currency: String,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct UpdateProductRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<ProductStatus>,
    pub upload_id: Option<i64>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateOrderRequest {
    pub product_id: i64,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CheckoutRequest {
    pub provider: PaymentProvider,
}

#[derive(Serialize, Debug, ToSchema)]
pub struct CheckoutResponse {
    pub checkout_url: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct IssueLicenseRequest {
    pub user_id: i64,
    pub product_id: i64,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ValidateLicenseRequest {
    pub key: String,
    pub product_id: Option<i64>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct SubscriptionCheckoutRequest {
    pub plan: Plan,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct GrantSubscriptionRequest {
    pub user_id: i64,
    pub plan: Plan,
    pub days: i64,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateTopicRequest {
    pub title: String,
    pub body: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct CreateCommentRequest {
    pub body: String,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ModerationActionRequest {
    pub action: ModerationAction,
    pub reason: Option<String>,
}

#[derive(Deserialize, Debug, Default, ToSchema)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LogsQuery {
    pub target_type: Option<TargetType>,
    pub target_id: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, ToSchema)]
pub struct ChangeRoleRequest {
    pub role: Role,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UploadQuery {
    pub filename: String,
}

#[derive(Deserialize, Debug, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DownloadQuery {
    pub expires: i64,
    pub signature: String,
}
