//! Stripe adapter for the payment processor port.
//!
//! Talks to the Stripe card/source API with form-encoded requests. Responses
//! carrying a Stripe error message become `RemoteRejected`; everything else
//! that goes wrong on the wire (timeouts, 5xx, rate limits, bodies that do
//! not decode) becomes `RemoteUnavailable`.

use crate::config::WalletConfig;
use crate::domain::charge::{ChargeReceipt, ChargeRequest, Currency, PaymentSource};
use crate::domain::payment_method::{CardDetails, PaymentMethodRef, RawCard, Token};
use crate::domain::ports::{
    CredentialsBox, CustomerUpdate, NewCustomer, PaymentProcessor, RemoteCustomer,
};
use crate::domain::subscription::{RemoteSubscription, SubscriptionRequest, TrialEnd};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorDetails,
}

#[derive(Debug, Deserialize)]
struct ErrorDetails {
    message: Option<String>,
    code: Option<String>,
    decline_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CardResponse {
    id: String,
    brand: String,
    last4: String,
    exp_month: u32,
    exp_year: u32,
}

impl From<CardResponse> for CardDetails {
    fn from(card: CardResponse) -> Self {
        Self {
            id: PaymentMethodRef::new(card.id),
            brand: card.brand,
            last4: card.last4,
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    data: Vec<T>,
}

/// An entry of a customer's source list. Only cards are kept; bank
/// accounts and other source kinds are skipped.
#[derive(Debug, Deserialize)]
#[serde(tag = "object", rename_all = "snake_case")]
enum SourceResponse {
    Card(CardResponse),
    #[serde(other)]
    Other,
}

fn cards(list: ListResponse<SourceResponse>) -> Vec<CardDetails> {
    list.data
        .into_iter()
        .filter_map(|source| match source {
            SourceResponse::Card(card) => Some(card.into()),
            SourceResponse::Other => None,
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct CustomerResponse {
    id: String,
    email: Option<String>,
    default_source: Option<String>,
    sources: Option<ListResponse<SourceResponse>>,
}

impl From<CustomerResponse> for RemoteCustomer {
    fn from(customer: CustomerResponse) -> Self {
        Self {
            id: customer.id,
            email: customer.email,
            default_source: customer.default_source.map(PaymentMethodRef::new),
            sources: customer.sources.map(cards).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChargeResponse {
    id: String,
    amount: u64,
    currency: String,
    status: String,
    source: Option<IdResponse>,
}

#[derive(Debug, Deserialize)]
struct SubscriptionResponse {
    id: String,
    status: String,
}

/// Stripe client implementing [`PaymentProcessor`].
pub struct StripeProcessor {
    http: reqwest::Client,
    base_url: String,
    credentials: CredentialsBox,
}

impl StripeProcessor {
    pub fn new(credentials: CredentialsBox, config: &WalletConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| PaymentError::RemoteUnavailable(format!("HTTP client setup: {e}")))?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            credentials,
        })
    }

    /// Points the client at another API root, e.g. a local mock server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: &[(String, String)],
        context: &str,
    ) -> Result<T> {
        let key = self.credentials.secret_key()?;
        let url = format!("{}{}", self.base_url, path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(AUTHORIZATION, format!("Bearer {key}"));
        if !form.is_empty() {
            request = if method == Method::GET || method == Method::DELETE {
                request.query(form)
            } else {
                request.form(form)
            };
        }

        let response = request.send().await.map_err(|e| {
            warn!(context, error = %e, "stripe request failed");
            PaymentError::RemoteUnavailable(format!("{context}: {e}"))
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::RemoteUnavailable(format!("{context}: {e}")))?;

        if status.is_success() {
            debug!(context, %status, "stripe request succeeded");
            return serde_json::from_str(&body).map_err(|e| {
                PaymentError::RemoteUnavailable(format!("{context}: malformed response: {e}"))
            });
        }
        Err(error_from_response(status, &body, context))
    }
}

fn error_from_response(status: StatusCode, body: &str, context: &str) -> PaymentError {
    let details = serde_json::from_str::<ErrorEnvelope>(body).ok().map(|e| e.error);
    warn!(
        context,
        %status,
        stripe_error_code = ?details.as_ref().and_then(|d| d.code.as_deref()),
        stripe_decline_code = ?details.as_ref().and_then(|d| d.decline_code.as_deref()),
        "stripe api request rejected"
    );

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return PaymentError::RemoteUnavailable(format!("{context}: status {status}"));
    }
    match details.and_then(|d| d.message) {
        Some(message) => PaymentError::RemoteRejected { message },
        None => PaymentError::RemoteUnavailable(format!(
            "{context}: status {status} without error message"
        )),
    }
}

type Form = Vec<(String, String)>;

fn field(name: &str, value: impl ToString) -> (String, String) {
    (name.to_string(), value.to_string())
}

fn token_form(card: &RawCard) -> Form {
    vec![
        field("card[number]", &card.number),
        field("card[exp_month]", &card.exp_month),
        field("card[exp_year]", &card.exp_year),
        field("card[cvc]", &card.cvc),
    ]
}

fn new_customer_form(request: NewCustomer) -> Form {
    let mut form = vec![field("email", &request.email), field("expand[]", "sources")];
    if let Some(token) = request.source {
        form.push(field("source", token.into_inner()));
    }
    form
}

fn customer_update_form(update: CustomerUpdate) -> Form {
    vec![
        field("default_source", update.default_source),
        field("expand[]", "sources"),
    ]
}

/// An explicit card is sent as `source`, so the customer's default is never
/// consulted; without one only `customer` is sent.
fn charge_form(request: ChargeRequest) -> Form {
    let mut form = vec![
        field("amount", request.amount.value()),
        field("currency", &request.currency),
    ];
    match request.source {
        PaymentSource::Method { method, customer } => {
            form.push(field("source", method));
            if let Some(customer) = customer {
                form.push(field("customer", customer));
            }
        }
        PaymentSource::CustomerDefault { customer } => form.push(field("customer", customer)),
    }
    if let Some(description) = request.description {
        form.push(field("description", description));
    }
    form
}

fn subscription_form(customer_id: &str, request: &SubscriptionRequest) -> Form {
    let mut form = vec![
        field("customer", customer_id),
        field("items[0][plan]", &request.plan),
        field("items[0][quantity]", request.quantity),
    ];
    match request.trial_end {
        Some(TrialEnd::Now) => form.push(field("trial_end", "now")),
        Some(TrialEnd::At(at)) => form.push(field("trial_end", at.timestamp())),
        None => {}
    }
    form
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn create_token(&self, card: &RawCard) -> Result<Token> {
        let form = token_form(card);
        let token: IdResponse = self
            .send(Method::POST, "/tokens", &form, "create token")
            .await?;
        Ok(Token::new(token.id))
    }

    async fn create_customer(&self, request: NewCustomer) -> Result<RemoteCustomer> {
        let form = new_customer_form(request);
        let customer: CustomerResponse = self
            .send(Method::POST, "/customers", &form, "create customer")
            .await?;
        Ok(customer.into())
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<RemoteCustomer> {
        let form = [field("expand[]", "sources")];
        let customer: CustomerResponse = self
            .send(
                Method::GET,
                &format!("/customers/{customer_id}"),
                &form,
                "fetch customer",
            )
            .await?;
        Ok(customer.into())
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<RemoteCustomer> {
        let form = customer_update_form(update);
        let customer: CustomerResponse = self
            .send(
                Method::POST,
                &format!("/customers/{customer_id}"),
                &form,
                "update customer",
            )
            .await?;
        Ok(customer.into())
    }

    async fn create_payment_method(&self, customer_id: &str, token: Token) -> Result<CardDetails> {
        let form = [field("source", token.into_inner())];
        let card: CardResponse = self
            .send(
                Method::POST,
                &format!("/customers/{customer_id}/sources"),
                &form,
                "create card",
            )
            .await?;
        Ok(card.into())
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<CardDetails>> {
        let form = [field("object", "card"), field("limit", 100)];
        let list: ListResponse<SourceResponse> = self
            .send(
                Method::GET,
                &format!("/customers/{customer_id}/sources"),
                &form,
                "list cards",
            )
            .await?;
        Ok(cards(list))
    }

    async fn delete_payment_method(
        &self,
        customer_id: &str,
        method: &PaymentMethodRef,
    ) -> Result<PaymentMethodRef> {
        let deleted: IdResponse = self
            .send(
                Method::DELETE,
                &format!("/customers/{customer_id}/sources/{method}"),
                &[],
                "delete card",
            )
            .await?;
        Ok(PaymentMethodRef::new(deleted.id))
    }

    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeReceipt> {
        let form = charge_form(request);
        let charge: ChargeResponse = self
            .send(Method::POST, "/charges", &form, "create charge")
            .await?;
        Ok(ChargeReceipt {
            id: charge.id,
            amount: charge.amount,
            currency: Currency::new(charge.currency),
            method: charge.source.map(|s| PaymentMethodRef::new(s.id)),
            status: charge.status,
        })
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        request: SubscriptionRequest,
    ) -> Result<RemoteSubscription> {
        let form = subscription_form(customer_id, &request);
        let subscription: SubscriptionResponse = self
            .send(Method::POST, "/subscriptions", &form, "create subscription")
            .await?;
        Ok(RemoteSubscription {
            id: subscription.id,
            status: subscription.status,
        })
    }
}
