//! An in-process payment processor that behaves like a processor's test mode.
//!
//! `SandboxProcessor` keeps customers, cards and tokens in memory and applies
//! the same acceptance rules the live processor applies to its well-known
//! test tokens and card numbers, including its decline messages. It is used
//! by the CLI's default mode and throughout the test suite, and it counts
//! every remote call so callers can assert that nothing was sent.

use crate::domain::charge::{ChargeReceipt, ChargeRequest, PaymentSource};
use crate::domain::payment_method::{CardDetails, PaymentMethodRef, RawCard, Token};
use crate::domain::ports::{
    CredentialSource, CustomerUpdate, NewCustomer, PaymentProcessor, RemoteCustomer,
};
use crate::domain::subscription::{RemoteSubscription, SubscriptionRequest, TrialEnd};
use crate::error::{PaymentError, Result};
use crate::infrastructure::credentials::StaticCredentials;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const DECLINED: &str = "Your card was declined.";
const EXPIRED: &str = "Your card has expired.";
const INCORRECT_CVC: &str = "Your card's security code is incorrect.";
const INSUFFICIENT_FUNDS: &str = "Your card has insufficient funds.";
const NO_PAYMENT_SOURCE: &str =
    "This customer has no attached payment source or default payment method.";

/// The processor operations, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SandboxOp {
    CreateToken,
    CreateCustomer,
    FetchCustomer,
    UpdateCustomer,
    CreatePaymentMethod,
    ListPaymentMethods,
    DeletePaymentMethod,
    CreateCharge,
    CreateSubscription,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Approve,
    DeclineOnAttach(&'static str),
    DeclineOnCharge(&'static str),
}

#[derive(Debug, Clone)]
struct CardSpec {
    brand: String,
    last4: String,
    exp_month: u32,
    exp_year: u32,
    outcome: Outcome,
}

/// Reusable test tokens: name, brand, last four and behaviour.
const TEST_TOKENS: &[(&str, &str, &str, Outcome)] = &[
    ("tok_visa", "Visa", "4242", Outcome::Approve),
    ("tok_visa_debit", "Visa", "5556", Outcome::Approve),
    ("tok_mastercard", "MasterCard", "4444", Outcome::Approve),
    ("tok_amex", "American Express", "8431", Outcome::Approve),
    ("tok_discover", "Discover", "1117", Outcome::Approve),
    ("tok_ie", "Visa", "0005", Outcome::Approve),
    ("tok_mx", "Visa", "8001", Outcome::Approve),
    ("tok_br", "Visa", "0002", Outcome::Approve),
    ("tok_ca", "Visa", "0000", Outcome::Approve),
    ("tok_chargeDeclined", "Visa", "0002", Outcome::DeclineOnAttach(DECLINED)),
    ("tok_chargeDeclinedExpiredCard", "Visa", "0069", Outcome::DeclineOnAttach(EXPIRED)),
    ("tok_chargeDeclinedIncorrectCvc", "Visa", "0127", Outcome::DeclineOnAttach(INCORRECT_CVC)),
    (
        "tok_chargeDeclinedInsufficientFunds",
        "Visa",
        "9995",
        Outcome::DeclineOnCharge(INSUFFICIENT_FUNDS),
    ),
];

/// Card numbers with a scripted outcome when tokenized from raw fields.
const TEST_NUMBERS: &[(&str, Outcome)] = &[
    ("4000000000000002", Outcome::DeclineOnAttach(DECLINED)),
    ("4000000000000069", Outcome::DeclineOnAttach(EXPIRED)),
    ("4000000000000127", Outcome::DeclineOnAttach(INCORRECT_CVC)),
    ("4000000000009995", Outcome::DeclineOnCharge(INSUFFICIENT_FUNDS)),
];

#[derive(Debug, Clone)]
struct StoredCard {
    details: CardDetails,
    outcome: Outcome,
}

#[derive(Debug, Clone)]
struct StoredCustomer {
    id: String,
    email: String,
    default_source: Option<PaymentMethodRef>,
    sources: Vec<StoredCard>,
}

impl StoredCustomer {
    fn view(&self) -> RemoteCustomer {
        RemoteCustomer {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            default_source: self.default_source.clone(),
            sources: self.sources.iter().map(|c| c.details.clone()).collect(),
        }
    }

    fn card(&self, id: &PaymentMethodRef) -> Option<&StoredCard> {
        self.sources.iter().find(|c| &c.details.id == id)
    }

    fn default_card(&self) -> Option<&StoredCard> {
        self.default_source.as_ref().and_then(|id| self.card(id))
    }
}

/// Object ids are random so they stay unique across runs that share a
/// persistent store.
fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

#[derive(Default)]
struct SandboxState {
    customers: HashMap<String, StoredCustomer>,
    minted: HashMap<String, CardSpec>,
    spent: HashSet<String>,
    failures: HashSet<SandboxOp>,
}

impl SandboxState {
    fn customer(&self, id: &str) -> Result<&StoredCustomer> {
        self.customers
            .get(id)
            .ok_or_else(|| PaymentError::rejected(format!("No such customer: '{id}'")))
    }

    fn customer_mut(&mut self, id: &str) -> Result<&mut StoredCustomer> {
        self.customers
            .get_mut(id)
            .ok_or_else(|| PaymentError::rejected(format!("No such customer: '{id}'")))
    }

    /// Consumes a token. Test tokens may be reused, minted ones only once.
    fn redeem(&mut self, token: Token) -> Result<CardSpec> {
        let token = token.into_inner();
        if let Some((_, brand, last4, outcome)) =
            TEST_TOKENS.iter().find(|(name, ..)| *name == token)
        {
            return Ok(CardSpec {
                brand: brand.to_string(),
                last4: last4.to_string(),
                exp_month: 12,
                exp_year: current_year() + 3,
                outcome: *outcome,
            });
        }
        if let Some(spec) = self.minted.remove(&token) {
            self.spent.insert(token);
            return Ok(spec);
        }
        if self.spent.contains(&token) {
            return Err(PaymentError::rejected(format!(
                "You cannot use a Stripe token more than once: {token}."
            )));
        }
        Err(PaymentError::rejected(format!("No such token: '{token}'")))
    }

    fn store_card(&mut self, spec: CardSpec) -> Result<StoredCard> {
        if let Outcome::DeclineOnAttach(message) = spec.outcome {
            return Err(PaymentError::rejected(message));
        }
        Ok(StoredCard {
            details: CardDetails {
                id: PaymentMethodRef::new(new_id("card")),
                brand: spec.brand,
                last4: spec.last4,
                exp_month: spec.exp_month,
                exp_year: spec.exp_year,
            },
            outcome: spec.outcome,
        })
    }
}

/// In-memory processor with deterministic outcomes; clones share state.
#[derive(Clone)]
pub struct SandboxProcessor {
    state: Arc<Mutex<SandboxState>>,
    calls: Arc<AtomicUsize>,
    credentials: Arc<dyn CredentialSource>,
}

impl Default for SandboxProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl SandboxProcessor {
    pub const TEST_KEY: &'static str = "sk_test_sandbox";

    pub fn new() -> Self {
        Self::with_credentials(StaticCredentials::new(Self::TEST_KEY))
    }

    /// Requests are authenticated with a test-mode key (`sk_test_...`) from `credentials`.
    pub fn with_credentials(credentials: impl CredentialSource + 'static) -> Self {
        Self {
            state: Arc::new(Mutex::new(SandboxState::default())),
            calls: Arc::new(AtomicUsize::new(0)),
            credentials: Arc::new(credentials),
        }
    }

    /// Number of requests received so far, including failed ones.
    pub fn remote_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn customer_count(&self) -> usize {
        self.state.lock().await.customers.len()
    }

    /// Makes the next call of `op` fail as if the processor were unreachable.
    pub async fn fail_next(&self, op: SandboxOp) {
        self.state.lock().await.failures.insert(op);
    }

    async fn begin(&self, op: SandboxOp) -> Result<MutexGuard<'_, SandboxState>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = self.credentials.secret_key()?;
        if !key.starts_with("sk_test_") {
            return Err(PaymentError::rejected(
                "Invalid API Key provided: the sandbox only accepts test keys",
            ));
        }
        let mut state = self.state.lock().await;
        if state.failures.remove(&op) {
            return Err(PaymentError::RemoteUnavailable(format!(
                "connection reset during {op:?}"
            )));
        }
        Ok(state)
    }
}

#[async_trait]
impl PaymentProcessor for SandboxProcessor {
    async fn create_token(&self, card: &RawCard) -> Result<Token> {
        let mut state = self.begin(SandboxOp::CreateToken).await?;
        let spec = validate_card(card)?;
        let id = new_id("tok");
        state.minted.insert(id.clone(), spec);
        Ok(Token::new(id))
    }

    async fn create_customer(&self, request: NewCustomer) -> Result<RemoteCustomer> {
        let mut state = self.begin(SandboxOp::CreateCustomer).await?;
        let card = match request.source {
            Some(token) => {
                let spec = state.redeem(token)?;
                Some(state.store_card(spec)?)
            }
            None => None,
        };
        let customer = StoredCustomer {
            id: new_id("cus"),
            email: request.email,
            default_source: card.as_ref().map(|c| c.details.id.clone()),
            sources: card.into_iter().collect(),
        };
        let view = customer.view();
        state.customers.insert(customer.id.clone(), customer);
        Ok(view)
    }

    async fn fetch_customer(&self, customer_id: &str) -> Result<RemoteCustomer> {
        let state = self.begin(SandboxOp::FetchCustomer).await?;
        Ok(state.customer(customer_id)?.view())
    }

    async fn update_customer(
        &self,
        customer_id: &str,
        update: CustomerUpdate,
    ) -> Result<RemoteCustomer> {
        let mut state = self.begin(SandboxOp::UpdateCustomer).await?;
        let customer = state.customer_mut(customer_id)?;
        if customer.card(&update.default_source).is_none() {
            return Err(PaymentError::rejected(format!(
                "No such source: {}",
                update.default_source
            )));
        }
        customer.default_source = Some(update.default_source);
        Ok(customer.view())
    }

    async fn create_payment_method(&self, customer_id: &str, token: Token) -> Result<CardDetails> {
        let mut state = self.begin(SandboxOp::CreatePaymentMethod).await?;
        state.customer(customer_id)?;
        let spec = state.redeem(token)?;
        let card = state.store_card(spec)?;
        let details = card.details.clone();

        let customer = state.customer_mut(customer_id)?;
        if customer.default_source.is_none() {
            customer.default_source = Some(details.id.clone());
        }
        customer.sources.push(card);
        Ok(details)
    }

    async fn list_payment_methods(&self, customer_id: &str) -> Result<Vec<CardDetails>> {
        let state = self.begin(SandboxOp::ListPaymentMethods).await?;
        Ok(state.customer(customer_id)?.view().sources)
    }

    async fn delete_payment_method(
        &self,
        customer_id: &str,
        method: &PaymentMethodRef,
    ) -> Result<PaymentMethodRef> {
        let mut state = self.begin(SandboxOp::DeletePaymentMethod).await?;
        let customer = state.customer_mut(customer_id)?;
        let Some(position) = customer
            .sources
            .iter()
            .position(|c| &c.details.id == method)
        else {
            return Err(PaymentError::rejected(format!("No such source: {method}")));
        };
        customer.sources.remove(position);

        // The most recently added remaining card inherits the default.
        if customer.default_source.as_ref() == Some(method) {
            customer.default_source = customer.sources.last().map(|c| c.details.id.clone());
        }
        Ok(method.clone())
    }

    async fn create_charge(&self, request: ChargeRequest) -> Result<ChargeReceipt> {
        let mut state = self.begin(SandboxOp::CreateCharge).await?;
        let card = match &request.source {
            PaymentSource::Method {
                method,
                customer: Some(customer_id),
            } => state.customer(customer_id)?.card(method).cloned().ok_or_else(|| {
                PaymentError::rejected(format!(
                    "Customer {customer_id} does not have a linked source with ID {method}."
                ))
            })?,
            PaymentSource::Method {
                method,
                customer: None,
            } => {
                return Err(PaymentError::rejected(format!(
                    "No such token: '{method}'"
                )));
            }
            PaymentSource::CustomerDefault { customer } => state
                .customer(customer)?
                .default_card()
                .cloned()
                .ok_or_else(|| {
                    PaymentError::rejected("Cannot charge a customer that has no active card")
                })?,
        };
        if let Outcome::DeclineOnCharge(message) = card.outcome {
            return Err(PaymentError::rejected(message));
        }

        Ok(ChargeReceipt {
            id: new_id("ch"),
            amount: request.amount.value(),
            currency: request.currency,
            method: Some(card.details.id),
            status: "succeeded".to_string(),
        })
    }

    async fn create_subscription(
        &self,
        customer_id: &str,
        request: SubscriptionRequest,
    ) -> Result<RemoteSubscription> {
        let mut state = self.begin(SandboxOp::CreateSubscription).await?;
        let customer = state.customer(customer_id)?;
        let trialing = matches!(request.trial_end, Some(TrialEnd::At(end)) if end > Utc::now());

        if !trialing {
            // The first invoice is paid immediately from the default card.
            let card = customer
                .default_card()
                .ok_or_else(|| PaymentError::rejected(NO_PAYMENT_SOURCE))?;
            if let Outcome::DeclineOnCharge(message) = card.outcome {
                return Err(PaymentError::rejected(message));
            }
        }

        Ok(RemoteSubscription {
            id: new_id("sub"),
            status: if trialing { "trialing" } else { "active" }.to_string(),
        })
    }
}

fn current_year() -> u32 {
    u32::try_from(Utc::now().year()).unwrap_or(u32::MAX)
}

fn validate_card(card: &RawCard) -> Result<CardSpec> {
    let number: String = card.number.chars().filter(|c| !c.is_whitespace()).collect();
    if !(12..=19).contains(&number.len())
        || !number.chars().all(|c| c.is_ascii_digit())
        || !luhn_valid(&number)
    {
        return Err(PaymentError::rejected("Your card number is incorrect."));
    }

    let exp_month = card
        .exp_month
        .trim()
        .parse::<u32>()
        .ok()
        .filter(|m| (1..=12).contains(m))
        .ok_or_else(|| PaymentError::rejected("Your card's expiration month is invalid."))?;

    let exp_year = card
        .exp_year
        .trim()
        .parse::<u32>()
        .map(|y| if y < 100 { y + 2000 } else { y })
        .ok()
        .filter(|y| *y >= current_year())
        .ok_or_else(|| PaymentError::rejected("Your card's expiration year is invalid."))?;

    let now = Utc::now();
    if exp_year == current_year() && exp_month < now.month() {
        return Err(PaymentError::rejected("Your card's expiration month is invalid."));
    }

    let cvc = card.cvc.trim();
    if !(3..=4).contains(&cvc.len()) || !cvc.chars().all(|c| c.is_ascii_digit()) {
        return Err(PaymentError::rejected("Your card's security code is invalid."));
    }

    let outcome = TEST_NUMBERS
        .iter()
        .find(|(test_number, _)| *test_number == number)
        .map(|(_, outcome)| *outcome)
        .unwrap_or(Outcome::Approve);

    Ok(CardSpec {
        brand: brand_of(&number).to_string(),
        last4: number[number.len() - 4..].to_string(),
        exp_month,
        exp_year,
        outcome,
    })
}

fn brand_of(number: &str) -> &'static str {
    let prefix2: u32 = number[..2].parse().unwrap_or(0);
    let prefix4: u32 = number[..4].parse().unwrap_or(0);
    match (prefix2, prefix4) {
        (40..=49, _) => "Visa",
        (51..=55, _) | (_, 2221..=2720) => "MasterCard",
        (34 | 37, _) => "American Express",
        (65, _) | (_, 6011) => "Discover",
        _ => "Unknown",
    }
}

fn luhn_valid(number: &str) -> bool {
    let sum: u32 = number
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 { doubled - 9 } else { doubled }
            } else {
                d
            }
        })
        .sum();
    sum % 10 == 0
}
