use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    AddCard,
    AddDefaultCard,
    RemoveCard,
    SetDefault,
    Charge,
    Subscribe,
}

/// One row of a batch of wallet operations.
///
/// Which optional columns matter depends on `op`: `token` for the add
/// operations, `card` for removal and promotion, `amount` for charges and
/// `plan` for subscriptions.
#[derive(Debug, Deserialize, PartialEq, Eq, Clone)]
pub struct Operation {
    pub op: OperationType,
    pub customer: u32,
    pub email: Option<String>,
    pub token: Option<String>,
    pub card: Option<String>,
    pub amount: Option<u64>,
    pub plan: Option<String>,
    pub trial_days: Option<u32>,
}
