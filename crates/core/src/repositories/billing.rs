//! Billing: wound billing, payments, insurance claims, credit accounts,
//! service invoices.
//!
//! All amounts are integer minor units. Derived fields (`total_amount`,
//! `balance`, `available_credit`) are recomputed from their inputs on every
//! write; they are never adjusted in place.

use crate::db::now_rfc3339;
use crate::derived::{self, BillingCharges};
use crate::events::EventBus;
use crate::rbac::Role;
use crate::repositories::appointments::require_row;
use crate::repositories::notifications::{NotificationContent, NotificationService};
use crate::repositories::{enum_value, map_unique};
use crate::sequence::{self, SequenceKind};
use crate::{HmisError, HmisResult, Store};
use hmis_types::Money;
use rand::distributions::Alphanumeric;
use rand::Rng;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    MobileMoney,
    BankTransfer,
    Card,
    Insurance,
    Credit,
}

impl PaymentMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::MobileMoney => "mobile_money",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Card => "card",
            PaymentMethod::Insurance => "insurance",
            PaymentMethod::Credit => "credit",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(PaymentMethod::Cash),
            "mobile_money" => Some(PaymentMethod::MobileMoney),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "card" => Some(PaymentMethod::Card),
            "insurance" => Some(PaymentMethod::Insurance),
            "credit" => Some(PaymentMethod::Credit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Draft,
    Submitted,
    UnderReview,
    Approved,
    ApprovedPartial,
    Rejected,
    Paid,
}

impl ClaimStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ClaimStatus::Draft => "draft",
            ClaimStatus::Submitted => "submitted",
            ClaimStatus::UnderReview => "under_review",
            ClaimStatus::Approved => "approved",
            ClaimStatus::ApprovedPartial => "approved_partial",
            ClaimStatus::Rejected => "rejected",
            ClaimStatus::Paid => "paid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(ClaimStatus::Draft),
            "submitted" => Some(ClaimStatus::Submitted),
            "under_review" => Some(ClaimStatus::UnderReview),
            "approved" => Some(ClaimStatus::Approved),
            "approved_partial" => Some(ClaimStatus::ApprovedPartial),
            "rejected" => Some(ClaimStatus::Rejected),
            "paid" => Some(ClaimStatus::Paid),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WoundBilling {
    pub id: i64,
    pub wound_case_id: i64,
    pub assessment_fee: Money,
    pub treatment_fee: Money,
    pub dressing_supplies_cost: Money,
    pub medication_cost: Money,
    pub other_charges: Money,
    pub total_amount: Money,
    pub amount_paid: Money,
    pub balance: Money,
    pub payment_status: String,
    pub updated_at: String,
}

/// The five caller-settable charge components.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ChargesInput {
    #[serde(default)]
    pub assessment_fee: Money,
    #[serde(default)]
    pub treatment_fee: Money,
    #[serde(default)]
    pub dressing_supplies_cost: Money,
    #[serde(default)]
    pub medication_cost: Money,
    #[serde(default)]
    pub other_charges: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentTransaction {
    pub id: i64,
    pub wound_billing_id: i64,
    pub amount: Money,
    pub method: PaymentMethod,
    pub transaction_reference: String,
    pub receipt_number: String,
    pub mobile_money_phone: Option<String>,
    pub bank_name: Option<String>,
    pub card_last4: Option<String>,
    pub status: PaymentStatus,
    pub paid_at: String,
    pub recorded_by_profile_id: Option<i64>,
    pub notes: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentDetails {
    #[serde(default)]
    pub mobile_money_phone: Option<String>,
    #[serde(default)]
    pub bank_name: Option<String>,
    #[serde(default)]
    pub card_last4: Option<String>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsuranceClaim {
    pub id: i64,
    pub wound_billing_id: i64,
    pub insurance_provider_id: Option<i64>,
    pub claim_number: String,
    pub claim_amount: Money,
    pub approved_amount: Option<Money>,
    pub paid_amount: Option<Money>,
    pub status: ClaimStatus,
    pub submitted_at: Option<String>,
    pub notes: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingAccount {
    pub id: i64,
    pub patient_id: i64,
    pub credit_limit: Money,
    pub current_balance: Money,
    pub available_credit: Money,
    pub corporate_scheme_id: Option<i64>,
    pub is_active: bool,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub id: i64,
    pub account_id: i64,
    pub transaction_type: String,
    pub amount: Money,
    pub balance_before: Money,
    pub balance_after: Money,
    pub reference: String,
    pub notes: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporateScheme {
    pub id: i64,
    pub name: String,
    pub employer_name: String,
    pub coverage_percentage: f64,
    pub contact_person: String,
    pub phone: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillableService {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub department_id: i64,
    pub category: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub id: i64,
    pub invoice_id: i64,
    pub service_id: i64,
    pub quantity: i64,
    pub unit_price: Money,
    pub total_price: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub invoice_number: String,
    pub patient_id: i64,
    pub total_amount: Money,
    pub paid_amount: Money,
    pub insurance_amount: Money,
    pub status: String,
    pub created_at: String,
    pub items: Vec<InvoiceItem>,
}

impl Invoice {
    /// Derived at read time, never stored.
    pub fn balance(&self) -> Money {
        derived::invoice_balance(self.total_amount, self.paid_amount, self.insurance_amount)
    }
}

#[derive(Clone)]
pub struct BillingService {
    store: Store,
    notifications: NotificationService,
}

impl BillingService {
    pub fn new(store: Store, bus: EventBus) -> Self {
        let notifications = NotificationService::new(store.clone(), bus);
        Self { store, notifications }
    }

    /// Best-effort heads-up to the finance desk after a billing write. High
    /// priority when the payment clears the balance.
    fn notify_billing_update(&self, billing: &WoundBilling) {
        let cleared = billing.balance <= Money::ZERO && billing.amount_paid > Money::ZERO;
        let mut content = NotificationContent::new(
            "Billing updated",
            format!(
                "Case billing {} now stands at a balance of {}",
                billing.id, billing.balance
            ),
        );
        content.notification_type = "billing".into();
        content.priority = if cleared { "high" } else { "medium" }.into();
        content.related_wound_case_id = Some(billing.wound_case_id);
        self.notifications.notify_role(Role::Cashier, &content);
        self.notifications.notify_role(Role::Admin, &content);
    }

    // -- Wound billing ----------------------------------------------------

    pub fn billing_for_case(&self, wound_case_id: i64) -> HmisResult<WoundBilling> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {BILLING_COLUMNS} FROM wound_billing WHERE wound_case_id = ?1"),
                params![wound_case_id],
                billing_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("wound billing", wound_case_id))
    }

    pub fn billing(&self, id: i64) -> HmisResult<WoundBilling> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {BILLING_COLUMNS} FROM wound_billing WHERE id = ?1"),
                params![id],
                billing_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("wound billing", id))
    }

    /// Replace the five charge components. Totals are recomputed from the
    /// new charges and the amount already paid; negative charges are refused.
    pub fn update_charges(
        &self,
        wound_case_id: i64,
        charges: &ChargesInput,
    ) -> HmisResult<WoundBilling> {
        for (field, value) in [
            ("assessment_fee", charges.assessment_fee),
            ("treatment_fee", charges.treatment_fee),
            ("dressing_supplies_cost", charges.dressing_supplies_cost),
            ("medication_cost", charges.medication_cost),
            ("other_charges", charges.other_charges),
        ] {
            if value.is_negative() {
                return Err(HmisError::InvalidInput(format!("{field} cannot be negative")));
            }
        }
        let current = self.billing_for_case(wound_case_id)?;
        let totals = derived::billing_totals(&BillingCharges {
            assessment_fee: charges.assessment_fee,
            treatment_fee: charges.treatment_fee,
            dressing_supplies_cost: charges.dressing_supplies_cost,
            medication_cost: charges.medication_cost,
            other_charges: charges.other_charges,
            amount_paid: current.amount_paid,
        });
        self.store.conn().execute(
            "UPDATE wound_billing SET
                 assessment_fee = ?1, treatment_fee = ?2, dressing_supplies_cost = ?3,
                 medication_cost = ?4, other_charges = ?5, total_amount = ?6, balance = ?7,
                 updated_at = ?8
             WHERE id = ?9",
            params![
                charges.assessment_fee.minor(),
                charges.treatment_fee.minor(),
                charges.dressing_supplies_cost.minor(),
                charges.medication_cost.minor(),
                charges.other_charges.minor(),
                totals.total_amount.minor(),
                totals.balance.minor(),
                now_rfc3339(),
                current.id,
            ],
        )?;
        let updated = self.billing(current.id)?;
        self.notify_billing_update(&updated);
        Ok(updated)
    }

    /// Record a payment against a wound billing record.
    ///
    /// Allocates the receipt number, generates the transaction reference,
    /// bumps `amount_paid`, recomputes the totals and settles the payment
    /// status (`paid` when the balance is cleared, otherwise `partial`), all
    /// in one transaction.
    pub fn record_payment(
        &self,
        wound_billing_id: i64,
        amount: Money,
        method: &str,
        details: &PaymentDetails,
        recorded_by_profile_id: Option<i64>,
    ) -> HmisResult<PaymentTransaction> {
        let method = enum_value("method", method, PaymentMethod::parse)?;
        if amount <= Money::ZERO {
            return Err(HmisError::InvalidInput("payment amount must be positive".into()));
        }
        let billing = self.billing(wound_billing_id)?;

        let mut conn = self.store.conn();
        if let Some(profile_id) = recorded_by_profile_id {
            require_row(&conn, "user_profiles", "user profile", profile_id)?;
        }
        let receipt_number = sequence::allocate_on(&mut conn, SequenceKind::Receipt)?;
        let reference = transaction_reference();
        let now = now_rfc3339();

        let new_paid = billing.amount_paid + amount;
        let totals = derived::billing_totals(&BillingCharges {
            assessment_fee: billing.assessment_fee,
            treatment_fee: billing.treatment_fee,
            dressing_supplies_cost: billing.dressing_supplies_cost,
            medication_cost: billing.medication_cost,
            other_charges: billing.other_charges,
            amount_paid: new_paid,
        });
        let payment_status = if totals.balance <= Money::ZERO {
            "paid"
        } else {
            "partial"
        };

        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO payment_transactions
                 (wound_billing_id, amount, method, transaction_reference, receipt_number,
                  mobile_money_phone, bank_name, card_last4, status, paid_at,
                  recorded_by_profile_id, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'completed', ?9, ?10, ?11)",
            params![
                wound_billing_id,
                amount.minor(),
                method.as_str(),
                reference,
                receipt_number,
                details.mobile_money_phone,
                details.bank_name,
                details.card_last4,
                now,
                recorded_by_profile_id,
                details.notes,
            ],
        )
        .map_err(|e| map_unique(e, "transaction_reference", &reference))?;
        let payment_id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE wound_billing SET amount_paid = ?1, total_amount = ?2, balance = ?3,
                 payment_status = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                new_paid.minor(),
                totals.total_amount.minor(),
                totals.balance.minor(),
                payment_status,
                now,
                wound_billing_id,
            ],
        )?;
        tx.commit()?;

        let created = conn.query_row(
            &format!("SELECT {PAYMENT_COLUMNS} FROM payment_transactions WHERE id = ?1"),
            params![payment_id],
            payment_row,
        )?;
        drop(conn);
        let updated = self.billing(wound_billing_id)?;
        self.notify_billing_update(&updated);
        Ok(created)
    }

    pub fn payments_for_billing(&self, wound_billing_id: i64) -> HmisResult<Vec<PaymentTransaction>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payment_transactions
             WHERE wound_billing_id = ?1 ORDER BY paid_at DESC, id DESC"
        ))?;
        let rows = stmt
            .query_map(params![wound_billing_id], payment_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn payment(&self, id: i64) -> HmisResult<PaymentTransaction> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {PAYMENT_COLUMNS} FROM payment_transactions WHERE id = ?1"),
                params![id],
                payment_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("payment transaction", id))
    }

    /// Move a payment transaction to a new status. Any status may follow any
    /// other; the billing totals are the ledger of record and are not touched
    /// here.
    pub fn set_payment_status(&self, id: i64, status: &str) -> HmisResult<PaymentTransaction> {
        let next = enum_value("status", status, PaymentStatus::parse)?;
        self.payment(id)?;
        self.store.conn().execute(
            "UPDATE payment_transactions SET status = ?1 WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        self.payment(id)
    }

    // -- Insurance claims -------------------------------------------------

    /// Open a claim against a wound billing record. One claim per record.
    pub fn create_claim(
        &self,
        wound_billing_id: i64,
        insurance_provider_id: Option<i64>,
        claim_amount: Money,
        notes: &str,
    ) -> HmisResult<InsuranceClaim> {
        if claim_amount <= Money::ZERO {
            return Err(HmisError::InvalidInput("claim amount must be positive".into()));
        }
        self.billing(wound_billing_id)?;
        let mut conn = self.store.conn();
        if let Some(provider_id) = insurance_provider_id {
            require_row(&conn, "insurance_providers", "insurance provider", provider_id)?;
        }
        let claim_number = sequence::allocate_on(&mut conn, SequenceKind::Claim)?;
        conn.execute(
            "INSERT INTO insurance_claims
                 (wound_billing_id, insurance_provider_id, claim_number, claim_amount, notes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                wound_billing_id,
                insurance_provider_id,
                claim_number,
                claim_amount.minor(),
                notes,
            ],
        )
        .map_err(|e| {
            if HmisError::is_unique_violation(&e) {
                HmisError::InvalidInput("billing record already has a claim".into())
            } else {
                HmisError::Sqlite(e)
            }
        })?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.claim(id)
    }

    pub fn claim(&self, id: i64) -> HmisResult<InsuranceClaim> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {CLAIM_COLUMNS} FROM insurance_claims WHERE id = ?1"),
                params![id],
                claim_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("insurance claim", id))
    }

    pub fn submit_claim(&self, id: i64) -> HmisResult<InsuranceClaim> {
        let claim = self.claim(id)?;
        if claim.status != ClaimStatus::Draft {
            return Err(HmisError::InvalidInput(format!(
                "claim {} is not a draft",
                claim.claim_number
            )));
        }
        self.store.conn().execute(
            "UPDATE insurance_claims SET status = 'submitted', submitted_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        self.claim(id)
    }

    /// Mark a submitted claim as being assessed by the insurer.
    pub fn review_claim(&self, id: i64) -> HmisResult<InsuranceClaim> {
        let claim = self.claim(id)?;
        if claim.status != ClaimStatus::Submitted {
            return Err(HmisError::InvalidInput(format!(
                "claim {} has not been submitted",
                claim.claim_number
            )));
        }
        self.store.conn().execute(
            "UPDATE insurance_claims SET status = 'under_review' WHERE id = ?1",
            params![id],
        )?;
        self.claim(id)
    }

    /// Record the insurer's decision. An approval below the claimed amount
    /// lands as `approved_partial`.
    pub fn resolve_claim(
        &self,
        id: i64,
        approved: bool,
        approved_amount: Option<Money>,
    ) -> HmisResult<InsuranceClaim> {
        let claim = self.claim(id)?;
        if claim.status != ClaimStatus::Submitted && claim.status != ClaimStatus::UnderReview {
            return Err(HmisError::InvalidInput(format!(
                "claim {} has not been submitted",
                claim.claim_number
            )));
        }
        if approved {
            let amount = approved_amount.unwrap_or(claim.claim_amount);
            let status = if amount < claim.claim_amount {
                ClaimStatus::ApprovedPartial
            } else {
                ClaimStatus::Approved
            };
            self.store.conn().execute(
                "UPDATE insurance_claims SET status = ?1, approved_amount = ?2 WHERE id = ?3",
                params![status.as_str(), amount.minor(), id],
            )?;
        } else {
            self.store.conn().execute(
                "UPDATE insurance_claims SET status = 'rejected' WHERE id = ?1",
                params![id],
            )?;
        }
        self.claim(id)
    }

    /// Settle an approved claim: the payout is recorded on the claim and as
    /// an insurance payment against the billing record.
    pub fn settle_claim(&self, id: i64, paid_amount: Money) -> HmisResult<InsuranceClaim> {
        let claim = self.claim(id)?;
        if claim.status != ClaimStatus::Approved && claim.status != ClaimStatus::ApprovedPartial {
            return Err(HmisError::InvalidInput(format!(
                "claim {} has not been approved",
                claim.claim_number
            )));
        }
        self.record_payment(
            claim.wound_billing_id,
            paid_amount,
            "insurance",
            &PaymentDetails {
                notes: format!("insurance claim {}", claim.claim_number),
                ..Default::default()
            },
            None,
        )?;
        self.store.conn().execute(
            "UPDATE insurance_claims SET status = 'paid', paid_amount = ?1 WHERE id = ?2",
            params![paid_amount.minor(), id],
        )?;
        self.claim(id)
    }

    // -- Credit accounts --------------------------------------------------

    pub fn open_account(
        &self,
        patient_id: i64,
        credit_limit: Money,
        corporate_scheme_id: Option<i64>,
    ) -> HmisResult<BillingAccount> {
        if credit_limit.is_negative() {
            return Err(HmisError::InvalidInput("credit limit cannot be negative".into()));
        }
        let conn = self.store.conn();
        require_row(&conn, "patients", "patient", patient_id)?;
        if let Some(scheme_id) = corporate_scheme_id {
            require_row(&conn, "corporate_payment_schemes", "corporate scheme", scheme_id)?;
        }
        let available = derived::available_credit(credit_limit, Money::ZERO);
        conn.execute(
            "INSERT INTO patient_billing_accounts
                 (patient_id, credit_limit, current_balance, available_credit,
                  corporate_scheme_id, updated_at)
             VALUES (?1, ?2, 0, ?3, ?4, ?5)",
            params![
                patient_id,
                credit_limit.minor(),
                available.minor(),
                corporate_scheme_id,
                now_rfc3339(),
            ],
        )
        .map_err(|e| map_unique(e, "patient_id", &patient_id.to_string()))?;
        let id = conn.last_insert_rowid();
        drop(conn);
        self.account(id)
    }

    pub fn account(&self, id: i64) -> HmisResult<BillingAccount> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {ACCOUNT_COLUMNS} FROM patient_billing_accounts WHERE id = ?1"),
                params![id],
                account_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("billing account", id))
    }

    pub fn account_for_patient(&self, patient_id: i64) -> HmisResult<BillingAccount> {
        self.store
            .conn()
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM patient_billing_accounts WHERE patient_id = ?1"
                ),
                params![patient_id],
                account_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("billing account", patient_id))
    }

    /// Charge the account. Refused when it would exceed the available
    /// credit. The ledger row records the exact balances either side of the
    /// movement.
    pub fn charge_account(
        &self,
        account_id: i64,
        amount: Money,
        reference: &str,
        notes: &str,
    ) -> HmisResult<CreditTransaction> {
        if amount <= Money::ZERO {
            return Err(HmisError::InvalidInput("charge amount must be positive".into()));
        }
        let account = self.account(account_id)?;
        if !account.is_active {
            return Err(HmisError::InvalidInput("billing account is closed".into()));
        }
        if amount > account.available_credit {
            return Err(HmisError::InvalidInput(format!(
                "charge of {amount} exceeds available credit {}",
                account.available_credit
            )));
        }
        self.apply_movement(&account, "charge", amount, account.current_balance + amount, reference, notes)
    }

    /// Pay down the account balance.
    pub fn repay_account(
        &self,
        account_id: i64,
        amount: Money,
        reference: &str,
        notes: &str,
    ) -> HmisResult<CreditTransaction> {
        if amount <= Money::ZERO {
            return Err(HmisError::InvalidInput("repayment amount must be positive".into()));
        }
        let account = self.account(account_id)?;
        self.apply_movement(&account, "payment", amount, account.current_balance - amount, reference, notes)
    }

    pub fn set_credit_limit(&self, account_id: i64, credit_limit: Money) -> HmisResult<BillingAccount> {
        if credit_limit.is_negative() {
            return Err(HmisError::InvalidInput("credit limit cannot be negative".into()));
        }
        let account = self.account(account_id)?;
        let available = derived::available_credit(credit_limit, account.current_balance);
        self.store.conn().execute(
            "UPDATE patient_billing_accounts
             SET credit_limit = ?1, available_credit = ?2, updated_at = ?3
             WHERE id = ?4",
            params![credit_limit.minor(), available.minor(), now_rfc3339(), account_id],
        )?;
        self.account(account_id)
    }

    pub fn account_transactions(&self, account_id: i64) -> HmisResult<Vec<CreditTransaction>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CREDIT_TX_COLUMNS} FROM credit_account_transactions
             WHERE account_id = ?1 ORDER BY id DESC"
        ))?;
        let rows = stmt
            .query_map(params![account_id], credit_tx_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn apply_movement(
        &self,
        account: &BillingAccount,
        transaction_type: &str,
        amount: Money,
        balance_after: Money,
        reference: &str,
        notes: &str,
    ) -> HmisResult<CreditTransaction> {
        let available = derived::available_credit(account.credit_limit, balance_after);
        let mut conn = self.store.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO credit_account_transactions
                 (account_id, transaction_type, amount, balance_before, balance_after,
                  reference, notes, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account.id,
                transaction_type,
                amount.minor(),
                account.current_balance.minor(),
                balance_after.minor(),
                reference,
                notes,
                now_rfc3339(),
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.execute(
            "UPDATE patient_billing_accounts
             SET current_balance = ?1, available_credit = ?2, updated_at = ?3
             WHERE id = ?4",
            params![balance_after.minor(), available.minor(), now_rfc3339(), account.id],
        )?;
        tx.commit()?;
        let created = conn.query_row(
            &format!("SELECT {CREDIT_TX_COLUMNS} FROM credit_account_transactions WHERE id = ?1"),
            params![id],
            credit_tx_row,
        )?;
        Ok(created)
    }

    // -- Corporate schemes ------------------------------------------------

    pub fn ensure_corporate_scheme(
        &self,
        name: &str,
        employer_name: &str,
        coverage_percentage: f64,
    ) -> HmisResult<i64> {
        if !(0.0..=100.0).contains(&coverage_percentage) {
            return Err(HmisError::InvalidInput(
                "coverage percentage must be between 0 and 100".into(),
            ));
        }
        let conn = self.store.conn();
        conn.execute(
            "INSERT OR IGNORE INTO corporate_payment_schemes (name, employer_name, coverage_percentage)
             VALUES (?1, ?2, ?3)",
            params![name, employer_name, coverage_percentage],
        )?;
        let id = conn.query_row(
            "SELECT id FROM corporate_payment_schemes WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn corporate_schemes(&self) -> HmisResult<Vec<CorporateScheme>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, employer_name, coverage_percentage, contact_person, phone, is_active
             FROM corporate_payment_schemes WHERE is_active = 1 ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(CorporateScheme {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    employer_name: row.get(2)?,
                    coverage_percentage: row.get(3)?,
                    contact_person: row.get(4)?,
                    phone: row.get(5)?,
                    is_active: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // -- Services and invoices --------------------------------------------

    pub fn ensure_service(
        &self,
        name: &str,
        department_id: i64,
        category: &str,
        price: Money,
    ) -> HmisResult<i64> {
        let conn = self.store.conn();
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM services WHERE name = ?1 AND department_id = ?2",
                params![name, department_id],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = existing {
            return Ok(id);
        }
        conn.execute(
            "INSERT INTO services (name, department_id, category, price)
             VALUES (?1, ?2, ?3, ?4)",
            params![name, department_id, category, price.minor()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn services(&self) -> HmisResult<Vec<BillableService>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id, name, description, price, department_id, category, is_active
             FROM services WHERE is_active = 1 ORDER BY category, name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(BillableService {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                    price: Money::from_minor(row.get(3)?),
                    department_id: row.get(4)?,
                    category: row.get(5)?,
                    is_active: row.get(6)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Raise an invoice from service line items. The unit price is read from
    /// the catalogue at invoicing time; line and invoice totals are derived.
    pub fn create_invoice(
        &self,
        patient_id: i64,
        lines: &[(i64, u32)],
    ) -> HmisResult<Invoice> {
        if lines.is_empty() {
            return Err(HmisError::InvalidInput("an invoice needs at least one line".into()));
        }
        if lines.iter().any(|(_, quantity)| *quantity == 0) {
            return Err(HmisError::InvalidInput("line quantity must be positive".into()));
        }
        let mut conn = self.store.conn();
        require_row(&conn, "patients", "patient", patient_id)?;
        let mut priced = Vec::with_capacity(lines.len());
        for (service_id, quantity) in lines {
            let price: Option<i64> = conn
                .query_row(
                    "SELECT price FROM services WHERE id = ?1 AND is_active = 1",
                    params![service_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(price) = price else {
                return Err(HmisError::not_found("service", *service_id));
            };
            let unit_price = Money::from_minor(price);
            priced.push((*service_id, *quantity, unit_price, derived::line_total(*quantity, unit_price)));
        }
        let total: Money = priced.iter().map(|(_, _, _, line)| *line).sum();

        let invoice_number = sequence::allocate_on(&mut conn, SequenceKind::Invoice)?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO invoices (invoice_number, patient_id, total_amount, status, created_at)
             VALUES (?1, ?2, ?3, 'issued', ?4)",
            params![invoice_number, patient_id, total.minor(), now_rfc3339()],
        )?;
        let id = tx.last_insert_rowid();
        for (service_id, quantity, unit_price, line_total) in &priced {
            tx.execute(
                "INSERT INTO invoice_items (invoice_id, service_id, quantity, unit_price, total_price)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, service_id, quantity, unit_price.minor(), line_total.minor()],
            )?;
        }
        tx.commit()?;
        drop(conn);
        self.invoice(id)
    }

    pub fn invoice(&self, id: i64) -> HmisResult<Invoice> {
        let conn = self.store.conn();
        let mut invoice = conn
            .query_row(
                "SELECT id, invoice_number, patient_id, total_amount, paid_amount,
                        insurance_amount, status, created_at
                 FROM invoices WHERE id = ?1",
                params![id],
                invoice_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("invoice", id))?;
        let mut stmt = conn.prepare(
            "SELECT id, invoice_id, service_id, quantity, unit_price, total_price
             FROM invoice_items WHERE invoice_id = ?1 ORDER BY id",
        )?;
        invoice.items = stmt
            .query_map(params![id], invoice_item_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(invoice)
    }

    pub fn invoices_for_patient(&self, patient_id: i64) -> HmisResult<Vec<Invoice>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT id FROM invoices WHERE patient_id = ?1 ORDER BY created_at DESC",
        )?;
        let ids = stmt
            .query_map(params![patient_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        drop(stmt);
        drop(conn);
        ids.into_iter().map(|id| self.invoice(id)).collect()
    }

    pub fn record_invoice_payment(&self, id: i64, amount: Money) -> HmisResult<Invoice> {
        if amount <= Money::ZERO {
            return Err(HmisError::InvalidInput("payment amount must be positive".into()));
        }
        let invoice = self.invoice(id)?;
        let new_paid = invoice.paid_amount + amount;
        let balance = derived::invoice_balance(invoice.total_amount, new_paid, invoice.insurance_amount);
        let status = if balance <= Money::ZERO { "paid" } else { "partial" };
        self.store.conn().execute(
            "UPDATE invoices SET paid_amount = ?1, status = ?2 WHERE id = ?3",
            params![new_paid.minor(), status, id],
        )?;
        self.invoice(id)
    }
}

/// Opaque unique payment reference, `TXN-` plus ten random alphanumerics.
fn transaction_reference() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(|c| (c as char).to_ascii_uppercase())
        .collect();
    format!("TXN-{suffix}")
}

const BILLING_COLUMNS: &str = "id, wound_case_id, assessment_fee, treatment_fee, \
                               dressing_supplies_cost, medication_cost, other_charges, \
                               total_amount, amount_paid, balance, payment_status, updated_at";

fn billing_row(row: &rusqlite::Row) -> rusqlite::Result<WoundBilling> {
    Ok(WoundBilling {
        id: row.get(0)?,
        wound_case_id: row.get(1)?,
        assessment_fee: Money::from_minor(row.get(2)?),
        treatment_fee: Money::from_minor(row.get(3)?),
        dressing_supplies_cost: Money::from_minor(row.get(4)?),
        medication_cost: Money::from_minor(row.get(5)?),
        other_charges: Money::from_minor(row.get(6)?),
        total_amount: Money::from_minor(row.get(7)?),
        amount_paid: Money::from_minor(row.get(8)?),
        balance: Money::from_minor(row.get(9)?),
        payment_status: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

const PAYMENT_COLUMNS: &str = "id, wound_billing_id, amount, method, transaction_reference, \
                               receipt_number, mobile_money_phone, bank_name, card_last4, \
                               status, paid_at, recorded_by_profile_id, notes";

fn payment_row(row: &rusqlite::Row) -> rusqlite::Result<PaymentTransaction> {
    let method: String = row.get(3)?;
    let status: String = row.get(9)?;
    Ok(PaymentTransaction {
        id: row.get(0)?,
        wound_billing_id: row.get(1)?,
        amount: Money::from_minor(row.get(2)?),
        method: PaymentMethod::parse(&method).unwrap_or(PaymentMethod::Cash),
        transaction_reference: row.get(4)?,
        receipt_number: row.get(5)?,
        mobile_money_phone: row.get(6)?,
        bank_name: row.get(7)?,
        card_last4: row.get(8)?,
        status: PaymentStatus::parse(&status).unwrap_or(PaymentStatus::Completed),
        paid_at: row.get(10)?,
        recorded_by_profile_id: row.get(11)?,
        notes: row.get(12)?,
    })
}

const CLAIM_COLUMNS: &str = "id, wound_billing_id, insurance_provider_id, claim_number, \
                             claim_amount, approved_amount, paid_amount, status, submitted_at, \
                             notes";

fn claim_row(row: &rusqlite::Row) -> rusqlite::Result<InsuranceClaim> {
    let status: String = row.get(7)?;
    Ok(InsuranceClaim {
        id: row.get(0)?,
        wound_billing_id: row.get(1)?,
        insurance_provider_id: row.get(2)?,
        claim_number: row.get(3)?,
        claim_amount: Money::from_minor(row.get(4)?),
        approved_amount: row.get::<_, Option<i64>>(5)?.map(Money::from_minor),
        paid_amount: row.get::<_, Option<i64>>(6)?.map(Money::from_minor),
        status: ClaimStatus::parse(&status).unwrap_or(ClaimStatus::Draft),
        submitted_at: row.get(8)?,
        notes: row.get(9)?,
    })
}

const ACCOUNT_COLUMNS: &str = "id, patient_id, credit_limit, current_balance, available_credit, \
                               corporate_scheme_id, is_active, updated_at";

fn account_row(row: &rusqlite::Row) -> rusqlite::Result<BillingAccount> {
    Ok(BillingAccount {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        credit_limit: Money::from_minor(row.get(2)?),
        current_balance: Money::from_minor(row.get(3)?),
        available_credit: Money::from_minor(row.get(4)?),
        corporate_scheme_id: row.get(5)?,
        is_active: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

const CREDIT_TX_COLUMNS: &str = "id, account_id, transaction_type, amount, balance_before, \
                                 balance_after, reference, notes, created_at";

fn credit_tx_row(row: &rusqlite::Row) -> rusqlite::Result<CreditTransaction> {
    Ok(CreditTransaction {
        id: row.get(0)?,
        account_id: row.get(1)?,
        transaction_type: row.get(2)?,
        amount: Money::from_minor(row.get(3)?),
        balance_before: Money::from_minor(row.get(4)?),
        balance_after: Money::from_minor(row.get(5)?),
        reference: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn invoice_row(row: &rusqlite::Row) -> rusqlite::Result<Invoice> {
    Ok(Invoice {
        id: row.get(0)?,
        invoice_number: row.get(1)?,
        patient_id: row.get(2)?,
        total_amount: Money::from_minor(row.get(3)?),
        paid_amount: Money::from_minor(row.get(4)?),
        insurance_amount: Money::from_minor(row.get(5)?),
        status: row.get(6)?,
        created_at: row.get(7)?,
        items: Vec::new(),
    })
}

fn invoice_item_row(row: &rusqlite::Row) -> rusqlite::Result<InvoiceItem> {
    Ok(InvoiceItem {
        id: row.get(0)?,
        invoice_id: row.get(1)?,
        service_id: row.get(2)?,
        quantity: row.get(3)?,
        unit_price: Money::from_minor(row.get(4)?),
        total_price: Money::from_minor(row.get(5)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repositories::identity::{IdentityService, NewStaff};
    use crate::repositories::reference::ReferenceService;
    use crate::repositories::wounds::test_support::{case_input, fixture};

    fn money(major: i64) -> Money {
        Money::from_major(major)
    }

    #[test]
    fn charges_recompute_totals_exactly() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());

        let billing = billing_svc
            .update_charges(case.id, &ChargesInput {
                assessment_fee: money(500),
                treatment_fee: money(300),
                dressing_supplies_cost: money(50),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(billing.total_amount, money(850));
        assert_eq!(billing.balance, money(850));
        assert_eq!(billing.payment_status, "pending");
    }

    #[test]
    fn payment_updates_balance_and_status() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let billing = billing_svc
            .update_charges(case.id, &ChargesInput {
                assessment_fee: money(500),
                treatment_fee: money(300),
                dressing_supplies_cost: money(50),
                ..Default::default()
            })
            .unwrap();

        let payment = billing_svc
            .record_payment(billing.id, money(400), "cash", &PaymentDetails::default(), None)
            .unwrap();
        assert_eq!(payment.receipt_number, "RCT-00001");
        assert!(payment.transaction_reference.starts_with("TXN-"));

        let after = billing_svc.billing(billing.id).unwrap();
        assert_eq!(after.amount_paid, money(400));
        assert_eq!(after.balance, money(450));
        assert_eq!(after.payment_status, "partial");

        billing_svc
            .record_payment(billing.id, money(450), "mobile_money", &PaymentDetails::default(), None)
            .unwrap();
        let settled = billing_svc.billing(billing.id).unwrap();
        assert_eq!(settled.balance, Money::ZERO);
        assert_eq!(settled.payment_status, "paid");
        assert_eq!(billing_svc.payments_for_billing(billing.id).unwrap().len(), 2);

        // Overpayment is representable as a negative balance.
        billing_svc
            .record_payment(billing.id, money(100), "cash", &PaymentDetails::default(), None)
            .unwrap();
        let overpaid = billing_svc.billing(billing.id).unwrap();
        assert_eq!(overpaid.balance, money(-100));
        assert_eq!(overpaid.payment_status, "paid");
    }

    #[test]
    fn unknown_payment_method_rejected() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let billing = billing_svc.billing_for_case(case.id).unwrap();
        assert!(matches!(
            billing_svc
                .record_payment(billing.id, money(10), "barter", &PaymentDetails::default(), None)
                .unwrap_err(),
            HmisError::InvalidEnum { .. }
        ));
    }

    #[test]
    fn billing_writes_notify_finance_roles() {
        let f = fixture();
        let cashier = IdentityService::new(f.store.clone())
            .create_staff(&NewStaff {
                username: "cashier".into(),
                password: "longenough".into(),
                email: String::new(),
                first_name: "P".into(),
                last_name: "Z".into(),
                role: Role::Cashier,
                employee_id: Some("EMP-009".into()),
                department_id: None,
                phone: String::new(),
                specialization: String::new(),
            })
            .unwrap();
        let inbox = NotificationService::new(f.store.clone(), f.bus.clone());
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());

        let billing = billing_svc
            .update_charges(case.id, &ChargesInput {
                treatment_fee: money(200),
                ..Default::default()
            })
            .unwrap();
        let after_charges = inbox.list_for(cashier.profile.id, true).unwrap();
        assert_eq!(after_charges.len(), 1);
        assert_eq!(after_charges[0].priority, "medium");

        // Clearing the balance escalates the priority.
        billing_svc
            .record_payment(billing.id, money(200), "cash", &PaymentDetails::default(), None)
            .unwrap();
        let after_payment = inbox.list_for(cashier.profile.id, true).unwrap();
        assert_eq!(after_payment.len(), 2);
        assert_eq!(after_payment[0].priority, "high");
    }

    #[test]
    fn payment_status_moves_freely() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let billing = billing_svc.billing_for_case(case.id).unwrap();
        let payment = billing_svc
            .record_payment(billing.id, money(50), "cash", &PaymentDetails::default(), None)
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Completed);

        let refunded = billing_svc.set_payment_status(payment.id, "refunded").unwrap();
        assert_eq!(refunded.status, PaymentStatus::Refunded);
        // Transitions are unordered; a refunded payment can go back to pending.
        let pending = billing_svc.set_payment_status(payment.id, "pending").unwrap();
        assert_eq!(pending.status, PaymentStatus::Pending);

        assert!(matches!(
            billing_svc.set_payment_status(payment.id, "reversed").unwrap_err(),
            HmisError::InvalidEnum { .. }
        ));
        assert!(billing_svc.set_payment_status(999, "pending").is_err());
    }

    #[test]
    fn claim_lifecycle_settles_billing() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let billing = billing_svc
            .update_charges(case.id, &ChargesInput {
                treatment_fee: money(1_000),
                ..Default::default()
            })
            .unwrap();

        let claim = billing_svc
            .create_claim(billing.id, None, money(1_000), "")
            .unwrap();
        assert_eq!(claim.claim_number, "CLM-00001");
        assert_eq!(claim.status, ClaimStatus::Draft);
        // One claim per billing record.
        assert!(billing_svc.create_claim(billing.id, None, money(1), "").is_err());

        billing_svc.submit_claim(claim.id).unwrap();
        billing_svc.resolve_claim(claim.id, true, Some(money(800))).unwrap();
        let paid = billing_svc.settle_claim(claim.id, money(800)).unwrap();
        assert_eq!(paid.status, ClaimStatus::Paid);
        assert_eq!(paid.paid_amount, Some(money(800)));

        let after = billing_svc.billing(billing.id).unwrap();
        assert_eq!(after.amount_paid, money(800));
        assert_eq!(after.balance, money(200));
    }

    #[test]
    fn claim_transitions_are_ordered() {
        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let billing = billing_svc.billing_for_case(case.id).unwrap();
        let claim = billing_svc.create_claim(billing.id, None, money(100), "").unwrap();
        // Cannot approve or settle an unsubmitted draft.
        assert!(billing_svc.resolve_claim(claim.id, true, None).is_err());
        assert!(billing_svc.settle_claim(claim.id, money(100)).is_err());
    }

    #[test]
    fn claim_review_and_partial_approval() {
        assert_eq!(ClaimStatus::parse("under_review"), Some(ClaimStatus::UnderReview));
        assert_eq!(ClaimStatus::parse("approved_partial"), Some(ClaimStatus::ApprovedPartial));

        let f = fixture();
        let case = f.svc.create(&case_input(f.patient_id)).unwrap();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let billing = billing_svc.billing_for_case(case.id).unwrap();
        let claim = billing_svc.create_claim(billing.id, None, money(1_000), "").unwrap();

        billing_svc.submit_claim(claim.id).unwrap();
        let reviewing = billing_svc.review_claim(claim.id).unwrap();
        assert_eq!(reviewing.status, ClaimStatus::UnderReview);
        // Review is only meaningful once.
        assert!(billing_svc.review_claim(claim.id).is_err());

        let partial = billing_svc
            .resolve_claim(claim.id, true, Some(money(600)))
            .unwrap();
        assert_eq!(partial.status, ClaimStatus::ApprovedPartial);
        assert_eq!(partial.approved_amount, Some(money(600)));

        // A partial approval still settles.
        let paid = billing_svc.settle_claim(claim.id, money(600)).unwrap();
        assert_eq!(paid.status, ClaimStatus::Paid);
    }

    #[test]
    fn credit_account_ledger_is_exact() {
        let f = fixture();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let account = billing_svc.open_account(f.patient_id, money(1_000), None).unwrap();
        assert_eq!(account.available_credit, money(1_000));
        // One account per patient.
        assert!(billing_svc.open_account(f.patient_id, money(500), None).is_err());

        let charge = billing_svc
            .charge_account(account.id, money(400), "WND-00001", "")
            .unwrap();
        assert_eq!(charge.balance_before, Money::ZERO);
        assert_eq!(charge.balance_after, money(400));

        let after = billing_svc.account(account.id).unwrap();
        assert_eq!(after.current_balance, money(400));
        assert_eq!(after.available_credit, money(600));

        // Over-limit charge is refused and leaves no ledger row.
        assert!(billing_svc.charge_account(account.id, money(700), "", "").is_err());
        assert_eq!(billing_svc.account_transactions(account.id).unwrap().len(), 1);

        let repay = billing_svc
            .repay_account(account.id, money(150), "RCT-00001", "")
            .unwrap();
        assert_eq!(repay.balance_after, money(250));
        assert_eq!(
            billing_svc.account(account.id).unwrap().available_credit,
            money(750)
        );
    }

    #[test]
    fn credit_limit_change_recomputes_availability() {
        let f = fixture();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let account = billing_svc.open_account(f.patient_id, money(1_000), None).unwrap();
        billing_svc.charge_account(account.id, money(900), "", "").unwrap();
        let shrunk = billing_svc.set_credit_limit(account.id, money(500)).unwrap();
        // Over-limit is representable as negative availability.
        assert_eq!(shrunk.available_credit, money(-400));
    }

    #[test]
    fn invoice_totals_derive_from_lines() {
        let f = fixture();
        let billing_svc = BillingService::new(f.store.clone(), f.bus.clone());
        let reference = ReferenceService::new(f.store.clone());
        let dept = reference.ensure_department("Wound Care", "").unwrap();
        let dressing = billing_svc
            .ensure_service("Dressing change", dept, "wound_care", money(40))
            .unwrap();
        let review = billing_svc
            .ensure_service("Clinical review", dept, "consultation", money(100))
            .unwrap();

        let invoice = billing_svc
            .create_invoice(f.patient_id, &[(dressing, 3), (review, 1)])
            .unwrap();
        assert_eq!(invoice.invoice_number, "INV-00001");
        assert_eq!(invoice.total_amount, money(220));
        assert_eq!(invoice.balance(), money(220));

        let part_paid = billing_svc.record_invoice_payment(invoice.id, money(100)).unwrap();
        assert_eq!(part_paid.status, "partial");
        assert_eq!(part_paid.balance(), money(120));

        let listed = billing_svc.invoices_for_patient(f.patient_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].items.len(), 2);
    }
}
