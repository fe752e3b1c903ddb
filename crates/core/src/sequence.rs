//! Race-safe allocation of human-readable sequential identifiers.
//!
//! The original assignment rule (max primary key + 1) is a read-then-write
//! race: two concurrent creations can compute the same next number. Here a
//! dedicated `sequences` table is the single numbering authority: seeding,
//! reading and incrementing the counter happen inside one transaction, so an
//! identifier can never be handed out twice. The external `PREFIX-NNNNN`
//! format is preserved.

use crate::{HmisResult, Store};
use rusqlite::{params, Connection, TransactionBehavior};

/// The entity families that carry a human-readable sequential identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceKind {
    WoundCase,
    Invoice,
    LabRequest,
    Prescription,
    OutPatientVisit,
    Admission,
    RadiologyRequest,
    Receipt,
    Claim,
}

impl SequenceKind {
    /// The identifier prefix, matching the original system's formats.
    pub fn prefix(self) -> &'static str {
        match self {
            SequenceKind::WoundCase => "WND",
            SequenceKind::Invoice => "INV",
            SequenceKind::LabRequest => "LAB",
            SequenceKind::Prescription => "RX",
            SequenceKind::OutPatientVisit => "VIS",
            SequenceKind::Admission => "ADM",
            SequenceKind::RadiologyRequest => "RAD",
            SequenceKind::Receipt => "RCT",
            SequenceKind::Claim => "CLM",
        }
    }

    fn key(self) -> &'static str {
        match self {
            SequenceKind::WoundCase => "wound_case",
            SequenceKind::Invoice => "invoice",
            SequenceKind::LabRequest => "lab_request",
            SequenceKind::Prescription => "prescription",
            SequenceKind::OutPatientVisit => "outpatient_visit",
            SequenceKind::Admission => "admission",
            SequenceKind::RadiologyRequest => "radiology_request",
            SequenceKind::Receipt => "receipt",
            SequenceKind::Claim => "claim",
        }
    }

    /// Format a counter value as the external identifier, e.g. `WND-00042`.
    pub fn format(self, number: i64) -> String {
        format!("{}-{:05}", self.prefix(), number)
    }
}

/// Allocate the next identifier for `kind`.
///
/// Runs as an IMMEDIATE transaction so the counter row is locked for the whole
/// seed/read/increment cycle.
///
/// # Errors
///
/// Returns `HmisError::Sqlite` if the transaction fails.
pub fn allocate(store: &Store, kind: SequenceKind) -> HmisResult<String> {
    let mut guard = store.conn();
    allocate_on(&mut guard, kind)
}

/// Allocation against an already-held connection, for callers that need the
/// identifier inside a larger transaction.
pub(crate) fn allocate_on(conn: &mut Connection, kind: SequenceKind) -> HmisResult<String> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    tx.execute(
        "INSERT OR IGNORE INTO sequences (kind, next) VALUES (?1, 1)",
        params![kind.key()],
    )?;
    let number: i64 = tx.query_row(
        "SELECT next FROM sequences WHERE kind = ?1",
        params![kind.key()],
        |row| row.get(0),
    )?;
    tx.execute(
        "UPDATE sequences SET next = next + 1 WHERE kind = ?1",
        params![kind.key()],
    )?;
    tx.commit()?;
    Ok(kind.format(number))
}
