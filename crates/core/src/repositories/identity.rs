//! Staff identity: login accounts and the one-to-one staff profile.
//!
//! The account holds credentials; the profile holds the clinical identity
//! (role, employee id, department). API callers authenticate by employee id,
//! so the profile is the unit every other table references.

use crate::db::now_rfc3339;
use crate::rbac::Role;
use crate::repositories::map_unique;
use crate::{HmisError, HmisResult, Store};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub account_id: i64,
    pub department_id: Option<i64>,
    pub role: Role,
    pub employee_id: Option<String>,
    pub phone: String,
    pub specialization: String,
    pub license_number: String,
    pub date_joined: String,
}

/// A profile joined with its account, the shape the staff listing returns.
#[derive(Debug, Clone, Serialize)]
pub struct StaffMember {
    pub profile: UserProfile,
    pub username: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewStaff {
    pub username: String,
    pub password: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub employee_id: Option<String>,
    pub department_id: Option<i64>,
    pub phone: String,
    pub specialization: String,
}

#[derive(Clone)]
pub struct IdentityService {
    store: Store,
}

impl IdentityService {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Create an account and its profile in one step.
    ///
    /// # Errors
    ///
    /// `Duplicate` on a taken username or employee id, `PasswordHash` if the
    /// password cannot be hashed.
    pub fn create_staff(&self, new: &NewStaff) -> HmisResult<StaffMember> {
        let username = new.username.trim();
        if username.is_empty() {
            return Err(HmisError::InvalidInput("username is required".into()));
        }
        if new.password.len() < 8 {
            return Err(HmisError::InvalidInput(
                "password must be at least 8 characters".into(),
            ));
        }
        let hash = hash_password(&new.password)?;

        let mut conn = self.store.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO user_accounts (username, email, first_name, last_name, password_hash)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![username, new.email, new.first_name, new.last_name, hash],
        )
        .map_err(|e| map_unique(e, "username", username))?;
        let account_id = tx.last_insert_rowid();
        tx.execute(
            "INSERT INTO user_profiles
                 (account_id, department_id, role, employee_id, phone, specialization, date_joined)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                account_id,
                new.department_id,
                new.role.as_str(),
                new.employee_id,
                new.phone,
                new.specialization,
                now_rfc3339(),
            ],
        )
        .map_err(|e| map_unique(e, "employee_id", new.employee_id.as_deref().unwrap_or("")))?;
        let profile_id = tx.last_insert_rowid();
        tx.commit()?;
        drop(conn);
        self.staff_member(profile_id)
    }

    pub fn profile(&self, id: i64) -> HmisResult<UserProfile> {
        self.store
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE id = ?1"),
                params![id],
                profile_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("user profile", id))
    }

    /// Resolve a profile by its employee id, the credential the API accepts.
    pub fn profile_by_employee_id(&self, employee_id: &str) -> HmisResult<Option<UserProfile>> {
        let found = self
            .store
            .conn()
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE employee_id = ?1"),
                params![employee_id],
                profile_row,
            )
            .optional()?;
        Ok(found)
    }

    /// Like [`profile_by_employee_id`](Self::profile_by_employee_id) but only
    /// matches profiles whose account is still active. Deactivating an account
    /// revokes the credential.
    pub fn credential_profile(&self, employee_id: &str) -> HmisResult<Option<UserProfile>> {
        let found = self
            .store
            .conn()
            .query_row(
                &format!(
                    "SELECT {PROFILE_COLUMNS_P}
                     FROM user_profiles p JOIN user_accounts a ON a.id = p.account_id
                     WHERE p.employee_id = ?1 AND a.is_active = 1"
                ),
                params![employee_id],
                profile_row,
            )
            .optional()?;
        Ok(found)
    }

    pub fn staff_member(&self, profile_id: i64) -> HmisResult<StaffMember> {
        self.store
            .conn()
            .query_row(
                &format!(
                    "SELECT {PROFILE_COLUMNS_P}, a.username, a.first_name, a.last_name
                     FROM user_profiles p JOIN user_accounts a ON a.id = p.account_id
                     WHERE p.id = ?1"
                ),
                params![profile_id],
                staff_row,
            )
            .optional()?
            .ok_or_else(|| HmisError::not_found("user profile", profile_id))
    }

    pub fn staff(&self) -> HmisResult<Vec<StaffMember>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {PROFILE_COLUMNS_P}, a.username, a.first_name, a.last_name
             FROM user_profiles p JOIN user_accounts a ON a.id = p.account_id
             WHERE a.is_active = 1 ORDER BY a.last_name, a.first_name"
        ))?;
        let rows = stmt
            .query_map([], staff_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Profile ids for every active staff member holding `role`, the fan-out
    /// set for role-addressed notifications.
    pub fn profile_ids_with_role(&self, role: Role) -> HmisResult<Vec<i64>> {
        let conn = self.store.conn();
        let mut stmt = conn.prepare(
            "SELECT p.id FROM user_profiles p
             JOIN user_accounts a ON a.id = p.account_id
             WHERE p.role = ?1 AND a.is_active = 1",
        )?;
        let ids = stmt
            .query_map(params![role.as_str()], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Verify a username/password pair, returning the profile on success.
    pub fn authenticate(&self, username: &str, password: &str) -> HmisResult<Option<UserProfile>> {
        let conn = self.store.conn();
        let found: Option<(i64, String)> = conn
            .query_row(
                "SELECT id, password_hash FROM user_accounts
                 WHERE username = ?1 AND is_active = 1",
                params![username],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((account_id, stored)) = found else {
            return Ok(None);
        };
        if !verify_password(password, &stored) {
            return Ok(None);
        }
        let profile = conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE account_id = ?1"),
                params![account_id],
                profile_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn set_role(&self, profile_id: i64, role: Role) -> HmisResult<()> {
        let changed = self.store.conn().execute(
            "UPDATE user_profiles SET role = ?1 WHERE id = ?2",
            params![role.as_str(), profile_id],
        )?;
        if changed == 0 {
            return Err(HmisError::not_found("user profile", profile_id));
        }
        Ok(())
    }

    pub fn deactivate_account(&self, account_id: i64) -> HmisResult<()> {
        let changed = self.store.conn().execute(
            "UPDATE user_accounts SET is_active = 0 WHERE id = ?1",
            params![account_id],
        )?;
        if changed == 0 {
            return Err(HmisError::not_found("user account", account_id));
        }
        Ok(())
    }
}

const PROFILE_COLUMNS: &str = "id, account_id, department_id, role, employee_id, phone, \
                               specialization, license_number, date_joined";
const PROFILE_COLUMNS_P: &str = "p.id, p.account_id, p.department_id, p.role, p.employee_id, \
                                 p.phone, p.specialization, p.license_number, p.date_joined";

fn profile_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
    let role: String = row.get(3)?;
    Ok(UserProfile {
        id: row.get(0)?,
        account_id: row.get(1)?,
        department_id: row.get(2)?,
        // Legacy role labels in old rows fold into their modern equivalents.
        role: Role::from_legacy(&role),
        employee_id: row.get(4)?,
        phone: row.get(5)?,
        specialization: row.get(6)?,
        license_number: row.get(7)?,
        date_joined: row.get(8)?,
    })
}

fn staff_row(row: &rusqlite::Row) -> rusqlite::Result<StaffMember> {
    let profile = profile_row(row)?;
    let username: String = row.get(9)?;
    let first: String = row.get(10)?;
    let last: String = row.get(11)?;
    Ok(StaffMember {
        profile,
        username,
        full_name: format!("{first} {last}").trim().to_owned(),
    })
}

fn hash_password(password: &str) -> HmisResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| HmisError::PasswordHash(e.to_string()))?
        .to_string())
}

fn verify_password(password: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_staff(username: &str, employee_id: &str, role: Role) -> NewStaff {
        NewStaff {
            username: username.into(),
            password: "correct horse battery".into(),
            email: format!("{username}@example.org"),
            first_name: "Test".into(),
            last_name: "Staff".into(),
            role,
            employee_id: Some(employee_id.into()),
            department_id: None,
            phone: String::new(),
            specialization: String::new(),
        }
    }

    #[test]
    fn create_and_authenticate() {
        let svc = IdentityService::new(Store::open_in_memory().unwrap());
        let staff = svc.create_staff(&new_staff("drmwansa", "EMP-001", Role::Doctor)).unwrap();
        assert_eq!(staff.profile.role, Role::Doctor);
        let profile = svc.authenticate("drmwansa", "correct horse battery").unwrap();
        assert_eq!(profile.unwrap().id, staff.profile.id);
        assert!(svc.authenticate("drmwansa", "wrong").unwrap().is_none());
    }

    #[test]
    fn employee_id_lookup() {
        let svc = IdentityService::new(Store::open_in_memory().unwrap());
        svc.create_staff(&new_staff("nurse1", "EMP-010", Role::Nurse)).unwrap();
        let profile = svc.profile_by_employee_id("EMP-010").unwrap().unwrap();
        assert_eq!(profile.role, Role::Nurse);
        assert!(svc.profile_by_employee_id("EMP-999").unwrap().is_none());
    }

    #[test]
    fn duplicate_username_rejected() {
        let svc = IdentityService::new(Store::open_in_memory().unwrap());
        svc.create_staff(&new_staff("cashier", "EMP-020", Role::Cashier)).unwrap();
        let err = svc
            .create_staff(&new_staff("cashier", "EMP-021", Role::Cashier))
            .unwrap_err();
        assert!(matches!(err, HmisError::Duplicate { field: "username", .. }));
    }

    #[test]
    fn role_fanout_targets_active_accounts_only() {
        let svc = IdentityService::new(Store::open_in_memory().unwrap());
        let a = svc.create_staff(&new_staff("doc_a", "EMP-030", Role::Doctor)).unwrap();
        let b = svc.create_staff(&new_staff("doc_b", "EMP-031", Role::Doctor)).unwrap();
        svc.create_staff(&new_staff("lab_a", "EMP-032", Role::LabTech)).unwrap();
        svc.deactivate_account(b.profile.account_id).unwrap();

        let ids = svc.profile_ids_with_role(Role::Doctor).unwrap();
        assert_eq!(ids, vec![a.profile.id]);
    }

    #[test]
    fn short_password_rejected() {
        let svc = IdentityService::new(Store::open_in_memory().unwrap());
        let mut staff = new_staff("weak", "EMP-040", Role::Guest);
        staff.password = "short".into();
        assert!(matches!(
            svc.create_staff(&staff).unwrap_err(),
            HmisError::InvalidInput(_)
        ));
    }
}
