use std::{
    collections::BTreeSet,
    fs, io,
    path::{Path, PathBuf},
};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use core_types::types::UserId;

use crate::error::RosterError;

#[derive(Serialize, Deserialize, Default)]
struct AdminsFile {
    admins: Vec<UserId>,
}

/// Admin set gating adjudication. The configured owner is always a
/// member and can never be revoked; everyone else enters and leaves the
/// set only through an already-authorized caller.
pub struct AdminRoster {
    owner: UserId,
    admins: RwLock<BTreeSet<UserId>>,
    path: PathBuf,
}

impl AdminRoster {
    pub fn load_or_init(path: impl AsRef<Path>, owner: UserId) -> Result<Self, RosterError> {
        let path = path.as_ref().to_path_buf();
        let admins = if path.exists() {
            let bytes = fs::read(&path)?;
            if bytes.is_empty() {
                BTreeSet::new()
            } else {
                serde_json::from_slice::<AdminsFile>(&bytes)
                    .map(|file| file.admins.into_iter().collect())
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?
            }
        } else {
            BTreeSet::new()
        };
        Ok(Self {
            owner,
            admins: RwLock::new(admins),
            path,
        })
    }

    pub fn owner(&self) -> UserId {
        self.owner
    }

    pub fn is_authorized(&self, user_id: UserId) -> bool {
        user_id == self.owner || self.admins.read().contains(&user_id)
    }

    pub fn require(&self, user_id: UserId) -> Result<(), RosterError> {
        if self.is_authorized(user_id) {
            Ok(())
        } else {
            Err(RosterError::Forbidden { user_id })
        }
    }

    pub fn grant(&self, by: UserId, target: UserId) -> Result<(), RosterError> {
        self.require(by)?;
        let mut admins = self.admins.write();
        if target == self.owner || admins.contains(&target) {
            return Err(RosterError::AlreadyAdmin { user_id: target });
        }
        admins.insert(target);
        self.persist_locked(&admins)
    }

    pub fn revoke(&self, by: UserId, target: UserId) -> Result<(), RosterError> {
        self.require(by)?;
        if target == self.owner {
            return Err(RosterError::OwnerImmutable);
        }
        let mut admins = self.admins.write();
        if !admins.remove(&target) {
            return Err(RosterError::NotAdmin { user_id: target });
        }
        self.persist_locked(&admins)
    }

    fn persist_locked(&self, admins: &BTreeSet<UserId>) -> Result<(), RosterError> {
        let file = AdminsFile {
            admins: admins.iter().copied().collect(),
        };
        let bytes = serde_json::to_vec_pretty(&file).expect("serialize admins");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const OWNER: UserId = 99;

    fn roster_in(dir: &std::path::Path) -> AdminRoster {
        AdminRoster::load_or_init(dir.join("admins.json"), OWNER).expect("roster bootstrap")
    }

    #[test]
    fn owner_is_always_authorized() {
        let dir = tempdir().unwrap();
        let roster = roster_in(dir.path());
        assert!(roster.is_authorized(OWNER));
        assert!(!roster.is_authorized(1));
    }

    #[test]
    fn grants_require_an_authorized_caller() {
        let dir = tempdir().unwrap();
        let roster = roster_in(dir.path());

        assert!(matches!(
            roster.grant(1, 2),
            Err(RosterError::Forbidden { user_id: 1 })
        ));

        roster.grant(OWNER, 1).unwrap();
        assert!(roster.is_authorized(1));

        // Freshly granted admins can grant further.
        roster.grant(1, 2).unwrap();
        assert!(roster.is_authorized(2));

        assert!(matches!(
            roster.grant(OWNER, 2),
            Err(RosterError::AlreadyAdmin { user_id: 2 })
        ));
    }

    #[test]
    fn revoke_guards_owner_and_non_admins() {
        let dir = tempdir().unwrap();
        let roster = roster_in(dir.path());
        roster.grant(OWNER, 1).unwrap();

        assert!(matches!(
            roster.revoke(OWNER, OWNER),
            Err(RosterError::OwnerImmutable)
        ));
        assert!(matches!(
            roster.revoke(OWNER, 5),
            Err(RosterError::NotAdmin { user_id: 5 })
        ));

        roster.revoke(OWNER, 1).unwrap();
        assert!(!roster.is_authorized(1));
    }

    #[test]
    fn membership_survives_reload() {
        let dir = tempdir().unwrap();
        {
            let roster = roster_in(dir.path());
            roster.grant(OWNER, 7).unwrap();
        }
        let reloaded = roster_in(dir.path());
        assert!(reloaded.is_authorized(7));
    }
}
