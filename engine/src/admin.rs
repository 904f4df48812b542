//! Owner-gated administration.

use crate::{Engine, Error, Host, Params, ProofVerifier, TallyVm};
use oracle_primitives::Identity;
use oracle_store::kv::Kv;
use tracing::info;

impl<D: Kv, H: Host, V: ProofVerifier, M: TallyVm> Engine<D, H, V, M> {
    fn ensure_owner(&self, sender: &str) -> Result<(), Error> {
        if self.state.owner != sender {
            return Err(Error::Unauthorized);
        }
        Ok(())
    }

    /// Start transferring ownership to `new_owner`, who must accept it.
    pub fn transfer_ownership(&mut self, sender: &str, new_owner: String) -> Result<(), Error> {
        self.ensure_owner(sender)?;
        info!(owner = sender, pending_owner = new_owner, "started ownership transfer");
        self.state.pending_owner = Some(new_owner);
        Ok(())
    }

    /// Complete an ownership transfer started for `sender`.
    pub fn accept_ownership(&mut self, sender: &str) -> Result<(), Error> {
        if self.state.pending_owner.as_deref() != Some(sender) {
            return Err(Error::NotPendingOwner);
        }
        self.state.owner = sender.to_string();
        self.state.pending_owner = None;
        info!(owner = sender, "accepted ownership");
        Ok(())
    }

    pub fn pause(&mut self, sender: &str) -> Result<(), Error> {
        self.ensure_owner(sender)?;
        if self.state.paused {
            return Err(Error::Paused);
        }
        self.state.paused = true;
        info!("paused");
        Ok(())
    }

    pub fn unpause(&mut self, sender: &str) -> Result<(), Error> {
        self.ensure_owner(sender)?;
        if !self.state.paused {
            return Err(Error::NotPaused);
        }
        self.state.paused = false;
        info!("unpaused");
        Ok(())
    }

    pub fn add_to_allowlist(&mut self, sender: &str, identity: Identity) -> Result<(), Error> {
        self.ensure_owner(sender)?;
        if self.host.is_allowlisted(&identity) {
            return Err(Error::AlreadyAllowlisted(identity));
        }
        self.host.set_allowlisted(&identity, true);
        info!(%identity, "added to allowlist");
        Ok(())
    }

    pub fn remove_from_allowlist(&mut self, sender: &str, identity: Identity) -> Result<(), Error> {
        self.ensure_owner(sender)?;
        if !self.host.is_allowlisted(&identity) {
            return Err(Error::NotInAllowlist(identity));
        }
        self.host.set_allowlisted(&identity, false);
        info!(%identity, "removed from allowlist");
        Ok(())
    }

    /// Replace every parameter at once.
    pub fn update_params(&mut self, sender: &str, params: Params) -> Result<(), Error> {
        self.ensure_owner(sender)?;
        params.validate()?;
        self.params = params;
        info!(params = ?self.params, "updated params");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{mocks, Staking};
    use commonware_macros::test_traced;

    #[test_traced]
    fn test_ownership_transfer() {
        let mut engine = mocks::engine(mocks::host(1));
        assert!(matches!(
            engine.transfer_ownership("mallory", "mallory".into()),
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            engine.accept_ownership("alice"),
            Err(Error::NotPendingOwner)
        ));

        engine
            .transfer_ownership(mocks::OWNER, "alice".into())
            .unwrap();
        assert_eq!(engine.state().pending_owner.as_deref(), Some("alice"));
        assert!(matches!(
            engine.accept_ownership("bob"),
            Err(Error::NotPendingOwner)
        ));
        engine.accept_ownership("alice").unwrap();
        assert_eq!(engine.state().owner, "alice");
        assert_eq!(engine.state().pending_owner, None);

        // The previous owner lost its rights
        assert!(matches!(engine.pause(mocks::OWNER), Err(Error::Unauthorized)));
        engine.pause("alice").unwrap();
    }

    #[test_traced]
    fn test_pause() {
        let mut engine = mocks::engine(mocks::host(1));
        assert!(matches!(engine.unpause(mocks::OWNER), Err(Error::NotPaused)));
        engine.pause(mocks::OWNER).unwrap();
        assert!(engine.state().paused);
        assert!(matches!(engine.pause(mocks::OWNER), Err(Error::Paused)));
        assert!(matches!(engine.unpause("mallory"), Err(Error::Unauthorized)));
        engine.unpause(mocks::OWNER).unwrap();
        assert!(!engine.state().paused);
    }

    #[test_traced]
    fn test_allowlist() {
        let mut engine = mocks::engine(mocks::host(1));
        let identity = mocks::Executor::new(7).identity;
        assert!(matches!(
            engine.add_to_allowlist("mallory", identity.clone()),
            Err(Error::Unauthorized)
        ));
        assert!(matches!(
            engine.remove_from_allowlist(mocks::OWNER, identity.clone()),
            Err(Error::NotInAllowlist(_))
        ));
        engine
            .add_to_allowlist(mocks::OWNER, identity.clone())
            .unwrap();
        assert!(engine.host().is_allowlisted(&identity));
        assert!(matches!(
            engine.add_to_allowlist(mocks::OWNER, identity.clone()),
            Err(Error::AlreadyAllowlisted(_))
        ));
        engine
            .remove_from_allowlist(mocks::OWNER, identity.clone())
            .unwrap();
        assert!(!engine.host().is_allowlisted(&identity));
    }

    #[test_traced]
    fn test_update_params() {
        let mut engine = mocks::engine(mocks::host(1));
        let mut params = engine.params().clone();
        params.protocol.commit_timeout_in_blocks = 7;
        assert!(matches!(
            engine.update_params("mallory", params.clone()),
            Err(Error::Unauthorized)
        ));
        engine.update_params(mocks::OWNER, params).unwrap();
        assert_eq!(engine.params().protocol.commit_timeout_in_blocks, 7);

        // Invalid parameters are rejected as a whole
        let mut params = engine.params().clone();
        params.protocol.commit_timeout_in_blocks = 9;
        params.tally.max_tallies_per_block = 0;
        assert!(matches!(
            engine.update_params(mocks::OWNER, params),
            Err(Error::InvalidParams(_))
        ));
        assert_eq!(engine.params().protocol.commit_timeout_in_blocks, 7);
    }
}
