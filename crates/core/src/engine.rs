//! Wiring for the session engine's components.

use std::sync::Arc;

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::credential::CredentialCodec;
use crate::identity::IdentityVerifier;
use crate::ledger::RevocationLedger;
use crate::mailer::Mailer;
use crate::registration::AccountService;
use crate::session::SessionManager;
use crate::store::{RevocationStore, SessionStore, UserDirectory};

/// The storage backends the engine runs against.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub revocations: Arc<dyn RevocationStore>,
    pub users: Arc<dyn UserDirectory>,
}

/// A lifecycle manager and identity verifier sharing one codec and ledger,
/// plus the account service that feeds them verified users.
#[derive(Clone)]
pub struct Engine {
    pub sessions: Arc<SessionManager>,
    pub identity: Arc<IdentityVerifier>,
    pub accounts: Arc<AccountService>,
}

impl Engine {
    pub fn new(
        config: SessionConfig,
        stores: Stores,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let config = Arc::new(config);
        let codec = Arc::new(CredentialCodec::new(&config));
        let ledger = Arc::new(RevocationLedger::new(
            codec.clone(),
            stores.revocations,
            config.store_timeout,
        ));

        let identity = Arc::new(IdentityVerifier::new(
            codec.clone(),
            ledger.clone(),
            stores.users.clone(),
            clock.clone(),
            config.store_timeout,
        ));
        let accounts = Arc::new(AccountService::new(
            config.clone(),
            stores.users.clone(),
            mailer,
            clock.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            config,
            codec,
            stores.sessions,
            ledger,
            stores.users,
            clock,
        ));

        Self {
            sessions,
            identity,
            accounts,
        }
    }
}
