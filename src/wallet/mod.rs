// src/wallet/mod.rs
//! Wallet session - the single owner of wallet connection state
//!
//! All mutations go through [`WalletSession`]: explicit connect/disconnect/switch
//! calls, or events pushed by the provider (account change, chain change,
//! disconnect). Everything else reads point-in-time snapshots.

use async_trait::async_trait;
use ethers::types::{Address, TransactionReceipt, TransactionRequest, H256, U256};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::DeployError;

pub mod local;

pub use local::LocalKeyProvider;

/// Snapshot of the wallet connection.
///
/// Fields are private so `connected == false` always implies no address and no
/// chain id; the only constructors are [`WalletState::disconnected`] and
/// [`WalletState::connected`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WalletState {
    connected: bool,
    address: Option<Address>,
    chain_id: Option<u64>,
}

impl WalletState {
    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn connected(address: Address, chain_id: u64) -> Self {
        Self {
            connected: true,
            address: Some(address),
            chain_id: Some(chain_id),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn address(&self) -> Option<Address> {
        self.address
    }

    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }
}

/// Events a wallet provider pushes asynchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    AccountsChanged(Vec<Address>),
    ChainChanged(u64),
    Disconnected,
}

/// The wallet provider as seen by the session (EIP-1193 style).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask the provider for authorized accounts; may prompt the user.
    async fn request_accounts(&self) -> Result<Vec<Address>, DeployError>;

    async fn chain_id(&self) -> Result<u64, DeployError>;

    async fn switch_chain(&self, chain_id: u64) -> Result<(), DeployError>;

    async fn disconnect(&self) {}

    async fn balance(&self, account: Address) -> Result<U256, DeployError>;

    async fn gas_price(&self) -> Result<U256, DeployError>;

    /// Sign and broadcast; returns the transaction hash once accepted by the node.
    async fn send_transaction(
        &self,
        from: Address,
        tx: TransactionRequest,
    ) -> Result<H256, DeployError>;

    async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, DeployError>;
}

type Observer = Arc<dyn Fn(&WalletState) + Send + Sync>;

/// Handle returned by [`WalletSession::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct WalletSession {
    provider: Option<Arc<dyn WalletProvider>>,
    state: RwLock<WalletState>,
    observers: Mutex<Vec<(SubscriptionId, Observer)>>,
    next_subscription: Mutex<u64>,
}

impl WalletSession {
    pub fn new(provider: Arc<dyn WalletProvider>) -> Self {
        Self::with_provider(Some(provider))
    }

    /// Session with no wallet provider present; `connect` fails with `WalletUnavailable`.
    pub fn detached() -> Self {
        Self::with_provider(None)
    }

    fn with_provider(provider: Option<Arc<dyn WalletProvider>>) -> Self {
        Self {
            provider,
            state: RwLock::new(WalletState::disconnected()),
            observers: Mutex::new(Vec::new()),
            next_subscription: Mutex::new(0),
        }
    }

    /// Point-in-time copy of the connection state.
    pub fn snapshot(&self) -> WalletState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn connect(&self) -> Result<WalletState, DeployError> {
        let provider = self.provider()?;

        let accounts = provider.request_accounts().await?;
        let address = *accounts.first().ok_or(DeployError::UserRejected)?;
        let chain_id = provider.chain_id().await?;

        let state = WalletState::connected(address, chain_id);
        self.set_state(state);

        info!("Wallet connected: address={:?}, chain={}", address, chain_id);
        Ok(state)
    }

    /// Clear the connection. Always succeeds; repeated calls are no-ops.
    pub async fn disconnect(&self) {
        if let Some(provider) = &self.provider {
            provider.disconnect().await;
        }
        if self.set_state(WalletState::disconnected()) {
            info!("Wallet disconnected");
        }
    }

    pub fn current_network_matches(&self, expected: u64) -> bool {
        let state = self.snapshot();
        state.is_connected() && state.chain_id() == Some(expected)
    }

    /// Ask the provider to move to `target`.
    ///
    /// The new chain is applied only if the session is still connected to the
    /// same account once the provider answers; a disconnect or account change
    /// that arrived while the prompt was open wins and yields `NotConnected`.
    pub async fn switch_network(&self, target: u64) -> Result<(), DeployError> {
        let provider = self.provider()?;
        let state = self.snapshot();
        let address = state.address().ok_or(DeployError::NotConnected)?;

        if state.chain_id() == Some(target) {
            return Ok(());
        }

        provider.switch_chain(target).await?;

        let mut applied = false;
        self.update_state(|current| {
            if current.is_connected() && current.address() == Some(address) {
                applied = true;
                Some(WalletState::connected(address, target))
            } else {
                None
            }
        });

        if !applied {
            warn!("Session changed while switching to chain {}; switch not applied", target);
            return Err(DeployError::NotConnected);
        }

        info!("Switched wallet to chain {}", target);
        Ok(())
    }

    /// Signing capability bound to the current account.
    ///
    /// The handle borrows the session, so it cannot outlive it, and it
    /// re-checks the account before every send.
    pub fn signer(&self) -> Result<SignerHandle<'_>, DeployError> {
        let provider = self.provider.as_ref().ok_or(DeployError::NotConnected)?;
        let state = self.snapshot();

        match (state.address(), state.chain_id()) {
            (Some(address), Some(chain_id)) => Ok(SignerHandle {
                session: self,
                provider: provider.as_ref(),
                address,
                chain_id,
            }),
            _ => Err(DeployError::NotConnected),
        }
    }

    pub async fn transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> Result<Option<TransactionReceipt>, DeployError> {
        self.provider()?.transaction_receipt(tx_hash).await
    }

    /// Register an observer. Observers run synchronously after each state
    /// change, in registration order.
    pub fn subscribe<F>(&self, observer: F) -> SubscriptionId
    where
        F: Fn(&WalletState) + Send + Sync + 'static,
    {
        let id = {
            let mut next = self.next_subscription.lock().unwrap_or_else(|e| e.into_inner());
            *next += 1;
            SubscriptionId(*next)
        };

        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(observer)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(sub, _)| *sub != id);
    }

    /// Apply a provider-pushed event.
    pub fn handle_event(&self, event: WalletEvent) {
        debug!("Wallet event: {:?}", event);

        self.update_state(|current| match &event {
            WalletEvent::Disconnected => Some(WalletState::disconnected()),
            WalletEvent::AccountsChanged(accounts) => match (accounts.first(), current.chain_id()) {
                (Some(address), Some(chain_id)) => Some(WalletState::connected(*address, chain_id)),
                // Account list arrived before any connect; wait for an explicit connect
                (Some(_), None) => None,
                (None, _) => Some(WalletState::disconnected()),
            },
            WalletEvent::ChainChanged(chain_id) => current
                .address()
                .map(|address| WalletState::connected(address, *chain_id)),
        });
    }

    /// Drain provider events on a background task.
    pub fn listen(self: &Arc<Self>, mut events: mpsc::UnboundedReceiver<WalletEvent>) -> JoinHandle<()> {
        let session = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                session.handle_event(event);
            }
            warn!("Wallet provider event channel closed");
        })
    }

    fn provider(&self) -> Result<&Arc<dyn WalletProvider>, DeployError> {
        self.provider.as_ref().ok_or(DeployError::WalletUnavailable)
    }

    /// Store a new state and notify observers. Returns whether anything changed.
    fn set_state(&self, next: WalletState) -> bool {
        self.update_state(|_| Some(next))
    }

    /// Derive the next state from the current one under the write lock, so no
    /// concurrent update can slip in between the read and the write. `None`
    /// leaves the state alone. Observers run after the lock is released.
    fn update_state<F>(&self, transition: F) -> bool
    where
        F: FnOnce(&WalletState) -> Option<WalletState>,
    {
        let next = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
            match transition(&state) {
                Some(next) if next != *state => {
                    *state = next;
                    next
                }
                _ => return false,
            }
        };

        let observers: Vec<Observer> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(&next);
        }
        true
    }
}

/// Capability to submit transactions from the connected account.
pub struct SignerHandle<'a> {
    session: &'a WalletSession,
    provider: &'a dyn WalletProvider,
    address: Address,
    chain_id: u64,
}

impl<'a> SignerHandle<'a> {
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub async fn balance(&self) -> Result<U256, DeployError> {
        self.provider.balance(self.address).await
    }

    pub async fn gas_price(&self) -> Result<U256, DeployError> {
        self.provider.gas_price().await
    }

    pub async fn send_transaction(&self, tx: TransactionRequest) -> Result<H256, DeployError> {
        let state = self.session.snapshot();
        if state.address() != Some(self.address) {
            return Err(DeployError::NotConnected);
        }
        if state.chain_id() != Some(self.chain_id) {
            return Err(DeployError::WrongNetwork {
                expected: self.chain_id,
                actual: state.chain_id(),
            });
        }

        self.provider
            .send_transaction(self.address, tx.from(self.address).chain_id(self.chain_id))
            .await
    }
}
